use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The kind of wallet operation being attested.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PayloadKind {
    /// A pending transaction
    Transaction,
    /// A pending message signature
    Signature,
}

/// A transaction or signature descriptor captured from a triggering event.
///
/// The body is never mutated after capture; every consumer works from
/// [`AttestationPayload::canonical_value`] or [`AttestationPayload::canonical_string`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationPayload {
    kind: PayloadKind,
    chain_id: Option<String>,
    origin: Option<String>,
    body: Value,
}

impl AttestationPayload {
    /// Captures a pending transaction.
    ///
    /// # Arguments
    ///
    /// * `chain_id` - Network identifier the transaction targets, if known.
    /// * `origin` - Site that requested the transaction, if known.
    /// * `transaction` - The transaction fields. Must be a JSON object.
    pub fn transaction(
        chain_id: Option<String>,
        origin: Option<String>,
        transaction: Value,
    ) -> Result<Self> {
        if !transaction.is_object() {
            return Err(anyhow!(
                "Transaction payload must be a JSON object, got: {transaction}"
            ));
        }

        Ok(Self {
            kind: PayloadKind::Transaction,
            chain_id,
            origin,
            body: transaction,
        })
    }

    /// Captures a pending signature request.
    pub fn signature(origin: Option<String>, signature: Value) -> Self {
        Self {
            kind: PayloadKind::Signature,
            chain_id: None,
            origin,
            body: signature,
        }
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    pub fn chain_id(&self) -> Option<&str> {
        self.chain_id.as_deref()
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// The value that is compressed, hashed and uploaded.
    ///
    /// Transactions become `{chainId, ...transaction}` with transaction fields
    /// taking precedence; signatures are used as-is.
    pub fn canonical_value(&self) -> Value {
        match self.kind {
            PayloadKind::Transaction => {
                let mut merged = Map::new();
                if let Some(chain_id) = &self.chain_id {
                    merged.insert("chainId".to_owned(), Value::String(chain_id.clone()));
                }
                if let Value::Object(fields) = &self.body {
                    for (k, v) in fields {
                        merged.insert(k.clone(), v.clone());
                    }
                }
                Value::Object(merged)
            }
            PayloadKind::Signature => self.body.clone(),
        }
    }

    /// JSON Canonicalization Scheme (RFC 8785) rendering of [`Self::canonical_value`].
    pub fn canonical_string(&self) -> Result<String> {
        let jcs = serde_jcs::to_string(&self.canonical_value())
            .map_err(|e| anyhow!("Failed to canonicalize {} payload: {e}", self.kind))?;
        Ok(jcs)
    }
}
