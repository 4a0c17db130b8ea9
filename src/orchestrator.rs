use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};

use crate::{
    backend::{HttpBackend, UnblindApi},
    codec,
    config::Config,
    hasher::{RemoteHasher, VerificationHash, VerificationHasher},
    host::{Content, HandlerResponse, HomeView, HostDialog, Severity},
    identity::{IdentityManager, IdentityStore, InMemoryStore, LinkPrompt, LocalFsStore},
    payload::{AttestationPayload, PayloadKind},
    render::{
        CodeRenderer, FallbackRenderer, LocalRenderer, RemoteRenderer, RenderMode, RenderedCode,
    },
};

/// Everything the confirmation dialog shows for one pending operation.
#[derive(Clone, Debug, PartialEq)]
pub struct AttestationRecord {
    pub code: RenderedCode,
    pub hash: VerificationHash,
    /// Present when the user still has to link a secondary channel
    pub link_prompt: Option<LinkPrompt>,
}

impl AttestationRecord {
    pub fn link_prompt_needed(&self) -> bool {
        self.link_prompt.is_some()
    }

    /// The hash split for two-line display.
    pub fn hash_halves(&self) -> (&str, &str) {
        self.hash.halves()
    }
}

/// Entry point for host events.
///
/// Each handler runs as one task. Within a transaction or signature event the
/// render, hash and link-status calls run concurrently and are joined once all
/// three settle; telemetry is detached and never joined.
pub struct Orchestrator {
    api: Arc<dyn UnblindApi>,
    identity: IdentityManager,
    renderer: Arc<dyn CodeRenderer>,
    hasher: Arc<dyn VerificationHasher>,
    dialog: Arc<dyn HostDialog>,
    call_timeout: Duration,
}

impl Orchestrator {
    /// Wires the default pipeline: remote rendering with local fallback and
    /// backend hashing.
    pub fn new(
        config: &Config,
        api: Arc<dyn UnblindApi>,
        store: Arc<dyn IdentityStore>,
        dialog: Arc<dyn HostDialog>,
    ) -> Result<Self> {
        config.validate()?;

        let renderer = FallbackRenderer::new(
            RemoteRenderer::new(api.clone(), config.request_timeout()),
            LocalRenderer::new(config.code.clone()),
        );

        Ok(Self {
            identity: IdentityManager::new(api.clone(), store, config.signup.clone()),
            renderer: Arc::new(renderer),
            hasher: Arc::new(RemoteHasher::new(api.clone())),
            api,
            dialog,
            call_timeout: config.call_timeout(),
        })
    }

    /// Builds the pipeline against the HTTP backend, persisting the identity at
    /// `statePath` when configured.
    pub fn from_config(config: &Config, dialog: Arc<dyn HostDialog>) -> Result<Self> {
        let api: Arc<dyn UnblindApi> = Arc::new(HttpBackend::from_config(config)?);
        let store: Arc<dyn IdentityStore> = match &config.state_path {
            Some(path) => Arc::new(LocalFsStore::new(path.clone())?),
            None => Arc::new(InMemoryStore::default()),
        };

        Self::new(config, api, store, dialog)
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn VerificationHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn CodeRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn identity(&self) -> &IdentityManager {
        &self.identity
    }

    /// Signs up and shows the linking code.
    ///
    /// # Errors
    ///
    /// When signup is exhausted the user sees a warning and the signup error is
    /// still returned so the host can log it.
    pub async fn on_install(&self) -> Result<()> {
        match self.identity.ensure_identity().await {
            Ok(identity) => {
                let link = (!identity.tg_linked).then(|| LinkPrompt::from(&identity));
                self.dialog.show(&Content::Installed { link }).await
            }
            Err(e) => {
                let warning = Content::Warning {
                    message: format!("Could not register this installation: {e:#}"),
                };
                if let Err(dialog_error) = self.dialog.show(&warning).await {
                    log::warn!("Failed to show install warning: {dialog_error:#}");
                }
                Err(e)
            }
        }
    }

    pub async fn on_transaction(
        &self,
        chain_id: Option<String>,
        origin: Option<String>,
        transaction: Value,
    ) -> Result<HandlerResponse> {
        let payload = AttestationPayload::transaction(chain_id, origin, transaction)?;
        self.attest(payload).await
    }

    pub async fn on_signature(
        &self,
        origin: Option<String>,
        signature: Value,
    ) -> Result<HandlerResponse> {
        self.attest(AttestationPayload::signature(origin, signature)).await
    }

    /// Account status for the home page. Signs up on first use.
    pub async fn on_home_page(&self) -> Result<HandlerResponse> {
        let link = self.identity.link_prompt().await;
        let user_id = self.identity.current_user_id().await;

        Ok(HandlerResponse {
            content: Content::Home(HomeView { user_id, link }),
            severity: None,
        })
    }

    async fn attest(&self, payload: AttestationPayload) -> Result<HandlerResponse> {
        let blob = codec::compress(&payload)?;
        let mode = match payload.kind() {
            PayloadKind::Transaction => RenderMode::Transaction,
            PayloadKind::Signature => RenderMode::Signature,
        };
        log::debug!(
            "Attesting {} from {} ({} compressed bytes)",
            payload.kind(),
            payload.origin().unwrap_or("unknown origin"),
            blob.len()
        );

        let (code, hash, link_prompt) = tokio::join!(
            self.bounded("render", self.renderer.render(&blob, mode)),
            self.bounded("hash", self.hasher.hash(&payload)),
            self.bounded_link_prompt(),
        );

        // the link-status branch has signed up by now if it could
        let user_id = self.identity.current_user_id().await;
        self.spawn_telemetry(&payload, user_id);

        let hash = hash.context("Failed to derive verification hash")?;
        let code = code.context("Failed to render attestation code")?;

        Ok(HandlerResponse {
            content: Content::Attestation(AttestationRecord {
                code,
                hash,
                link_prompt,
            }),
            severity: Some(Severity::Critical),
        })
    }

    async fn bounded<T>(
        &self,
        call: &str,
        future: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.call_timeout, future)
            .await
            .map_err(|_| anyhow!("{call} call timed out after {:?}", self.call_timeout))?
    }

    /// Link status never holds up an attestation: past `call_timeout` it reads as no prompt.
    async fn bounded_link_prompt(&self) -> Option<LinkPrompt> {
        match tokio::time::timeout(self.call_timeout, self.identity.link_prompt()).await {
            Ok(prompt) => prompt,
            Err(_) => {
                log::warn!(
                    "Link status lookup timed out after {:?}, showing no prompt",
                    self.call_timeout
                );
                None
            }
        }
    }

    /// Uploads the payload and user id on a detached task. The outcome is only logged.
    fn spawn_telemetry(&self, payload: &AttestationPayload, user_id: Option<String>) {
        let api = self.api.clone();
        let kind = payload.kind();
        let body = telemetry_body(payload.canonical_value(), user_id);

        tokio::spawn(async move {
            let result = match kind {
                PayloadKind::Transaction => api.upload_transaction(&body).await,
                PayloadKind::Signature => api.upload_message(&body).await,
            };
            if let Err(e) = result {
                log::debug!("Telemetry upload failed: {e:#}");
            }
        });
    }
}

fn telemetry_body(payload: Value, user_id: Option<String>) -> Value {
    match payload {
        Value::Object(mut fields) => {
            fields.insert("userId".to_owned(), json!(user_id));
            Value::Object(fields)
        }
        other => json!({ "payload": other, "userId": user_id }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        hasher::LocalHasher,
        identity::RetryPolicy,
        render::RenderOrigin,
        testing::{decode_svg, MockBackend},
    };

    #[derive(Default)]
    struct RecordingDialog {
        shown: Mutex<Vec<Content>>,
    }

    impl RecordingDialog {
        fn shown(&self) -> Vec<Content> {
            self.shown.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HostDialog for RecordingDialog {
        async fn show(&self, content: &Content) -> Result<()> {
            self.shown.lock().unwrap().push(content.clone());
            Ok(())
        }
    }

    fn config() -> Config {
        Config {
            signup: RetryPolicy {
                max_attempts: 3,
                backoff_step_ms: 1,
            },
            ..Config::default()
        }
    }

    fn orchestrator(
        config: &Config,
        backend: Arc<MockBackend>,
    ) -> (Orchestrator, Arc<RecordingDialog>) {
        let dialog = Arc::new(RecordingDialog::default());
        let orchestrator = Orchestrator::new(
            config,
            backend,
            Arc::new(InMemoryStore::default()),
            dialog.clone(),
        )
        .unwrap();
        (orchestrator, dialog)
    }

    fn attestation(response: HandlerResponse) -> AttestationRecord {
        assert_eq!(response.severity, Some(Severity::Critical));
        match response.content {
            Content::Attestation(record) => record,
            other => panic!("expected an attestation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transaction_falls_back_to_local_code() {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = Arc::new(MockBackend::default());
        backend.fail_render(true);
        let config = config();
        let (orchestrator, _dialog) = orchestrator(&config, backend.clone());
        let transaction = json!({"to": "0xabc", "value": "1"});

        let response = orchestrator
            .on_transaction(Some("1".to_owned()), None, transaction)
            .await
            .unwrap();
        let record = attestation(response);

        let expected = codec::compress_str(r#"{"chainId":"1","to":"0xabc","value":"1"}"#).unwrap();
        assert_eq!(record.code.origin, RenderOrigin::Local);
        assert!(record.code.svg.contains("<path"));
        let grid = record.code.grid.as_ref().unwrap();
        let dim = grid.size() as i32 + 2 * config.code.border;
        assert!(record
            .code
            .svg
            .contains(&format!("viewBox=\"0 0 {dim} {dim}\"")));
        assert_eq!(decode_svg(&record.code.svg), expected.to_base64());
        assert_eq!(record.hash.as_str(), MockBackend::TRANSACTION_HASH);
        assert!(record.link_prompt_needed());
    }

    #[tokio::test]
    async fn signs_up_once_across_events() {
        let backend = Arc::new(MockBackend::default());
        let (orchestrator, _dialog) = orchestrator(&config(), backend.clone());

        orchestrator
            .on_transaction(Some("1".to_owned()), None, json!({"to": "0xabc"}))
            .await
            .unwrap();
        orchestrator
            .on_signature(Some("https://dapp.example".to_owned()), json!({"data": "hi"}))
            .await
            .unwrap();
        orchestrator.on_home_page().await.unwrap();

        assert_eq!(backend.signup_calls(), 1);
    }

    #[tokio::test]
    async fn signature_uses_message_hash_and_mode() {
        let backend = Arc::new(MockBackend::default());
        let (orchestrator, _dialog) = orchestrator(&config(), backend.clone());

        let record = attestation(
            orchestrator
                .on_signature(None, json!({"data": "0x68656c6c6f", "from": "0xabc"}))
                .await
                .unwrap(),
        );

        assert_eq!(record.code.origin, RenderOrigin::Remote);
        assert_eq!(record.hash.as_str(), MockBackend::MESSAGE_HASH);
        assert_eq!(backend.render_requests()[0].1, RenderMode::Signature);
    }

    #[tokio::test]
    async fn hash_failure_aborts_attestation() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_hash(true);
        let (orchestrator, _dialog) = orchestrator(&config(), backend.clone());

        let err = orchestrator
            .on_transaction(None, None, json!({"to": "0xabc"}))
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("hash service unavailable"));
    }

    #[tokio::test]
    async fn malformed_transaction_is_rejected() {
        let backend = Arc::new(MockBackend::default());
        let (orchestrator, _dialog) = orchestrator(&config(), backend.clone());

        assert!(orchestrator
            .on_transaction(None, None, json!("not an object"))
            .await
            .is_err());
        assert!(backend.render_requests().is_empty());
    }

    #[tokio::test]
    async fn telemetry_carries_user_id() {
        let backend = Arc::new(MockBackend::default());
        let (orchestrator, _dialog) = orchestrator(&config(), backend.clone());
        orchestrator.identity().ensure_identity().await.unwrap();

        orchestrator
            .on_transaction(Some("1".to_owned()), None, json!({"to": "0xabc"}))
            .await
            .unwrap();

        let uploads = backend.wait_for_uploads(1).await;
        assert_eq!(
            uploads,
            vec![(
                "transaction".to_owned(),
                json!({"chainId": "1", "to": "0xabc", "userId": "user-1"})
            )]
        );
    }

    #[tokio::test]
    async fn first_event_telemetry_carries_new_user_id() {
        let backend = Arc::new(MockBackend::default());
        let (orchestrator, _dialog) = orchestrator(&config(), backend.clone());

        orchestrator
            .on_signature(None, json!({"data": "hi"}))
            .await
            .unwrap();

        let uploads = backend.wait_for_uploads(1).await;
        assert_eq!(
            uploads,
            vec![("message".to_owned(), json!({"data": "hi", "userId": "user-1"}))]
        );
    }

    #[tokio::test]
    async fn telemetry_is_sent_when_hashing_fails() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_hash(true);
        let (orchestrator, _dialog) = orchestrator(&config(), backend.clone());

        assert!(orchestrator
            .on_transaction(None, None, json!({"to": "0xabc"}))
            .await
            .is_err());

        assert_eq!(backend.wait_for_uploads(1).await.len(), 1);
    }

    #[tokio::test]
    async fn slow_signup_does_not_hold_up_attestation() {
        let backend = Arc::new(MockBackend::default());
        backend.set_signup_delay(Duration::from_secs(2));
        let config = Config {
            call_timeout_ms: 100,
            ..config()
        };
        let (orchestrator, _dialog) = orchestrator(&config, backend.clone());

        let started = std::time::Instant::now();
        let record = attestation(
            orchestrator
                .on_transaction(None, None, json!({"to": "0xabc"}))
                .await
                .unwrap(),
        );

        assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());
        assert_eq!(record.link_prompt, None);
        assert_eq!(record.hash.as_str(), MockBackend::TRANSACTION_HASH);
    }

    #[tokio::test]
    async fn telemetry_failure_is_ignored() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_uploads(true);
        let (orchestrator, _dialog) = orchestrator(&config(), backend.clone());

        let record = attestation(
            orchestrator
                .on_signature(None, json!({"data": "hi"}))
                .await
                .unwrap(),
        );

        assert_eq!(record.hash.as_str(), MockBackend::MESSAGE_HASH);
    }

    #[tokio::test]
    async fn slow_remote_render_falls_back() {
        let backend = Arc::new(MockBackend::default());
        backend.set_render_delay(Duration::from_secs(5));
        let config = Config {
            request_timeout_ms: 50,
            ..config()
        };
        let (orchestrator, _dialog) = orchestrator(&config, backend.clone());

        let record = attestation(
            orchestrator
                .on_transaction(None, None, json!({"to": "0xabc"}))
                .await
                .unwrap(),
        );

        assert_eq!(record.code.origin, RenderOrigin::Local);
    }

    #[tokio::test]
    async fn call_timeout_bounds_the_event() {
        let backend = Arc::new(MockBackend::default());
        backend.set_render_delay(Duration::from_secs(5));
        let config = Config {
            call_timeout_ms: 50,
            ..config()
        };
        let (orchestrator, _dialog) = orchestrator(&config, backend.clone());

        let err = orchestrator
            .on_transaction(None, None, json!({"to": "0xabc"}))
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("timed out"));
    }

    #[tokio::test]
    async fn local_hasher_can_replace_backend() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_hash(true);
        let (orchestrator, _dialog) = orchestrator(&config(), backend.clone());
        let orchestrator = orchestrator.with_hasher(Arc::new(LocalHasher));

        let record = attestation(
            orchestrator
                .on_transaction(None, None, json!({"to": "0xabc"}))
                .await
                .unwrap(),
        );

        assert_eq!(record.hash.as_str().len(), 64);
        assert_eq!(record.hash_halves().0.len(), 32);
        assert!(backend.hash_requests().is_empty());
    }

    #[tokio::test]
    async fn install_shows_linking_code() {
        let backend = Arc::new(MockBackend::default());
        let (orchestrator, dialog) = orchestrator(&config(), backend.clone());

        orchestrator.on_install().await.unwrap();

        let identity = orchestrator.identity().current().await.unwrap().unwrap();
        assert_eq!(
            dialog.shown(),
            vec![Content::Installed {
                link: Some(LinkPrompt::from(&identity))
            }]
        );
    }

    #[tokio::test]
    async fn install_warns_and_returns_signup_failure() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_signup_times(usize::MAX);
        let (orchestrator, dialog) = orchestrator(&config(), backend.clone());

        let err = orchestrator.on_install().await.unwrap_err();

        assert!(err.to_string().contains("Signup failed after 3 attempts"));
        assert!(matches!(dialog.shown().as_slice(), [Content::Warning { .. }]));
        assert_eq!(backend.signup_calls(), 3);
    }

    #[tokio::test]
    async fn home_page_reports_link_state() {
        let backend = Arc::new(MockBackend::default());
        let (orchestrator, _dialog) = orchestrator(&config(), backend.clone());

        let response = orchestrator.on_home_page().await.unwrap();
        assert_eq!(response.severity, None);
        let Content::Home(home) = response.content else {
            panic!("expected home content");
        };
        assert_eq!(home.user_id.as_deref(), Some("user-1"));
        assert!(!home.linked());

        backend.set_linked(true);
        let Content::Home(home) = orchestrator.on_home_page().await.unwrap().content else {
            panic!("expected home content");
        };
        assert!(home.linked());
    }

    #[test]
    fn non_object_telemetry_is_wrapped() {
        assert_eq!(
            telemetry_body(json!("raw"), None),
            json!({"payload": "raw", "userId": null})
        );
    }
}
