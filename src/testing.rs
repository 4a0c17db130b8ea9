//! Scripted backend and reference decoding shared by unit tests.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::{
    backend::{SignupResponse, UnblindApi, UserInfo, UserState},
    render::RenderMode,
};

#[derive(Default)]
struct State {
    signup_times: Vec<Instant>,
    signup_failures_left: usize,
    signup_delay: Duration,
    linked: bool,
    fail_user_state: bool,
    user_state_calls: usize,
    fail_render: bool,
    render_body: Option<String>,
    render_delay: Duration,
    render_requests: Vec<(String, RenderMode)>,
    fail_hash: bool,
    hash_requests: Vec<(String, Value)>,
    fail_uploads: bool,
    uploads: Vec<(String, Value)>,
}

/// In-process [`UnblindApi`] whose behaviour tests script per call type.
#[derive(Default)]
pub(crate) struct MockBackend {
    state: Mutex<State>,
}

impl MockBackend {
    pub const TRANSACTION_HASH: &'static str = "0x9a1f5c0e2b7d4a3c8e6f1b0d2c4a6e8f";
    pub const MESSAGE_HASH: &'static str = "0x5e2d1c0b9a8f7e6d5c4b3a2918273645";
    pub const REMOTE_SVG: &'static str =
        "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 29 29\"><path d=\"\"/></svg>";

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn fail_signup_times(&self, times: usize) {
        self.state().signup_failures_left = times;
    }

    pub fn set_signup_delay(&self, delay: Duration) {
        self.state().signup_delay = delay;
    }

    pub fn set_linked(&self, linked: bool) {
        self.state().linked = linked;
    }

    pub fn fail_user_state(&self, fail: bool) {
        self.state().fail_user_state = fail;
    }

    pub fn fail_render(&self, fail: bool) {
        self.state().fail_render = fail;
    }

    pub fn set_render_body(&self, body: &str) {
        self.state().render_body = Some(body.to_owned());
    }

    pub fn set_render_delay(&self, delay: Duration) {
        self.state().render_delay = delay;
    }

    pub fn fail_hash(&self, fail: bool) {
        self.state().fail_hash = fail;
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.state().fail_uploads = fail;
    }

    pub fn signup_calls(&self) -> usize {
        self.state().signup_times.len()
    }

    pub fn signup_times(&self) -> Vec<Instant> {
        self.state().signup_times.clone()
    }

    pub fn user_state_calls(&self) -> usize {
        self.state().user_state_calls
    }

    pub fn render_requests(&self) -> Vec<(String, RenderMode)> {
        self.state().render_requests.clone()
    }

    pub fn hash_requests(&self) -> Vec<(String, Value)> {
        self.state().hash_requests.clone()
    }

    pub fn uploads(&self) -> Vec<(String, Value)> {
        self.state().uploads.clone()
    }

    /// Waits for detached uploads to land, up to one second.
    pub async fn wait_for_uploads(&self, count: usize) -> Vec<(String, Value)> {
        for _ in 0..100 {
            let uploads = self.uploads();
            if uploads.len() >= count {
                return uploads;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.uploads()
    }
}

#[async_trait]
impl UnblindApi for MockBackend {
    async fn render_qr(&self, data: &str, mode: RenderMode) -> Result<String> {
        let (delay, fail, body) = {
            let mut state = self.state();
            state.render_requests.push((data.to_owned(), mode));
            (state.render_delay, state.fail_render, state.render_body.clone())
        };
        tokio::time::sleep(delay).await;
        if fail {
            return Err(anyhow!("Request failed with status 502 Bad Gateway: upstream down"));
        }
        Ok(body.unwrap_or_else(|| Self::REMOTE_SVG.to_owned()))
    }

    async fn signup(&self) -> Result<SignupResponse> {
        let (n, delay, fail) = {
            let mut state = self.state();
            state.signup_times.push(Instant::now());
            let fail = state.signup_failures_left > 0;
            if fail {
                state.signup_failures_left -= 1;
            }
            (state.signup_times.len(), state.signup_delay, fail)
        };
        tokio::time::sleep(delay).await;
        if fail {
            return Err(anyhow!("signup failure {n}"));
        }
        let user_id = format!("user-{n}");
        Ok(SignupResponse {
            qr_code: format!("qr-{user_id}"),
            bot_link: format!("https://t.me/unblind_bot?start={user_id}"),
            user_id,
        })
    }

    async fn user_info(&self, user_id: &str) -> Result<UserInfo> {
        let linked = self.state().linked;
        Ok(UserInfo {
            user_id: user_id.to_owned(),
            qr_code: format!("qr-{user_id}-fresh"),
            bot_link: format!("https://t.me/unblind_bot?start={user_id}"),
            tg_linked: linked,
        })
    }

    async fn user_state(&self, _user_id: &str) -> Result<UserState> {
        let mut state = self.state();
        state.user_state_calls += 1;
        if state.fail_user_state {
            return Err(anyhow!("Request failed with status 503 Service Unavailable: "));
        }
        Ok(UserState {
            tg_linked: state.linked,
        })
    }

    async fn message_hash(&self, message: &Value) -> Result<String> {
        let mut state = self.state();
        state
            .hash_requests
            .push(("messageHash".to_owned(), message.clone()));
        if state.fail_hash {
            return Err(anyhow!("hash service unavailable"));
        }
        Ok(Self::MESSAGE_HASH.to_owned())
    }

    async fn transaction_hash(&self, transaction: &Value) -> Result<String> {
        let mut state = self.state();
        state
            .hash_requests
            .push(("transactionHash".to_owned(), transaction.clone()));
        if state.fail_hash {
            return Err(anyhow!("hash service unavailable"));
        }
        Ok(Self::TRANSACTION_HASH.to_owned())
    }

    async fn upload_transaction(&self, upload: &Value) -> Result<()> {
        let mut state = self.state();
        if state.fail_uploads {
            return Err(anyhow!("telemetry rejected"));
        }
        state.uploads.push(("transaction".to_owned(), upload.clone()));
        Ok(())
    }

    async fn upload_message(&self, upload: &Value) -> Result<()> {
        let mut state = self.state();
        if state.fail_uploads {
            return Err(anyhow!("telemetry rejected"));
        }
        state.uploads.push(("message".to_owned(), upload.clone()));
        Ok(())
    }
}

/// Decodes the QR code drawn by an SVG document with the `rqrr` reference decoder.
///
/// Understands the unit-square path syntax emitted by the local renderer.
pub(crate) fn decode_svg(svg: &str) -> String {
    let view_box = svg
        .split("viewBox=\"0 0 ")
        .nth(1)
        .and_then(|rest| rest.split(' ').next())
        .expect("svg has no viewBox");
    let dim: usize = view_box.parse().expect("viewBox size is not a number");

    let path = svg
        .split("<path d=\"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .expect("svg has no path");

    let mut dark = vec![false; dim * dim];
    for square in path.split_whitespace() {
        let (x, y) = square
            .strip_prefix('M')
            .and_then(|s| s.strip_suffix("h1v1h-1z"))
            .and_then(|s| s.split_once(','))
            .expect("unexpected path segment");
        let x: usize = x.parse().unwrap();
        let y: usize = y.parse().unwrap();
        dark[y * dim + x] = true;
    }

    // extra quiet zone so codes drawn without a border still decode
    let quiet = 4;
    let scale = 4;
    let pixels = (dim + 2 * quiet) * scale;
    let mut img = rqrr::PreparedImage::prepare_from_greyscale(pixels, pixels, |px, py| {
        let (mx, my) = (px / scale, py / scale);
        let inside = (quiet..quiet + dim).contains(&mx) && (quiet..quiet + dim).contains(&my);
        if inside && dark[(my - quiet) * dim + (mx - quiet)] {
            0
        } else {
            255
        }
    });

    let grids = img.detect_grids();
    assert_eq!(grids.len(), 1, "expected exactly one QR code");
    let (_meta, content) = grids[0].decode().expect("reference decoder rejected code");
    content
}
