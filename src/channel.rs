use crate::dialogue::Orchestrator;
use crate::session::UserLocks;
use crate::shared::logging::append_event_log_line;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;

pub const CHANNEL_ACCESS_TOKEN_ENV: &str = "CHANNEL_ACCESS_TOKEN";

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("missing required env var `{0}`")]
    MissingEnvVar(String),
    #[error("invalid webhook payload: {0}")]
    Payload(String),
    #[error("reply request failed: {0}")]
    ReplyRequest(String),
}

/// One inbound webhook event. Only `message` events carrying a text message
/// and a reply token are handled; everything else is skipped silently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub message: Option<EventMessage>,
    #[serde(default)]
    pub reply_token: Option<String>,
    pub source: EventSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookPayload {
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

pub fn parse_webhook_payload(body: &str) -> Result<WebhookPayload, ChannelError> {
    serde_json::from_str(body).map_err(|e| ChannelError::Payload(e.to_string()))
}

/// Outbound reply delivery. Called exactly once per handled event.
pub trait ReplyClient: Send + Sync {
    fn reply(&self, reply_token: &str, text: &str) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone)]
pub struct HttpReplyClient {
    api_base: String,
    access_token: String,
}

impl HttpReplyClient {
    pub fn from_env(api_base: &str) -> Result<Self, ChannelError> {
        let access_token = std::env::var(CHANNEL_ACCESS_TOKEN_ENV)
            .map_err(|_| ChannelError::MissingEnvVar(CHANNEL_ACCESS_TOKEN_ENV.to_string()))?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token,
        })
    }
}

impl ReplyClient for HttpReplyClient {
    fn reply(&self, reply_token: &str, text: &str) -> Result<(), ChannelError> {
        let url = format!("{}/v2/bot/message/reply", self.api_base);
        ureq::post(&url)
            .set("Authorization", &format!("Bearer {}", self.access_token))
            .send_json(json!({
                "replyToken": reply_token,
                "messages": [{ "type": "text", "text": text }],
            }))
            .map_err(|e| ChannelError::ReplyRequest(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub handled: usize,
    pub skipped: usize,
    pub reply_failures: usize,
}

/// Handles one webhook batch. Each qualifying event runs on its own thread
/// with its user's lock held, so the batch processes as a parallel group
/// while same-user messages stay serialized. One event's failure never
/// aborts its siblings; only reply-delivery failures are reported upward,
/// since those are the transport layer's 5xx concern.
pub fn dispatch_events(
    orchestrator: &Orchestrator,
    replies: &dyn ReplyClient,
    locks: &UserLocks,
    state_root: &Path,
    events: &[WebhookEvent],
) -> DispatchReport {
    let mut report = DispatchReport::default();

    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for event in events {
            let Some((reply_token, text)) = qualifying_text(event) else {
                report.skipped += 1;
                let _ = append_event_log_line(
                    state_root,
                    &format!("skip event_type={}", event.event_type),
                );
                continue;
            };
            let user_id = event.source.user_id.clone();
            handles.push(scope.spawn(move || {
                let lock = locks.user_lock(&user_id);
                let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                let reply = orchestrator.handle_message(&user_id, text);
                replies.reply(reply_token, &reply)
            }));
        }

        for handle in handles.drain(..) {
            report.handled += 1;
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    report.reply_failures += 1;
                    let _ = append_event_log_line(state_root, &format!("reply_failure {err}"));
                }
                Err(_) => {
                    report.reply_failures += 1;
                    let _ = append_event_log_line(state_root, "reply_failure handler panicked");
                }
            }
        }
    });

    report
}

fn qualifying_text(event: &WebhookEvent) -> Option<(&str, &str)> {
    if event.event_type != "message" {
        return None;
    }
    let message = event.message.as_ref()?;
    if message.message_type != "text" {
        return None;
    }
    let text = message.text.as_deref()?.trim();
    if text.is_empty() {
        return None;
    }
    Some((event.reply_token.as_deref()?, text))
}
