use shopflow::catalog::{Catalog, CatalogError, CatalogSource, Product};
use shopflow::channel::{
    dispatch_events, parse_webhook_payload, ChannelError, ReplyClient, WebhookEvent,
};
use shopflow::dialogue::Orchestrator;
use shopflow::ledger::SqliteLedger;
use shopflow::provider::{FallbackError, FallbackGenerator};
use shopflow::session::{InMemorySessionStore, UserLocks};
use std::sync::Mutex;

struct FixedCatalog(Catalog);

impl CatalogSource for FixedCatalog {
    fn load(&self) -> Result<Catalog, CatalogError> {
        Ok(self.0.clone())
    }
}

struct StubFallback;

impl FallbackGenerator for StubFallback {
    fn generate(&self, _system_prompt: &str, _user_text: &str) -> Result<String, FallbackError> {
        Ok("ตอบจากระบบช่วยเหลือค่ะ".to_string())
    }
}

#[derive(Default)]
struct RecordingReplyClient {
    sent: Mutex<Vec<(String, String)>>,
    fail_token: Option<String>,
}

impl RecordingReplyClient {
    fn failing_on(token: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_token: Some(token.to_string()),
        }
    }

    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sent lock").clone()
    }
}

impl ReplyClient for RecordingReplyClient {
    fn reply(&self, reply_token: &str, text: &str) -> Result<(), ChannelError> {
        if self.fail_token.as_deref() == Some(reply_token) {
            return Err(ChannelError::ReplyRequest("boom".to_string()));
        }
        self.sent
            .lock()
            .expect("sent lock")
            .push((reply_token.to_string(), text.to_string()));
        Ok(())
    }
}

fn sample_catalog() -> Catalog {
    Catalog {
        products: vec![Product {
            code: "WC100".to_string(),
            name: "รถเข็นไฟฟ้า".to_string(),
            unit_price: 5000,
            shipping_cost: 100,
            category: "mobility".to_string(),
            promotion_ref: None,
            aliases: Vec::new(),
        }],
        ..Catalog::default()
    }
}

fn orchestrator(dir: &tempfile::TempDir) -> Orchestrator {
    Orchestrator::new(
        Box::new(FixedCatalog(sample_catalog())),
        Box::new(InMemorySessionStore::new()),
        Box::new(SqliteLedger::open(&dir.path().join("orders.db")).expect("open ledger")),
        Box::new(StubFallback),
    )
}

fn payload_json() -> &'static str {
    r#"{
        "events": [
            { "type": "follow", "replyToken": "tok-0", "source": { "userId": "u1" } },
            {
                "type": "message",
                "message": { "type": "sticker" },
                "replyToken": "tok-1",
                "source": { "userId": "u1" }
            },
            {
                "type": "message",
                "message": { "type": "text", "text": "รถเข็นไฟฟ้า 2" },
                "replyToken": "tok-2",
                "source": { "userId": "u1" }
            },
            {
                "type": "message",
                "message": { "type": "text", "text": "สวัสดีค่ะ" },
                "replyToken": "tok-3",
                "source": { "userId": "u2" }
            }
        ]
    }"#
}

fn parsed_events() -> Vec<WebhookEvent> {
    parse_webhook_payload(payload_json()).expect("payload").events
}

#[test]
fn camel_case_payload_deserializes() {
    let events = parsed_events();
    assert_eq!(events.len(), 4);
    assert_eq!(events[2].source.user_id, "u1");
    assert_eq!(events[2].reply_token.as_deref(), Some("tok-2"));
    assert_eq!(
        events[2].message.as_ref().and_then(|m| m.text.as_deref()),
        Some("รถเข็นไฟฟ้า 2")
    );
}

#[test]
fn non_text_events_are_skipped_silently() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orchestrator = orchestrator(&dir);
    let replies = RecordingReplyClient::default();
    let locks = UserLocks::new();

    let report = dispatch_events(&orchestrator, &replies, &locks, dir.path(), &parsed_events());
    assert_eq!(report.skipped, 2);
    assert_eq!(report.handled, 2);
    assert_eq!(report.reply_failures, 0);

    let sent = replies.sent();
    assert_eq!(sent.len(), 2);
    // Exactly one reply per handled event, keyed by its reply token.
    let mut tokens: Vec<&str> = sent.iter().map(|(token, _)| token.as_str()).collect();
    tokens.sort_unstable();
    assert_eq!(tokens, vec!["tok-2", "tok-3"]);
}

#[test]
fn one_failing_reply_does_not_abort_sibling_events() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orchestrator = orchestrator(&dir);
    let replies = RecordingReplyClient::failing_on("tok-2");
    let locks = UserLocks::new();

    let report = dispatch_events(&orchestrator, &replies, &locks, dir.path(), &parsed_events());
    assert_eq!(report.handled, 2);
    assert_eq!(report.reply_failures, 1);

    let sent = replies.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "tok-3");
}

#[test]
fn empty_batch_produces_an_empty_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orchestrator = orchestrator(&dir);
    let replies = RecordingReplyClient::default();
    let locks = UserLocks::new();

    let report = dispatch_events(&orchestrator, &replies, &locks, dir.path(), &[]);
    assert_eq!(report.handled, 0);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.reply_failures, 0);
}

#[test]
fn events_with_blank_text_are_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orchestrator = orchestrator(&dir);
    let replies = RecordingReplyClient::default();
    let locks = UserLocks::new();

    let payload = parse_webhook_payload(
        r#"{
            "events": [{
                "type": "message",
                "message": { "type": "text", "text": "   " },
                "replyToken": "tok-1",
                "source": { "userId": "u1" }
            }]
        }"#,
    )
    .expect("payload");
    let report = dispatch_events(&orchestrator, &replies, &locks, dir.path(), &payload.events);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.handled, 0);
    assert!(replies.sent().is_empty());
}

#[test]
fn malformed_payload_is_a_payload_error() {
    let err = parse_webhook_payload("not json").expect_err("bad payload");
    assert!(matches!(err, ChannelError::Payload(_)));
}
