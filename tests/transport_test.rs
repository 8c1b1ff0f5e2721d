//! Transport tests against a recording Mandrill double.

use async_trait::async_trait;
use mandrill_transport::{
    Address, Attachment, Email, MailError, Mailer, MandrillApi, MandrillTransport, MessageOptions,
    RecipientType, SendPayload,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

// ============================================================================
// Recording Double
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Send,
    SendTemplate,
}

struct RecordingMandrill {
    response: Result<Value, MailError>,
    calls: Mutex<Vec<(Endpoint, SendPayload)>>,
}

impl RecordingMandrill {
    fn responding(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(response),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn failing(error: MailError) -> Arc<Self> {
        Arc::new(Self {
            response: Err(error),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn with_status(status: &str) -> Arc<Self> {
        Self::responding(json!([{"_id": "fake-id", "status": status}]))
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.calls.lock().iter().map(|(e, _)| *e).collect()
    }

    fn last_payload(&self) -> SendPayload {
        self.calls.lock().last().expect("no call recorded").1.clone()
    }

    fn record(&self, endpoint: Endpoint, payload: &SendPayload) -> Result<Value, MailError> {
        self.calls.lock().push((endpoint, payload.clone()));
        self.response.clone()
    }
}

#[async_trait]
impl MandrillApi for RecordingMandrill {
    async fn send(&self, payload: &SendPayload) -> Result<Value, MailError> {
        self.record(Endpoint::Send, payload)
    }

    async fn send_template(&self, payload: &SendPayload) -> Result<Value, MailError> {
        self.record(Endpoint::SendTemplate, payload)
    }
}

fn transport(api: &Arc<RecordingMandrill>) -> MandrillTransport<Arc<RecordingMandrill>> {
    MandrillTransport::with_api(Arc::clone(api))
}

fn bikini_bottom_email() -> Email {
    Email::new()
        .to("SpongeBob SquarePants <spongebob@bikini.bottom>, Patrick Star <patrick@bikini.bottom>")
        .cc("Squidward Tentacles <squidward@bikini.bottom>, Sandy Cheeks <sandy@bikini.bottom>")
        .bcc("Mr. Krabs <krabs@bikini.bottom>, Plankton <plankton@bikini.bottom>")
        .from("Gary the Snail <gary@bikini.bottom>")
        .subject("Meow...")
        .text_body("Meow!")
        .html_body("<p>Meow!</p>")
}

// ============================================================================
// Payload Tests
// ============================================================================

#[tokio::test]
async fn builds_message_with_all_recipients() {
    let api = RecordingMandrill::with_status("sent");
    transport(&api).send(&bikini_bottom_email()).await.unwrap();

    let payload = api.last_payload();
    let message = &payload["message"];
    let to = message["to"].as_array().unwrap();
    assert_eq!(to.len(), 6);

    let expected = [
        ("SpongeBob SquarePants", "spongebob@bikini.bottom", None),
        ("Patrick Star", "patrick@bikini.bottom", None),
        ("Squidward Tentacles", "squidward@bikini.bottom", Some("cc")),
        ("Sandy Cheeks", "sandy@bikini.bottom", Some("cc")),
        ("Mr. Krabs", "krabs@bikini.bottom", Some("bcc")),
        ("Plankton", "plankton@bikini.bottom", Some("bcc")),
    ];
    for (entry, (name, email, kind)) in to.iter().zip(expected) {
        assert_eq!(entry["name"], name);
        assert_eq!(entry["email"], email);
        assert_eq!(entry["type"].as_str(), kind);
    }

    assert_eq!(message["from_name"], "Gary the Snail");
    assert_eq!(message["from_email"], "gary@bikini.bottom");
    assert_eq!(message["subject"], "Meow...");
    assert_eq!(message["text"], "Meow!");
    assert_eq!(message["html"], "<p>Meow!</p>");
}

#[tokio::test]
async fn three_recipient_scenario() {
    let api = RecordingMandrill::with_status("sent");
    let email = Email::new()
        .to("A <a@x.com>, B <b@x.com>")
        .cc("C <c@x.com>")
        .from("D <d@x.com>")
        .subject("S")
        .text_body("T");
    transport(&api).send(&email).await.unwrap();

    let payload = api.last_payload();
    let to = payload["message"]["to"].as_array().unwrap();
    assert_eq!(to.len(), 3);
    assert!(to[0].get("type").is_none());
    assert!(to[1].get("type").is_none());
    assert_eq!(to[2]["type"], "cc");
    assert_eq!(payload["message"]["from_name"], "D");
    assert_eq!(payload["message"]["from_email"], "d@x.com");
}

#[tokio::test]
async fn resolved_flags_are_always_present() {
    let api = RecordingMandrill::with_status("sent");
    transport(&api).send(&Email::new().to("a@x.com")).await.unwrap();

    let payload = api.last_payload();
    assert_eq!(payload["async"], false);
    let message = &payload["message"];
    for flag in [
        "important",
        "track_opens",
        "track_clicks",
        "auto_text",
        "auto_html",
        "inline_css",
        "url_strip_qs",
        "preserve_recipients",
        "view_content_link",
        "merge",
    ] {
        assert_eq!(message[flag], false, "{flag}");
    }
    assert_eq!(message["tags"], json!([]));
    assert_eq!(message["metadata"], json!({}));
    assert_eq!(message["recipient_metadata"], json!([]));
    assert!(message.get("from_email").is_none());
}

#[tokio::test]
async fn call_options_beat_transport_defaults() {
    let api = RecordingMandrill::with_status("sent");
    let transport = transport(&api)
        .async_send(true)
        .preserve_recipients(true)
        .track_opens(true)
        .tags(["default"]);

    let email = Email::new()
        .to("a@x.com")
        .provider_option("async", false)
        .provider_option("track_opens", true)
        .message_option("track_opens", false)
        .provider_option("tags", vec!["call"]);
    transport.send(&email).await.unwrap();

    let payload = api.last_payload();
    assert_eq!(payload["async"], false);
    assert_eq!(payload["message"]["preserve_recipients"], true);
    assert_eq!(payload["message"]["track_opens"], false);
    assert_eq!(payload["message"]["tags"], json!(["call"]));
}

#[tokio::test]
async fn defaults_from_config_struct() {
    let api = RecordingMandrill::with_status("sent");
    let defaults: MessageOptions = serde_json::from_value(json!({
        "important": true,
        "metadata": {"website": "krusty.krab"},
        "subaccount": "kitchen"
    }))
    .unwrap();
    transport(&api)
        .defaults(defaults)
        .send(&Email::new().to("a@x.com"))
        .await
        .unwrap();

    let message = api.last_payload()["message"].clone();
    assert_eq!(message["important"], true);
    assert_eq!(message["metadata"], json!({"website": "krusty.krab"}));
    assert_eq!(message["subaccount"], "kitchen");
}

#[tokio::test]
async fn unknown_nested_message_fields_pass_through() {
    let api = RecordingMandrill::with_status("sent");
    let email = Email::new()
        .to("a@x.com")
        .message_option("future_field", json!({"x": 1}));
    transport(&api).send(&email).await.unwrap();

    assert_eq!(api.last_payload()["message"]["future_field"], json!({"x": 1}));
}

#[tokio::test]
async fn default_attachments_come_before_call_attachments() {
    let api = RecordingMandrill::with_status("sent");
    let transport = transport(&api)
        .default_attachment(Attachment::from_text("terms.txt", "terms"))
        .default_attachment(Attachment::from_bytes("logo.png", vec![1, 2, 3]).inline());

    let email = Email::new()
        .to("a@x.com")
        .attachment(Attachment::from_text("menu.csv", "patty,1").content_type("text/csv"));
    transport.send(&email).await.unwrap();
    transport.send(&Email::new().to("b@x.com")).await.unwrap();

    let calls = api.calls.lock();
    let first = &calls[0].1["message"];
    assert_eq!(
        first["attachments"],
        json!([
            {"type": "text/plain", "name": "terms.txt", "content": "dGVybXM="},
            {"type": "text/csv", "name": "menu.csv", "content": "cGF0dHksMQ=="}
        ])
    );
    assert_eq!(
        first["images"],
        json!([{"type": "image/png", "name": "logo.png", "content": "AQID"}])
    );

    // Call attachments do not leak into later sends.
    let second = &calls[1].1["message"];
    assert_eq!(second["attachments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unreadable_attachment_fails_before_calling_mandrill() {
    let path = std::env::temp_dir().join(format!("mandrill-gone-{}.txt", std::process::id()));
    std::fs::write(&path, b"soon gone").unwrap();
    let attachment = Attachment::from_path_lazy(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let api = RecordingMandrill::with_status("sent");
    let result = transport(&api)
        .send(&Email::new().to("a@x.com").attachment(attachment))
        .await;

    assert!(matches!(result, Err(MailError::AttachmentFileNotFound(_))));
    assert!(api.endpoints().is_empty());
}

#[tokio::test]
async fn reply_to_becomes_header() {
    let api = RecordingMandrill::with_status("sent");
    let email = Email::new()
        .to("a@x.com")
        .reply_to(("Mr. Krabs", "krabs@krusty.krab"))
        .header("X-Order", "42");
    transport(&api).send(&email).await.unwrap();

    let headers = api.last_payload()["message"]["headers"].clone();
    assert_eq!(headers["Reply-To"], "Mr. Krabs <krabs@krusty.krab>");
    assert_eq!(headers["X-Order"], "42");
}

// ============================================================================
// Response Classification Tests
// ============================================================================

#[tokio::test]
async fn accepted_statuses() {
    for status in ["sent", "queued", "scheduled"] {
        let api = RecordingMandrill::with_status(status);
        let outcome = transport(&api).send(&bikini_bottom_email()).await.unwrap();

        assert_eq!(api.endpoints(), vec![Endpoint::Send], "{status}");
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.rejected.len(), 0);
        assert_eq!(outcome.message_id.as_deref(), Some("fake-id"));
    }
}

#[tokio::test]
async fn rejected_statuses() {
    for status in ["invalid", "rejected"] {
        let api = RecordingMandrill::with_status(status);
        let outcome = transport(&api).send(&bikini_bottom_email()).await.unwrap();

        assert_eq!(api.endpoints(), vec![Endpoint::Send], "{status}");
        assert_eq!(outcome.accepted.len(), 0);
        assert_eq!(outcome.rejected.len(), 1);
    }
}

#[tokio::test]
async fn partial_rejection_is_not_an_error() {
    let api = RecordingMandrill::responding(json!([
        {"_id": "m1", "email": "a@x.com", "status": "sent"},
        {"_id": "m2", "email": "b@x.com", "status": "invalid"}
    ]));
    let outcome = transport(&api)
        .send(&Email::new().to("a@x.com, b@x.com"))
        .await
        .unwrap();

    assert_eq!(outcome.message_id.as_deref(), Some("m1"));
    assert_eq!(outcome.accepted[0].id.as_deref(), Some("m1"));
    assert_eq!(outcome.rejected[0].id.as_deref(), Some("m2"));
    assert!(outcome.has_rejections());
}

#[tokio::test]
async fn single_object_response_is_classified() {
    let api = RecordingMandrill::responding(json!({"_id": "solo", "status": "queued"}));
    let outcome = transport(&api).send(&Email::new().to("a@x.com")).await.unwrap();
    assert_eq!(outcome.message_id.as_deref(), Some("solo"));
    assert_eq!(outcome.accepted.len(), 1);
}

#[tokio::test]
async fn empty_response_has_no_message_id() {
    let api = RecordingMandrill::responding(json!([]));
    let outcome = transport(&api).send(&Email::new().to("a@x.com")).await.unwrap();
    assert!(outcome.is_empty());
    assert!(outcome.message_id.is_none());
}

#[tokio::test]
async fn transport_error_is_passed_through() {
    let error = MailError::provider_with_status("mandrill", "[Invalid_Key] Invalid API key", 500);
    let api = RecordingMandrill::failing(error);

    let result = transport(&api).send(&bikini_bottom_email()).await;
    match result {
        Err(MailError::ProviderError {
            provider,
            message,
            status,
        }) => {
            assert_eq!(provider, "mandrill");
            assert_eq!(message, "[Invalid_Key] Invalid API key");
            assert_eq!(status, Some(500));
        }
        other => panic!("expected provider error, got {:?}", other),
    }
    assert_eq!(api.endpoints(), vec![Endpoint::Send]);
}

// ============================================================================
// Override and Template Tests
// ============================================================================

#[tokio::test]
async fn can_override_mandrill_api_options() {
    let api = RecordingMandrill::with_status("sent");
    let email = bikini_bottom_email().mandrill_options(json!({
        "message": {"preserve_recipients": true}
    }));
    transport(&api).send(&email).await.unwrap();

    let payload = api.last_payload();
    assert_eq!(payload["message"]["preserve_recipients"], true);
    // Siblings of the overridden key survive the merge.
    assert_eq!(payload["message"]["subject"], "Meow...");
    assert_eq!(api.endpoints(), vec![Endpoint::Send]);
}

#[tokio::test]
async fn camel_case_override_key_is_accepted() {
    let api = RecordingMandrill::with_status("sent");
    let email: Email = serde_json::from_value(json!({
        "to": "a@x.com",
        "mandrillOptions": {"message": {"important": true}}
    }))
    .unwrap();
    transport(&api).send(&email).await.unwrap();

    assert_eq!(api.last_payload()["message"]["important"], true);
}

#[tokio::test]
async fn template_override_routes_to_send_template() {
    let api = RecordingMandrill::with_status("sent");
    let email = bikini_bottom_email().mandrill_options(json!({
        "template_name": "krusty-krab-newsletter"
    }));
    transport(&api).send(&email).await.unwrap();

    assert_eq!(api.endpoints(), vec![Endpoint::SendTemplate]);
    let payload = api.last_payload();
    assert_eq!(payload.template_name(), Some("krusty-krab-newsletter"));
    assert_eq!(payload["template_content"], json!([]));
    assert_eq!(payload.recipient_count(), 6);
}

#[tokio::test]
async fn template_option_routes_to_send_template() {
    let api = RecordingMandrill::with_status("sent");
    let email = Email::new()
        .to("a@x.com")
        .provider_option("template_name", "welcome")
        .provider_option("template_content", json!([{"name": "main", "content": "Hi"}]));
    transport(&api).send(&email).await.unwrap();

    assert_eq!(api.endpoints(), vec![Endpoint::SendTemplate]);
    assert_eq!(
        api.last_payload()["template_content"],
        json!([{"name": "main", "content": "Hi"}])
    );
}

#[tokio::test]
async fn default_template_applies_until_overridden_with_null() {
    let api = RecordingMandrill::with_status("sent");
    let transport = transport(&api).default_template("house-style");

    transport.send(&Email::new().to("a@x.com")).await.unwrap();
    let plain = Email::new()
        .to("a@x.com")
        .mandrill_options(json!({"template_name": null}));
    transport.send(&plain).await.unwrap();

    assert_eq!(api.endpoints(), vec![Endpoint::SendTemplate, Endpoint::Send]);
}

#[tokio::test]
async fn no_template_uses_plain_send() {
    let api = RecordingMandrill::with_status("sent");
    transport(&api).send(&bikini_bottom_email()).await.unwrap();

    assert_eq!(api.endpoints(), vec![Endpoint::Send]);
    let payload = api.last_payload();
    assert!(!payload.is_template());
    assert!(payload.as_map().get("template_content").is_none());
}

// ============================================================================
// Mailer Trait Tests
// ============================================================================

#[tokio::test]
async fn mailer_deliver_is_send() {
    let api = RecordingMandrill::with_status("queued");
    let mailer: Arc<dyn Mailer> = Arc::new(transport(&api));

    let outcome = mailer.deliver(&bikini_bottom_email()).await.unwrap();
    assert_eq!(outcome.accepted.len(), 1);
    assert_eq!(mailer.provider_name(), "mandrill");
    assert!(mailer.validate_config().is_ok());
}

#[tokio::test]
async fn deliver_many_sends_each_email() {
    let api = RecordingMandrill::with_status("sent");
    let emails = vec![
        Email::new().to("a@x.com"),
        Email::new().to(Address::new("b@x.com").kind(RecipientType::Cc)),
    ];
    let outcomes = transport(&api).deliver_many(&emails).await.unwrap();

    assert_eq!(outcomes.len(), 2);
    let calls = api.calls.lock();
    assert_eq!(calls[1].1["message"]["to"][0]["type"], "cc");
}

#[tokio::test]
async fn concurrent_sends_are_independent() {
    let api = RecordingMandrill::with_status("sent");
    let transport = Arc::new(transport(&api));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move {
                let email = Email::new().to(format!("user{}@x.com", i));
                transport.send(&email).await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(api.endpoints().len(), 8);
}
