use async_trait::async_trait;
use postbox::jobs::{Dispatcher, Handler, Stage};
use postbox::mail::{
    Email, EmailBody, MailError, MailHandler, MailJob, Mailer, MemoryMailer, Templates,
};
use serde_json::json;

struct DownMailer;

#[async_trait]
impl Mailer for DownMailer {
    async fn send(&self, _email: &Email) -> Result<(), MailError> {
        Err(MailError::Smtp("connection refused".into()))
    }
}

fn templates() -> Templates {
    let mut templates = Templates::new();
    templates
        .add(
            "confirmation-email.html",
            "<p>Activate: <a href=\"{{ message }}\">link</a></p>",
        )
        .unwrap();
    templates
        .add("confirmation-email.txt", "Activate: {{ message }}")
        .unwrap();
    templates
}

#[tokio::test]
async fn raw_data_is_sent_as_text_body() {
    let mailer = MemoryMailer::new();
    let handler = MailHandler::new(mailer.clone(), templates());

    let job = MailJob::builder()
        .to("user@example.com")
        .subject("Failed login attempt")
        .data("Invalid login attempt")
        .build()
        .unwrap();
    handler.handle(job).await.unwrap();

    let sent = mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "user@example.com");
    assert_eq!(sent[0].subject, "Failed login attempt");
    assert_eq!(sent[0].from, None);
    assert_eq!(sent[0].body, EmailBody::Text("Invalid login attempt".into()));
}

#[tokio::test]
async fn structured_data_without_template_is_sent_as_json() {
    let mailer = MemoryMailer::new();
    let handler = MailHandler::new(mailer.clone(), Templates::new());

    let job = MailJob::builder()
        .to("ops@example.com")
        .data(json!({ "event": "deploy" }))
        .build()
        .unwrap();
    handler.handle(job).await.unwrap();

    let sent = mailer.sent().await;
    let EmailBody::Text(text) = &sent[0].body else {
        panic!("expected a text body");
    };
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(text).unwrap(),
        json!({ "event": "deploy" })
    );
}

#[tokio::test]
async fn named_template_renders_multipart_body() {
    let mailer = MemoryMailer::new();
    let handler = MailHandler::new(mailer.clone(), templates());

    let job = MailJob::builder()
        .to("new@example.com")
        .from("welcome@example.com")
        .subject("Activate Your Account")
        .template("confirmation-email")
        .data("https://example.com/activate?token=abc")
        .build()
        .unwrap();
    handler.handle(job).await.unwrap();

    let sent = mailer.sent().await;
    assert_eq!(sent[0].from.as_deref(), Some("welcome@example.com"));
    match &sent[0].body {
        EmailBody::Multipart { text, html } => {
            assert_eq!(text, "Activate: https://example.com/activate?token=abc");
            assert!(html.starts_with("<p>Activate: <a href="));
            assert!(html.contains("token=abc"));
        }
        other => panic!("expected multipart body, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_template_fails_at_render_stage() {
    let mailer = MemoryMailer::new();
    let handler = MailHandler::new(mailer.clone(), templates());

    let job = MailJob::builder()
        .to("user@example.com")
        .subject("Invoice")
        .template("invoice")
        .build()
        .unwrap();
    let failure = handler.handle(job).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Render);
    assert_eq!(failure.recipient, "user@example.com");
    assert_eq!(failure.subject, "Invoice");
    assert!(failure.to_string().contains("template not found: invoice"));
    assert!(mailer.sent().await.is_empty());
}

#[tokio::test]
async fn attachments_are_loaded_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let invoice = dir.path().join("invoice.txt");
    let terms = dir.path().join("terms.pdf");
    std::fs::write(&invoice, "total: 42").unwrap();
    std::fs::write(&terms, b"%PDF-1.4").unwrap();

    let mailer = MemoryMailer::new();
    let handler = MailHandler::new(mailer.clone(), Templates::new());

    let job = MailJob::builder()
        .to("user@example.com")
        .subject("Your invoice")
        .data("Attached.")
        .attach(&invoice)
        .attach(&terms)
        .build()
        .unwrap();
    handler.handle(job).await.unwrap();

    let sent = mailer.sent().await;
    let names: Vec<_> = sent[0]
        .attachments
        .iter()
        .map(|a| (a.filename.as_str(), a.content_type.as_str()))
        .collect();
    assert_eq!(
        names,
        vec![("invoice.txt", "text/plain"), ("terms.pdf", "application/pdf")]
    );
    assert_eq!(sent[0].attachments[0].content, b"total: 42");
}

#[tokio::test]
async fn missing_attachment_fails_at_attach_stage() {
    let dir = tempfile::tempdir().unwrap();
    let mailer = MemoryMailer::new();
    let handler = MailHandler::new(mailer.clone(), Templates::new());

    let job = MailJob::builder()
        .to("user@example.com")
        .data("Attached.")
        .attach(dir.path().join("gone.pdf"))
        .build()
        .unwrap();
    let failure = handler.handle(job).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Attach);
    assert!(mailer.sent().await.is_empty());
}

#[tokio::test]
async fn transport_error_fails_at_deliver_stage() {
    let handler = MailHandler::new(DownMailer, Templates::new());

    let job = MailJob::builder()
        .to("user@example.com")
        .subject("Hello")
        .data("Body")
        .build()
        .unwrap();
    let failure = handler.handle(job).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Deliver);
    assert!(failure.to_string().contains("connection refused"));
}

#[tokio::test]
async fn dispatched_failures_reach_the_error_channel() {
    let mailer = MemoryMailer::new();
    let (dispatcher, worker, mut failures) =
        Dispatcher::builder(MailHandler::new(mailer.clone(), templates())).build();
    tokio::spawn(worker.run());

    let broken = MailJob::builder()
        .to("first@example.com")
        .subject("Broken")
        .template("missing")
        .build()
        .unwrap();
    let fine = MailJob::builder()
        .to("second@example.com")
        .subject("Fine")
        .data("hello")
        .build()
        .unwrap();

    dispatcher.submit(broken).await.unwrap();
    dispatcher.submit(fine).await.unwrap();

    let failure = failures.recv().await.unwrap();
    assert_eq!(failure.stage, Stage::Render);
    assert_eq!(failure.recipient, "first@example.com");

    // Queued jobs are dropped at shutdown, so wait for the second delivery.
    while mailer.sent().await.is_empty() {
        tokio::task::yield_now().await;
    }
    dispatcher.stop().await;

    let sent = mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "second@example.com");
}
