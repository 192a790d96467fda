// tests/remote_classifier.rs
//
// Remote backends against a local stub: request shape, strict parsing and the
// neutral fallback when the reply is unusable.

mod common;

use news_sentiment_pipeline::classify::{Classifier, Provenance};
use news_sentiment_pipeline::config::{BackendKind, ClassifierConfig};
use news_sentiment_pipeline::{Sentiment, SentimentLabel};

fn cfg(backend: BackendKind, base: &str) -> ClassifierConfig {
    ClassifierConfig {
        backend,
        endpoint: Some(base.to_string()),
        api_key: Some("test-key".into()),
        ..Default::default()
    }
}

fn chat_reply(content: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
    })
    .to_string()
}

#[tokio::test]
async fn openai_verdict_is_used() {
    let stub = common::serve(vec![(
        200,
        chat_reply(r#"{"label": "negative", "score": -0.7}"#),
    )])
    .await;
    let clf = Classifier::from_config(&cfg(BackendKind::OpenAi, &stub.base)).unwrap();

    let out = clf
        .classify_detailed("Chipmaker shares plunge after profit warning")
        .await;
    assert_eq!(out.provenance, Provenance::Backend);
    assert_eq!(out.sentiment.label, SentimentLabel::Negative);
    assert_eq!(out.sentiment.score, -0.7);

    let reqs = stub.requests();
    assert_eq!(reqs.len(), 1);
    assert!(reqs[0].request_line.starts_with("POST /v1/chat/completions"));
    assert_eq!(reqs[0].header("authorization"), Some("Bearer test-key"));
    let body: serde_json::Value = serde_json::from_str(&reqs[0].body).unwrap();
    assert_eq!(body["model"], "gpt-4o-mini");
    assert!(body["messages"][1]["content"]
        .as_str()
        .unwrap()
        .contains("profit warning"));
}

#[tokio::test]
async fn malformed_reply_falls_back_to_neutral() {
    let stub = common::serve(vec![(200, chat_reply("I think this is quite negative."))]).await;
    let clf = Classifier::from_config(&cfg(BackendKind::OpenAi, &stub.base)).unwrap();

    let out = clf.classify_detailed("Regulators open inquiry into lender").await;
    assert_eq!(out.provenance, Provenance::Fallback);
    assert_eq!(out.sentiment, Sentiment::NEUTRAL);
}

#[tokio::test]
async fn server_error_falls_back_to_neutral() {
    let stub = common::serve(vec![(500, r#"{"error":"boom"}"#.to_string())]).await;
    let clf = Classifier::from_config(&cfg(BackendKind::OpenAi, &stub.base)).unwrap();
    assert_eq!(
        clf.classify("Regulators open inquiry into lender").await,
        Sentiment::NEUTRAL
    );
}

#[tokio::test]
async fn non_json_body_falls_back_to_neutral() {
    let stub = common::serve(vec![(200, "<html>gateway</html>".to_string())]).await;
    let clf = Classifier::from_config(&cfg(BackendKind::OpenAi, &stub.base)).unwrap();
    let out = clf.classify_detailed("Regulators open inquiry into lender").await;
    assert_eq!(out.provenance, Provenance::Fallback);
}

#[tokio::test]
async fn short_text_never_reaches_the_network() {
    let stub = common::serve(vec![(200, chat_reply(r#"{"label":"positive","score":0.9}"#))]).await;
    let clf = Classifier::from_config(&cfg(BackendKind::OpenAi, &stub.base)).unwrap();

    let out = clf.classify_detailed(" AI ").await;
    assert_eq!(out.provenance, Provenance::ShortText);
    assert_eq!(out.sentiment, Sentiment::NEUTRAL);
    assert!(stub.requests().is_empty());
}

#[tokio::test]
async fn gemini_reply_is_parsed() {
    let reply = serde_json::json!({
        "candidates": [{
            "content": { "parts": [{ "text": "```json\n{\"label\":\"positive\",\"score\":0.55}\n```" }] }
        }]
    })
    .to_string();
    let stub = common::serve(vec![(200, reply)]).await;
    let clf = Classifier::from_config(&cfg(BackendKind::Gemini, &stub.base)).unwrap();

    let s = clf.classify("Startup wins landmark AI contract").await;
    assert_eq!(s.label, SentimentLabel::Positive);
    assert_eq!(s.score, 0.55);

    let reqs = stub.requests();
    assert!(reqs[0]
        .request_line
        .starts_with("POST /v1beta/models/gemini-2.5-flash:generateContent"));
    assert_eq!(reqs[0].header("x-goog-api-key"), Some("test-key"));
}

#[tokio::test]
async fn batch_keeps_going_after_a_failed_item() {
    let stub = common::serve(vec![
        (200, chat_reply("not json")),
        (200, chat_reply(r#"{"label":"positive","score":0.3}"#)),
    ])
    .await;
    let clf = Classifier::from_config(&cfg(BackendKind::OpenAi, &stub.base)).unwrap();

    let started = std::time::Instant::now();
    let a = clf.classify("First headline about markets").await;
    let b = clf.classify("Second headline about markets").await;
    assert_eq!(a, Sentiment::NEUTRAL);
    assert_eq!(b.label, SentimentLabel::Positive);
    // Second call waits out the rate-limit floor.
    assert!(started.elapsed() >= std::time::Duration::from_millis(1_000));
}
