//! End-to-end generation through the HTTP surface

mod harness;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use harness::config::ConfigBuilder;
use harness::server::TestServer;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n0000";

#[tokio::test]
async fn polled_job_returns_downloaded_image() {
    let provider = MockServer::start().await;
    let base = provider.uri();

    Mock::given(method("POST"))
        .and(path("/v1/flux-pro-1.1"))
        .and(header("x-key", "bfl-key"))
        .and(body_partial_json(json!({ "prompt": "a red fox" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "abc", "status": "Pending" })))
        .expect(1)
        .mount(&provider)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/get_result"))
        .and(query_param("id", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "queued" })))
        .up_to_n_times(1)
        .mount(&provider)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/get_result"))
        .and(query_param("id", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Ready",
            "result": { "sample": format!("{base}/delivery/abc.png") }
        })))
        .mount(&provider)
        .await;

    Mock::given(method("GET"))
        .and(path("/delivery/abc.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PNG.to_vec(), "image/png"))
        .expect(1)
        .mount(&provider)
        .await;

    let config = ConfigBuilder::new()
        .with_provider("bfl", "bfl", &base, Some("bfl-key"), &["flux-pro-1.1"])
        .with_grant("alice", &["bfl"])
        .build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .generate(Some("alice"), json!({ "model": "bfl/flux-pro-1.1", "prompt": "a red fox" }))
        .await;

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/png");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), PNG);
}

#[tokio::test]
async fn inline_base64_reply_is_decoded() {
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/images/generations"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": "dall-e-3", "size": "1024x1024" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "b64_json": STANDARD.encode(PNG) }]
        })))
        .expect(1)
        .mount(&provider)
        .await;

    let config = ConfigBuilder::new()
        .with_provider("openai", "openai", &provider.uri(), Some("sk-test"), &["dall-e-3"])
        .open_access()
        .build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .generate(
            None,
            json!({
                "model": "openai/dall-e-3",
                "prompt": "a lighthouse",
                "size": { "width": 1024, "height": 1024 }
            }),
        )
        .await;

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/png");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), PNG);
}

#[tokio::test]
async fn several_items_come_back_as_json() {
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/images/generations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "b64_json": STANDARD.encode(b"one") }, { "b64_json": STANDARD.encode(b"two") }]
        })))
        .mount(&provider)
        .await;

    let config = ConfigBuilder::new()
        .with_provider("openai", "openai", &provider.uri(), Some("sk-test"), &["dall-e-2"])
        .open_access()
        .build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .generate(None, json!({ "model": "openai/dall-e-2", "prompt": "twins", "count": 2 }))
        .await;

    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[1]["b64_json"], STANDARD.encode(b"two"));
}

#[tokio::test]
async fn provider_error_status_passes_through() {
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&provider)
        .await;

    let config = ConfigBuilder::new()
        .with_provider("openai", "openai", &provider.uri(), Some("sk-test"), &["dall-e-3"])
        .open_access()
        .build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .generate(None, json!({ "model": "openai/dall-e-3", "prompt": "a lighthouse" }))
        .await;

    assert_eq!(resp.status(), 429);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "api_error");
    assert!(body["error"]["message"].as_str().unwrap().contains("rate limited"));
}

#[tokio::test]
async fn unknown_provider_and_model_are_not_found() {
    let config = ConfigBuilder::new()
        .with_provider("openai", "openai", "http://127.0.0.1:9", Some("sk-test"), &["dall-e-3"])
        .open_access()
        .build();
    let server = TestServer::start(config).await.unwrap();

    for model in ["midjourney/v6", "openai/dall-e-9"] {
        let resp = server.generate(None, json!({ "model": model, "prompt": "x" })).await;
        assert_eq!(resp.status(), 404, "{model}");

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["type"], "not_found_error");
    }
}

#[tokio::test]
async fn empty_prompt_is_rejected() {
    let config = ConfigBuilder::new()
        .with_provider("openai", "openai", "http://127.0.0.1:9", Some("sk-test"), &["dall-e-3"])
        .open_access()
        .build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .generate(None, json!({ "model": "openai/dall-e-3", "prompt": "  " }))
        .await;

    assert_eq!(resp.status(), 400);
}
