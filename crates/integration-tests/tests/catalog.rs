//! Health probe, model listing and catalog reload

mod harness;

use harness::config::ConfigBuilder;
use harness::server::TestServer;

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let config = ConfigBuilder::new()
        .with_provider("openai", "openai", "http://127.0.0.1:9", Some("k"), &["dall-e-3"])
        .build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server.client().get(server.url("/health")).send().await.unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn health_endpoint_disabled() {
    let config = ConfigBuilder::new()
        .with_provider("openai", "openai", "http://127.0.0.1:9", Some("k"), &["dall-e-3"])
        .without_health()
        .build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server.client().get(server.url("/health")).send().await.unwrap();

    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn models_are_listed_with_full_names() {
    let config = ConfigBuilder::new()
        .with_provider("openai", "openai", "http://127.0.0.1:9", Some("k"), &["dall-e-3"])
        .with_provider("fal", "fal", "http://127.0.0.1:9", Some("k"), &["fal-ai/flux/dev"])
        .build();
    let server = TestServer::start(config).await.unwrap();

    let body: serde_json::Value = server
        .client()
        .get(server.url("/v1/media/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let ids: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(ids, vec!["openai/dall-e-3", "fal/fal-ai/flux/dev"]);
}

#[tokio::test]
async fn reload_swaps_listed_models() {
    let config = ConfigBuilder::new()
        .with_provider("openai", "openai", "http://127.0.0.1:9", Some("k"), &["dall-e-3"])
        .build();
    let server = TestServer::start(config).await.unwrap();

    let reloaded = ConfigBuilder::new()
        .with_provider("openai", "openai", "http://127.0.0.1:9", Some("k"), &["dall-e-3", "gpt-image-1"])
        .build();
    server.media().reload(&reloaded).unwrap();

    let body: serde_json::Value = server
        .client()
        .get(server.url("/v1/media/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}
