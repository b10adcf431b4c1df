//! HTTP embedding provider tests against a local mock gateway.

use httpmock::prelude::*;
use serde_json::json;
use url::Url;

use vectorloom::{EmbeddingError, EmbeddingProvider, HttpEmbeddingProvider};

fn provider_for(server: &MockServer) -> HttpEmbeddingProvider {
    let base = Url::parse(&server.base_url()).unwrap();
    HttpEmbeddingProvider::new(base, "test-key", "test-embedding-model", 3).unwrap()
}

#[tokio::test]
async fn parses_vectors_in_input_order() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/embeddings")
                .header("authorization", "Bearer test-key")
                .json_body_partial(
                    json!({
                        "model": "test-embedding-model",
                        "encoding_format": "float",
                    })
                    .to_string(),
                );
            then.status(200).json_body(json!({
                "data": [
                    // Deliberately out of order; the provider must restore it.
                    { "index": 1, "embedding": [0.0, 1.0, 0.0] },
                    { "index": 0, "embedding": [1.0, 0.0, 0.0] },
                ]
            }));
        })
        .await;

    let provider = provider_for(&server);
    let vectors = provider
        .embed_batch(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
}

#[tokio::test]
async fn rate_limit_is_transient() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(429).body("slow down");
        })
        .await;

    let provider = provider_for(&server);
    let err = provider
        .embed_batch(&["text".to_string()])
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert!(err.to_string().contains("429"));
}

#[tokio::test]
async fn client_error_is_permanent() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(400).body("bad request");
        })
        .await;

    let provider = provider_for(&server);
    let err = provider
        .embed_batch(&["text".to_string()])
        .await
        .unwrap_err();

    assert!(!err.is_transient());
    assert!(matches!(err, EmbeddingError::Permanent { .. }));
}

#[tokio::test]
async fn mismatched_vector_count_is_permanent() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(200).json_body(json!({
                "data": [ { "index": 0, "embedding": [1.0, 0.0, 0.0] } ]
            }));
        })
        .await;

    let provider = provider_for(&server);
    let err = provider
        .embed_batch(&["one".to_string(), "two".to_string()])
        .await
        .unwrap_err();

    assert!(!err.is_transient());
}

#[tokio::test]
async fn empty_batch_skips_the_network() {
    // No mock registered: a request would fail the test with a connect error.
    let server = MockServer::start_async().await;
    let provider = provider_for(&server);

    let vectors = provider.embed_batch(&[]).await.unwrap();
    assert!(vectors.is_empty());
}
