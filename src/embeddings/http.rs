//! OpenAI-compatible HTTP embedding provider.
//!
//! Talks to any `/embeddings` endpoint that accepts the OpenAI request shape
//! (OpenAI, qwen behind a proxy, local inference servers). Rate limits and
//! server-side failures classify as transient so the coordinator's retry
//! policy can absorb them; client-side rejections are permanent.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{EmbeddingError, EmbeddingProvider};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Provider backed by an OpenAI-compatible embeddings endpoint.
#[derive(Clone, Debug)]
pub struct HttpEmbeddingProvider {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    dimension: usize,
}

impl HttpEmbeddingProvider {
    /// Creates a provider for `{base_url}/embeddings`.
    pub fn new(
        base_url: Url,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, EmbeddingError> {
        let endpoint = join_endpoint(&base_url)?;
        Ok(Self {
            client: Client::new(),
            endpoint,
            api_key: api_key.into(),
            model: model.into(),
            dimension,
        })
    }

    /// Replaces the HTTP client, e.g. to set timeouts or proxies.
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn classify_status(status: StatusCode, body: String) -> EmbeddingError {
        let message = format!("embedding endpoint returned {status}: {body}");
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            EmbeddingError::transient(message)
        } else {
            EmbeddingError::permanent(message)
        }
    }
}

fn join_endpoint(base_url: &Url) -> Result<Url, EmbeddingError> {
    // Url::join treats "v1" and "v1/" differently; normalize the trailing
    // slash so "…/v1" resolves to "…/v1/embeddings".
    let mut base = base_url.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)
        .and_then(|url| url.join("embeddings"))
        .map_err(|err| EmbeddingError::permanent(format!("invalid embedding base url: {err}")))
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                // Connect/timeout failures are worth retrying; everything
                // else at the transport layer is treated the same way since
                // the request itself is well-formed.
                EmbeddingError::transient(format!("embedding request failed: {err}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|err| {
            EmbeddingError::permanent(format!("malformed embedding response: {err}"))
        })?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::permanent(format!(
                "embedding response contained {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        // The API may return items out of order; restore input order by index.
        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for datum in parsed.data {
            let slot = vectors.get_mut(datum.index).ok_or_else(|| {
                EmbeddingError::permanent(format!(
                    "embedding response index {} out of range",
                    datum.index
                ))
            })?;
            *slot = Some(datum.embedding);
        }

        vectors
            .into_iter()
            .enumerate()
            .map(|(idx, vector)| {
                vector.ok_or_else(|| {
                    EmbeddingError::permanent(format!("embedding response missing index {idx}"))
                })
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_join_handles_missing_trailing_slash() {
        let base = Url::parse("https://api.example.com/v1").unwrap();
        let endpoint = join_endpoint(&base).unwrap();
        assert_eq!(endpoint.as_str(), "https://api.example.com/v1/embeddings");

        let base = Url::parse("https://api.example.com/v1/").unwrap();
        let endpoint = join_endpoint(&base).unwrap();
        assert_eq!(endpoint.as_str(), "https://api.example.com/v1/embeddings");
    }

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        let err =
            HttpEmbeddingProvider::classify_status(StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(err.is_transient());

        let err = HttpEmbeddingProvider::classify_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            String::new(),
        );
        assert!(err.is_transient());

        let err = HttpEmbeddingProvider::classify_status(StatusCode::UNAUTHORIZED, String::new());
        assert!(!err.is_transient());
    }
}
