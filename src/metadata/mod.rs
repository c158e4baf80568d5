use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::media::StreamReference;
use crate::Result;

const DEFAULT_OEMBED_ENDPOINT: &str = "https://www.youtube.com/oembed";

/// Trait for looking up the human-readable name of a resolved stream
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Fetch the display name. A missing or blank name is an error.
    async fn fetch_name(&self, stream: &StreamReference) -> Result<String>;
}

/// oEmbed response, reduced to the fields we read
#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    title: Option<String>,
    author_name: Option<String>,
}

/// Fetches video titles from the oEmbed endpoint
pub struct OEmbedFetcher {
    client: Client,
    endpoint: String,
}

impl OEmbedFetcher {
    pub fn new(client: Client) -> Self {
        Self::with_endpoint(client, DEFAULT_OEMBED_ENDPOINT)
    }

    pub fn with_endpoint(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    fn request_url(&self, origin: &str) -> String {
        format!(
            "{}?url={}&format=json",
            self.endpoint,
            urlencoding::encode(origin)
        )
    }
}

#[async_trait]
impl MetadataFetcher for OEmbedFetcher {
    async fn fetch_name(&self, stream: &StreamReference) -> Result<String> {
        let url = self.request_url(&stream.origin);
        tracing::debug!("Fetching metadata: {}", url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("oEmbed request failed: HTTP {}", response.status());
        }

        let body: OEmbedResponse = response.json().await?;
        let title = body
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow::anyhow!("oEmbed response has no title"))?;

        if let Some(author) = body.author_name {
            tracing::debug!("Resolved \"{}\" by {}", title, author);
        }

        Ok(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn stream() -> StreamReference {
        StreamReference::new(
            "https://cdn/v.mp4",
            None,
            "https://www.youtube.com/watch?v=abc",
        )
    }

    async fn fetcher_with(template: ResponseTemplate) -> (OEmbedFetcher, MockServer) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oembed"))
            .and(query_param("url", "https://www.youtube.com/watch?v=abc"))
            .and(query_param("format", "json"))
            .respond_with(template)
            .mount(&server)
            .await;

        let fetcher = OEmbedFetcher::with_endpoint(Client::new(), format!("{}/oembed", server.uri()));
        (fetcher, server)
    }

    #[tokio::test]
    async fn test_fetch_name() {
        let (fetcher, _server) = fetcher_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"title": "  Never Gonna Give You Up ", "author_name": "Rick Astley"}),
        ))
        .await;

        assert_eq!(fetcher.fetch_name(&stream()).await.unwrap(), "Never Gonna Give You Up");
    }

    #[tokio::test]
    async fn test_blank_title_is_error() {
        let (fetcher, _server) =
            fetcher_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"title": "   "}))).await;

        assert!(fetcher.fetch_name(&stream()).await.is_err());
    }

    #[tokio::test]
    async fn test_http_failure_is_error() {
        let (fetcher, _server) = fetcher_with(ResponseTemplate::new(401)).await;

        let err = fetcher.fetch_name(&stream()).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_error() {
        let (fetcher, _server) = fetcher_with(ResponseTemplate::new(200).set_body_string("<html>")).await;

        assert!(fetcher.fetch_name(&stream()).await.is_err());
    }
}
