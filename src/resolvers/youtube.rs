use async_trait::async_trait;
use regex::Regex;
use reqwest::{header, Client};
use serde_json::Value;

use super::{normalize_link, StreamResolver};
use crate::media::StreamReference;
use crate::Result;

/// Script assignment holding the player configuration on a watch page
const PLAYER_RESPONSE_PATTERN: &str = r"ytInitialPlayerResponse\s*=\s*";

/// Resolves streams by reading the player response embedded in the watch page
pub struct YoutubePageResolver {
    client: Client,
    preferred_qualities: Vec<String>,
    player_response: Regex,
}

impl YoutubePageResolver {
    pub fn new(client: Client, preferred_qualities: Vec<String>) -> Result<Self> {
        Ok(Self {
            client,
            preferred_qualities,
            player_response: Regex::new(PLAYER_RESPONSE_PATTERN)?,
        })
    }

    /// Download the watch page
    async fn fetch_page(&self, link: &str) -> Result<String> {
        tracing::debug!("Fetching watch page: {}", link);

        let response = self
            .client
            .get(link)
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.8")
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            anyhow::bail!("HTTP {}", response.status());
        }

        Ok(response.text().await?)
    }

    /// Locate and parse the embedded player response JSON, if the page has one
    fn extract_player_response(&self, body: &str) -> Result<Option<Value>> {
        let Some(found) = self.player_response.find(body) else {
            return Ok(None);
        };

        let mut values = serde_json::Deserializer::from_str(&body[found.end()..]).into_iter::<Value>();
        match values.next() {
            Some(value) => Ok(Some(value?)),
            None => Ok(None),
        }
    }

    /// Pick the first progressive mp4 format matching the quality preference
    fn select_stream(&self, player_response: &Value, origin: &str) -> Option<StreamReference> {
        let formats = player_response["streamingData"]["formats"].as_array()?;

        self.preferred_qualities.iter().find_map(|quality| {
            formats.iter().find_map(|format| {
                let label = format["qualityLabel"].as_str()?;
                let mime_type = format["mimeType"].as_str()?;
                let url = format["url"].as_str()?;

                (label == quality && mime_type.starts_with("video/mp4"))
                    .then(|| StreamReference::new(url, Some(mime_type.to_string()), origin))
            })
        })
    }
}

#[async_trait]
impl StreamResolver for YoutubePageResolver {
    async fn resolve(&self, link: &str) -> Result<Option<StreamReference>> {
        let link = normalize_link(link)?;
        let body = self.fetch_page(&link).await?;

        let Some(player_response) = self.extract_player_response(&body)? else {
            tracing::debug!("No player response on page: {}", link);
            return Ok(None);
        };

        // Protected videos carry signatures instead of plain URLs
        Ok(self.select_stream(&player_response, &link))
    }

    fn name(&self) -> &'static str {
        "watch page"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver() -> YoutubePageResolver {
        YoutubePageResolver::new(Client::new(), vec!["360p".to_string(), "240p".to_string()]).unwrap()
    }

    fn page(player_response: &str) -> String {
        format!(
            "<html><script>var ytInitialPlayerResponse = {};var meta = {{}};</script></html>",
            player_response
        )
    }

    const FORMATS: &str = r#"{
        "videoDetails": {"title": "A; tricky } title"},
        "streamingData": {"formats": [
            {"qualityLabel": "720p", "mimeType": "video/mp4; codecs=\"avc1\"", "url": "https://cdn/720.mp4"},
            {"qualityLabel": "240p", "mimeType": "video/mp4; codecs=\"avc1\"", "url": "https://cdn/240.mp4"},
            {"qualityLabel": "360p", "mimeType": "video/webm", "url": "https://cdn/360.webm"},
            {"qualityLabel": "360p", "mimeType": "video/mp4; codecs=\"avc1\"", "url": "https://cdn/360.mp4"},
            {"qualityLabel": "144p", "mimeType": "video/mp4"}
        ]}
    }"#;

    #[test]
    fn test_extract_player_response_handles_semicolons_in_strings() {
        let value = resolver().extract_player_response(&page(FORMATS)).unwrap().unwrap();
        assert_eq!(value["videoDetails"]["title"], "A; tricky } title");
    }

    #[test]
    fn test_extract_player_response_missing() {
        assert!(resolver().extract_player_response("<html></html>").unwrap().is_none());
    }

    #[test]
    fn test_extract_player_response_malformed() {
        assert!(resolver().extract_player_response(&page("{\"streamingData\": [")).is_err());
    }

    #[test]
    fn test_select_stream_prefers_quality_order() {
        let value: Value = serde_json::from_str(FORMATS).unwrap();
        let stream = resolver().select_stream(&value, "https://youtu.be/a").unwrap();
        assert_eq!(stream.url, "https://cdn/360.mp4");
        assert_eq!(stream.origin, "https://youtu.be/a");
        assert!(stream.content_type.unwrap().starts_with("video/mp4"));
    }

    #[test]
    fn test_select_stream_without_match() {
        let value: Value = serde_json::from_str(
            r#"{"streamingData": {"formats": [{"qualityLabel": "1080p", "mimeType": "video/mp4", "url": "u"}]}}"#,
        )
        .unwrap();
        assert!(resolver().select_stream(&value, "o").is_none());
        assert!(resolver().select_stream(&Value::Null, "o").is_none());
    }

    #[tokio::test]
    async fn test_resolve_from_served_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/watch"))
            .and(query_param("v", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page(FORMATS)))
            .mount(&server)
            .await;

        let link = format!("{}/watch?v=abc&t=10", server.uri());
        let stream = resolver().resolve(&link).await.unwrap().unwrap();
        assert_eq!(stream.url, "https://cdn/360.mp4");
        assert_eq!(stream.origin, format!("{}/watch?v=abc", server.uri()));
    }

    #[tokio::test]
    async fn test_resolve_non_200_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = resolver()
            .resolve(&format!("{}/watch?v=gone", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
