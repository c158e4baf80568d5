use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use reqwest::Client;
use std::io;
use std::pin::Pin;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::media::StreamReference;
use crate::Result;

/// Chunks of a remote payload
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// An opened payload stream
pub struct OpenedStream {
    pub body: ByteStream,

    /// Total size, when the remote side announced it
    pub content_length: Option<u64>,
}

/// Trait for opening the remote payload behind a stream reference
#[async_trait]
pub trait PayloadSource: Send + Sync {
    async fn open_stream(&self, stream: &StreamReference) -> Result<OpenedStream>;
}

/// Streams payloads over HTTP
pub struct HttpPayloadSource {
    client: Client,
}

impl HttpPayloadSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PayloadSource for HttpPayloadSource {
    async fn open_stream(&self, stream: &StreamReference) -> Result<OpenedStream> {
        let response = self.client.get(&stream.url).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download payload: HTTP {}", response.status());
        }

        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));

        Ok(OpenedStream {
            body: Box::pin(body),
            content_length,
        })
    }
}

/// Copy every chunk of `opened` into `writer`, calling `on_bytes` with the
/// running total after each chunk. Returns the number of bytes written.
///
/// Bytes already written stay in `writer` when the copy fails.
pub async fn copy_to_file<W, F>(opened: OpenedStream, writer: &mut W, mut on_bytes: F) -> Result<u64>
where
    W: AsyncWrite + Unpin,
    F: FnMut(u64, Option<u64>),
{
    let OpenedStream {
        mut body,
        content_length,
    } = opened;
    let mut transferred = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        transferred += chunk.len() as u64;
        on_bytes(transferred, content_length);
    }

    writer.flush().await?;
    Ok(transferred)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn opened(chunks: Vec<io::Result<Bytes>>) -> OpenedStream {
        OpenedStream {
            body: Box::pin(stream::iter(chunks)),
            content_length: Some(6),
        }
    }

    #[tokio::test]
    async fn test_copy_reports_monotonic_progress() {
        let mut out = Vec::new();
        let mut seen = Vec::new();

        let written = copy_to_file(
            opened(vec![Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"def"))]),
            &mut out,
            |n, total| seen.push((n, total)),
        )
        .await
        .unwrap();

        assert_eq!(written, 6);
        assert_eq!(out, b"abcdef");
        assert_eq!(seen, vec![(3, Some(6)), (6, Some(6))]);
    }

    #[tokio::test]
    async fn test_copy_failure_keeps_partial_bytes() {
        let mut out = Vec::new();

        let result = copy_to_file(
            opened(vec![
                Ok(Bytes::from_static(b"abc")),
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            ]),
            &mut out,
            |_, _| {},
        )
        .await;

        assert!(result.is_err());
        assert_eq!(out, b"abc");
    }

    #[tokio::test]
    async fn test_http_source_streams_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let source = HttpPayloadSource::new(Client::new());
        let reference = StreamReference::new(format!("{}/video.mp4", server.uri()), None, "o");
        let opened = source.open_stream(&reference).await.unwrap();
        assert_eq!(opened.content_length, Some(4096));

        let mut out = Vec::new();
        let written = copy_to_file(opened, &mut out, |_, _| {}).await.unwrap();
        assert_eq!(written, 4096);
    }

    #[tokio::test]
    async fn test_http_source_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let source = HttpPayloadSource::new(Client::new());
        let reference = StreamReference::new(format!("{}/video.mp4", server.uri()), None, "o");
        let err = source.open_stream(&reference).await.err().unwrap();
        assert!(err.to_string().contains("403"));
    }
}
