use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

pub mod youtube;
pub mod ytdlp;

use crate::media::StreamReference;
use crate::utils::parse_http_url;
use crate::{PipelineError, Result};

pub use youtube::YoutubePageResolver;
pub use ytdlp::YtDlpResolver;

/// Prefixes of the links the tool accepts
const ACCEPTED_PREFIXES: &[&str] = &[
    "https://www.youtube.com/",
    "https://youtube.com/",
    "https://m.youtube.com/",
    "https://youtu.be/",
];

/// Trait for turning a link into a playable media stream
#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// Resolve a playable stream for a link.
    ///
    /// `Ok(None)` means the resolver finished without finding a usable stream.
    async fn resolve(&self, link: &str) -> Result<Option<StreamReference>>;

    /// Name of this resolver, for logging
    fn name(&self) -> &'static str;
}

/// Tries resolvers in order until one of them finds a stream.
///
/// An error from any resolver ends the chain.
pub struct FallbackResolver {
    resolvers: Vec<Arc<dyn StreamResolver>>,
}

impl FallbackResolver {
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
        }
    }

    /// Append a resolver to the chain
    pub fn with(mut self, resolver: Arc<dyn StreamResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// Names of the chained resolvers, in order
    pub fn list_resolvers(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }
}

impl Default for FallbackResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamResolver for FallbackResolver {
    async fn resolve(&self, link: &str) -> Result<Option<StreamReference>> {
        for resolver in &self.resolvers {
            if let Some(stream) = resolver.resolve(link).await? {
                tracing::debug!("{} resolved a stream for {}", resolver.name(), link);
                return Ok(Some(stream));
            }
            tracing::debug!("{} found no stream for {}", resolver.name(), link);
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "fallback chain"
    }
}

/// Check that a link is a parseable YouTube video link
pub fn validate_link(link: &str) -> std::result::Result<(), PipelineError> {
    let invalid = |message: String| PipelineError::InvalidLink {
        link: link.to_string(),
        message,
    };

    parse_http_url(link).map_err(|e| invalid(e.to_string()))?;

    if !ACCEPTED_PREFIXES.iter().any(|prefix| link.starts_with(prefix)) {
        return Err(invalid(
            "not a YouTube video link. Expected formats: \"https://www.youtube.com/watch?v=<video_id>\" or \"https://youtu.be/<video_id>\"".to_string(),
        ));
    }

    Ok(())
}

/// Split links into accepted ones and one `InvalidLink` error per rejection
pub fn validate_links<S: AsRef<str>>(links: &[S]) -> (Vec<String>, Vec<PipelineError>) {
    let mut accepted = Vec::with_capacity(links.len());
    let mut rejected = Vec::new();

    for link in links {
        let link = link.as_ref().trim();
        match validate_link(link) {
            Ok(()) => accepted.push(link.to_string()),
            Err(err) => rejected.push(err),
        }
    }

    (accepted, rejected)
}

/// Drop every query parameter except the video id `v`
pub fn normalize_link(link: &str) -> Result<String> {
    let mut parsed = Url::parse(link)
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", link))?;

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k == "v")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }

    Ok(parsed.to_string())
}
