use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::process::Command;

use super::{normalize_link, StreamResolver};
use crate::media::StreamReference;
use crate::Result;

/// Progressive (audio + video) formats, smallest first
const FORMAT_SELECTOR: &str = "18/worst[ext=mp4][acodec!=none][vcodec!=none]/worst[acodec!=none]";

/// Stream resolver backed by yt-dlp, for videos whose page carries no plain URL
pub struct YtDlpResolver {
    yt_dlp_path: String,
}

impl YtDlpResolver {
    pub fn new(yt_dlp_path: impl Into<String>) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
        }
    }

    /// Get the selected format's information using yt-dlp.
    ///
    /// Returns `None` when the yt-dlp binary is not installed.
    async fn get_format_info(&self, link: &str) -> Result<Option<Value>> {
        tracing::debug!("Asking yt-dlp for a stream of: {}", link);

        let output = Command::new(&self.yt_dlp_path)
            .args(["--dump-json", "--no-playlist", "--format", FORMAT_SELECTOR, link])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("{} is not installed, skipping fallback resolution", self.yt_dlp_path);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed: {}", error.trim());
        }

        let info: Value = serde_json::from_slice(&output.stdout)?;
        Ok(Some(info))
    }
}

/// Build a stream reference from yt-dlp's JSON description of one format
fn stream_from_info(info: &Value, origin: &str) -> Option<StreamReference> {
    let url = info["url"].as_str().filter(|u| !u.is_empty())?;
    let content_type = info["ext"].as_str().map(|ext| format!("video/{}", ext));

    Some(StreamReference::new(url, content_type, origin))
}

#[async_trait]
impl StreamResolver for YtDlpResolver {
    async fn resolve(&self, link: &str) -> Result<Option<StreamReference>> {
        let link = normalize_link(link)?;
        let Some(info) = self.get_format_info(&link).await? else {
            return Ok(None);
        };

        Ok(stream_from_info(&info, &link))
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}
