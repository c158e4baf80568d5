use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

use crate::media::MediaItem;
use crate::utils::{link_id, slugify};
use crate::Result;

/// Extension of every produced artifact
pub const AUDIO_EXTENSION: &str = "mp3";

/// External audio encoder, called with an input and an output path
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Encoder running an ffmpeg binary
pub struct FfmpegEncoder {
    ffmpeg_path: String,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, input: &Path, output: &Path) -> Result<()> {
        tracing::debug!("Converting {} to {}", input.display(), output.display());

        let result = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .arg("-y") // Overwrite output file
            .arg("-i")
            .arg(input)
            .arg("-vn") // No video
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to launch {}: {}", self.ffmpeg_path, e))?;

        if !result.status.success() {
            let error = String::from_utf8_lossy(&result.stderr);
            anyhow::bail!("{} exited with {}: {}", self.ffmpeg_path, result.status, error.trim());
        }

        Ok(())
    }
}

/// Converts downloaded payloads into audio artifacts in one output directory
pub struct Transcoder {
    encoder: Arc<dyn Encoder>,
    output_dir: PathBuf,
}

impl Transcoder {
    pub fn new(encoder: Arc<dyn Encoder>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            encoder,
            output_dir: output_dir.into(),
        }
    }

    /// Output path for a display name, with an optional disambiguation suffix
    pub fn output_path(&self, display_name: &str, suffix: Option<&str>) -> PathBuf {
        let stem = match suffix {
            Some(suffix) => format!("{}-{}", slugify(display_name), suffix),
            None => slugify(display_name),
        };
        self.output_dir.join(format!("{}.{}", stem, AUDIO_EXTENSION))
    }

    /// Assign distinct output paths to a batch of items.
    ///
    /// Items are considered in submission order. The first item keeps the bare
    /// slug, later items with the same slug get the link id appended, then a
    /// counter if that is still taken. The returned paths follow `items` order.
    pub fn plan_outputs(&self, items: &[&MediaItem]) -> Vec<PathBuf> {
        let mut order: Vec<usize> = (0..items.len()).collect();
        order.sort_by_key(|&i| items[i].index());

        let mut taken = HashSet::new();
        let mut planned = vec![PathBuf::new(); items.len()];

        for i in order {
            let item = items[i];
            let name = item.display_name();
            let id = link_id(item.source_link()).unwrap_or_else(|| item.index().to_string());

            let mut candidate = self.output_path(name, None);
            if taken.contains(&candidate) {
                candidate = self.output_path(name, Some(&id));
            }
            let mut n = 2;
            while taken.contains(&candidate) {
                candidate = self.output_path(name, Some(&format!("{}-{}", id, n)));
                n += 1;
            }

            taken.insert(candidate.clone());
            planned[i] = candidate;
        }

        planned
    }

    /// Encode the item's downloaded payload into `output`.
    ///
    /// The payload file is left in place.
    pub async fn convert(&self, item: &MediaItem, output: &Path) -> Result<()> {
        let payload = item
            .payload()
            .ok_or_else(|| anyhow::anyhow!("item has no downloaded payload"))?;

        self.encoder.encode(payload.path(), output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::PayloadHandle;

    fn named_item(index: usize, link: &str, name: &str) -> MediaItem {
        let mut item = MediaItem::new(index, link);
        item.mark_named(name);
        item
    }

    #[test]
    fn test_output_path_is_slugged() {
        let transcoder = Transcoder::new(Arc::new(FfmpegEncoder::default()), "/music");
        assert_eq!(
            transcoder.output_path("My Song (Live!)", None),
            PathBuf::from("/music/my-song-live.mp3")
        );
        assert_eq!(
            transcoder.output_path("My Song", Some("abc")),
            PathBuf::from("/music/my-song-abc.mp3")
        );
    }

    #[test]
    fn test_plan_outputs_disambiguates_collisions() {
        let transcoder = Transcoder::new(Arc::new(FfmpegEncoder::default()), "/music");
        let second = named_item(1, "https://www.youtube.com/watch?v=BBB", "Same Title");
        let first = named_item(0, "https://www.youtube.com/watch?v=AAA", "Same Title");
        let third = named_item(2, "https://youtu.be/ccc", "Other");
        let dup = named_item(3, "https://www.youtube.com/watch?v=BBB", "Same Title");

        let planned = transcoder.plan_outputs(&[&second, &first, &third, &dup]);
        assert_eq!(
            planned,
            vec![
                PathBuf::from("/music/same-title-bbb.mp3"),
                PathBuf::from("/music/same-title.mp3"),
                PathBuf::from("/music/other.mp3"),
                PathBuf::from("/music/same-title-bbb-2.mp3"),
            ]
        );
    }

    #[tokio::test]
    async fn test_convert_passes_payload_and_output() {
        let mut encoder = MockEncoder::new();
        encoder
            .expect_encode()
            .withf(|input, output| {
                input == Path::new("/tmp/yt2mp3-1.mp4") && output == Path::new("/music/a.mp3")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let transcoder = Transcoder::new(Arc::new(encoder), "/music");
        let mut item = named_item(0, "https://youtu.be/a", "A");
        item.mark_downloaded(PayloadHandle::new(PathBuf::from("/tmp/yt2mp3-1.mp4"), 10));

        transcoder.convert(&item, Path::new("/music/a.mp3")).await.unwrap();
    }

    #[tokio::test]
    async fn test_convert_without_payload_fails() {
        let mut encoder = MockEncoder::new();
        encoder.expect_encode().never();

        let transcoder = Transcoder::new(Arc::new(encoder), "/music");
        let item = named_item(0, "https://youtu.be/a", "A");
        assert!(transcoder.convert(&item, Path::new("/music/a.mp3")).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_launch_error() {
        let encoder = FfmpegEncoder::new("ffmpeg-binary-that-does-not-exist");
        let err = encoder
            .encode(Path::new("in.mp4"), Path::new("out.mp3"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to launch"));
    }
}
