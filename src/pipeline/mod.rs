use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

mod cleanup;
mod fanout;
mod stages;

pub use cleanup::{TempPayload, TempStore};
pub use fanout::{ConvertJob, DownloadJob, FanOut, StageInput};

use crate::media::{ItemState, MediaItem, Stage, StageMessage};
use crate::metadata::MetadataFetcher;
use crate::progress::{NoopProgress, ProgressEvent, ProgressSink};
use crate::resolvers::StreamResolver;
use crate::transcode::{Encoder, Transcoder};
use crate::transfer::PayloadSource;
use crate::PipelineError;

/// Settings of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Directory receiving the audio artifacts
    pub output_dir: PathBuf,

    /// Directory for temporary payload downloads
    pub temp_dir: PathBuf,

    /// Upper bound on tasks running at once, across a stage
    pub max_concurrent_tasks: usize,
}

impl PipelineSettings {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            temp_dir: std::env::temp_dir(),
            max_concurrent_tasks: 8,
        }
    }

    /// Check the settings and create missing directories.
    ///
    /// Any failure here is fatal for the whole batch.
    pub fn prepare(&self) -> std::result::Result<(), PipelineError> {
        if self.max_concurrent_tasks == 0 {
            return Err(PipelineError::Config(
                "max_concurrent_tasks must be at least 1".to_string(),
            ));
        }

        prepare_dir("output", &self.output_dir)?;
        prepare_dir("temporary", &self.temp_dir)?;
        Ok(())
    }
}

/// Create `dir` if needed and make sure files can be written into it
fn prepare_dir(kind: &str, dir: &Path) -> std::result::Result<(), PipelineError> {
    let unusable = |reason: String| {
        PipelineError::Config(format!("{} directory {} is unusable: {}", kind, dir.display(), reason))
    };

    fs_err::create_dir_all(dir).map_err(|e| unusable(e.to_string()))?;
    if !dir.is_dir() {
        return Err(unusable("not a directory".to_string()));
    }
    tempfile::tempfile_in(dir).map_err(|e| unusable(e.to_string()))?;

    Ok(())
}

/// Terminal outcome of one item
#[derive(Debug)]
pub struct ItemOutcome {
    pub link: String,
    pub result: std::result::Result<PathBuf, PipelineError>,
}

impl ItemOutcome {
    pub fn state(&self) -> ItemState {
        match &self.result {
            Ok(_) => ItemState::Converted,
            Err(err) => err.terminal_state().unwrap_or(ItemState::ResolveFailed),
        }
    }
}

/// Everything a run produced
#[derive(Debug, Default)]
pub struct PipelineResult {
    /// One entry per item that entered the pipeline, in completion order
    pub outcomes: Vec<ItemOutcome>,

    /// Temporary files that could not be removed
    pub cleanup_errors: Vec<PipelineError>,

    /// Number of temporary payload files allocated during the run
    pub temp_files_allocated: usize,
}

impl PipelineResult {
    /// Paths of the produced audio files
    pub fn artifacts(&self) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(PathBuf::as_path))
            .collect()
    }

    /// Per-item errors, in completion order
    pub fn item_errors(&self) -> Vec<&PipelineError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err()).collect()
    }

    /// Per-item errors followed by cleanup errors
    pub fn errors(&self) -> Vec<&PipelineError> {
        let mut errors = self.item_errors();
        errors.extend(self.cleanup_errors.iter());
        errors
    }

    /// Number of items that ended in a failed state
    pub fn failed_items(&self) -> usize {
        self.outcomes.iter().filter(|o| o.state().is_failed()).count()
    }

    pub fn is_success(&self) -> bool {
        self.errors().is_empty()
    }

    fn record(&mut self, progress: &dyn ProgressSink, link: String, result: std::result::Result<PathBuf, PipelineError>) {
        let (success, message) = match &result {
            Ok(path) => (true, path.display().to_string()),
            Err(err) => {
                tracing::warn!("{}", err);
                (false, err.to_string())
            }
        };
        progress.report(ProgressEvent::Finished {
            label: link.clone(),
            success,
            message,
        });
        self.outcomes.push(ItemOutcome { link, result });
    }
}

/// Drives a batch of links through resolve, metadata, download and convert.
///
/// Each stage fans out one task per eligible item and waits for all of them
/// before the next stage starts. Items that fail drop out with their error
/// recorded. Temporary downloads are removed at the end of every run.
pub struct Pipeline {
    settings: PipelineSettings,
    resolver: Arc<dyn StreamResolver>,
    metadata: Arc<dyn MetadataFetcher>,
    source: Arc<dyn PayloadSource>,
    transcoder: Arc<Transcoder>,
    progress: Arc<dyn ProgressSink>,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        resolver: Arc<dyn StreamResolver>,
        metadata: Arc<dyn MetadataFetcher>,
        source: Arc<dyn PayloadSource>,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        let transcoder = Arc::new(Transcoder::new(encoder, settings.output_dir.clone()));
        Self {
            settings,
            resolver,
            metadata,
            source,
            transcoder,
            progress: Arc::new(NoopProgress),
        }
    }

    /// Report progress to `progress` instead of discarding it
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Run the whole batch.
    ///
    /// Only invalid settings fail the call; per-item failures and cleanup
    /// failures are part of the returned [`PipelineResult`].
    pub async fn run(
        &self,
        links: Vec<String>,
        cancel: CancellationToken,
    ) -> std::result::Result<PipelineResult, PipelineError> {
        self.settings.prepare()?;

        let started = Instant::now();
        let fan = FanOut::new(self.settings.max_concurrent_tasks, cancel);
        let mut temp_store = TempStore::new(self.settings.temp_dir.clone());
        let mut result = PipelineResult::default();

        tracing::info!("Starting pipeline for {} link(s)", links.len());

        let items: Vec<MediaItem> = links
            .into_iter()
            .enumerate()
            .map(|(index, link)| MediaItem::new(index, link))
            .collect();

        let resolved = self.resolve_stage(&fan, items, &mut result).await;
        let named = self.metadata_stage(&fan, resolved, &mut result).await;
        let downloaded = self
            .download_stage(&fan, named, &mut temp_store, &mut result)
            .await;
        self.convert_stage(&fan, downloaded, &mut result).await;

        result.temp_files_allocated = temp_store.len();
        result.cleanup_errors = temp_store.release_all().await;

        tracing::info!(
            "Pipeline finished in {}: {} converted, {} failed, {} cleanup error(s)",
            crate::utils::format_duration(started.elapsed().as_secs_f64()),
            result.artifacts().len(),
            result.failed_items(),
            result.cleanup_errors.len()
        );

        Ok(result)
    }

    /// Keep completed items, record failures
    fn collect(
        &self,
        messages: Vec<StageMessage<MediaItem>>,
        result: &mut PipelineResult,
    ) -> Vec<MediaItem> {
        let mut passed = Vec::with_capacity(messages.len());
        for message in messages {
            match message {
                StageMessage::Completed(item) => passed.push(item),
                StageMessage::Failed { link, error } => {
                    result.record(self.progress.as_ref(), link, Err(error))
                }
            }
        }
        passed
    }

    async fn resolve_stage(
        &self,
        fan: &FanOut,
        items: Vec<MediaItem>,
        result: &mut PipelineResult,
    ) -> Vec<MediaItem> {
        let messages = fan
            .run(Stage::Resolve, items, |item| {
                stages::resolve(item, self.resolver.clone(), self.progress.clone())
            })
            .await;

        let mut with_stream = Vec::with_capacity(messages.len());
        for item in self.collect(messages, result) {
            if item.has_stream() {
                with_stream.push(item);
            } else {
                let link = item.source_link().to_string();
                let error = PipelineError::StreamNotFound { link: link.clone() };
                result.record(self.progress.as_ref(), link, Err(error));
            }
        }
        with_stream
    }

    async fn metadata_stage(
        &self,
        fan: &FanOut,
        items: Vec<MediaItem>,
        result: &mut PipelineResult,
    ) -> Vec<MediaItem> {
        let messages = fan
            .run(Stage::Metadata, items, |item| {
                stages::fetch_metadata(item, self.metadata.clone(), self.progress.clone())
            })
            .await;

        self.collect(messages, result)
    }

    async fn download_stage(
        &self,
        fan: &FanOut,
        items: Vec<MediaItem>,
        temp_store: &mut TempStore,
        result: &mut PipelineResult,
    ) -> Vec<MediaItem> {
        let mut jobs = Vec::with_capacity(items.len());
        for item in items {
            let extension = item.stream().map_or("mp4", |s| s.extension());
            match temp_store.allocate(item.source_link(), extension) {
                Ok(temp) => jobs.push(DownloadJob { item, temp }),
                Err(e) => {
                    let link = item.source_link().to_string();
                    let error = PipelineError::Transfer {
                        link: link.clone(),
                        message: format!("failed to create temporary file: {}", e),
                    };
                    result.record(self.progress.as_ref(), link, Err(error));
                }
            }
        }

        let messages = fan
            .run(Stage::Download, jobs, |job| {
                stages::download(job, self.source.clone(), self.progress.clone())
            })
            .await;

        self.collect(messages, result)
    }

    async fn convert_stage(&self, fan: &FanOut, items: Vec<MediaItem>, result: &mut PipelineResult) {
        let planned = {
            let refs: Vec<&MediaItem> = items.iter().collect();
            self.transcoder.plan_outputs(&refs)
        };
        let jobs: Vec<ConvertJob> = items
            .into_iter()
            .zip(planned)
            .map(|(item, output)| ConvertJob { item, output })
            .collect();

        let messages = fan
            .run(Stage::Convert, jobs, |job| {
                stages::convert(job, self.transcoder.clone(), self.progress.clone())
            })
            .await;

        for item in self.collect(messages, result) {
            let link = item.source_link().to_string();
            match item.output_path() {
                Some(path) => result.record(self.progress.as_ref(), link, Ok(path.to_path_buf())),
                None => {
                    let error = PipelineError::Encode {
                        link: link.clone(),
                        message: "no output path recorded".to_string(),
                    };
                    result.record(self.progress.as_ref(), link, Err(error));
                }
            }
        }
    }
}
