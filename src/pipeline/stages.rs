//! Per-item stage tasks. Each takes ownership of one item, applies one
//! transition and hands the item back in a [`StageMessage`].

use std::sync::Arc;

use super::fanout::{ConvertJob, DownloadJob};
use crate::media::{MediaItem, PayloadHandle, Stage, StageMessage};
use crate::metadata::MetadataFetcher;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::resolvers::StreamResolver;
use crate::transcode::Transcoder;
use crate::transfer::{copy_to_file, PayloadSource};
use crate::PipelineError;

fn report_step(progress: &dyn ProgressSink, stage: Stage, item: &MediaItem) {
    progress.report(ProgressEvent::Step {
        stage,
        label: item.source_link().to_string(),
        current: stage.step(),
        total: Stage::ALL.len() as u64,
    });
}

fn stage_failure<T>(stage: Stage, item: &MediaItem, err: anyhow::Error) -> StageMessage<T> {
    let link = item.source_link();
    tracing::debug!("{} failed for {}: {:#}", stage, link, err);
    StageMessage::failed(link, PipelineError::from_stage(stage, link, &err))
}

pub async fn resolve(
    mut item: MediaItem,
    resolver: Arc<dyn StreamResolver>,
    progress: Arc<dyn ProgressSink>,
) -> StageMessage<MediaItem> {
    report_step(progress.as_ref(), Stage::Resolve, &item);

    match resolver.resolve(item.source_link()).await {
        Ok(stream) => {
            item.mark_resolved(stream);
            StageMessage::Completed(item)
        }
        Err(err) => stage_failure(Stage::Resolve, &item, err),
    }
}

pub async fn fetch_metadata(
    mut item: MediaItem,
    fetcher: Arc<dyn MetadataFetcher>,
    progress: Arc<dyn ProgressSink>,
) -> StageMessage<MediaItem> {
    report_step(progress.as_ref(), Stage::Metadata, &item);

    let Some(stream) = item.stream() else {
        return stage_failure(Stage::Metadata, &item, anyhow::anyhow!("item has no stream"));
    };

    match fetcher.fetch_name(stream).await {
        Ok(name) if !name.trim().is_empty() => {
            item.mark_named(name.trim());
            StageMessage::Completed(item)
        }
        Ok(_) => stage_failure(Stage::Metadata, &item, anyhow::anyhow!("empty display name")),
        Err(err) => stage_failure(Stage::Metadata, &item, err),
    }
}

pub async fn download(
    job: DownloadJob,
    source: Arc<dyn PayloadSource>,
    progress: Arc<dyn ProgressSink>,
) -> StageMessage<MediaItem> {
    let DownloadJob { mut item, temp } = job;
    report_step(progress.as_ref(), Stage::Download, &item);

    let Some(stream) = item.stream() else {
        return stage_failure(Stage::Download, &item, anyhow::anyhow!("item has no stream"));
    };

    let opened = match source.open_stream(stream).await {
        Ok(opened) => opened,
        Err(err) => return stage_failure(Stage::Download, &item, err),
    };

    let mut file = tokio::fs::File::from_std(temp.file);
    let label = item.source_link().to_string();
    let copied = copy_to_file(opened, &mut file, |transferred, total| {
        progress.report(ProgressEvent::Bytes {
            label: label.clone(),
            transferred,
            total,
        });
    })
    .await;

    match copied {
        Ok(bytes) => {
            tracing::debug!(
                "Downloaded {} for {}",
                crate::utils::format_file_size(bytes),
                item.source_link()
            );
            item.mark_downloaded(PayloadHandle::new(temp.path, bytes));
            StageMessage::Completed(item)
        }
        Err(err) => stage_failure(Stage::Download, &item, err),
    }
}

pub async fn convert(
    job: ConvertJob,
    transcoder: Arc<Transcoder>,
    progress: Arc<dyn ProgressSink>,
) -> StageMessage<MediaItem> {
    let ConvertJob { mut item, output } = job;
    report_step(progress.as_ref(), Stage::Convert, &item);
    if let Some(payload) = item.payload() {
        tracing::debug!(
            "Converting {} ({}) to {}",
            payload.path().display(),
            crate::utils::format_file_size(payload.bytes()),
            output.display()
        );
    }

    match transcoder.convert(&item, &output).await {
        Ok(()) => {
            item.mark_converted(output);
            StageMessage::Completed(item)
        }
        Err(err) => stage_failure(Stage::Convert, &item, err),
    }
}
