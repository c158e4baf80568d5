use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use super::cleanup::TempPayload;
use crate::media::{MediaItem, Stage, StageMessage};
use crate::PipelineError;

/// Input of one stage task; knows the link it works for
pub trait StageInput: Send + 'static {
    fn link(&self) -> &str;
}

impl StageInput for MediaItem {
    fn link(&self) -> &str {
        self.source_link()
    }
}

/// An item paired with the temporary file it downloads into
pub struct DownloadJob {
    pub item: MediaItem,
    pub temp: TempPayload,
}

impl StageInput for DownloadJob {
    fn link(&self) -> &str {
        self.item.source_link()
    }
}

/// An item paired with the artifact path planned for it
pub struct ConvertJob {
    pub item: MediaItem,
    pub output: PathBuf,
}

impl StageInput for ConvertJob {
    fn link(&self) -> &str {
        self.item.source_link()
    }
}

/// Runs one task per input and joins on exactly one message per task.
///
/// A shared semaphore caps the number of tasks running at once. When the
/// cancellation token fires, waiting and running tasks report `Cancelled`
/// instead of their result.
#[derive(Clone)]
pub struct FanOut {
    limiter: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl FanOut {
    pub fn new(max_concurrent_tasks: usize, cancel: CancellationToken) -> Self {
        Self {
            limiter: Arc::new(Semaphore::new(max_concurrent_tasks)),
            cancel,
        }
    }

    /// Dispatch `task` for every input and collect the messages in completion order
    pub async fn run<I, T, F, Fut>(&self, stage: Stage, inputs: Vec<I>, task: F) -> Vec<StageMessage<T>>
    where
        I: StageInput,
        T: Send + 'static,
        F: Fn(I) -> Fut,
        Fut: Future<Output = StageMessage<T>> + Send + 'static,
    {
        let dispatched = inputs.len();
        let (tx, mut rx) = mpsc::channel(dispatched.max(1));

        tracing::info!("{}: dispatching {} task(s)", stage.name(), dispatched);

        for input in inputs {
            let link = input.link().to_string();
            let work = task(input);
            let limiter = self.limiter.clone();
            let cancel = self.cancel.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let guarded = AssertUnwindSafe(async {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => StageMessage::failed(
                            link.clone(),
                            PipelineError::Cancelled { link: link.clone(), stage },
                        ),
                        message = async {
                            let _permit = limiter.acquire_owned().await.ok();
                            work.await
                        } => message,
                    }
                })
                .catch_unwind();

                let message = match guarded.await {
                    Ok(message) => message,
                    Err(_) => {
                        let err = anyhow::anyhow!("{} task panicked", stage);
                        StageMessage::failed(link.clone(), PipelineError::from_stage(stage, &link, &err))
                    }
                };

                // The receiver outlives every sender
                let _ = tx.send(message).await;
            });
        }
        drop(tx);

        let mut messages = Vec::with_capacity(dispatched);
        while messages.len() < dispatched {
            match rx.recv().await {
                Some(message) => messages.push(message),
                None => break,
            }
        }

        if messages.len() != dispatched {
            tracing::error!(
                "{}: received {} of {} messages",
                stage.name(),
                messages.len(),
                dispatched
            );
        }

        messages
    }
}
