//! Hand-off of the final artifact.
//!
//! [`ResultDelivery`] is a byte stream over the artifact that owns the run's
//! scratch arena. The arena is released once the last chunk has been
//! yielded, or when the stream is dropped before that.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;

use mixmux_media::ScratchArena;
use mixmux_models::{PipelineRun, RunId};

use crate::error::PipelineError;
use crate::logging::RunLogger;
use crate::metrics::{self, RunOutcome};
use crate::orchestrator::{abort, CompletedMerge, FailedMerge};

/// Streams a completed run's artifact and then releases its arena.
pub struct ResultDelivery {
    run: PipelineRun,
    arena: Option<ScratchArena>,
    stream: ReaderStream<File>,
    byte_len: u64,
    sent: u64,
    content_type: &'static str,
    file_name: String,
    logger: RunLogger,
}

impl std::fmt::Debug for ResultDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultDelivery")
            .field("run_id", &self.run.run_id)
            .field("byte_len", &self.byte_len)
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

impl ResultDelivery {
    /// Open the artifact for streaming.
    ///
    /// If the file cannot be opened the run fails with a resource error and
    /// the arena is released.
    pub async fn open(completed: CompletedMerge) -> Result<Self, FailedMerge> {
        let CompletedMerge {
            run,
            arena,
            final_path,
            byte_len,
            ..
        } = completed;
        let logger = RunLogger::new(&run.run_id, "delivery");

        let file = match File::open(&final_path).await {
            Ok(file) => file,
            Err(e) => {
                let error = PipelineError::resource(format!("cannot open final artifact: {e}"));
                return Err(abort(run, arena, None, error, &logger).await);
            }
        };

        let extension = final_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_ascii_lowercase();

        Ok(Self {
            content_type: content_type_for(&final_path),
            file_name: format!("merged.{extension}"),
            run,
            arena: Some(arena),
            stream: ReaderStream::new(file),
            byte_len,
            sent: 0,
            logger,
        })
    }

    pub fn run(&self) -> &PipelineRun {
        &self.run
    }

    pub fn run_id(&self) -> &RunId {
        &self.run.run_id
    }

    /// Size of the artifact in bytes.
    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    /// Download name offered to the caller, e.g. `merged.mp4`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Copy the whole artifact into `writer`, then release the arena.
    pub async fn write_to<W>(mut self, writer: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(chunk) = self.stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    if let Some(arena) = self.fail_transfer(&e) {
                        if let Err(e) = arena.release().await {
                            self.logger.log_warning(&format!("scratch cleanup incomplete: {e}"));
                        }
                    }
                    return Err(e);
                }
            };
            writer.write_all(&chunk).await?;
            self.sent += chunk.len() as u64;
        }
        writer.flush().await?;

        if let Some(arena) = self.complete() {
            if let Err(e) = arena.release().await {
                self.logger.log_warning(&format!("scratch cleanup incomplete: {e}"));
            }
        }
        Ok(self.sent)
    }

    /// Enter `Failed` after a read error. A truncated transfer is never
    /// counted as delivered. Returns the arena the first time only.
    fn fail_transfer(&mut self, error: &io::Error) -> Option<ScratchArena> {
        let arena = self.arena.take()?;
        self.run
            .fail(None, format!("artifact read failed after {} bytes: {error}", self.sent));
        self.logger.log_error(&format!(
            "delivery failed after {} of {} bytes: {error}",
            self.sent, self.byte_len
        ));
        metrics::record_run(RunOutcome::Failed);
        Some(arena)
    }

    /// Enter `Delivered`. Returns the arena the first time only.
    fn complete(&mut self) -> Option<ScratchArena> {
        let arena = self.arena.take()?;
        if let Err(e) = self.run.mark_delivered() {
            self.logger.log_warning(&format!("run could not be marked delivered: {e}"));
        }
        self.logger
            .log_completion(&format!("{} of {} bytes delivered", self.sent, self.byte_len));
        metrics::record_run(RunOutcome::Delivered);
        Some(arena)
    }
}

impl Stream for ResultDelivery {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.stream).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                if let Some(arena) = this.fail_transfer(&e) {
                    release_in_background(arena, this.logger.clone());
                }
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if let Some(arena) = this.complete() {
                    release_in_background(arena, this.logger.clone());
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResultDelivery {
    fn drop(&mut self) {
        let Some(arena) = self.arena.take() else {
            return;
        };
        self.run
            .fail(None, "delivery aborted before the artifact was fully sent");
        self.logger.log_warning(&format!(
            "delivery abandoned after {} of {} bytes",
            self.sent, self.byte_len
        ));
        metrics::record_run(RunOutcome::Abandoned);
        // ScratchArena's own Drop removes the directory synchronously
        drop(arena);
    }
}

/// Release on the current runtime, or synchronously when there is none.
fn release_in_background(arena: ScratchArena, logger: RunLogger) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = arena.release().await {
                    logger.log_warning(&format!("scratch cleanup incomplete: {e}"));
                }
            });
        }
        Err(_) => drop(arena),
    }
}

/// MIME type of the delivered container, from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}
