//! HTTP transport session.
//!
//! Runs one range-capable GET per fetch, streaming the body to the task's
//! destination. Suspension keeps the partial file and returns a checkpoint
//! carrying the server's validator; abort deletes the partial file.

use std::io::SeekFrom;
use std::path::Path;

use async_trait::async_trait;
use reqwest::header::{IF_RANGE, RANGE};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

use dtg_core::{
    FetchOutcome, FetchRequest, Interruption, ResumeCheckpoint, TransferControl, TransportError,
    TransportSession,
};

use crate::error::{HttpError, HttpResult};
use crate::range::{BodyStart, classify, range_header, validator};

/// Why a transfer stopped before the body ended.
enum Stop {
    Interrupted(Interruption),
    Invalidated,
}

/// A session of the HTTP transport.
///
/// Sessions share the transport's connection pool. Invalidating a session
/// fails its in-flight and later fetches with `SessionInvalidated`.
pub struct HttpSession {
    identifier: String,
    client: reqwest::Client,
    token: Option<String>,
    invalidated: CancellationToken,
}

impl HttpSession {
    pub(crate) fn new(
        identifier: impl Into<String>,
        client: reqwest::Client,
        token: Option<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            client,
            token,
            invalidated: CancellationToken::new(),
        }
    }

    fn invalidated_error(&self) -> TransportError {
        TransportError::session_invalidated(format!("session {} was invalidated", self.identifier))
    }

    async fn stopped(&self, control: &TransferControl) -> Stop {
        tokio::select! {
            biased;
            () = self.invalidated.cancelled() => Stop::Invalidated,
            interruption = control.interrupted() => Stop::Interrupted(interruption),
        }
    }

    async fn finish_stopped(
        &self,
        stop: Stop,
        path: &Path,
        checkpoint: Option<ResumeCheckpoint>,
    ) -> Result<FetchOutcome, TransportError> {
        match stop {
            Stop::Interrupted(Interruption::Suspend) => {
                tracing::debug!(
                    target: "dtg.http",
                    path = %path.display(),
                    offset = checkpoint.as_ref().map_or(0, |c| c.offset),
                    "Transfer suspended"
                );
                Ok(FetchOutcome::Suspended(checkpoint))
            }
            Stop::Interrupted(Interruption::Abort) => {
                discard_partial(path).await?;
                tracing::debug!(target: "dtg.http", path = %path.display(), "Transfer aborted");
                Ok(FetchOutcome::Aborted)
            }
            Stop::Invalidated => Err(self.invalidated_error()),
        }
    }

    async fn run(
        &self,
        request: &FetchRequest,
        checkpoint: ResumeCheckpoint,
    ) -> Result<FetchOutcome, TransportError> {
        let task = &request.task;
        let url = task.key();
        let path = task.destination();
        let offset = usable_offset(path, checkpoint.offset).await?;

        let mut builder = self.client.get(task.content_url.clone());
        if let Some(range) = range_header(offset) {
            builder = builder.header(RANGE, range);
            if let Some(validator) = &checkpoint.validator {
                builder = builder.header(IF_RANGE, validator.as_str());
            }
        }
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        tracing::debug!(target: "dtg.http", url = %url, offset, "Requesting");

        let mut response = tokio::select! {
            biased;
            stop = self.stopped(&request.control) => {
                // Nothing fetched yet: a task without a checkpoint keeps none.
                let checkpoint = request
                    .resume_checkpoint
                    .as_ref()
                    .map(|_| ResumeCheckpoint { offset, ..checkpoint });
                return self.finish_stopped(stop, path, checkpoint).await;
            }
            response = builder.send() => response.map_err(HttpError::from)?,
        };

        let start = classify(response.status(), response.headers(), offset, url)?;
        let fresh_validator = validator(response.headers());
        let (mut written, validator) = match start {
            BodyStart::AlreadyComplete => {
                tracing::debug!(target: "dtg.http", url = %url, offset, "Nothing left to fetch");
                return Ok(FetchOutcome::Completed);
            }
            BodyStart::Append(offset) => (offset, fresh_validator.or(checkpoint.validator)),
            BodyStart::Restart => {
                if offset > 0 {
                    tracing::info!(
                        target: "dtg.http",
                        url = %url,
                        discarded = offset,
                        "Server sent the full body, restarting"
                    );
                }
                (0, fresh_validator)
            }
        };

        let mut writer = BufWriter::new(open_destination(path, start).await?);
        loop {
            let chunk = tokio::select! {
                biased;
                stop = self.stopped(&request.control) => {
                    writer.flush().await.map_err(|e| HttpError::io(path, e))?;
                    let checkpoint = Some(ResumeCheckpoint { offset: written, validator });
                    return self.finish_stopped(stop, path, checkpoint).await;
                }
                chunk = response.chunk() => chunk.map_err(HttpError::from)?,
            };
            let Some(chunk) = chunk else {
                break;
            };
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| HttpError::io(path, e))?;
            written += chunk.len() as u64;
            request.progress.report(chunk.len() as u64);
        }
        writer.flush().await.map_err(|e| HttpError::io(path, e))?;

        tracing::debug!(target: "dtg.http", url = %url, bytes = written, "Transfer complete");
        Ok(FetchOutcome::Completed)
    }
}

#[async_trait]
impl TransportSession for HttpSession {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, TransportError> {
        if !self.is_valid() {
            return Err(self.invalidated_error());
        }
        let checkpoint = request.resume_checkpoint.clone().unwrap_or_default();
        self.run(&request, checkpoint).await
    }

    fn invalidate(&self) {
        self.invalidated.cancel();
    }

    fn is_valid(&self) -> bool {
        !self.invalidated.is_cancelled()
    }
}

/// Bytes of the partial file that can be resumed from.
///
/// Never more than the checkpoint claims, and zero when the file is gone.
async fn usable_offset(path: &Path, claimed: u64) -> HttpResult<u64> {
    if claimed == 0 {
        return Ok(0);
    }
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len().min(claimed)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(HttpError::io(path, e)),
    }
}

/// Open the destination positioned for `start`.
async fn open_destination(path: &Path, start: BodyStart) -> HttpResult<File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| HttpError::io(parent, e))?;
    }
    match start {
        BodyStart::Append(offset) => {
            let mut file = OpenOptions::new()
                .write(true)
                .open(path)
                .await
                .map_err(|e| HttpError::io(path, e))?;
            file.set_len(offset)
                .await
                .map_err(|e| HttpError::io(path, e))?;
            file.seek(SeekFrom::Start(offset))
                .await
                .map_err(|e| HttpError::io(path, e))?;
            Ok(file)
        }
        BodyStart::Restart | BodyStart::AlreadyComplete => File::create(path)
            .await
            .map_err(|e| HttpError::io(path, e)),
    }
}

async fn discard_partial(path: &Path) -> HttpResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HttpError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_usable_offset_is_capped_by_file_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        tokio::fs::write(&path, b"hello").await.unwrap();

        assert_eq!(usable_offset(&path, 3).await.unwrap(), 3);
        assert_eq!(usable_offset(&path, 9).await.unwrap(), 5);
        assert_eq!(usable_offset(&path, 0).await.unwrap(), 0);
        assert_eq!(
            usable_offset(&dir.path().join("missing"), 9).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_append_truncates_to_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let mut file = open_destination(&path, BodyStart::Append(6)).await.unwrap();
        file.write_all(b"there").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello there");
    }

    #[tokio::test]
    async fn test_discard_partial_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        discard_partial(&dir.path().join("missing")).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalidate_marks_session_unusable() {
        let session = HttpSession::new("dtg.session.x", reqwest::Client::new(), None);
        assert!(session.is_valid());
        session.invalidate();
        assert!(!session.is_valid());
        assert!(session.invalidated_error().is_fatal());
    }
}
