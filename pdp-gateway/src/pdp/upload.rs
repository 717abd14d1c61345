use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::pdp::backend::{ProofBackend, ServiceTarget};
use crate::pdp::error::WorkflowError;
use crate::pdp::invoker::ToolOutput;
use crate::pdp::parse::{UploadedRoot, parse_root_cid};

const STAGING_PREFIX: &str = "pdp-upload-";

/// Extra wait after uploading content the client encrypted itself, so the
/// service finishes replicating it before a bind is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlePolicy {
    pub encrypted_suffix: String,
    pub delay: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            encrypted_suffix: ".enc".to_string(),
            delay: Duration::from_secs(3),
        }
    }
}

impl SettlePolicy {
    pub fn is_encrypted(&self, display_name: &str) -> bool {
        !self.encrypted_suffix.is_empty()
            && display_name
                .to_lowercase()
                .ends_with(&self.encrypted_suffix.to_lowercase())
    }
}

/// Copies `stream` into a fresh temp file. The file is removed when the
/// returned handle drops.
pub async fn stage<R>(stream: &mut R) -> Result<NamedTempFile, WorkflowError>
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    let staged = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile()?;
    let mut file = tokio::fs::File::from_std(staged.reopen()?);
    let written = tokio::io::copy(stream, &mut file).await?;
    file.flush().await?;
    debug!("Staged {} bytes at {}", written, staged.path().display());
    Ok(staged)
}

/// Stages and uploads `stream` without interpreting the output.
pub async fn upload_raw<R>(
    backend: &dyn ProofBackend,
    stream: &mut R,
    service: &ServiceTarget,
    cancel: &CancellationToken,
) -> Result<ToolOutput, WorkflowError>
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    let staged = stage(stream).await?;
    let output = backend.upload_file(service, staged.path(), cancel).await?;
    Ok(output)
}

/// Uploads `stream` and returns the root the service assigned to it.
pub async fn upload<R>(
    backend: &dyn ProofBackend,
    stream: &mut R,
    display_name: &str,
    service: &ServiceTarget,
    settle: &SettlePolicy,
    cancel: &CancellationToken,
) -> Result<UploadedRoot, WorkflowError>
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    let output = upload_raw(backend, stream, service, cancel).await?;
    let root = parse_root_cid(output.as_bytes()).ok_or(WorkflowError::Parse {
        field: "root CID",
        output,
    })?;
    info!("Uploaded {} as root {}", display_name, root);

    if settle.is_encrypted(display_name) {
        debug!(
            "{} is pre-encrypted, waiting {:?} for the service to settle",
            display_name, settle.delay
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
            _ = sleep(settle.delay) => {}
        }
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdp::backend::ToolBackend;
    use crate::pdp::invoker::Subcommand;
    use crate::pdp::testing::ScriptedInvoker;
    use std::path::PathBuf;
    use tokio::time::Instant;

    fn service() -> ServiceTarget {
        ServiceTarget::new("http://sp", "svc")
    }

    fn staged_path(backend: &ToolBackend<ScriptedInvoker>) -> PathBuf {
        let calls = backend.invoker().calls();
        PathBuf::from(calls[0].1.last().unwrap())
    }

    #[test]
    fn test_encrypted_suffix_is_case_insensitive() {
        let settle = SettlePolicy::default();
        assert!(settle.is_encrypted("secret.enc"));
        assert!(settle.is_encrypted("SECRET.ENC"));
        assert!(!settle.is_encrypted("secret.enc.txt"));
        assert!(!settle.is_encrypted("encoder"));
    }

    #[tokio::test]
    async fn test_stage_copies_whole_stream() {
        let mut data: &[u8] = b"0123456789";
        let staged = stage(&mut data).await.unwrap();
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"0123456789");
        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_upload_has_no_settle_delay() {
        let backend = ToolBackend::new(
            ScriptedInvoker::new().ok(Subcommand::UploadFile, "progress 100%\nroot-abc\n"),
        );
        let mut data: &[u8] = b"0123456789";
        let start = Instant::now();
        let root = upload(
            &backend,
            &mut data,
            "notes.txt",
            &service(),
            &SettlePolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(root.cid(), "root-abc");
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(backend.invoker().count(Subcommand::UploadFile), 1);
        assert!(!staged_path(&backend).exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_encrypted_upload_waits_to_settle() {
        let backend =
            ToolBackend::new(ScriptedInvoker::new().ok(Subcommand::UploadFile, "root-abc"));
        let mut data: &[u8] = b"0123456789";
        let start = Instant::now();
        upload(
            &backend,
            &mut data,
            "Report.ENC",
            &service(),
            &SettlePolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_failed_upload_removes_staged_file() {
        let backend = ToolBackend::new(
            ScriptedInvoker::new().fail(Subcommand::UploadFile, "error: service unreachable"),
        );
        let mut data: &[u8] = b"0123456789";
        let err = upload(
            &backend,
            &mut data,
            "notes.txt",
            &service(),
            &SettlePolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WorkflowError::Invocation { .. }));
        assert_eq!(err.output().unwrap().trimmed(), "error: service unreachable");
        assert!(!staged_path(&backend).exists());
    }

    #[tokio::test]
    async fn test_empty_upload_output_is_parse_error() {
        let backend = ToolBackend::new(ScriptedInvoker::new().ok(Subcommand::UploadFile, "\n"));
        let mut data: &[u8] = b"x";
        let err = upload(
            &backend,
            &mut data,
            "x.bin",
            &service(),
            &SettlePolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WorkflowError::Parse { field: "root CID", .. }));
    }
}
