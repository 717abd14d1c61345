use std::borrow::Cow;
use std::fmt;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Subcommands understood by `pdptool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subcommand {
    Ping,
    CreateProofSet,
    GetProofSetCreateStatus,
    UploadFile,
    AddRoots,
}

impl Subcommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subcommand::Ping => "ping",
            Subcommand::CreateProofSet => "create-proof-set",
            Subcommand::GetProofSetCreateStatus => "get-proof-set-create-status",
            Subcommand::UploadFile => "upload-file",
            Subcommand::AddRoots => "add-roots",
        }
    }
}

impl fmt::Display for Subcommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combined stdout and stderr of one tool run, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput(Vec<u8>);

impl ToolOutput {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    /// The output as text with surrounding whitespace removed.
    pub fn trimmed(&self) -> String {
        self.text().trim().to_string()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.text().contains(needle)
    }
}

impl From<&str> for ToolOutput {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("i/o error running `{subcommand}`: {source}")]
    Io {
        subcommand: Subcommand,
        #[source]
        source: io::Error,
    },

    #[error("`{subcommand}` exited with {status}")]
    Failed {
        subcommand: Subcommand,
        status: String,
        output: ToolOutput,
    },

    #[error("`{subcommand}` was cancelled")]
    Cancelled { subcommand: Subcommand },
}

impl InvokeError {
    pub fn subcommand(&self) -> Subcommand {
        match self {
            InvokeError::Io { subcommand, .. }
            | InvokeError::Failed { subcommand, .. }
            | InvokeError::Cancelled { subcommand } => *subcommand,
        }
    }

    /// Output captured before the tool failed, if it ran at all.
    pub fn output(&self) -> Option<&ToolOutput> {
        match self {
            InvokeError::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Runs one tool subcommand and hands back whatever it printed.
#[async_trait]
pub trait CommandInvoker: Send + Sync {
    async fn invoke(
        &self,
        subcommand: Subcommand,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, InvokeError>;
}

/// Spawns the tool binary once per call with its own directory as the working directory.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    tool_path: PathBuf,
    work_dir: PathBuf,
}

impl ProcessInvoker {
    pub fn new(tool_path: impl Into<PathBuf>) -> Self {
        let tool_path = tool_path.into();
        let work_dir = tool_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            tool_path,
            work_dir,
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}

#[async_trait]
impl CommandInvoker for ProcessInvoker {
    async fn invoke(
        &self,
        subcommand: Subcommand,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, InvokeError> {
        if cancel.is_cancelled() {
            return Err(InvokeError::Cancelled { subcommand });
        }
        let io_err = |source| InvokeError::Io { subcommand, source };

        debug!(
            "Executing {} {} {:?} in {}",
            self.tool_path.display(),
            subcommand,
            args,
            self.work_dir.display()
        );

        // Both streams share one file description so lines keep their order.
        let capture = tempfile::tempfile().map_err(io_err)?;
        let stdout = capture.try_clone().map_err(io_err)?;
        let stderr = capture.try_clone().map_err(io_err)?;

        let mut child = Command::new(&self.tool_path)
            .arg(subcommand.as_str())
            .args(args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(io_err)?;

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(InvokeError::Cancelled { subcommand });
            }
            status = child.wait() => status.map_err(io_err)?,
        };

        let mut capture = tokio::fs::File::from_std(capture);
        capture.seek(SeekFrom::Start(0)).await.map_err(io_err)?;
        let mut buf = Vec::new();
        capture.read_to_end(&mut buf).await.map_err(io_err)?;
        let output = ToolOutput::new(buf);
        debug!("{} output:\n{}", subcommand, output.text());

        if status.success() {
            Ok(output)
        } else {
            debug!("{} failed with {}: {}", subcommand, status, output.trimmed());
            Err(InvokeError::Failed {
                subcommand,
                status: status.to_string(),
                output,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_dir_is_tool_parent() {
        let invoker = ProcessInvoker::new("/opt/curio/pdptool");
        assert_eq!(invoker.work_dir(), Path::new("/opt/curio"));

        let bare = ProcessInvoker::new("pdptool");
        assert_eq!(bare.work_dir(), Path::new("."));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_captures_stdout() {
        let invoker = ProcessInvoker::new("/bin/echo");
        let args = vec!["--service-url".to_string(), "http://sp".to_string()];
        let output = invoker
            .invoke(Subcommand::Ping, &args, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output.trimmed(), "ping --service-url http://sp");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_failure_keeps_stderr() {
        // `sh upload-file` fails because no such script exists in /bin.
        let invoker = ProcessInvoker::new("/bin/sh");
        let err = invoker
            .invoke(Subcommand::UploadFile, &[], &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            InvokeError::Failed { output, .. } => assert!(output.contains("upload-file")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invoke_missing_tool() {
        let invoker = ProcessInvoker::new("/nonexistent/dir/pdptool");
        let err = invoker
            .invoke(Subcommand::Ping, &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Io { .. }));
        assert!(err.output().is_none());
    }

    #[tokio::test]
    async fn test_invoke_cancelled_before_spawn() {
        let invoker = ProcessInvoker::new("/bin/echo");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = invoker
            .invoke(Subcommand::Ping, &[], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Cancelled { subcommand: Subcommand::Ping }));
    }
}
