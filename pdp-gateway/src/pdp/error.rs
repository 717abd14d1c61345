use std::io;

use thiserror::Error;

use crate::pdp::invoker::{InvokeError, Subcommand, ToolOutput};

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("{subcommand} failed: {}", .output.trimmed())]
    Invocation {
        subcommand: Subcommand,
        output: ToolOutput,
    },

    #[error("could not run {subcommand}: {source}")]
    Spawn {
        subcommand: Subcommand,
        #[source]
        source: io::Error,
    },

    #[error("could not determine {field}")]
    Parse {
        field: &'static str,
        output: ToolOutput,
    },

    #[error("add-roots failed after {attempts} attempts: {}", .output.trimmed())]
    BindExhausted { attempts: u32, output: ToolOutput },

    #[error("timed out waiting for proof set creation of {tx_hash} after {polls} polls")]
    ConfirmationTimeout { tx_hash: String, polls: u32 },

    #[error("workflow cancelled")]
    Cancelled,

    #[error("failed to stage upload: {0}")]
    Staging(#[from] io::Error),
}

impl WorkflowError {
    /// Raw tool output attached to the failure, if any.
    pub fn output(&self) -> Option<&ToolOutput> {
        match self {
            WorkflowError::Invocation { output, .. }
            | WorkflowError::Parse { output, .. }
            | WorkflowError::BindExhausted { output, .. } => Some(output),
            _ => None,
        }
    }
}

impl From<InvokeError> for WorkflowError {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::Io { subcommand, source } => WorkflowError::Spawn { subcommand, source },
            InvokeError::Failed {
                subcommand, output, ..
            } => WorkflowError::Invocation { subcommand, output },
            InvokeError::Cancelled { .. } => WorkflowError::Cancelled,
        }
    }
}
