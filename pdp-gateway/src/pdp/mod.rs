//! Orchestration of the proof-of-data-possession workflow on top of `pdptool`.

pub mod backend;
pub mod binder;
pub mod creation;
pub mod error;
pub mod invoker;
pub mod parse;
pub mod retry;
pub mod testing;
pub mod upload;
pub mod workflow;

pub use backend::{ProofBackend, ServiceTarget, ToolBackend};
pub use error::WorkflowError;
pub use invoker::{CommandInvoker, InvokeError, ProcessInvoker, Subcommand, ToolOutput};
pub use parse::UploadedRoot;
pub use workflow::{
    BindOutcome, FlowContext, FlowError, FullOutcome, TypedOutcome, Upload, WorkflowCoordinator,
    WorkflowSettings,
};
