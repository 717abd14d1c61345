use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::pdp::backend::{ProofBackend, ServiceTarget};
use crate::pdp::error::WorkflowError;
use crate::pdp::invoker::{InvokeError, ToolOutput};
use crate::pdp::parse::UploadedRoot;
use crate::pdp::retry::{Disposition, RetryPolicy, with_retry};

/// Reported by add-roots while a freshly created or updated proof set has
/// not propagated to the service yet.
pub const NOT_VISIBLE_MARKER: &str = "not found or does not belong to service";

pub const DEFAULT_BIND_POLICY: RetryPolicy = RetryPolicy::linear(3, Duration::from_secs(2));

pub fn classify_bind_failure(err: &InvokeError) -> Disposition {
    match err.output() {
        Some(output) if output.contains(NOT_VISIBLE_MARKER) => Disposition::Transient,
        _ => Disposition::Terminal,
    }
}

/// Adds `root` to `proof_set_id`, retrying while the proof set is not yet
/// visible to the service. Returns the add-roots output of the successful call.
pub async fn bind_root(
    backend: &dyn ProofBackend,
    proof_set_id: &str,
    root: &UploadedRoot,
    service: &ServiceTarget,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<ToolOutput, WorkflowError> {
    let root_arg = root.to_string();
    let result = with_retry(
        "add-roots",
        policy,
        cancel,
        |_| backend.add_roots(service, proof_set_id, &root_arg, cancel),
        classify_bind_failure,
    )
    .await;

    match result {
        Ok(output) => {
            info!("Bound root {} to proof set {}", root, proof_set_id);
            Ok(output)
        }
        Err(_) if cancel.is_cancelled() => Err(WorkflowError::Cancelled),
        Err(exhausted) => match exhausted.last {
            InvokeError::Failed { output, .. } if output.contains(NOT_VISIBLE_MARKER) => {
                Err(WorkflowError::BindExhausted {
                    attempts: exhausted.attempts,
                    output,
                })
            }
            other => Err(other.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdp::backend::ToolBackend;
    use crate::pdp::invoker::Subcommand;
    use crate::pdp::testing::ScriptedInvoker;
    use tokio::time::Instant;

    const NOT_VISIBLE: &str =
        "Error: proof set 42 not found or does not belong to service pdp-user";

    fn root() -> UploadedRoot {
        UploadedRoot::new("root-abc", None)
    }

    async fn bind(backend: &ToolBackend<ScriptedInvoker>) -> Result<ToolOutput, WorkflowError> {
        bind_root(
            backend,
            "42",
            &root(),
            &ServiceTarget::new("http://sp", "pdp-user"),
            DEFAULT_BIND_POLICY,
            &CancellationToken::new(),
        )
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_succeeds_after_transient_failures() {
        let backend = ToolBackend::new(
            ScriptedInvoker::new()
                .fail(Subcommand::AddRoots, NOT_VISIBLE)
                .fail(Subcommand::AddRoots, NOT_VISIBLE)
                .ok(Subcommand::AddRoots, "Roots added"),
        );
        let start = Instant::now();
        let output = bind(&backend).await.unwrap();

        assert_eq!(output.trimmed(), "Roots added");
        assert!(start.elapsed() >= Duration::from_secs(6));
        let times = backend.invoker().call_times(Subcommand::AddRoots);
        assert_eq!(times.len(), 3);
        assert!(times[1] - times[0] >= Duration::from_secs(2));
        assert!(times[2] - times[1] >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_exhausts_on_persistent_not_found() {
        let backend =
            ToolBackend::new(ScriptedInvoker::new().fail(Subcommand::AddRoots, NOT_VISIBLE));
        let err = bind(&backend).await.unwrap_err();

        match err {
            WorkflowError::BindExhausted { attempts, output } => {
                assert_eq!(attempts, 3);
                assert_eq!(output.trimmed(), NOT_VISIBLE);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(backend.invoker().count(Subcommand::AddRoots), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_other_failure_is_terminal() {
        let backend = ToolBackend::new(
            ScriptedInvoker::new().fail(Subcommand::AddRoots, "Error: invalid root CID"),
        );
        let start = Instant::now();
        let err = bind(&backend).await.unwrap_err();

        assert!(matches!(err, WorkflowError::Invocation { .. }));
        assert_eq!(err.output().unwrap().trimmed(), "Error: invalid root CID");
        assert_eq!(backend.invoker().count(Subcommand::AddRoots), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_stops_at_first_non_transient_failure() {
        let backend = ToolBackend::new(
            ScriptedInvoker::new()
                .fail(Subcommand::AddRoots, NOT_VISIBLE)
                .fail(Subcommand::AddRoots, "Error: invalid root"),
        );
        let start = Instant::now();
        let err = bind(&backend).await.unwrap_err();

        assert!(matches!(err, WorkflowError::Invocation { .. }));
        assert_eq!(err.output().unwrap().trimmed(), "Error: invalid root");
        assert_eq!(backend.invoker().count(Subcommand::AddRoots), 2);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_bind_passes_subroots_through() {
        let backend = ToolBackend::new(ScriptedInvoker::new().ok(Subcommand::AddRoots, "ok"));
        bind_root(
            &backend,
            "7",
            &UploadedRoot::new("baga-root", Some("baga-sub".to_string())),
            &ServiceTarget::new("http://sp", "svc"),
            DEFAULT_BIND_POLICY,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let calls = backend.invoker().calls();
        assert_eq!(calls[0].1.last().map(String::as_str), Some("baga-root:baga-sub"));
    }
}
