use std::time::Duration;

use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pdp::backend::{ProofBackend, ServiceTarget};
use crate::pdp::error::WorkflowError;
use crate::pdp::invoker::InvokeError;
use crate::pdp::parse::{CreateStatus, parse_proof_set_id, parse_tx_hash};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Upper bound on the time spent waiting for confirmation.
    pub deadline: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            deadline: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedProofSet {
    pub tx_hash: String,
    pub proof_set_id: String,
    pub polls: u32,
}

/// Requests a new proof set and waits until the service confirms it.
pub async fn create_proof_set(
    backend: &dyn ProofBackend,
    service: &ServiceTarget,
    recordkeeper: &str,
    poll: &PollSettings,
    cancel: &CancellationToken,
) -> Result<CreatedProofSet, WorkflowError> {
    let output = backend
        .create_proof_set(service, recordkeeper, cancel)
        .await?;
    let tx_hash = parse_tx_hash(output.as_bytes()).ok_or(WorkflowError::Parse {
        field: "transaction hash",
        output,
    })?;
    info!("Proof set creation requested, tx {}", tx_hash);

    let (proof_set_id, polls) =
        wait_for_confirmation(backend, service, &tx_hash, poll, cancel).await?;
    info!(
        "Proof set {} confirmed after {} polls (tx {})",
        proof_set_id, polls, tx_hash
    );
    Ok(CreatedProofSet {
        tx_hash,
        proof_set_id,
        polls,
    })
}

/// Polls the creation status of `tx_hash` every `poll.interval` until the
/// service reports the proof set as created. Returns the id and the number
/// of status calls made.
pub async fn wait_for_confirmation(
    backend: &dyn ProofBackend,
    service: &ServiceTarget,
    tx_hash: &str,
    poll: &PollSettings,
    cancel: &CancellationToken,
) -> Result<(String, u32), WorkflowError> {
    let deadline = Instant::now() + poll.deadline;
    let timed_out = |polls| WorkflowError::ConfirmationTimeout {
        tx_hash: tx_hash.to_string(),
        polls,
    };
    let mut polls = 0;
    loop {
        polls += 1;
        debug!("Poll #{} for tx {}", polls, tx_hash);
        // Dropping the status call on timeout kills the child.
        let status = tokio::select! {
            status = backend.create_status(service, tx_hash, cancel) => status,
            _ = sleep_until(deadline) => return Err(timed_out(polls)),
        };
        match status {
            Ok(output) => match parse_proof_set_id(output.as_bytes()) {
                CreateStatus::Pending => {}
                CreateStatus::Created(Some(id)) => return Ok((id, polls)),
                CreateStatus::Created(None) => {
                    return Err(WorkflowError::Parse {
                        field: "proof set id",
                        output,
                    });
                }
            },
            Err(InvokeError::Cancelled { .. }) => return Err(WorkflowError::Cancelled),
            // The service answers with an error until the transaction is indexed.
            Err(err) => warn!("Status poll #{} for tx {} failed: {}", polls, tx_hash, err),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
            _ = sleep_until(deadline) => return Err(timed_out(polls)),
            _ = sleep(poll.interval) => {}
        }
    }
}
