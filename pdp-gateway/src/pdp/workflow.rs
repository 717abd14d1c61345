use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::pdp::backend::{ProofBackend, ServiceTarget};
use crate::pdp::binder::{DEFAULT_BIND_POLICY, bind_root};
use crate::pdp::creation::{PollSettings, create_proof_set};
use crate::pdp::error::WorkflowError;
use crate::pdp::parse::UploadedRoot;
use crate::pdp::retry::RetryPolicy;
use crate::pdp::upload::{SettlePolicy, upload};
use crate::store::MetadataStore;
use crate::store::model::NewRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSettings {
    pub poll: PollSettings,
    pub bind_policy: RetryPolicy,
    pub settle: SettlePolicy,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            poll: PollSettings::default(),
            bind_policy: DEFAULT_BIND_POLICY,
            settle: SettlePolicy::default(),
        }
    }
}

/// The file a flow uploads: its client-side name and content.
pub struct Upload<'a, R: ?Sized> {
    pub display_name: &'a str,
    pub stream: &'a mut R,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindOutcome {
    #[serde(rename = "proofSetID")]
    pub proof_set_id: String,
    #[serde(rename = "rootCID")]
    pub root_cid: String,
    /// Trimmed add-roots output.
    #[serde(rename = "addRoots")]
    pub add_roots: String,
    #[serde(rename = "isEncrypted")]
    pub is_encrypted: bool,
    /// Whether the mapping reached the metadata store.
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullOutcome {
    #[serde(rename = "txHash")]
    pub tx_hash: String,
    #[serde(flatten)]
    pub bind: BindOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedOutcome {
    #[serde(flatten)]
    pub bind: BindOutcome,
    #[serde(flatten)]
    pub record: NewRecord,
}

/// What a flow had established when it failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowContext {
    #[serde(rename = "txHash", skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(rename = "proofSetID", skip_serializing_if = "Option::is_none")]
    pub proof_set_id: Option<String>,
    #[serde(rename = "rootCID", skip_serializing_if = "Option::is_none")]
    pub root_cid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(rename = "isEncrypted")]
    pub is_encrypted: bool,
}

#[derive(Error, Debug)]
#[error("{error}")]
pub struct FlowError {
    #[source]
    pub error: WorkflowError,
    pub context: FlowContext,
}

impl FlowContext {
    fn fail(&self, error: WorkflowError) -> FlowError {
        let mut context = self.clone();
        if let WorkflowError::BindExhausted { attempts, .. } = &error {
            context.attempts = Some(*attempts);
        }
        FlowError { error, context }
    }
}

/// Sequences the proof-of-data-possession steps for one uploaded file.
///
/// Steps run strictly in order and a failed step ends the flow; nothing that
/// already happened on the service is undone. Persisting the mapping is the
/// only best-effort step.
pub struct WorkflowCoordinator {
    backend: Arc<dyn ProofBackend>,
    store: Arc<dyn MetadataStore>,
    settings: WorkflowSettings,
}

impl WorkflowCoordinator {
    pub fn new(
        backend: Arc<dyn ProofBackend>,
        store: Arc<dyn MetadataStore>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            backend,
            store,
            settings,
        }
    }

    pub fn backend(&self) -> &dyn ProofBackend {
        self.backend.as_ref()
    }

    /// Creates a proof set, waits for it, then uploads and binds the file.
    pub async fn run_full_flow<R>(
        &self,
        service: &ServiceTarget,
        recordkeeper: &str,
        upload: Upload<'_, R>,
        cancel: &CancellationToken,
    ) -> Result<FullOutcome, FlowError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let span = info_span!(
            "workflow",
            request_id = %Uuid::new_v4(),
            flow = "full",
            file = upload.display_name
        );
        async move {
            let mut context = FlowContext::default();
            let created = create_proof_set(
                self.backend(),
                service,
                recordkeeper,
                &self.settings.poll,
                cancel,
            )
            .await
            .map_err(|e| context.fail(e))?;
            context.tx_hash = Some(created.tx_hash.clone());

            let bind = self
                .upload_and_bind(service, &created.proof_set_id, upload, None, context, cancel)
                .await?;
            Ok(FullOutcome {
                tx_hash: created.tx_hash,
                bind,
            })
        }
        .instrument(span)
        .await
    }

    /// Uploads the file and binds it to an existing proof set.
    pub async fn run_bind_flow<R>(
        &self,
        service: &ServiceTarget,
        proof_set_id: &str,
        upload: Upload<'_, R>,
        cancel: &CancellationToken,
    ) -> Result<BindOutcome, FlowError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let span = info_span!(
            "workflow",
            request_id = %Uuid::new_v4(),
            flow = "bind",
            file = upload.display_name
        );
        self.upload_and_bind(
            service,
            proof_set_id,
            upload,
            None,
            FlowContext::default(),
            cancel,
        )
        .instrument(span)
        .await
    }

    /// Like [`Self::run_bind_flow`], also storing `record` for the new root.
    pub async fn run_typed_flow<R>(
        &self,
        service: &ServiceTarget,
        proof_set_id: &str,
        upload: Upload<'_, R>,
        record: NewRecord,
        cancel: &CancellationToken,
    ) -> Result<TypedOutcome, FlowError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let span = info_span!(
            "workflow",
            request_id = %Uuid::new_v4(),
            flow = record.kind().table(),
            file = upload.display_name
        );
        let bind = self
            .upload_and_bind(
                service,
                proof_set_id,
                upload,
                Some(&record),
                FlowContext::default(),
                cancel,
            )
            .instrument(span)
            .await?;
        Ok(TypedOutcome { bind, record })
    }

    async fn upload_and_bind<R>(
        &self,
        service: &ServiceTarget,
        proof_set_id: &str,
        upload_src: Upload<'_, R>,
        record: Option<&NewRecord>,
        mut context: FlowContext,
        cancel: &CancellationToken,
    ) -> Result<BindOutcome, FlowError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let display_name = upload_src.display_name;
        context.proof_set_id = Some(proof_set_id.to_string());
        context.is_encrypted = self.settings.settle.is_encrypted(display_name);

        let root = upload(
            self.backend(),
            upload_src.stream,
            display_name,
            service,
            &self.settings.settle,
            cancel,
        )
        .await
        .map_err(|e| context.fail(e))?;
        context.root_cid = Some(root.cid().to_string());

        let output = bind_root(
            self.backend(),
            proof_set_id,
            &root,
            service,
            self.settings.bind_policy,
            cancel,
        )
        .await
        .map_err(|e| context.fail(e))?;

        let persisted = self.persist(display_name, &root, record).await;
        Ok(BindOutcome {
            proof_set_id: proof_set_id.to_string(),
            root_cid: root.cid().to_string(),
            add_roots: output.trimmed(),
            is_encrypted: context.is_encrypted,
            persisted,
        })
    }

    async fn persist(&self, display_name: &str, root: &UploadedRoot, record: Option<&NewRecord>) -> bool {
        let result = match record {
            Some(record) => {
                self.store
                    .insert_typed_record(root.cid(), record, display_name)
                    .await
            }
            None => self.store.insert_file_mapping(display_name, root.cid()).await,
        };
        match result {
            Ok(()) => {
                info!("Recorded {} -> {}", display_name, root.cid());
                true
            }
            Err(e) => {
                error!(
                    "Failed to record {} -> {}: {}",
                    display_name,
                    root.cid(),
                    e
                );
                false
            }
        }
    }
}
