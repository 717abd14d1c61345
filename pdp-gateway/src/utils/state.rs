use std::sync::Arc;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::pdp::{ProcessInvoker, ProofBackend, ToolBackend, WorkflowCoordinator};
use crate::store::{MetadataStore, PgMetadataStore};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<WorkflowCoordinator>,
    pub store: Arc<dyn MetadataStore>,
    pub config: Arc<Config>,
    /// Cancelled on shutdown; every workflow runs under a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, pool: Arc<PgPool>, shutdown: CancellationToken) -> Self {
        let backend = Arc::new(ToolBackend::new(ProcessInvoker::new(config.pdptool_path.clone())));
        let store = Arc::new(PgMetadataStore::new(pool));
        Self::with_parts(config, backend, store, shutdown)
    }

    /// Assembles the state from already-built collaborators.
    pub fn with_parts(
        config: Config,
        backend: Arc<dyn ProofBackend>,
        store: Arc<dyn MetadataStore>,
        shutdown: CancellationToken,
    ) -> Self {
        let coordinator = Arc::new(WorkflowCoordinator::new(
            backend,
            store.clone(),
            config.workflow.clone(),
        ));
        AppState {
            coordinator,
            store,
            config: Arc::new(config),
            shutdown,
        }
    }

    pub fn backend(&self) -> &dyn ProofBackend {
        self.coordinator.backend()
    }
}
