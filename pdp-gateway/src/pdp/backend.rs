use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::pdp::invoker::{CommandInvoker, InvokeError, ProcessInvoker, Subcommand, ToolOutput};

/// The PDP service a request talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTarget {
    pub url: String,
    pub name: String,
}

impl ServiceTarget {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
        }
    }

    fn flags(&self) -> Vec<String> {
        vec![
            "--service-url".to_string(),
            self.url.clone(),
            "--service-name".to_string(),
            self.name.clone(),
        ]
    }
}

/// Operations offered by a proof-of-storage service.
///
/// Every call returns the raw service output; interpreting it is left to
/// `pdp::parse` so a different backend only has to reproduce the text contract.
#[async_trait]
pub trait ProofBackend: Send + Sync {
    async fn ping(
        &self,
        service: &ServiceTarget,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, InvokeError>;

    async fn create_proof_set(
        &self,
        service: &ServiceTarget,
        recordkeeper: &str,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, InvokeError>;

    async fn create_status(
        &self,
        service: &ServiceTarget,
        tx_hash: &str,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, InvokeError>;

    async fn upload_file(
        &self,
        service: &ServiceTarget,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, InvokeError>;

    async fn add_roots(
        &self,
        service: &ServiceTarget,
        proof_set_id: &str,
        root: &str,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, InvokeError>;
}

/// [`ProofBackend`] driven through `pdptool` subcommands.
#[derive(Debug, Clone)]
pub struct ToolBackend<I = ProcessInvoker> {
    invoker: I,
}

impl<I: CommandInvoker> ToolBackend<I> {
    pub fn new(invoker: I) -> Self {
        Self { invoker }
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }
}

#[async_trait]
impl<I: CommandInvoker> ProofBackend for ToolBackend<I> {
    async fn ping(
        &self,
        service: &ServiceTarget,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, InvokeError> {
        self.invoker
            .invoke(Subcommand::Ping, &service.flags(), cancel)
            .await
    }

    async fn create_proof_set(
        &self,
        service: &ServiceTarget,
        recordkeeper: &str,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, InvokeError> {
        let mut args = service.flags();
        args.extend(["--recordkeeper".to_string(), recordkeeper.to_string()]);
        self.invoker
            .invoke(Subcommand::CreateProofSet, &args, cancel)
            .await
    }

    async fn create_status(
        &self,
        service: &ServiceTarget,
        tx_hash: &str,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, InvokeError> {
        let mut args = service.flags();
        args.extend(["--tx-hash".to_string(), tx_hash.to_string()]);
        self.invoker
            .invoke(Subcommand::GetProofSetCreateStatus, &args, cancel)
            .await
    }

    async fn upload_file(
        &self,
        service: &ServiceTarget,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, InvokeError> {
        let mut args = service.flags();
        args.push(path.to_string_lossy().into_owned());
        self.invoker
            .invoke(Subcommand::UploadFile, &args, cancel)
            .await
    }

    async fn add_roots(
        &self,
        service: &ServiceTarget,
        proof_set_id: &str,
        root: &str,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, InvokeError> {
        let mut args = service.flags();
        args.extend([
            "--proof-set-id".to_string(),
            proof_set_id.to_string(),
            "--root".to_string(),
            root.to_string(),
        ]);
        self.invoker
            .invoke(Subcommand::AddRoots, &args, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdp::testing::ScriptedInvoker;

    #[tokio::test]
    async fn test_tool_backend_builds_flags() {
        let invoker = ScriptedInvoker::new()
            .ok(Subcommand::CreateProofSet, "created")
            .ok(Subcommand::AddRoots, "added");
        let backend = ToolBackend::new(invoker);
        let service = ServiceTarget::new("http://sp:4702", "pdp-user");
        let cancel = CancellationToken::new();

        backend
            .create_proof_set(&service, "0xrecordkeeper", &cancel)
            .await
            .unwrap();
        backend
            .add_roots(&service, "42", "baga:sub", &cancel)
            .await
            .unwrap();

        let calls = backend.invoker().calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].1,
            vec![
                "--service-url",
                "http://sp:4702",
                "--service-name",
                "pdp-user",
                "--recordkeeper",
                "0xrecordkeeper"
            ]
        );
        assert_eq!(calls[1].0, Subcommand::AddRoots);
        assert_eq!(
            &calls[1].1[4..],
            &["--proof-set-id", "42", "--root", "baga:sub"]
        );
    }

    #[tokio::test]
    async fn test_upload_file_passes_path_last() {
        let backend = ToolBackend::new(ScriptedInvoker::new().ok(Subcommand::UploadFile, "cid"));
        let service = ServiceTarget::new("http://sp", "svc");
        backend
            .upload_file(&service, Path::new("/tmp/pdp-upload-x"), &CancellationToken::new())
            .await
            .unwrap();
        let calls = backend.invoker().calls();
        assert_eq!(calls[0].1.last().map(String::as_str), Some("/tmp/pdp-upload-x"));
    }
}
