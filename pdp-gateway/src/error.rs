use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;

use crate::pdp::{FlowError, InvokeError, WorkflowError};
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
}

impl From<InvokeError> for AppError {
    fn from(err: InvokeError) -> Self {
        AppError::Workflow(err.into())
    }
}

fn workflow_status(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::ConfirmationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        WorkflowError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// The tool's own output when it has any, so clients see what `pdptool` said.
/// Parse failures name the missing field instead and carry the output in details.
fn workflow_message(err: &WorkflowError) -> String {
    match err {
        WorkflowError::Parse { .. } => err.to_string(),
        _ => match err.output() {
            Some(output) if !output.trimmed().is_empty() => output.text().into_owned(),
            _ => err.to_string(),
        },
    }
}

fn workflow_details(err: &WorkflowError, mut details: Value) -> Value {
    if let WorkflowError::Parse { output, .. } = err {
        details["output"] = json!(output.text());
    }
    details
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("Generating response for AppError: {:?}", self);

        let (status_code, message, details) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), json!({})),
            Self::Flow(flow) => (
                workflow_status(&flow.error),
                workflow_message(&flow.error),
                workflow_details(&flow.error, json!(flow.context)),
            ),
            Self::Workflow(err) => (
                workflow_status(err),
                workflow_message(err),
                workflow_details(err, json!({})),
            ),
            Self::Store(StoreError::NotFound(what)) => (
                StatusCode::NOT_FOUND,
                "Record not found".to_string(),
                json!({ "resource": what }),
            ),
            Self::Store(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), json!({})),
            Self::Multipart(err) => (err.status(), err.body_text(), json!({})),
        };

        (
            status_code,
            Json(json!({ "error": message, "details": details })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdp::{FlowContext, Subcommand, ToolOutput};

    #[test]
    fn test_tool_output_is_the_error_message() {
        let err = WorkflowError::Invocation {
            subcommand: Subcommand::AddRoots,
            output: ToolOutput::from("Error: invalid root\n"),
        };
        assert_eq!(workflow_message(&err), "Error: invalid root\n");

        let err = WorkflowError::Cancelled;
        assert_eq!(workflow_message(&err), "workflow cancelled");
    }

    #[test]
    fn test_parse_failure_names_the_field() {
        let err = WorkflowError::Parse {
            field: "transaction hash",
            output: ToolOutput::from("HTTP 201 Created\n"),
        };
        assert_eq!(workflow_message(&err), "could not determine transaction hash");
        let details = workflow_details(&err, json!({ "isEncrypted": false }));
        assert_eq!(details["output"], "HTTP 201 Created\n");
        assert_eq!(details["isEncrypted"], false);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::BadRequest("file is required".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Store(StoreError::NotFound("paper `x`".into()))
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        let timeout = FlowError {
            error: WorkflowError::ConfirmationTimeout {
                tx_hash: "0xabc".into(),
                polls: 200,
            },
            context: FlowContext::default(),
        };
        assert_eq!(
            AppError::from(timeout).into_response().status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
