use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::run::RunError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Run(#[from] RunError),
}

impl SessionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SessionError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            SessionError::Run(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the client; transport failures keep their context chain.
    pub fn client_message(&self) -> String {
        format!("{self:#}")
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        let msg = self.client_message();
        if code.is_server_error() {
            error!(status = %code.as_u16(), error = %msg, "chat request failed");
        }
        (code, Json(serde_json::json!({ "error": msg }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::RunStatus;

    #[test]
    fn test_session_error_display() {
        let error = SessionError::InvalidRequest("Invalid action".to_string());
        assert_eq!(format!("{}", error), "Invalid action");
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);

        let error = SessionError::from(RunError::RunFailed {
            run_id: "run_1".into(),
            status: RunStatus::Expired,
            message: None,
        });
        assert_eq!(error.client_message(), "Run failed with status: expired");
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn transport_message_keeps_chain() {
        let error = SessionError::from(RunError::from(
            anyhow::anyhow!("connection refused").context("create run"),
        ));
        assert_eq!(error.client_message(), "create run: connection refused");
    }
}
