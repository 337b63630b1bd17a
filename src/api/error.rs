use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::WorkflowError;

/// 接口错误
#[derive(Debug)]
pub enum ApiError {
    Workflow(WorkflowError),
    /// 缺少或无法解析操作者信息
    MissingActor(String),
    BadRequest(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        ApiError::Workflow(e)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Workflow(e) => {
                let status = match e {
                    WorkflowError::IllegalTransition { .. } | WorkflowError::Conflict { .. } => {
                        StatusCode::CONFLICT
                    }
                    WorkflowError::UnauthorizedRole(_) => StatusCode::FORBIDDEN,
                    WorkflowError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
                    WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
                    WorkflowError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
                    WorkflowError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, e.code())
            }
            ApiError::MissingActor(_) => (StatusCode::UNAUTHORIZED, "MISSING_ACTOR"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            ApiError::Workflow(e) => e.to_string(),
            ApiError::MissingActor(m) | ApiError::BadRequest(m) => m.clone(),
        };
        if status.is_server_error() {
            tracing::error!(code, "Request failed: {}", message);
        }
        let body = ErrorBody {
            success: false,
            code: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn workflow_codes_map_to_http_statuses() {
        let cases = [
            (WorkflowError::UnauthorizedRole("no".into()), StatusCode::FORBIDDEN),
            (WorkflowError::PreconditionFailed("pm".into()), StatusCode::PRECONDITION_FAILED),
            (WorkflowError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                WorkflowError::Persistence(StoreError::Unavailable("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
    }
}
