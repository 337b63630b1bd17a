use thiserror::Error;

use crate::models::InvoiceStatus;

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invoice {0} not found")]
    NotFound(String),
    #[error("invoice {id} was modified concurrently (expected version {expected}, found {actual})")]
    VersionConflict { id: String, expected: i64, actual: i64 },
    #[error("invoice {0} already exists")]
    Duplicate(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// 采购数据查询错误 (匹配时会被降级为差异, 不会向上抛出)
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("procurement lookup timed out after {0} ms")]
    Timeout(u64),
    #[error("procurement data unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// 工作流操作被拒绝或失败的原因
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{action} is not allowed while the invoice is {status}: {rule}")]
    IllegalTransition {
        action: String,
        status: InvoiceStatus,
        rule: String,
    },
    #[error("{0}")]
    UnauthorizedRole(String),
    #[error("{0}")]
    PreconditionFailed(String),
    #[error("invoice {invoice_id} changed concurrently: {detail}")]
    Conflict { invoice_id: String, detail: String },
    #[error("invoice {0} not found")]
    NotFound(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("persistence failure: {0}")]
    Persistence(StoreError),
}

impl WorkflowError {
    /// 稳定的错误代码
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            WorkflowError::UnauthorizedRole(_) => "UNAUTHORIZED_ROLE",
            WorkflowError::PreconditionFailed(_) => "PRECONDITION_FAILED",
            WorkflowError::Conflict { .. } => "CONFLICT",
            WorkflowError::NotFound(_) => "NOT_FOUND",
            WorkflowError::InvalidPayload(_) => "INVALID_PAYLOAD",
            WorkflowError::Persistence(_) => "PERSISTENCE_FAILURE",
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => WorkflowError::NotFound(id),
            StoreError::VersionConflict { id, expected, actual } => WorkflowError::Conflict {
                invoice_id: id,
                detail: format!("expected version {}, found {}", expected, actual),
            },
            other => WorkflowError::Persistence(other),
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
