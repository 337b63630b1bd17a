use crate::models::{AuditEntry, AuditFilter, Invoice, MatchResult, NewInvoice};
use crate::service::{ActionOutcome, ActionPayload, WorkflowAction, WorkflowEngine};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::actor::CurrentActor;
use super::error::ApiError;

/// 请求体: 操作 + 附带数据
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: WorkflowAction,
    #[serde(flatten)]
    pub payload: ActionPayload,
}

/// 请求体: 发票ID列表
#[derive(Debug, Deserialize)]
pub struct BatchMatchRequest {
    pub invoice_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

/// 成功响应
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct BatchMatchItem {
    pub invoice_id: String,
    pub result: MatchResult,
}

fn ok<T: Serialize>(status: StatusCode, message: String, data: T) -> Response {
    let body = ApiResponse {
        success: true,
        message,
        data,
    };
    (status, Json(body)).into_response()
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 提交发票
pub async fn submit_invoice(
    State(engine): State<Arc<WorkflowEngine>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<NewInvoice>,
) -> Result<Response, ApiError> {
    let invoice: Invoice = engine.submit_invoice(&actor, req).await?;
    Ok(ok(
        StatusCode::CREATED,
        format!("Invoice {} received", invoice.invoice_number),
        invoice,
    ))
}

pub async fn list_invoices(
    State(engine): State<Arc<WorkflowEngine>>,
    CurrentActor(actor): CurrentActor,
) -> Result<Response, ApiError> {
    let invoices = engine.list_invoices(&actor).await?;
    Ok(ok(StatusCode::OK, format!("{} invoices", invoices.len()), invoices))
}

pub async fn get_invoice(
    State(engine): State<Arc<WorkflowEngine>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let invoice = engine.get_invoice(&actor, &id).await?;
    Ok(ok(StatusCode::OK, String::new(), invoice))
}

/// 执行工作流操作
pub async fn apply_action(
    State(engine): State<Arc<WorkflowEngine>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(req): Json<ActionRequest>,
) -> Result<Response, ApiError> {
    let outcome: ActionOutcome = engine
        .apply_action(&id, req.action, &actor, req.payload)
        .await?;
    Ok(ok(
        StatusCode::OK,
        format!("{} -> {}", req.action, outcome.new_status),
        outcome,
    ))
}

pub async fn invoice_audit(
    State(engine): State<Arc<WorkflowEngine>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Query(query): Query<AuditQuery>,
) -> Result<Response, ApiError> {
    let filter = AuditFilter {
        limit: query.limit,
        ..AuditFilter::for_invoice(&id)
    };
    let entries: Vec<AuditEntry> = engine.audit_trail(&actor, &filter).await?;
    Ok(ok(StatusCode::OK, format!("{} entries", entries.len()), entries))
}

pub async fn audit_log(
    State(engine): State<Arc<WorkflowEngine>>,
    CurrentActor(actor): CurrentActor,
    Query(filter): Query<AuditFilter>,
) -> Result<Response, ApiError> {
    let entries = engine.audit_trail(&actor, &filter).await?;
    Ok(ok(StatusCode::OK, format!("{} entries", entries.len()), entries))
}

/// 批量试匹配 (不改变发票状态)
pub async fn batch_match(
    State(engine): State<Arc<WorkflowEngine>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<BatchMatchRequest>,
) -> Result<Response, ApiError> {
    if req.invoice_ids.is_empty() {
        return Err(ApiError::BadRequest("invoice_ids must not be empty".to_string()));
    }
    let results = engine.preview_matches(&actor, &req.invoice_ids).await?;
    let matched = results.iter().filter(|(_, r)| r.is_matched).count();
    let items: Vec<BatchMatchItem> = results
        .into_iter()
        .map(|(invoice_id, result)| BatchMatchItem { invoice_id, result })
        .collect();
    Ok(ok(
        StatusCode::OK,
        format!("Matched {} of {} invoices", matched, items.len()),
        items,
    ))
}
