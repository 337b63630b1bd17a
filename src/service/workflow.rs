use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::audit::AuditRecorder;
use super::gate::{self, Permission};
use super::matcher::{load_policy, MatchPolicy, MatchingEngine};
use super::notify::Outbox;
use crate::config::AppConfig;
use crate::db::{Backends, InvoiceStore, SystemSettings};
use crate::error::{ConfigError, StoreError, WorkflowError, WorkflowResult};
use crate::models::{
    Actor, ApprovalRecord, AuditEntry, AuditFilter, HilReview, HilStatus, InfoRequest, Invoice,
    InvoiceCorrections, InvoicePatch, InvoiceStatus, MatchResult, NewAuditEntry, NewInvoice, Role,
};

use crate::models::InvoiceStatus::*;

/// 工作流操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowAction {
    StartDigitizing,
    CompleteExtraction,
    SubmitHilReview,
    ProcessMatch,
    Approve,
    FinanceApprove,
    ReleasePayment,
    Reject,
    RequestInfo,
    RespondInfo,
    Resubmit,
}

impl WorkflowAction {
    pub const ALL: [WorkflowAction; 11] = [
        WorkflowAction::StartDigitizing,
        WorkflowAction::CompleteExtraction,
        WorkflowAction::SubmitHilReview,
        WorkflowAction::ProcessMatch,
        WorkflowAction::Approve,
        WorkflowAction::FinanceApprove,
        WorkflowAction::ReleasePayment,
        WorkflowAction::Reject,
        WorkflowAction::RequestInfo,
        WorkflowAction::RespondInfo,
        WorkflowAction::Resubmit,
    ];

    /// 审计日志中的操作代码
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowAction::StartDigitizing => "START_DIGITIZING",
            WorkflowAction::CompleteExtraction => "COMPLETE_EXTRACTION",
            WorkflowAction::SubmitHilReview => "SUBMIT_HIL_REVIEW",
            WorkflowAction::ProcessMatch => "PROCESS_MATCH",
            WorkflowAction::Approve => "APPROVE",
            WorkflowAction::FinanceApprove => "FINANCE_APPROVE",
            WorkflowAction::ReleasePayment => "RELEASE_PAYMENT",
            WorkflowAction::Reject => "REJECT",
            WorkflowAction::RequestInfo => "REQUEST_INFO",
            WorkflowAction::RespondInfo => "RESPOND_INFO",
            WorkflowAction::Resubmit => "RESUBMIT",
        }
    }

    /// 允许发起该操作的状态
    pub fn legal_sources(&self) -> &'static [InvoiceStatus] {
        match self {
            WorkflowAction::StartDigitizing => &[Received],
            WorkflowAction::CompleteExtraction => &[Digitizing],
            WorkflowAction::SubmitHilReview => &[ValidationRequired],
            WorkflowAction::ProcessMatch => &[Received, Digitizing, MatchDiscrepancy],
            WorkflowAction::Approve => &[Verified, PendingApproval, MatchDiscrepancy, ValidationRequired],
            WorkflowAction::FinanceApprove => &[PendingApproval],
            WorkflowAction::ReleasePayment => &[Approved],
            WorkflowAction::Reject => &[
                Received,
                Digitizing,
                ValidationRequired,
                MatchDiscrepancy,
                Verified,
                PendingApproval,
                Approved,
                AwaitingInfo,
            ],
            WorkflowAction::RequestInfo => &[
                Received,
                Digitizing,
                ValidationRequired,
                MatchDiscrepancy,
                Verified,
                PendingApproval,
            ],
            WorkflowAction::RespondInfo => &[AwaitingInfo],
            WorkflowAction::Resubmit => &[Rejected],
        }
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for WorkflowAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        WorkflowAction::ALL
            .into_iter()
            .find(|a| a.code() == normalized)
            .ok_or_else(|| format!("unknown action: {}", s))
    }
}

/// 操作附带的数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionPayload {
    pub notes: Option<String>,
    /// 驳回原因
    pub reason: Option<String>,
    /// 补充信息请求内容
    pub message: Option<String>,
    /// 供应商答复
    pub response: Option<String>,
    /// 调用方看到的状态; 与当前状态不符时返回 CONFLICT
    pub expected_status: Option<InvoiceStatus>,
    /// 抽取置信度 (COMPLETE_EXTRACTION)
    pub confidence: Option<f64>,
    pub corrections: Option<InvoiceCorrections>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub new_status: InvoiceStatus,
    pub invoice: Invoice,
}

/// 操作的合法路径
enum Route {
    /// 固定路径, 每条边都要在状态表中
    Walk(&'static [InvoiceStatus]),
    /// 先走 `via`, 再按匹配结果进入 VERIFIED / MATCH_DISCREPANCY
    Match { via: &'static [InvoiceStatus] },
    /// 按抽取置信度决定进入人工复核还是直接匹配
    Extraction,
}

fn route(action: WorkflowAction, status: InvoiceStatus) -> Option<(Permission, Route)> {
    use WorkflowAction as A;
    let planned = match (action, status) {
        (A::StartDigitizing, Received) => (Permission::ManageIngestion, Route::Walk(&[Digitizing])),
        (A::CompleteExtraction, Digitizing) => (Permission::ManageIngestion, Route::Extraction),
        (A::SubmitHilReview, ValidationRequired) => {
            (Permission::ManageIngestion, Route::Walk(&[Digitizing]))
        }
        (A::ProcessMatch, Received) => (Permission::ProcessMatch, Route::Match { via: &[Digitizing] }),
        (A::ProcessMatch, Digitizing | MatchDiscrepancy) => {
            (Permission::ProcessMatch, Route::Match { via: &[] })
        }
        (A::Approve, Verified) => (Permission::ApproveMatch, Route::Walk(&[PendingApproval])),
        (A::Approve, PendingApproval) => (Permission::ReleasePayment, Route::Walk(&[Approved, Paid])),
        (A::Approve, MatchDiscrepancy) => (Permission::OverrideMatch, Route::Walk(&[Verified])),
        (A::Approve, ValidationRequired) => {
            (Permission::OverrideMatch, Route::Walk(&[Digitizing, Verified]))
        }
        (A::FinanceApprove, PendingApproval) => (Permission::FinanceApprove, Route::Walk(&[Approved])),
        (A::ReleasePayment, Approved) => (Permission::ReleasePayment, Route::Walk(&[Paid])),
        (A::Reject, s) if !s.is_terminal() => (Permission::Reject, Route::Walk(&[Rejected])),
        (A::RequestInfo, s) if A::RequestInfo.legal_sources().contains(&s) => {
            (Permission::RequestInfo, Route::Walk(&[AwaitingInfo]))
        }
        (A::RespondInfo, AwaitingInfo) => (Permission::RespondInfo, Route::Walk(&[Received])),
        (A::Resubmit, Rejected) => (Permission::Resubmit, Route::Walk(&[Received])),
        _ => return None,
    };
    Some(planned)
}

fn illegal(action: WorkflowAction, status: InvoiceStatus, rule: String) -> WorkflowError {
    WorkflowError::IllegalTransition {
        action: action.code().to_string(),
        status,
        rule,
    }
}

fn sources_rule(action: WorkflowAction) -> String {
    let names: Vec<&str> = action.legal_sources().iter().map(|s| s.as_str()).collect();
    format!("{} is only allowed from {}", action.code(), names.join(", "))
}

/// 一次评估的产物: 待提交的更新和审计记录
struct Prepared {
    new_status: InvoiceStatus,
    patch: InvoicePatch,
    audit: NewAuditEntry,
}

type LockTable = DashMap<String, Arc<Mutex<()>>>;

/// 单张发票的锁; 释放时若没有其他持有者则从表中移除
struct InvoiceLock<'a> {
    table: &'a LockTable,
    invoice_id: &'a str,
    mutex: Arc<Mutex<()>>,
}

impl<'a> InvoiceLock<'a> {
    fn acquire(table: &'a LockTable, invoice_id: &'a str) -> Self {
        let mutex = table
            .entry(invoice_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Self {
            table,
            invoice_id,
            mutex,
        }
    }

    fn mutex(&self) -> &Mutex<()> {
        &self.mutex
    }
}

impl Drop for InvoiceLock<'_> {
    fn drop(&mut self) {
        // 表内一份 + 本租约一份
        self.table
            .remove_if(self.invoice_id, |_, m| Arc::strong_count(m) == 2);
    }
}

/// 工作流引擎: 状态机 + 授权 + 匹配 + 原子提交
pub struct WorkflowEngine {
    store: Arc<dyn InvoiceStore>,
    settings: Arc<dyn SystemSettings>,
    matcher: MatchingEngine,
    audit: AuditRecorder,
    outbox: Outbox,
    default_policy: MatchPolicy,
    hil_threshold: f64,
    conflict_retries: u32,
    locks: LockTable,
}

impl WorkflowEngine {
    pub fn new(backends: Backends, outbox: Outbox, config: &AppConfig) -> Result<Self, ConfigError> {
        let default_policy =
            MatchPolicy::from_percent(config.matching.tolerance_percent).map_err(ConfigError::Invalid)?;
        Ok(Self {
            store: backends.invoices,
            settings: backends.settings,
            matcher: MatchingEngine::new(
                backends.procurement,
                Duration::from_millis(config.matching.lookup_timeout_ms),
            ),
            audit: AuditRecorder::new(backends.audit),
            outbox,
            default_policy,
            hil_threshold: config.matching.hil_confidence_threshold,
            conflict_retries: config.workflow.conflict_retries,
            locks: DashMap::new(),
        })
    }

    /// 新发票进入 RECEIVED, 同时写入 SUBMIT 审计记录
    pub async fn submit_invoice(&self, actor: &Actor, new: NewInvoice) -> WorkflowResult<Invoice> {
        validate_submission(&new)?;
        let now = Utc::now();
        let invoice = Invoice::from_submission(new, &actor.id, now);

        let decision = gate::authorize(actor, Permission::Submit, Some(&invoice));
        if !decision.allowed {
            return Err(WorkflowError::UnauthorizedRole(decision.reason.unwrap_or_default()));
        }

        let mut audit = NewAuditEntry::new(
            actor,
            "SUBMIT",
            format!(
                "Invoice {} from {} for {} {} submitted",
                invoice.invoice_number, invoice.vendor_name, invoice.amount, invoice.currency
            ),
            now,
        )
        .for_invoice(&invoice.id);
        audit.to_status = Some(Received.as_str().to_string());

        self.store.insert(&invoice, audit).await?;
        tracing::info!(
            invoice_id = %invoice.id,
            actor = %actor.id,
            "Invoice {} submitted",
            invoice.invoice_number
        );
        self.outbox.publish(invoice.clone(), Received);
        Ok(invoice)
    }

    /// 执行一次状态变更
    ///
    /// 检查顺序: 合法性, 角色 / 范围, 前置条件。成功时状态和审计记录一起提交,
    /// 之后发出一条通知。版本冲突时重新加载并重新评估, 最多重试 `conflict_retries` 次;
    /// 重新加载后状态已变化则返回 CONFLICT, 不会按新状态重新路由。
    pub async fn apply_action(
        &self,
        invoice_id: &str,
        action: WorkflowAction,
        actor: &Actor,
        payload: ActionPayload,
    ) -> WorkflowResult<ActionOutcome> {
        let lease = InvoiceLock::acquire(&self.locks, invoice_id);
        let _guard = lease.mutex().lock().await;

        let policy = load_policy(self.settings.as_ref(), &self.default_policy).await;
        let mut pinned = payload.expected_status;
        let mut attempt = 0u32;

        loop {
            let invoice = self
                .store
                .get(invoice_id)
                .await?
                .ok_or_else(|| WorkflowError::NotFound(invoice_id.to_string()))?;
            let from = invoice.status;
            let seen = *pinned.get_or_insert(from);

            let evaluated = if from != seen {
                Err(WorkflowError::Conflict {
                    invoice_id: invoice.id.clone(),
                    detail: format!("expected status {} but invoice is {}", seen, from),
                })
            } else {
                self.evaluate(&invoice, action, actor, &payload, &policy).await
            };
            let prepared = match evaluated {
                Ok(p) => p,
                Err(e) => {
                    tracing::info!(
                        invoice_id = %invoice_id,
                        action = %action,
                        status = %from,
                        code = e.code(),
                        "Action refused: {}",
                        e
                    );
                    return Err(e);
                }
            };
            let new_status = prepared.new_status;

            match self
                .store
                .commit_transition(invoice_id, invoice.version, &prepared.patch, prepared.audit)
                .await
            {
                Ok((updated, _entry)) => {
                    tracing::info!(
                        invoice_id = %invoice_id,
                        action = %action,
                        actor = %actor.id,
                        "Invoice {} -> {}",
                        from,
                        new_status
                    );
                    self.outbox.publish(updated.clone(), new_status);
                    return Ok(ActionOutcome {
                        new_status,
                        invoice: updated,
                    });
                }
                Err(StoreError::VersionConflict { expected, actual, .. }) if attempt < self.conflict_retries => {
                    attempt += 1;
                    tracing::warn!(
                        invoice_id = %invoice_id,
                        action = %action,
                        "Version conflict (expected {}, found {}), re-evaluating",
                        expected,
                        actual
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn evaluate(
        &self,
        invoice: &Invoice,
        action: WorkflowAction,
        actor: &Actor,
        payload: &ActionPayload,
        policy: &MatchPolicy,
    ) -> WorkflowResult<Prepared> {
        let from = invoice.status;

        // 1. 合法性
        let (permission, planned) =
            route(action, from).ok_or_else(|| illegal(action, from, sources_rule(action)))?;

        // 2. 角色 / 范围
        let decision = gate::authorize(actor, permission, Some(invoice));
        if !decision.allowed {
            return Err(WorkflowError::UnauthorizedRole(decision.reason.unwrap_or_default()));
        }

        // 3. 前置条件
        let finance_level = matches!(
            (action, from),
            (WorkflowAction::FinanceApprove, _) | (WorkflowAction::Approve, PendingApproval)
        );
        if finance_level && invoice.awaits_pm_approval() {
            return Err(WorkflowError::PreconditionFailed(format!(
                "project manager approval{} is required before finance approval",
                invoice
                    .assigned_pm
                    .as_deref()
                    .map(|pm| format!(" from {}", pm))
                    .unwrap_or_default()
            )));
        }

        // APPROVE 的含义随状态而变, 调用方必须声明看到的状态
        if action == WorkflowAction::Approve && payload.expected_status.is_none() {
            return Err(WorkflowError::InvalidPayload(format!(
                "APPROVE from {} needs expected_status",
                from
            )));
        }

        let now = Utc::now();
        let path: Vec<InvoiceStatus>;
        let mut patch = InvoicePatch::default();
        let details: String;

        match planned {
            Route::Walk(steps) => {
                path = steps.to_vec();
                details = self.apply_effects(invoice, action, actor, payload, now, &mut patch)?;
            }
            Route::Match { via } => {
                let (steps, text) = self.run_match(invoice, via, policy, now, &mut patch).await;
                path = steps;
                details = text;
            }
            Route::Extraction => {
                let confidence = payload
                    .confidence
                    .filter(|c| (0.0..=1.0).contains(c))
                    .ok_or_else(|| {
                        WorkflowError::InvalidPayload(
                            "COMPLETE_EXTRACTION needs a confidence between 0 and 1".to_string(),
                        )
                    })?;
                patch.extraction_confidence = Some(Some(confidence));
                if confidence < self.hil_threshold {
                    path = vec![ValidationRequired];
                    patch.hil_review = Some(HilReview {
                        status: HilStatus::Pending,
                        ..Default::default()
                    });
                    details = format!(
                        "Extraction confidence {:.2} is below {:.2}, sent for human review",
                        confidence, self.hil_threshold
                    );
                } else {
                    let (steps, text) = self.run_match(invoice, &[], policy, now, &mut patch).await;
                    path = steps;
                    details = format!("Extraction confidence {:.2}. {}", confidence, text);
                }
            }
        }

        from.validate_path(&path)
            .map_err(|(a, b)| illegal(action, from, format!("transition {} -> {} is not in the table", a, b)))?;
        let new_status = path.last().copied().unwrap_or(from);
        patch.status = Some(new_status);

        let audit = NewAuditEntry::new(actor, action.code(), details, now)
            .for_invoice(&invoice.id)
            .with_transition(from, new_status);

        Ok(Prepared {
            new_status,
            patch,
            audit,
        })
    }

    /// 匹配并决定终点; MATCH_DISCREPANCY 下再次失败时原地刷新结果
    async fn run_match(
        &self,
        invoice: &Invoice,
        via: &[InvoiceStatus],
        policy: &MatchPolicy,
        now: DateTime<Utc>,
        patch: &mut InvoicePatch,
    ) -> (Vec<InvoiceStatus>, String) {
        let result = self.matcher.perform_three_way_match(invoice, policy).await;
        let details = match_details(&result);

        let mut path = via.to_vec();
        let at = path.last().copied().unwrap_or(invoice.status);
        if result.is_matched {
            path.push(Verified);
        } else if at != MatchDiscrepancy {
            path.push(MatchDiscrepancy);
        }

        patch.matching = Some(Some(result));
        patch.matched_at = Some(Some(now));
        (path, details)
    }

    /// 固定路径操作的字段更新, 返回审计说明
    fn apply_effects(
        &self,
        invoice: &Invoice,
        action: WorkflowAction,
        actor: &Actor,
        payload: &ActionPayload,
        now: DateTime<Utc>,
        patch: &mut InvoicePatch,
    ) -> WorkflowResult<String> {
        let notes = payload.notes.clone();
        let details = match (action, invoice.status) {
            (WorkflowAction::StartDigitizing, _) => "Digitization started".to_string(),
            (WorkflowAction::SubmitHilReview, _) => {
                let corrections = payload.corrections.clone().filter(|c| !c.is_empty());
                if let Some(c) = &corrections {
                    check_corrections(actor, invoice, c)?;
                    *patch = std::mem::take(patch).with_corrections(c);
                }
                let text = match &corrections {
                    Some(_) => "Human review completed with corrections".to_string(),
                    None => "Human review completed without corrections".to_string(),
                };
                patch.hil_review = Some(HilReview {
                    status: HilStatus::Completed,
                    reviewed_by: Some(actor.name.clone()),
                    reviewed_at: Some(now),
                    corrections,
                });
                text
            }
            (WorkflowAction::Approve, Verified) => {
                patch.pm_approval = Some(ApprovalRecord::approved(&actor.name, now, notes.clone()));
                with_notes("Approved by project manager".to_string(), &notes)
            }
            (WorkflowAction::Approve, PendingApproval) => {
                patch.finance_approval = Some(ApprovalRecord::approved(&actor.name, now, notes.clone()));
                patch.paid_at = Some(Some(now));
                with_notes("Final approval given and payment released".to_string(), &notes)
            }
            (WorkflowAction::Approve, from) => {
                let reason = notes.clone().filter(|n| !n.trim().is_empty()).ok_or_else(|| {
                    WorkflowError::InvalidPayload("a manual override needs notes explaining it".to_string())
                })?;
                if from == ValidationRequired {
                    patch.hil_review = Some(HilReview {
                        status: HilStatus::Completed,
                        reviewed_by: Some(actor.name.clone()),
                        reviewed_at: Some(now),
                        corrections: None,
                    });
                }
                format!("Manual override from {}: {}", from, reason)
            }
            (WorkflowAction::FinanceApprove, _) => {
                patch.finance_approval = Some(ApprovalRecord::approved(&actor.name, now, notes.clone()));
                with_notes("Finance approval given".to_string(), &notes)
            }
            (WorkflowAction::ReleasePayment, _) => {
                patch.paid_at = Some(Some(now));
                with_notes("Payment released".to_string(), &notes)
            }
            (WorkflowAction::Reject, from) => {
                let reason = payload
                    .reason
                    .clone()
                    .or_else(|| notes.clone())
                    .unwrap_or_else(|| "no reason given".to_string());
                let record = ApprovalRecord::rejected(&actor.name, now, Some(reason.clone()));
                match from {
                    Verified => patch.pm_approval = Some(record),
                    PendingApproval | Approved => patch.finance_approval = Some(record),
                    _ => {}
                }
                format!("Rejected: {}", reason)
            }
            (WorkflowAction::RequestInfo, _) => {
                let message = payload.message.clone().or_else(|| notes.clone());
                patch.info_request = Some(Some(InfoRequest {
                    requested_by: actor.name.clone(),
                    requested_at: now,
                    message: message.clone(),
                    response: None,
                    responded_at: None,
                }));
                match message {
                    Some(m) => format!("Information requested: {}", m),
                    None => "Information requested".to_string(),
                }
            }
            (WorkflowAction::RespondInfo, _) => {
                let response = payload.response.clone().or_else(|| notes.clone());
                if let Some(request) = &invoice.info_request {
                    let mut answered = request.clone();
                    answered.response = response.clone();
                    answered.responded_at = Some(now);
                    patch.info_request = Some(Some(answered));
                }
                if let Some(c) = payload.corrections.as_ref().filter(|c| !c.is_empty()) {
                    check_corrections(actor, invoice, c)?;
                    *patch = std::mem::take(patch).with_corrections(c);
                }
                match response {
                    Some(r) => format!("Vendor responded: {}", r),
                    None => "Vendor responded".to_string(),
                }
            }
            (WorkflowAction::Resubmit, _) => {
                if let Some(c) = payload.corrections.as_ref().filter(|c| !c.is_empty()) {
                    check_corrections(actor, invoice, c)?;
                    *patch = std::mem::take(patch).with_corrections(c);
                }
                patch.pm_approval = Some(ApprovalRecord::default());
                patch.finance_approval = Some(ApprovalRecord::default());
                patch.hil_review = Some(HilReview::default());
                patch.matching = Some(None);
                patch.matched_at = Some(None);
                patch.extraction_confidence = Some(None);
                patch.info_request = Some(None);
                patch.paid_at = Some(None);
                with_notes("Invoice resubmitted".to_string(), &notes)
            }
            (WorkflowAction::CompleteExtraction | WorkflowAction::ProcessMatch, from) => {
                return Err(illegal(action, from, sources_rule(action)));
            }
        };
        Ok(details)
    }

    pub async fn get_invoice(&self, actor: &Actor, invoice_id: &str) -> WorkflowResult<Invoice> {
        let invoice = self
            .store
            .get(invoice_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(invoice_id.to_string()))?;
        let decision = gate::authorize(actor, Permission::ViewInvoice, Some(&invoice));
        if !decision.allowed {
            return Err(WorkflowError::UnauthorizedRole(decision.reason.unwrap_or_default()));
        }
        Ok(invoice)
    }

    /// 按角色可见范围列出发票
    pub async fn list_invoices(&self, actor: &Actor) -> WorkflowResult<Vec<Invoice>> {
        Ok(self.store.list_all(&gate::visibility(actor)).await?)
    }

    pub async fn audit_trail(&self, actor: &Actor, filter: &AuditFilter) -> WorkflowResult<Vec<AuditEntry>> {
        let decision = gate::authorize(actor, Permission::ViewAuditLog, None);
        if !decision.allowed {
            return Err(WorkflowError::UnauthorizedRole(decision.reason.unwrap_or_default()));
        }
        Ok(self.audit.query(filter).await?)
    }

    /// 批量试匹配: 不改变状态, 每张发票记一条 MATCH_PREVIEW 审计
    pub async fn preview_matches(
        &self,
        actor: &Actor,
        invoice_ids: &[String],
    ) -> WorkflowResult<Vec<(String, MatchResult)>> {
        let decision = gate::authorize(actor, Permission::ProcessMatch, None);
        if !decision.allowed {
            return Err(WorkflowError::UnauthorizedRole(decision.reason.unwrap_or_default()));
        }

        let mut invoices = Vec::with_capacity(invoice_ids.len());
        for id in invoice_ids {
            let invoice = self
                .store
                .get(id)
                .await?
                .ok_or_else(|| WorkflowError::NotFound(id.clone()))?;
            invoices.push(invoice);
        }

        let policy = load_policy(self.settings.as_ref(), &self.default_policy).await;
        let results = self.matcher.perform_batch(&invoices, &policy).await;
        let now = Utc::now();

        Ok(invoices
            .into_iter()
            .zip(results)
            .map(|(invoice, result)| {
                self.audit.record(
                    NewAuditEntry::new(actor, "MATCH_PREVIEW", match_details(&result), now)
                        .for_invoice(&invoice.id),
                );
                (invoice.id, result)
            })
            .collect())
    }
}

fn validate_submission(new: &NewInvoice) -> WorkflowResult<()> {
    check_header(&new.vendor_name, &new.invoice_number, &new.currency, &new.amount)
}

fn check_header(vendor_name: &str, invoice_number: &str, currency: &str, amount: &BigDecimal) -> WorkflowResult<()> {
    if vendor_name.trim().is_empty() {
        return Err(WorkflowError::InvalidPayload("vendor name is required".to_string()));
    }
    if invoice_number.trim().is_empty() {
        return Err(WorkflowError::InvalidPayload("invoice number is required".to_string()));
    }
    if currency.trim().is_empty() {
        return Err(WorkflowError::InvalidPayload("currency is required".to_string()));
    }
    if *amount < BigDecimal::from(0) {
        return Err(WorkflowError::InvalidPayload("amount cannot be negative".to_string()));
    }
    Ok(())
}

/// 更正后的发票头必须仍然有效; 供应商不能把发票改到其他供应商名下
fn check_corrections(actor: &Actor, invoice: &Invoice, c: &InvoiceCorrections) -> WorkflowResult<()> {
    if actor.role == Role::Vendor {
        if let Some(name) = c.vendor_name.as_deref().filter(|n| *n != invoice.vendor_name) {
            return Err(WorkflowError::UnauthorizedRole(format!(
                "vendors cannot move an invoice to another vendor ({} -> {})",
                invoice.vendor_name, name
            )));
        }
    }
    check_header(
        c.vendor_name.as_deref().unwrap_or(&invoice.vendor_name),
        c.invoice_number.as_deref().unwrap_or(&invoice.invoice_number),
        c.currency.as_deref().unwrap_or(&invoice.currency),
        c.amount.as_ref().unwrap_or(&invoice.amount),
    )
}

fn match_details(result: &MatchResult) -> String {
    let po = result
        .matched_po
        .as_ref()
        .map(|p| p.po_number.as_str())
        .unwrap_or("no purchase order");
    if result.is_matched {
        format!("Three-way match passed against {}", po)
    } else {
        format!("Three-way match failed: {}", result.joined_discrepancies())
    }
}

fn with_notes(text: String, notes: &Option<String>) -> String {
    match notes.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => format!("{}: {}", text, n),
        None => text,
    }
}
