use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::actor::Actor;
use super::status::InvoiceStatus;

/// 审计日志 (只追加, 写入后不可修改)
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: i64,                      // 插入顺序, 同一时间戳时用来排序
    pub invoice_id: Option<String>,    // 系统级事件为空
    pub actor_id: String,
    pub actor_name: String,
    pub action: String,
    pub details: String,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 待写入的审计记录 (seq 由存储分配)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub invoice_id: Option<String>,
    pub actor_id: String,
    pub actor_name: String,
    pub action: String,
    pub details: String,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewAuditEntry {
    pub fn new(actor: &Actor, action: &str, details: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            invoice_id: None,
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            action: action.to_string(),
            details: details.into(),
            from_status: None,
            to_status: None,
            created_at: at,
        }
    }

    pub fn for_invoice(mut self, invoice_id: &str) -> Self {
        self.invoice_id = Some(invoice_id.to_string());
        self
    }

    pub fn with_transition(mut self, from: InvoiceStatus, to: InvoiceStatus) -> Self {
        self.from_status = Some(from.as_str().to_string());
        self.to_status = Some(to.as_str().to_string());
        self
    }

    pub fn into_entry(self, seq: i64) -> AuditEntry {
        AuditEntry {
            seq,
            invoice_id: self.invoice_id,
            actor_id: self.actor_id,
            actor_name: self.actor_name,
            action: self.action,
            details: self.details,
            from_status: self.from_status,
            to_status: self.to_status,
            created_at: self.created_at,
        }
    }
}

/// 审计查询条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuditFilter {
    pub invoice_id: Option<String>,
    pub actor_id: Option<String>,
    pub action: Option<String>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn for_invoice(invoice_id: &str) -> Self {
        Self {
            invoice_id: Some(invoice_id.to_string()),
            ..Default::default()
        }
    }

    pub fn admits(&self, entry: &AuditEntry) -> bool {
        if let Some(id) = &self.invoice_id {
            if entry.invoice_id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if let Some(actor) = &self.actor_id {
            if entry.actor_id != *actor {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if entry.action != *action {
                return false;
            }
        }
        true
    }
}

/// 最新的在前; 时间相同按插入顺序 (后插入的在前)
pub fn sort_newest_first(entries: &mut [AuditEntry]) {
    entries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.seq.cmp(&a.seq))
    });
}
