use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::result::MatchResult;
use super::status::InvoiceStatus;

/// 发票明细行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    pub amount: BigDecimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// 审批记录 (PM / 财务共用同一结构)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub status: ApprovalStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl ApprovalRecord {
    pub fn approved(by: &str, at: DateTime<Utc>, notes: Option<String>) -> Self {
        Self {
            status: ApprovalStatus::Approved,
            approved_by: Some(by.to_string()),
            approved_at: Some(at),
            notes,
        }
    }

    pub fn rejected(by: &str, at: DateTime<Utc>, notes: Option<String>) -> Self {
        Self {
            status: ApprovalStatus::Rejected,
            approved_by: Some(by.to_string()),
            approved_at: Some(at),
            notes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HilStatus {
    #[default]
    NotRequired,
    Pending,
    Completed,
}

/// 人工复核 (低置信度抽取结果)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HilReview {
    pub status: HilStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub corrections: Option<InvoiceCorrections>,
}

/// 复核人员对抽取字段的更正
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InvoiceCorrections {
    pub vendor_name: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub po_number: Option<String>,
    pub line_items: Option<Vec<LineItem>>,
}

impl InvoiceCorrections {
    pub fn is_empty(&self) -> bool {
        *self == InvoiceCorrections::default()
    }
}

/// 向供应商发起的补充信息请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoRequest {
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub message: Option<String>,
    pub response: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
}

/// 发票 (审批和匹配子对象的聚合根)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub vendor_name: String,
    pub invoice_number: String,
    pub invoice_date: Option<NaiveDate>,
    pub amount: BigDecimal,
    pub currency: String,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    pub po_number: Option<String>,
    pub project: Option<String>,
    pub assigned_pm: Option<String>,
    pub status: InvoiceStatus,
    #[serde(default)]
    pub pm_approval: ApprovalRecord,
    #[serde(default)]
    pub finance_approval: ApprovalRecord,
    #[serde(default)]
    pub hil_review: HilReview,
    pub matching: Option<MatchResult>,
    pub matched_at: Option<DateTime<Utc>>,
    pub extraction_confidence: Option<f64>,
    pub info_request: Option<InfoRequest>,
    pub paid_at: Option<DateTime<Utc>>,
    pub submitted_by: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// 按提交内容创建一张 RECEIVED 状态的新发票
    pub fn from_submission(new: NewInvoice, submitted_by: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            vendor_name: new.vendor_name,
            invoice_number: new.invoice_number,
            invoice_date: new.invoice_date,
            amount: new.amount,
            currency: new.currency,
            line_items: new.line_items,
            po_number: new.po_number,
            project: new.project,
            assigned_pm: new.assigned_pm,
            status: InvoiceStatus::Received,
            pm_approval: ApprovalRecord::default(),
            finance_approval: ApprovalRecord::default(),
            hil_review: HilReview::default(),
            matching: None,
            matched_at: None,
            extraction_confidence: None,
            info_request: None,
            paid_at: None,
            submitted_by: submitted_by.to_string(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// 财务审批前是否还缺 PM 审批
    pub fn awaits_pm_approval(&self) -> bool {
        self.assigned_pm.is_some() && self.pm_approval.status != ApprovalStatus::Approved
    }

    /// 把局部更新合并进来 (未指定的字段保持不变)
    pub fn merge(&mut self, patch: &InvoicePatch) {
        if let Some(v) = patch.status {
            self.status = v;
        }
        if let Some(v) = &patch.vendor_name {
            self.vendor_name = v.clone();
        }
        if let Some(v) = &patch.invoice_number {
            self.invoice_number = v.clone();
        }
        if let Some(v) = &patch.invoice_date {
            self.invoice_date = *v;
        }
        if let Some(v) = &patch.amount {
            self.amount = v.clone();
        }
        if let Some(v) = &patch.currency {
            self.currency = v.clone();
        }
        if let Some(v) = &patch.line_items {
            self.line_items = v.clone();
        }
        if let Some(v) = &patch.po_number {
            self.po_number = v.clone();
        }
        if let Some(v) = &patch.project {
            self.project = v.clone();
        }
        if let Some(v) = &patch.assigned_pm {
            self.assigned_pm = v.clone();
        }
        if let Some(v) = &patch.pm_approval {
            self.pm_approval = v.clone();
        }
        if let Some(v) = &patch.finance_approval {
            self.finance_approval = v.clone();
        }
        if let Some(v) = &patch.hil_review {
            self.hil_review = v.clone();
        }
        if let Some(v) = &patch.matching {
            self.matching = v.clone();
        }
        if let Some(v) = &patch.matched_at {
            self.matched_at = *v;
        }
        if let Some(v) = &patch.extraction_confidence {
            self.extraction_confidence = *v;
        }
        if let Some(v) = &patch.info_request {
            self.info_request = v.clone();
        }
        if let Some(v) = &patch.paid_at {
            self.paid_at = *v;
        }
    }
}

/// 供应商 / 导入提交的新发票
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub vendor_name: String,
    pub invoice_number: String,
    pub invoice_date: Option<NaiveDate>,
    pub amount: BigDecimal,
    pub currency: String,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    pub po_number: Option<String>,
    pub project: Option<String>,
    pub assigned_pm: Option<String>,
}

/// 局部更新: `None` 表示保持原值; 可空字段用 `Some(None)` 清空
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoicePatch {
    pub status: Option<InvoiceStatus>,
    pub vendor_name: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<Option<NaiveDate>>,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub line_items: Option<Vec<LineItem>>,
    pub po_number: Option<Option<String>>,
    pub project: Option<Option<String>>,
    pub assigned_pm: Option<Option<String>>,
    pub pm_approval: Option<ApprovalRecord>,
    pub finance_approval: Option<ApprovalRecord>,
    pub hil_review: Option<HilReview>,
    pub matching: Option<Option<MatchResult>>,
    pub matched_at: Option<Option<DateTime<Utc>>>,
    pub extraction_confidence: Option<Option<f64>>,
    pub info_request: Option<Option<InfoRequest>>,
    pub paid_at: Option<Option<DateTime<Utc>>>,
}

impl InvoicePatch {
    pub fn status(status: InvoiceStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// 复核更正转换为字段级更新
    pub fn with_corrections(mut self, c: &InvoiceCorrections) -> Self {
        if let Some(v) = &c.vendor_name {
            self.vendor_name = Some(v.clone());
        }
        if let Some(v) = &c.invoice_number {
            self.invoice_number = Some(v.clone());
        }
        if let Some(v) = c.invoice_date {
            self.invoice_date = Some(Some(v));
        }
        if let Some(v) = &c.amount {
            self.amount = Some(v.clone());
        }
        if let Some(v) = &c.currency {
            self.currency = Some(v.clone());
        }
        if let Some(v) = &c.po_number {
            self.po_number = Some(Some(v.clone()));
        }
        if let Some(v) = &c.line_items {
            self.line_items = Some(v.clone());
        }
        self
    }
}

/// `list_all` 的可见范围
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InvoiceFilter {
    #[default]
    All,
    Projects(Vec<String>),
    Vendor(String),
    Nothing,
}

impl InvoiceFilter {
    pub fn admits(&self, invoice: &Invoice) -> bool {
        match self {
            InvoiceFilter::All => true,
            InvoiceFilter::Projects(projects) => invoice
                .project
                .as_ref()
                .is_some_and(|p| projects.iter().any(|q| q == p)),
            InvoiceFilter::Vendor(vendor) => invoice.vendor_name == *vendor,
            InvoiceFilter::Nothing => false,
        }
    }
}
