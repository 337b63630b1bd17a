use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoStatus {
    Open,
    Closed,
}

impl PoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoStatus::Open => "OPEN",
            PoStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Some(PoStatus::Open),
            "CLOSED" => Some(PoStatus::Closed),
            _ => None,
        }
    }
}

/// 采购订单明细行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoLineItem {
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    pub amount: BigDecimal,     // 扩展金额 = 数量 × 单价
    pub gl_account: Option<String>,
}

/// 采购订单 (只读, 由采购导入创建)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: String,
    pub po_number: String,
    pub vendor_name: String,
    pub total_amount: BigDecimal,
    pub currency: String,
    #[serde(default)]
    pub line_items: Vec<PoLineItem>,
    pub status: PoStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnexureStatus {
    Pending,
    Approved,
    Rejected,
}

impl AnnexureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnexureStatus::Pending => "PENDING",
            AnnexureStatus::Approved => "APPROVED",
            AnnexureStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(AnnexureStatus::Pending),
            "APPROVED" => Some(AnnexureStatus::Approved),
            "REJECTED" => Some(AnnexureStatus::Rejected),
            _ => None,
        }
    }
}

/// 审批附件: 只有 APPROVED 时才覆盖 PO 的上限金额
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annexure {
    pub id: String,
    pub po_id: String,
    pub original_amount: BigDecimal,
    pub approved_amount: BigDecimal,
    pub status: AnnexureStatus,
}

/// 收货明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub description: String,
    pub quantity_received: BigDecimal,
}

/// 收货单 (三单匹配的第三单)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodsReceipt {
    pub id: String,
    pub po_id: String,
    #[serde(default)]
    pub lines: Vec<ReceiptLine>,
    pub received_at: DateTime<Utc>,
}
