use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 差异类型 (稳定的机器可读代码)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyCode {
    NoPoFound,
    PoLookupFailed,
    PoClosed,
    CurrencyMismatch,
    AmountVariance,
    UnitPriceMismatch,
    QuantityMismatch,
    QuantityNotReceived,
    UnmatchedInvoiceLine,
    UnbilledPoLine,
}

impl DiscrepancyCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscrepancyCode::NoPoFound => "NO_PO_FOUND",
            DiscrepancyCode::PoLookupFailed => "PO_LOOKUP_FAILED",
            DiscrepancyCode::PoClosed => "PO_CLOSED",
            DiscrepancyCode::CurrencyMismatch => "CURRENCY_MISMATCH",
            DiscrepancyCode::AmountVariance => "AMOUNT_VARIANCE",
            DiscrepancyCode::UnitPriceMismatch => "UNIT_PRICE_MISMATCH",
            DiscrepancyCode::QuantityMismatch => "QUANTITY_MISMATCH",
            DiscrepancyCode::QuantityNotReceived => "QUANTITY_NOT_RECEIVED",
            DiscrepancyCode::UnmatchedInvoiceLine => "UNMATCHED_INVOICE_LINE",
            DiscrepancyCode::UnbilledPoLine => "UNBILLED_PO_LINE",
        }
    }

    /// 明细层面的差异 (与金额层面相对)
    pub fn is_line_level(&self) -> bool {
        matches!(
            self,
            DiscrepancyCode::UnitPriceMismatch
                | DiscrepancyCode::QuantityMismatch
                | DiscrepancyCode::QuantityNotReceived
                | DiscrepancyCode::UnmatchedInvoiceLine
                | DiscrepancyCode::UnbilledPoLine
        )
    }
}

/// 单条差异: 每个问题单独一条, 方便复核人员逐条处理
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Discrepancy {
    pub code: DiscrepancyCode,
    pub message: String,
}

impl Discrepancy {
    pub fn new(code: DiscrepancyCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

/// 上限金额来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CeilingSource {
    PurchaseOrder,
    Annexure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedPo {
    pub id: String,
    pub po_number: String,
}

/// 发票明细与 PO 明细的配对结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePairing {
    pub invoice_line: usize,
    pub po_line: Option<usize>,
    pub paired_by: Option<PairedBy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PairedBy {
    Description,
    Position,
}

/// 三单匹配结果 (嵌入 Invoice.matching, 重新匹配时整体替换)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub is_matched: bool,
    pub discrepancies: Vec<Discrepancy>,
    pub matched_po: Option<MatchedPo>,
    pub ceiling_amount: Option<BigDecimal>,
    pub ceiling_source: Option<CeilingSource>,
    pub variance_amount: Option<BigDecimal>,
    /// 无上限 (上限为 0 而发票金额非 0) 时为 None
    pub variance_percent: Option<BigDecimal>,
    pub tolerance_percent: BigDecimal,
    #[serde(default)]
    pub line_pairings: Vec<LinePairing>,
}

impl MatchResult {
    pub fn has(&self, code: DiscrepancyCode) -> bool {
        self.discrepancies.iter().any(|d| d.code == code)
    }

    /// 审计日志用的差异拼接文本
    pub fn joined_discrepancies(&self) -> String {
        self.discrepancies
            .iter()
            .map(|d| d.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
