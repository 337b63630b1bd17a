use bigdecimal::{BigDecimal, Zero};
use futures::future::join_all;
use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::MAX_TOLERANCE_PERCENT;
use crate::db::{ProcurementLookup, SystemSettings};
use crate::error::LookupError;
use crate::models::{
    Annexure, AnnexureStatus, CeilingSource, Discrepancy, DiscrepancyCode, GoodsReceipt, Invoice,
    LineItem, LinePairing, MatchResult, MatchedPo, PairedBy, PoLineItem, PoStatus, PurchaseOrder,
};

/// 匹配策略 (容差), 每次操作读取一次后作为值传入匹配算法
#[derive(Debug, Clone, PartialEq)]
pub struct MatchPolicy {
    pub tolerance_percent: BigDecimal,
}

impl MatchPolicy {
    pub fn new(tolerance_percent: BigDecimal) -> Result<Self, String> {
        let max = BigDecimal::from(MAX_TOLERANCE_PERCENT as i64);
        if tolerance_percent < BigDecimal::zero() || tolerance_percent > max {
            return Err(format!(
                "tolerance {}% is outside the allowed range 0-{}%",
                tolerance_percent, MAX_TOLERANCE_PERCENT
            ));
        }
        Ok(Self { tolerance_percent })
    }

    /// 从配置中的浮点数构造 (配置加载时已校验范围)
    pub fn from_percent(percent: f64) -> Result<Self, String> {
        let value = BigDecimal::from_str(&percent.to_string())
            .map_err(|e| format!("invalid tolerance {}: {}", percent, e))?;
        Self::new(value)
    }
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            tolerance_percent: BigDecimal::from(5),
        }
    }
}

/// 读取系统设置中的容差; 不可读或越界时回退到默认值
pub async fn load_policy(settings: &dyn SystemSettings, fallback: &MatchPolicy) -> MatchPolicy {
    match settings.match_tolerance_percent().await {
        Ok(Some(value)) => match MatchPolicy::new(value) {
            Ok(policy) => policy,
            Err(reason) => {
                tracing::warn!("Ignoring configured match tolerance: {}", reason);
                fallback.clone()
            }
        },
        Ok(None) => fallback.clone(),
        Err(e) => {
            tracing::warn!("System settings unavailable, using default tolerance: {}", e);
            fallback.clone()
        }
    }
}

/// PO 解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum PoResolution {
    Resolved(PurchaseOrder),
    NotFound(String),
    LookupFailed(String),
}

/// 纯匹配函数的全部输入
#[derive(Debug, Clone)]
pub struct MatchInput {
    pub invoice: Invoice,
    pub resolution: PoResolution,
    pub annexure: Option<Annexure>,
    pub receipts: Vec<GoodsReceipt>,
    /// 附件 / 收货单查询失败的说明, 每条都会成为一条差异
    pub lookup_failures: Vec<String>,
}

/// 三单匹配 (纯函数): 相同输入总是得到相同结果
pub fn three_way_match(input: &MatchInput, policy: &MatchPolicy) -> MatchResult {
    let invoice = &input.invoice;
    let mut discrepancies: IndexSet<Discrepancy> = IndexSet::new();

    let po = match &input.resolution {
        PoResolution::Resolved(po) => po,
        PoResolution::NotFound(reason) => {
            discrepancies.insert(Discrepancy::new(DiscrepancyCode::NoPoFound, reason.clone()));
            return unresolved(discrepancies, policy);
        }
        PoResolution::LookupFailed(reason) => {
            discrepancies.insert(Discrepancy::new(DiscrepancyCode::PoLookupFailed, reason.clone()));
            return unresolved(discrepancies, policy);
        }
    };

    for failure in &input.lookup_failures {
        discrepancies.insert(Discrepancy::new(DiscrepancyCode::PoLookupFailed, failure.clone()));
    }

    // 1. 金额层面
    let mut amount_ok = true;

    if po.status == PoStatus::Closed {
        amount_ok = false;
        discrepancies.insert(Discrepancy::new(
            DiscrepancyCode::PoClosed,
            format!("Purchase order {} is closed", po.po_number),
        ));
    }

    if !invoice.currency.trim().eq_ignore_ascii_case(po.currency.trim()) {
        amount_ok = false;
        discrepancies.insert(Discrepancy::new(
            DiscrepancyCode::CurrencyMismatch,
            format!(
                "Invoice currency {} does not match purchase order {} currency {}",
                invoice.currency, po.po_number, po.currency
            ),
        ));
    }

    let (ceiling, ceiling_source) = match &input.annexure {
        Some(a) if a.status == AnnexureStatus::Approved && a.po_id == po.id => {
            (a.approved_amount.clone(), CeilingSource::Annexure)
        }
        _ => (po.total_amount.clone(), CeilingSource::PurchaseOrder),
    };

    let variance_amount = (&invoice.amount - &ceiling).abs();
    let variance_percent = percent_of(&variance_amount, &ceiling);
    let within_tolerance = variance_percent
        .as_ref()
        .is_some_and(|p| *p <= policy.tolerance_percent);

    if !within_tolerance {
        amount_ok = false;
        let source = match ceiling_source {
            CeilingSource::Annexure => "approved annexure ceiling",
            CeilingSource::PurchaseOrder => "total",
        };
        let percent = variance_percent
            .as_ref()
            .map(|p| format!("{}%", fmt_decimal(p)))
            .unwrap_or_else(|| "unbounded".to_string());
        discrepancies.insert(Discrepancy::new(
            DiscrepancyCode::AmountVariance,
            format!(
                "Invoice amount {} {} differs from purchase order {} {} {} by {} ({}), exceeding the {}% tolerance",
                fmt_decimal(&invoice.amount),
                invoice.currency,
                po.po_number,
                source,
                fmt_decimal(&ceiling),
                fmt_decimal(&variance_amount),
                percent,
                fmt_decimal(&policy.tolerance_percent),
            ),
        ));
    }

    // 2. 明细层面
    let mut line_pairings = Vec::new();
    if !invoice.line_items.is_empty() && !po.line_items.is_empty() {
        let (pairings, found) = pair_line_items(&invoice.line_items, &po.line_items);
        line_pairings = pairings;
        discrepancies.extend(found);
    }

    // 3. 收货层面
    if !input.receipts.is_empty() && !invoice.line_items.is_empty() {
        discrepancies.extend(check_receipts(
            &invoice.line_items,
            &line_pairings,
            &po.line_items,
            &input.receipts,
        ));
    }

    let line_ok = !discrepancies.iter().any(|d| d.code.is_line_level());
    let is_matched = amount_ok && line_ok && input.lookup_failures.is_empty();

    MatchResult {
        is_matched,
        discrepancies: discrepancies.into_iter().collect(),
        matched_po: Some(MatchedPo {
            id: po.id.clone(),
            po_number: po.po_number.clone(),
        }),
        ceiling_amount: Some(ceiling),
        ceiling_source: Some(ceiling_source),
        variance_amount: Some(variance_amount),
        variance_percent,
        tolerance_percent: policy.tolerance_percent.clone(),
        line_pairings,
    }
}

/// 并行批量匹配 (匹配本身无共享可变状态)
pub fn match_batch(inputs: &[MatchInput], policy: &MatchPolicy) -> Vec<MatchResult> {
    inputs
        .par_iter()
        .map(|input| three_way_match(input, policy))
        .collect()
}

fn unresolved(discrepancies: IndexSet<Discrepancy>, policy: &MatchPolicy) -> MatchResult {
    MatchResult {
        is_matched: false,
        discrepancies: discrepancies.into_iter().collect(),
        matched_po: None,
        ceiling_amount: None,
        ceiling_source: None,
        variance_amount: None,
        variance_percent: None,
        tolerance_percent: policy.tolerance_percent.clone(),
        line_pairings: Vec::new(),
    }
}

/// 差异占上限的百分比; 上限为 0 且差异非 0 时无界 (None)
fn percent_of(variance: &BigDecimal, ceiling: &BigDecimal) -> Option<BigDecimal> {
    if ceiling.is_zero() {
        return if variance.is_zero() { Some(BigDecimal::zero()) } else { None };
    }
    Some(variance * BigDecimal::from(100) / ceiling.abs())
}

fn fmt_decimal(value: &BigDecimal) -> String {
    value.round(2).with_scale(2).to_string()
}

fn normalize_description(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// 明细配对:
/// 1. 先按描述 (忽略大小写和多余空白) 精确配对, 同名时取序号最小的未配对 PO 行;
/// 2. 剩余的发票行按相同序号配对 (该序号的 PO 行尚未被占用时);
/// 3. 仍未配对的发票行 / PO 行各自记为差异。
pub fn pair_line_items(
    invoice_lines: &[LineItem],
    po_lines: &[PoLineItem],
) -> (Vec<LinePairing>, Vec<Discrepancy>) {
    let mut by_description: IndexMap<String, Vec<usize>> = IndexMap::new();
    for (idx, line) in po_lines.iter().enumerate() {
        by_description
            .entry(normalize_description(&line.description))
            .or_default()
            .push(idx);
    }

    let mut po_taken = vec![false; po_lines.len()];
    let mut assigned: Vec<Option<(usize, PairedBy)>> = vec![None; invoice_lines.len()];

    for (i, line) in invoice_lines.iter().enumerate() {
        if let Some(candidates) = by_description.get(&normalize_description(&line.description)) {
            if let Some(&j) = candidates.iter().find(|&&j| !po_taken[j]) {
                po_taken[j] = true;
                assigned[i] = Some((j, PairedBy::Description));
            }
        }
    }

    for (i, slot) in assigned.iter_mut().enumerate() {
        if slot.is_none() && i < po_lines.len() && !po_taken[i] {
            po_taken[i] = true;
            *slot = Some((i, PairedBy::Position));
        }
    }

    let mut pairings = Vec::with_capacity(invoice_lines.len());
    let mut discrepancies = Vec::new();

    for (i, line) in invoice_lines.iter().enumerate() {
        match assigned[i] {
            Some((j, paired_by)) => {
                let po_line = &po_lines[j];
                if line.quantity != po_line.quantity {
                    discrepancies.push(Discrepancy::new(
                        DiscrepancyCode::QuantityMismatch,
                        format!(
                            "Line {} \"{}\": invoiced quantity {} differs from ordered quantity {}",
                            i + 1,
                            line.description,
                            line.quantity,
                            po_line.quantity
                        ),
                    ));
                }
                if line.unit_price != po_line.unit_price {
                    discrepancies.push(Discrepancy::new(
                        DiscrepancyCode::UnitPriceMismatch,
                        format!(
                            "Line {} \"{}\": unit price {} differs from ordered unit price {}",
                            i + 1,
                            line.description,
                            fmt_decimal(&line.unit_price),
                            fmt_decimal(&po_line.unit_price)
                        ),
                    ));
                }
                pairings.push(LinePairing {
                    invoice_line: i,
                    po_line: Some(j),
                    paired_by: Some(paired_by),
                });
            }
            None => {
                discrepancies.push(Discrepancy::new(
                    DiscrepancyCode::UnmatchedInvoiceLine,
                    format!(
                        "Line {} \"{}\" has no corresponding purchase order line",
                        i + 1,
                        line.description
                    ),
                ));
                pairings.push(LinePairing {
                    invoice_line: i,
                    po_line: None,
                    paired_by: None,
                });
            }
        }
    }

    for (j, taken) in po_taken.iter().enumerate() {
        if !taken {
            discrepancies.push(Discrepancy::new(
                DiscrepancyCode::UnbilledPoLine,
                format!(
                    "Purchase order line {} \"{}\" is not billed on the invoice",
                    j + 1,
                    po_lines[j].description
                ),
            ));
        }
    }

    (pairings, discrepancies)
}

/// 开票数量不能超过累计收货数量
fn check_receipts(
    invoice_lines: &[LineItem],
    pairings: &[LinePairing],
    po_lines: &[PoLineItem],
    receipts: &[GoodsReceipt],
) -> Vec<Discrepancy> {
    let mut received: IndexMap<String, BigDecimal> = IndexMap::new();
    for line in receipts.iter().flat_map(|r| r.lines.iter()) {
        *received
            .entry(normalize_description(&line.description))
            .or_insert_with(BigDecimal::zero) += &line.quantity_received;
    }

    let mut discrepancies = Vec::new();
    for (i, line) in invoice_lines.iter().enumerate() {
        // 已配对时以 PO 行描述为准
        let key = pairings
            .iter()
            .find(|p| p.invoice_line == i)
            .and_then(|p| p.po_line)
            .map(|j| normalize_description(&po_lines[j].description))
            .unwrap_or_else(|| normalize_description(&line.description));
        let got = received.get(&key).cloned().unwrap_or_else(BigDecimal::zero);
        if line.quantity > got {
            discrepancies.push(Discrepancy::new(
                DiscrepancyCode::QuantityNotReceived,
                format!(
                    "Line {} \"{}\": invoiced quantity {} exceeds received quantity {}",
                    i + 1,
                    line.description,
                    line.quantity,
                    got
                ),
            ));
        }
    }
    discrepancies
}

/// 匹配引擎: 负责异步解析 PO / 附件 / 收货单, 然后调用纯匹配函数
pub struct MatchingEngine {
    procurement: Arc<dyn ProcurementLookup>,
    lookup_timeout: Duration,
}

impl MatchingEngine {
    pub fn new(procurement: Arc<dyn ProcurementLookup>, lookup_timeout: Duration) -> Self {
        Self {
            procurement,
            lookup_timeout,
        }
    }

    /// 三单匹配入口: 永远返回结果, 查询失败记为差异
    pub async fn perform_three_way_match(&self, invoice: &Invoice, policy: &MatchPolicy) -> MatchResult {
        let input = self.resolve(invoice, policy).await;
        let result = three_way_match(&input, policy);
        tracing::info!(
            invoice_id = %invoice.id,
            matched = result.is_matched,
            discrepancies = result.discrepancies.len(),
            "[Matching] three-way match completed"
        );
        result
    }

    /// 批量匹配: 并发解析, 并行比对
    pub async fn perform_batch(&self, invoices: &[Invoice], policy: &MatchPolicy) -> Vec<MatchResult> {
        let inputs = join_all(invoices.iter().map(|inv| self.resolve(inv, policy))).await;
        let results = match_batch(&inputs, policy);
        let matched = results.iter().filter(|r| r.is_matched).count();
        tracing::info!("[Matching] batch of {} invoices, {} matched", invoices.len(), matched);
        results
    }

    pub async fn resolve(&self, invoice: &Invoice, policy: &MatchPolicy) -> MatchInput {
        let resolution = self.resolve_po(invoice, policy).await;
        let mut lookup_failures = Vec::new();
        let mut annexure = None;
        let mut receipts = Vec::new();

        if let PoResolution::Resolved(po) = &resolution {
            match self.bounded(self.procurement.get_annexure_for_po(&po.id)).await {
                Ok(found) => annexure = found,
                Err(e) => lookup_failures.push(format!(
                    "Annexure lookup for purchase order {} failed: {}",
                    po.po_number, e
                )),
            }
            match self.bounded(self.procurement.get_receipts_for_po(&po.id)).await {
                Ok(found) => receipts = found,
                Err(e) => lookup_failures.push(format!(
                    "Goods receipt lookup for purchase order {} failed: {}",
                    po.po_number, e
                )),
            }
        }

        MatchInput {
            invoice: invoice.clone(),
            resolution,
            annexure,
            receipts,
            lookup_failures,
        }
    }

    async fn resolve_po(&self, invoice: &Invoice, policy: &MatchPolicy) -> PoResolution {
        let po_number = invoice
            .po_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        if let Some(po_number) = po_number {
            return match self.bounded(self.procurement.get_by_number(po_number)).await {
                Ok(Some(po)) => PoResolution::Resolved(po),
                Ok(None) => PoResolution::NotFound(format!(
                    "No purchase order found for PO number {}",
                    po_number
                )),
                Err(e) => {
                    tracing::warn!(invoice_id = %invoice.id, "PO lookup failed: {}", e);
                    PoResolution::LookupFailed(format!(
                        "Purchase order lookup for {} failed: {}",
                        po_number, e
                    ))
                }
            };
        }

        // 无 PO 号: 按供应商 + 金额推断
        match self.bounded(self.procurement.find_open_by_vendor(&invoice.vendor_name)).await {
            Ok(candidates) => match pick_by_vendor_amount(invoice, &candidates, policy) {
                Some(po) => {
                    tracing::info!(
                        invoice_id = %invoice.id,
                        po_number = %po.po_number,
                        "PO inferred from vendor and amount"
                    );
                    PoResolution::Resolved(po.clone())
                }
                None => PoResolution::NotFound(format!(
                    "No PO number on invoice and no open purchase order for vendor {} within {}% of {}",
                    invoice.vendor_name,
                    fmt_decimal(&policy.tolerance_percent),
                    fmt_decimal(&invoice.amount)
                )),
            },
            Err(e) => {
                tracing::warn!(invoice_id = %invoice.id, "Vendor PO lookup failed: {}", e);
                PoResolution::LookupFailed(format!(
                    "Purchase order lookup for vendor {} failed: {}",
                    invoice.vendor_name, e
                ))
            }
        }
    }

    /// 超时即失败 (fail closed)
    async fn bounded<T, F>(&self, fut: F) -> Result<T, LookupError>
    where
        F: Future<Output = Result<T, LookupError>>,
    {
        match tokio::time::timeout(self.lookup_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout(self.lookup_timeout.as_millis() as u64)),
        }
    }
}

/// 供应商的未关闭 PO 中, 总额在容差内且差异最小的一张; 差异相同时取 PO 号较小者
fn pick_by_vendor_amount<'a>(
    invoice: &Invoice,
    candidates: &'a [PurchaseOrder],
    policy: &MatchPolicy,
) -> Option<&'a PurchaseOrder> {
    candidates
        .iter()
        .filter(|po| po.status == PoStatus::Open && po.vendor_name == invoice.vendor_name)
        .filter_map(|po| {
            let variance = (&invoice.amount - &po.total_amount).abs();
            let percent = percent_of(&variance, &po.total_amount)?;
            (percent <= policy.tolerance_percent).then_some((variance, po))
        })
        .min_by(|(va, a), (vb, b)| va.cmp(vb).then_with(|| a.po_number.cmp(&b.po_number)))
        .map(|(_, po)| po)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InvoiceStatus, NewInvoice};
    use chrono::Utc;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn invoice(amount: &str, lines: Vec<LineItem>) -> Invoice {
        let new = NewInvoice {
            vendor_name: "Acme Supplies".to_string(),
            invoice_number: "INV-100".to_string(),
            invoice_date: None,
            amount: dec(amount),
            currency: "INR".to_string(),
            line_items: lines,
            po_number: Some("PO-2026-001".to_string()),
            project: Some("P1".to_string()),
            assigned_pm: None,
        };
        let mut inv = Invoice::from_submission(new, "vendor", Utc::now());
        inv.id = "inv-1".to_string();
        inv.status = InvoiceStatus::Digitizing;
        inv
    }

    fn inv_line(desc: &str, qty: &str, price: &str) -> LineItem {
        LineItem {
            description: desc.to_string(),
            quantity: dec(qty),
            unit_price: dec(price),
            amount: dec(qty) * dec(price),
        }
    }

    fn po_line(desc: &str, qty: &str, price: &str) -> PoLineItem {
        PoLineItem {
            description: desc.to_string(),
            quantity: dec(qty),
            unit_price: dec(price),
            amount: dec(qty) * dec(price),
            gl_account: Some("5100".to_string()),
        }
    }

    fn po(total: &str, lines: Vec<PoLineItem>) -> PurchaseOrder {
        PurchaseOrder {
            id: "po-1".to_string(),
            po_number: "PO-2026-001".to_string(),
            vendor_name: "Acme Supplies".to_string(),
            total_amount: dec(total),
            currency: "INR".to_string(),
            line_items: lines,
            status: PoStatus::Open,
        }
    }

    fn input(invoice: Invoice, po: PurchaseOrder) -> MatchInput {
        MatchInput {
            invoice,
            resolution: PoResolution::Resolved(po),
            annexure: None,
            receipts: vec![],
            lookup_failures: vec![],
        }
    }

    #[test]
    fn exact_amount_with_matching_lines_is_clean() {
        let lines = vec![inv_line("Cement bags", "10", "500"), inv_line("Steel rods", "5", "1000")];
        let po_lines = vec![po_line("Cement bags", "10", "500"), po_line("Steel rods", "5", "1000")];
        let result = three_way_match(&input(invoice("10000", lines), po("10000", po_lines)), &MatchPolicy::default());

        assert!(result.is_matched);
        assert!(result.discrepancies.is_empty());
        assert_eq!(result.ceiling_source, Some(CeilingSource::PurchaseOrder));
        assert_eq!(result.matched_po.unwrap().po_number, "PO-2026-001");
    }

    #[test]
    fn ten_percent_under_po_total_is_a_variance() {
        let result = three_way_match(&input(invoice("45000", vec![]), po("50000", vec![])), &MatchPolicy::default());

        assert!(!result.is_matched);
        assert_eq!(result.variance_percent, Some(dec("10")));
        assert!(result.has(DiscrepancyCode::AmountVariance));
        assert!(result.discrepancies[0].message.contains("10.00%"));
    }

    #[test]
    fn approved_annexure_replaces_po_ceiling() {
        let mut mi = input(invoice("5005", vec![]), po("6000", vec![]));
        mi.annexure = Some(Annexure {
            id: "ann-1".to_string(),
            po_id: "po-1".to_string(),
            original_amount: dec("6000"),
            approved_amount: dec("5000"),
            status: AnnexureStatus::Approved,
        });
        let result = three_way_match(&mi, &MatchPolicy::default());

        assert!(result.is_matched, "{:?}", result.discrepancies);
        assert_eq!(result.ceiling_source, Some(CeilingSource::Annexure));
        assert_eq!(result.ceiling_amount, Some(dec("5000")));
        assert_eq!(result.variance_percent, Some(dec("0.1")));
    }

    #[test]
    fn pending_annexure_is_ignored() {
        let mut mi = input(invoice("5005", vec![]), po("6000", vec![]));
        mi.annexure = Some(Annexure {
            id: "ann-1".to_string(),
            po_id: "po-1".to_string(),
            original_amount: dec("6000"),
            approved_amount: dec("5000"),
            status: AnnexureStatus::Pending,
        });
        let result = three_way_match(&mi, &MatchPolicy::default());
        assert_eq!(result.ceiling_source, Some(CeilingSource::PurchaseOrder));
        assert!(!result.is_matched);
    }

    #[test]
    fn missing_po_is_a_discrepancy_not_an_error() {
        let mi = MatchInput {
            invoice: invoice("100", vec![]),
            resolution: PoResolution::NotFound("No purchase order found for PO number PO-X".to_string()),
            annexure: None,
            receipts: vec![],
            lookup_failures: vec![],
        };
        let result = three_way_match(&mi, &MatchPolicy::default());
        assert!(!result.is_matched);
        assert!(result.has(DiscrepancyCode::NoPoFound));
        assert!(result.matched_po.is_none());
    }

    #[test]
    fn each_line_problem_is_itemized() {
        let lines = vec![
            inv_line("Cement bags", "12", "500"),
            inv_line("Steel rods", "5", "1100"),
            inv_line("Delivery charge", "1", "300"),
        ];
        let po_lines = vec![po_line("Cement bags", "10", "500"), po_line("Steel rods", "5", "1000")];
        let result = three_way_match(&input(invoice("11800", lines), po("11800", po_lines)), &MatchPolicy::default());

        assert!(!result.is_matched);
        let codes: Vec<_> = result.discrepancies.iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![
                DiscrepancyCode::QuantityMismatch,
                DiscrepancyCode::UnitPriceMismatch,
                DiscrepancyCode::UnmatchedInvoiceLine,
            ]
        );
    }

    #[test]
    fn description_pairing_wins_over_position() {
        // 发票行顺序与 PO 相反, 应按描述配对
        let lines = vec![inv_line("steel  RODS", "5", "1000"), inv_line("Cement bags", "10", "500")];
        let po_lines = vec![po_line("Cement bags", "10", "500"), po_line("Steel rods", "5", "1000")];
        let (pairings, discrepancies) = pair_line_items(&lines, &po_lines);

        assert!(discrepancies.is_empty());
        assert_eq!(pairings[0].po_line, Some(1));
        assert_eq!(pairings[0].paired_by, Some(PairedBy::Description));
        assert_eq!(pairings[1].po_line, Some(0));
    }

    #[test]
    fn unnamed_lines_fall_back_to_position() {
        let lines = vec![inv_line("Item A (revised)", "1", "100"), inv_line("Item B", "2", "50")];
        let po_lines = vec![po_line("Item A", "1", "100"), po_line("Item B", "2", "50")];
        let (pairings, discrepancies) = pair_line_items(&lines, &po_lines);

        assert!(discrepancies.is_empty());
        assert_eq!(pairings[0].po_line, Some(0));
        assert_eq!(pairings[0].paired_by, Some(PairedBy::Position));
        assert_eq!(pairings[1].paired_by, Some(PairedBy::Description));
    }

    #[test]
    fn unbilled_po_line_is_reported() {
        let lines = vec![inv_line("Cement bags", "10", "500")];
        let po_lines = vec![po_line("Cement bags", "10", "500"), po_line("Steel rods", "5", "1000")];
        let (_, discrepancies) = pair_line_items(&lines, &po_lines);
        assert_eq!(discrepancies.len(), 1);
        assert_eq!(discrepancies[0].code, DiscrepancyCode::UnbilledPoLine);
    }

    #[test]
    fn billing_more_than_received_fails() {
        let lines = vec![inv_line("Cement bags", "10", "500")];
        let po_lines = vec![po_line("Cement bags", "10", "500")];
        let mut mi = input(invoice("5000", lines), po("5000", po_lines));
        mi.receipts = vec![GoodsReceipt {
            id: "gr-1".to_string(),
            po_id: "po-1".to_string(),
            lines: vec![crate::models::ReceiptLine {
                description: "Cement Bags".to_string(),
                quantity_received: dec("8"),
            }],
            received_at: Utc::now(),
        }];
        let result = three_way_match(&mi, &MatchPolicy::default());
        assert!(!result.is_matched);
        assert!(result.has(DiscrepancyCode::QuantityNotReceived));
    }

    #[test]
    fn currency_mismatch_and_closed_po_fail_the_amount_leg() {
        let mut order = po("100", vec![]);
        order.currency = "USD".to_string();
        order.status = PoStatus::Closed;
        let result = three_way_match(&input(invoice("100", vec![]), order), &MatchPolicy::default());
        assert!(!result.is_matched);
        assert!(result.has(DiscrepancyCode::CurrencyMismatch));
        assert!(result.has(DiscrepancyCode::PoClosed));
        assert!(!result.has(DiscrepancyCode::AmountVariance));
    }

    #[test]
    fn zero_ceiling_with_amount_is_unbounded() {
        let result = three_way_match(&input(invoice("10", vec![]), po("0", vec![])), &MatchPolicy::default());
        assert!(!result.is_matched);
        assert!(result.variance_percent.is_none());
    }

    #[test]
    fn matching_is_deterministic() {
        let lines = vec![inv_line("Cement bags", "12", "500")];
        let po_lines = vec![po_line("Cement bags", "10", "500"), po_line("Sand", "1", "10")];
        let mi = input(invoice("6000", lines), po("5010", po_lines));
        let policy = MatchPolicy::default();
        assert_eq!(three_way_match(&mi, &policy), three_way_match(&mi, &policy));
        let batch = match_batch(&[mi.clone(), mi.clone(), mi], &policy);
        assert!(batch.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn tolerance_outside_range_is_rejected() {
        assert!(MatchPolicy::new(dec("21")).is_err());
        assert!(MatchPolicy::new(dec("-1")).is_err());
        assert!(MatchPolicy::new(dec("0")).is_ok());
        assert_eq!(MatchPolicy::from_percent(2.5).unwrap().tolerance_percent, dec("2.5"));
    }

    #[test]
    fn vendor_heuristic_prefers_closest_then_lowest_number() {
        let inv = invoice("1000", vec![]);
        let mut a = po("1020", vec![]);
        a.po_number = "PO-B".to_string();
        let mut b = po("980", vec![]);
        b.po_number = "PO-A".to_string();
        let mut far = po("2000", vec![]);
        far.po_number = "PO-C".to_string();
        let candidates = vec![a, b, far];
        let picked = pick_by_vendor_amount(&inv, &candidates, &MatchPolicy::default()).unwrap();
        assert_eq!(picked.po_number, "PO-A");
    }
}
