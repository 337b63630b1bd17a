use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use super::{AuditSink, InvoiceStore, ProcurementLookup, SystemSettings};
use crate::error::{LookupError, StoreError};
use crate::models::{
    audit, Annexure, AuditEntry, AuditFilter, GoodsReceipt, Invoice,
    InvoiceFilter, InvoicePatch, NewAuditEntry, PoStatus, PurchaseOrder,
};

/// 内存存储: 未配置数据库时使用, 也是测试替身
///
/// 状态更新和审计追加在同一个分片写锁内完成, 对外表现为原子提交。
#[derive(Default)]
pub struct MemoryStore {
    invoices: DashMap<String, Invoice>,
    audit: Mutex<Vec<AuditEntry>>,
    next_seq: AtomicI64,
    purchase_orders: DashMap<String, PurchaseOrder>,     // po_number -> PO
    annexures: DashMap<String, Annexure>,                // po_id -> 附件
    receipts: DashMap<String, Vec<GoodsReceipt>>,        // po_id -> 收货单
    tolerance_percent: RwLock<Option<BigDecimal>>,
    unavailable: AtomicBool,
    lookups_unavailable: AtomicBool,
    lookup_delay: RwLock<Option<Duration>>,
    commit_delay: RwLock<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_purchase_order(&self, po: PurchaseOrder) {
        self.purchase_orders.insert(po.po_number.clone(), po);
    }

    pub fn add_annexure(&self, annexure: Annexure) {
        self.annexures.insert(annexure.po_id.clone(), annexure);
    }

    pub fn add_goods_receipt(&self, receipt: GoodsReceipt) {
        self.receipts
            .entry(receipt.po_id.clone())
            .or_insert_with(Vec::new)
            .push(receipt);
    }

    pub fn set_tolerance_percent(&self, value: Option<BigDecimal>) {
        if let Ok(mut guard) = self.tolerance_percent.write() {
            *guard = value;
        }
    }

    /// 直接写入一张发票 (导入 / 测试准备数据用, 不写审计)
    pub fn put_invoice(&self, invoice: Invoice) {
        self.invoices.insert(invoice.id.clone(), invoice);
    }

    /// 模拟存储不可用
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// 模拟采购系统不可达
    pub fn set_lookups_unavailable(&self, unavailable: bool) {
        self.lookups_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// 模拟采购系统响应缓慢
    pub fn set_lookup_delay(&self, delay: Option<Duration>) {
        if let Ok(mut guard) = self.lookup_delay.write() {
            *guard = delay;
        }
    }

    /// 模拟提交前的写入延迟, 用于构造并发交错
    pub fn set_commit_delay(&self, delay: Option<Duration>) {
        if let Ok(mut guard) = self.commit_delay.write() {
            *guard = delay;
        }
    }

    pub fn audit_len(&self) -> usize {
        self.audit.lock().map(|a| a.len()).unwrap_or(0)
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }

    async fn lookup_gate(&self) -> Result<(), LookupError> {
        let delay = self.lookup_delay.read().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.lookups_unavailable.load(Ordering::SeqCst) {
            return Err(LookupError::Unavailable("procurement system unreachable".to_string()));
        }
        Ok(())
    }

    fn push_audit(&self, log: &mut Vec<AuditEntry>, entry: NewAuditEntry) -> AuditEntry {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = entry.into_entry(seq);
        log.push(entry.clone());
        entry
    }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn insert(&self, invoice: &Invoice, audit: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        self.ensure_available()?;
        // 加锁顺序与 commit_transition 一致: 先发票分片, 再审计日志
        match self.invoices.entry(invoice.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(invoice.id.clone())),
            Entry::Vacant(slot) => {
                let mut log = self
                    .audit
                    .lock()
                    .map_err(|_| StoreError::Unavailable("audit log lock poisoned".to_string()))?;
                let entry = self.push_audit(&mut log, audit);
                slot.insert(invoice.clone());
                Ok(entry)
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Invoice>, StoreError> {
        self.ensure_available()?;
        Ok(self.invoices.get(id).map(|i| i.clone()))
    }

    async fn save(&self, id: &str, patch: &InvoicePatch) -> Result<Invoice, StoreError> {
        self.ensure_available()?;
        let mut slot = self
            .invoices
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        slot.merge(patch);
        slot.version += 1;
        slot.updated_at = Utc::now();
        Ok(slot.clone())
    }

    async fn list_all(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, StoreError> {
        self.ensure_available()?;
        let mut invoices: Vec<Invoice> = self
            .invoices
            .iter()
            .filter(|i| filter.admits(i.value()))
            .map(|i| i.value().clone())
            .collect();
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(invoices)
    }

    async fn commit_transition(
        &self,
        id: &str,
        expected_version: i64,
        patch: &InvoicePatch,
        audit: NewAuditEntry,
    ) -> Result<(Invoice, AuditEntry), StoreError> {
        self.ensure_available()?;
        let delay = self.commit_delay.read().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut slot = self
            .invoices
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if slot.version != expected_version {
            return Err(StoreError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                actual: slot.version,
            });
        }
        let mut log = self
            .audit
            .lock()
            .map_err(|_| StoreError::Unavailable("audit log lock poisoned".to_string()))?;

        let mut updated = slot.clone();
        updated.merge(patch);
        updated.version += 1;
        updated.updated_at = audit.created_at;

        let entry = self.push_audit(&mut log, audit);
        *slot = updated.clone();
        Ok((updated, entry))
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        self.ensure_available()?;
        let mut log = self
            .audit
            .lock()
            .map_err(|_| StoreError::Unavailable("audit log lock poisoned".to_string()))?;
        Ok(self.push_audit(&mut log, entry))
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        self.ensure_available()?;
        let mut entries: Vec<AuditEntry> = {
            let log = self
                .audit
                .lock()
                .map_err(|_| StoreError::Unavailable("audit log lock poisoned".to_string()))?;
            log.iter().filter(|e| filter.admits(e)).cloned().collect()
        };
        audit::sort_newest_first(&mut entries);
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }
}

#[async_trait]
impl ProcurementLookup for MemoryStore {
    async fn get_by_number(&self, po_number: &str) -> Result<Option<PurchaseOrder>, LookupError> {
        self.lookup_gate().await?;
        Ok(self.purchase_orders.get(po_number).map(|po| po.clone()))
    }

    async fn get_annexure_for_po(&self, po_id: &str) -> Result<Option<Annexure>, LookupError> {
        self.lookup_gate().await?;
        Ok(self.annexures.get(po_id).map(|a| a.clone()))
    }

    async fn find_open_by_vendor(&self, vendor_name: &str) -> Result<Vec<PurchaseOrder>, LookupError> {
        self.lookup_gate().await?;
        let mut pos: Vec<PurchaseOrder> = self
            .purchase_orders
            .iter()
            .filter(|po| po.vendor_name == vendor_name && po.status == PoStatus::Open)
            .map(|po| po.value().clone())
            .collect();
        pos.sort_by(|a, b| a.po_number.cmp(&b.po_number));
        Ok(pos)
    }

    async fn get_receipts_for_po(&self, po_id: &str) -> Result<Vec<GoodsReceipt>, LookupError> {
        self.lookup_gate().await?;
        Ok(self
            .receipts
            .get(po_id)
            .map(|r| r.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl SystemSettings for MemoryStore {
    async fn match_tolerance_percent(&self) -> Result<Option<BigDecimal>, StoreError> {
        self.ensure_available()?;
        Ok(self.tolerance_percent.read().ok().and_then(|t| t.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Actor, InvoiceStatus, NewInvoice, Role};
    use std::str::FromStr;

    fn sample_invoice() -> Invoice {
        let new = NewInvoice {
            vendor_name: "Acme Supplies".to_string(),
            invoice_number: "INV-1".to_string(),
            invoice_date: None,
            amount: BigDecimal::from_str("100.00").unwrap(),
            currency: "INR".to_string(),
            line_items: vec![],
            po_number: Some("PO-1".to_string()),
            project: Some("P1".to_string()),
            assigned_pm: None,
        };
        Invoice::from_submission(new, "vendor-1", Utc::now())
    }

    fn entry(action: &str) -> NewAuditEntry {
        let actor = Actor::new("u1", "User One", Role::Admin);
        NewAuditEntry::new(&actor, action, "details", Utc::now())
    }

    #[tokio::test]
    async fn save_merges_without_dropping_fields() {
        let store = MemoryStore::new();
        let invoice = sample_invoice();
        store.insert(&invoice, entry("SUBMIT")).await.unwrap();

        let patch = InvoicePatch {
            project: Some(Some("P2".to_string())),
            ..Default::default()
        };
        let saved = store.save(&invoice.id, &patch).await.unwrap();
        assert_eq!(saved.project.as_deref(), Some("P2"));
        assert_eq!(saved.po_number.as_deref(), Some("PO-1"));
        assert_eq!(saved.amount, invoice.amount);
        assert_eq!(saved.version, 1);
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict_and_writes_nothing() {
        let store = MemoryStore::new();
        let invoice = sample_invoice();
        store.insert(&invoice, entry("SUBMIT")).await.unwrap();

        let patch = InvoicePatch::status(InvoiceStatus::Digitizing);
        store
            .commit_transition(&invoice.id, 0, &patch, entry("START_DIGITIZING"))
            .await
            .unwrap();

        let err = store
            .commit_transition(&invoice.id, 0, &patch, entry("START_DIGITIZING"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 0, actual: 1, .. }));
        assert_eq!(store.audit_len(), 2);
    }

    #[tokio::test]
    async fn unavailable_store_rejects_commit_atomically() {
        let store = MemoryStore::new();
        let invoice = sample_invoice();
        store.insert(&invoice, entry("SUBMIT")).await.unwrap();
        store.set_unavailable(true);

        let patch = InvoicePatch::status(InvoiceStatus::Digitizing);
        let err = store
            .commit_transition(&invoice.id, 0, &patch, entry("START_DIGITIZING"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.set_unavailable(false);
        let current = store.get(&invoice.id).await.unwrap().unwrap();
        assert_eq!(current.status, InvoiceStatus::Received);
        assert_eq!(store.audit_len(), 1);
    }

    #[tokio::test]
    async fn audit_query_is_newest_first_with_insertion_tie_break() {
        let store = MemoryStore::new();
        let actor = Actor::new("u1", "User One", Role::Admin);
        let at = Utc::now();
        for action in ["A", "B", "C"] {
            store
                .append(NewAuditEntry::new(&actor, action, "", at).for_invoice("inv-1"))
                .await
                .unwrap();
        }
        store
            .append(NewAuditEntry::new(&actor, "OTHER", "", at).for_invoice("inv-2"))
            .await
            .unwrap();

        let filter = AuditFilter {
            invoice_id: Some("inv-1".to_string()),
            limit: Some(2),
            ..Default::default()
        };
        let entries = store.query(&filter).await.unwrap();
        let actions: Vec<_> = entries.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["C", "B"]);
    }
}
