pub mod memory;
pub mod pg;
pub mod pool;
pub mod queries;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::sync::Arc;

use crate::error::{LookupError, StoreError};
use crate::models::{
    Annexure, AuditEntry, AuditFilter, GoodsReceipt, Invoice, InvoiceFilter, InvoicePatch,
    NewAuditEntry, PurchaseOrder,
};

pub use memory::MemoryStore;
pub use pg::PgStore;
pub use pool::create_pool;

/// 发票存储
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// 新建发票并写入对应的审计记录 (同一事务)
    async fn insert(&self, invoice: &Invoice, audit: NewAuditEntry) -> Result<AuditEntry, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Invoice>, StoreError>;

    /// 局部合并更新, 未指定的字段保持不变
    async fn save(&self, id: &str, patch: &InvoicePatch) -> Result<Invoice, StoreError>;

    async fn list_all(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, StoreError>;

    /// 条件更新: 仅当版本号仍为 `expected_version` 时合并 `patch` 并追加审计记录,
    /// 二者同时成功或同时失败
    async fn commit_transition(
        &self,
        id: &str,
        expected_version: i64,
        patch: &InvoicePatch,
        audit: NewAuditEntry,
    ) -> Result<(Invoice, AuditEntry), StoreError>;
}

/// 审计日志存储
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError>;

    /// 最新的在前
    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError>;
}

/// 采购数据 (PO / 附件 / 收货单), 只读
#[async_trait]
pub trait ProcurementLookup: Send + Sync {
    async fn get_by_number(&self, po_number: &str) -> Result<Option<PurchaseOrder>, LookupError>;

    async fn get_annexure_for_po(&self, po_id: &str) -> Result<Option<Annexure>, LookupError>;

    async fn find_open_by_vendor(&self, vendor_name: &str) -> Result<Vec<PurchaseOrder>, LookupError>;

    async fn get_receipts_for_po(&self, po_id: &str) -> Result<Vec<GoodsReceipt>, LookupError>;
}

/// 系统设置
#[async_trait]
pub trait SystemSettings: Send + Sync {
    /// 匹配容差百分比 (未设置时返回 None, 由调用方使用默认值)
    async fn match_tolerance_percent(&self) -> Result<Option<BigDecimal>, StoreError>;
}

/// 工作流依赖的全部存储端口
#[derive(Clone)]
pub struct Backends {
    pub invoices: Arc<dyn InvoiceStore>,
    pub audit: Arc<dyn AuditSink>,
    pub procurement: Arc<dyn ProcurementLookup>,
    pub settings: Arc<dyn SystemSettings>,
}

impl Backends {
    /// 同一个存储实现所有端口 (MemoryStore / PgStore)
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: InvoiceStore + AuditSink + ProcurementLookup + SystemSettings + 'static,
    {
        Self {
            invoices: store.clone(),
            audit: store.clone(),
            procurement: store.clone(),
            settings: store,
        }
    }
}
