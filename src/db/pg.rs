use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use sqlx::{Executor, PgPool};
use std::str::FromStr;

use super::queries;
use super::{AuditSink, InvoiceStore, ProcurementLookup, SystemSettings};
use crate::error::{LookupError, StoreError};
use crate::models::{
    Annexure, AuditEntry, AuditFilter, GoodsReceipt, Invoice, InvoiceFilter, InvoicePatch,
    NewAuditEntry, PurchaseOrder,
};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const TOLERANCE_SETTING_KEY: &str = "match_tolerance_percent";

/// PostgreSQL 存储
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 建表 (幂等)
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.pool.execute(SCHEMA).await?;
        tracing::info!("Database schema ensured");
        Ok(())
    }

    fn map_unavailable(err: sqlx::Error) -> StoreError {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

#[async_trait]
impl InvoiceStore for PgStore {
    async fn insert(&self, invoice: &Invoice, audit: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        let mut tx = self.pool.begin().await.map_err(Self::map_unavailable)?;
        if queries::fetch_invoice(&mut *tx, &invoice.id).await?.is_some() {
            return Err(StoreError::Duplicate(invoice.id.clone()));
        }
        queries::insert_invoice(&mut *tx, invoice).await?;
        let entry = queries::insert_audit(&mut *tx, &audit).await?;
        tx.commit().await.map_err(Self::map_unavailable)?;
        Ok(entry)
    }

    async fn get(&self, id: &str) -> Result<Option<Invoice>, StoreError> {
        let row = queries::fetch_invoice(&self.pool, id)
            .await
            .map_err(Self::map_unavailable)?;
        row.map(Invoice::try_from).transpose()
    }

    async fn save(&self, id: &str, patch: &InvoicePatch) -> Result<Invoice, StoreError> {
        let mut tx = self.pool.begin().await.map_err(Self::map_unavailable)?;
        let row = queries::fetch_invoice_for_update(&mut *tx, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut invoice = Invoice::try_from(row)?;
        let expected = invoice.version;
        invoice.merge(patch);
        invoice.version = expected + 1;
        invoice.updated_at = Utc::now();
        queries::update_invoice(&mut *tx, &invoice, expected).await?;
        tx.commit().await.map_err(Self::map_unavailable)?;
        Ok(invoice)
    }

    async fn list_all(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, StoreError> {
        let rows = queries::list_invoices(&self.pool, filter)
            .await
            .map_err(Self::map_unavailable)?;
        rows.into_iter().map(Invoice::try_from).collect()
    }

    async fn commit_transition(
        &self,
        id: &str,
        expected_version: i64,
        patch: &InvoicePatch,
        audit: NewAuditEntry,
    ) -> Result<(Invoice, AuditEntry), StoreError> {
        let mut tx = self.pool.begin().await.map_err(Self::map_unavailable)?;

        let row = queries::fetch_invoice_for_update(&mut *tx, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut invoice = Invoice::try_from(row)?;
        if invoice.version != expected_version {
            return Err(StoreError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                actual: invoice.version,
            });
        }

        invoice.merge(patch);
        invoice.version = expected_version + 1;
        invoice.updated_at = audit.created_at;

        let affected = queries::update_invoice(&mut *tx, &invoice, expected_version).await?;
        if affected == 0 {
            return Err(StoreError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                actual: expected_version + 1,
            });
        }
        let entry = queries::insert_audit(&mut *tx, &audit).await?;

        // 事务提交失败时状态和审计都不会落库
        tx.commit().await.map_err(Self::map_unavailable)?;
        Ok((invoice, entry))
    }
}

#[async_trait]
impl AuditSink for PgStore {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        queries::insert_audit(&self.pool, &entry)
            .await
            .map_err(Self::map_unavailable)
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        queries::query_audit(&self.pool, filter)
            .await
            .map_err(Self::map_unavailable)
    }
}

#[async_trait]
impl ProcurementLookup for PgStore {
    async fn get_by_number(&self, po_number: &str) -> Result<Option<PurchaseOrder>, LookupError> {
        let row = queries::fetch_purchase_order(&self.pool, po_number).await?;
        Ok(row.and_then(|r| r.into_model()))
    }

    async fn get_annexure_for_po(&self, po_id: &str) -> Result<Option<Annexure>, LookupError> {
        let row = queries::fetch_annexure(&self.pool, po_id).await?;
        Ok(row.and_then(|r| r.into_model()))
    }

    async fn find_open_by_vendor(&self, vendor_name: &str) -> Result<Vec<PurchaseOrder>, LookupError> {
        let rows = queries::fetch_open_purchase_orders(&self.pool, vendor_name).await?;
        Ok(rows.into_iter().filter_map(|r| r.into_model()).collect())
    }

    async fn get_receipts_for_po(&self, po_id: &str) -> Result<Vec<GoodsReceipt>, LookupError> {
        let rows = queries::fetch_goods_receipts(&self.pool, po_id).await?;
        Ok(rows.into_iter().map(GoodsReceipt::from).collect())
    }
}

#[async_trait]
impl SystemSettings for PgStore {
    async fn match_tolerance_percent(&self) -> Result<Option<BigDecimal>, StoreError> {
        let value = queries::fetch_setting(&self.pool, TOLERANCE_SETTING_KEY)
            .await
            .map_err(Self::map_unavailable)?;
        match value {
            None => Ok(None),
            Some(raw) => BigDecimal::from_str(raw.trim())
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("{} = {:?}: {}", TOLERANCE_SETTING_KEY, raw, e))),
        }
    }
}
