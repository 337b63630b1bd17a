use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgExecutor;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::error::StoreError;
use crate::models::{
    Annexure, AnnexureStatus, ApprovalRecord, AuditEntry, AuditFilter, GoodsReceipt, HilReview,
    InfoRequest, Invoice, InvoiceFilter, LineItem, MatchResult, NewAuditEntry, PoLineItem,
    PoStatus, PurchaseOrder, ReceiptLine,
};

const INVOICE_COLUMNS: &str = r#"
    id, vendor_name, invoice_number, invoice_date, amount, currency, line_items,
    po_number, project, assigned_pm, status, pm_approval, finance_approval, hil_review,
    matching, matched_at, extraction_confidence, info_request, paid_at, submitted_by,
    version, created_at, updated_at
"#;

/// 发票表行 (嵌入的子对象以 JSONB 存储)
#[derive(Debug, FromRow)]
pub struct InvoiceRow {
    pub id: String,
    pub vendor_name: String,
    pub invoice_number: String,
    pub invoice_date: Option<NaiveDate>,
    pub amount: BigDecimal,
    pub currency: String,
    pub line_items: Json<Vec<LineItem>>,
    pub po_number: Option<String>,
    pub project: Option<String>,
    pub assigned_pm: Option<String>,
    pub status: String,
    pub pm_approval: Json<ApprovalRecord>,
    pub finance_approval: Json<ApprovalRecord>,
    pub hil_review: Json<HilReview>,
    pub matching: Option<Json<MatchResult>>,
    pub matched_at: Option<DateTime<Utc>>,
    pub extraction_confidence: Option<f64>,
    pub info_request: Option<Json<InfoRequest>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub submitted_by: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = StoreError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("invoice {}: {}", row.id, e)))?;
        Ok(Invoice {
            id: row.id,
            vendor_name: row.vendor_name,
            invoice_number: row.invoice_number,
            invoice_date: row.invoice_date,
            amount: row.amount,
            currency: row.currency,
            line_items: row.line_items.0,
            po_number: row.po_number,
            project: row.project,
            assigned_pm: row.assigned_pm,
            status,
            pm_approval: row.pm_approval.0,
            finance_approval: row.finance_approval.0,
            hil_review: row.hil_review.0,
            matching: row.matching.map(|m| m.0),
            matched_at: row.matched_at,
            extraction_confidence: row.extraction_confidence,
            info_request: row.info_request.map(|r| r.0),
            paid_at: row.paid_at,
            submitted_by: row.submitted_by,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// 查询单张发票
pub async fn fetch_invoice<'e, E: PgExecutor<'e>>(
    executor: E,
    id: &str,
) -> Result<Option<InvoiceRow>, sqlx::Error> {
    let sql = format!("SELECT {} FROM invoices WHERE id = $1", INVOICE_COLUMNS);
    sqlx::query_as::<_, InvoiceRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// 查询单张发票并加行锁 (事务内使用)
pub async fn fetch_invoice_for_update<'e, E: PgExecutor<'e>>(
    executor: E,
    id: &str,
) -> Result<Option<InvoiceRow>, sqlx::Error> {
    let sql = format!("SELECT {} FROM invoices WHERE id = $1 FOR UPDATE", INVOICE_COLUMNS);
    sqlx::query_as::<_, InvoiceRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// 按可见范围列出发票
pub async fn list_invoices(
    pool: &PgPool,
    filter: &InvoiceFilter,
) -> Result<Vec<InvoiceRow>, sqlx::Error> {
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {} FROM invoices WHERE 1 = 1", INVOICE_COLUMNS));

    match filter {
        InvoiceFilter::All => {}
        InvoiceFilter::Projects(projects) => {
            builder.push(" AND project = ANY(");
            builder.push_bind(projects.clone());
            builder.push(")");
        }
        InvoiceFilter::Vendor(vendor) => {
            builder.push(" AND vendor_name = ");
            builder.push_bind(vendor.clone());
        }
        InvoiceFilter::Nothing => return Ok(Vec::new()),
    }
    builder.push(" ORDER BY created_at DESC, id ASC");

    builder.build_query_as::<InvoiceRow>().fetch_all(pool).await
}

/// 插入新发票
pub async fn insert_invoice<'e, E: PgExecutor<'e>>(
    executor: E,
    invoice: &Invoice,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "INSERT INTO invoices ({}) VALUES \
         ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)",
        INVOICE_COLUMNS
    );
    sqlx::query(&sql)
        .bind(&invoice.id)
        .bind(&invoice.vendor_name)
        .bind(&invoice.invoice_number)
        .bind(invoice.invoice_date)
        .bind(invoice.amount.clone())
        .bind(&invoice.currency)
        .bind(Json(&invoice.line_items))
        .bind(&invoice.po_number)
        .bind(&invoice.project)
        .bind(&invoice.assigned_pm)
        .bind(invoice.status.as_str())
        .bind(Json(&invoice.pm_approval))
        .bind(Json(&invoice.finance_approval))
        .bind(Json(&invoice.hil_review))
        .bind(invoice.matching.as_ref().map(Json))
        .bind(invoice.matched_at)
        .bind(invoice.extraction_confidence)
        .bind(invoice.info_request.as_ref().map(Json))
        .bind(invoice.paid_at)
        .bind(&invoice.submitted_by)
        .bind(invoice.version)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(executor)
        .await?;
    Ok(())
}

/// 条件更新 (乐观锁): 仅当版本号仍为 `expected_version` 时写入, 返回影响行数
pub async fn update_invoice<'e, E: PgExecutor<'e>>(
    executor: E,
    invoice: &Invoice,
    expected_version: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE invoices SET
            vendor_name = $3, invoice_number = $4, invoice_date = $5, amount = $6,
            currency = $7, line_items = $8, po_number = $9, project = $10, assigned_pm = $11,
            status = $12, pm_approval = $13, finance_approval = $14, hil_review = $15,
            matching = $16, matched_at = $17, extraction_confidence = $18, info_request = $19,
            paid_at = $20, version = $21, updated_at = $22
        WHERE id = $1 AND version = $2
        "#,
    )
    .bind(&invoice.id)
    .bind(expected_version)
    .bind(&invoice.vendor_name)
    .bind(&invoice.invoice_number)
    .bind(invoice.invoice_date)
    .bind(invoice.amount.clone())
    .bind(&invoice.currency)
    .bind(Json(&invoice.line_items))
    .bind(&invoice.po_number)
    .bind(&invoice.project)
    .bind(&invoice.assigned_pm)
    .bind(invoice.status.as_str())
    .bind(Json(&invoice.pm_approval))
    .bind(Json(&invoice.finance_approval))
    .bind(Json(&invoice.hil_review))
    .bind(invoice.matching.as_ref().map(Json))
    .bind(invoice.matched_at)
    .bind(invoice.extraction_confidence)
    .bind(invoice.info_request.as_ref().map(Json))
    .bind(invoice.paid_at)
    .bind(invoice.version)
    .bind(invoice.updated_at)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// 追加审计记录
pub async fn insert_audit<'e, E: PgExecutor<'e>>(
    executor: E,
    entry: &NewAuditEntry,
) -> Result<AuditEntry, sqlx::Error> {
    sqlx::query_as::<_, AuditEntry>(
        r#"
        INSERT INTO audit_log (invoice_id, actor_id, actor_name, action, details,
                               from_status, to_status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING seq, invoice_id, actor_id, actor_name, action, details,
                  from_status, to_status, created_at
        "#,
    )
    .bind(&entry.invoice_id)
    .bind(&entry.actor_id)
    .bind(&entry.actor_name)
    .bind(&entry.action)
    .bind(&entry.details)
    .bind(&entry.from_status)
    .bind(&entry.to_status)
    .bind(entry.created_at)
    .fetch_one(executor)
    .await
}

/// 查询审计记录, 最新的在前
pub async fn query_audit(pool: &PgPool, filter: &AuditFilter) -> Result<Vec<AuditEntry>, sqlx::Error> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT seq, invoice_id, actor_id, actor_name, action, details, \
         from_status, to_status, created_at FROM audit_log WHERE 1 = 1",
    );
    if let Some(invoice_id) = &filter.invoice_id {
        builder.push(" AND invoice_id = ");
        builder.push_bind(invoice_id.clone());
    }
    if let Some(actor_id) = &filter.actor_id {
        builder.push(" AND actor_id = ");
        builder.push_bind(actor_id.clone());
    }
    if let Some(action) = &filter.action {
        builder.push(" AND action = ");
        builder.push_bind(action.clone());
    }
    builder.push(" ORDER BY created_at DESC, seq DESC");
    if let Some(limit) = filter.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit as i64);
    }

    builder.build_query_as::<AuditEntry>().fetch_all(pool).await
}

#[derive(Debug, FromRow)]
pub struct PurchaseOrderRow {
    pub id: String,
    pub po_number: String,
    pub vendor_name: String,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub line_items: Json<Vec<PoLineItem>>,
    pub status: String,
}

impl PurchaseOrderRow {
    pub fn into_model(self) -> Option<PurchaseOrder> {
        let status = PoStatus::parse(&self.status)?;
        Some(PurchaseOrder {
            id: self.id,
            po_number: self.po_number,
            vendor_name: self.vendor_name,
            total_amount: self.total_amount,
            currency: self.currency,
            line_items: self.line_items.0,
            status,
        })
    }
}

/// 按 PO 号查询采购订单
pub async fn fetch_purchase_order(
    pool: &PgPool,
    po_number: &str,
) -> Result<Option<PurchaseOrderRow>, sqlx::Error> {
    sqlx::query_as::<_, PurchaseOrderRow>(
        r#"
        SELECT id, po_number, vendor_name, total_amount, currency, line_items, status
        FROM purchase_orders
        WHERE po_number = $1
        "#,
    )
    .bind(po_number)
    .fetch_optional(pool)
    .await
}

/// 查询供应商所有未关闭的采购订单
pub async fn fetch_open_purchase_orders(
    pool: &PgPool,
    vendor_name: &str,
) -> Result<Vec<PurchaseOrderRow>, sqlx::Error> {
    sqlx::query_as::<_, PurchaseOrderRow>(
        r#"
        SELECT id, po_number, vendor_name, total_amount, currency, line_items, status
        FROM purchase_orders
        WHERE vendor_name = $1
          AND status = $2
        ORDER BY po_number ASC
        "#,
    )
    .bind(vendor_name)
    .bind(PoStatus::Open.as_str())
    .fetch_all(pool)
    .await
}

#[derive(Debug, FromRow)]
pub struct AnnexureRow {
    pub id: String,
    pub po_id: String,
    pub original_amount: BigDecimal,
    pub approved_amount: BigDecimal,
    pub status: String,
}

impl AnnexureRow {
    pub fn into_model(self) -> Option<Annexure> {
        let status = AnnexureStatus::parse(&self.status)?;
        Some(Annexure {
            id: self.id,
            po_id: self.po_id,
            original_amount: self.original_amount,
            approved_amount: self.approved_amount,
            status,
        })
    }
}

/// 查询 PO 的附件 (APPROVED 优先, 其次最新)
pub async fn fetch_annexure(pool: &PgPool, po_id: &str) -> Result<Option<AnnexureRow>, sqlx::Error> {
    sqlx::query_as::<_, AnnexureRow>(
        r#"
        SELECT id, po_id, original_amount, approved_amount, status
        FROM annexures
        WHERE po_id = $1
        ORDER BY (status = $2) DESC, created_at DESC
        LIMIT 1
        "#,
    )
    .bind(po_id)
    .bind(AnnexureStatus::Approved.as_str())
    .fetch_optional(pool)
    .await
}

#[derive(Debug, FromRow)]
pub struct GoodsReceiptRow {
    pub id: String,
    pub po_id: String,
    pub lines: Json<Vec<ReceiptLine>>,
    pub received_at: DateTime<Utc>,
}

impl From<GoodsReceiptRow> for GoodsReceipt {
    fn from(row: GoodsReceiptRow) -> Self {
        GoodsReceipt {
            id: row.id,
            po_id: row.po_id,
            lines: row.lines.0,
            received_at: row.received_at,
        }
    }
}

/// 查询 PO 的收货单
pub async fn fetch_goods_receipts(
    pool: &PgPool,
    po_id: &str,
) -> Result<Vec<GoodsReceiptRow>, sqlx::Error> {
    sqlx::query_as::<_, GoodsReceiptRow>(
        r#"
        SELECT id, po_id, lines, received_at
        FROM goods_receipts
        WHERE po_id = $1
        ORDER BY received_at ASC
        "#,
    )
    .bind(po_id)
    .fetch_all(pool)
    .await
}

/// 读取系统设置
pub async fn fetch_setting(pool: &PgPool, key: &str) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT value FROM system_settings WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
}
