#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use invoice_flow::error::NotifyError;
use invoice_flow::models::{
    Actor, AuditFilter, Invoice, InvoiceStatus, LineItem, NewInvoice, PoLineItem, PoStatus,
    PurchaseOrder, Role,
};
use invoice_flow::service::NotificationSink;
use invoice_flow::{AppConfig, Backends, MemoryStore, Outbox, WorkflowEngine};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const VENDOR: &str = "Acme Supplies";

/// 记录所有通知的测试替身
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, InvoiceStatus)>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, invoice: &Invoice, new_status: InvoiceStatus) -> Result<(), NotifyError> {
        self.events
            .lock()
            .unwrap()
            .push((invoice.id.clone(), new_status));
        Ok(())
    }
}

impl RecordingSink {
    /// 等待至少 `n` 条通知 (投递是异步的)
    pub async fn wait_for(&self, n: usize) -> Vec<(String, InvoiceStatus)> {
        for _ in 0..200 {
            {
                let events = self.events.lock().unwrap();
                if events.len() >= n {
                    return events.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.events.lock().unwrap().clone()
    }

    pub fn statuses_for(&self, invoice_id: &str) -> Vec<InvoiceStatus> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == invoice_id)
            .map(|(_, s)| *s)
            .collect()
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub engine: Arc<WorkflowEngine>,
    pub sink: Arc<RecordingSink>,
}

pub fn harness() -> Harness {
    harness_with(AppConfig::default())
}

pub fn harness_with(config: AppConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    engine_over(store, config)
}

/// 在已有存储上再建一个引擎 (模拟多个服务实例)
pub fn engine_over(store: Arc<MemoryStore>, config: AppConfig) -> Harness {
    let sink = Arc::new(RecordingSink::default());
    let (outbox, _handle) = Outbox::spawn(sink.clone());
    let engine = WorkflowEngine::new(Backends::shared(store.clone()), outbox, &config).unwrap();
    Harness {
        store,
        engine: Arc::new(engine),
        sink,
    }
}

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

pub fn admin() -> Actor {
    Actor::new("admin-1", "Asha Admin", Role::Admin)
}

pub fn finance() -> Actor {
    Actor::new("fin-1", "Farah Finance", Role::FinanceUser)
}

pub fn pm(projects: &[&str]) -> Actor {
    Actor::new("pm-1", "Priya PM", Role::ProjectManager).with_projects(projects.iter().copied())
}

pub fn vendor(name: &str) -> Actor {
    Actor::new(format!("vendor-{}", name), name, Role::Vendor).with_vendor(name)
}

pub fn new_invoice(amount: &str, po_number: Option<&str>) -> NewInvoice {
    NewInvoice {
        vendor_name: VENDOR.to_string(),
        invoice_number: "INV-2026-0042".to_string(),
        invoice_date: None,
        amount: dec(amount),
        currency: "INR".to_string(),
        line_items: vec![],
        po_number: po_number.map(str::to_string),
        project: Some("P1".to_string()),
        assigned_pm: None,
    }
}

pub fn line(desc: &str, qty: &str, price: &str) -> LineItem {
    LineItem {
        description: desc.to_string(),
        quantity: dec(qty),
        unit_price: dec(price),
        amount: dec(qty) * dec(price),
    }
}

pub fn purchase_order(po_number: &str, total: &str) -> PurchaseOrder {
    PurchaseOrder {
        id: format!("id-{}", po_number),
        po_number: po_number.to_string(),
        vendor_name: VENDOR.to_string(),
        total_amount: dec(total),
        currency: "INR".to_string(),
        line_items: vec![],
        status: PoStatus::Open,
    }
}

pub fn po_line(desc: &str, qty: &str, price: &str) -> PoLineItem {
    PoLineItem {
        description: desc.to_string(),
        quantity: dec(qty),
        unit_price: dec(price),
        amount: dec(qty) * dec(price),
        gl_account: None,
    }
}

/// 直接放入一张指定状态的发票 (不写审计, 不发通知)
pub fn seed_invoice(store: &MemoryStore, status: InvoiceStatus, new: NewInvoice) -> Invoice {
    let mut invoice = Invoice::from_submission(new, "seed", Utc::now());
    invoice.status = status;
    store.put_invoice(invoice.clone());
    invoice
}

pub async fn current(h: &Harness, id: &str) -> Invoice {
    h.engine.get_invoice(&admin(), id).await.unwrap()
}

pub async fn audit_count(h: &Harness, id: &str, action: Option<&str>) -> usize {
    let filter = AuditFilter {
        invoice_id: Some(id.to_string()),
        action: action.map(str::to_string),
        ..Default::default()
    };
    h.engine.audit_trail(&admin(), &filter).await.unwrap().len()
}
