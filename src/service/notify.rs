use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::NotifyError;
use crate::models::{Invoice, InvoiceStatus};

/// 状态变更事件
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChanged {
    pub invoice: Invoice,
    pub new_status: InvoiceStatus,
}

/// 通知下游 (邮件 / 消息), 尽力而为
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, invoice: &Invoice, new_status: InvoiceStatus) -> Result<(), NotifyError>;
}

/// 默认实现: 只写日志
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, invoice: &Invoice, new_status: InvoiceStatus) -> Result<(), NotifyError> {
        tracing::info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            vendor = %invoice.vendor_name,
            status = %new_status,
            "[Notify] invoice status changed"
        );
        Ok(())
    }
}

/// 发件箱: 事务提交后入队, 由后台任务投递, 不阻塞状态变更
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<StatusChanged>,
}

impl Outbox {
    /// 创建发件箱并启动投递任务; 所有 `Outbox` 克隆都被丢弃后任务退出
    pub fn spawn(sink: Arc<dyn NotificationSink>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(dispatch(rx, sink));
        (Self { tx }, handle)
    }

    pub fn publish(&self, invoice: Invoice, new_status: InvoiceStatus) {
        let event = StatusChanged { invoice, new_status };
        if let Err(e) = self.tx.send(event) {
            tracing::warn!(
                invoice_id = %e.0.invoice.id,
                "Notification dispatcher has stopped, dropping event"
            );
        }
    }
}

async fn dispatch(mut rx: mpsc::UnboundedReceiver<StatusChanged>, sink: Arc<dyn NotificationSink>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = sink.notify(&event.invoice, event.new_status).await {
            tracing::warn!(
                invoice_id = %event.invoice.id,
                status = %event.new_status,
                "Notification failed: {}",
                e
            );
        }
    }
    tracing::debug!("Notification dispatcher stopped");
}
