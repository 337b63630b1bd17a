use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::db::AuditSink;
use crate::error::StoreError;
use crate::models::{AuditEntry, AuditFilter, NewAuditEntry};

/// 审计记录器
///
/// `record` 用于不伴随状态变更的事件 (例如批量试匹配), 写入失败只记日志。
/// 状态变更的审计记录由 `InvoiceStore::commit_transition` 与状态一起提交。
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// 后台写入, 不阻塞调用方; 返回的句柄仅供需要等待的调用方使用
    pub fn record(&self, entry: NewAuditEntry) -> JoinHandle<()> {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let action = entry.action.clone();
            if let Err(e) = sink.append(entry).await {
                tracing::warn!(action = %action, "Failed to write audit entry: {}", e);
            }
        })
    }

    /// 最新的在前
    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        self.sink.query(filter).await
    }
}
