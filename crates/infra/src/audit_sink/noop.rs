//! Noop 監査イベント送信実装
//!
//! イベントを記録せずに成功を返す。監査を無効化する場合に使用する。

use async_trait::async_trait;
use procureflow_domain::audit_log::AuditEvent;

use super::AuditSink;
use crate::error::InfraError;

/// Noop 監査イベント送信
#[derive(Debug, Clone, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), InfraError> {
        tracing::debug!(
            action = %event.action,
            entity_id = %event.entity_id,
            "Noop: 監査イベント記録をスキップ"
        );
        Ok(())
    }
}
