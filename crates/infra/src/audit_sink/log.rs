//! 構造化ログ監査イベント送信実装
//!
//! 監査イベントを `info` レベルの構造化ログとして出力する。
//! ログ収集基盤側で監査証跡を保持する構成で使用する。

use async_trait::async_trait;
use procureflow_domain::audit_log::AuditEvent;

use super::AuditSink;
use crate::error::InfraError;

/// 構造化ログ監査イベント送信
#[derive(Debug, Clone, Default)]
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), InfraError> {
        tracing::info!(
            audit.id = %event.id,
            audit.action = %event.action,
            audit.actor_id = %event.actor,
            audit.entity_type = event.entity_type,
            audit.entity_id = %event.entity_id,
            audit.metadata = %event.metadata,
            audit.occurred_at = %event.occurred_at,
            "監査イベント"
        );
        Ok(())
    }
}
