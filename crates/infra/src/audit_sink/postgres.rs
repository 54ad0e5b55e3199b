//! PostgreSQL 監査イベント送信実装
//!
//! `workflow_audit_events` テーブルに追記する。
//! ワークフローのトランザクションとは独立に書き込むため、
//! 記録の失敗がコミット済みの状態遷移に影響することはない。

use async_trait::async_trait;
use procureflow_domain::audit_log::AuditEvent;
use sqlx::PgPool;

use super::AuditSink;
use crate::error::InfraError;

/// PostgreSQL 監査イベント送信
#[derive(Debug, Clone)]
pub struct PostgresAuditSink {
    pool: PgPool,
}

impl PostgresAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    #[tracing::instrument(skip_all, level = "debug", fields(action = %event.action, entity_id = %event.entity_id))]
    async fn record(&self, event: &AuditEvent) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_audit_events (
                id, actor_id, action, entity_type, entity_id, metadata, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id)
        .bind(event.actor.as_uuid())
        .bind(event.action.as_str())
        .bind(event.entity_type)
        .bind(&event.entity_id)
        .bind(&event.metadata)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
