//! ワークフローの変更系操作
//!
//! 永続化ボイラープレート（トランザクション操作、version check 付き更新、
//! 監査イベント送信）を共通化する。

mod cancel;
mod decision;
mod initiate;

use procureflow_domain::{
    audit_log::AuditEvent,
    value_objects::Version,
    workflow::{WorkflowDefinition, WorkflowInstance, WorkflowInstanceId},
};
use procureflow_infra::{InfraErrorKind, db::TxContext};
use procureflow_shared::event_log::error;

use super::WorkflowEngine;
use crate::{error::CoreError, usecase::helpers::FindResultExt};

impl WorkflowEngine {
    /// トランザクションを開始する
    async fn begin_tx(&self) -> Result<TxContext, CoreError> {
        Ok(self.deps.tx_manager.begin().await?)
    }

    /// インスタンスを取得する
    async fn load_instance(&self, id: &WorkflowInstanceId) -> Result<WorkflowInstance, CoreError> {
        self.deps
            .instance_repo
            .find_by_id(id)
            .await
            .or_not_found(|| CoreError::InstanceNotFound(id.clone()))
    }

    /// インスタンスが参照する定義を取得する（論理削除済みを含む）
    async fn load_bound_definition(
        &self,
        instance: &WorkflowInstance,
    ) -> Result<WorkflowDefinition, CoreError> {
        self.deps
            .definition_repo
            .find_by_id(instance.definition_id())
            .await
            .or_not_found(|| CoreError::DefinitionNotFound(instance.definition_id().clone()))
    }

    /// インスタンスを version check 付きで更新し、コミットする
    async fn save_instance(
        &self,
        instance: &WorkflowInstance,
        expected_version: Version,
    ) -> Result<(), CoreError> {
        let mut tx = self.begin_tx().await?;
        self.deps
            .instance_repo
            .update_with_version_check(&mut tx, instance, expected_version)
            .await
            .map_err(|e| match e.kind() {
                InfraErrorKind::Conflict { .. } => CoreError::ConcurrencyConflict(
                    "インスタンスは既に更新されています。最新の情報を取得してください。"
                        .to_string(),
                ),
                _ => CoreError::Database(e),
            })?;
        tx.commit().await?;
        Ok(())
    }

    /// 監査イベントを送信する
    ///
    /// 失敗は警告ログに残し、呼び出し元には伝播しない。
    async fn emit_audit(&self, event: AuditEvent) {
        if let Err(e) = self.deps.audit_sink.record(&event).await {
            tracing::warn!(
                error.category = error::category::AUDIT,
                error.kind = error::kind::AUDIT_SINK,
                audit.action = %event.action,
                audit.entity_id = %event.entity_id,
                "監査イベントの記録に失敗しました: {}",
                e
            );
        }
    }
}
