//! ワークフローの参照系操作
//!
//! いずれも読み取りのみで、ロックを取らない。
//! 走査中に他の操作が進んでも、その時点のスナップショットとして扱う。

use std::collections::HashMap;

use procureflow_domain::{
    document::{DocumentId, DocumentType},
    principal::PrincipalId,
    workflow::{
        ApprovalHistoryEntry,
        WorkflowDefinition,
        WorkflowDefinitionId,
        WorkflowInstance,
        WorkflowInstanceId,
    },
};
use procureflow_infra::repository::{InstanceFilter, InstanceSummary};
use procureflow_shared::Page;

use super::{PendingApprovalFilter, WorkflowEngine};
use crate::{error::CoreError, usecase::helpers::FindResultExt};

impl WorkflowEngine {
    /// ID でインスタンスを取得する
    pub async fn get(&self, instance_id: &WorkflowInstanceId) -> Result<WorkflowInstance, CoreError> {
        self.deps
            .instance_repo
            .find_by_id(instance_id)
            .await
            .or_not_found(|| CoreError::InstanceNotFound(instance_id.clone()))
    }

    /// ドキュメントの最新のインスタンスを取得する
    pub async fn find_by_document(
        &self,
        document_type: DocumentType,
        document_id: &DocumentId,
    ) -> Result<Option<WorkflowInstance>, CoreError> {
        Ok(self
            .deps
            .instance_repo
            .find_by_document(document_type, document_id)
            .await?
            .into_iter()
            .next())
    }

    /// 絞り込み条件とページングでインスタンス一覧を取得する
    pub async fn list(
        &self,
        filter: &InstanceFilter,
        page: Page,
    ) -> Result<Vec<WorkflowInstance>, CoreError> {
        Ok(self.deps.instance_repo.find_by_filter(filter, page).await?)
    }

    /// 承認履歴を取得する
    pub async fn history(
        &self,
        instance_id: &WorkflowInstanceId,
    ) -> Result<Vec<ApprovalHistoryEntry>, CoreError> {
        Ok(self.get(instance_id).await?.history().to_vec())
    }

    /// ステータス別の件数と平均承認所要時間を取得する
    pub async fn statistics(
        &self,
        document_type: Option<DocumentType>,
    ) -> Result<InstanceSummary, CoreError> {
        Ok(self.deps.instance_repo.summarize(document_type).await?)
    }

    /// 操作者が現在のレベルの承認者である処理中インスタンスを取得する
    ///
    /// 現在のレベルで既に操作済みのインスタンスは含めない。
    /// 定義または現在のレベルの設定が見つからないインスタンスは対象外とする。
    #[tracing::instrument(skip_all, fields(%actor))]
    pub async fn pending_approvals_for(
        &self,
        actor: &PrincipalId,
        filter: &PendingApprovalFilter,
    ) -> Result<Vec<WorkflowInstance>, CoreError> {
        let pending = self
            .deps
            .instance_repo
            .find_pending(filter.document_type)
            .await?;

        let mut definitions: HashMap<WorkflowDefinitionId, Option<WorkflowDefinition>> =
            HashMap::new();
        let mut result = Vec::new();
        for instance in pending {
            let level = instance.current_level();
            if instance.has_acted(actor, level) {
                continue;
            }

            if !definitions.contains_key(instance.definition_id()) {
                let definition = self
                    .deps
                    .definition_repo
                    .find_by_id(instance.definition_id())
                    .await?;
                definitions.insert(instance.definition_id().clone(), definition);
            }
            let Some(level_config) = definitions
                .get(instance.definition_id())
                .and_then(|d| d.as_ref())
                .and_then(|d| d.level(level))
            else {
                tracing::debug!(
                    instance_id = %instance.id(),
                    %level,
                    "現在のレベルの設定が見つからないためスキップ"
                );
                continue;
            };

            if self
                .deps
                .role_directory
                .is_member(actor, &level_config.approver_roles)
                .await?
            {
                result.push(instance);
            }
        }

        Ok(result)
    }
}
