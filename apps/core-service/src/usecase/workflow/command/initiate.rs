//! ワークフローの開始

use procureflow_domain::{
    audit_log::{AuditAction, AuditEvent},
    workflow::{NewWorkflowInstance, WorkflowInstance, WorkflowInstanceId},
};
use procureflow_infra::InfraErrorKind;
use procureflow_shared::{event_log::event, log_business_event};
use serde_json::{Map, Value as JsonValue};

use crate::{
    error::CoreError,
    usecase::workflow::{InitiateWorkflowInput, WorkflowEngine},
};

impl WorkflowEngine {
    /// ドキュメントに対するワークフローを開始する
    ///
    /// ## 処理フロー
    ///
    /// 1. 種別の有効な定義を選択（既定を優先、なければ最終更新が新しいもの）
    /// 2. ルーターで必須レベル集合を決定
    /// 3. 処理中インスタンスの重複を確認
    /// 4. `pending` のインスタンスを作成して保存
    /// 5. 監査イベント `workflow_initiated` を送信
    ///
    /// ## エラー
    ///
    /// - `NoActiveDefinition`: 有効な定義がない
    /// - `NoLevelsDetermined`: 必須レベルが空
    /// - `DuplicateInstance`: 処理中のインスタンスが既にある
    #[tracing::instrument(
        skip_all,
        fields(document_type = %input.document_type, document_id = %input.document_id)
    )]
    pub async fn initiate(
        &self,
        input: InitiateWorkflowInput,
    ) -> Result<WorkflowInstance, CoreError> {
        // 1. 定義を選択
        let definition = self
            .deps
            .definition_repo
            .find_active_by_document_type(input.document_type)
            .await?
            .into_iter()
            .next()
            .ok_or(CoreError::NoActiveDefinition(input.document_type))?;

        // 2. 必須レベルを決定
        let required_levels = self
            .router
            .determine_required_levels(&definition, &input.context);
        if required_levels.is_empty() {
            return Err(CoreError::NoLevelsDetermined);
        }

        // 3. 重複チェック（早期フェイル。最終的な保証は一意インデックス）
        let duplicate = || CoreError::DuplicateInstance {
            document_type: input.document_type,
            document_id:   input.document_id.clone(),
        };
        if self
            .deps
            .instance_repo
            .find_active_by_document(input.document_type, &input.document_id)
            .await?
            .is_some()
        {
            return Err(duplicate());
        }

        // 4. インスタンスを作成して保存
        let now = self.deps.clock.now();
        let instance = WorkflowInstance::new(NewWorkflowInstance {
            id: WorkflowInstanceId::new(),
            definition_id: definition.id().clone(),
            definition_version: definition.version(),
            document_type: input.document_type,
            document_id: input.document_id.clone(),
            required_levels,
            submitted_by: input.initiated_by.clone(),
            now,
        })?;

        let mut tx = self.begin_tx().await?;
        self.deps
            .instance_repo
            .insert(&mut tx, &instance)
            .await
            .map_err(|e| match e.kind() {
                InfraErrorKind::Conflict { .. } => duplicate(),
                _ => CoreError::Database(e),
            })?;
        tx.commit().await?;

        // 5. 監査イベント
        let mut metadata = Map::new();
        metadata.insert(
            "definitionId".to_string(),
            JsonValue::from(definition.id().to_string()),
        );
        metadata.insert(
            "definitionVersion".to_string(),
            JsonValue::from(definition.version().as_u32()),
        );
        metadata.insert(
            "requiredLevels".to_string(),
            JsonValue::from(
                instance
                    .required_levels()
                    .iter()
                    .map(|l| l.as_u32())
                    .collect::<Vec<_>>(),
            ),
        );
        metadata.insert(
            "routingStrategy".to_string(),
            JsonValue::from(self.router.strategy().as_str()),
        );
        self.emit_audit(AuditEvent::for_transition(
            AuditAction::WorkflowInitiated,
            input.initiated_by.clone(),
            &instance,
            metadata,
            now,
        ))
        .await;

        log_business_event!(
            event.category = event::category::WORKFLOW,
            event.action = event::action::WORKFLOW_INITIATED,
            event.entity_type = event::entity_type::WORKFLOW_INSTANCE,
            event.entity_id = %instance.id(),
            event.actor_id = %input.initiated_by,
            event.result = event::result::SUCCESS,
            required_levels = instance.required_levels().len(),
            "ワークフロー開始"
        );

        Ok(instance)
    }
}
