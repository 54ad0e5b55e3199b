//! 承認・却下の記録

use procureflow_domain::{
    audit_log::{AuditAction, AuditEvent},
    value_objects::LevelNumber,
    workflow::{
        ApprovalAction,
        ApprovalMode,
        ApprovalProgress,
        LevelApprovalPolicy,
        WorkflowInstance,
    },
};
use procureflow_shared::{event_log::event, log_business_event};
use serde_json::{Map, Value as JsonValue};

use crate::{
    error::CoreError,
    usecase::workflow::{ApprovalDecisionInput, WorkflowEngine},
};

impl WorkflowEngine {
    /// 現在のレベルで承認または却下を記録する
    ///
    /// ## 処理フロー
    ///
    /// 1. インスタンスを取得し、`pending` であることを確認
    /// 2. 定義から現在のレベルの設定を取得
    /// 3. 操作者がレベルの承認者ロールに属することを確認
    /// 4. 同一レベルでの二重操作を確認（ALL レベルは承認者集合の変化を再確認）
    /// 5. 承認（ALL モードは承認者集合を解決）または却下に遷移
    /// 6. バージョンチェック付きで保存
    /// 7. 監査イベントを送信
    ///
    /// ## エラー
    ///
    /// - `InvalidAction`: `recall` が指定された
    /// - `InstanceNotFound` / `WorkflowAlreadyTerminal`
    /// - `InvalidLevel`: 現在のレベルが定義にない
    /// - `NotAuthorized` / `AlreadyActed`
    /// - `ConcurrencyConflict`: 並行更新に負けた
    #[tracing::instrument(
        skip_all,
        fields(instance_id = %input.instance_id, actor = %input.actor, action = %input.action)
    )]
    pub async fn process_approval(
        &self,
        input: ApprovalDecisionInput,
    ) -> Result<WorkflowInstance, CoreError> {
        if input.action == ApprovalAction::Recall {
            return Err(CoreError::InvalidAction(input.action.as_str().to_string()));
        }

        // 1. インスタンスを取得
        let instance = self.load_instance(&input.instance_id).await?;
        instance.ensure_pending()?;

        // 2. 現在のレベルの設定
        let definition = self.load_bound_definition(&instance).await?;
        let level = instance.current_level();
        let level_config = definition.level_config(level)?;

        // 3. 権限チェック
        if !self
            .deps
            .role_directory
            .is_member(&input.actor, &level_config.approver_roles)
            .await?
        {
            return Err(CoreError::NotAuthorized(format!(
                "レベル {} ({}) の承認者ではありません",
                level,
                level_config.name
            )));
        }

        // 4. 二重操作チェック
        //    ALL レベルで承認済みの操作者による再承認は、承認者集合を再解決して
        //    未承認者がいなくなっていればレベルを完了させる
        if let Err(acted) = instance.ensure_not_acted(&input.actor) {
            if input.action != ApprovalAction::Approve
                || level_config.approval_mode != ApprovalMode::All
            {
                return Err(acted.into());
            }
            let approvers = self
                .deps
                .role_directory
                .resolve_approvers(&level_config.approver_roles)
                .await?;
            let expected_version = instance.version();
            let Some((updated, progress)) =
                instance.settled_with(&approvers, self.deps.clock.now())?
            else {
                return Err(acted.into());
            };
            self.save_instance(&updated, expected_version).await?;
            return Ok(self.record_approval(&input, level, updated, Some(progress)).await);
        }

        // 5. 遷移
        let now = self.deps.clock.now();
        let expected_version = instance.version();
        let (updated, progress) = match input.action {
            ApprovalAction::Approve => {
                let policy = match level_config.approval_mode {
                    ApprovalMode::Any => LevelApprovalPolicy::Any,
                    ApprovalMode::All => LevelApprovalPolicy::All {
                        approvers: self
                            .deps
                            .role_directory
                            .resolve_approvers(&level_config.approver_roles)
                            .await?,
                    },
                };
                let (approved, progress) = instance.approved_by(
                    input.actor.clone(),
                    input.comments.clone(),
                    &policy,
                    now,
                )?;
                (approved, Some(progress))
            }
            ApprovalAction::Reject => {
                let rejected =
                    instance.rejected_by(input.actor.clone(), input.comments.clone(), now)?;
                (rejected, None)
            }
            ApprovalAction::Recall => {
                return Err(CoreError::InvalidAction(input.action.as_str().to_string()));
            }
        };

        // 6. 保存
        self.save_instance(&updated, expected_version).await?;

        // 7. 監査イベントとビジネスイベント
        Ok(self.record_approval(&input, level, updated, progress).await)
    }

    async fn record_approval(
        &self,
        input: &ApprovalDecisionInput,
        level: LevelNumber,
        updated: WorkflowInstance,
        progress: Option<ApprovalProgress>,
    ) -> WorkflowInstance {
        let mut metadata = Map::new();
        metadata.insert("level".to_string(), JsonValue::from(level.as_u32()));
        if let Some(comments) = &input.comments {
            metadata.insert("comments".to_string(), JsonValue::from(comments.as_str()));
        }
        let (audit_action, event_action) = match progress {
            Some(progress) => {
                let level_completed = !matches!(progress, ApprovalProgress::LevelPending { .. });
                metadata.insert(
                    "levelCompleted".to_string(),
                    JsonValue::from(level_completed),
                );
                let event_action = match progress {
                    ApprovalProgress::WorkflowApproved { .. } => event::action::WORKFLOW_APPROVED,
                    _ => event::action::LEVEL_APPROVED,
                };
                (AuditAction::WorkflowApproved, event_action)
            }
            None => (AuditAction::WorkflowRejected, event::action::WORKFLOW_REJECTED),
        };
        self.emit_audit(AuditEvent::for_transition(
            audit_action,
            input.actor.clone(),
            &updated,
            metadata,
            updated.updated_at(),
        ))
        .await;

        log_business_event!(
            event.category = event::category::WORKFLOW,
            event.action = event_action,
            event.entity_type = event::entity_type::WORKFLOW_INSTANCE,
            event.entity_id = %updated.id(),
            event.actor_id = %input.actor,
            event.result = event::result::SUCCESS,
            level = level.as_u32(),
            status = updated.status().as_str(),
            "承認操作を記録"
        );

        updated
    }
}
