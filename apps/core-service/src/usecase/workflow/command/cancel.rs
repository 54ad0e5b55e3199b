//! ワークフローの取り消し

use procureflow_domain::{
    audit_log::{AuditAction, AuditEvent},
    workflow::WorkflowInstance,
};
use procureflow_shared::{event_log::event, log_business_event};
use serde_json::{Map, Value as JsonValue};

use crate::{
    error::CoreError,
    usecase::workflow::{CancelWorkflowInput, WorkflowEngine},
};

impl WorkflowEngine {
    /// 処理中のワークフローを取り消す
    ///
    /// 現在のレベルに `recall` エントリを追記して `cancelled` に遷移する。
    /// 取り消したインスタンスは再開できない。
    #[tracing::instrument(
        skip_all,
        fields(instance_id = %input.instance_id, actor = %input.actor)
    )]
    pub async fn cancel(&self, input: CancelWorkflowInput) -> Result<WorkflowInstance, CoreError> {
        let instance = self.load_instance(&input.instance_id).await?;
        let level = instance.current_level();

        let now = self.deps.clock.now();
        let expected_version = instance.version();
        let cancelled = instance.cancelled_by(input.actor.clone(), input.reason.clone(), now)?;

        self.save_instance(&cancelled, expected_version).await?;

        let mut metadata = Map::new();
        metadata.insert("level".to_string(), JsonValue::from(level.as_u32()));
        if let Some(reason) = &input.reason {
            metadata.insert("reason".to_string(), JsonValue::from(reason.as_str()));
        }
        self.emit_audit(AuditEvent::for_transition(
            AuditAction::WorkflowCancelled,
            input.actor.clone(),
            &cancelled,
            metadata,
            now,
        ))
        .await;

        log_business_event!(
            event.category = event::category::WORKFLOW,
            event.action = event::action::WORKFLOW_CANCELLED,
            event.entity_type = event::entity_type::WORKFLOW_INSTANCE,
            event.entity_id = %cancelled.id(),
            event.actor_id = %input.actor,
            event.result = event::result::SUCCESS,
            "ワークフロー取り消し"
        );

        Ok(cancelled)
    }
}
