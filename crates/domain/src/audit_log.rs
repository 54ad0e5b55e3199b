//! # 監査イベント
//!
//! ワークフローインスタンスの状態遷移を監査証跡として記録するドメインモデル。
//!
//! ## 設計方針
//!
//! - **不変性**: 監査イベントは一度作成されたら変更されない
//! - **ベストエフォート**: 記録の失敗はワークフローの遷移を巻き戻さない（エンジン側で握りつぶしてログ出力）
//!
//! ## アクション体系
//!
//! | バリアント | 文字列表現 |
//! |-----------|-----------|
//! | `WorkflowInitiated` | `workflow_initiated` |
//! | `WorkflowApproved` | `workflow_approved` |
//! | `WorkflowRejected` | `workflow_rejected` |
//! | `WorkflowCancelled` | `workflow_cancelled` |

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{
    principal::PrincipalId,
    workflow::{WorkflowInstance, WorkflowInstanceId},
};

/// 監査対象のエンティティ種別
pub const WORKFLOW_INSTANCE_ENTITY: &str = "WorkflowInstance";

/// 監査対象のアクション
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    WorkflowInitiated,
    WorkflowApproved,
    WorkflowRejected,
    WorkflowCancelled,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowInitiated => "workflow_initiated",
            Self::WorkflowApproved => "workflow_approved",
            Self::WorkflowRejected => "workflow_rejected",
            Self::WorkflowCancelled => "workflow_cancelled",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workflow_initiated" => Ok(Self::WorkflowInitiated),
            "workflow_approved" => Ok(Self::WorkflowApproved),
            "workflow_rejected" => Ok(Self::WorkflowRejected),
            "workflow_cancelled" => Ok(Self::WorkflowCancelled),
            _ => Err(format!("不明な監査アクション: {s}")),
        }
    }
}

/// 監査イベント
///
/// `metadata` にはアクション固有の情報（レベル、コメント、必須レベル等）を格納する。
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub id: Uuid,
    pub actor: PrincipalId,
    pub action: AuditAction,
    pub entity_type: &'static str,
    pub entity_id: String,
    pub metadata: JsonValue,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    /// ワークフローインスタンスに対する監査イベントを作成する
    pub fn for_instance(
        action: AuditAction,
        actor: PrincipalId,
        instance_id: &WorkflowInstanceId,
        metadata: JsonValue,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            actor,
            action,
            entity_type: WORKFLOW_INSTANCE_ENTITY,
            entity_id: instance_id.to_string(),
            metadata,
            occurred_at,
        }
    }

    /// 遷移後のインスタンスの状態を metadata に含めて作成する
    pub fn for_transition(
        action: AuditAction,
        actor: PrincipalId,
        instance: &WorkflowInstance,
        mut metadata: serde_json::Map<String, JsonValue>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        metadata.insert(
            "documentType".to_string(),
            JsonValue::from(instance.document_type().as_str()),
        );
        metadata.insert(
            "documentId".to_string(),
            JsonValue::from(instance.document_id().to_string()),
        );
        metadata.insert(
            "status".to_string(),
            JsonValue::from(instance.status().as_str()),
        );
        Self::for_instance(
            action,
            actor,
            instance.id(),
            JsonValue::Object(metadata),
            occurred_at,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::{
        document::{DocumentId, DocumentType},
        value_objects::{LevelNumber, Version},
        workflow::{NewWorkflowInstance, WorkflowDefinitionId},
    };

    #[test]
    fn test_audit_actionの各バリアントがスネークケース文字列に変換される() {
        assert_eq!(AuditAction::WorkflowInitiated.to_string(), "workflow_initiated");
        assert_eq!(AuditAction::WorkflowApproved.to_string(), "workflow_approved");
        assert_eq!(AuditAction::WorkflowRejected.to_string(), "workflow_rejected");
        assert_eq!(AuditAction::WorkflowCancelled.to_string(), "workflow_cancelled");
    }

    #[test]
    fn test_audit_actionが文字列からパースできる() {
        assert_eq!(
            "workflow_rejected".parse::<AuditAction>().unwrap(),
            AuditAction::WorkflowRejected
        );
        assert!("user.create".parse::<AuditAction>().is_err());
    }

    #[test]
    fn test_遷移イベントにはインスタンスの状態が含まれる() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let document_id = DocumentId::new();
        let instance = WorkflowInstance::new(NewWorkflowInstance {
            id: WorkflowInstanceId::new(),
            definition_id: WorkflowDefinitionId::new(),
            definition_version: Version::initial(),
            document_type: DocumentType::MaterialQuotation,
            document_id: document_id.clone(),
            required_levels: BTreeSet::from([LevelNumber::FIRST]),
            submitted_by: PrincipalId::new(),
            now,
        })
        .unwrap();
        let mut metadata = serde_json::Map::new();
        metadata.insert("requiredLevels".to_string(), json!([1]));

        let sut = AuditEvent::for_transition(
            AuditAction::WorkflowInitiated,
            instance.submitted_by().clone(),
            &instance,
            metadata,
            now,
        );

        assert_eq!(sut.entity_type, "WorkflowInstance");
        assert_eq!(sut.entity_id, instance.id().to_string());
        assert_eq!(
            sut.metadata,
            json!({
                "requiredLevels": [1],
                "documentType": "material_quotation",
                "documentId": document_id.to_string(),
                "status": "pending"
            })
        );
    }
}
