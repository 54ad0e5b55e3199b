//! テスト共通フィクスチャ
//!
//! DB を使用する統合テストで共通利用するエンティティ生成ヘルパー。
//! Rust の統合テスト規約に従い `tests/common/mod.rs` に配置。

// 各テストファイルが独立したクレートとしてコンパイルされるため、
// 使用しない関数に dead_code 警告が出る。モジュール全体で抑制する。
#![allow(dead_code)]

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use procureflow_domain::{
    document::{DocumentId, DocumentType},
    principal::{PrincipalId, RoleRef},
    value_objects::{LevelName, LevelNumber, Version, WorkflowName},
    workflow::{
        ApprovalLevel,
        ApprovalMode,
        NewWorkflowDefinition,
        NewWorkflowInstance,
        RoutingRule,
        WorkflowDefinition,
        WorkflowDefinitionId,
        WorkflowInstance,
        WorkflowInstanceId,
    },
};
use procureflow_infra::{
    db::{PgTransactionManager, TransactionManager},
    repository::{PostgresWorkflowDefinitionRepository, WorkflowDefinitionRepository},
};
use serde_json::json;
use sqlx::PgPool;

/// テスト用の固定日時
pub fn test_now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub fn level(number: u32, role: &str, mandatory: bool) -> ApprovalLevel {
    ApprovalLevel {
        number: LevelNumber::new(number).unwrap(),
        name: LevelName::new(format!("レベル{number}")).unwrap(),
        approver_roles: BTreeSet::from([RoleRef::new(role).unwrap()]),
        approval_mode: ApprovalMode::Any,
        mandatory,
    }
}

pub fn levels(numbers: &[u32]) -> BTreeSet<LevelNumber> {
    numbers
        .iter()
        .map(|n| LevelNumber::new(*n).unwrap())
        .collect()
}

/// 発注書向けの 2 レベル定義（金額 10000 超でレベル 2 を追加）
pub fn create_test_definition(document_type: DocumentType) -> WorkflowDefinition {
    WorkflowDefinition::new(NewWorkflowDefinition {
        id: WorkflowDefinitionId::new(),
        name: WorkflowName::new("テスト定義").unwrap(),
        document_type,
        levels: vec![level(1, "manager", true), level(2, "director", false)],
        routing_rules: vec![
            RoutingRule::from_json(&json!({
                "conditionField": "amount",
                "operator": "gt",
                "comparisonValue": 10000,
                "targetLevels": [2]
            }))
            .unwrap(),
        ],
        created_by: PrincipalId::new(),
        now: test_now(),
    })
    .unwrap()
}

/// 定義を有効化して保存する
pub async fn insert_active_definition(
    pool: &PgPool,
    document_type: DocumentType,
) -> WorkflowDefinition {
    let repo = PostgresWorkflowDefinitionRepository::new(pool.clone());
    let tx_manager = PgTransactionManager::new(pool.clone());
    let definition = create_test_definition(document_type)
        .activated(test_now())
        .unwrap();

    let mut tx = tx_manager.begin().await.unwrap();
    repo.insert(&mut tx, &definition).await.unwrap();
    tx.commit().await.unwrap();

    definition
}

/// 定義に紐づく処理中インスタンスを作成する
pub fn create_test_instance(
    definition: &WorkflowDefinition,
    document_id: DocumentId,
    required: &[u32],
) -> WorkflowInstance {
    WorkflowInstance::new(NewWorkflowInstance {
        id: WorkflowInstanceId::new(),
        definition_id: definition.id().clone(),
        definition_version: definition.version(),
        document_type: definition.document_type(),
        document_id,
        required_levels: levels(required),
        submitted_by: PrincipalId::new(),
        now: test_now(),
    })
    .unwrap()
}

pub fn initial_version() -> Version {
    Version::initial()
}
