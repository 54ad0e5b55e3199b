//! ワークフローエンジンの統合テスト
//!
//! モックのリポジトリ・ロールディレクトリ・監査シンクを使い、
//! 開始から承認完了・却下・取り消しまでを通して検証する。

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use procureflow_core_service::{
    error::CoreError,
    test_utils::{WorkflowTestBuilder, WorkflowTestSetup},
    usecase::{ApprovalDecisionInput, CancelWorkflowInput, PendingApprovalFilter},
};
use procureflow_domain::{
    audit_log::AuditAction,
    document::{DocumentId, DocumentType},
    principal::PrincipalId,
    value_objects::{LevelNumber, Version},
    workflow::{
        ApprovalAction,
        ApprovalMode,
        RoutingStrategy,
        WorkflowInstance,
        WorkflowInstanceId,
        WorkflowInstanceStatus,
    },
};
use procureflow_infra::{
    InfraError,
    db::TxContext,
    mock::{FailingAuditSink, MockWorkflowInstanceRepository},
    repository::{InstanceFilter, InstanceSummary, WorkflowInstanceRepository},
};
use procureflow_shared::Page;
use rstest::rstest;
use serde_json::json;

fn levels(numbers: &[u32]) -> BTreeSet<LevelNumber> {
    numbers
        .iter()
        .map(|n| LevelNumber::new(*n).unwrap())
        .collect()
}

fn decision(
    instance: &WorkflowInstance,
    actor: &PrincipalId,
    action: ApprovalAction,
) -> ApprovalDecisionInput {
    ApprovalDecisionInput {
        instance_id: instance.id().clone(),
        actor: actor.clone(),
        action,
        comments: None,
    }
}

/// 発注書の定義と manager / director を用意したセットアップ
fn purchase_order_setup() -> (WorkflowTestSetup, PrincipalId, PrincipalId) {
    let builder = WorkflowTestBuilder::new();
    let setup = builder.build();
    setup.add_definition(builder.purchase_order_definition());
    let manager = setup.principal_with_role("manager");
    let director = setup.principal_with_role("director");
    (setup, manager, director)
}

#[tokio::test]
async fn test_少額の発注書は必須レベルのみで承認完了する() {
    // Arrange
    let (setup, manager, _) = purchase_order_setup();
    let input = setup.initiate_input(DocumentType::PurchaseOrder, 5000);

    // Act
    let instance = setup.engine.initiate(input).await.unwrap();
    let approved = setup
        .engine
        .process_approval(decision(&instance, &manager, ApprovalAction::Approve))
        .await
        .unwrap();

    // Assert
    assert_eq!(instance.required_levels(), &levels(&[1]));
    assert_eq!(approved.status(), WorkflowInstanceStatus::Approved);
    assert!(approved.completed_at().is_some());
}

#[tokio::test]
async fn test_高額の発注書はレベル2まで順に承認される() {
    // Arrange
    let (setup, manager, director) = purchase_order_setup();
    let input = setup.initiate_input(DocumentType::PurchaseOrder, 50000);

    // Act
    let instance = setup.engine.initiate(input).await.unwrap();
    let after_level1 = setup
        .engine
        .process_approval(decision(&instance, &manager, ApprovalAction::Approve))
        .await
        .unwrap();
    let after_level2 = setup
        .engine
        .process_approval(decision(&instance, &director, ApprovalAction::Approve))
        .await
        .unwrap();

    // Assert
    assert_eq!(instance.required_levels(), &levels(&[1, 2]));
    assert_eq!(instance.current_level(), LevelNumber::new(1).unwrap());
    assert_eq!(after_level1.status(), WorkflowInstanceStatus::Pending);
    assert_eq!(after_level1.current_level(), LevelNumber::new(2).unwrap());
    assert_eq!(after_level2.status(), WorkflowInstanceStatus::Approved);
    assert_eq!(after_level2.completed_levels(), &levels(&[1, 2]));
    assert!(after_level2.completed_at().is_some());
}

#[tokio::test]
async fn test_却下すると即座に終端となり以降の承認は拒否される() {
    // Arrange
    let (setup, manager, _) = purchase_order_setup();
    let other_manager = setup.principal_with_role("manager");
    let instance = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::PurchaseOrder, 50000))
        .await
        .unwrap();

    // Act
    let rejected = setup
        .engine
        .process_approval(decision(&instance, &manager, ApprovalAction::Reject))
        .await
        .unwrap();
    let err = setup
        .engine
        .process_approval(decision(&instance, &other_manager, ApprovalAction::Approve))
        .await
        .unwrap_err();

    // Assert
    assert_eq!(rejected.status(), WorkflowInstanceStatus::Rejected);
    assert_eq!(rejected.required_levels(), &levels(&[1, 2]));
    assert!(matches!(err, CoreError::WorkflowAlreadyTerminal { .. }));
}

#[tokio::test]
async fn test_承認者ロールにない主体は承認できず状態は変わらない() {
    // Arrange
    let (setup, _, director) = purchase_order_setup();
    let instance = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::PurchaseOrder, 50000))
        .await
        .unwrap();

    // Act
    let err = setup
        .engine
        .process_approval(decision(&instance, &director, ApprovalAction::Approve))
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(err, CoreError::NotAuthorized(_)));
    let stored = setup.engine.get(instance.id()).await.unwrap();
    assert_eq!(stored, instance);
}

#[tokio::test]
async fn test_同じレベルで二度操作するとalready_acted() {
    // Arrange
    let builder = WorkflowTestBuilder::new();
    let setup = builder.build();
    setup.add_definition(builder.active_definition(
        DocumentType::PurchaseOrder,
        vec![WorkflowTestBuilder::level(1, "buyer", ApprovalMode::All, true)],
        vec![],
    ));
    let first = setup.principal_with_role("buyer");
    setup.principal_with_role("buyer");
    let instance = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::PurchaseOrder, 100))
        .await
        .unwrap();
    setup
        .engine
        .process_approval(decision(&instance, &first, ApprovalAction::Approve))
        .await
        .unwrap();

    // Act
    let err = setup
        .engine
        .process_approval(decision(&instance, &first, ApprovalAction::Approve))
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(err, CoreError::AlreadyActed { level: 1, .. }));
}

#[tokio::test]
async fn test_レベルもルールもない定義からは開始できない() {
    // Arrange
    let builder = WorkflowTestBuilder::new();
    let setup = builder.build();
    setup.add_definition(builder.active_definition(DocumentType::Supplier, vec![], vec![]));

    // Act
    let err = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::Supplier, 0))
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(err, CoreError::NoLevelsDetermined));
    assert!(setup.instance_repo.all().is_empty());
}

#[tokio::test]
async fn test_有効な定義がない種別は開始できない() {
    let (setup, _, _) = purchase_order_setup();

    let err = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::PrePayment, 100))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::NoActiveDefinition(DocumentType::PrePayment)));
}

#[tokio::test]
async fn test_処理中のドキュメントに二重に開始するとduplicate_instance() {
    // Arrange
    let (setup, _, _) = purchase_order_setup();
    let input = setup.initiate_input(DocumentType::PurchaseOrder, 100);
    setup.engine.initiate(input.clone()).await.unwrap();

    // Act
    let err = setup.engine.initiate(input).await.unwrap_err();

    // Assert
    assert_eq!(err.code(), "duplicate_instance");
    assert_eq!(setup.instance_repo.all().len(), 1);
}

#[tokio::test]
async fn test_終端後のドキュメントは再開始できる() {
    // Arrange
    let (setup, manager, _) = purchase_order_setup();
    let input = setup.initiate_input(DocumentType::PurchaseOrder, 100);
    let first = setup.engine.initiate(input.clone()).await.unwrap();
    setup
        .engine
        .process_approval(decision(&first, &manager, ApprovalAction::Reject))
        .await
        .unwrap();

    // Act
    let second = setup.engine.initiate(input.clone()).await.unwrap();

    // Assert
    assert_ne!(first.id(), second.id());
    assert_eq!(second.status(), WorkflowInstanceStatus::Pending);
    let all = setup
        .engine
        .list(
            &InstanceFilter {
                document_type: Some(DocumentType::PurchaseOrder),
                ..Default::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert!(
        setup
            .engine
            .find_by_document(DocumentType::PurchaseOrder, &input.document_id)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_allモードは全承認者の承認でレベルが完了する() {
    // Arrange
    let builder = WorkflowTestBuilder::new();
    let setup = builder.build();
    setup.add_definition(builder.active_definition(
        DocumentType::MaterialQuotation,
        vec![
            WorkflowTestBuilder::level(1, "buyer", ApprovalMode::All, true),
            WorkflowTestBuilder::level(2, "manager", ApprovalMode::Any, true),
        ],
        vec![],
    ));
    let buyer_a = setup.principal_with_role("buyer");
    let buyer_b = setup.principal_with_role("buyer");
    let instance = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::MaterialQuotation, 100))
        .await
        .unwrap();

    // Act
    let after_a = setup
        .engine
        .process_approval(decision(&instance, &buyer_a, ApprovalAction::Approve))
        .await
        .unwrap();
    let after_b = setup
        .engine
        .process_approval(decision(&instance, &buyer_b, ApprovalAction::Approve))
        .await
        .unwrap();

    // Assert
    assert_eq!(after_a.current_level(), LevelNumber::new(1).unwrap());
    assert!(after_a.completed_levels().is_empty());
    assert_eq!(after_b.current_level(), LevelNumber::new(2).unwrap());
    assert_eq!(after_b.status(), WorkflowInstanceStatus::Pending);
}

#[tokio::test]
async fn test_allモードは無効化された承認者を待たない() {
    // Arrange
    let builder = WorkflowTestBuilder::new();
    let setup = builder.build();
    setup.add_definition(builder.active_definition(
        DocumentType::MaterialQuotation,
        vec![WorkflowTestBuilder::level(1, "buyer", ApprovalMode::All, true)],
        vec![],
    ));
    let active = setup.principal_with_role("buyer");
    let departed = setup.principal_with_role("buyer");
    setup.role_directory.deactivate(&departed);
    let instance = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::MaterialQuotation, 100))
        .await
        .unwrap();

    // Act
    let approved = setup
        .engine
        .process_approval(decision(&instance, &active, ApprovalAction::Approve))
        .await
        .unwrap();

    // Assert
    assert_eq!(approved.status(), WorkflowInstanceStatus::Approved);
}

#[tokio::test]
async fn test_allモードで未承認者が途中で無効化されたら再承認でレベルが完了する() {
    // Arrange
    let builder = WorkflowTestBuilder::new();
    let setup = builder.build();
    setup.add_definition(builder.active_definition(
        DocumentType::MaterialQuotation,
        vec![WorkflowTestBuilder::level(1, "buyer", ApprovalMode::All, true)],
        vec![],
    ));
    let first = setup.principal_with_role("buyer");
    let departed = setup.principal_with_role("buyer");
    let instance = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::MaterialQuotation, 100))
        .await
        .unwrap();
    let partial = setup
        .engine
        .process_approval(decision(&instance, &first, ApprovalAction::Approve))
        .await
        .unwrap();

    // Act
    let retry_before = setup
        .engine
        .process_approval(decision(&instance, &first, ApprovalAction::Approve))
        .await
        .unwrap_err();
    setup.role_directory.deactivate(&departed);
    let departed_err = setup
        .engine
        .process_approval(decision(&instance, &departed, ApprovalAction::Approve))
        .await
        .unwrap_err();
    let settled = setup
        .engine
        .process_approval(decision(&instance, &first, ApprovalAction::Approve))
        .await
        .unwrap();

    // Assert
    assert_eq!(partial.status(), WorkflowInstanceStatus::Pending);
    assert_eq!(retry_before.code(), "already_acted");
    assert_eq!(departed_err.code(), "not_authorized");
    assert_eq!(settled.status(), WorkflowInstanceStatus::Approved);
    assert_eq!(settled.completed_levels(), &levels(&[1]));
    assert_eq!(settled.history().len(), 1);
    assert_eq!(settled.version(), partial.version().next());
    let stored = setup.engine.get(instance.id()).await.unwrap();
    assert_eq!(stored, settled);
}

#[tokio::test]
async fn test_allモードで再承認しても未承認者が残っていればalready_actedのまま() {
    // Arrange
    let builder = WorkflowTestBuilder::new();
    let setup = builder.build();
    setup.add_definition(builder.active_definition(
        DocumentType::MaterialQuotation,
        vec![WorkflowTestBuilder::level(1, "buyer", ApprovalMode::All, true)],
        vec![],
    ));
    let first = setup.principal_with_role("buyer");
    setup.principal_with_role("buyer");
    let instance = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::MaterialQuotation, 100))
        .await
        .unwrap();
    let partial = setup
        .engine
        .process_approval(decision(&instance, &first, ApprovalAction::Approve))
        .await
        .unwrap();

    // Act
    let err = setup
        .engine
        .process_approval(decision(&instance, &first, ApprovalAction::Reject))
        .await
        .unwrap_err();

    // Assert
    assert_eq!(err.code(), "already_acted");
    let stored = setup.engine.get(instance.id()).await.unwrap();
    assert_eq!(stored, partial);
}

#[tokio::test]
async fn test_取り消し後はすべての操作が終端エラーになる() {
    // Arrange
    let (setup, manager, _) = purchase_order_setup();
    let requester = PrincipalId::new();
    let instance = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::PurchaseOrder, 100))
        .await
        .unwrap();

    // Act
    let cancelled = setup
        .engine
        .cancel(CancelWorkflowInput {
            instance_id: instance.id().clone(),
            actor:       requester.clone(),
            reason:      Some("発注取りやめ".to_string()),
        })
        .await
        .unwrap();
    let approve_err = setup
        .engine
        .process_approval(decision(&instance, &manager, ApprovalAction::Approve))
        .await
        .unwrap_err();
    let cancel_err = setup
        .engine
        .cancel(CancelWorkflowInput {
            instance_id: instance.id().clone(),
            actor:       requester,
            reason:      None,
        })
        .await
        .unwrap_err();

    // Assert
    assert_eq!(cancelled.status(), WorkflowInstanceStatus::Cancelled);
    let last = cancelled.history().last().unwrap();
    assert_eq!(last.action, ApprovalAction::Recall);
    assert_eq!(last.comments.as_deref(), Some("発注取りやめ"));
    assert!(matches!(approve_err, CoreError::WorkflowAlreadyTerminal { .. }));
    assert!(matches!(cancel_err, CoreError::WorkflowAlreadyTerminal { .. }));
}

#[tokio::test]
async fn test_recallは承認操作として受け付けない() {
    let (setup, manager, _) = purchase_order_setup();
    let instance = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::PurchaseOrder, 100))
        .await
        .unwrap();

    let err = setup
        .engine
        .process_approval(decision(&instance, &manager, ApprovalAction::Recall))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "invalid_action");
}

#[tokio::test]
async fn test_存在しないインスタンスはinstance_not_found() {
    let (setup, manager, _) = purchase_order_setup();

    let err = setup
        .engine
        .process_approval(ApprovalDecisionInput {
            instance_id: WorkflowInstanceId::new(),
            actor:       manager,
            action:      ApprovalAction::Approve,
            comments:    None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::InstanceNotFound(_)));
}

#[tokio::test]
async fn test_開始後に定義を改訂しても必須レベルは変わらない() {
    // Arrange
    let builder = WorkflowTestBuilder::new();
    let setup = builder.build();
    let definition = setup.add_definition(builder.purchase_order_definition());
    let manager = setup.principal_with_role("manager");
    let instance = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::PurchaseOrder, 50000))
        .await
        .unwrap();

    // Act
    setup
        .definitions
        .update(
            definition.id(),
            serde_json::from_value(json!({
                "name": "発注書承認（改訂）",
                "levels": [
                    {"level": 1, "name": "課長", "approverRoles": ["manager"], "mandatory": true}
                ]
            }))
            .unwrap(),
            definition.version(),
        )
        .await
        .unwrap();
    let after = setup
        .engine
        .process_approval(decision(&instance, &manager, ApprovalAction::Approve))
        .await
        .unwrap();

    // Assert
    assert_eq!(after.required_levels(), &levels(&[1, 2]));
    assert_eq!(after.status(), WorkflowInstanceStatus::Pending);
}

#[tokio::test]
async fn test_現在のレベルが改訂で削除されるとinvalid_levelになり状態は変わらない() {
    // Arrange
    let builder = WorkflowTestBuilder::new();
    let setup = builder.build();
    let definition = setup.add_definition(builder.purchase_order_definition());
    let manager = setup.principal_with_role("manager");
    let director = setup.principal_with_role("director");
    let instance = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::PurchaseOrder, 50000))
        .await
        .unwrap();
    let at_level2 = setup
        .engine
        .process_approval(decision(&instance, &manager, ApprovalAction::Approve))
        .await
        .unwrap();
    setup
        .definitions
        .update(
            definition.id(),
            serde_json::from_value(json!({
                "name": "発注書承認（課長のみ）",
                "levels": [
                    {"level": 1, "name": "課長", "approverRoles": ["manager"], "mandatory": true}
                ]
            }))
            .unwrap(),
            definition.version(),
        )
        .await
        .unwrap();

    // Act
    let err = setup
        .engine
        .process_approval(decision(&instance, &director, ApprovalAction::Approve))
        .await
        .unwrap_err();

    // Assert
    assert_eq!(at_level2.current_level(), LevelNumber::new(2).unwrap());
    assert!(matches!(err, CoreError::InvalidLevel(2)));
    assert_eq!(err.code(), "invalid_level");
    let stored = setup.engine.get(instance.id()).await.unwrap();
    assert_eq!(stored, at_level2);
}

#[rstest]
#[case(RoutingStrategy::Union, &[1, 2, 3])]
#[case(RoutingStrategy::FirstMatch, &[2])]
#[tokio::test]
async fn test_ルーティング戦略で必須レベルが変わる(
    #[case] strategy: RoutingStrategy,
    #[case] expected: &[u32],
) {
    // Arrange
    let builder = WorkflowTestBuilder::new().with_strategy(strategy);
    let setup = builder.build();
    setup.add_definition(builder.active_definition(
        DocumentType::PurchaseOrder,
        vec![
            WorkflowTestBuilder::level(1, "manager", ApprovalMode::Any, true),
            WorkflowTestBuilder::level(2, "director", ApprovalMode::Any, false),
            WorkflowTestBuilder::level(3, "cfo", ApprovalMode::Any, false),
        ],
        vec![
            json!({"conditionField": "amount", "operator": "gt", "comparisonValue": 10000, "targetLevels": [2]}),
            json!({"conditionField": "amount", "operator": "gt", "comparisonValue": 100000, "targetLevels": [3]}),
        ],
    ));

    // Act
    let instance = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::PurchaseOrder, 500000))
        .await
        .unwrap();

    // Assert
    assert_eq!(instance.required_levels(), &levels(expected));
}

// ===== 監査 =====

#[tokio::test]
async fn test_遷移ごとに監査イベントが記録される() {
    // Arrange
    let (setup, manager, _) = purchase_order_setup();
    let instance = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::PurchaseOrder, 100))
        .await
        .unwrap();

    // Act
    setup
        .engine
        .process_approval(decision(&instance, &manager, ApprovalAction::Approve))
        .await
        .unwrap();

    // Assert
    let events = setup.audit_sink.events();
    let actions: Vec<AuditAction> = events.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::WorkflowInitiated, AuditAction::WorkflowApproved]
    );
    assert_eq!(events[0].entity_id, instance.id().to_string());
    assert_eq!(events[0].metadata["requiredLevels"], json!([1]));
    assert_eq!(events[1].actor, manager);
    assert_eq!(events[1].metadata["status"], json!("approved"));
}

#[tokio::test]
async fn test_監査シンクが失敗しても遷移は成功し状態は同じになる() {
    // Arrange
    let failing_builder = WorkflowTestBuilder::new().with_audit_sink(Arc::new(FailingAuditSink));
    let working_builder = WorkflowTestBuilder::new();
    let failing = failing_builder.build();
    let working = working_builder.build();
    let definition = failing_builder.purchase_order_definition();
    failing.add_definition(definition.clone());
    working.add_definition(definition);
    let manager = PrincipalId::new();
    failing.role_directory.assign("manager", &manager);
    working.role_directory.assign("manager", &manager);
    let input = failing.initiate_input(DocumentType::PurchaseOrder, 100);

    // Act
    let failing_started = failing.engine.initiate(input.clone()).await.unwrap();
    let working_started = working.engine.initiate(input).await.unwrap();
    let failing_result = failing
        .engine
        .process_approval(decision(&failing_started, &manager, ApprovalAction::Approve))
        .await
        .unwrap();
    let working_result = working
        .engine
        .process_approval(decision(&working_started, &manager, ApprovalAction::Approve))
        .await
        .unwrap();

    // Assert
    assert_eq!(failing_result.status(), working_result.status());
    assert_eq!(failing_result.completed_levels(), working_result.completed_levels());
    assert_eq!(failing_result.history(), working_result.history());
    assert_eq!(failing_result.version(), working_result.version());
    assert_eq!(working.audit_sink.events().len(), 2);
    assert!(failing.audit_sink.events().is_empty());
}

// ===== 並行更新 =====

/// 最初に読んだインスタンスを返し続けるリポジトリ
///
/// 読み取り後に別の操作が先に保存した状況を再現する。
struct StaleReadRepository {
    inner:    MockWorkflowInstanceRepository,
    snapshot: Mutex<Option<WorkflowInstance>>,
}

#[async_trait]
impl WorkflowInstanceRepository for StaleReadRepository {
    async fn insert(&self, tx: &mut TxContext, instance: &WorkflowInstance) -> Result<(), InfraError> {
        self.inner.insert(tx, instance).await
    }

    async fn update_with_version_check(
        &self,
        tx: &mut TxContext,
        instance: &WorkflowInstance,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        self.inner
            .update_with_version_check(tx, instance, expected_version)
            .await
    }

    async fn find_by_id(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<Option<WorkflowInstance>, InfraError> {
        if let Some(snapshot) = self.snapshot.lock().unwrap().clone() {
            return Ok(Some(snapshot));
        }
        self.inner.find_by_id(id).await
    }

    async fn find_active_by_document(
        &self,
        document_type: DocumentType,
        document_id: &DocumentId,
    ) -> Result<Option<WorkflowInstance>, InfraError> {
        self.inner
            .find_active_by_document(document_type, document_id)
            .await
    }

    async fn find_by_document(
        &self,
        document_type: DocumentType,
        document_id: &DocumentId,
    ) -> Result<Vec<WorkflowInstance>, InfraError> {
        self.inner.find_by_document(document_type, document_id).await
    }

    async fn find_by_filter(
        &self,
        filter: &InstanceFilter,
        page: Page,
    ) -> Result<Vec<WorkflowInstance>, InfraError> {
        self.inner.find_by_filter(filter, page).await
    }

    async fn find_pending(
        &self,
        document_type: Option<DocumentType>,
    ) -> Result<Vec<WorkflowInstance>, InfraError> {
        self.inner.find_pending(document_type).await
    }

    async fn summarize(
        &self,
        document_type: Option<DocumentType>,
    ) -> Result<InstanceSummary, InfraError> {
        self.inner.summarize(document_type).await
    }
}

#[tokio::test]
async fn test_並行して承認すると後から保存した側がconcurrency_conflict() {
    // Arrange
    let (setup, manager, _) = purchase_order_setup();
    let other_manager = setup.principal_with_role("manager");
    let instance = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::PurchaseOrder, 100))
        .await
        .unwrap();
    let stale_engine = setup.engine_with_instance_repo(Arc::new(StaleReadRepository {
        inner:    setup.instance_repo.clone(),
        snapshot: Mutex::new(Some(instance.clone())),
    }));
    setup
        .engine
        .process_approval(decision(&instance, &manager, ApprovalAction::Approve))
        .await
        .unwrap();

    // Act
    let err = stale_engine
        .process_approval(decision(&instance, &other_manager, ApprovalAction::Approve))
        .await
        .unwrap_err();

    // Assert
    assert_eq!(err.code(), "concurrency_conflict");
    let stored = setup.engine.get(instance.id()).await.unwrap();
    assert_eq!(stored.status(), WorkflowInstanceStatus::Approved);
    assert_eq!(stored.history().len(), 1);
    assert_eq!(&stored.history()[0].actor, &manager);
}

// ===== 参照系 =====

#[tokio::test]
async fn test_承認待ち一覧は現在のレベルの承認者にだけ表示される() {
    // Arrange
    let (setup, manager, director) = purchase_order_setup();
    let small = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::PurchaseOrder, 100))
        .await
        .unwrap();
    let large = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::PurchaseOrder, 50000))
        .await
        .unwrap();

    // Act
    let for_manager = setup
        .engine
        .pending_approvals_for(&manager, &PendingApprovalFilter::default())
        .await
        .unwrap();
    let for_director_before = setup
        .engine
        .pending_approvals_for(&director, &PendingApprovalFilter::default())
        .await
        .unwrap();
    setup
        .engine
        .process_approval(decision(&large, &manager, ApprovalAction::Approve))
        .await
        .unwrap();
    let for_director_after = setup
        .engine
        .pending_approvals_for(&director, &PendingApprovalFilter::default())
        .await
        .unwrap();
    let for_manager_after = setup
        .engine
        .pending_approvals_for(&manager, &PendingApprovalFilter::default())
        .await
        .unwrap();

    // Assert
    let ids = |instances: &[WorkflowInstance]| -> Vec<WorkflowInstanceId> {
        instances.iter().map(|i| i.id().clone()).collect()
    };
    assert_eq!(ids(&for_manager).len(), 2);
    assert!(for_director_before.is_empty());
    assert_eq!(ids(&for_director_after), vec![large.id().clone()]);
    assert_eq!(ids(&for_manager_after), vec![small.id().clone()]);
}

#[tokio::test]
async fn test_一覧と集計() {
    // Arrange
    let (setup, manager, _) = purchase_order_setup();
    let approved = setup
        .engine
        .initiate(setup.initiate_input(DocumentType::PurchaseOrder, 100))
        .await
        .unwrap();
    setup
        .engine
        .process_approval(decision(&approved, &manager, ApprovalAction::Approve))
        .await
        .unwrap();
    setup
        .engine
        .initiate(setup.initiate_input(DocumentType::PurchaseOrder, 200))
        .await
        .unwrap();

    // Act
    let pending = setup
        .engine
        .list(
            &InstanceFilter {
                status: Some(WorkflowInstanceStatus::Pending),
                ..Default::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    let stats = setup.engine.statistics(None).await.unwrap();
    let history = setup.engine.history(approved.id()).await.unwrap();

    // Assert
    assert_eq!(pending.len(), 1);
    assert_eq!(stats.total, 2);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.approved, 1);
    assert_eq!(stats.average_approval_seconds, Some(0.0));
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, ApprovalAction::Approve);
}
