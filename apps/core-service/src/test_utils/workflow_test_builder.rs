//! ワークフローテストビルダー
//!
//! テストコードの重複を削減するためのビルダーパターン実装。
//! 標準的な定義データとモックのセットアップを提供する。

use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Utc};
use procureflow_domain::{
    clock::FixedClock,
    document::{DocumentContext, DocumentId, DocumentType},
    principal::{PrincipalId, RoleRef},
    value_objects::{LevelName, LevelNumber, WorkflowName},
    workflow::{
        ApprovalLevel,
        ApprovalMode,
        ApprovalRouter,
        NewWorkflowDefinition,
        RoutingRule,
        RoutingStrategy,
        WorkflowDefinition,
        WorkflowDefinitionId,
    },
};
use procureflow_infra::{
    audit_sink::AuditSink,
    mock::{
        MockRoleDirectory,
        MockTransactionManager,
        MockWorkflowDefinitionRepository,
        MockWorkflowInstanceRepository,
        RecordingAuditSink,
    },
    repository::WorkflowInstanceRepository,
};
use serde_json::{Value as JsonValue, json};

use crate::usecase::{
    InitiateWorkflowInput,
    WorkflowDefinitionDeps,
    WorkflowDefinitionUseCase,
    WorkflowEngine,
    WorkflowEngineDeps,
};

/// ワークフローテストビルダー
///
/// # 使用例
///
/// ```ignore
/// let builder = WorkflowTestBuilder::new();
/// let setup = builder.build();
/// let definition = setup.add_definition(builder.purchase_order_definition());
/// ```
pub struct WorkflowTestBuilder {
    now:        DateTime<Utc>,
    strategy:   RoutingStrategy,
    audit_sink: Option<Arc<dyn AuditSink>>,
}

/// SUT とモックへの参照
pub struct WorkflowTestSetup {
    pub engine:          WorkflowEngine,
    pub definitions:     WorkflowDefinitionUseCase,
    pub definition_repo: MockWorkflowDefinitionRepository,
    pub instance_repo:   MockWorkflowInstanceRepository,
    pub role_directory:  MockRoleDirectory,
    pub audit_sink:      RecordingAuditSink,
    deps:                WorkflowEngineDeps,
    strategy:            RoutingStrategy,
}

impl WorkflowTestBuilder {
    /// 固定時刻と Union ルーティングでビルダーを作成
    pub fn new() -> Self {
        Self {
            now:        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            strategy:   RoutingStrategy::Union,
            audit_sink: None,
        }
    }

    /// 現在時刻を指定
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// ルーティング戦略を指定
    pub fn with_strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// 監査シンクを差し替える
    pub fn with_audit_sink(mut self, audit_sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(audit_sink);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// 承認レベルを作成
    pub fn level(number: u32, role: &str, mode: ApprovalMode, mandatory: bool) -> ApprovalLevel {
        ApprovalLevel {
            number: LevelNumber::new(number).unwrap(),
            name: LevelName::new(format!("レベル{number}")).unwrap(),
            approver_roles: BTreeSet::from([RoleRef::new(role).unwrap()]),
            approval_mode: mode,
            mandatory,
        }
    }

    /// 有効化済みの定義を作成
    pub fn active_definition(
        &self,
        document_type: DocumentType,
        levels: Vec<ApprovalLevel>,
        rules: Vec<JsonValue>,
    ) -> WorkflowDefinition {
        let routing_rules = rules
            .iter()
            .map(|r| RoutingRule::from_json(r).unwrap())
            .collect();
        WorkflowDefinition::new(NewWorkflowDefinition {
            id: WorkflowDefinitionId::new(),
            name: WorkflowName::new(format!("{}承認", document_type.as_str())).unwrap(),
            document_type,
            levels,
            routing_rules,
            created_by: PrincipalId::new(),
            now: self.now,
        })
        .unwrap()
        .activated(self.now)
        .unwrap()
    }

    /// 標準的な発注書の定義
    ///
    /// レベル 1（manager、必須）とレベル 2（director、任意）。
    /// 金額が 10000 を超える場合にレベル 2 を追加する。
    pub fn purchase_order_definition(&self) -> WorkflowDefinition {
        self.active_definition(
            DocumentType::PurchaseOrder,
            vec![
                Self::level(1, "manager", ApprovalMode::Any, true),
                Self::level(2, "director", ApprovalMode::Any, false),
            ],
            vec![json!({
                "conditionField": "amount",
                "operator": "gt",
                "comparisonValue": 10000,
                "targetLevels": [2]
            })],
        )
    }

    /// モック群を含む SUT を構築
    pub fn build(&self) -> WorkflowTestSetup {
        let definition_repo = MockWorkflowDefinitionRepository::new();
        let instance_repo = MockWorkflowInstanceRepository::new();
        let role_directory = MockRoleDirectory::new();
        let recording = RecordingAuditSink::new();
        let audit_sink: Arc<dyn AuditSink> = self
            .audit_sink
            .clone()
            .unwrap_or_else(|| Arc::new(recording.clone()));

        let deps = WorkflowEngineDeps {
            definition_repo: Arc::new(definition_repo.clone()),
            instance_repo: Arc::new(instance_repo.clone()),
            role_directory: Arc::new(role_directory.clone()),
            audit_sink,
            tx_manager: Arc::new(MockTransactionManager),
            clock: Arc::new(FixedClock::new(self.now)),
        };
        let definitions = WorkflowDefinitionUseCase::new(WorkflowDefinitionDeps {
            definition_repo: deps.definition_repo.clone(),
            tx_manager:      deps.tx_manager.clone(),
            clock:           deps.clock.clone(),
        });

        WorkflowTestSetup {
            engine: WorkflowEngine::new(deps.clone(), ApprovalRouter::new(self.strategy)),
            definitions,
            definition_repo,
            instance_repo,
            role_directory,
            audit_sink: recording,
            deps,
            strategy: self.strategy,
        }
    }
}

impl Default for WorkflowTestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowTestSetup {
    /// 定義を登録して返す
    pub fn add_definition(&self, definition: WorkflowDefinition) -> WorkflowDefinition {
        self.definition_repo.add_definition(definition.clone());
        definition
    }

    /// ロールに所属する主体を作成する
    pub fn principal_with_role(&self, role: &str) -> PrincipalId {
        let principal = PrincipalId::new();
        self.role_directory.assign(role, &principal);
        principal
    }

    /// 金額を含む開始入力を作成する
    pub fn initiate_input(&self, document_type: DocumentType, amount: i64) -> InitiateWorkflowInput {
        InitiateWorkflowInput {
            document_type,
            document_id: DocumentId::new(),
            initiated_by: PrincipalId::new(),
            context: DocumentContext::default().with("amount", amount),
        }
    }

    /// インスタンスリポジトリだけを差し替えたエンジンを構築する
    ///
    /// 他のモックは共有する。
    pub fn engine_with_instance_repo(
        &self,
        instance_repo: Arc<dyn WorkflowInstanceRepository>,
    ) -> WorkflowEngine {
        WorkflowEngine::new(
            WorkflowEngineDeps {
                instance_repo,
                ..self.deps.clone()
            },
            ApprovalRouter::new(self.strategy),
        )
    }
}
