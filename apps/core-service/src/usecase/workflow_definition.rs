//! # ワークフロー定義ユースケース
//!
//! 管理者によるワークフロー定義の作成・改訂・ライフサイクル操作を実装する。
//!
//! ## 設計方針
//!
//! - **書き込み時の検証**: レベル番号の連続性、ルールの参照先、未対応の演算子を
//!   保存前にまとめて検証し、すべてのエラーを返す
//! - **既定の切り替え**: 旧既定の解除と新既定の設定を同一トランザクションで行う。
//!   同時に別の既定が設定された場合は部分一意インデックスが `ConcurrencyConflict` にする
//! - **論理削除のみ**: 既存インスタンスが参照し続けられるよう、物理削除はしない
//!
//! ## ライフサイクル
//!
//! ```text
//! draft ──activate──→ active ──retire──→ retired
//!   └──────────────remove（removed = true）──────┘
//! ```

use std::sync::Arc;

use procureflow_domain::{
    clock::Clock,
    document::DocumentType,
    principal::PrincipalId,
    value_objects::{Version, WorkflowName},
    workflow::{
        ApprovalLevel,
        DefinitionRevision,
        NewWorkflowDefinition,
        RoutingRule,
        ValidationResult,
        WorkflowDefinition,
        WorkflowDefinitionId,
        validate_definition_input,
    },
};
use procureflow_infra::{
    InfraError,
    InfraErrorKind,
    db::{TransactionManager, TxContext},
    repository::WorkflowDefinitionRepository,
};
use procureflow_shared::{event_log::event, log_business_event};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::{
    error::CoreError,
    usecase::helpers::{FindResultExt, validation_error},
};

/// 定義の作成・改訂入力
///
/// 管理画面から受け取る JSON をそのまま受け付ける。
/// ルーティングルールは未検証の JSON として受け取り、保存前にパース・検証する。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionInput {
    pub name:          String,
    pub levels:        Vec<ApprovalLevel>,
    #[serde(default)]
    pub routing_rules: Vec<JsonValue>,
}

/// ワークフロー定義ユースケースの依存コンポーネント
#[derive(Clone)]
pub struct WorkflowDefinitionDeps {
    pub definition_repo: Arc<dyn WorkflowDefinitionRepository>,
    pub tx_manager:      Arc<dyn TransactionManager>,
    pub clock:           Arc<dyn Clock>,
}

/// ワークフロー定義ユースケース
pub struct WorkflowDefinitionUseCase {
    deps: WorkflowDefinitionDeps,
}

/// 入力を検証し、名前とパース済みルールを返す
fn parse_input(
    input: DefinitionInput,
) -> Result<(WorkflowName, Vec<ApprovalLevel>, Vec<RoutingRule>), CoreError> {
    let name = WorkflowName::new(input.name)?;
    let result = validate_definition_input(&input.levels, &input.routing_rules);
    if !result.valid {
        return Err(validation_error(&result.errors));
    }
    let rules = input
        .routing_rules
        .iter()
        .map(RoutingRule::from_json)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((name, input.levels, rules))
}

fn stale_definition() -> CoreError {
    CoreError::ConcurrencyConflict(
        "ワークフロー定義は既に更新されています。最新の情報を取得してください。".to_string(),
    )
}

fn conflict_to_core(e: InfraError) -> CoreError {
    match e.kind() {
        InfraErrorKind::Conflict { .. } => stale_definition(),
        _ => CoreError::Database(e),
    }
}

impl WorkflowDefinitionUseCase {
    pub fn new(deps: WorkflowDefinitionDeps) -> Self {
        Self { deps }
    }

    /// 定義を下書きとして作成する
    #[tracing::instrument(skip_all, fields(%document_type))]
    pub async fn create(
        &self,
        document_type: DocumentType,
        input: DefinitionInput,
        created_by: PrincipalId,
    ) -> Result<WorkflowDefinition, CoreError> {
        let (name, levels, routing_rules) = parse_input(input)?;
        let definition = WorkflowDefinition::new(NewWorkflowDefinition {
            id: WorkflowDefinitionId::new(),
            name,
            document_type,
            levels,
            routing_rules,
            created_by: created_by.clone(),
            now: self.deps.clock.now(),
        })?;

        let mut tx = self.deps.tx_manager.begin().await?;
        self.deps
            .definition_repo
            .insert(&mut tx, &definition)
            .await
            .map_err(conflict_to_core)?;
        tx.commit().await?;

        log_business_event!(
            event.category = event::category::DEFINITION,
            event.action = event::action::DEFINITION_CREATED,
            event.entity_type = event::entity_type::WORKFLOW_DEFINITION,
            event.entity_id = %definition.id(),
            event.actor_id = %created_by,
            event.result = event::result::SUCCESS,
            "ワークフロー定義作成"
        );

        Ok(definition)
    }

    /// 名前・レベル・ルールを置き換える
    ///
    /// `expected_version` が保存済みの version と一致しない場合は `ConcurrencyConflict`。
    /// 改訂は既存インスタンスの必須レベルに影響しない。
    #[tracing::instrument(skip_all, fields(%id, %expected_version))]
    pub async fn update(
        &self,
        id: &WorkflowDefinitionId,
        input: DefinitionInput,
        expected_version: Version,
    ) -> Result<WorkflowDefinition, CoreError> {
        let (name, levels, routing_rules) = parse_input(input)?;
        let definition = self.load(id).await?;
        if definition.version() != expected_version {
            return Err(stale_definition());
        }

        let revised = definition.revised(
            DefinitionRevision {
                name,
                levels,
                routing_rules,
            },
            self.deps.clock.now(),
        )?;
        self.save(&revised, expected_version).await?;

        self.log_event(event::action::DEFINITION_UPDATED, &revised);
        Ok(revised)
    }

    /// 定義を有効化する
    #[tracing::instrument(skip_all, fields(%id))]
    pub async fn activate(&self, id: &WorkflowDefinitionId) -> Result<WorkflowDefinition, CoreError> {
        let definition = self.load(id).await?;
        let expected_version = definition.version();
        let activated = definition.activated(self.deps.clock.now())?;
        self.save(&activated, expected_version).await?;

        self.log_event(event::action::DEFINITION_ACTIVATED, &activated);
        Ok(activated)
    }

    /// 定義を引退させる（既定も解除される）
    #[tracing::instrument(skip_all, fields(%id))]
    pub async fn retire(&self, id: &WorkflowDefinitionId) -> Result<WorkflowDefinition, CoreError> {
        let definition = self.load(id).await?;
        let expected_version = definition.version();
        let retired = definition.retired(self.deps.clock.now())?;
        self.save(&retired, expected_version).await?;

        self.log_event(event::action::DEFINITION_RETIRED, &retired);
        Ok(retired)
    }

    /// 定義を種別の既定にする
    ///
    /// 同じ種別の既存の既定を解除し、同一トランザクションで新しい既定を設定する。
    #[tracing::instrument(skip_all, fields(%id))]
    pub async fn set_default(
        &self,
        id: &WorkflowDefinitionId,
    ) -> Result<WorkflowDefinition, CoreError> {
        let definition = self.load(id).await?;
        if definition.is_default() {
            return Ok(definition);
        }
        let now = self.deps.clock.now();
        let expected_version = definition.version();
        let marked = definition.marked_default(now)?;

        let previous_defaults: Vec<WorkflowDefinition> = self
            .deps
            .definition_repo
            .find_active_by_document_type(marked.document_type())
            .await?
            .into_iter()
            .filter(|d| d.is_default() && d.id() != marked.id())
            .collect();

        let mut tx = self.deps.tx_manager.begin().await?;
        for previous in previous_defaults {
            let previous_version = previous.version();
            self.update_in(&mut tx, &previous.unmarked_default(now), previous_version)
                .await?;
        }
        self.update_in(&mut tx, &marked, expected_version).await?;
        tx.commit().await?;

        self.log_event(event::action::DEFINITION_DEFAULT_CHANGED, &marked);
        Ok(marked)
    }

    /// 定義を論理削除する
    #[tracing::instrument(skip_all, fields(%id))]
    pub async fn remove(&self, id: &WorkflowDefinitionId) -> Result<WorkflowDefinition, CoreError> {
        let definition = self.load(id).await?;
        if definition.is_removed() {
            return Ok(definition);
        }
        let expected_version = definition.version();
        let removed = definition.removed(self.deps.clock.now());
        self.save(&removed, expected_version).await?;

        self.log_event(event::action::DEFINITION_REMOVED, &removed);
        Ok(removed)
    }

    /// 保存せずにレベルとルールを検証する（ドライラン）
    pub fn validate(&self, levels: &[ApprovalLevel], routing_rules: &[JsonValue]) -> ValidationResult {
        validate_definition_input(levels, routing_rules)
    }

    /// ID で定義を取得する（論理削除済みを含む）
    pub async fn get(&self, id: &WorkflowDefinitionId) -> Result<WorkflowDefinition, CoreError> {
        self.load(id).await
    }

    /// 未削除の定義一覧を取得する
    pub async fn list(
        &self,
        document_type: Option<DocumentType>,
    ) -> Result<Vec<WorkflowDefinition>, CoreError> {
        Ok(self.deps.definition_repo.find_all(document_type).await?)
    }

    /// 種別に対してエンジンが使用する定義を取得する
    ///
    /// 有効かつ未削除のうち、既定を優先し、なければ最終更新が新しいもの。
    pub async fn find_active(
        &self,
        document_type: DocumentType,
    ) -> Result<Option<WorkflowDefinition>, CoreError> {
        Ok(self
            .deps
            .definition_repo
            .find_active_by_document_type(document_type)
            .await?
            .into_iter()
            .next())
    }

    async fn load(&self, id: &WorkflowDefinitionId) -> Result<WorkflowDefinition, CoreError> {
        self.deps
            .definition_repo
            .find_by_id(id)
            .await
            .or_not_found(|| CoreError::DefinitionNotFound(id.clone()))
    }

    async fn save(
        &self,
        definition: &WorkflowDefinition,
        expected_version: Version,
    ) -> Result<(), CoreError> {
        let mut tx = self.deps.tx_manager.begin().await?;
        self.update_in(&mut tx, definition, expected_version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_in(
        &self,
        tx: &mut TxContext,
        definition: &WorkflowDefinition,
        expected_version: Version,
    ) -> Result<(), CoreError> {
        self.deps
            .definition_repo
            .update_with_version_check(tx, definition, expected_version)
            .await
            .map_err(conflict_to_core)
    }

    fn log_event(&self, action: &'static str, definition: &WorkflowDefinition) {
        log_business_event!(
            event.category = event::category::DEFINITION,
            event.action = action,
            event.entity_type = event::entity_type::WORKFLOW_DEFINITION,
            event.entity_id = %definition.id(),
            event.result = event::result::SUCCESS,
            document_type = definition.document_type().as_str(),
            status = definition.status().as_str(),
            "ワークフロー定義更新"
        );
    }
}
