//! # WorkflowDefinitionRepository
//!
//! ワークフロー定義の永続化を担当するリポジトリ。
//!
//! ## 設計方針
//!
//! - **JSONB 列**: 承認レベルとルーティングルールは `levels` / `routing_rules` 列に JSONB で格納
//! - **楽観的ロック**: 更新は `WHERE id = $1 AND version = $2` で行い、0 行なら競合
//! - **既定の一意性**: 種別ごとに有効な既定定義は 1 つ（部分一意インデックス
//!   `workflow_definitions_default_per_type`）。既定の切り替えは呼び出し側が
//!   同一トランザクション内で旧既定の解除と新既定の設定を行う
//! - **論理削除**: 削除済み定義も `find_by_id` では取得できる（既存インスタンスからの参照用）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use procureflow_domain::{
    document::DocumentType,
    principal::PrincipalId,
    value_objects::{Version, WorkflowName},
    workflow::{
        ApprovalLevel,
        DefinitionStatus,
        RoutingRule,
        WorkflowDefinition,
        WorkflowDefinitionId,
        WorkflowDefinitionRecord,
    },
};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{db::TxContext, error::InfraError};

const ENTITY: &str = "WorkflowDefinition";

/// ワークフロー定義リポジトリトレイト
#[async_trait]
pub trait WorkflowDefinitionRepository: Send + Sync {
    /// 定義を新規作成する
    async fn insert(
        &self,
        tx: &mut TxContext,
        definition: &WorkflowDefinition,
    ) -> Result<(), InfraError>;

    /// バージョンチェック付きで定義を更新する
    ///
    /// # 戻り値
    ///
    /// - `Err(Conflict)`: バージョン不一致、または既定の一意制約違反
    async fn update_with_version_check(
        &self,
        tx: &mut TxContext,
        definition: &WorkflowDefinition,
        expected_version: Version,
    ) -> Result<(), InfraError>;

    /// ID で定義を取得する（論理削除済みを含む）
    async fn find_by_id(
        &self,
        id: &WorkflowDefinitionId,
    ) -> Result<Option<WorkflowDefinition>, InfraError>;

    /// 種別ごとの有効な定義を取得する
    ///
    /// 既定の定義が先頭、以降は更新日時の新しい順。
    async fn find_active_by_document_type(
        &self,
        document_type: DocumentType,
    ) -> Result<Vec<WorkflowDefinition>, InfraError>;

    /// 未削除の定義一覧を取得する（種別指定は任意）
    async fn find_all(
        &self,
        document_type: Option<DocumentType>,
    ) -> Result<Vec<WorkflowDefinition>, InfraError>;
}

/// DB の workflow_definitions テーブルの行を表す中間構造体
#[derive(sqlx::FromRow)]
struct WorkflowDefinitionRow {
    id:            Uuid,
    name:          String,
    document_type: String,
    levels:        JsonValue,
    routing_rules: JsonValue,
    status:        String,
    is_default:    bool,
    removed:       bool,
    version:       i32,
    created_by:    Uuid,
    created_at:    DateTime<Utc>,
    updated_at:    DateTime<Utc>,
}

impl TryFrom<WorkflowDefinitionRow> for WorkflowDefinition {
    type Error = InfraError;

    fn try_from(row: WorkflowDefinitionRow) -> Result<Self, Self::Error> {
        let levels: Vec<ApprovalLevel> = serde_json::from_value(row.levels)?;
        let routing_rules: Vec<RoutingRule> = serde_json::from_value(row.routing_rules)?;
        Ok(WorkflowDefinition::from_db(WorkflowDefinitionRecord {
            id: WorkflowDefinitionId::from_uuid(row.id),
            name: WorkflowName::new(row.name)?,
            document_type: row.document_type.parse::<DocumentType>()?,
            levels,
            routing_rules,
            status: row.status.parse::<DefinitionStatus>()?,
            is_default: row.is_default,
            removed: row.removed,
            version: Version::try_from(row.version)?,
            created_by: PrincipalId::from_uuid(row.created_by),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, name, document_type, levels, routing_rules, status,
        is_default, removed, version, created_by, created_at, updated_at
    FROM workflow_definitions
"#;

/// PostgreSQL 実装の WorkflowDefinitionRepository
#[derive(Debug, Clone)]
pub struct PostgresWorkflowDefinitionRepository {
    pool: PgPool,
}

impl PostgresWorkflowDefinitionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowDefinitionRepository for PostgresWorkflowDefinitionRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(id = %definition.id()))]
    async fn insert(
        &self,
        tx: &mut TxContext,
        definition: &WorkflowDefinition,
    ) -> Result<(), InfraError> {
        let levels = serde_json::to_value(definition.levels())?;
        let routing_rules = serde_json::to_value(definition.routing_rules())?;
        sqlx::query(
            r#"
            INSERT INTO workflow_definitions (
                id, name, document_type, levels, routing_rules, status,
                is_default, removed, version, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(definition.id().as_uuid())
        .bind(definition.name().as_str())
        .bind(definition.document_type().as_str())
        .bind(levels)
        .bind(routing_rules)
        .bind(definition.status().as_str())
        .bind(definition.is_default())
        .bind(definition.is_removed())
        .bind(definition.version().as_i32())
        .bind(definition.created_by().as_uuid())
        .bind(definition.created_at())
        .bind(definition.updated_at())
        .execute(tx.conn()?)
        .await
        .map_err(|e| InfraError::from_write(e, ENTITY, definition.id()))?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(id = %definition.id(), %expected_version))]
    async fn update_with_version_check(
        &self,
        tx: &mut TxContext,
        definition: &WorkflowDefinition,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let levels = serde_json::to_value(definition.levels())?;
        let routing_rules = serde_json::to_value(definition.routing_rules())?;
        let result = sqlx::query(
            r#"
            UPDATE workflow_definitions SET
                name = $1,
                levels = $2,
                routing_rules = $3,
                status = $4,
                is_default = $5,
                removed = $6,
                version = $7,
                updated_at = $8
            WHERE id = $9 AND version = $10
            "#,
        )
        .bind(definition.name().as_str())
        .bind(levels)
        .bind(routing_rules)
        .bind(definition.status().as_str())
        .bind(definition.is_default())
        .bind(definition.is_removed())
        .bind(definition.version().as_i32())
        .bind(definition.updated_at())
        .bind(definition.id().as_uuid())
        .bind(expected_version.as_i32())
        .execute(tx.conn()?)
        .await
        .map_err(|e| InfraError::from_write(e, ENTITY, definition.id()))?;

        if result.rows_affected() == 0 {
            return Err(InfraError::conflict(ENTITY, definition.id().to_string()));
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(
        &self,
        id: &WorkflowDefinitionId,
    ) -> Result<Option<WorkflowDefinition>, InfraError> {
        let row = sqlx::query_as::<_, WorkflowDefinitionRow>(&format!(
            "{SELECT_COLUMNS} WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkflowDefinition::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(document_type = %document_type))]
    async fn find_active_by_document_type(
        &self,
        document_type: DocumentType,
    ) -> Result<Vec<WorkflowDefinition>, InfraError> {
        let rows = sqlx::query_as::<_, WorkflowDefinitionRow>(&format!(
            "{SELECT_COLUMNS}
            WHERE document_type = $1 AND status = 'active' AND NOT removed
            ORDER BY is_default DESC, updated_at DESC"
        ))
        .bind(document_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkflowDefinition::try_from).collect()
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn find_all(
        &self,
        document_type: Option<DocumentType>,
    ) -> Result<Vec<WorkflowDefinition>, InfraError> {
        let rows = sqlx::query_as::<_, WorkflowDefinitionRow>(&format!(
            "{SELECT_COLUMNS}
            WHERE NOT removed AND ($1::TEXT IS NULL OR document_type = $1)
            ORDER BY document_type, updated_at DESC"
        ))
        .bind(document_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkflowDefinition::try_from).collect()
    }
}
