//! # WorkflowInstanceRepository
//!
//! ワークフローインスタンスの永続化を担当するリポジトリ。
//!
//! ## 設計方針
//!
//! - **レベル集合は配列列**: `required_levels` / `completed_levels` は `INT4[]` で格納
//! - **承認履歴は JSONB**: 追記のみの履歴を `history` 列にまとめて保存する
//! - **処理中インスタンスの一意性**: `(document_type, document_id) WHERE status = 'pending'`
//!   の部分一意インデックスで保証する。違反は `Conflict` として返す
//! - **楽観的ロック**: 更新は `WHERE id = $x AND version = $y`、0 行なら競合

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use procureflow_domain::{
    document::{DocumentId, DocumentType},
    principal::PrincipalId,
    value_objects::{LevelNumber, Version},
    workflow::{
        ApprovalHistoryEntry,
        WorkflowDefinitionId,
        WorkflowInstance,
        WorkflowInstanceId,
        WorkflowInstanceRecord,
        WorkflowInstanceStatus,
    },
};
use procureflow_shared::Page;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{db::TxContext, error::InfraError};

const ENTITY: &str = "WorkflowInstance";

/// インスタンス一覧の絞り込み条件
///
/// すべて省略可能。指定した条件は AND で結合される。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    pub status:        Option<WorkflowInstanceStatus>,
    pub document_type: Option<DocumentType>,
    pub submitted_by:  Option<PrincipalId>,
}

impl InstanceFilter {
    /// 条件に一致するかを判定する（インメモリ実装用）
    pub fn matches(&self, instance: &WorkflowInstance) -> bool {
        self.status.is_none_or(|s| instance.status() == s)
            && self
                .document_type
                .is_none_or(|t| instance.document_type() == t)
            && self
                .submitted_by
                .as_ref()
                .is_none_or(|p| instance.submitted_by() == p)
    }
}

/// ステータス別の件数と平均承認所要時間
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    pub total:                    u64,
    pub pending:                  u64,
    pub approved:                 u64,
    pub rejected:                 u64,
    pub cancelled:                u64,
    /// 承認完了インスタンスの申請から完了までの平均秒数（承認完了が 0 件なら `None`）
    pub average_approval_seconds: Option<f64>,
}

/// ワークフローインスタンスリポジトリトレイト
#[async_trait]
pub trait WorkflowInstanceRepository: Send + Sync {
    /// インスタンスを新規作成する
    ///
    /// 同じドキュメントに処理中のインスタンスがある場合は `Conflict` を返す。
    async fn insert(
        &self,
        tx: &mut TxContext,
        instance: &WorkflowInstance,
    ) -> Result<(), InfraError>;

    /// バージョンチェック付きでインスタンスを更新する
    async fn update_with_version_check(
        &self,
        tx: &mut TxContext,
        instance: &WorkflowInstance,
        expected_version: Version,
    ) -> Result<(), InfraError>;

    /// ID でインスタンスを取得する
    async fn find_by_id(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<Option<WorkflowInstance>, InfraError>;

    /// ドキュメントの処理中インスタンスを取得する
    async fn find_active_by_document(
        &self,
        document_type: DocumentType,
        document_id: &DocumentId,
    ) -> Result<Option<WorkflowInstance>, InfraError>;

    /// ドキュメントの全インスタンスを申請日時の新しい順で取得する
    async fn find_by_document(
        &self,
        document_type: DocumentType,
        document_id: &DocumentId,
    ) -> Result<Vec<WorkflowInstance>, InfraError>;

    /// 絞り込み条件とページングで一覧を取得する（申請日時の新しい順）
    async fn find_by_filter(
        &self,
        filter: &InstanceFilter,
        page: Page,
    ) -> Result<Vec<WorkflowInstance>, InfraError>;

    /// 処理中のインスタンスを申請日時の古い順で取得する
    async fn find_pending(
        &self,
        document_type: Option<DocumentType>,
    ) -> Result<Vec<WorkflowInstance>, InfraError>;

    /// ステータス別の集計を取得する
    async fn summarize(
        &self,
        document_type: Option<DocumentType>,
    ) -> Result<InstanceSummary, InfraError>;
}

/// DB の workflow_instances テーブルの行を表す中間構造体
#[derive(sqlx::FromRow)]
struct WorkflowInstanceRow {
    id:                 Uuid,
    definition_id:      Uuid,
    definition_version: i32,
    document_type:      String,
    document_id:        Uuid,
    status:             String,
    required_levels:    Vec<i32>,
    completed_levels:   Vec<i32>,
    history:            JsonValue,
    submitted_by:       Uuid,
    submitted_at:       DateTime<Utc>,
    completed_at:       Option<DateTime<Utc>>,
    version:            i32,
    updated_at:         DateTime<Utc>,
}

fn levels_from_db(values: Vec<i32>) -> Result<BTreeSet<LevelNumber>, InfraError> {
    values
        .into_iter()
        .map(|v| {
            let n = u32::try_from(v)
                .map_err(|_| InfraError::unexpected(format!("不正なレベル番号: {v}")))?;
            Ok(LevelNumber::new(n)?)
        })
        .collect()
}

fn levels_to_db(levels: &BTreeSet<LevelNumber>) -> Vec<i32> {
    levels
        .iter()
        .map(|l| i32::try_from(l.as_u32()).unwrap_or(i32::MAX))
        .collect()
}

impl TryFrom<WorkflowInstanceRow> for WorkflowInstance {
    type Error = InfraError;

    fn try_from(row: WorkflowInstanceRow) -> Result<Self, Self::Error> {
        let history: Vec<ApprovalHistoryEntry> = serde_json::from_value(row.history)?;
        let instance = WorkflowInstance::from_db(WorkflowInstanceRecord {
            id: WorkflowInstanceId::from_uuid(row.id),
            definition_id: WorkflowDefinitionId::from_uuid(row.definition_id),
            definition_version: Version::try_from(row.definition_version)?,
            document_type: row.document_type.parse::<DocumentType>()?,
            document_id: DocumentId::from_uuid(row.document_id),
            status: row.status.parse::<WorkflowInstanceStatus>()?,
            required_levels: levels_from_db(row.required_levels)?,
            completed_levels: levels_from_db(row.completed_levels)?,
            history,
            submitted_by: PrincipalId::from_uuid(row.submitted_by),
            submitted_at: row.submitted_at,
            completed_at: row.completed_at,
            version: Version::try_from(row.version)?,
            updated_at: row.updated_at,
        })?;
        Ok(instance)
    }
}

fn into_instances(rows: Vec<WorkflowInstanceRow>) -> Result<Vec<WorkflowInstance>, InfraError> {
    rows.into_iter().map(WorkflowInstance::try_from).collect()
}

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, definition_id, definition_version, document_type, document_id, status,
        required_levels, completed_levels, history, submitted_by, submitted_at,
        completed_at, version, updated_at
    FROM workflow_instances
"#;

/// PostgreSQL 実装の WorkflowInstanceRepository
#[derive(Debug, Clone)]
pub struct PostgresWorkflowInstanceRepository {
    pool: PgPool,
}

impl PostgresWorkflowInstanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    total:                    i64,
    pending:                  i64,
    approved:                 i64,
    rejected:                 i64,
    cancelled:                i64,
    average_approval_seconds: Option<f64>,
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[async_trait]
impl WorkflowInstanceRepository for PostgresWorkflowInstanceRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(id = %instance.id()))]
    async fn insert(
        &self,
        tx: &mut TxContext,
        instance: &WorkflowInstance,
    ) -> Result<(), InfraError> {
        let history = serde_json::to_value(instance.history())?;
        sqlx::query(
            r#"
            INSERT INTO workflow_instances (
                id, definition_id, definition_version, document_type, document_id, status,
                required_levels, completed_levels, history, submitted_by, submitted_at,
                completed_at, version, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(instance.id().as_uuid())
        .bind(instance.definition_id().as_uuid())
        .bind(instance.definition_version().as_i32())
        .bind(instance.document_type().as_str())
        .bind(instance.document_id().as_uuid())
        .bind(instance.status().as_str())
        .bind(levels_to_db(instance.required_levels()))
        .bind(levels_to_db(instance.completed_levels()))
        .bind(history)
        .bind(instance.submitted_by().as_uuid())
        .bind(instance.submitted_at())
        .bind(instance.completed_at())
        .bind(instance.version().as_i32())
        .bind(instance.updated_at())
        .execute(tx.conn()?)
        .await
        .map_err(|e| InfraError::from_write(e, ENTITY, instance.document_id()))?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(id = %instance.id(), %expected_version))]
    async fn update_with_version_check(
        &self,
        tx: &mut TxContext,
        instance: &WorkflowInstance,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let history = serde_json::to_value(instance.history())?;
        let result = sqlx::query(
            r#"
            UPDATE workflow_instances SET
                status = $1,
                completed_levels = $2,
                history = $3,
                completed_at = $4,
                version = $5,
                updated_at = $6
            WHERE id = $7 AND version = $8
            "#,
        )
        .bind(instance.status().as_str())
        .bind(levels_to_db(instance.completed_levels()))
        .bind(history)
        .bind(instance.completed_at())
        .bind(instance.version().as_i32())
        .bind(instance.updated_at())
        .bind(instance.id().as_uuid())
        .bind(expected_version.as_i32())
        .execute(tx.conn()?)
        .await
        .map_err(|e| InfraError::from_write(e, ENTITY, instance.id()))?;

        if result.rows_affected() == 0 {
            return Err(InfraError::conflict(ENTITY, instance.id().to_string()));
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<Option<WorkflowInstance>, InfraError> {
        let row =
            sqlx::query_as::<_, WorkflowInstanceRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        row.map(WorkflowInstance::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%document_type, %document_id))]
    async fn find_active_by_document(
        &self,
        document_type: DocumentType,
        document_id: &DocumentId,
    ) -> Result<Option<WorkflowInstance>, InfraError> {
        let row = sqlx::query_as::<_, WorkflowInstanceRow>(&format!(
            "{SELECT_COLUMNS}
            WHERE document_type = $1 AND document_id = $2 AND status = 'pending'"
        ))
        .bind(document_type.as_str())
        .bind(document_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkflowInstance::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%document_type, %document_id))]
    async fn find_by_document(
        &self,
        document_type: DocumentType,
        document_id: &DocumentId,
    ) -> Result<Vec<WorkflowInstance>, InfraError> {
        let rows = sqlx::query_as::<_, WorkflowInstanceRow>(&format!(
            "{SELECT_COLUMNS}
            WHERE document_type = $1 AND document_id = $2
            ORDER BY submitted_at DESC"
        ))
        .bind(document_type.as_str())
        .bind(document_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        into_instances(rows)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(offset = page.offset(), limit = page.limit()))]
    async fn find_by_filter(
        &self,
        filter: &InstanceFilter,
        page: Page,
    ) -> Result<Vec<WorkflowInstance>, InfraError> {
        let rows = sqlx::query_as::<_, WorkflowInstanceRow>(&format!(
            "{SELECT_COLUMNS}
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND ($2::TEXT IS NULL OR document_type = $2)
              AND ($3::UUID IS NULL OR submitted_by = $3)
            ORDER BY submitted_at DESC
            OFFSET $4 LIMIT $5"
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.document_type.map(|t| t.as_str()))
        .bind(filter.submitted_by.as_ref().map(|p| *p.as_uuid()))
        .bind(i64::from(page.offset()))
        .bind(i64::from(page.limit()))
        .fetch_all(&self.pool)
        .await?;

        into_instances(rows)
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn find_pending(
        &self,
        document_type: Option<DocumentType>,
    ) -> Result<Vec<WorkflowInstance>, InfraError> {
        let rows = sqlx::query_as::<_, WorkflowInstanceRow>(&format!(
            "{SELECT_COLUMNS}
            WHERE status = 'pending' AND ($1::TEXT IS NULL OR document_type = $1)
            ORDER BY submitted_at ASC"
        ))
        .bind(document_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?;

        into_instances(rows)
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn summarize(
        &self,
        document_type: Option<DocumentType>,
    ) -> Result<InstanceSummary, InfraError> {
        let row = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'approved') AS approved,
                COUNT(*) FILTER (WHERE status = 'rejected') AS rejected,
                COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled,
                (AVG(EXTRACT(EPOCH FROM (completed_at - submitted_at)))
                    FILTER (WHERE status = 'approved'))::FLOAT8 AS average_approval_seconds
            FROM workflow_instances
            WHERE ($1::TEXT IS NULL OR document_type = $1)
            "#,
        )
        .bind(document_type.map(|t| t.as_str()))
        .fetch_one(&self.pool)
        .await?;

        Ok(InstanceSummary {
            total:                    count(row.total),
            pending:                  count(row.pending),
            approved:                 count(row.approved),
            rejected:                 count(row.rejected),
            cancelled:                count(row.cancelled),
            average_approval_seconds: row.average_approval_seconds,
        })
    }
}
