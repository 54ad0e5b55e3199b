//! # ロールディレクトリ
//!
//! 承認レベルに割り当てられたロールを、実際の承認主体に解決する。
//!
//! ## 設計方針
//!
//! - **無効な主体の除外**: `principal_roles.active = false` の割り当ては解決結果に含めない
//! - **和集合**: 複数ロールの解決結果は主体 ID の重複を除いた和集合
//! - **読み取り専用**: ロール割り当ての管理は本システムの責務外

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use procureflow_domain::principal::{PrincipalId, RoleRef};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// ロールディレクトリトレイト
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// ロール集合に属する有効な主体を解決する
    async fn resolve_approvers(
        &self,
        roles: &BTreeSet<RoleRef>,
    ) -> Result<HashSet<PrincipalId>, InfraError>;

    /// 主体がいずれかのロールに有効なメンバーとして属しているか
    async fn is_member(
        &self,
        principal: &PrincipalId,
        roles: &BTreeSet<RoleRef>,
    ) -> Result<bool, InfraError>;
}

fn role_codes(roles: &BTreeSet<RoleRef>) -> Vec<String> {
    roles.iter().map(|r| r.as_str().to_string()).collect()
}

/// PostgreSQL 実装の RoleDirectory
#[derive(Debug, Clone)]
pub struct PostgresRoleDirectory {
    pool: PgPool,
}

impl PostgresRoleDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleDirectory for PostgresRoleDirectory {
    #[tracing::instrument(skip_all, level = "debug", fields(role_count = roles.len()))]
    async fn resolve_approvers(
        &self,
        roles: &BTreeSet<RoleRef>,
    ) -> Result<HashSet<PrincipalId>, InfraError> {
        if roles.is_empty() {
            return Ok(HashSet::new());
        }

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT principal_id
            FROM principal_roles
            WHERE role = ANY($1) AND active
            "#,
        )
        .bind(role_codes(roles))
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(PrincipalId::from_uuid).collect())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%principal))]
    async fn is_member(
        &self,
        principal: &PrincipalId,
        roles: &BTreeSet<RoleRef>,
    ) -> Result<bool, InfraError> {
        if roles.is_empty() {
            return Ok(false);
        }

        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM principal_roles
                WHERE principal_id = $1 AND role = ANY($2) AND active
            )
            "#,
        )
        .bind(principal.as_uuid())
        .bind(role_codes(roles))
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
