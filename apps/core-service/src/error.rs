//! # Core Service エラー定義
//!
//! ワークフローエンジンが呼び出し側（ドキュメントサービス / HTTP 層）に返すエラー分類。
//!
//! ## 設計方針
//!
//! - すべて呼び出し単位のエラーで、エンジン自身は再試行しない
//! - [`CoreError::code`] は HTTP 層がレスポンスに載せる安定したトークン
//! - 監査イベント送信の失敗はここに現れない（ログ出力のみ）

use procureflow_domain::{
    DomainError,
    document::{DocumentId, DocumentType},
    workflow::{WorkflowDefinitionId, WorkflowInstanceId},
};
use procureflow_infra::InfraError;
use thiserror::Error;

/// Core Service で発生するエラー
#[derive(Debug, Error)]
pub enum CoreError {
    /// 種別に有効なワークフロー定義がない
    #[error("有効なワークフロー定義がありません: {0}")]
    NoActiveDefinition(DocumentType),

    /// ルーティングの結果、必要な承認レベルが空
    #[error("必要な承認レベルを決定できません")]
    NoLevelsDetermined,

    /// ドキュメントに処理中のインスタンスが既に存在する
    #[error("処理中のワークフローが既に存在します: {document_type}/{document_id}")]
    DuplicateInstance {
        document_type: DocumentType,
        document_id:   DocumentId,
    },

    #[error("ワークフローインスタンスが見つかりません: {0}")]
    InstanceNotFound(WorkflowInstanceId),

    #[error("ワークフロー定義が見つかりません: {0}")]
    DefinitionNotFound(WorkflowDefinitionId),

    /// 終了済みインスタンスへの変更操作
    #[error("ワークフローは既に終了しています（{status}）")]
    WorkflowAlreadyTerminal { status: &'static str },

    /// 現在のレベルが定義に存在しない
    #[error("承認レベル {0} の設定が定義にありません")]
    InvalidLevel(u32),

    /// 操作者が現在のレベルの承認者ではない
    #[error("承認権限がありません: {0}")]
    NotAuthorized(String),

    /// 操作者が現在のレベルで既に操作済み
    #[error("{actor} はレベル {level} で既に操作済みです")]
    AlreadyActed { actor: String, level: u32 },

    /// approve / reject 以外のアクション
    #[error("不正なアクションです: {0}")]
    InvalidAction(String),

    /// 楽観的ロックによる更新の競合
    #[error("競合が発生しました: {0}")]
    ConcurrencyConflict(String),

    /// 定義の入力検証エラー
    #[error("入力が不正です: {0}")]
    Validation(String),

    /// データベースエラー
    #[error("データベースエラー: {0}")]
    Database(#[from] InfraError),
}

impl CoreError {
    /// エラー種別を表す安定したトークン
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoActiveDefinition(_) => "no_active_definition",
            Self::NoLevelsDetermined => "no_levels_determined",
            Self::DuplicateInstance { .. } => "duplicate_instance",
            Self::InstanceNotFound(_) => "instance_not_found",
            Self::DefinitionNotFound(_) => "definition_not_found",
            Self::WorkflowAlreadyTerminal { .. } => "workflow_already_terminal",
            Self::InvalidLevel(_) => "invalid_level",
            Self::NotAuthorized(_) => "not_authorized",
            Self::AlreadyActed { .. } => "already_acted",
            Self::InvalidAction(_) => "invalid_action",
            Self::ConcurrencyConflict(_) => "concurrency_conflict",
            Self::Validation(_) => "validation",
            Self::Database(_) => "database",
        }
    }
}

impl From<DomainError> for CoreError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation(msg) => Self::Validation(msg),
            e @ DomainError::UnsupportedOperator(_) => Self::Validation(e.to_string()),
            DomainError::AlreadyTerminal { status } => Self::WorkflowAlreadyTerminal { status },
            DomainError::AlreadyActed { actor, level } => Self::AlreadyActed { actor, level },
            DomainError::InvalidLevel(level) => Self::InvalidLevel(level),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(DomainError::AlreadyTerminal { status: "approved" }, "workflow_already_terminal")]
    #[case(
        DomainError::AlreadyActed { actor: "p-1".to_string(), level: 1 },
        "already_acted"
    )]
    #[case(DomainError::InvalidLevel(3), "invalid_level")]
    #[case(DomainError::Validation("x".to_string()), "validation")]
    #[case(DomainError::UnsupportedOperator("between".to_string()), "validation")]
    fn test_ドメインエラーの変換(#[case] error: DomainError, #[case] expected: &str) {
        assert_eq!(CoreError::from(error).code(), expected);
    }

    #[test]
    fn test_終了済みエラーは状態を保持する() {
        let error = CoreError::from(DomainError::AlreadyTerminal { status: "rejected" });

        assert!(matches!(
            error,
            CoreError::WorkflowAlreadyTerminal { status: "rejected" }
        ));
        assert_eq!(error.to_string(), "ワークフローは既に終了しています（rejected）");
    }

    #[test]
    fn test_インフラエラーはdatabaseになる() {
        let error: CoreError = InfraError::unexpected("接続断").into();

        assert_eq!(error.code(), "database");
    }
}
