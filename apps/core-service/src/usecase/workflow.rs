//! # ワークフローエンジン
//!
//! ワークフローインスタンスのライフサイクル（開始・承認/却下・取り消し）と参照系を実装する。
//!
//! ## 設計方針
//!
//! - **依存の明示的な注入**: リポジトリ・ロールディレクトリ・監査送信・時刻を
//!   [`WorkflowEngineDeps`] で受け取る
//! - **インスタンス単位の単一書き込み**: 変更操作は読み取り → ドメイン遷移 →
//!   バージョンチェック付き更新の順で行い、競合は `ConcurrencyConflict` として返す
//! - **監査はベストエフォート**: 監査イベントの送信はコミット後に行い、失敗はログのみ
//!
//! ## モジュール構成
//!
//! | モジュール | 内容 |
//! |-----------|------|
//! | `command::initiate` | ワークフローの開始 |
//! | `command::decision` | 承認・却下 |
//! | `command::cancel` | 取り消し |
//! | `query` | 取得・一覧・履歴・統計・承認待ち |

mod command;
mod query;

use std::sync::Arc;

use procureflow_domain::{
    clock::Clock,
    document::{DocumentContext, DocumentId, DocumentType},
    principal::PrincipalId,
    workflow::{ApprovalAction, ApprovalRouter, WorkflowInstanceId},
};
use procureflow_infra::{
    audit_sink::AuditSink,
    db::TransactionManager,
    repository::{WorkflowDefinitionRepository, WorkflowInstanceRepository},
    role_directory::RoleDirectory,
};

/// ワークフロー開始入力
#[derive(Debug, Clone)]
pub struct InitiateWorkflowInput {
    pub document_type: DocumentType,
    pub document_id:   DocumentId,
    pub initiated_by:  PrincipalId,
    /// ルーティングルールの評価対象（金額・カテゴリ等）
    pub context:       DocumentContext,
}

/// 承認・却下入力
#[derive(Debug, Clone)]
pub struct ApprovalDecisionInput {
    pub instance_id: WorkflowInstanceId,
    pub actor:       PrincipalId,
    /// `approve` または `reject`
    pub action:      ApprovalAction,
    pub comments:    Option<String>,
}

/// 取り消し入力
#[derive(Debug, Clone)]
pub struct CancelWorkflowInput {
    pub instance_id: WorkflowInstanceId,
    pub actor:       PrincipalId,
    pub reason:      Option<String>,
}

/// 承認待ち一覧の絞り込み条件
#[derive(Debug, Clone, Default)]
pub struct PendingApprovalFilter {
    pub document_type: Option<DocumentType>,
}

/// ワークフローエンジンの依存コンポーネント
#[derive(Clone)]
pub struct WorkflowEngineDeps {
    pub definition_repo: Arc<dyn WorkflowDefinitionRepository>,
    pub instance_repo:   Arc<dyn WorkflowInstanceRepository>,
    pub role_directory:  Arc<dyn RoleDirectory>,
    pub audit_sink:      Arc<dyn AuditSink>,
    pub tx_manager:      Arc<dyn TransactionManager>,
    pub clock:           Arc<dyn Clock>,
}

/// ワークフローエンジン
pub struct WorkflowEngine {
    deps:   WorkflowEngineDeps,
    router: ApprovalRouter,
}

impl WorkflowEngine {
    pub fn new(deps: WorkflowEngineDeps, router: ApprovalRouter) -> Self {
        Self { deps, router }
    }

    pub fn router(&self) -> &ApprovalRouter {
        &self.router
    }
}
