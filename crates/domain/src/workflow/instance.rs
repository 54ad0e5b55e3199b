//! # ワークフローインスタンス
//!
//! 1 つのドキュメントに対する承認プロセスの実行を管理する。
//! 開始時に決定した必須レベルを保持し、承認・却下・取り消しのライフサイクルを持つ。
//!
//! 状態遷移は ADT（代数的データ型）で表現し、不正な状態を型レベルで防止する。
//!
//! ```text
//! pending ──approve（全レベル完了）──▶ approved
//!    │ └──reject──────────────────────▶ rejected
//!    └────cancel──────────────────────▶ cancelled
//! ```
//!
//! ## 不変条件
//!
//! - `required_levels` は開始時に決定され、以後変更されない（空にはならない）
//! - `completed_levels ⊆ required_levels`
//! - 承認履歴は追記のみ。終端状態に遷移した後は追記されない
//! - 現在レベルは `required_levels \ completed_levels` の最小値（全完了後は末尾の次）
//! - 終端状態（approved / rejected / cancelled）からの遷移は存在しない

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use super::definition::{ApprovalMode, WorkflowDefinitionId};
use crate::{
    DomainError,
    document::{DocumentId, DocumentType},
    principal::PrincipalId,
    value_objects::{LevelNumber, Version},
};

define_uuid_id! {
    /// ワークフローインスタンス ID
    pub struct WorkflowInstanceId;
}

/// ワークフローインスタンスステータス
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WorkflowInstanceStatus {
    /// 承認待ち
    Pending,
    /// 承認完了
    Approved,
    /// 却下
    Rejected,
    /// 取り消し
    Cancelled,
}

impl WorkflowInstanceStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::str::FromStr for WorkflowInstanceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(DomainError::Validation(format!(
                "不正なワークフローインスタンスステータス: {}",
                s
            ))),
        }
    }
}

/// 承認履歴のアクション
///
/// `recall` は取り消し時に記録される。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ApprovalAction {
    Approve,
    Reject,
    Recall,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl std::str::FromStr for ApprovalAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "recall" => Ok(Self::Recall),
            _ => Err(DomainError::Validation(format!("不正なアクション: {}", s))),
        }
    }
}

/// 承認履歴エントリ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalHistoryEntry {
    pub level:     LevelNumber,
    pub actor:     PrincipalId,
    pub action:    ApprovalAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments:  Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// レベル充足の判定方針
///
/// `All` の承認者集合はエンジンが承認時点のロール所属から解決して渡す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelApprovalPolicy {
    /// 1 人の承認でレベル完了
    Any,
    /// 承認者全員の承認でレベル完了
    All { approvers: HashSet<PrincipalId> },
}

impl LevelApprovalPolicy {
    pub fn mode(&self) -> ApprovalMode {
        match self {
            Self::Any => ApprovalMode::Any,
            Self::All { .. } => ApprovalMode::All,
        }
    }
}

/// 承認の結果として進んだ段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalProgress {
    /// レベル内でまだ承認が必要（ALL モード）
    LevelPending { level: LevelNumber },
    /// レベルが完了し、次のレベルへ進んだ
    LevelCompleted {
        level: LevelNumber,
        next:  LevelNumber,
    },
    /// 全レベルが完了し、承認完了となった
    WorkflowApproved { level: LevelNumber },
}

/// ワークフローインスタンスの状態（ADT ベースステートマシン）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowInstanceState {
    /// 承認待ち
    Pending,
    /// 承認完了
    Approved(CompletedState),
    /// 却下
    Rejected(CompletedState),
    /// 取り消し
    Cancelled(CompletedState),
}

/// 終端状態の共通フィールド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedState {
    /// 完了日時
    pub completed_at: DateTime<Utc>,
}

/// ワークフローインスタンスエンティティ
///
/// 共通フィールドを外側に、状態固有フィールドを `state` enum に分離する。
///
/// ## 楽観的ロック
///
/// `version` は遷移のたびにインクリメントされる。
/// リポジトリは読み取り時の version を条件に更新し、一致しなければ競合とする。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowInstance {
    id: WorkflowInstanceId,
    definition_id: WorkflowDefinitionId,
    definition_version: Version,
    document_type: DocumentType,
    document_id: DocumentId,
    required_levels: BTreeSet<LevelNumber>,
    completed_levels: BTreeSet<LevelNumber>,
    history: Vec<ApprovalHistoryEntry>,
    submitted_by: PrincipalId,
    submitted_at: DateTime<Utc>,
    version: Version,
    updated_at: DateTime<Utc>,
    state: WorkflowInstanceState,
}

/// ワークフローインスタンスの新規作成パラメータ
pub struct NewWorkflowInstance {
    pub id: WorkflowInstanceId,
    pub definition_id: WorkflowDefinitionId,
    pub definition_version: Version,
    pub document_type: DocumentType,
    pub document_id: DocumentId,
    pub required_levels: BTreeSet<LevelNumber>,
    pub submitted_by: PrincipalId,
    pub now: DateTime<Utc>,
}

/// ワークフローインスタンスの DB 復元パラメータ
///
/// DB スキーマのフラット構造を表現する。`from_db()` で不変条件を検証して ADT に変換する。
pub struct WorkflowInstanceRecord {
    pub id: WorkflowInstanceId,
    pub definition_id: WorkflowDefinitionId,
    pub definition_version: Version,
    pub document_type: DocumentType,
    pub document_id: DocumentId,
    pub status: WorkflowInstanceStatus,
    pub required_levels: BTreeSet<LevelNumber>,
    pub completed_levels: BTreeSet<LevelNumber>,
    pub history: Vec<ApprovalHistoryEntry>,
    pub submitted_by: PrincipalId,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: Version,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    /// 新しいワークフローインスタンスを承認待ちとして作成する
    ///
    /// # エラー
    ///
    /// 必須レベルが空の場合は `DomainError::Validation`。
    pub fn new(params: NewWorkflowInstance) -> Result<Self, DomainError> {
        if params.required_levels.is_empty() {
            return Err(DomainError::Validation(
                "必須レベルが空のインスタンスは作成できません".to_string(),
            ));
        }
        Ok(Self {
            id: params.id,
            definition_id: params.definition_id,
            definition_version: params.definition_version,
            document_type: params.document_type,
            document_id: params.document_id,
            required_levels: params.required_levels,
            completed_levels: BTreeSet::new(),
            history: Vec::new(),
            submitted_by: params.submitted_by,
            submitted_at: params.now,
            version: Version::initial(),
            updated_at: params.now,
            state: WorkflowInstanceState::Pending,
        })
    }

    /// 既存のデータから復元する
    ///
    /// # Errors
    ///
    /// - `DomainError::Validation`: 不変条件違反（例: 終端状態で completed_at が None）
    pub fn from_db(record: WorkflowInstanceRecord) -> Result<Self, DomainError> {
        if record.required_levels.is_empty() {
            return Err(DomainError::Validation(
                "インスタンスには必須レベルが必要です".to_string(),
            ));
        }
        if !record.completed_levels.is_subset(&record.required_levels) {
            return Err(DomainError::Validation(
                "完了レベルが必須レベルに含まれていません".to_string(),
            ));
        }
        let all_completed = record.completed_levels == record.required_levels;

        let completed = |status: WorkflowInstanceStatus| {
            record
                .completed_at
                .map(|completed_at| CompletedState { completed_at })
                .ok_or_else(|| {
                    DomainError::Validation(format!(
                        "{} インスタンスには completed_at が必要です",
                        status
                    ))
                })
        };

        let state = match record.status {
            WorkflowInstanceStatus::Pending => {
                if all_completed {
                    return Err(DomainError::Validation(
                        "全レベル完了済みのインスタンスは pending になれません".to_string(),
                    ));
                }
                WorkflowInstanceState::Pending
            }
            WorkflowInstanceStatus::Approved => {
                if !all_completed {
                    return Err(DomainError::Validation(
                        "approved インスタンスは全レベル完了済みである必要があります".to_string(),
                    ));
                }
                WorkflowInstanceState::Approved(completed(record.status)?)
            }
            WorkflowInstanceStatus::Rejected => {
                WorkflowInstanceState::Rejected(completed(record.status)?)
            }
            WorkflowInstanceStatus::Cancelled => {
                WorkflowInstanceState::Cancelled(completed(record.status)?)
            }
        };

        Ok(Self {
            id: record.id,
            definition_id: record.definition_id,
            definition_version: record.definition_version,
            document_type: record.document_type,
            document_id: record.document_id,
            required_levels: record.required_levels,
            completed_levels: record.completed_levels,
            history: record.history,
            submitted_by: record.submitted_by,
            submitted_at: record.submitted_at,
            version: record.version,
            updated_at: record.updated_at,
            state,
        })
    }

    // Getter メソッド

    pub fn id(&self) -> &WorkflowInstanceId {
        &self.id
    }

    pub fn definition_id(&self) -> &WorkflowDefinitionId {
        &self.definition_id
    }

    pub fn definition_version(&self) -> Version {
        self.definition_version
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn required_levels(&self) -> &BTreeSet<LevelNumber> {
        &self.required_levels
    }

    pub fn completed_levels(&self) -> &BTreeSet<LevelNumber> {
        &self.completed_levels
    }

    pub fn history(&self) -> &[ApprovalHistoryEntry] {
        &self.history
    }

    pub fn submitted_by(&self) -> &PrincipalId {
        &self.submitted_by
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn status(&self) -> WorkflowInstanceStatus {
        match &self.state {
            WorkflowInstanceState::Pending => WorkflowInstanceStatus::Pending,
            WorkflowInstanceState::Approved(_) => WorkflowInstanceStatus::Approved,
            WorkflowInstanceState::Rejected(_) => WorkflowInstanceStatus::Rejected,
            WorkflowInstanceState::Cancelled(_) => WorkflowInstanceStatus::Cancelled,
        }
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            WorkflowInstanceState::Pending => None,
            WorkflowInstanceState::Approved(c)
            | WorkflowInstanceState::Rejected(c)
            | WorkflowInstanceState::Cancelled(c) => Some(c.completed_at),
        }
    }

    /// 状態への直接アクセス（パターンマッチ用）
    pub fn state(&self) -> &WorkflowInstanceState {
        &self.state
    }

    // 算出プロパティ

    /// 現在のレベル
    ///
    /// 未完了の必須レベルの最小値。全レベル完了後は最終レベルの次を返す。
    pub fn current_level(&self) -> LevelNumber {
        self.required_levels
            .difference(&self.completed_levels)
            .next()
            .copied()
            .unwrap_or_else(|| self.past_the_end())
    }

    fn past_the_end(&self) -> LevelNumber {
        self.required_levels
            .iter()
            .next_back()
            .map_or(LevelNumber::FIRST, LevelNumber::successor)
    }

    /// 現在のレベルの次に控える必須レベル
    pub fn next_level(&self) -> Option<LevelNumber> {
        let current = self.current_level();
        self.required_levels
            .iter()
            .find(|level| **level > current && !self.completed_levels.contains(level))
            .copied()
    }

    /// 承認完了しているか
    pub fn is_complete(&self) -> bool {
        self.status() == WorkflowInstanceStatus::Approved
    }

    /// 進捗率（0〜100、切り捨て）
    pub fn progress_percentage(&self) -> u8 {
        if self.is_complete() {
            return 100;
        }
        let total = self.required_levels.len();
        if total == 0 {
            return 0;
        }
        let percentage = self.completed_levels.len() * 100 / total;
        u8::try_from(percentage).unwrap_or(100)
    }

    /// 操作者が指定レベルで既に操作済みか
    pub fn has_acted(&self, actor: &PrincipalId, level: LevelNumber) -> bool {
        self.history
            .iter()
            .any(|entry| entry.level == level && &entry.actor == actor)
    }

    /// 指定レベルで承認した操作者の集合
    pub fn approvers_at(&self, level: LevelNumber) -> HashSet<&PrincipalId> {
        self.history
            .iter()
            .filter(|entry| entry.level == level && entry.action == ApprovalAction::Approve)
            .map(|entry| &entry.actor)
            .collect()
    }

    // ビジネスロジックメソッド

    /// 承認待ちであることを確認する
    pub fn ensure_pending(&self) -> Result<(), DomainError> {
        match self.state {
            WorkflowInstanceState::Pending => Ok(()),
            _ => Err(DomainError::AlreadyTerminal {
                status: self.status().as_str(),
            }),
        }
    }

    /// 操作者が現在のレベルで未操作であることを確認する
    pub fn ensure_not_acted(&self, actor: &PrincipalId) -> Result<(), DomainError> {
        let level = self.current_level();
        if self.has_acted(actor, level) {
            return Err(DomainError::AlreadyActed {
                actor: actor.to_string(),
                level: level.as_u32(),
            });
        }
        Ok(())
    }

    fn with_entry(
        mut self,
        actor: PrincipalId,
        action: ApprovalAction,
        comments: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let level = self.current_level();
        self.history.push(ApprovalHistoryEntry {
            level,
            actor,
            action,
            comments,
            timestamp: now,
        });
        Self {
            version: self.version.next(),
            updated_at: now,
            ..self
        }
    }

    /// 現在のレベルで承認した新しいインスタンスを返す
    ///
    /// レベルが充足すれば完了レベルに加え、全必須レベルが完了すれば `approved` に遷移する。
    /// 操作者の承認権限はエンジンがロール所属から確認済みであること。
    pub fn approved_by(
        self,
        actor: PrincipalId,
        comments: Option<String>,
        policy: &LevelApprovalPolicy,
        now: DateTime<Utc>,
    ) -> Result<(Self, ApprovalProgress), DomainError> {
        self.ensure_pending()?;
        self.ensure_not_acted(&actor)?;

        let level = self.current_level();
        let mut approved = self.with_entry(actor, ApprovalAction::Approve, comments, now);

        let satisfied = match policy {
            LevelApprovalPolicy::Any => true,
            LevelApprovalPolicy::All { approvers } => approved.is_level_satisfied(level, approvers),
        };
        if !satisfied {
            return Ok((approved, ApprovalProgress::LevelPending { level }));
        }

        Ok(approved.with_level_completed(level, now))
    }

    /// 承認者集合の変化で充足した ALL レベルを完了させる
    ///
    /// 未承認のまま残っていた承認者がロールから外れた場合に使用する。
    /// 履歴には追記しない。現在の承認者全員が承認済みでなければ `None`。
    pub fn settled_with(
        self,
        approvers: &HashSet<PrincipalId>,
        now: DateTime<Utc>,
    ) -> Result<Option<(Self, ApprovalProgress)>, DomainError> {
        self.ensure_pending()?;

        let level = self.current_level();
        if !self.is_level_satisfied(level, approvers) {
            return Ok(None);
        }

        let settled = Self {
            version: self.version.next(),
            updated_at: now,
            ..self
        };
        Ok(Some(settled.with_level_completed(level, now)))
    }

    fn is_level_satisfied(&self, level: LevelNumber, approvers: &HashSet<PrincipalId>) -> bool {
        let approved_actors = self.approvers_at(level);
        !approved_actors.is_empty() && approvers.iter().all(|p| approved_actors.contains(p))
    }

    fn with_level_completed(
        mut self,
        level: LevelNumber,
        now: DateTime<Utc>,
    ) -> (Self, ApprovalProgress) {
        self.completed_levels.insert(level);
        if self.completed_levels == self.required_levels {
            let approved = Self {
                state: WorkflowInstanceState::Approved(CompletedState { completed_at: now }),
                ..self
            };
            return (approved, ApprovalProgress::WorkflowApproved { level });
        }

        let next = self.current_level();
        (self, ApprovalProgress::LevelCompleted { level, next })
    }

    /// 現在のレベルで却下した新しいインスタンスを返す
    pub fn rejected_by(
        self,
        actor: PrincipalId,
        comments: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        self.ensure_pending()?;
        self.ensure_not_acted(&actor)?;

        let rejected = self.with_entry(actor, ApprovalAction::Reject, comments, now);
        Ok(Self {
            state: WorkflowInstanceState::Rejected(CompletedState { completed_at: now }),
            ..rejected
        })
    }

    /// 取り消した新しいインスタンスを返す
    ///
    /// 現在のレベルに `recall` エントリを追記する。取り消し後は再開できない。
    pub fn cancelled_by(
        self,
        actor: PrincipalId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        self.ensure_pending()?;

        let cancelled = self.with_entry(actor, ApprovalAction::Recall, reason, now);
        Ok(Self {
            state: WorkflowInstanceState::Cancelled(CompletedState { completed_at: now }),
            ..cancelled
        })
    }
}
