//! # ワークフロー定義
//!
//! ドキュメント種別ごとの承認テンプレートを管理する。
//! 順序付きの承認レベルと、ドキュメントコンテキストに応じて追加レベルを選ぶ
//! ルーティングルールを保持する。
//!
//! ## ライフサイクル
//!
//! ```text
//! draft ──activate──▶ active ──retire──▶ retired
//!   │                                       ▲
//!   └───────────────remove（論理削除）──────┘
//! ```
//!
//! - エンジンが開始時に選択するのは `active` かつ未削除の定義のみ
//! - 実行中のインスタンスは開始時の必須レベルを保持するため、定義の変更・引退の影響を受けない
//! - 既定フラグは `active` な定義にのみ設定できる（種別ごとの一意性はリポジトリが保証）

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use super::{RoutingRule, validate_definition};
use crate::{
    DomainError,
    document::DocumentType,
    principal::{PrincipalId, RoleRef},
    value_objects::{LevelName, LevelNumber, Version, WorkflowName},
};

define_uuid_id! {
    /// ワークフロー定義 ID
    pub struct WorkflowDefinitionId;
}

/// 承認モード
///
/// レベル内で何人の承認が必要かを表す。ワイヤ表現は `ANY` / `ALL`。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, IntoStaticStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ApprovalMode {
    /// 承認者のうち 1 人の承認でレベル完了
    #[default]
    Any,
    /// 承認者全員の承認でレベル完了
    All,
}

impl ApprovalMode {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl std::str::FromStr for ApprovalMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ANY" => Ok(Self::Any),
            "ALL" => Ok(Self::All),
            _ => Err(DomainError::Validation(format!("不正な承認モード: {}", s))),
        }
    }
}

/// 承認レベル（値オブジェクト）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalLevel {
    #[serde(rename = "level")]
    pub number:         LevelNumber,
    pub name:           LevelName,
    pub approver_roles: BTreeSet<RoleRef>,
    #[serde(default)]
    pub approval_mode:  ApprovalMode,
    /// 必須レベル（ルールの成否にかかわらず常に要求される）
    #[serde(default)]
    pub mandatory:      bool,
}

/// 定義のライフサイクル状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DefinitionStatus {
    /// 下書き（編集中、エンジンからは選択されない）
    Draft,
    /// 有効（新規インスタンスの開始に使用される）
    Active,
    /// 引退（新規開始には使われないが、既存インスタンスからは参照される）
    Retired,
}

impl DefinitionStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl std::str::FromStr for DefinitionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "retired" => Ok(Self::Retired),
            _ => Err(DomainError::Validation(format!(
                "不正なワークフロー定義ステータス: {}",
                s
            ))),
        }
    }
}

/// ワークフロー定義エンティティ
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    id:            WorkflowDefinitionId,
    name:          WorkflowName,
    document_type: DocumentType,
    levels:        Vec<ApprovalLevel>,
    routing_rules: Vec<RoutingRule>,
    status:        DefinitionStatus,
    is_default:    bool,
    removed:       bool,
    version:       Version,
    created_by:    PrincipalId,
    created_at:    DateTime<Utc>,
    updated_at:    DateTime<Utc>,
}

/// ワークフロー定義の新規作成パラメータ
pub struct NewWorkflowDefinition {
    pub id:            WorkflowDefinitionId,
    pub name:          WorkflowName,
    pub document_type: DocumentType,
    pub levels:        Vec<ApprovalLevel>,
    pub routing_rules: Vec<RoutingRule>,
    pub created_by:    PrincipalId,
    pub now:           DateTime<Utc>,
}

/// ワークフロー定義の改訂パラメータ
pub struct DefinitionRevision {
    pub name:          WorkflowName,
    pub levels:        Vec<ApprovalLevel>,
    pub routing_rules: Vec<RoutingRule>,
}

/// ワークフロー定義の DB 復元パラメータ
pub struct WorkflowDefinitionRecord {
    pub id:            WorkflowDefinitionId,
    pub name:          WorkflowName,
    pub document_type: DocumentType,
    pub levels:        Vec<ApprovalLevel>,
    pub routing_rules: Vec<RoutingRule>,
    pub status:        DefinitionStatus,
    pub is_default:    bool,
    pub removed:       bool,
    pub version:       Version,
    pub created_by:    PrincipalId,
    pub created_at:    DateTime<Utc>,
    pub updated_at:    DateTime<Utc>,
}

impl WorkflowDefinition {
    /// 新しいワークフロー定義を下書きとして作成する
    ///
    /// # エラー
    ///
    /// レベル・ルールの構造検証に失敗した場合は `DomainError::Validation`。
    pub fn new(params: NewWorkflowDefinition) -> Result<Self, DomainError> {
        validate_definition(&params.levels, &params.routing_rules).into_result()?;
        Ok(Self {
            id:            params.id,
            name:          params.name,
            document_type: params.document_type,
            levels:        params.levels,
            routing_rules: params.routing_rules,
            status:        DefinitionStatus::Draft,
            is_default:    false,
            removed:       false,
            version:       Version::initial(),
            created_by:    params.created_by,
            created_at:    params.now,
            updated_at:    params.now,
        })
    }

    /// 既存のデータから復元する
    pub fn from_db(record: WorkflowDefinitionRecord) -> Self {
        Self {
            id:            record.id,
            name:          record.name,
            document_type: record.document_type,
            levels:        record.levels,
            routing_rules: record.routing_rules,
            status:        record.status,
            is_default:    record.is_default,
            removed:       record.removed,
            version:       record.version,
            created_by:    record.created_by,
            created_at:    record.created_at,
            updated_at:    record.updated_at,
        }
    }

    // Getter メソッド

    pub fn id(&self) -> &WorkflowDefinitionId {
        &self.id
    }

    pub fn name(&self) -> &WorkflowName {
        &self.name
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    pub fn levels(&self) -> &[ApprovalLevel] {
        &self.levels
    }

    pub fn routing_rules(&self) -> &[RoutingRule] {
        &self.routing_rules
    }

    pub fn status(&self) -> DefinitionStatus {
        self.status
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn created_by(&self) -> &PrincipalId {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // ビジネスロジックメソッド

    /// 新規インスタンスの開始に使用できるか
    pub fn is_active(&self) -> bool {
        self.status == DefinitionStatus::Active && !self.removed
    }

    /// 指定番号のレベル構成を取得する
    pub fn level(&self, number: LevelNumber) -> Option<&ApprovalLevel> {
        self.levels.iter().find(|l| l.number == number)
    }

    /// 承認処理で参照するレベル構成を取得する
    ///
    /// 改訂でレベルが削除されていれば `InvalidLevel`。
    pub fn level_config(&self, number: LevelNumber) -> Result<&ApprovalLevel, DomainError> {
        self.level(number)
            .ok_or(DomainError::InvalidLevel(number.as_u32()))
    }

    /// 定義されている全レベル番号
    pub fn level_numbers(&self) -> BTreeSet<LevelNumber> {
        self.levels.iter().map(|l| l.number).collect()
    }

    /// 必須レベル番号
    pub fn mandatory_levels(&self) -> BTreeSet<LevelNumber> {
        self.levels
            .iter()
            .filter(|l| l.mandatory)
            .map(|l| l.number)
            .collect()
    }

    fn ensure_not_removed(&self) -> Result<(), DomainError> {
        if self.removed {
            return Err(DomainError::Validation(format!(
                "削除済みのワークフロー定義は変更できません: {}",
                self.id
            )));
        }
        Ok(())
    }

    fn touched(self, now: DateTime<Utc>) -> Self {
        Self {
            version: self.version.next(),
            updated_at: now,
            ..self
        }
    }

    /// 名前・レベル・ルールを改訂した新しいインスタンスを返す
    ///
    /// 実行中のインスタンスは開始時の必須レベルを保持しているため影響を受けない。
    pub fn revised(self, revision: DefinitionRevision, now: DateTime<Utc>) -> Result<Self, DomainError> {
        self.ensure_not_removed()?;
        validate_definition(&revision.levels, &revision.routing_rules).into_result()?;
        Ok(Self {
            name: revision.name,
            levels: revision.levels,
            routing_rules: revision.routing_rules,
            ..self
        }
        .touched(now))
    }

    /// 定義を有効化した新しいインスタンスを返す
    pub fn activated(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        self.ensure_not_removed()?;
        if self.status == DefinitionStatus::Active {
            return Err(DomainError::Validation("既に有効化されています".to_string()));
        }
        Ok(Self {
            status: DefinitionStatus::Active,
            ..self
        }
        .touched(now))
    }

    /// 定義を引退させた新しいインスタンスを返す
    ///
    /// 引退した定義は既定ではなくなる。
    pub fn retired(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        self.ensure_not_removed()?;
        if self.status == DefinitionStatus::Retired {
            return Err(DomainError::Validation("既に引退しています".to_string()));
        }
        Ok(Self {
            status: DefinitionStatus::Retired,
            is_default: false,
            ..self
        }
        .touched(now))
    }

    /// 既定の定義に設定した新しいインスタンスを返す
    pub fn marked_default(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if !self.is_active() {
            return Err(DomainError::Validation(
                "既定に設定できるのは有効な定義のみです".to_string(),
            ));
        }
        Ok(Self {
            is_default: true,
            ..self
        }
        .touched(now))
    }

    /// 既定を解除した新しいインスタンスを返す
    pub fn unmarked_default(self, now: DateTime<Utc>) -> Self {
        Self {
            is_default: false,
            ..self
        }
        .touched(now)
    }

    /// 論理削除した新しいインスタンスを返す
    ///
    /// 削除済みの定義は引退扱いとなり、既存インスタンスからの参照のみ可能。
    pub fn removed(self, now: DateTime<Utc>) -> Self {
        Self {
            status: DefinitionStatus::Retired,
            is_default: false,
            removed: true,
            ..self
        }
        .touched(now)
    }
}
