//! # 承認ルーター
//!
//! 定義とドキュメントコンテキストから、インスタンスが必要とする承認レベル集合を決定する。
//!
//! ## ルーティング戦略
//!
//! | 戦略 | 結果 |
//! |-----|------|
//! | `union`（既定） | 必須レベル ∪ 成立した全ルールの追加レベル |
//! | `first_match` | 定義順で最初に成立したルールの追加レベルのみ。不成立なら必須レベル |
//!
//! どちらの戦略も、成立したルールがなく必須レベルも空の場合は定義の全レベルにフォールバックする。
//! レベルを 1 つも持たない定義では空集合となる。
//!
//! いずれの戦略も純粋関数であり、同じ入力に対して常に同じ集合を返す。
//! 追加レベルが定義に存在するかはここでは検証しない（承認処理時に `InvalidLevel` となる）。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use super::{WorkflowDefinition, evaluate};
use crate::{DomainError, document::DocumentContext, value_objects::LevelNumber};

/// ルーティング戦略
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RoutingStrategy {
    #[default]
    Union,
    FirstMatch,
}

impl RoutingStrategy {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl std::str::FromStr for RoutingStrategy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "union" => Ok(Self::Union),
            "first_match" => Ok(Self::FirstMatch),
            _ => Err(DomainError::Validation(format!(
                "不正なルーティング戦略: {}",
                s
            ))),
        }
    }
}

/// 承認ルーター
#[derive(Debug, Clone, Copy, Default)]
pub struct ApprovalRouter {
    strategy: RoutingStrategy,
}

impl ApprovalRouter {
    pub fn new(strategy: RoutingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> RoutingStrategy {
        self.strategy
    }

    /// 必要な承認レベル集合を決定する
    ///
    /// 空集合が返った場合、呼び出し側はインスタンスを開始してはならない。
    pub fn determine_required_levels(
        &self,
        definition: &WorkflowDefinition,
        context: &DocumentContext,
    ) -> BTreeSet<LevelNumber> {
        match self.strategy {
            RoutingStrategy::Union => {
                let mut levels = definition.mandatory_levels();
                let mut matched = false;
                for rule in definition
                    .routing_rules()
                    .iter()
                    .filter(|rule| evaluate(rule, context))
                {
                    matched = true;
                    levels.extend(rule.target_levels().iter().copied());
                }
                if !matched && levels.is_empty() {
                    return definition.level_numbers();
                }
                levels
            }
            RoutingStrategy::FirstMatch => {
                if let Some(rule) = definition
                    .routing_rules()
                    .iter()
                    .find(|rule| evaluate(rule, context))
                {
                    return rule.target_levels().clone();
                }
                let mandatory = definition.mandatory_levels();
                if mandatory.is_empty() {
                    definition.level_numbers()
                } else {
                    mandatory
                }
            }
        }
    }
}
