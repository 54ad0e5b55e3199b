//! # ProcureFlow ドメイン層
//!
//! 購買ドキュメント承認ワークフローのビジネスロジックの中核を担うドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! このクレートは DDD（ドメイン駆動設計）の原則に従い、以下を提供する:
//!
//! - **エンティティ**: 一意の識別子を持つオブジェクト（例: WorkflowDefinition, WorkflowInstance）
//! - **値オブジェクト**: 識別子を持たない不変オブジェクト（例: LevelNumber, RoleRef）
//! - **ドメインサービス**: エンティティに属さないビジネスロジック（例: ルール評価、承認ルーター）
//! - **ドメインエラー**: ビジネスルール違反を表現するエラー型
//!
//! ## 依存関係の方向
//!
//! ```text
//! core-service → infra → domain
//! ```
//!
//! ドメイン層はインフラ層（DB、外部サービス）には一切依存しない。
//! ルール評価とルーティングは純粋関数であり、永続化状態に触れずにテストできる。
//!
//! ## モジュール構成
//!
//! - [`error`] - ドメイン層で発生するエラーの定義
//! - [`document`] - 承認対象ドキュメントの種別とコンテキスト
//! - [`principal`] - 操作者とロール参照
//! - [`workflow`] - 定義・ルール・ルーター・インスタンス
//! - [`audit_log`] - 監査イベント
//!
//! ## 使用例
//!
//! ```rust
//! use procureflow_domain::{DomainError, principal::PrincipalId};
//!
//! let actor = PrincipalId::new();
//!
//! let error = DomainError::AlreadyActed {
//!     actor: actor.to_string(),
//!     level: 1,
//! };
//! assert!(error.to_string().contains("レベル 1"));
//! ```

#[macro_use]
mod macros;

pub mod audit_log;
pub mod clock;
pub mod document;
pub mod error;
pub mod principal;
pub mod value_objects;
pub mod workflow;

pub use error::DomainError;
