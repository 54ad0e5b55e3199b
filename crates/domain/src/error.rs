//! # ドメイン層エラー定義
//!
//! ビジネスルール違反やドメイン固有の例外状態を表現するエラー型。
//!
//! ## 設計方針
//!
//! - **型による分類**: エラーの種類を列挙型で明示し、パターンマッチで処理可能に
//! - **thiserror 活用**: `#[error(...)]` マクロでエラーメッセージを自動生成
//! - **ユースケース層でのマッピング**: エンジンのエラー分類（`CoreError`）に 1 対 1 で変換可能
//!
//! ## エラーの種類とエンジンエラーの対応
//!
//! | エラー種別 | エンジンエラー | 用途 |
//! |-----------|----------------|------|
//! | `Validation` | `Validation` / `InvalidAction` | 入力値・定義の検証失敗 |
//! | `UnsupportedOperator` | `Validation` | ルール条件の未知の演算子 |
//! | `AlreadyTerminal` | `WorkflowAlreadyTerminal` | 終端状態からの遷移 |
//! | `AlreadyActed` | `AlreadyActed` | 同一レベルでの二重操作 |
//! | `InvalidLevel` | `InvalidLevel` | 定義に存在しないレベル |
//!
//! ## 使用例
//!
//! ```rust
//! use procureflow_domain::DomainError;
//!
//! fn validate_name(name: &str) -> Result<(), DomainError> {
//!     if name.is_empty() {
//!         return Err(DomainError::Validation("名前は必須です".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// ドメイン層で発生するエラー
///
/// ビジネスロジックの実行中に発生する例外状態を表現する。
/// ユースケース層でこのエラーを受け取り、エンジンのエラー分類に変換する。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    /// バリデーションエラー
    ///
    /// 入力値がビジネスルールに違反している場合に使用する。
    ///
    /// # 例
    ///
    /// - 必須フィールドが未入力
    /// - レベル番号が 1 から連続していない
    /// - 不正な列挙値トークン
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// ルール条件に未知の演算子が指定された
    #[error("未対応の演算子: {0}")]
    UnsupportedOperator(String),

    /// 終端状態のインスタンスに対する操作
    ///
    /// `approved` / `rejected` / `cancelled` からの遷移は存在しない。
    #[error("ワークフローは既に完了しています（現在: {status}）")]
    AlreadyTerminal {
        /// 現在のステータス（ワイヤ表現）
        status: &'static str,
    },

    /// 同一レベルでの二重操作
    #[error("操作者 {actor} はレベル {level} で既に操作済みです")]
    AlreadyActed {
        /// 操作者 ID
        actor: String,
        /// レベル番号
        level: u32,
    },

    /// 定義に構成が存在しないレベル
    #[error("レベル {0} の構成が定義に存在しません")]
    InvalidLevel(u32),
}
