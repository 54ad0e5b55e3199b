//! # ビジネスイベントログとエラーコンテキストの構造化ヘルパー
//!
//! ログフィールドの命名規約とヘルパーマクロを提供する。
//!
//! ## ビジネスイベント
//!
//! [`log_business_event!`] マクロで出力する。`event.kind = "business_event"` マーカーが
//! 自動付与され、`jq 'select(.["event.kind"] == "business_event")'` でフィルタできる。
//!
//! ## エラーコンテキスト
//!
//! 既存の `tracing::warn!` / `tracing::error!` に `error.category` + `error.kind`
//! フィールドを直接追加する。定数は [`error`] モジュールで提供。
//!
//! ## フィールド命名規約
//!
//! ドット記法（`event.category`、`error.kind`）を使用。tracing の
//! `$($field:ident).+` パターンでサポートされ、JSON 出力でフラットなキーになる。

/// ビジネスイベントを構造化ログとして出力する。
///
/// `event.kind = "business_event"` マーカーを自動付与し、
/// `tracing::info!` レベルで出力する。
///
/// ## 必須フィールド（慣例）
///
/// - `event.category`: イベントカテゴリ（[`event::category`] の定数を使用）
/// - `event.action`: アクション名（[`event::action`] の定数を使用）
/// - `event.result`: 結果（[`event::result`] の定数を使用）
///
/// ## 推奨フィールド
///
/// - `event.entity_type`: エンティティ種別（[`event::entity_type`] の定数を使用）
/// - `event.entity_id`: エンティティ ID
/// - `event.actor_id`: 操作者 ID
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

/// イベントフィールドの定数
pub mod event {
    /// イベントカテゴリ
    pub mod category {
        pub const WORKFLOW: &str = "workflow";
        pub const DEFINITION: &str = "definition";
    }

    /// イベントアクション
    pub mod action {
        // ワークフローインスタンス
        pub const WORKFLOW_INITIATED: &str = "workflow.initiated";
        pub const LEVEL_APPROVED: &str = "workflow.level_approved";
        pub const WORKFLOW_APPROVED: &str = "workflow.approved";
        pub const WORKFLOW_REJECTED: &str = "workflow.rejected";
        pub const WORKFLOW_CANCELLED: &str = "workflow.cancelled";

        // ワークフロー定義
        pub const DEFINITION_CREATED: &str = "definition.created";
        pub const DEFINITION_UPDATED: &str = "definition.updated";
        pub const DEFINITION_ACTIVATED: &str = "definition.activated";
        pub const DEFINITION_RETIRED: &str = "definition.retired";
        pub const DEFINITION_DEFAULT_CHANGED: &str = "definition.default_changed";
        pub const DEFINITION_REMOVED: &str = "definition.removed";
    }

    /// エンティティ種別
    pub mod entity_type {
        pub const WORKFLOW_INSTANCE: &str = "workflow_instance";
        pub const WORKFLOW_DEFINITION: &str = "workflow_definition";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
    }
}

/// エラーコンテキストフィールドの定数
pub mod error {
    /// エラーカテゴリ
    pub mod category {
        /// インフラストラクチャ（DB）
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// 監査ログ送信（ベストエフォート）
        pub const AUDIT: &str = "audit";
    }

    /// エラー種別
    pub mod kind {
        pub const DATABASE: &str = "database";
        pub const AUDIT_SINK: &str = "audit_sink";
        pub const ROLE_DIRECTORY: &str = "role_directory";
        pub const INTERNAL: &str = "internal";
    }
}
