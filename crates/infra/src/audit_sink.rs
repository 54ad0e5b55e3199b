//! # 監査イベント送信
//!
//! ワークフローの状態遷移を監査イベントとして外部に記録する。
//!
//! ## 設計方針
//!
//! - **trait による抽象化**: `AuditSink` trait で記録先を抽象化
//! - **3 つの実装**: PostgreSQL（本番用）、Log（構造化ログのみ）、Noop（テスト用）
//! - **環境変数切替**: `AUDIT_BACKEND` でランタイム選択
//! - **ベストエフォート**: 記録の失敗はワークフローの状態遷移を巻き戻さない。
//!   エラーの扱いは呼び出し側（ユースケース層）が決める

mod log;
mod noop;
mod postgres;

use async_trait::async_trait;
pub use log::LogAuditSink;
pub use noop::NoopAuditSink;
pub use postgres::PostgresAuditSink;
use procureflow_domain::audit_log::AuditEvent;

use crate::error::InfraError;

/// 監査イベント送信トレイト
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// 監査イベントを記録する
    async fn record(&self, event: &AuditEvent) -> Result<(), InfraError>;
}
