//! # ProcureFlow インフラ層
//!
//! 外部システムとの接続・通信を担当するインフラストラクチャ層。
//!
//! ## 設計方針
//!
//! ユースケース層が依存するトレイト（リポジトリ、ロールディレクトリ、監査イベント送信）と、
//! その PostgreSQL 実装を提供する。外部システムの詳細をカプセル化し、
//! ドメイン層をインフラの変更から保護する。
//!
//! ## 依存関係
//!
//! ```text
//! core-service → infra → domain
//!                  ↘
//!                   shared
//! ```
//!
//! ## モジュール構成
//!
//! - [`db`] - PostgreSQL 接続プール、マイグレーション、トランザクション管理
//! - [`error`] - インフラ層エラー定義
//! - [`repository`] - ワークフロー定義・インスタンスのリポジトリ
//! - [`role_directory`] - ロールから承認主体への解決
//! - [`audit_sink`] - 監査イベントの記録先
//! - `mock` - テスト用インメモリ実装（`test-utils` feature）
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use procureflow_infra::{db, repository::PostgresWorkflowInstanceRepository};
//!
//! async fn setup() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = db::create_pool("postgres://localhost/procureflow", 10).await?;
//!     db::run_migrations(&pool).await?;
//!     let instances = PostgresWorkflowInstanceRepository::new(pool);
//!     Ok(())
//! }
//! ```

pub mod audit_sink;
pub mod db;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod repository;
pub mod role_directory;

pub use error::{InfraError, InfraErrorKind};
