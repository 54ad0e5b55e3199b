//! # リポジトリ実装
//!
//! ワークフロー定義とインスタンスの永続化トレイトと PostgreSQL 実装を提供する。
//!
//! ## 設計方針
//!
//! - **依存性逆転**: ユースケース層はトレイトにのみ依存する
//! - **データベース抽象化**: sqlx を使用し、PostgreSQL 固有の処理をカプセル化
//! - **テスタビリティ**: トレイト経由でモック可能な設計（[`crate::mock`]）

pub mod workflow_definition_repository;
pub mod workflow_instance_repository;

pub use workflow_definition_repository::{
    PostgresWorkflowDefinitionRepository,
    WorkflowDefinitionRepository,
};
pub use workflow_instance_repository::{
    InstanceFilter,
    InstanceSummary,
    PostgresWorkflowInstanceRepository,
    WorkflowInstanceRepository,
};
