//! # テストユーティリティ
//!
//! 統合テストで共通のセットアップを提供する。

mod workflow_test_builder;

pub use workflow_test_builder::{WorkflowTestBuilder, WorkflowTestSetup};
