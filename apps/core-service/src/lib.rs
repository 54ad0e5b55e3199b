//! # Core Service ライブラリ
//!
//! 承認ワークフローエンジン（[`usecase::WorkflowEngine`]）と
//! ワークフロー定義の管理（[`usecase::WorkflowDefinitionUseCase`]）を公開する。
//!
//! HTTP などの外部インターフェースは持たず、組み込み先のサービスから直接呼び出す。

pub mod config;
pub mod error;
pub mod usecase;

// テストユーティリティ（内部実装、ドキュメントからは隠す）
#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub mod test_utils;
