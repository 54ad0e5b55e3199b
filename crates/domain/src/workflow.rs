//! # ワークフロー
//!
//! 承認ワークフローの定義、ルーティング、インスタンスを管理する。
//!
//! ## 概念モデル
//!
//! - **WorkflowDefinition**: ドキュメント種別ごとの承認テンプレート（レベル + ルーティングルール）
//! - **RoutingRule**: ドキュメントコンテキストに応じて承認レベルを追加する条件
//! - **ApprovalRouter**: 定義とコンテキストから必須レベル集合を決定する
//! - **WorkflowInstance**: 1 つのドキュメントに対する承認プロセスの実行
//!
//! ## 使用例
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::collections::BTreeSet;
//!
//! use procureflow_domain::{
//!     document::{DocumentContext, DocumentType},
//!     principal::{PrincipalId, RoleRef},
//!     value_objects::{LevelName, LevelNumber, WorkflowName},
//!     workflow::{
//!         ApprovalLevel, ApprovalMode, ApprovalRouter, NewWorkflowDefinition, RoutingRule,
//!         WorkflowDefinition, WorkflowDefinitionId,
//!     },
//! };
//! use serde_json::json;
//!
//! let level = |n: u32, role: &str, mandatory: bool| -> Result<ApprovalLevel, Box<dyn std::error::Error>> {
//!     Ok(ApprovalLevel {
//!         number: LevelNumber::new(n)?,
//!         name: LevelName::new(format!("レベル{n}"))?,
//!         approver_roles: BTreeSet::from([RoleRef::new(role)?]),
//!         approval_mode: ApprovalMode::Any,
//!         mandatory,
//!     })
//! };
//!
//! let definition = WorkflowDefinition::new(NewWorkflowDefinition {
//!     id: WorkflowDefinitionId::new(),
//!     name: WorkflowName::new("発注書承認")?,
//!     document_type: DocumentType::PurchaseOrder,
//!     levels: vec![level(1, "manager", true)?, level(2, "director", false)?],
//!     routing_rules: vec![RoutingRule::from_json(&json!({
//!         "conditionField": "amount", "operator": "gt", "comparisonValue": 10000, "targetLevels": [2]
//!     }))?],
//!     created_by: PrincipalId::new(),
//!     now: chrono::Utc::now(),
//! })?;
//!
//! let context = DocumentContext::from_json(json!({"amount": 50000}))?;
//! let required = ApprovalRouter::default().determine_required_levels(&definition, &context);
//! assert_eq!(required.len(), 2);
//! # Ok(())
//! # }
//! ```

mod definition;
mod definition_validator;
mod instance;
mod router;
mod rule;

pub use definition::*;
pub use definition_validator::*;
pub use instance::*;
pub use router::*;
pub use rule::*;
