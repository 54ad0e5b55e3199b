//! # ユースケース層
//!
//! ワークフローエンジン（インスタンスのライフサイクル）と、
//! ワークフロー定義の管理操作を提供する。

pub(crate) mod helpers;
pub mod workflow;
pub mod workflow_definition;

pub use workflow::{
    ApprovalDecisionInput,
    CancelWorkflowInput,
    InitiateWorkflowInput,
    PendingApprovalFilter,
    WorkflowEngine,
    WorkflowEngineDeps,
};
pub use workflow_definition::{
    DefinitionInput,
    WorkflowDefinitionDeps,
    WorkflowDefinitionUseCase,
};
