//! # テスト用モック
//!
//! ユースケーステストで使用するインメモリ実装。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! procureflow-infra = { workspace = true, features = ["test-utils"] }
//! ```
//!
//! 一意制約と楽観的ロックは PostgreSQL 実装と同じ条件で `Conflict` を返す。
//! 書き込みは即時反映され、ロールバックは再現しない。

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use procureflow_domain::{
    audit_log::AuditEvent,
    document::{DocumentId, DocumentType},
    principal::{PrincipalId, RoleRef},
    value_objects::Version,
    workflow::{
        WorkflowDefinition,
        WorkflowDefinitionId,
        WorkflowInstance,
        WorkflowInstanceId,
        WorkflowInstanceStatus,
    },
};
use procureflow_shared::Page;

use crate::{
    audit_sink::AuditSink,
    db::{TransactionManager, TxContext},
    error::InfraError,
    repository::{
        InstanceFilter,
        InstanceSummary,
        WorkflowDefinitionRepository,
        WorkflowInstanceRepository,
    },
    role_directory::RoleDirectory,
};

// ===== MockTransactionManager =====

#[derive(Clone, Default)]
pub struct MockTransactionManager;

#[async_trait]
impl TransactionManager for MockTransactionManager {
    async fn begin(&self) -> Result<TxContext, InfraError> {
        Ok(TxContext::mock())
    }
}

// ===== MockWorkflowDefinitionRepository =====

#[derive(Clone, Default)]
pub struct MockWorkflowDefinitionRepository {
    definitions: Arc<Mutex<Vec<WorkflowDefinition>>>,
}

impl MockWorkflowDefinitionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_definition(&self, definition: WorkflowDefinition) {
        self.definitions.lock().unwrap().push(definition);
    }

    /// 保存されている定義をすべて返す（論理削除済みを含む）
    pub fn all(&self) -> Vec<WorkflowDefinition> {
        self.definitions.lock().unwrap().clone()
    }
}

/// 部分一意インデックス `workflow_definitions_default_per_type` と同じ判定
fn violates_default_uniqueness(
    definitions: &[WorkflowDefinition],
    candidate: &WorkflowDefinition,
) -> bool {
    candidate.is_default()
        && candidate.is_active()
        && definitions.iter().any(|d| {
            d.id() != candidate.id()
                && d.document_type() == candidate.document_type()
                && d.is_default()
                && d.is_active()
        })
}

#[async_trait]
impl WorkflowDefinitionRepository for MockWorkflowDefinitionRepository {
    async fn insert(
        &self,
        _tx: &mut TxContext,
        definition: &WorkflowDefinition,
    ) -> Result<(), InfraError> {
        let mut definitions = self.definitions.lock().unwrap();
        if definitions.iter().any(|d| d.id() == definition.id())
            || violates_default_uniqueness(&definitions, definition)
        {
            return Err(InfraError::conflict(
                "WorkflowDefinition",
                definition.id().to_string(),
            ));
        }
        definitions.push(definition.clone());
        Ok(())
    }

    async fn update_with_version_check(
        &self,
        _tx: &mut TxContext,
        definition: &WorkflowDefinition,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let mut definitions = self.definitions.lock().unwrap();
        let conflict = || InfraError::conflict("WorkflowDefinition", definition.id().to_string());
        let pos = definitions
            .iter()
            .position(|d| d.id() == definition.id() && d.version() == expected_version)
            .ok_or_else(conflict)?;
        if violates_default_uniqueness(&definitions, definition) {
            return Err(conflict());
        }
        definitions[pos] = definition.clone();
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &WorkflowDefinitionId,
    ) -> Result<Option<WorkflowDefinition>, InfraError> {
        Ok(self
            .definitions
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id() == id)
            .cloned())
    }

    async fn find_active_by_document_type(
        &self,
        document_type: DocumentType,
    ) -> Result<Vec<WorkflowDefinition>, InfraError> {
        let mut active: Vec<WorkflowDefinition> = self
            .definitions
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.document_type() == document_type && d.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            b.is_default()
                .cmp(&a.is_default())
                .then_with(|| b.updated_at().cmp(&a.updated_at()))
        });
        Ok(active)
    }

    async fn find_all(
        &self,
        document_type: Option<DocumentType>,
    ) -> Result<Vec<WorkflowDefinition>, InfraError> {
        Ok(self
            .definitions
            .lock()
            .unwrap()
            .iter()
            .filter(|d| !d.is_removed())
            .filter(|d| document_type.is_none_or(|t| d.document_type() == t))
            .cloned()
            .collect())
    }
}

// ===== MockWorkflowInstanceRepository =====

#[derive(Clone, Default)]
pub struct MockWorkflowInstanceRepository {
    instances: Arc<Mutex<Vec<WorkflowInstance>>>,
}

impl MockWorkflowInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_instance(&self, instance: WorkflowInstance) {
        self.instances.lock().unwrap().push(instance);
    }

    /// 保存されているインスタンスをすべて返す
    pub fn all(&self) -> Vec<WorkflowInstance> {
        self.instances.lock().unwrap().clone()
    }

    fn select(&self, predicate: impl Fn(&WorkflowInstance) -> bool) -> Vec<WorkflowInstance> {
        self.instances
            .lock()
            .unwrap()
            .iter()
            .filter(|i| predicate(i))
            .cloned()
            .collect()
    }
}

fn is_active_for(
    instance: &WorkflowInstance,
    document_type: DocumentType,
    document_id: &DocumentId,
) -> bool {
    instance.status() == WorkflowInstanceStatus::Pending
        && instance.document_type() == document_type
        && instance.document_id() == document_id
}

#[async_trait]
impl WorkflowInstanceRepository for MockWorkflowInstanceRepository {
    async fn insert(
        &self,
        _tx: &mut TxContext,
        instance: &WorkflowInstance,
    ) -> Result<(), InfraError> {
        let mut instances = self.instances.lock().unwrap();
        let duplicate = instances.iter().any(|i| {
            i.id() == instance.id()
                || (instance.status() == WorkflowInstanceStatus::Pending
                    && is_active_for(i, instance.document_type(), instance.document_id()))
        });
        if duplicate {
            return Err(InfraError::conflict(
                "WorkflowInstance",
                instance.document_id().to_string(),
            ));
        }
        instances.push(instance.clone());
        Ok(())
    }

    async fn update_with_version_check(
        &self,
        _tx: &mut TxContext,
        instance: &WorkflowInstance,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let mut instances = self.instances.lock().unwrap();
        let pos = instances
            .iter()
            .position(|i| i.id() == instance.id() && i.version() == expected_version)
            .ok_or_else(|| InfraError::conflict("WorkflowInstance", instance.id().to_string()))?;
        instances[pos] = instance.clone();
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<Option<WorkflowInstance>, InfraError> {
        Ok(self.select(|i| i.id() == id).into_iter().next())
    }

    async fn find_active_by_document(
        &self,
        document_type: DocumentType,
        document_id: &DocumentId,
    ) -> Result<Option<WorkflowInstance>, InfraError> {
        Ok(self
            .select(|i| is_active_for(i, document_type, document_id))
            .into_iter()
            .next())
    }

    async fn find_by_document(
        &self,
        document_type: DocumentType,
        document_id: &DocumentId,
    ) -> Result<Vec<WorkflowInstance>, InfraError> {
        let mut found = self.select(|i| {
            i.document_type() == document_type && i.document_id() == document_id
        });
        found.sort_by_key(|i| std::cmp::Reverse(i.submitted_at()));
        Ok(found)
    }

    async fn find_by_filter(
        &self,
        filter: &InstanceFilter,
        page: Page,
    ) -> Result<Vec<WorkflowInstance>, InfraError> {
        let mut found = self.select(|i| filter.matches(i));
        found.sort_by_key(|i| std::cmp::Reverse(i.submitted_at()));
        Ok(page.apply(found))
    }

    async fn find_pending(
        &self,
        document_type: Option<DocumentType>,
    ) -> Result<Vec<WorkflowInstance>, InfraError> {
        let mut found = self.select(|i| {
            i.status() == WorkflowInstanceStatus::Pending
                && document_type.is_none_or(|t| i.document_type() == t)
        });
        found.sort_by_key(|i| i.submitted_at());
        Ok(found)
    }

    async fn summarize(
        &self,
        document_type: Option<DocumentType>,
    ) -> Result<InstanceSummary, InfraError> {
        let found = self.select(|i| document_type.is_none_or(|t| i.document_type() == t));
        let mut summary = InstanceSummary {
            total: found.len() as u64,
            ..Default::default()
        };
        let mut approval_seconds = Vec::new();
        for instance in &found {
            match instance.status() {
                WorkflowInstanceStatus::Pending => summary.pending += 1,
                WorkflowInstanceStatus::Approved => {
                    summary.approved += 1;
                    if let Some(completed_at) = instance.completed_at() {
                        let elapsed = completed_at - instance.submitted_at();
                        approval_seconds.push(elapsed.num_milliseconds() as f64 / 1000.0);
                    }
                }
                WorkflowInstanceStatus::Rejected => summary.rejected += 1,
                WorkflowInstanceStatus::Cancelled => summary.cancelled += 1,
            }
        }
        if !approval_seconds.is_empty() {
            summary.average_approval_seconds =
                Some(approval_seconds.iter().sum::<f64>() / approval_seconds.len() as f64);
        }
        Ok(summary)
    }
}

// ===== MockRoleDirectory =====

/// ロールごとの主体割り当てを保持するインメモリ RoleDirectory
#[derive(Clone, Default)]
pub struct MockRoleDirectory {
    members:  Arc<Mutex<HashMap<RoleRef, HashSet<PrincipalId>>>>,
    inactive: Arc<Mutex<HashSet<PrincipalId>>>,
}

impl MockRoleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 主体をロールに割り当てる
    pub fn assign(&self, role: &str, principal: &PrincipalId) {
        let role = RoleRef::new(role).unwrap();
        self.members
            .lock()
            .unwrap()
            .entry(role)
            .or_default()
            .insert(principal.clone());
    }

    /// 主体を無効化する（以降の解決結果から除外される）
    pub fn deactivate(&self, principal: &PrincipalId) {
        self.inactive.lock().unwrap().insert(principal.clone());
    }
}

#[async_trait]
impl RoleDirectory for MockRoleDirectory {
    async fn resolve_approvers(
        &self,
        roles: &BTreeSet<RoleRef>,
    ) -> Result<HashSet<PrincipalId>, InfraError> {
        let members = self.members.lock().unwrap();
        let inactive = self.inactive.lock().unwrap();
        Ok(roles
            .iter()
            .filter_map(|r| members.get(r))
            .flatten()
            .filter(|p| !inactive.contains(*p))
            .cloned()
            .collect())
    }

    async fn is_member(
        &self,
        principal: &PrincipalId,
        roles: &BTreeSet<RoleRef>,
    ) -> Result<bool, InfraError> {
        Ok(self.resolve_approvers(roles).await?.contains(principal))
    }
}

// ===== RecordingAuditSink / FailingAuditSink =====

/// 記録した監査イベントを保持する AuditSink
#[derive(Clone, Default)]
pub struct RecordingAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), InfraError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// 常に失敗する AuditSink
#[derive(Clone, Default)]
pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record(&self, _event: &AuditEvent) -> Result<(), InfraError> {
        Err(InfraError::unexpected("監査ログ基盤に接続できません"))
    }
}
