//! # Core Service ブートストラップ
//!
//! 設定を読み込み、データベース接続とマイグレーションを行ったうえで
//! ワークフローエンジンを組み立てる。
//!
//! ## 環境変数
//!
//! [`procureflow_core_service::config`] を参照。
//!
//! ## 起動方法
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo run -p procureflow-core-service
//! ```
//!
//! 組み立てたエンジンは終了シグナルを受け取るまで保持する。
//! エンジンへの入口（HTTP やメッセージキュー）は組み込み先のサービスが用意する。

use std::sync::Arc;

use procureflow_core_service::{
    config::{AuditBackend, CoreConfig},
    usecase::{
        WorkflowDefinitionDeps,
        WorkflowDefinitionUseCase,
        WorkflowEngine,
        WorkflowEngineDeps,
    },
};
use procureflow_domain::{
    clock::{Clock, SystemClock},
    workflow::ApprovalRouter,
};
use procureflow_infra::{
    audit_sink::{AuditSink, LogAuditSink, NoopAuditSink, PostgresAuditSink},
    db::{self, PgTransactionManager, TransactionManager},
    repository::{PostgresWorkflowDefinitionRepository, PostgresWorkflowInstanceRepository},
    role_directory::PostgresRoleDirectory,
};
use procureflow_shared::observability::{TracingConfig, init_tracing};

const SERVICE_NAME: &str = "procureflow-core-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    let config = CoreConfig::from_env()?;
    init_tracing(TracingConfig::new(SERVICE_NAME, config.log_format));

    tracing::info!(
        routing_strategy = config.routing_strategy.as_str(),
        audit_backend = ?config.audit_backend,
        "Core Service を起動します"
    );

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("データベースに接続しました");

    db::run_migrations(&pool).await?;
    tracing::info!("マイグレーションを適用しました");

    let definition_repo = Arc::new(PostgresWorkflowDefinitionRepository::new(pool.clone()));
    let tx_manager: Arc<dyn TransactionManager> =
        Arc::new(PgTransactionManager::new(pool.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let audit_sink: Arc<dyn AuditSink> = match config.audit_backend {
        AuditBackend::Postgres => Arc::new(PostgresAuditSink::new(pool.clone())),
        AuditBackend::Log => Arc::new(LogAuditSink),
        AuditBackend::Noop => Arc::new(NoopAuditSink),
    };

    let engine = WorkflowEngine::new(
        WorkflowEngineDeps {
            definition_repo: definition_repo.clone(),
            instance_repo: Arc::new(PostgresWorkflowInstanceRepository::new(pool.clone())),
            role_directory: Arc::new(PostgresRoleDirectory::new(pool.clone())),
            audit_sink,
            tx_manager: tx_manager.clone(),
            clock: clock.clone(),
        },
        ApprovalRouter::new(config.routing_strategy),
    );
    let definitions = WorkflowDefinitionUseCase::new(WorkflowDefinitionDeps {
        definition_repo,
        tx_manager,
        clock,
    });

    let stats = engine.statistics(None).await?;
    let definition_count = definitions.list(None).await?.len();
    tracing::info!(
        definitions = definition_count,
        pending = stats.pending,
        "ワークフローエンジンの準備が完了しました"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("終了シグナルを受信しました");

    Ok(())
}
