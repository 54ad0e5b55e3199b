//! # Core Service 設定
//!
//! 環境変数から Core Service の設定を読み込む。
//!
//! | 変数名 | 必須 | デフォルト | 説明 |
//! |--------|------|-----------|------|
//! | `DATABASE_URL` | **Yes** | - | PostgreSQL 接続 URL |
//! | `DATABASE_MAX_CONNECTIONS` | No | `10` | 接続プールの最大接続数 |
//! | `ROUTING_STRATEGY` | No | `union` | `union` / `first_match` |
//! | `AUDIT_BACKEND` | No | `postgres` | `postgres` / `log` / `noop` |
//! | `LOG_FORMAT` | No | `pretty` | `json` / `pretty` |

use std::{env, str::FromStr};

use procureflow_domain::workflow::RoutingStrategy;
use procureflow_shared::observability::LogFormat;
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// 設定読み込みエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// 必須の環境変数が未設定
    #[error("{0} が設定されていません")]
    Missing(&'static str),

    /// 値が不正
    #[error("{name} の値が不正です: {value}")]
    Invalid { name: &'static str, value: String },
}

/// 監査イベントの記録先
///
/// `AUDIT_BACKEND` 環境変数で切り替える:
/// - `postgres`: `workflow_audit_events` テーブルに記録
/// - `log`: 構造化ログとして出力
/// - `noop`: 記録しない
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditBackend {
    #[default]
    Postgres,
    Log,
    Noop,
}

impl FromStr for AuditBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(Self::Postgres),
            "log" => Ok(Self::Log),
            "noop" => Ok(Self::Noop),
            _ => Err(()),
        }
    }
}

/// Core Service の設定
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// データベース接続 URL
    pub database_url:             String,
    /// 接続プールの最大接続数
    pub database_max_connections: u32,
    /// 承認レベルのルーティング方式
    pub routing_strategy:         RoutingStrategy,
    /// 監査イベントの記録先
    pub audit_backend:            AuditBackend,
    /// ログ出力形式
    pub log_format:               LogFormat,
}

impl CoreConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 任意の取得関数から設定を読み込む
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let database_max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(value) => value
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid {
                    name: "DATABASE_MAX_CONNECTIONS",
                    value,
                })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let routing_strategy = match lookup("ROUTING_STRATEGY") {
            Some(value) => value
                .parse::<RoutingStrategy>()
                .map_err(|_| ConfigError::Invalid {
                    name: "ROUTING_STRATEGY",
                    value,
                })?,
            None => RoutingStrategy::default(),
        };

        let audit_backend = match lookup("AUDIT_BACKEND") {
            Some(value) => value.parse::<AuditBackend>().map_err(|()| ConfigError::Invalid {
                name: "AUDIT_BACKEND",
                value,
            })?,
            None => AuditBackend::default(),
        };

        let log_format = match lookup("LOG_FORMAT") {
            Some(value) => value.parse::<LogFormat>().map_err(|()| ConfigError::Invalid {
                name: "LOG_FORMAT",
                value,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            database_url,
            database_max_connections,
            routing_strategy,
            audit_backend,
            log_format,
        })
    }
}
