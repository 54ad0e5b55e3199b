//! # ログ出力の初期化
//!
//! エンジン本体はログの出力先を知らない。`tracing` のイベントとスパンを発行するだけで、
//! subscriber の組み立ては組み込み先（ブートストラップバイナリ）がこのモジュールで行う。
//!
//! 承認操作のビジネスイベントは [`log_business_event!`](crate::log_business_event) で
//! 発行され、JSON 出力では `event.*` フィールドがトップレベルに展開される。

use std::str::FromStr;

/// ログ出力形式（`LOG_FORMAT` の値）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 1 イベント 1 行の JSON。監査ログの収集基盤に流す場合に使う
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ();

    /// 大文字小文字は区別しない
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err(()),
        }
    }
}

/// subscriber の初期化パラメータ
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// 起動時のスパンに付与するサービス名
    pub service_name: String,
    pub log_format:   LogFormat,
}

impl TracingConfig {
    pub fn new(service_name: impl Into<String>, log_format: LogFormat) -> Self {
        Self {
            service_name: service_name.into(),
            log_format,
        }
    }
}

/// グローバル subscriber を登録する
///
/// フィルタは `RUST_LOG`。未設定なら procureflow の各クレートだけ debug にする。
/// `ErrorLayer` を重ねるので、`InfraError` の `SpanTrace` に承認操作のスパン
/// （`instance_id` / `actor` など）が残る。
///
/// プロセス内で 1 回だけ呼ぶこと。
#[cfg(feature = "observability")]
pub fn init_tracing(config: TracingConfig) {
    use tracing_subscriber::{Layer as _, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,procureflow=debug".into());

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(tracing_error::ErrorLayer::default())
        .init();

    tracing::info!(
        service = %config.service_name,
        log_format = ?config.log_format,
        "ログ出力を初期化しました"
    );
}
