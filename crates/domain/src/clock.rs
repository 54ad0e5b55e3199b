//! # 時刻の注入
//!
//! 承認履歴の `timestamp`、インスタンスの `submitted_at` / `completed_at`、
//! 定義の `updated_at` はエンジンが [`Clock`] から取得した時刻で記録する。
//! 集計（平均承認時間）のテストは [`FixedClock`] で時刻を固定して行う。

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 本番用
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 常に同じ時刻を返す
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
