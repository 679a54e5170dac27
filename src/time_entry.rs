use anyhow::{ensure, Result};
use chrono::{DateTime, Utc};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// 1件の作業記録。
#[derive(Clone, Debug, PartialEq)]
pub struct TimeEntry {
    pub client_name: String,
    pub duration: u64,
    pub project_name: String,
    pub project_id: i64,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
}

impl TimeEntry {
    /// 新しい`TimeEntry`を返す。
    ///
    /// `stop`が`start`より前の場合はエラーを返す。
    pub fn new(
        client_name: String,
        duration: u64,
        project_name: String,
        project_id: i64,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Result<Self> {
        ensure!(
            stop >= start,
            "Time entry stops before it starts: start={}, stop={}",
            start.to_rfc3339(),
            stop.to_rfc3339()
        );

        Ok(Self {
            client_name,
            duration,
            project_name,
            project_id,
            start,
            stop,
        })
    }
}

/// 作業時間を時間単位に換算し、小数点以下2桁に丸める。
pub fn entry_hours(entry: &TimeEntry) -> f64 {
    round2(entry.duration as f64 / SECONDS_PER_HOUR)
}

/// 小数点以下2桁に丸める。0.5は0から遠い方に丸める。
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
