use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use log::{debug, info};

use crate::config::DateRange;
use crate::time_entry::TimeEntry;

/// 期間指定がない場合に遡る日数。
const DEFAULT_LOOKBACK_DAYS: i64 = 30;
/// Toggl APIへの問い合わせ時に開始日を前にずらす日数。
const QUERY_BUFFER_BEFORE_DAYS: i64 = 1;
/// Toggl APIへの問い合わせ時に終了日を後ろにずらす日数。
const QUERY_BUFFER_AFTER_DAYS: i64 = 2;

/// Toggl APIに問い合わせる日付の範囲。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Toggl APIに問い合わせる日付の範囲を計算する。
///
/// Toggl APIはUTCで時刻を保持しているため、指定された期間の端のtime entryが欠けないよう
/// 開始日を1日前、終了日を2日後に広げる。
/// 期間が指定されていない場合は、30日前から明日までとする。
///
/// # Arguments
///
/// * `range` - 設定された期間
/// * `today` - Localタイムゾーンでの今日の日付
pub fn query_window(range: Option<&DateRange>, today: NaiveDate) -> QueryWindow {
    let window = match range {
        Some(range) => QueryWindow {
            start_date: range.start - Duration::days(QUERY_BUFFER_BEFORE_DAYS),
            end_date: range.end + Duration::days(QUERY_BUFFER_AFTER_DAYS),
        },
        None => QueryWindow {
            start_date: today - Duration::days(DEFAULT_LOOKBACK_DAYS),
            end_date: today + Duration::days(1),
        },
    };
    debug!("Query window: {} ~ {}", window.start_date, window.end_date);

    window
}

/// 問い合わせ範囲を広げて取得したtime entryを、本来の期間に絞り込む。
///
/// 期間が指定されている場合は、開始時刻が`start`の00:00:00 UTCから`end`の翌日の23:59:59 UTCまでの
/// time entryを残す。終了側の1日は遅れて記録されたtime entryを拾うための余裕で、意図したものである。
///
/// 期間が指定されていない場合は、開始日または終了日が`today`より後のtime entryを除く。
/// time entryの日付はUTCで判断する。
pub fn filter_entries(
    entries: Vec<TimeEntry>,
    range: Option<&DateRange>,
    today: NaiveDate,
) -> Vec<TimeEntry> {
    let before = entries.len();
    let filtered: Vec<TimeEntry> = match range {
        Some(range) => {
            let (lower, upper) = utc_bounds(range);
            entries
                .into_iter()
                .filter(|entry| {
                    keep_or_log(lower <= entry.start && entry.start <= upper, entry)
                })
                .collect()
        }
        None => entries
            .into_iter()
            .filter(|entry| {
                let kept = entry.start.date_naive() <= today && entry.stop.date_naive() <= today;
                keep_or_log(kept, entry)
            })
            .collect(),
    };
    info!(
        "Kept {} of {} time entries after date filtering",
        filtered.len(),
        before
    );

    filtered
}

fn keep_or_log(kept: bool, entry: &TimeEntry) -> bool {
    if !kept {
        debug!(
            "Drop time entry of {} / {} started at {}",
            entry.client_name,
            entry.project_name,
            entry.start.to_rfc3339()
        );
    }
    kept
}

/// 期間指定時に残すtime entryの開始時刻の下限と上限(いずれも含む)を返す。
fn utc_bounds(range: &DateRange) -> (DateTime<Utc>, DateTime<Utc>) {
    let lower = range.start.and_time(NaiveTime::MIN).and_utc();
    // endの翌日の23:59:59
    let upper = (range.end + Duration::days(2)).and_time(NaiveTime::MIN).and_utc()
        - Duration::seconds(1);

    (lower, upper)
}
