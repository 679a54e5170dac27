use chrono::{DateTime, Local, TimeZone, Utc};

/// 出力ファイル名に埋め込む日時の書式。
const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[cfg(not(test))]
/// 現在のUTC時間を取得する。
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// テスト時に利用するモック時間を取得する。
#[cfg(test)]
pub mod mock_datetime {
    use std::cell::RefCell;

    use super::DateTime;
    use super::Utc;

    thread_local! {
        static MOCK_TIME: RefCell<Option<DateTime<Utc>>> = RefCell::new(None);
    }

    /// モック時間を取得する。
    pub fn now() -> DateTime<Utc> {
        MOCK_TIME.with(|cell| cell.borrow().as_ref().cloned().unwrap_or_else(Utc::now))
    }

    /// モック時間を設定する。
    pub fn set_mock_time(time: DateTime<Utc>) {
        MOCK_TIME.with(|cell| *cell.borrow_mut() = Some(time));
    }

    // 設定したモック時間をクリアする。
    pub fn clear_mock_time() {
        MOCK_TIME.with(|cell| *cell.borrow_mut() = None);
    }
}

#[cfg(test)]
pub use mock_datetime::now;

/// 現在のLocalタイムゾーンでの日時を取得する。
pub fn local_now() -> DateTime<Local> {
    now().with_timezone(&Local)
}

/// 出力ファイル名に埋め込むための`YYYYMMDD_HHMMSS`形式の文字列を返す。
///
/// 実行ごとに異なるファイル名にするため、秒まで含める。
pub fn file_stamp<Tz: TimeZone>(datetime: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    datetime.format(FILE_STAMP_FORMAT).to_string()
}
