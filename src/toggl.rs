use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{info, warn};
#[cfg(test)]
use mockall::automock;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::{Config, DateRange};
use crate::date_range::QueryWindow;
use crate::time_entry::TimeEntry;

/// 期間指定がない場合にレポートで遡る日数。
const DEFAULT_REPORT_LOOKBACK_DAYS: i64 = 30;

/// Toggl APIのレスポンスをデシリアライズするための構造体。
///
/// `meta=true`を指定すると`client_name`と`project_name`が含まれる。
#[derive(Debug, Deserialize)]
struct TogglTimeEntry {
    client_name: Option<String>,
    duration: i64,
    project_name: Option<String>,
    project_id: Option<i64>,
    start: DateTime<Utc>,
    stop: Option<DateTime<Utc>>,
}

impl TryFrom<TogglTimeEntry> for TimeEntry {
    type Error = anyhow::Error;

    fn try_from(entry: TogglTimeEntry) -> Result<Self> {
        let project_id = entry.project_id.context("Time entry has no project")?;
        let stop = entry.stop.context("Time entry is still running")?;
        let duration = u64::try_from(entry.duration)
            .with_context(|| format!("Time entry has a negative duration: {}", entry.duration))?;

        TimeEntry::new(
            entry.client_name.unwrap_or_default(),
            duration,
            entry.project_name.unwrap_or_default(),
            project_id,
            entry.start,
            stop,
        )
    }
}

/// PDFレポートの取得条件。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportRequest {
    pub start_date: String,
    pub end_date: String,
    pub project_ids: Vec<i64>,
}

impl ReportRequest {
    /// 新しい`ReportRequest`を返す。
    ///
    /// 期間が指定されていない場合は30日前から今日までとする。
    pub fn new(range: Option<&DateRange>, project_ids: Vec<i64>, today: NaiveDate) -> Self {
        let (start, end) = match range {
            Some(range) => (range.start, range.end),
            None => (today - Duration::days(DEFAULT_REPORT_LOOKBACK_DAYS), today),
        };

        Self {
            start_date: start.format("%Y-%m-%d").to_string(),
            end_date: end.format("%Y-%m-%d").to_string(),
            project_ids,
        }
    }
}

/// Toggl APIにアクセスするためのtrait。
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TogglRepository {
    /// 指定された範囲のタイムエントリーを取得する。
    ///
    /// プロジェクトがない、計測中、終了時刻が開始時刻より前のタイムエントリーは除く。
    async fn read_time_entries(&self, window: &QueryWindow) -> Result<Vec<TimeEntry>>;

    /// Toggl側で作成されたPDFレポートを取得する。
    ///
    /// HTTPステータスが200以外の場合は、ステータスとレスポンスの本文を含むエラーを返す。
    async fn download_report(&self, workspace_id: i64, request: &ReportRequest)
        -> Result<Vec<u8>>;
}

/// Toggl APIと通信するためのクライアント。
///
/// # Examples
///
/// ```
/// let client = TogglClient::new(&config);
/// let time_entries = client.read_time_entries(&window).await.unwrap();
/// ```
pub struct TogglClient {
    client: Client,
    api_url: String,
    api_token: String,
}

impl TogglClient {
    /// 新しい`TogglClient`を返す。
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_base_url.clone(),
            api_token: config.api_token.clone(),
        }
    }
}

#[async_trait]
impl TogglRepository for TogglClient {
    async fn read_time_entries(&self, window: &QueryWindow) -> Result<Vec<TimeEntry>> {
        let toggl_time_entries = self
            .client
            .get(format!("{}/api/v9/me/time_entries", self.api_url))
            .basic_auth(&self.api_token, Some("api_token"))
            .header(CONTENT_TYPE, "application/json")
            .query(&[
                ("start_date", window.start_date.format("%Y-%m-%d").to_string()),
                ("end_date", window.end_date.format("%Y-%m-%d").to_string()),
                ("meta", "true".to_string()),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to send request to Toggl API at {}", self.api_url))?
            .error_for_status()
            .context("Request returned an error status")?
            .json::<Vec<TogglTimeEntry>>()
            .await
            .context("Failed to deserialize response")?;
        info!("length of time entries: {}", toggl_time_entries.len());

        let time_entries = toggl_time_entries
            .into_iter()
            .filter_map(|entry| {
                let start = entry.start;
                TimeEntry::try_from(entry)
                    .map_err(|err| warn!("Skip time entry started at {}: {:#}", start, err))
                    .ok()
            })
            .collect();

        Ok(time_entries)
    }

    async fn download_report(
        &self,
        workspace_id: i64,
        request: &ReportRequest,
    ) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(format!(
                "{}/reports/api/v3/workspace/{}/search/time_entries.pdf",
                self.api_url, workspace_id
            ))
            .basic_auth(&self.api_token, Some("api_token"))
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to Toggl API at {}", self.api_url))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response
                .text()
                .await
                .unwrap_or_else(|err| format!("<failed to read body: {}>", err));
            bail!("Failed to download report: {} {}", status.as_u16(), body);
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read report body")?;
        info!("Downloaded report: {} bytes", bytes.len());

        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use base64::Engine;
    use chrono::NaiveDate;
    use mockito::Matcher;
    use serde_json::json;

    use super::{ReportRequest, TogglClient, TogglRepository};
    use crate::config::{Config, DateRange};
    use crate::date_range::QueryWindow;

    fn config(api_base_url: String) -> Config {
        Config {
            api_token: "secret-token".to_string(),
            workspace_id: 42,
            api_base_url,
            projects: vec![],
            billed_to: None,
            pay_to: None,
            payment_terms: "Net 14".to_string(),
            invoice_id: "1".to_string(),
            date_range: None,
            output_dir: PathBuf::from("."),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn basic_auth() -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode("secret-token:api_token");
        format!("Basic {}", encoded)
    }

    /// タイムエントリーを取得し、変換できないものを除くことを確認する。
    #[tokio::test]
    async fn test_read_time_entries() {
        let mut server = mockito::Server::new_async().await;
        let body = json!([
            {
                "client_name": "Mock Client Inc.",
                "duration": 8820,
                "project_name": "Project 1",
                "project_id": 123456,
                "start": "2024-01-10T09:00:00+00:00",
                "stop": "2024-01-10T11:27:00+00:00",
                "description": "ignored",
                "tags": []
            },
            {
                "client_name": null,
                "duration": 3600,
                "project_name": null,
                "project_id": null,
                "start": "2024-01-10T12:00:00Z",
                "stop": "2024-01-10T13:00:00Z"
            },
            {
                "client_name": "Mock Client Inc.",
                "duration": -1704880800,
                "project_name": "Project 1",
                "project_id": 123456,
                "start": "2024-01-10T14:00:00Z",
                "stop": null
            },
            {
                "duration": 1800,
                "project_id": 789012,
                "start": "2024-01-11T09:00:00Z",
                "stop": "2024-01-11T09:30:00Z"
            }
        ]);
        let mock = server
            .mock("GET", "/api/v9/me/time_entries")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("start_date".into(), "2024-01-09".into()),
                Matcher::UrlEncoded("end_date".into(), "2024-01-14".into()),
                Matcher::UrlEncoded("meta".into(), "true".into()),
            ]))
            .match_header("authorization", basic_auth().as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;
        let client = TogglClient::new(&config(server.url()));
        let window = QueryWindow {
            start_date: date(2024, 1, 9),
            end_date: date(2024, 1, 14),
        };

        let entries = client.read_time_entries(&window).await.unwrap();

        mock.assert_async().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].client_name, "Mock Client Inc.");
        assert_eq!(entries[0].project_id, 123456);
        assert_eq!(entries[0].duration, 8820);
        assert_eq!(entries[1].project_id, 789012);
        assert_eq!(entries[1].client_name, "");
    }

    /// エラーステータスの場合はエラーになることを確認する。
    #[tokio::test]
    async fn test_read_time_entries_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v9/me/time_entries")
            .match_query(Matcher::Any)
            .with_status(403)
            .create_async()
            .await;
        let client = TogglClient::new(&config(server.url()));
        let window = QueryWindow {
            start_date: date(2024, 1, 9),
            end_date: date(2024, 1, 14),
        };

        let result = client.read_time_entries(&window).await;

        assert!(result.is_err());
    }

    /// レポートのPDFを取得できることを確認する。
    #[tokio::test]
    async fn test_download_report() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/reports/api/v3/workspace/42/search/time_entries.pdf")
            .match_header("authorization", basic_auth().as_str())
            .match_body(Matcher::Json(json!({
                "start_date": "2024-01-10",
                "end_date": "2024-01-12",
                "project_ids": [123456, 789012]
            })))
            .with_status(200)
            .with_body(b"%PDF-1.4 report")
            .create_async()
            .await;
        let client = TogglClient::new(&config(server.url()));
        let range = DateRange {
            start: date(2024, 1, 10),
            end: date(2024, 1, 12),
        };
        let request = ReportRequest::new(Some(&range), vec![123456, 789012], date(2024, 6, 1));

        let bytes = client.download_report(42, &request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(bytes, b"%PDF-1.4 report");
    }

    /// ステータスが200以外の場合はステータスと本文を含むエラーになることを確認する。
    #[tokio::test]
    async fn test_download_report_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/reports/api/v3/workspace/42/search/time_entries.pdf")
            .with_status(402)
            .with_body("Payment Required: upgrade your plan")
            .create_async()
            .await;
        let client = TogglClient::new(&config(server.url()));
        let request = ReportRequest::new(None, vec![1], date(2024, 6, 1));

        let err = client.download_report(42, &request).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("402"), "unexpected error: {}", message);
        assert!(
            message.contains("Payment Required: upgrade your plan"),
            "unexpected error: {}",
            message
        );
    }

    /// 期間が指定されていない場合は30日前から今日までとなることを確認する。
    #[test]
    fn test_report_request_default_range() {
        let request = ReportRequest::new(None, vec![1, 2], date(2024, 3, 1));

        assert_eq!(
            request,
            ReportRequest {
                start_date: "2024-01-31".to_string(),
                end_date: "2024-03-01".to_string(),
                project_ids: vec![1, 2],
            }
        );
    }
}
