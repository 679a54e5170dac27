use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::info;

use crate::config::Config;
use crate::console::{ConsolePresenter, ConsoleSummaryList};
use crate::date_range::{filter_entries, query_window};
use crate::datetime;
use crate::invoice::InvoiceDocument;
use crate::pdf::write_invoice;
use crate::summary::{summarize_time_entries, ProjectSummary};
use crate::toggl::{ReportRequest, TogglRepository};

/// 1回の実行結果。
#[derive(Debug)]
pub struct InvoiceOutcome {
    pub summaries: Vec<ProjectSummary>,
    pub invoice_path: PathBuf,
    pub report_path: PathBuf,
}

pub struct InvoiceCommand<'a, T: TogglRepository> {
    toggl_client: &'a T,
    config: &'a Config,
}

impl<'a, T: TogglRepository> InvoiceCommand<'a, T> {
    /// 新しい`InvoiceCommand`を返す。
    ///
    /// # Arguments
    /// * `toggl_client` - Toggl APIと通信するためのリポジトリ
    /// * `config` - 検証済みの設定
    pub fn new(toggl_client: &'a T, config: &'a Config) -> Self {
        Self {
            toggl_client,
            config,
        }
    }

    /// time entryの取得から請求書とレポートの出力までを順に行う。
    ///
    /// プロジェクトごとの要約と完了メッセージは`out`に書き出す。
    /// 途中で失敗した場合、それまでに書き出したファイルは残る。
    ///
    /// 請求日と出力ファイル名には実行日時を利用する。
    ///
    /// # Arguments
    ///
    /// * `out` - 要約の出力先
    pub async fn run<W: Write>(&self, out: &mut W) -> Result<InvoiceOutcome> {
        let local_now = datetime::local_now();
        let today = local_now.date_naive();
        let range = self.config.date_range.as_ref();

        let window = query_window(range, today);
        info!(
            "Fetching time entries from {} to {}",
            window.start_date, window.end_date
        );
        let time_entries = self
            .toggl_client
            .read_time_entries(&window)
            .await
            .context("Failed to retrieve time entries")?;
        let time_entries = filter_entries(time_entries, range, today);

        let summaries = summarize_time_entries(&time_entries, &self.config.projects);
        ConsoleSummaryList::new(out)
            .show_summaries(&summaries)
            .context("Failed to show project summaries")?;

        let timestamp = datetime::file_stamp(&local_now);
        let invoice_path = self
            .config
            .output_dir
            .join("invoices")
            .join(format!("invoice_{}.pdf", timestamp));
        let document = InvoiceDocument::from_summaries(&summaries, self.config, today);
        write_invoice(&document, &invoice_path)?;
        writeln!(
            out,
            "Invoice generated successfully: {}",
            invoice_path.display()
        )?;

        let project_ids = self
            .config
            .projects
            .iter()
            .map(|project| project.project_id)
            .collect();
        let request = ReportRequest::new(range, project_ids, today);
        let report = self
            .toggl_client
            .download_report(self.config.workspace_id, &request)
            .await
            .context("Failed to download Toggl report")?;
        let report_path = self
            .config
            .output_dir
            .join("reports")
            .join(format!("toggl_report_{}.pdf", timestamp));
        save_report(&report, &report_path)?;
        writeln!(
            out,
            "Report downloaded successfully: {}",
            report_path.display()
        )?;

        Ok(InvoiceOutcome {
            summaries,
            invoice_path,
            report_path,
        })
    }
}

/// レポートのPDFを書き出す。親ディレクトリが存在しない場合は作成する。
fn save_report(bytes: &[u8], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(path, bytes)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    info!("Wrote report to {}", path.display());

    Ok(())
}
