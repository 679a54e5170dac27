use chrono::{Duration, NaiveDate};

use crate::config::{Config, Project};
use crate::summary::ProjectSummary;
use crate::time_entry::{entry_hours, round2, TimeEntry};

/// 支払期限までの日数。
const PAYMENT_DUE_DAYS: i64 = 14;

/// 請求書の1行。
#[derive(Clone, Debug, PartialEq)]
pub struct InvoiceLineItem {
    pub project_name: String,
    pub hours: f64,
    pub hourly_rate: f64,
}

impl InvoiceLineItem {
    /// 金額を小数点以下2桁に丸めて返す。
    pub fn amount(&self) -> f64 {
        round2(self.hours * self.hourly_rate)
    }
}

/// 宛先などの複数行のテキストブロック。
#[derive(Clone, Debug, PartialEq)]
pub struct AddressBlock {
    pub heading: String,
    pub lines: Vec<String>,
}

/// PDFにレイアウトする前の請求書の内容。
#[derive(Clone, Debug, PartialEq)]
pub struct InvoiceDocument {
    pub title: String,
    pub invoice_label: String,
    /// (ラベル, 値)の組
    pub details: Vec<(String, String)>,
    pub addresses: Vec<AddressBlock>,
    pub line_items: Vec<InvoiceLineItem>,
}

impl InvoiceDocument {
    /// 集計結果と設定から請求書の内容を作成する。
    ///
    /// 0時間のプロジェクトは明細に含めない。
    ///
    /// # Arguments
    ///
    /// * `summaries` - プロジェクトごとの集計結果
    /// * `config` - 宛先や支払条件を含む設定
    /// * `issue_date` - 請求日
    pub fn from_summaries(
        summaries: &[ProjectSummary],
        config: &Config,
        issue_date: NaiveDate,
    ) -> Self {
        let line_items = summaries
            .iter()
            .filter(|summary| summary.hours > 0.0)
            .map(|summary| InvoiceLineItem {
                project_name: summary.project.display_name().to_string(),
                hours: summary.hours,
                hourly_rate: summary.project.hourly_rate,
            })
            .collect();

        Self::with_line_items(config, issue_date, line_items)
    }

    /// 集計前のtime entryから直接請求書の内容を作成する。
    ///
    /// time entryは(プロジェクトID, プロジェクト名)ごとに最初に現れた順でまとめる。
    /// 単価はプロジェクトIDまたはプロジェクト名が一致する設定から取り、
    /// どちらも一致しない場合は0とする。
    ///
    /// # Arguments
    ///
    /// * `entries` - 絞り込み済みのtime entry
    /// * `config` - 宛先や支払条件、単価を含む設定
    /// * `issue_date` - 請求日
    pub fn from_time_entries(
        entries: &[TimeEntry],
        config: &Config,
        issue_date: NaiveDate,
    ) -> Self {
        let mut groups: Vec<((i64, &str), f64)> = Vec::new();
        for entry in entries {
            let key = (entry.project_id, entry.project_name.as_str());
            let hours = entry_hours(entry);
            match groups.iter_mut().find(|(group, _)| *group == key) {
                Some((_, total)) => *total += hours,
                None => groups.push((key, hours)),
            }
        }

        let line_items = groups
            .into_iter()
            .map(|((project_id, project_name), hours)| InvoiceLineItem {
                project_name: project_name.to_string(),
                hours: round2(hours),
                hourly_rate: hourly_rate_for(&config.projects, project_id, project_name),
            })
            .filter(|item| item.hours > 0.0)
            .collect();

        Self::with_line_items(config, issue_date, line_items)
    }

    fn with_line_items(
        config: &Config,
        issue_date: NaiveDate,
        line_items: Vec<InvoiceLineItem>,
    ) -> Self {
        let due_date = issue_date + Duration::days(PAYMENT_DUE_DAYS);
        let mut details = vec![
            ("Invoice Date:".to_string(), long_date(issue_date)),
            ("Due Date:".to_string(), long_date(due_date)),
            ("Payment Terms:".to_string(), config.payment_terms.clone()),
        ];
        if let Some(range) = &config.date_range {
            details.push((
                "Service Period:".to_string(),
                format!(
                    "{} to {}",
                    range.start.format("%m-%d-%Y"),
                    range.end.format("%m-%d-%Y")
                ),
            ));
        }

        let addresses = [("Bill To:", &config.billed_to), ("Pay To:", &config.pay_to)]
            .into_iter()
            .filter_map(|(heading, text)| {
                text.as_ref().map(|text| AddressBlock {
                    heading: heading.to_string(),
                    lines: text.lines().map(str::to_string).collect(),
                })
            })
            .collect();

        Self {
            title: "INVOICE".to_string(),
            invoice_label: format!("Invoice #: {}", config.invoice_id),
            details,
            addresses,
            line_items,
        }
    }

    /// 明細の合計時間を返す。
    pub fn total_hours(&self) -> f64 {
        self.line_items.iter().map(|item| item.hours).sum()
    }

    /// 明細の合計金額を返す。丸め済みの各行の金額を合計する。
    pub fn total_amount(&self) -> f64 {
        self.line_items.iter().map(InvoiceLineItem::amount).sum()
    }

    /// 表の見出し、明細、合計の各行を文字列で返す。
    pub fn table_rows(&self) -> Vec<[String; 4]> {
        let mut rows = vec![[
            "Project".to_string(),
            "Hours".to_string(),
            "Rate".to_string(),
            "Amount".to_string(),
        ]];
        rows.extend(self.line_items.iter().map(|item| {
            [
                item.project_name.clone(),
                format!("{:.2}", item.hours),
                currency(item.hourly_rate),
                currency(item.amount()),
            ]
        }));
        rows.push([
            "TOTAL".to_string(),
            format!("{:.2}", self.total_hours()),
            String::new(),
            currency(self.total_amount()),
        ]);

        rows
    }
}

/// 設定の中からIDまたは名前が一致するプロジェクトの単価を返す。
fn hourly_rate_for(projects: &[Project], project_id: i64, project_name: &str) -> f64 {
    projects
        .iter()
        .find(|project| {
            project.project_id == project_id || project.name.as_deref() == Some(project_name)
        })
        .map(|project| project.hourly_rate)
        .unwrap_or(0.0)
}

fn long_date(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

fn currency(value: f64) -> String {
    format!("${:.2}", value)
}
