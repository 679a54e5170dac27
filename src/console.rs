use std::io::Write;

use anyhow::{Context, Result};

use crate::summary::{short_summary, ProjectSummary};

/// Consoleに集計結果を表示するためのtrait。
pub trait ConsolePresenter {
    /// プロジェクトごとの集計結果を表示する。
    ///
    /// # Arguments
    ///
    /// * `summaries` - 表示する集計結果
    fn show_summaries(&mut self, summaries: &[ProjectSummary]) -> Result<()>;
}

/// 集計結果を1プロジェクト1行で表示する。
pub struct ConsoleSummaryList<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ConsoleSummaryList<'a, W> {
    /// 新しい`ConsoleSummaryList`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }
}

impl<'a, W: Write> ConsolePresenter for ConsoleSummaryList<'a, W> {
    // 0時間のプロジェクトも含めて設定順に表示する。
    fn show_summaries(&mut self, summaries: &[ProjectSummary]) -> Result<()> {
        for summary in summaries {
            writeln!(self.writer, "{}", short_summary(summary)).with_context(|| {
                format!(
                    "Failed to write summary of project {}",
                    summary.project.project_id
                )
            })?;
        }

        Ok(())
    }
}
