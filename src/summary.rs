use log::debug;

use crate::config::Project;
use crate::time_entry::{entry_hours, round2, TimeEntry};

/// プロジェクトごとの集計結果。
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectSummary {
    pub project: Project,
    pub hours: f64,
    pub entries: Vec<TimeEntry>,
}

/// time entryをプロジェクトごとに集計する。
///
/// 設定されたプロジェクトごとに1件の集計結果を設定順に返す。対象のtime entryがない
/// プロジェクトも0時間として含める。
/// 時間はtime entryごとに小数点以下2桁に丸めてから合計し、合計もまた2桁に丸める。
///
/// # Arguments
///
/// * `time_entries` - 集計するtime entry
/// * `projects` - 請求対象のプロジェクト
pub fn summarize_time_entries(
    time_entries: &[TimeEntry],
    projects: &[Project],
) -> Vec<ProjectSummary> {
    projects
        .iter()
        .map(|project| {
            let entries: Vec<TimeEntry> = time_entries
                .iter()
                .filter(|entry| entry.project_id == project.project_id)
                .cloned()
                .collect();
            let hours = round2(entries.iter().map(entry_hours).sum());
            debug!(
                "Project {}: {} entries, {:.2} hours",
                project.project_id,
                entries.len(),
                hours
            );

            ProjectSummary {
                project: project.clone(),
                hours,
                entries,
            }
        })
        .collect()
}

/// 集計結果の売上(時間 × 時間単価)を返す。
pub fn total_revenue(summary: &ProjectSummary) -> f64 {
    summary.hours * summary.project.hourly_rate
}

/// 時間を`{時間}h {分}m`の形式にする。
///
/// 分は切り捨てるため、2.999時間は`2h 59m`となる。
pub fn hour_minute_format(hours: f64) -> String {
    let whole = hours.trunc();
    let minutes = ((hours - whole) * 60.0).floor();
    format!("{}h {}m", whole as i64, minutes as i64)
}

/// 標準出力に表示する1行の要約を返す。
pub fn short_summary(summary: &ProjectSummary) -> String {
    format!(
        "{} - {} - {:.2}",
        summary.project.display_name(),
        hour_minute_format(summary.hours),
        total_revenue(summary)
    )
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rstest::rstest;

    use super::{hour_minute_format, short_summary, summarize_time_entries, total_revenue};
    use crate::config::Project;
    use crate::time_entry::TimeEntry;

    fn project(project_id: i64, name: &str, hourly_rate: f64) -> Project {
        Project {
            project_id,
            name: Some(name.to_string()),
            hourly_rate,
        }
    }

    fn entry(project_id: i64, duration: u64, day: u32) -> TimeEntry {
        let start = Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap();
        TimeEntry::new(
            "Mock Client Inc.".to_string(),
            duration,
            format!("Project {}", project_id),
            project_id,
            start,
            start + Duration::seconds(duration as i64),
        )
        .unwrap()
    }

    /// 2.45時間のtime entry 3件を時間単価75で集計した結果を確認する。
    #[test]
    fn test_summarize_three_entries() {
        let entries: Vec<TimeEntry> = (1..=3).map(|day| entry(123456, 8820, day)).collect();
        let projects = vec![project(123456, "Project 1", 75.0)];

        let summaries = summarize_time_entries(&entries, &projects);

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].hours, 7.35);
        assert_eq!(summaries[0].entries.len(), 3);
        assert_eq!(format!("{:.2}", total_revenue(&summaries[0])), "551.25");
        assert_eq!(short_summary(&summaries[0]), "Project 1 - 7h 20m - 551.25");
    }

    /// 対象のtime entryがないプロジェクトは0時間、売上0となることを確認する。
    #[test]
    fn test_summarize_project_without_entries() {
        let entries = vec![entry(1, 3600, 1)];
        let projects = vec![project(1, "One", 50.0), project(2, "Two", 80.0)];

        let summaries = summarize_time_entries(&entries, &projects);

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[1].project.project_id, 2);
        assert_eq!(summaries[1].hours, 0.0);
        assert!(summaries[1].entries.is_empty());
        assert_eq!(total_revenue(&summaries[1]), 0.0);
        assert_eq!(short_summary(&summaries[1]), "Two - 0h 0m - 0.00");
    }

    /// 設定にないプロジェクトのtime entryは集計しないことを確認する。
    #[test]
    fn test_summarize_ignores_unconfigured_projects() {
        let entries = vec![entry(1, 3600, 1), entry(99, 7200, 2)];
        let projects = vec![project(1, "One", 50.0)];

        let summaries = summarize_time_entries(&entries, &projects);

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].hours, 1.0);
        assert!(summaries[0].entries.iter().all(|e| e.project_id == 1));
    }

    /// time entryの順序によらず同じ集計結果になることを確認する。
    #[test]
    fn test_summarize_is_order_independent() {
        let entries = vec![
            entry(1, 8820, 1),
            entry(1, 1234, 2),
            entry(1, 5555, 3),
            entry(1, 61, 4),
        ];
        let mut reversed = entries.clone();
        reversed.reverse();
        let projects = vec![project(1, "One", 50.0)];

        let forward = summarize_time_entries(&entries, &projects);
        let backward = summarize_time_entries(&reversed, &projects);

        assert!((forward[0].hours - backward[0].hours).abs() < 1e-9);
    }

    /// 時間はtime entryごとに丸めてから合計することを確認する。
    #[test]
    fn test_summarize_rounds_per_entry() {
        // 1エントリーあたり0.004時間(0.00に丸められる)
        let entries: Vec<TimeEntry> = (1..=10).map(|day| entry(1, 15, day)).collect();
        let projects = vec![project(1, "One", 100.0)];

        let summaries = summarize_time_entries(&entries, &projects);

        assert_eq!(summaries[0].hours, 0.0);
    }

    /// プロジェクト名がない場合は`<unknown>`と表示することを確認する。
    #[test]
    fn test_short_summary_unknown_name() {
        let projects = vec![Project {
            project_id: 1,
            name: None,
            hourly_rate: 10.0,
        }];

        let summaries = summarize_time_entries(&[entry(1, 5400, 1)], &projects);

        assert_eq!(short_summary(&summaries[0]), "<unknown> - 1h 30m - 15.00");
    }

    /// 分は切り捨てとなることを確認する。
    #[rstest]
    #[case(0.0, "0h 0m")]
    #[case(1.5, "1h 30m")]
    #[case(2.999, "2h 59m")]
    #[case(7.35, "7h 20m")]
    #[case(0.01, "0h 0m")]
    #[case(10.25, "10h 15m")]
    fn test_hour_minute_format(#[case] hours: f64, #[case] expected: &str) {
        assert_eq!(hour_minute_format(hours), expected);
    }
}
