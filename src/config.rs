use std::{
    collections::HashSet,
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use log::{debug, info};
use serde::Deserialize;

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = "toggl-invoice";
const DEFAULT_API_BASE_URL: &str = "https://api.track.toggl.com";
const DEFAULT_PAYMENT_TERMS: &str = "Payment details on file";
const UNKNOWN_PROJECT_NAME: &str = "<unknown>";

/// 請求対象のプロジェクトと時間単価。
///
/// プロジェクトの同一性は`project_id`で判断し、`name`は表示にのみ利用する。
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Project {
    pub project_id: i64,
    pub name: Option<String>,
    pub hourly_rate: f64,
}

impl Project {
    /// 表示用のプロジェクト名を返す。未設定の場合は`<unknown>`とする。
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_PROJECT_NAME)
    }
}

/// 開始日と終了日を含む期間。`start <= end`であることは`config`の読み込み時に保証する。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// 検証済みの設定。起動時に一度だけ作成し、参照で各処理に渡す。
#[derive(Clone, Debug)]
pub struct Config {
    pub api_token: String,
    pub workspace_id: i64,
    pub api_base_url: String,
    pub projects: Vec<Project>,
    pub billed_to: Option<String>,
    pub pay_to: Option<String>,
    pub payment_terms: String,
    pub invoice_id: String,
    pub date_range: Option<DateRange>,
    pub output_dir: PathBuf,
}

/// 請求書番号は数値でも文字列でも記述できる。
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawInvoiceId {
    Number(i64),
    Text(String),
}

/// `config.toml`をそのままデシリアライズするための構造体。
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    toggl_api_key: Option<String>,
    workspace_id: i64,
    api_base_url: Option<String>,
    projects: Vec<Project>,
    billed_to: Option<String>,
    pay_to: Option<String>,
    payment_terms: Option<String>,
    invoice_id: RawInvoiceId,
    start_date: Option<String>,
    end_date: Option<String>,
    output_dir: Option<PathBuf>,
}

/// 設定ファイルの場所を返す。
///
/// カレントディレクトリの`config.toml`を優先し、存在しない場合はユーザーの設定ディレクトリを探す。
pub fn default_config_path() -> Result<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Ok(local);
    }

    let user = dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .context("Failed to resolve user config directory")?;
    if user.is_file() {
        return Ok(user);
    }

    bail!(
        "Config file not found: tried {} and {}",
        local.display(),
        user.display()
    )
}

/// 設定ファイルを読み込み、検証済みの`Config`を返す。
///
/// # Arguments
///
/// * `path` - 設定ファイルのパス
pub fn load(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = parse(&content, env::var("TOGGL_API_TOKEN").ok())
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    info!(
        "Loaded config from {} ({} projects)",
        path.display(),
        config.projects.len()
    );

    Ok(config)
}

/// TOML文字列を解析して検証する。
///
/// `toggl_api_key`が設定ファイルにない場合は`env_token`を利用する。
fn parse(content: &str, env_token: Option<String>) -> Result<Config> {
    let raw: RawConfig = toml::from_str(content).context("Failed to parse TOML")?;
    validate(raw, env_token)
}

fn validate(raw: RawConfig, env_token: Option<String>) -> Result<Config> {
    let api_token = raw
        .toggl_api_key
        .or(env_token)
        .map(|token| token.trim().to_string())
        .unwrap_or_default();
    if api_token.is_empty() {
        bail!("toggl_api_key must be set in the config file or TOGGL_API_TOKEN");
    }

    validate_projects(&raw.projects)?;

    let invoice_id = match raw.invoice_id {
        RawInvoiceId::Number(number) => number.to_string(),
        RawInvoiceId::Text(text) => text.trim().to_string(),
    };
    if invoice_id.is_empty() {
        bail!("invoice_id must not be empty");
    }

    let date_range = validate_date_range(raw.start_date.as_deref(), raw.end_date.as_deref())?;
    debug!("Configured date range: {:?}", date_range);

    Ok(Config {
        api_token,
        workspace_id: raw.workspace_id,
        api_base_url: raw
            .api_base_url
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string(),
        projects: raw.projects,
        billed_to: raw.billed_to.filter(|text| !text.trim().is_empty()),
        pay_to: raw.pay_to.filter(|text| !text.trim().is_empty()),
        payment_terms: raw
            .payment_terms
            .unwrap_or_else(|| DEFAULT_PAYMENT_TERMS.to_string()),
        invoice_id,
        date_range,
        output_dir: raw.output_dir.unwrap_or_else(|| PathBuf::from(".")),
    })
}

fn validate_projects(projects: &[Project]) -> Result<()> {
    if projects.is_empty() {
        bail!("At least one project must be configured");
    }

    let mut seen = HashSet::new();
    for project in projects {
        if !seen.insert(project.project_id) {
            bail!("Duplicate project_id: {}", project.project_id);
        }
        if !project.hourly_rate.is_finite() || project.hourly_rate < 0.0 {
            bail!(
                "hourly_rate of project {} must be a non-negative number: {}",
                project.project_id,
                project.hourly_rate
            );
        }
    }

    Ok(())
}

fn validate_date_range(start: Option<&str>, end: Option<&str>) -> Result<Option<DateRange>> {
    match (start, end) {
        (None, None) => Ok(None),
        (Some(start), Some(end)) => {
            let start = parse_date(start).context("Invalid start_date")?;
            let end = parse_date(end).context("Invalid end_date")?;
            if end < start {
                bail!("end_date ({}) must not be before start_date ({})", end, start);
            }
            Ok(Some(DateRange { start, end }))
        }
        (Some(_), None) => bail!("start_date is set but end_date is missing"),
        (None, Some(_)) => bail!("end_date is set but start_date is missing"),
    }
}

/// `YYYY-MM-DD`形式の日付をパースする。
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Failed to parse date (expected YYYY-MM-DD): {}", s))
}
