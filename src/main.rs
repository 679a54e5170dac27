use std::{env, io};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::{info, LevelFilter};

mod config;
mod console;
mod date_range;
mod datetime;
mod invoice;
mod invoice_command;
mod pdf;
mod summary;
mod time_entry;
mod toggl;

use invoice_command::InvoiceCommand;
use toggl::TogglClient;

/// Togglのtime entryから請求書を作成するためのCLIアプリケーション。
///
/// 設定はカレントディレクトリの`config.toml`、またはユーザー設定ディレクトリの
/// `toggl-invoice/config.toml`から読み込む。
///
/// # Examples
/// ```
/// $ cargo run
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _args = Args::parse();

    setup_logger().context("Failed to set up logger")?;

    let config_path = config::default_config_path()?;
    let config = config::load(&config_path)?;

    let client = TogglClient::new(&config);
    let command = InvoiceCommand::new(&client, &config);
    let mut stdout = io::stdout();
    let outcome = command.run(&mut stdout).await?;
    info!(
        "Done: {} projects, invoice={}, report={}",
        outcome.summaries.len(),
        outcome.invoice_path.display(),
        outcome.report_path.display()
    );

    Ok(())
}

/// ログの出力先と書式を設定する。
///
/// 標準出力は要約の表示に使うため、ログは標準エラー出力に書き出す。
/// レベルは`RUST_LOG`で変更でき、未指定の場合は`info`とする。
fn setup_logger() -> Result<()> {
    let level = env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::Blue);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .chain(io::stderr())
        .apply()
        .context("Logger has already been set")?;

    Ok(())
}
