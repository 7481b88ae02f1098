use assetdash::{api, config::Config, logging, report, Dashboard, ReportingWindow};
use chrono::{NaiveDate, Utc};
use clap::{Parser, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "assetdash")]
#[command(about = "Fetch and print asset analytics dashboard pages")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./assetdash.yaml, then $XDG_CONFIG_HOME/assetdash/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Dashboard page to show
  #[arg(short, long)]
  page: Option<String>,

  /// Window start (YYYY-MM-DD or RFC 3339)
  #[arg(long, requires = "to", conflicts_with = "days")]
  from: Option<String>,

  /// Window end (YYYY-MM-DD or RFC 3339)
  #[arg(long, requires = "from")]
  to: Option<String>,

  /// Report on the last N days
  #[arg(long, default_value_t = 30)]
  days: u32,

  #[arg(long, value_enum, default_value_t = Format::Text)]
  format: Format,

  /// Refresh every SECS seconds until interrupted
  #[arg(long, value_name = "SECS")]
  watch: Option<u64>,

  /// Debug logging
  #[arg(short, long)]
  verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
  Text,
  Json,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = logging::init(args.verbose)?;

  let config = Config::load(args.config.as_deref())?;

  let page = args
    .page
    .clone()
    .or_else(|| config.default_page.clone())
    .ok_or_else(|| eyre!("No page given and no default_page configured"))?;

  let window = window_for(&args, Utc::now().date_naive())?;

  let client = api::ApiClient::new(&config.api)?;
  let mut dashboard = api::build_dashboard(&config, &page, client)?;
  info!(%page, %window, "loading dashboard");

  dashboard.set_window(window)?;
  dashboard.wait_settled().await;
  print(&dashboard, args.format)?;

  let Some(secs) = args.watch else {
    return Ok(());
  };

  let period = Duration::from_secs(secs.max(1));
  loop {
    let cycle = async {
      tokio::time::sleep(period).await;
      dashboard.set_window(window_for(&args, Utc::now().date_naive())?)?;
      dashboard.wait_settled().await;
      Ok::<_, color_eyre::Report>(())
    };

    match until_interrupted(tokio::signal::ctrl_c(), cycle).await {
      Some(result) => {
        result?;
        print(&dashboard, args.format)?;
      }
      None => {
        info!("interrupted");
        break;
      }
    }
  }

  Ok(())
}

/// The explicit `--from/--to` window, or the `--days` days up to `today`.
fn window_for(args: &Args, today: NaiveDate) -> Result<ReportingWindow> {
  let window = match (&args.from, &args.to) {
    (Some(from), Some(to)) => ReportingWindow::parse(from, to)?,
    _ => ReportingWindow::last_days(args.days, today)?,
  };
  Ok(window)
}

/// Run `work` unless `interrupt` fires first.
async fn until_interrupted<I, W>(interrupt: I, work: W) -> Option<W::Output>
where
  I: Future,
  W: Future,
{
  tokio::select! {
    _ = interrupt => None,
    output = work => Some(output),
  }
}

fn print(dashboard: &Dashboard<Value>, format: Format) -> Result<()> {
  match format {
    Format::Text => println!("{}", report::to_text(dashboard)),
    Format::Json => println!("{}", report::to_json(dashboard)?),
  }
  Ok(())
}
