//! ewant-report - Automated course statistics crawler for the ewant
//! reporting portal.
//!
//! Logs in with a real browser, scans the course table with client-side
//! status and date filters, scrapes each matching course's summary
//! statistics, and exports the result to a styled xlsx report.

mod browser;
mod config;
mod crawler;
mod export;
mod scan;
mod session;
mod stats;
mod types;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use browser::{BrowserOptions, BrowserSession};
use config::{CredentialStore, Credentials};
use crawler::{CrawlEvent, CrawlPhase, Crawler, RunOutcome};
use session::SessionDriver;
use types::{CourseStatus, FilterCriteria};

#[derive(Parser)]
#[command(name = "ewant-report")]
#[command(about = "Automated course statistics crawler for the ewant reporting portal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusArg {
    Open,
    Upcoming,
    Closed,
}

impl std::fmt::Display for StatusArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Upcoming => "upcoming",
            Self::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

impl From<StatusArg> for CourseStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Open => CourseStatus::Open,
            StatusArg::Upcoming => CourseStatus::Upcoming,
            StatusArg::Closed => CourseStatus::Closed,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl course statistics and export them to an xlsx report
    Crawl {
        /// Course name search text applied on the site before scanning
        #[arg(long)]
        search: Option<String>,

        /// Course statuses to include (repeatable)
        #[arg(long, value_enum, default_values_t = [StatusArg::Open])]
        status: Vec<StatusArg>,

        /// Only include courses starting on or after this date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Only include courses starting on or before this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Show browser window instead of running headless
        #[arg(long)]
        headed: bool,

        /// Only login, don't crawl (verify credentials work)
        #[arg(long)]
        dry_run: bool,

        /// Output report path
        /// Default: ./ewant_report.xlsx
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Username whose stored password should be used
        #[arg(long)]
        username: Option<String>,

        /// Store the credentials used for this run in the OS keychain
        #[arg(long)]
        save_credentials: bool,
    },

    /// Store portal credentials in the OS keychain
    Login {
        /// Portal account (e-mail)
        #[arg(long)]
        username: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl {
            search,
            status,
            from,
            to,
            headed,
            dry_run,
            output,
            username,
            save_credentials,
        } => {
            let args = CrawlArgs {
                search,
                status,
                from,
                to,
                headed,
                dry_run,
                output: output.unwrap_or_else(|| PathBuf::from("ewant_report.xlsx")),
                username,
                save_credentials,
            };
            crawl_command(args).await?;
        }
        Commands::Login { username } => {
            login_command(username)?;
        }
    }

    Ok(())
}

struct CrawlArgs {
    search: Option<String>,
    status: Vec<StatusArg>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    headed: bool,
    dry_run: bool,
    output: PathBuf,
    username: Option<String>,
    save_credentials: bool,
}

fn build_criteria(args: &CrawlArgs) -> Result<FilterCriteria> {
    let statuses: BTreeSet<CourseStatus> =
        args.status.iter().map(|s| CourseStatus::from(*s)).collect();

    // An open-ended bound still produces a valid inclusive range.
    let date_range = match (args.from, args.to) {
        (None, None) => None,
        (from, to) => Some((
            from.unwrap_or(NaiveDate::MIN),
            to.unwrap_or(NaiveDate::MAX),
        )),
    };

    FilterCriteria::new(args.search.clone(), statuses, date_range)
        .context("Invalid filter criteria")
}

async fn crawl_command(args: CrawlArgs) -> Result<()> {
    let criteria = build_criteria(&args)?;
    if let Some((from, to)) = criteria.date_range {
        info!("start date range: {from} to {to}");
    }

    let store = CredentialStore::new();
    let credentials = store
        .resolve(args.username.as_deref(), Credentials::from_env())
        .context("Failed to load credentials")?;
    info!("using credentials for {}", credentials.username);
    if args.save_credentials {
        store.save(&credentials)?;
        info!("credentials stored in the OS keychain");
    }

    info!(
        "launching browser ({})",
        if args.headed { "headed" } else { "headless" }
    );
    let session = BrowserSession::launch(BrowserOptions { headed: args.headed })
        .await
        .context("Failed to launch browser")?;
    let page = session.new_page().await?;
    let driver = SessionDriver::new(page);

    let (tx, rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let printer = tokio::spawn(consume_events(rx));

    // Ctrl-C requests a cooperative stop, honored between courses.
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("stop requested, finishing current bookkeeping");
                cancel.cancel();
            }
        });
    }

    let crawler = Crawler::new(tx, cancel);
    crawler.emit_phase(CrawlPhase::Idle).await;
    crawler.emit_phase(CrawlPhase::LoggingIn).await;
    if let Err(e) = driver.login(&credentials).await {
        drop(crawler);
        let _ = printer.await;
        let _ = session.close().await;
        return Err(anyhow!(e).context("Login failed"));
    }

    if args.dry_run {
        info!("dry run: login verified, skipping crawl");
        drop(crawler);
        let _ = printer.await;
        return session.close().await;
    }

    let (courses, outcome) = crawler.process_all_courses(&driver, &criteria).await;
    drop(crawler);
    let _ = printer.await;
    session.close().await?;

    match outcome {
        RunOutcome::Completed => info!("crawl completed: {} courses", courses.len()),
        RunOutcome::Aborted => warn!(
            "crawl aborted early, keeping {} completed courses",
            courses.len()
        ),
        RunOutcome::Cancelled => info!(
            "crawl stopped by user, keeping {} completed courses",
            courses.len()
        ),
    }

    if courses.is_empty() {
        warn!("no course data collected, skipping export");
        return Ok(());
    }
    let written = export::write_report(&args.output, &courses)?;
    info!("report written to {}", written.display());
    Ok(())
}

/// Drain crawl events, rendering them as log lines. The GUI of this tool is
/// the terminal; a richer shell would consume the same channel.
async fn consume_events(mut rx: mpsc::Receiver<CrawlEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            CrawlEvent::Phase(phase) => debug!("phase: {phase:?}"),
            CrawlEvent::Message(text) => info!("{text}"),
            CrawlEvent::CourseStarted {
                index,
                total,
                name,
                status,
                start,
            } => info!("[{index}/{total}] {name} ({status}, starts {start})"),
            CrawlEvent::CourseCompleted {
                name,
                total_enrolled,
            } => info!("{name}: total enrolled {total_enrolled}"),
            CrawlEvent::DataReady(courses) => debug!("{} courses collected", courses.len()),
        }
    }
}

/// Prompt for the password and store the pair in the OS keychain.
fn login_command(username: String) -> Result<()> {
    print!("Password for {username}: ");
    std::io::stdout().flush()?;
    let mut password = String::new();
    std::io::stdin()
        .read_line(&mut password)
        .context("Failed to read password")?;
    let password = password.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("empty password");
    }

    let store = CredentialStore::new();
    store.save(&Credentials { username, password })?;
    info!("credentials stored in the OS keychain");
    Ok(())
}
