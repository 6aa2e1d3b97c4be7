use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use clap::{Args, Parser, Subcommand};
use log::info;

use crate::config::resolve_db_path;
use crate::dates::{clean_date, Clock, DateWindow};
use crate::db::{self, SqliteStore};
use crate::page::{self, Page, DEFAULT_NETWORK};
use crate::render::{render_page, Format};

#[derive(Parser)]
#[command(name = "reqlogstats", version)]
#[command(about = "Request statistics reports for Arclink data nodes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Reporting date, YYYY-MM-DD (default: two days ago)
    #[arg(long = "date")]
    pub date: Option<String>,
    /// Path to SQLite database (or set REQLOGSTATS_DB)
    #[arg(long = "db")]
    pub db_path: Option<PathBuf>,
    /// Directory with reqlogstats-<year>.db files (or set REQLOGSTATS_DB_DIR)
    #[arg(long = "db-dir")]
    pub db_dir: Option<PathBuf>,
    /// Output format
    #[arg(long = "format", value_enum, default_value_t = Format::Html)]
    pub format: Format,
    /// Write the report here instead of stdout
    #[arg(long = "output", short = 'o')]
    pub output: Option<PathBuf>,
    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render the daily report of every data node
    Daily {
        /// Include tables revealing user information
        #[arg(long = "showall")]
        show_all: bool,
        #[command(flatten)]
        args: ReportArgs,
    },
    /// Render the monthly report for one network code
    Network {
        /// Network code, e.g. GE
        #[arg(long = "code", default_value = DEFAULT_NETWORK)]
        code: String,
        #[command(flatten)]
        args: ReportArgs,
    },
    /// Create an empty statistics database
    Init {
        /// Path of the database to create
        #[arg(long = "db")]
        db_path: PathBuf,
        /// Enable debug logging
        #[arg(short, long)]
        verbose: bool,
    },
}

fn configure_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    builder.format(|buf, record| writeln!(buf, "{}", record.args()));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    } else {
        builder.filter_level(log::LevelFilter::Info);
    }
    let _ = builder.try_init();
}

/// Reporting date: the requested one, else two days before today.
fn report_date<C: Clock>(window: &DateWindow<C>, requested: Option<&str>) -> Result<NaiveDate> {
    match requested {
        Some(text) => Ok(clean_date(text)?),
        None => {
            let today = window.today();
            Ok(window.offset(today, -2).unwrap_or(today))
        }
    }
}

fn open_store(args: &ReportArgs, date: NaiveDate) -> Result<SqliteStore> {
    let path = resolve_db_path(args.db_path.as_deref(), args.db_dir.as_deref(), date.year());
    info!("Reading statistics from {}", path.display());
    Ok(SqliteStore::open(&path)?)
}

fn emit(page: &Page, args: &ReportArgs) -> Result<()> {
    let rendered = render_page(page, args.format)?;
    match &args.output {
        Some(path) => {
            fs::write(path, rendered)?;
            info!("Wrote report to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let window = DateWindow::default();
    match cli.command {
        Commands::Daily { show_all, args } => {
            configure_logging(args.verbose);
            let date = report_date(&window, args.date.as_deref())?;
            let store = open_store(&args, date)?;
            let page = page::daily_report(&store, &window, date, show_all, store.timestamp());
            emit(&page, &args)?;
        }
        Commands::Network { code, args } => {
            configure_logging(args.verbose);
            let code = page::clean_code(&code);
            anyhow::ensure!(!code.is_empty(), "network code must contain letters or digits");
            let date = report_date(&window, args.date.as_deref())?;
            let store = open_store(&args, date)?;
            let page = page::network_report(&store, &window, &code, date, store.timestamp());
            emit(&page, &args)?;
        }
        Commands::Init { db_path, verbose } => {
            configure_logging(verbose);
            db::init_db(&db_path)?;
            info!("Initialised {}", db_path.display());
        }
    }
    Ok(())
}
