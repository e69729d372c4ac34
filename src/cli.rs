use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lce_reports::reports::parse_date;
use time::Date;

#[derive(Parser, Debug)]
#[command(
    name = "lce-reports",
    version,
    about = "List and download LCE Gateway reports"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[arg(short, long, global = true, help = "Log debug detail to stderr")]
    pub verbose: bool,
    #[arg(long, global = true, help = "Portal API base URL")]
    pub base_url: Option<String>,
    #[arg(long, global = true, help = "Portal user name (overrides GATEWAY_USERNAME)")]
    pub username: Option<String>,
    #[arg(long, global = true, help = "HMAC user (overrides HMAC_USER)")]
    pub hmac_user: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List reports available in the date range
    List {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Download reports into today's folder
    Download {
        names: Vec<String>,
        #[arg(long, conflicts_with = "names", help = "Download every report in range")]
        all: bool,
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long, help = "Root folder for dated download directories")]
        output_dir: Option<PathBuf>,
        #[arg(long, help = "Download even if an earlier day already has the report")]
        force: bool,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Args, Debug, Clone, Copy)]
pub struct RangeArgs {
    #[arg(long, value_parser = parse_day, help = "First day, YYYY-MM-DD")]
    pub from: Option<Date>,
    #[arg(long, value_parser = parse_day, help = "Last day, YYYY-MM-DD")]
    pub to: Option<Date>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    Show,
    Set {
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        hmac_user: Option<String>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        range_days: Option<i64>,
    },
}

fn parse_day(value: &str) -> Result<Date, String> {
    parse_date(value).map_err(|error| error.to_string())
}
