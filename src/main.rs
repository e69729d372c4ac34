mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use crossbeam_channel::unbounded;
use serde::Serialize;

use cli::{Cli, Commands, ConfigCommands, RangeArgs};
use lce_reports::core::{
    app_state::AppState,
    events::ChannelSink,
    settings::{Settings, SettingsManager},
};
use lce_reports::gateway::{Credentials, GatewayError};
use lce_reports::output::{print_one, print_out, setup_logging, ProgressPrinter};
use lce_reports::reports::{find_by_name, format_date, ReportDescriptor};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigView {
    path: String,
    settings: Settings,
    effective_base_url: String,
    credentials: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(error) => {
            tracing::debug!("command failed: {error:?}");
            eprintln!("error: {error:#}");
            let auth_failure = error
                .chain()
                .filter_map(|cause| cause.downcast_ref::<GatewayError>())
                .any(GatewayError::is_auth_failure);
            if auth_failure {
                eprintln!(
                    "hint: check GATEWAY_USERNAME, GATEWAY_PASSWORD, HMAC_USER and HMAC_KEY"
                );
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let manager = SettingsManager::new()?;
    let overrides = Credentials {
        username: cli.username.clone().unwrap_or_default(),
        hmac_user: cli.hmac_user.clone().unwrap_or_default(),
        ..Credentials::default()
    };
    let state = AppState::new(manager, overrides).with_base_url(cli.base_url.clone());

    match cli.command {
        Commands::List { range } => list(&state, range, cli.json),
        Commands::Download {
            names,
            all,
            range,
            output_dir,
            force,
        } => {
            let state = state.with_output_dir(output_dir);
            download(&state, names, all, range, force, cli.json)
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => show_config(&state, cli.json),
            ConfigCommands::Set {
                base_url,
                username,
                hmac_user,
                output_dir,
                range_days,
            } => {
                let manager = state.settings_manager();
                let settings = manager.update(|settings| {
                    if let Some(url) = base_url {
                        settings.base_url = url;
                    }
                    if let Some(user) = username {
                        settings.username = Some(user);
                    }
                    if let Some(user) = hmac_user {
                        settings.hmac_user = Some(user);
                    }
                    if let Some(dir) = output_dir {
                        settings.output_dir = Some(dir);
                    }
                    if let Some(days) = range_days {
                        settings.default_range_days = days;
                    }
                })?;
                tracing::info!("saved settings to {}", manager.path().display());
                print_one(cli.json, settings, |_| {
                    vec![format!("saved {}", manager.path().display())]
                })?;
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

fn list(state: &AppState, range: RangeArgs, json: bool) -> Result<ExitCode> {
    let range = state.date_range(range.from, range.to)?;
    let session = state.connect()?;
    let reports = state.load_reports(&session, &range)?;
    if reports.is_empty() && !json {
        eprintln!("no reports from {range}");
    }
    print_out(json, &reports, report_row)?;
    Ok(ExitCode::SUCCESS)
}

fn download(
    state: &AppState,
    names: Vec<String>,
    all: bool,
    range: RangeArgs,
    force: bool,
    json: bool,
) -> Result<ExitCode> {
    if names.is_empty() && !all {
        bail!("name at least one report, or pass --all");
    }
    let (session, selected) = if all {
        let range = state.date_range(range.from, range.to)?;
        let session = state.connect()?;
        let reports = state.load_reports(&session, &range)?;
        if reports.is_empty() {
            eprintln!("no reports from {range}");
            return Ok(ExitCode::SUCCESS);
        }
        (session, reports)
    } else {
        // named reports come from the full listing; --from/--to do not apply
        if range.from.is_some() || range.to.is_some() {
            tracing::warn!("--from/--to are ignored when reports are named");
        }
        let session = state.connect()?;
        let listing = session.list_reports()?;
        let reports = find_by_name(&listing, &names)?;
        (session, reports)
    };

    let (sender, receiver) = unbounded();
    let service = state.start_downloads(
        session,
        selected,
        force,
        Arc::new(ChannelSink::new(sender)),
    )?;

    let mut printer = ProgressPrinter::stderr();
    for event in receiver.iter() {
        printer.render(&event)?;
    }
    let summary = service.join()?;
    printer.summary(&summary)?;
    if json {
        print_one(json, summary, |_| Vec::new())?;
    }

    if summary.failed > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn show_config(state: &AppState, json: bool) -> Result<ExitCode> {
    let manager = state.settings_manager();
    let settings = manager.read();
    let view = ConfigView {
        path: manager.path().display().to_string(),
        effective_base_url: state.base_url(),
        credentials: state.credentials().masked_summary(),
        settings,
    };
    print_one(json, view, |view| {
        let output_dir = view
            .settings
            .output_dir
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|| "(Downloads/LC Reports)".into());
        vec![
            format!("config:      {}", view.path),
            format!("base url:    {}", view.effective_base_url),
            format!("output dir:  {output_dir}"),
            format!("range days:  {}", view.settings.default_range_days),
            format!("timeout:     {}s", view.settings.request_timeout_secs),
            format!("credentials: {}", view.credentials),
        ]
    })?;
    Ok(ExitCode::SUCCESS)
}

fn report_row(report: &ReportDescriptor) -> String {
    let date = report
        .date
        .map(format_date)
        .unwrap_or_else(|| "-".into());
    format!("{date}  {}", report.name)
}
