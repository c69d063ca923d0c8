use clap::ArgMatches;
use colored::Colorize;
use commands::command_argument_builder;
use shelfsync::handlers::*;
use tracing::Level;

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        // No subcommand provided, just show the banner
        return;
    }

    if let Err(e) = dispatch(&chosen_command).await {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

async fn dispatch(matches: &ArgMatches) -> anyhow::Result<()> {
    if let Some(("init", primary_command)) = matches.subcommand() {
        init_tracing("info", 0);
        return handle_init(primary_command);
    }

    let config_dir = matches
        .get_one::<String>("config-dir")
        .map(String::as_str)
        .unwrap_or(shelfsync_core::settings::DEFAULT_CONFIG_DIR);
    let paths = ConfigPaths::resolve(config_dir);
    let endpoint = matches.get_one::<String>("endpoint").map(String::as_str);
    let settings = load_settings(&paths, endpoint)?;
    init_tracing(&settings.log_level, matches.get_count("verbose"));

    let runner = build_runner(&paths, &settings)?;
    run_command(matches, &runner).await
}

async fn run_command(
    matches: &ArgMatches,
    runner: &shelfsync_core::jobs::JobRunner,
) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("competitor", primary_command)) => match primary_command.subcommand() {
            Some(("add", secondary_command)) => handle_competitor_add(secondary_command, runner),
            Some(("list", _)) => handle_competitor_list(runner),
            _ => unreachable!("clap should ensure we don't get here"),
        },
        Some(("categories", primary_command)) => match primary_command.subcommand() {
            Some(("show", secondary_command)) => handle_categories_show(secondary_command, runner),
            Some(("sync", secondary_command)) => {
                handle_categories_sync(secondary_command, runner).await
            }
            Some(("add", secondary_command)) => handle_categories_add(secondary_command, runner),
            Some(("delete", secondary_command)) => {
                handle_categories_delete(secondary_command, runner)
            }
            _ => unreachable!("clap should ensure we don't get here"),
        },
        Some(("discover", primary_command)) => handle_discover(primary_command, runner).await,
        Some(("parse", primary_command)) => handle_parse(primary_command, runner).await,
        Some(("catalog", primary_command)) => match primary_command.subcommand() {
            Some(("list", secondary_command)) => handle_catalog_list(secondary_command, runner),
            Some(("add", secondary_command)) => handle_catalog_add(secondary_command, runner),
            _ => unreachable!("clap should ensure we don't get here"),
        },
        Some(("task", primary_command)) => match primary_command.subcommand() {
            Some(("show", secondary_command)) => handle_task_show(secondary_command, runner),
            Some(("list", _)) => handle_task_list(runner),
            _ => unreachable!("clap should ensure we don't get here"),
        },
        _ => unreachable!("clap should ensure we don't get here"),
    }
}

/// Log to stderr at the configured level; each `-v` raises it one step.
fn init_tracing(level: &str, verbose: u8) {
    let base = level.parse::<Level>().unwrap_or(Level::INFO);
    let level = match verbose {
        0 => base,
        1 => Level::DEBUG.max(base),
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
