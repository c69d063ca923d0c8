use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use shelfsync_core::data::{Database, load_catalog};
use shelfsync_core::jobs::{
    JobRunner, KIND_DISCOVER_PRODUCTS, KIND_PARSE_ALL, KIND_PARSE_FILTERED, KIND_PARSE_PRODUCTS,
    KIND_UPDATE_CATEGORIES,
};
use shelfsync_core::model::{CatalogEntry, ProductStatus, TaskStatus, tree_size};
use shelfsync_core::progress::{TaskRegistry, UnitTally};
use shelfsync_core::selection::ProductFilter;
use shelfsync_core::report::{
    ReportFormat, TaskReport, generate_json_report, generate_text_report, render_category_tree,
    save_report, task_line,
};
use shelfsync_core::settings::{DB_FILE, SETTINGS_FILE, Settings};
use shelfsync_scanner::{Fetcher, HttpExtractor};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Paths inside a shelfsync config directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub db_path: PathBuf,
    pub settings_path: PathBuf,
}

impl ConfigPaths {
    /// Resolve a config directory, expanding a leading `~`.
    pub fn resolve(dir: &str) -> Self {
        let expanded = shellexpand::tilde(dir);
        let config_dir = PathBuf::from(expanded.as_ref());
        Self {
            db_path: config_dir.join(DB_FILE),
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
        }
    }
}

/// Settings from the config directory with command-line overrides applied.
pub fn load_settings(paths: &ConfigPaths, endpoint: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(&paths.settings_path)
        .with_context(|| format!("reading {}", paths.settings_path.display()))?;
    if let Some(endpoint) = endpoint {
        settings.extraction_endpoint = Some(endpoint.to_string());
        settings.validate()?;
    }
    Ok(settings)
}

pub fn build_runner(paths: &ConfigPaths, settings: &Settings) -> Result<JobRunner> {
    if !Database::exists(&paths.db_path) {
        bail!(
            "no database at {} (run `shelfsync init` first)",
            paths.db_path.display()
        );
    }
    let db = Database::new(&paths.db_path)
        .with_context(|| format!("opening {}", paths.db_path.display()))?;

    let runner = JobRunner::new(Arc::new(db));

    // Without an endpoint only commands over stored data work; extraction
    // jobs fail and say so in their task.
    let Ok(endpoint) = settings.require_endpoint() else {
        return Ok(runner);
    };
    let fetcher = Fetcher::with_user_agent(settings.fetch_policy(), &settings.user_agent)?;
    let extractor = HttpExtractor::new(fetcher, endpoint)?
        .with_token(settings.token())
        .with_max_chars(settings.max_page_chars);
    Ok(runner.with_service(Arc::new(extractor)))
}

pub fn print_banner() {
    println!(
        "{} {}",
        "shelfsync".bright_cyan().bold(),
        env!("CARGO_PKG_VERSION").bright_black()
    );
    println!("{}", "catalog sync for competitor storefronts".bright_black());
    println!();
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> io::Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

fn spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(message.into());
    spinner
}

fn progress_bar(total: usize, label: &str) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.cyan} {prefix} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_prefix(label.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Mirror a task's registry progress onto a bar until aborted.
fn watch_task(registry: TaskRegistry, task_id: String, bar: ProgressBar) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match registry.get(&task_id) {
                Ok(Some(task)) => {
                    bar.set_length(task.total as u64);
                    bar.set_position(task.done as u64);
                    if !task.errors.is_empty() {
                        bar.set_message(format!("{} errors", task.errors.len()));
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Progress poll for {} failed: {}", task_id, e),
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    })
}

fn status_label(status: TaskStatus) -> colored::ColoredString {
    match status {
        TaskStatus::Running => status.as_str().yellow().bold(),
        TaskStatus::Finished => status.as_str().green().bold(),
        TaskStatus::Failed => status.as_str().red().bold(),
    }
}

fn print_task_outcome(registry: &TaskRegistry, task_id: &str) -> Result<()> {
    let task = registry
        .get(task_id)?
        .ok_or_else(|| anyhow!("task {} vanished from the registry", task_id))?;
    let mark = if task.status == TaskStatus::Failed {
        "✗".red().bold()
    } else {
        "✓".green().bold()
    };
    println!(
        "{} Task {} {} ({}/{})",
        mark,
        task.id.bright_white(),
        status_label(task.status),
        task.done,
        task.total
    );
    if let Some(summary) = &task.summary {
        for line in summary.lines() {
            println!("  {}", line);
        }
    }
    for error in task.errors.iter().take(5) {
        println!("  {} {}", "•".red(), error);
    }
    if task.errors.len() > 5 {
        println!(
            "  {} ... {} more (see `shelfsync task show {}`)",
            "•".red(),
            task.errors.len() - 5,
            task.id
        );
    }
    Ok(())
}

// Init

/// Create the config directory, the settings file and the database.
/// Existing files are replaced only with `overwrite`.
pub fn create_configuration_assets(paths: &ConfigPaths, overwrite: bool) -> Result<()> {
    println!("{} Creating directory structure...", "→".blue());
    fs::create_dir_all(&paths.config_dir)
        .with_context(|| format!("creating {}", paths.config_dir.display()))?;
    println!(
        "  {} {}",
        "✓".green(),
        paths.config_dir.display().to_string().bright_white()
    );

    if overwrite || !paths.settings_path.exists() {
        Settings::default().save(&paths.settings_path)?;
        println!(
            "  {} {}",
            "✓".green(),
            paths.settings_path.display().to_string().bright_white()
        );
    } else {
        println!(
            "  {} Keeping {}",
            "→".blue(),
            paths.settings_path.display().to_string().bright_white()
        );
    }

    if overwrite && Database::exists(&paths.db_path) {
        Database::drop(&paths.db_path)
            .with_context(|| format!("removing {}", paths.db_path.display()))?;
        println!("  {} Existing database removed", "✓".green().bold());
    }
    if !Database::exists(&paths.db_path) {
        Database::new(&paths.db_path)?;
        println!(
            "  {} {}",
            "✓".green(),
            paths.db_path.display().to_string().bright_white()
        );
    }
    Ok(())
}

pub fn handle_init(args: &ArgMatches) -> Result<()> {
    print_divider();
    println!("{}", "  SHELFSYNC INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let dir = args
        .get_one::<String>("PATH")
        .ok_or_else(|| anyhow!("missing config path"))?;
    let force = args.get_flag("force");
    let paths = ConfigPaths::resolve(dir);

    println!(
        "{} Target: {}",
        "→".blue(),
        paths.config_dir.display().to_string().bright_white()
    );
    println!();

    let mut overwrite = force;
    if !force && (Database::exists(&paths.db_path) || paths.settings_path.exists()) {
        println!("{}", "⚠ WARNING".yellow().bold());
        println!("An existing installation was found:");
        for path in [&paths.db_path, &paths.settings_path] {
            if path.exists() {
                println!(
                    "  {} {}",
                    "•".yellow(),
                    path.display().to_string().bright_white()
                );
            }
        }
        println!();

        let response = print_prompt("Overwrite it? This deletes all stored data. [y/N]:")?;
        println!();
        if response == "y" || response == "yes" {
            overwrite = true;
            println!("{} Proceeding with overwrite", "→".yellow().bold());
        } else {
            println!("{} Keeping existing files", "→".blue());
        }
        println!();
    }

    create_configuration_assets(&paths, overwrite)?;

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!();
    println!(
        "{} Set {} in {} before syncing.",
        "ℹ".blue(),
        "extraction_endpoint".bright_white(),
        paths.settings_path.display().to_string().bright_white()
    );
    println!();
    Ok(())
}

// Competitors

pub fn handle_competitor_add(args: &ArgMatches, runner: &JobRunner) -> Result<()> {
    let name = required(args, "name")?;
    let url = required(args, "url")?;
    let notes = args.get_one::<String>("notes").map(String::as_str);

    let competitor = runner.add_competitor(name, url, notes)?;
    println!(
        "{} Added competitor {} ({})",
        "✓".green().bold(),
        competitor.name.bright_white().bold(),
        competitor.url
    );
    println!("  {} id: {}", "→".blue(), competitor.id);
    Ok(())
}

pub fn handle_competitor_list(runner: &JobRunner) -> Result<()> {
    let competitors = runner.list_competitors()?;
    if competitors.is_empty() {
        println!("{} No competitors yet (add one with `shelfsync competitor add`)", "ℹ".blue());
        return Ok(());
    }
    for competitor in competitors {
        let synced = competitor
            .last_parsed
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{} {}  {}",
            "•".cyan(),
            competitor.name.bright_white().bold(),
            competitor.url
        );
        println!(
            "    id: {}  categories: {}  last sync: {}",
            competitor.id,
            tree_size(&competitor.categories),
            synced
        );
        if let Some(notes) = &competitor.notes {
            println!("    {}", notes.bright_black());
        }
    }
    Ok(())
}

// Categories

pub fn handle_categories_show(args: &ArgMatches, runner: &JobRunner) -> Result<()> {
    let key = required(args, "competitor")?;
    let competitor = runner
        .get_competitor(key)?
        .ok_or_else(|| anyhow!("competitor '{}' not found", key))?;

    println!(
        "{} ({} categories)",
        competitor.name.bright_white().bold(),
        tree_size(&competitor.categories)
    );
    print!("{}", render_category_tree(&competitor.categories));
    Ok(())
}

pub async fn handle_categories_sync(args: &ArgMatches, runner: &JobRunner) -> Result<()> {
    let competitor = required(args, "competitor")?;

    let task_id = runner.submit(KIND_UPDATE_CATEGORIES, 1)?;
    let spinner = spinner(format!("Syncing categories of {}...", competitor));
    let result = runner.run_category_sync(&task_id, competitor).await;
    spinner.finish_and_clear();

    print_task_outcome(runner.registry(), &task_id)?;
    result?;
    Ok(())
}

pub fn handle_categories_add(args: &ArgMatches, runner: &JobRunner) -> Result<()> {
    let competitor = required(args, "competitor")?;
    let name = required(args, "name")?;
    let url = required(args, "url")?;

    let node = runner.add_manual_category(competitor, name, url)?;
    println!(
        "{} Added category {} (id: {}) {}",
        "✓".green().bold(),
        node.name.bright_white().bold(),
        node.id,
        node.url
    );
    Ok(())
}

pub fn handle_categories_delete(args: &ArgMatches, runner: &JobRunner) -> Result<()> {
    let competitor = required(args, "competitor")?;
    let ids: Vec<String> = args
        .get_many::<String>("id")
        .map(|ids| ids.cloned().collect())
        .unwrap_or_default();

    let deleted = runner.delete_categories(competitor, &ids)?;
    if deleted < ids.len() {
        println!(
            "{} {} of {} ids did not match any category",
            "⚠".yellow().bold(),
            ids.len() - deleted,
            ids.len()
        );
    }
    println!("{} Deleted {} categories", "✓".green().bold(), deleted);
    Ok(())
}

// Discovery and parsing

pub async fn handle_discover(args: &ArgMatches, runner: &JobRunner) -> Result<()> {
    let competitor = required(args, "competitor")?;
    let categories: Vec<String> = args
        .get_many::<String>("category")
        .map(|ids| ids.cloned().collect())
        .unwrap_or_default();
    let follow_up = !args.get_flag("no-follow-up");

    let task_id = runner.submit(KIND_DISCOVER_PRODUCTS, categories.len())?;
    let bar = progress_bar(categories.len(), "categories");
    let watcher = watch_task(runner.registry().clone(), task_id.clone(), bar.clone());
    let result = runner
        .run_discovery(&task_id, competitor, &categories, follow_up)
        .await;
    watcher.abort();
    bar.finish_and_clear();

    print_task_outcome(runner.registry(), &task_id)?;
    let outcome = result?;

    for page in &outcome.pages {
        if page.is_success() {
            println!(
                "  {} {} ({}): {} new of {}",
                "✓".green(),
                page.page_name.bright_white(),
                page.kind.map(|k| k.as_str()).unwrap_or("unknown"),
                page.products_added,
                page.products_seen
            );
            for sub in &page.categories {
                println!("      {} sub-category {} {}", "→".blue(), sub.name, sub.url.bright_black());
            }
        }
    }

    if let Some(follow_up) = outcome.follow_up {
        println!();
        println!(
            "{} Parsing {} new products (task {})",
            "→".blue(),
            follow_up.product_ids.len(),
            follow_up.task_id
        );
        let bar = progress_bar(follow_up.product_ids.len(), "products");
        let watcher = watch_task(runner.registry().clone(), follow_up.task_id.clone(), bar.clone());
        let joined = follow_up.handle.await;
        watcher.abort();
        bar.finish_and_clear();

        print_task_outcome(runner.registry(), &follow_up.task_id)?;
        joined.context("detail parse task panicked")??;
    }
    Ok(())
}

/// Ids of entries that have never been parsed.
pub fn pending_product_ids(catalog: &[CatalogEntry]) -> Vec<String> {
    catalog
        .iter()
        .filter(|p| p.status == ProductStatus::Pending)
        .map(|p| p.id.clone())
        .collect()
}

/// Drive a parse job behind a progress bar, then print its outcome.
async fn run_parse_job(
    runner: &JobRunner,
    task_id: &str,
    total: usize,
    job: impl Future<Output = shelfsync_core::Result<UnitTally>>,
) -> Result<()> {
    let bar = progress_bar(total, "products");
    let watcher = watch_task(runner.registry().clone(), task_id.to_string(), bar.clone());
    let result = job.await;
    watcher.abort();
    bar.finish_and_clear();

    print_task_outcome(runner.registry(), task_id)?;
    result?;
    Ok(())
}

fn print_nothing_to_parse() {
    println!("{} Nothing to parse", "ℹ".blue());
}

pub async fn handle_parse(args: &ArgMatches, runner: &JobRunner) -> Result<()> {
    if args.get_flag("all") {
        let total = load_catalog(runner.store())?.len();
        if total == 0 {
            print_nothing_to_parse();
            return Ok(());
        }
        let task_id = runner.submit(KIND_PARSE_ALL, total)?;
        return run_parse_job(runner, &task_id, total, runner.run_parse_all(&task_id)).await;
    }

    if args.get_flag("filter") {
        let filter = filter_from_args(args)?;
        let total = runner.select_products(&filter)?.len();
        if total == 0 {
            print_nothing_to_parse();
            return Ok(());
        }
        let task_id = runner.submit(KIND_PARSE_FILTERED, total)?;
        return run_parse_job(
            runner,
            &task_id,
            total,
            runner.run_parse_filtered(&task_id, &filter),
        )
        .await;
    }

    let ids: Vec<String> = if args.get_flag("pending") {
        pending_product_ids(&load_catalog(runner.store())?)
    } else {
        args.get_many::<String>("product")
            .map(|ids| ids.cloned().collect())
            .unwrap_or_default()
    };
    if ids.is_empty() {
        print_nothing_to_parse();
        return Ok(());
    }
    let task_id = runner.submit(KIND_PARSE_PRODUCTS, ids.len())?;
    run_parse_job(runner, &task_id, ids.len(), runner.run_detail_parse(&task_id, &ids)).await
}

/// Build a catalog filter from the shared selection arguments.
pub fn filter_from_args(args: &ArgMatches) -> Result<ProductFilter> {
    let mut filter = ProductFilter::new();
    if let Some(name) = args.get_one::<String>("name") {
        filter = filter.with_name(name);
    }
    if let Some(competitor) = args.get_one::<String>("competitor") {
        filter = filter.with_competitor(competitor);
    }
    if let Some(ids) = args.get_many::<String>("category") {
        for id in ids {
            filter = filter.with_category(id);
        }
    }
    if let Some(status) = args.get_one::<String>("status") {
        let status =
            ProductStatus::parse(status).ok_or_else(|| anyhow!("unknown status '{}'", status))?;
        filter = filter.with_status(status);
    }
    if let Some(availability) = args.get_one::<String>("availability") {
        filter = filter.with_availability(availability);
    }
    let from = args.get_one::<f64>("price-from").copied();
    let to = args.get_one::<f64>("price-to").copied();
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            bail!("--price-from {} is above --price-to {}", from, to);
        }
    }
    filter = filter.with_price_range(from, to);
    if args.get_flag("problematic") {
        filter = filter.only_problematic();
    }
    Ok(filter)
}

pub fn handle_catalog_list(args: &ArgMatches, runner: &JobRunner) -> Result<()> {
    let filter = filter_from_args(args)?;
    let entries = runner.select_products(&filter)?;

    if entries.is_empty() {
        println!("{} No catalog entries", "ℹ".blue());
        return Ok(());
    }
    for entry in &entries {
        let price = entry
            .price
            .map(|p| format!("{:.2}", p))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<9} {:>10}  {}  {}",
            entry.id,
            entry.status.as_str(),
            price,
            entry.name.bright_white(),
            entry.url.bright_black()
        );
    }
    println!();
    println!("{} {} entries", "ℹ".blue(), entries.len());
    Ok(())
}

pub fn handle_catalog_add(args: &ArgMatches, runner: &JobRunner) -> Result<()> {
    let url = required(args, "url")?;
    let name = args.get_one::<String>("name").map(String::as_str).unwrap_or_default();
    let competitor = args.get_one::<String>("competitor").map(String::as_str);

    let entry = runner.add_product(name, url, competitor)?;
    println!(
        "{} Added product {} {}",
        "✓".green().bold(),
        entry.name.bright_white().bold(),
        entry.url
    );
    println!("  {} id: {}", "→".blue(), entry.id);
    println!(
        "  {} parse it with `shelfsync parse -p {}`",
        "→".blue(),
        entry.id
    );
    Ok(())
}

// Tasks

pub fn handle_task_show(args: &ArgMatches, runner: &JobRunner) -> Result<()> {
    let id = required(args, "ID")?;
    let format = args
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let task = runner
        .registry()
        .get(id)?
        .ok_or_else(|| anyhow!("task {} not found", id))?;

    let report = TaskReport::from_task(&task);
    let content = match format {
        ReportFormat::Text => generate_text_report(&report),
        ReportFormat::Json => generate_json_report(&report)?,
    };

    match args.get_one::<PathBuf>("output") {
        Some(path) => {
            save_report(&content, path).with_context(|| format!("writing {}", path.display()))?;
            println!(
                "{} Report written to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => print!("{}", content),
    }
    Ok(())
}

pub fn handle_task_list(runner: &JobRunner) -> Result<()> {
    let tasks = runner.registry().list()?;
    if tasks.is_empty() {
        println!("{} No tasks yet", "ℹ".blue());
        return Ok(());
    }
    for task in &tasks {
        println!("{}", task_line(task));
    }
    Ok(())
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing --{}", name))
}
