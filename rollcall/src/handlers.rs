use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rollcall_core::config::{ApiConfigPatch, ConfigForm, preset, preset_domains};
use rollcall_core::ingest::load_profiles_file;
use rollcall_core::{
    Command, GeneralSettings, JsonFileExporter, Reply, RunOutcome, ScrapeService, Scraper, SqliteStore,
    StatusSnapshot,
};
use rollcall_scanner::{ApiType, HttpTransport, PersonIdentifier};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

pub const DEFAULT_DATA_DIR: &str = "~/.config/rollcall/";
pub const DATABASE_FILE: &str = "rollcall.db";

/// Expand `~` in the `--db` argument.
pub fn resolve_data_dir(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DATABASE_FILE)
}

pub fn default_export_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("exports")
}

pub fn data_dir_from(args: &ArgMatches) -> PathBuf {
    let raw = args
        .get_one::<String>("db")
        .map(String::as_str)
        .unwrap_or(DEFAULT_DATA_DIR);
    resolve_data_dir(raw)
}

/// Default filter when `RUST_LOG` is unset.
pub fn log_filter(verbose: bool) -> &'static str {
    if verbose {
        "warn,rollcall=debug,rollcall_core=debug,rollcall_scanner=debug"
    } else {
        "warn,rollcall=info,rollcall_core=info,rollcall_scanner=info"
    }
}

pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn read_profiles_file(path: &Path) -> Result<Vec<PersonIdentifier>> {
    load_profiles_file(path).with_context(|| format!("Failed to load profiles from {}", path.display()))
}

/// Label/value pairs for the status report.
pub fn status_lines(status: &StatusSnapshot) -> Vec<(&'static str, String)> {
    let state = if status.is_running {
        "running"
    } else if status.is_paused {
        "paused"
    } else {
        "idle"
    };
    vec![
        ("State", state.to_string()),
        (
            "Progress",
            format!("{}/{}", status.current_index, status.total_profiles),
        ),
        ("Results", status.total_results.to_string()),
        ("Succeeded", status.success_count.to_string()),
        ("Failed", status.error_count.to_string()),
        ("API", status.api_config.api_type.as_str().to_string()),
        ("Domain", status.api_config.target_domain.clone()),
        ("Endpoint", status.api_config.endpoint.clone()),
    ]
}

pub fn progress_message(status: &StatusSnapshot) -> String {
    format!("{} ok, {} failed", status.success_count, status.error_count)
}

/// Collect the `config` subcommand flags. The API type falls back to the
/// preset's, then to the currently configured one, so type-specific flags
/// are not dropped when `--api-type` is omitted.
pub fn config_form_from_args(args: &ArgMatches, current_type: ApiType) -> Result<ConfigForm> {
    let text = |name: &str| args.get_one::<String>(name).cloned();

    let preset_domain = text("preset");
    let preset_type = match &preset_domain {
        Some(domain) => match preset(domain) {
            Some(config) => Some(config.api_type),
            None => bail!(
                "Unknown preset '{}'. Available: {}",
                domain,
                preset_domains().join(", ")
            ),
        },
        None => None,
    };
    let api_type = match text("api-type") {
        Some(raw) => ApiType::from_str(&raw),
        None => None,
    };

    Ok(ConfigForm {
        api_type: Some(api_type.or(preset_type).unwrap_or(current_type)),
        endpoint: args.get_one::<Url>("endpoint").map(|url| url.to_string()),
        target_domain: preset_domain.or_else(|| text("target-domain")),
        method: text("method"),
        event_path: text("event-path"),
        operation_name: text("operation-name"),
        sha256_hash: text("sha256-hash"),
        event_id: text("event-id"),
        client_version: text("client-version"),
        auth_token: text("auth-token"),
        session_cookies: text("cookies"),
        dynamic_params: text("dynamic-params"),
        custom_headers: text("headers"),
    })
}

fn has_config_updates(args: &ArgMatches) -> bool {
    [
        "preset",
        "api-type",
        "endpoint",
        "target-domain",
        "method",
        "event-path",
        "operation-name",
        "sha256-hash",
        "event-id",
        "client-version",
        "auth-token",
        "cookies",
        "dynamic-params",
        "headers",
    ]
    .iter()
    .any(|name| args.contains_id(name))
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_header(title: &str, quiet: bool) {
    if quiet {
        return;
    }
    print_divider();
    println!("{}", format!("  {}", title).bright_white().bold());
    print_divider();
    println!();
}

fn print_status(status: &StatusSnapshot) {
    for (label, value) in status_lines(status) {
        println!("  {:<10} {}", format!("{}:", label).blue(), value.bright_white());
    }
}

fn open_scraper(data_dir: &Path, timeout_secs: u64) -> Result<Scraper> {
    let db_path = database_path(data_dir);
    if !SqliteStore::exists(&db_path) {
        bail!(
            "No database at {}. Run `rollcall init` first.",
            db_path.display()
        );
    }
    let store = SqliteStore::new(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let transport = HttpTransport::with_timeout(timeout_secs).context("Failed to build HTTP client")?;

    let mut scraper = Scraper::new(Arc::new(transport), Box::new(store));
    scraper.initialize().context("Failed to restore saved state")?;
    Ok(scraper)
}

pub fn handle_init(args: &ArgMatches, data_dir: &Path, quiet: bool) -> Result<()> {
    print_header("ROLLCALL INITIALIZATION", quiet);

    let force = args.get_flag("force");
    let db_path = database_path(data_dir);

    println!(
        "{} Target: {}",
        "→".blue(),
        data_dir.display().to_string().bright_white()
    );
    fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    fs::create_dir_all(default_export_dir(data_dir)).context("Failed to create exports directory")?;

    if SqliteStore::exists(&db_path) {
        if force {
            println!(
                "{} Deleting existing database (force mode)",
                "→".yellow().bold()
            );
            SqliteStore::drop(&db_path).context("Failed to remove existing database")?;
        } else {
            println!("{}", "⚠ WARNING".yellow().bold());
            println!(
                "Database already exists at {}. Use --force to start over.",
                db_path.display().to_string().bright_white()
            );
            return Ok(());
        }
    }

    SqliteStore::new(&db_path).context("Failed to create database")?;
    println!(
        "{} Database initialized: {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );
    Ok(())
}

pub fn handle_load(args: &ArgMatches, data_dir: &Path) -> Result<()> {
    let Some(path) = args.get_one::<PathBuf>("FILE") else {
        bail!("A profile file is required");
    };
    let profiles = read_profiles_file(path)?;

    let mut scraper = open_scraper(data_dir, 30)?;
    let count = scraper.load_profiles(profiles).context("Failed to save profiles")?;
    println!(
        "{} Loaded {} profiles from {}",
        "✓".green().bold(),
        count.to_string().cyan(),
        path.display().to_string().bright_white()
    );
    Ok(())
}

pub fn handle_config(args: &ArgMatches, data_dir: &Path, quiet: bool) -> Result<()> {
    let mut scraper = open_scraper(data_dir, 30)?;

    if has_config_updates(args) {
        let form = config_form_from_args(args, scraper.api_config().api_type)?;
        let patch = ApiConfigPatch::from_form(&form)?;
        scraper.update_api_config(&patch).context("Failed to save API config")?;
        println!("{} API configuration updated", "✓".green().bold());
    }

    print_header("API CONFIGURATION", quiet);
    let rendered =
        serde_json::to_string_pretty(scraper.api_config()).context("Failed to render API config")?;
    println!("{}", rendered);
    Ok(())
}

pub fn handle_settings(args: &ArgMatches, data_dir: &Path) -> Result<()> {
    let delay = args.get_one::<u64>("delay").copied();
    let settings = GeneralSettings { delay };

    let mut scraper = open_scraper(data_dir, 30)?;
    scraper.update_settings(settings).context("Failed to save settings")?;
    println!(
        "{} Delay between profiles: {} ms",
        "✓".green().bold(),
        settings.delay_ms().to_string().cyan()
    );
    Ok(())
}

pub fn handle_status(data_dir: &Path, quiet: bool) -> Result<()> {
    let scraper = open_scraper(data_dir, 30)?;
    print_header("SCRAPE STATUS", quiet);
    print_status(&scraper.status());
    Ok(())
}

pub fn handle_export(args: &ArgMatches, data_dir: &Path) -> Result<()> {
    let output = args
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(|| default_export_dir(data_dir));

    let scraper = open_scraper(data_dir, 30)?.with_exporter(Box::new(JsonFileExporter::new(&output)));
    match scraper.export().context("Export failed")? {
        Some(receipt) => println!(
            "{} Exported {} results to {}",
            "✓".green().bold(),
            receipt.count.to_string().cyan(),
            receipt.path.display().to_string().bright_white()
        ),
        None => println!("{} Nothing was exported", "✗".red().bold()),
    }
    Ok(())
}

pub fn handle_presets() {
    for domain in preset_domains() {
        if let Some(config) = preset(domain) {
            println!(
                "{} {:<20} {:<8} {}",
                "•".blue(),
                domain.bright_white().bold(),
                config.api_type.as_str().cyan(),
                config.endpoint
            );
        }
    }
}

pub async fn handle_run(args: &ArgMatches, data_dir: &Path, quiet: bool) -> Result<()> {
    let timeout = args.get_one::<u64>("timeout").copied().unwrap_or(30);
    let output = args
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(|| default_export_dir(data_dir));

    let scraper =
        open_scraper(data_dir, timeout)?.with_exporter(Box::new(JsonFileExporter::new(&output)));
    let initial = scraper.status();
    if initial.total_profiles == 0 {
        bail!("No profiles loaded. Run `rollcall load <FILE>` first.");
    }

    print_header("SCRAPING", quiet);
    if !quiet {
        println!(
            "{} {} {} profiles, resuming at {}",
            "→".blue(),
            initial.api_config.target_domain.bright_white(),
            initial.total_profiles.to_string().cyan(),
            initial.current_index.to_string().cyan()
        );
        println!("{} Press Ctrl-C to pause", "ℹ".blue());
        println!();
    }

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(initial.total_profiles as u64)
    };
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    progress.set_position(initial.current_index as u64);
    progress.enable_steady_tick(Duration::from_millis(100));

    let mut service = ScrapeService::new(scraper);
    let control = service.control();

    let mut updates = service.subscribe();
    let progress_task = {
        let progress = progress.clone();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let status = updates.borrow_and_update().clone();
                progress.set_position(status.current_index as u64);
                progress.set_message(progress_message(&status));
            }
        })
    };
    let interrupt_task = {
        let progress = progress.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                progress.println(format!(
                    "{} Pausing after the current profile...",
                    "→".yellow().bold()
                ));
                control.request_pause();
            }
        })
    };

    if let Reply::Ack { error: Some(error), .. } = service.handle(Command::StartScraping).await {
        bail!("Failed to start: {}", error);
    }
    let outcome = service.wait().await.context("Scrape run failed")?;

    interrupt_task.abort();
    progress_task.abort();
    progress.finish_and_clear();

    let status = service.status();
    info!(
        outcome = ?outcome,
        current_index = status.current_index,
        total = status.total_profiles,
        "run finished"
    );
    match outcome {
        Some(RunOutcome::Completed) => println!("{} Scrape complete", "✓".green().bold()),
        Some(RunOutcome::Paused) => println!(
            "{} Paused at {}/{}. Run `rollcall run` again to resume.",
            "→".yellow().bold(),
            status.current_index,
            status.total_profiles
        ),
        Some(RunOutcome::Stopped) => println!("{} Scrape stopped", "✗".red().bold()),
        Some(RunOutcome::NoProfiles) | None => {
            println!("{} Nothing to scrape", "✗".red().bold())
        }
        Some(RunOutcome::AlreadyRunning) => {
            println!("{} A run is already in progress", "✗".red().bold())
        }
    }
    print_status(&status);
    if status.total_results > 0 {
        println!();
        println!(
            "{} Results exported under {}",
            "✓".green().bold(),
            output.display().to_string().bright_white()
        );
    }
    Ok(())
}
