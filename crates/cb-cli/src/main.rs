//! ContentBlocker CLI
//!
//! CLI tool for checking requests against filter lists and managing the
//! profiles of a data directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cb_compiler::{compile_filter_list, compute_checksum, find_checksum, validate_checksum, ChecksumStatus};
use cb_core::types::{Request, RequestType};
use cb_engine::{
    ContentBlockingManager, EngineConfig, HttpFetcher, ProfileCategory, ProfileMetadata, ProfileSource,
    ProfileStorage, ProfileStore, Updater,
};

#[derive(Parser)]
#[command(name = "cb-cli")]
#[command(about = "ContentBlocker filter list engine and tools")]
struct Cli {
    /// Engine config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overrides the config
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a request
    Check {
        /// Request URL
        url: String,

        /// URL of the document making the request
        #[arg(short = 'D', long, default_value = "")]
        document: String,

        /// Resource type (script, image, stylesheet, sub_frame, ...)
        #[arg(short = 't', long = "type", default_value = "other")]
        resource_type: String,

        /// Filter list files to use instead of the stored profiles
        #[arg(short, long)]
        list: Vec<PathBuf>,
    },

    /// Print the element hiding selectors for a domain
    Cosmetic {
        domain: String,

        /// Filter list files to use instead of the stored profiles
        #[arg(short, long)]
        list: Vec<PathBuf>,
    },

    /// Compile a filter list and report statistics
    Inspect {
        input: PathBuf,

        /// Print every rejected line
        #[arg(short, long)]
        errors: bool,
    },

    /// Validate the checksum directive of a filter list
    Verify { input: PathBuf },

    /// List stored profiles
    Profiles {
        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// Subscribe to a filter list
    Add {
        id: String,

        /// Local list file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Update URL
        #[arg(short, long)]
        url: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, default_value = "other", value_parser = parse_category)]
        category: ProfileCategory,

        /// Days between updates, 0 = never
        #[arg(long, default_value_t = 0)]
        interval: u32,
    },

    /// Remove a profile
    Remove { id: String },

    /// Edit the Custom Rules profile
    Custom {
        #[command(subcommand)]
        action: CustomAction,
    },

    /// Fetch updates for one profile, or all that are due
    Update {
        /// Profile to update; omitted means every due profile
        id: Option<String>,
    },

    /// Enable a profile
    Enable { id: String },

    /// Disable a profile
    Disable { id: String },
}

#[derive(Subcommand)]
enum CustomAction {
    /// Add rules
    Add { rules: Vec<String> },
    /// Remove rules
    Remove { rules: Vec<String> },
    /// Remove every custom rule
    Clear,
    /// Print the custom rules
    Show,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match load_config(&cli) {
        Ok(config) => run(cli.command, config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<EngineConfig, String> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)
            .map_err(|e| format!("Failed to load config '{}': {}", path.display(), e))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    config
        .init_public_suffix_list()
        .map_err(|e| format!("Failed to load public suffix list: {e}"))?;
    Ok(config)
}

async fn run(command: Commands, config: EngineConfig) -> Result<(), String> {
    match command {
        Commands::Check {
            url,
            document,
            resource_type,
            list,
        } => cmd_check(&config, &url, &document, &resource_type, &list),
        Commands::Cosmetic { domain, list } => cmd_cosmetic(&config, &domain, &list),
        Commands::Inspect { input, errors } => cmd_inspect(&input, errors),
        Commands::Verify { input } => cmd_verify(&input),
        Commands::Profiles { json } => cmd_profiles(&config, json),
        Commands::Add {
            id,
            file,
            url,
            title,
            category,
            interval,
        } => {
            let mut metadata = ProfileMetadata::new(id);
            metadata.title = title.unwrap_or_default();
            metadata.category = category;
            metadata.update_url = url;
            metadata.update_interval_days = interval;
            cmd_add(&config, metadata, file.as_deref()).await
        }
        Commands::Remove { id } => cmd_remove(&config, &id),
        Commands::Custom { action } => cmd_custom(&config, action),
        Commands::Update { id } => cmd_update(&config, id.as_deref()).await,
        Commands::Enable { id } => cmd_set_enabled(&config, &id, true),
        Commands::Disable { id } => cmd_set_enabled(&config, &id, false),
    }
}

fn parse_category(s: &str) -> Result<ProfileCategory, String> {
    serde_json::from_value(serde_json::Value::String(s.to_ascii_lowercase()))
        .map_err(|_| format!("unknown category '{s}'"))
}

fn open_storage(config: &EngineConfig) -> ProfileStorage {
    ProfileStorage::new(&config.data_dir)
}

fn load_stored(config: &EngineConfig) -> Result<(ProfileStorage, ProfileStore), String> {
    let storage = open_storage(config);
    let store = storage
        .load_store()
        .map_err(|e| format!("Failed to load profiles from '{}': {}", config.data_dir.display(), e))?;
    Ok((storage, store))
}

fn save(storage: &ProfileStorage, store: &ProfileStore) -> Result<(), String> {
    storage
        .persist(store)
        .map_err(|e| format!("Failed to save profiles to '{}': {}", storage.root().display(), e))
}

/// Stored profiles, or an ad-hoc store built from `lists`.
fn build_manager(config: &EngineConfig, lists: &[PathBuf]) -> Result<ContentBlockingManager, String> {
    let store = if lists.is_empty() {
        load_stored(config)?.1
    } else {
        let store = ProfileStore::new();
        for (i, path) in lists.iter().enumerate() {
            let text = read_text(path)?;
            let mut id = list_identifier(path);
            if id.is_empty() || store.get(&id).is_some() {
                id = format!("list{i}");
            }
            store
                .add_profile(ProfileSource {
                    metadata: ProfileMetadata::new(id),
                    text,
                })
                .map_err(|e| format!("Failed to load '{}': {}", path.display(), e))?;
        }
        store
    };
    Ok(ContentBlockingManager::new(Arc::new(store), config.cosmetic_cache_capacity))
}

/// Profile identifier derived from a list's file name.
fn list_identifier(path: &Path) -> String {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    stem.trim_start_matches('.')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '-' })
        .collect()
}

fn read_text(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))
}

fn cmd_check(config: &EngineConfig, url: &str, document: &str, resource_type: &str, lists: &[PathBuf]) -> Result<(), String> {
    let manager = build_manager(config, lists)?;
    let request = Request::new(url, document, RequestType::from_str(resource_type));

    let start = Instant::now();
    let decision = manager.evaluate(&request);
    let elapsed = start.elapsed();

    println!("URL:      {}", url);
    println!("Document: {}", if document.is_empty() { "(none)" } else { document });
    println!("Type:     {}", resource_type);
    println!("Decision: {}", if decision.is_blocked { "BLOCK" } else { "ALLOW" });
    if let Some(rule) = decision.matched_rule {
        println!("Rule:     {} ({})", rule.rule_text, rule.profile_id);
    }
    println!("Time:     {:.1}µs", elapsed.as_secs_f64() * 1_000_000.0);

    Ok(())
}

fn cmd_cosmetic(config: &EngineConfig, domain: &str, lists: &[PathBuf]) -> Result<(), String> {
    let manager = build_manager(config, lists)?;
    let selectors = manager.cosmetic_selectors_for(domain);

    println!("{} selectors for {}", selectors.len(), domain);
    for selector in selectors {
        println!("  {}", selector);
    }
    Ok(())
}

fn cmd_inspect(input: &Path, show_errors: bool) -> Result<(), String> {
    let content = read_text(input)?;

    let start = Instant::now();
    let compiled = compile_filter_list(&content);
    let elapsed = start.elapsed();
    let stats = compiled.stats;

    println!("Filter list: {}", input.display());
    if let Some(title) = &compiled.metadata.title {
        println!("  Title:     {}", title);
    }
    if let Some(version) = &compiled.metadata.version {
        println!("  Version:   {}", version);
    }
    if let Some(expires) = compiled.metadata.expires_after() {
        println!("  Expires:   {:.1} days", expires.as_secs_f64() / 86_400.0);
    }
    println!("  Lines:     {}", stats.lines);
    println!(
        "  Network:   {} ({} exceptions, {} unindexed)",
        stats.network_rules,
        compiled.index.exception_count(),
        stats.unindexed
    );
    println!("  Cosmetic:  {}", stats.cosmetic_rules);
    println!("  Rejected:  {}", stats.rejected);
    println!("  Deduped:   {}", stats.deduped);
    println!("  Time:      {:.1}ms", elapsed.as_secs_f64() * 1000.0);

    if show_errors {
        for error in &compiled.errors {
            println!("  line {}: {} ({})", error.line_number, error.line, error.error);
        }
    }

    Ok(())
}

fn cmd_verify(input: &Path) -> Result<(), String> {
    let content = read_text(input)?;

    match validate_checksum(&content) {
        Ok(ChecksumStatus::Verified) => {
            println!("Checksum OK: {}", find_checksum(&content).unwrap_or_default());
            Ok(())
        }
        Ok(ChecksumStatus::Absent) => {
            println!("No checksum directive (content hashes to {})", compute_checksum(&content));
            Ok(())
        }
        Err(e) => Err(e.to_string()),
    }
}

fn cmd_profiles(config: &EngineConfig, json: bool) -> Result<(), String> {
    let (_, store) = load_stored(config)?;
    let profiles = store.list_profiles();

    if json {
        let out = serde_json::to_string_pretty(&profiles).map_err(|e| e.to_string())?;
        println!("{out}");
        return Ok(());
    }

    println!("{} profiles in {}", profiles.len(), config.data_dir.display());
    for p in profiles {
        let last_update = p
            .last_update
            .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  [{}] {:<20} {:<30} {:<15} network: {:>6}  cosmetic: {:>6}  errors: {:>4}  updated: {}",
            if p.enabled { "x" } else { " " },
            p.identifier,
            p.title,
            p.category.as_str(),
            p.network_rules,
            p.cosmetic_rules,
            p.parse_errors,
            last_update
        );
    }
    Ok(())
}

async fn cmd_add(config: &EngineConfig, metadata: ProfileMetadata, file: Option<&Path>) -> Result<(), String> {
    let (storage, store) = load_stored(config)?;
    let id = metadata.identifier.clone();
    let fetch_now = file.is_none() && metadata.update_url.is_some();

    let text = match file {
        Some(path) => read_text(path)?,
        None if fetch_now => String::new(),
        None => return Err("Either --file or --url is required".to_string()),
    };

    let summary = store
        .add_profile(ProfileSource { metadata, text })
        .map_err(|e| e.to_string())?;
    println!("Added profile '{}' ({} network, {} cosmetic rules)", id, summary.network_rules, summary.cosmetic_rules);

    let store = Arc::new(store);
    if fetch_now {
        let fetcher = HttpFetcher::new(config).map_err(|e| e.to_string())?;
        let updater = Updater::new(Arc::clone(&store), fetcher);
        match updater.trigger_update(&id).await {
            Ok(report) => println!(
                "Downloaded '{}': {} network, {} cosmetic rules",
                id, report.summary.network_rules, report.summary.cosmetic_rules
            ),
            Err(e) => eprintln!("Warning: initial download failed: {e}"),
        }
    }

    save(&storage, &store)
}

fn cmd_remove(config: &EngineConfig, id: &str) -> Result<(), String> {
    let (storage, store) = load_stored(config)?;
    store.remove_profile(id).map_err(|e| e.to_string())?;
    save(&storage, &store)?;
    storage.remove_rules(id).map_err(|e| e.to_string())?;
    println!("Removed profile '{}'", id);
    Ok(())
}

fn cmd_custom(config: &EngineConfig, action: CustomAction) -> Result<(), String> {
    let (storage, store) = load_stored(config)?;

    match action {
        CustomAction::Add { rules } => {
            let added = store.add_custom_rule(&rules.join("\n")).map_err(|e| e.to_string())?;
            println!("Added {} custom rules", added);
        }
        CustomAction::Remove { rules } => {
            let removed = store.remove_custom_rule(&rules.join("\n")).map_err(|e| e.to_string())?;
            println!("Removed {} custom rules", removed);
        }
        CustomAction::Clear => {
            store.clear_custom_rules().map_err(|e| e.to_string())?;
            println!("Cleared custom rules");
        }
        CustomAction::Show => {
            for line in store.custom_profile().lines() {
                println!("{}", line);
            }
            return Ok(());
        }
    }

    save(&storage, &store)
}

async fn cmd_update(config: &EngineConfig, id: Option<&str>) -> Result<(), String> {
    let (storage, store) = load_stored(config)?;
    let store = Arc::new(store);
    let fetcher = HttpFetcher::new(config).map_err(|e| e.to_string())?;
    let updater = Updater::new(Arc::clone(&store), fetcher);

    let results = match id {
        Some(id) => vec![(id.to_string(), updater.trigger_update(id).await)],
        None => updater.update_due(chrono::Utc::now()).await,
    };

    if results.is_empty() {
        println!("No profiles due for update");
        return Ok(());
    }

    let mut failed = 0usize;
    for (id, result) in &results {
        match result {
            Ok(report) => {
                let checksum = match report.checksum {
                    ChecksumStatus::Verified => "checksum verified",
                    ChecksumStatus::Absent => "no checksum",
                };
                println!(
                    "  {:<20} updated: {} network, {} cosmetic rules ({})",
                    id, report.summary.network_rules, report.summary.cosmetic_rules, checksum
                );
            }
            Err(e) => {
                failed += 1;
                println!("  {:<20} FAILED: {}", id, e);
            }
        }
    }

    save(&storage, &store)?;

    if failed > 0 {
        return Err(format!("{} of {} updates failed", failed, results.len()));
    }
    Ok(())
}

fn cmd_set_enabled(config: &EngineConfig, id: &str, enabled: bool) -> Result<(), String> {
    let (storage, store) = load_stored(config)?;
    store.set_enabled(id, enabled).map_err(|e| e.to_string())?;
    save(&storage, &store)?;
    println!("Profile '{}' {}", id, if enabled { "enabled" } else { "disabled" });
    Ok(())
}
