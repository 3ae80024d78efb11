use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use wikiscout_core::catalog::CatalogClient;
use wikiscout_core::config::{DEFAULT_CONFIG_FILENAME, ScoutConfig, load_config};
use wikiscout_core::discovery::discover_project;
use wikiscout_core::http::ReqwestFetcher;
use wikiscout_core::registry::{MergeReport, RegistryStore};
use wikiscout_core::template::CandidateUrl;
use wikiscout_core::verify::{EndpointVerifier, ProbeOutcome, VerificationReport};

#[derive(Debug, Parser)]
#[command(
    name = "wikiscout",
    version,
    about = "Discover, verify and register MediaWiki API endpoints"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH", help = "Registry CSV file")]
    registry: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Log probe attempts")]
    verbose: bool,
    #[arg(short, long, global = true, help = "Only log errors")]
    quiet: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "List projects known to the catalog")]
    Projects,
    #[command(about = "Find and verify the API endpoints of a project's wikis")]
    Discover(DiscoverArgs),
    #[command(about = "Probe candidate base URLs for an API endpoint")]
    Verify(VerifyArgs),
    Registry(RegistryArgs),
}

#[derive(Debug, Args)]
struct DiscoverArgs {
    project: String,
    #[arg(long, default_value = "en", help = "Language code to keep")]
    lang: String,
    #[arg(long, help = "Merge verified endpoints into the registry")]
    save: bool,
    #[arg(long, requires = "save", help = "Enable new entries with an unambiguous name")]
    auto_enable: bool,
    #[arg(long, help = "Print the full report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct VerifyArgs {
    #[arg(required = true)]
    urls: Vec<String>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct RegistryArgs {
    #[command(subcommand)]
    command: RegistrySubcommand,
}

#[derive(Debug, Subcommand)]
enum RegistrySubcommand {
    List {
        #[arg(long)]
        json: bool,
    },
    Merge {
        #[arg(required = true)]
        urls: Vec<String>,
        #[arg(long)]
        auto_enable: bool,
    },
}

struct Runtime {
    config: ScoutConfig,
    registry_override: Option<PathBuf>,
}

impl Runtime {
    fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));
        let config = load_config(&config_path)?;
        tracing::debug!(
            path = %config_path.display(),
            catalog = %config.catalog_url(),
            "configuration loaded"
        );
        Ok(Self {
            config,
            registry_override: cli.registry.clone(),
        })
    }

    fn fetcher(&self) -> Result<ReqwestFetcher> {
        ReqwestFetcher::new(self.config.timeout(), &self.config.user_agent())
            .context("failed to prepare HTTP transport")
    }

    fn registry(&self) -> RegistryStore {
        RegistryStore::new(
            self.registry_override
                .clone()
                .unwrap_or_else(|| self.config.registry_path()),
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_tracing(cli.quiet, cli.verbose)?;
    let runtime = Runtime::load(&cli)?;

    match cli.command {
        Some(Commands::Projects) => run_projects(&runtime),
        Some(Commands::Discover(args)) => run_discover(&runtime, args),
        Some(Commands::Verify(args)) => run_verify(&runtime, args),
        Some(Commands::Registry(RegistryArgs { command })) => match command {
            RegistrySubcommand::List { json } => run_registry_list(&runtime, json),
            RegistrySubcommand::Merge { urls, auto_enable } => {
                run_registry_merge(&runtime, &urls, auto_enable)
            }
        },
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<()> {
    let directive = log_directive(quiet, verbose, std::env::var(LOG_ENV).ok());
    let filter = tracing_subscriber::EnvFilter::try_new(&directive)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level(quiet, verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))
}

const LOG_ENV: &str = "WIKISCOUT_LOG";

fn default_level(quiet: bool, verbose: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    }
}

/// `WIKISCOUT_LOG` (process env or `.env`) wins over the verbosity flags.
fn log_directive(quiet: bool, verbose: bool, from_env: Option<String>) -> String {
    from_env
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default_level(quiet, verbose).to_string())
}

fn run_projects(runtime: &Runtime) -> Result<()> {
    let fetcher = runtime.fetcher()?;
    let catalog = CatalogClient::new(&fetcher, &runtime.config.catalog_url());
    let projects = catalog
        .list_projects()
        .context("failed to retrieve the project list")?;
    println!("projects.count: {}", projects.len());
    for project in projects {
        println!("project: {project}");
    }
    Ok(())
}

fn run_discover(runtime: &Runtime, args: DiscoverArgs) -> Result<()> {
    let fetcher = runtime.fetcher()?;
    let catalog = CatalogClient::new(&fetcher, &runtime.config.catalog_url());
    let verifier = EndpointVerifier::new(&fetcher, runtime.config.concurrency());
    let report = discover_project(&catalog, &verifier, &args.project, &args.lang)
        .with_context(|| format!("failed to discover endpoints for {}", args.project))?;

    let merge = if args.save {
        let store = runtime.registry();
        Some(
            store
                .merge(&report.endpoint_urls(), args.auto_enable)
                .with_context(|| format!("failed to update {}", store.path().display()))?,
        )
    } else {
        None
    };

    if args.json {
        let payload = serde_json::json!({ "discovery": report, "merge": merge });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("discover");
    println!("project: {}", report.project);
    println!("language: {}", report.language);
    println!("wikis_in_dump: {}", report.wikis_in_dump);
    println!("candidates: {}", report.candidates.len());
    print_verification(&report.verification);
    if let Some(merge) = &merge {
        print_merge(merge);
    }
    Ok(())
}

fn run_verify(runtime: &Runtime, args: VerifyArgs) -> Result<()> {
    let fetcher = runtime.fetcher()?;
    let verifier = EndpointVerifier::new(&fetcher, runtime.config.concurrency());
    let candidates = args
        .urls
        .iter()
        .map(|url| CandidateUrl::new(url.trim_end_matches('/')))
        .collect::<Vec<_>>();
    let report = verifier.verify(&candidates);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("verify");
    print_verification(&report);
    Ok(())
}

fn run_registry_list(runtime: &Runtime, json: bool) -> Result<()> {
    let store = runtime.registry();
    let report = store
        .load()
        .with_context(|| format!("failed to load {}", store.path().display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("registry");
    println!("path: {}", store.path().display());
    println!("active: {}", report.endpoints.len());
    println!("disabled_rows: {}", report.disabled_rows);
    println!("dropped_rows: {}", report.dropped_rows);
    for id in &report.duplicate_ids {
        println!("duplicate_id: {id}");
    }
    for id in &report.malformed_colors {
        println!("malformed_color: {id}");
    }
    for endpoint in &report.endpoints {
        println!(
            "endpoint: {} {} {} {}",
            endpoint.reference_id,
            endpoint.endpoint_url,
            endpoint.resolver_id,
            endpoint.display_color
        );
    }
    Ok(())
}

fn run_registry_merge(runtime: &Runtime, urls: &[String], auto_enable: bool) -> Result<()> {
    let store = runtime.registry();
    let report = store
        .merge(urls, auto_enable)
        .with_context(|| format!("failed to update {}", store.path().display()))?;
    println!("registry merge");
    println!("path: {}", store.path().display());
    print_merge(&report);
    Ok(())
}

fn print_verification(report: &VerificationReport) {
    println!("verified: {}", report.verified_count());
    for probe in &report.probes {
        match &probe.outcome {
            ProbeOutcome::Verified(endpoint) => println!("endpoint: {}", endpoint.url()),
            ProbeOutcome::Unreachable { url, status } => {
                println!("unreachable: {} (HTTP {status} at {url})", probe.candidate)
            }
            ProbeOutcome::NoApi { base } => println!("no_api: {base}"),
            ProbeOutcome::Failed { error, .. } => {
                println!("failed: {} ({error})", probe.candidate)
            }
        }
    }
}

fn print_merge(report: &MergeReport) {
    println!("merge.previous_rows: {}", report.previous_rows);
    println!("merge.already_present: {}", report.already_present);
    println!("merge.added: {}", report.added.len());
    for row in &report.added {
        println!("merge.row: {} {}", row.reference_id, row.endpoint);
    }
    for url in &report.invalid {
        println!("merge.invalid: {url}");
    }
    for id in &report.colliding_ids {
        println!("merge.colliding_id: {id}");
    }
}
