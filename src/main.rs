use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use partkeeper::{
    LifecycleCoordinator, LifecycleMode, PartkeeperConfig,
    config::EXAMPLE_CONFIG,
    engine::{fixture::EngineFixture, memory::MemoryEngine},
    observability,
    topology::TopologyPlan,
};
use serde::Serialize;

const DEFAULT_CONFIG_PATH: &str = "partkeeper.toml";

/// CLI arguments for partkeeper
#[derive(Parser, Debug)]
#[command(version, about = "Yearly partition retention orchestrator", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (defaults to ./partkeeper.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Initialize a new configuration file
    Init {
        /// Path to create the config file (defaults to ./partkeeper.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Load and validate the configuration, then print the years that would be purged
    Validate,
    /// Print the topology plan and the lifecycle steps as JSON
    Plan {
        /// Lifecycle to plan
        #[arg(long, value_enum, default_value = "from-scratch")]
        mode: Mode,
        /// Plan against a database seeded from this fixture instead of an empty one
        #[arg(long)]
        fixture: Option<String>,
    },
    /// Run the full lifecycle against an in-memory database seeded from a fixture
    Simulate {
        /// TOML fixture describing the tables and rows to seed
        #[arg(long)]
        fixture: String,
    },
    /// Export the JSON schema for the configuration file
    Schema {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum Mode {
    FromScratch,
    FromBaseline,
}

impl From<Mode> for LifecycleMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::FromScratch => LifecycleMode::FromScratch,
            Mode::FromBaseline => LifecycleMode::FromBaseline,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Command::Init { output, force } => run_init(output.or(args.config), force),
        Command::Validate => run_validate(args.config.as_deref()),
        Command::Plan { mode, fixture } => {
            run_plan(args.config.as_deref(), mode.into(), fixture.as_deref()).await
        }
        Command::Simulate { fixture } => run_simulate(args.config.as_deref(), &fixture).await,
        Command::Schema { output } => {
            #[cfg(feature = "json-schema")]
            run_schema_export(output);
            #[cfg(not(feature = "json-schema"))]
            {
                let _ = output;
                eprintln!("Error: JSON schema export requires the 'json-schema' feature");
                std::process::exit(1);
            }
        }
    }
}

/// Write the example configuration.
fn run_init(output: Option<String>, force: bool) {
    let output_path = PathBuf::from(output.unwrap_or_else(|| DEFAULT_CONFIG_PATH.into()));

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, EXAMPLE_CONFIG) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("To check it, run:");
    println!("  partkeeper validate --config {}", output_path.display());
}

fn load_config(explicit_config_path: Option<&str>) -> PartkeeperConfig {
    let path = explicit_config_path.unwrap_or(DEFAULT_CONFIG_PATH);
    match PartkeeperConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

fn init_logging(config: &PartkeeperConfig) {
    if let Err(e) = observability::init_tracing(&config.observability.logging) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize output: {}", e);
            std::process::exit(1);
        }
    }
}

fn run_validate(explicit_config_path: Option<&str>) {
    let config = load_config(explicit_config_path);
    let purge_years = config.partitioning.purge_years();

    println!("Configuration is valid.");
    println!("  database:       {}", config.database.name);
    println!("  boundary years: {:?}", config.partitioning.boundary_years);
    println!("  retained years: {:?}", config.partitioning.retained_years);
    println!("  purge years:    {:?}", purge_years);
    if config.purge.dry_run {
        println!("  (dry run: partitions are counted, not switched)");
    }
}

/// Seed an in-memory engine from a fixture, checking it matches the configuration.
fn seed_engine(config: &PartkeeperConfig, fixture_path: &str) -> Arc<MemoryEngine> {
    let fixture = match EngineFixture::from_file(fixture_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to load fixture from {}: {}", fixture_path, e);
            std::process::exit(1);
        }
    };
    if fixture.database != config.database.name || fixture.schema != config.database.schema {
        eprintln!(
            "Fixture describes {}.{} but the configuration manages {}.{}",
            fixture.database, fixture.schema, config.database.name, config.database.schema
        );
        std::process::exit(1);
    }
    match fixture.seed() {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            eprintln!("Failed to seed fixture: {}", e);
            std::process::exit(1);
        }
    }
}

fn build_coordinator(config: PartkeeperConfig, engine: Arc<MemoryEngine>) -> LifecycleCoordinator {
    match LifecycleCoordinator::new(config, engine.clone(), engine) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[derive(Serialize)]
struct PlanOutput {
    mode: LifecycleMode,
    purge_years: Vec<i32>,
    topology: TopologyPlan,
    steps: Vec<partkeeper::lifecycle::PlannedStep>,
}

async fn run_plan(explicit_config_path: Option<&str>, mode: LifecycleMode, fixture: Option<&str>) {
    let config = load_config(explicit_config_path);
    init_logging(&config);

    let engine = match fixture {
        Some(path) => seed_engine(&config, path),
        None => Arc::new(MemoryEngine::new(config.database.name.clone())),
    };
    let purge_years = config.partitioning.purge_years();
    let coordinator = build_coordinator(config, engine);

    let current = match coordinator.topology().current_topology().await {
        Ok(current) => current,
        Err(e) => {
            eprintln!("Failed to read partition topology: {}", e);
            std::process::exit(1);
        }
    };
    let desired = coordinator
        .topology()
        .desired_topology(coordinator.boundaries());

    print_json(&PlanOutput {
        mode,
        purge_years,
        topology: TopologyPlan::between(&current, &desired),
        steps: coordinator.plan(mode),
    });
}

async fn run_simulate(explicit_config_path: Option<&str>, fixture: &str) {
    let mut config = load_config(explicit_config_path);
    init_logging(&config);

    let engine = seed_engine(&config, fixture);
    if config.backup.source_location.take().is_some() {
        tracing::warn!("Ignoring backup.source_location: the simulated database is seeded from the fixture");
    }

    let mut coordinator = build_coordinator(config, engine);
    match coordinator.run(LifecycleMode::FromScratch).await {
        Ok(report) => print_json(&report),
        Err(e) => {
            print_json(&e.report);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Export JSON schema for the configuration file to file or stdout
#[cfg(feature = "json-schema")]
fn run_schema_export(output: Option<String>) {
    let schema = PartkeeperConfig::json_schema();
    let content = match serde_json::to_string_pretty(&schema) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Failed to serialize schema: {}", e);
            std::process::exit(1);
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &content) {
                eprintln!("Failed to write to {}: {}", path, e);
                std::process::exit(1);
            }
            eprintln!("Config JSON schema written to {}", path);
        }
        None => println!("{}", content),
    }
}
