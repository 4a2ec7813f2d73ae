//! # Fleet Configuration Validator
//!
//! Command-line tool for validating fleet configuration across environments
//! and checking fleet definition files before a dispatch run.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use haul_core::config::{ConfigManager, FleetConfig};
use haul_core::registry::{FleetDefinition, ReferenceCatalog};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate haul-cycle fleet configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the merged configuration
    All,

    /// List available environments
    Environments,

    /// Print the merged configuration as JSON
    Show,

    /// Compare configurations between environments
    Compare {
        /// Base environment for comparison
        #[arg(short, long, default_value = "development")]
        base: String,

        /// Target environment for comparison
        #[arg(short, long)]
        target: String,
    },

    /// Check a fleet definition file against the configuration
    Fleet {
        /// Path to the fleet definition JSON
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all_config(&cli),
        Some(Commands::Environments) => list_environments(&cli),
        Some(Commands::Show) => show_config(&cli),
        Some(Commands::Compare { base, target }) => compare_configs(&cli, base, target),
        Some(Commands::Fleet { path }) => validate_fleet(&cli, path),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {:#}", e);
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn config_dir(cli: &Cli) -> PathBuf {
    cli.config_dir.clone().unwrap_or_else(|| PathBuf::from("config"))
}

fn load(cli: &Cli, environment: &str) -> anyhow::Result<FleetConfig> {
    let manager = ConfigManager::load_from_directory_with_env(Some(config_dir(cli)), environment)
        .with_context(|| format!("loading configuration for '{environment}'"))?;
    Ok(manager.config().clone())
}

fn validate_all_config(cli: &Cli) -> anyhow::Result<()> {
    println!("🔧 Validating fleet configuration");
    println!("Environment: {}", cli.environment);
    println!("Config Directory: {}", config_dir(cli).display());
    println!();

    let config = load(cli, &cli.environment)?;
    println!("✅ Configuration loaded and validated");

    let dispatch = &config.dispatch;
    println!("📡 Dispatch");
    println!("   tick interval: {} ms", dispatch.tick_interval_ms);
    println!("   max dispatch per tick: {}", dispatch.max_dispatch_per_tick);
    println!("   reservation wait: {} ms", dispatch.reservation_wait_ms);
    println!(
        "   dump headroom: {} retries x {} min",
        dispatch.dump_headroom_retries, dispatch.dump_headroom_wait_minutes
    );
    println!("   real time factor: {}", dispatch.real_time_factor);

    let cycle = &config.cycle;
    println!("🚚 Cycle");
    println!("   seed: {}", cycle.seed);
    println!(
        "   load factor: {:.2}..{:.2}",
        cycle.load_factor_min, cycle.load_factor_max
    );
    println!("   weather: {:?}", cycle.weather);

    println!("⏱️ Delay");
    println!("   seed: {}", config.delay.seed);
    println!("   rules: {}", config.delay.rules.len());

    println!("📊 Production");
    println!("   site: {}", config.production.mining_site_id);
    println!("   default target: {:.0} t", config.production.default_target_production);

    Ok(())
}

fn list_environments(cli: &Cli) -> anyhow::Result<()> {
    let dir = config_dir(cli).join("environments");
    let mut environments: Vec<String> = std::fs::read_dir(&dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .filter_map(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .collect();
    environments.sort();

    println!("📋 Available environments in {}:", dir.display());
    for environment in environments {
        println!("   - {environment}");
    }
    Ok(())
}

fn show_config(cli: &Cli) -> anyhow::Result<()> {
    let config = load(cli, &cli.environment)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn compare_configs(cli: &Cli, base: &str, target: &str) -> anyhow::Result<()> {
    let base_value = serde_json::to_value(load(cli, base)?)?;
    let target_value = serde_json::to_value(load(cli, target)?)?;

    println!("🔍 Comparing '{base}' with '{target}'");
    let mut differences = Vec::new();
    diff_values("", &base_value, &target_value, &mut differences);

    if differences.is_empty() {
        println!("✅ No differences");
    } else {
        for (path, left, right) in &differences {
            println!("   {path}: {left} → {right}");
        }
        println!("{} difference(s)", differences.len());
    }
    Ok(())
}

fn diff_values(prefix: &str, left: &Value, right: &Value, out: &mut Vec<(String, String, String)>) {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            let mut keys: Vec<&String> = l.keys().chain(r.keys()).collect::<HashSet<_>>().into_iter().collect();
            keys.sort();
            for key in keys {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                diff_values(
                    &path,
                    l.get(key).unwrap_or(&Value::Null),
                    r.get(key).unwrap_or(&Value::Null),
                    out,
                );
            }
        }
        _ if left != right => out.push((prefix.to_string(), left.to_string(), right.to_string())),
        _ => {}
    }
}

fn validate_fleet(cli: &Cli, path: &Path) -> anyhow::Result<()> {
    let config = load(cli, &cli.environment)?;
    let definition = FleetDefinition::from_json_file(path)?;
    println!("🔧 Validating fleet definition {}", path.display());

    let parts = definition.build(&config.queue);
    let catalog = parts.catalog.as_ref();
    let mut problems = Vec::new();

    for road in catalog.road_segments() {
        if catalog.loading_point(&road.from_loading_point_id).is_none() {
            problems.push(format!(
                "road {} starts at unknown loading point {}",
                road.id, road.from_loading_point_id
            ));
        }
        if catalog.dumping_point(&road.to_dumping_point_id).is_none() {
            problems.push(format!(
                "road {} ends at unknown dumping point {}",
                road.id, road.to_dumping_point_id
            ));
        }
    }

    for excavator in parts.registry.excavators() {
        if let Some(point_id) = &excavator.loading_point_id {
            if catalog.loading_point(point_id).is_none() {
                problems.push(format!(
                    "excavator {} is stationed at unknown loading point {point_id}",
                    excavator.id
                ));
            }
        }
    }

    for point in catalog.loading_points() {
        let reachable = catalog
            .dumping_points()
            .iter()
            .any(|dp| catalog.shortest_road(&point.id, &dp.id).is_some());
        if !reachable {
            problems.push(format!("loading point {} has no road to any dumping point", point.id));
        }
    }

    let counts = parts.registry.equipment_counts();
    println!(
        "   trucks: {} operating, {} down",
        counts.trucks_operating, counts.trucks_breakdown
    );
    println!(
        "   excavators: {} operating, {} down",
        counts.excavators_operating, counts.excavators_breakdown
    );
    println!("   operators: {}", parts.registry.operators().len());
    println!(
        "   points: {} loading, {} dumping, {} roads",
        catalog.loading_points().len(),
        catalog.dumping_points().len(),
        catalog.road_segments().len()
    );

    if problems.is_empty() {
        println!("✅ Fleet definition is consistent");
        return Ok(());
    }
    for problem in &problems {
        println!("   ⚠️ {problem}");
    }
    bail!("{} problem(s) in {}", problems.len(), path.display())
}
