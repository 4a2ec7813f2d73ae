//! # Fleet Simulator
//!
//! Runs a number of dispatch ticks over a fleet definition on a manual clock
//! and prints the resulting production rollups.

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use haul_core::config::ConfigManager;
use haul_core::cycle::ManualTimeProvider;
use haul_core::dispatch::DefaultAssignmentPolicy;
use haul_core::logging;
use haul_core::orchestration::FleetCoordinator;
use haul_core::registry::FleetDefinition;
use haul_core::repository::{ActivityFilter, InMemoryRepository};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "fleet-simulator")]
#[command(about = "Simulate haul cycles for a fleet definition")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Fleet definition JSON
    #[arg(short, long, default_value = "config/fleet_definition.example.json")]
    fleet: PathBuf,

    /// Environment used to resolve configuration
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Number of dispatch ticks to run
    #[arg(short, long, default_value_t = 8)]
    ticks: u32,

    /// Logical minutes between ticks
    #[arg(long, default_value_t = 60)]
    tick_minutes: i64,

    /// Simulation start instant (RFC 3339)
    #[arg(long, default_value = "2025-11-08T06:00:00Z")]
    start: DateTime<Utc>,

    /// Override the delay seed
    #[arg(long)]
    delay_seed: Option<u64>,

    /// Override the load factor seed
    #[arg(long)]
    cycle_seed: Option<u64>,

    /// Excavator to break down after the first tick
    #[arg(long)]
    breakdown: Option<String>,

    /// Print records as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
        .with_context(|| format!("loading configuration for '{}'", cli.environment))?;
    let mut config = manager.config().clone();
    if let Some(seed) = cli.delay_seed {
        config.delay.seed = seed;
    }
    if let Some(seed) = cli.cycle_seed {
        config.cycle.seed = seed;
    }
    // Cycles complete between ticks; never sleep for wall-clock time
    config.dispatch.real_time_factor = 0.0;
    logging::init_with_config(&config.logging);

    let fleet = FleetDefinition::from_json_file(&cli.fleet)?.build(&config.queue);
    let repository = Arc::new(InMemoryRepository::new());
    let clock = ManualTimeProvider::new(cli.start);

    let coordinator = FleetCoordinator::with_components(
        config,
        fleet,
        repository.clone(),
        Arc::new(DefaultAssignmentPolicy::new()),
        Arc::new(clock.clone()),
    )?;

    for tick in 0..cli.ticks {
        let report = coordinator.dispatch_tick().await?;
        if !cli.json {
            println!(
                "⏱️ tick {tick} at {}: {} dispatched, {} skipped",
                report.at.format("%Y-%m-%d %H:%M"),
                report.dispatched.len(),
                report.skipped.len()
            );
        }

        if tick == 0 {
            if let Some(excavator_id) = &cli.breakdown {
                let cancelled = coordinator
                    .report_equipment_breakdown(excavator_id, report.at)
                    .await?;
                if !cli.json {
                    println!("🔧 {excavator_id} broke down, {} cycle(s) cancelled", cancelled.len());
                }
            }
        }

        coordinator.wait_for_idle().await;
        clock.advance(Duration::minutes(cli.tick_minutes));
    }

    let records = repository.production_records();
    let statistics = coordinator
        .aggregator()
        .statistics(&ActivityFilter::default())
        .await?;
    let achievement = coordinator
        .aggregator()
        .production_achievement(&repository.activities());

    if cli.json {
        let output = serde_json::json!({
            "stats": coordinator.stats(),
            "productionRecords": records,
            "statistics": statistics,
            "achievement": achievement,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let stats = coordinator.stats();
    println!();
    println!(
        "🚚 cycles: {} dispatched, {} completed, {} cancelled, {} not started",
        stats.dispatched, stats.completed, stats.cancelled, stats.not_started
    );
    for record in &records {
        println!(
            "📊 {} {} {}: {:.2} t of {:.0} t ({:.2}%), {} trips, avg cycle {:.2} min, {} cancelled, utilization {:.2}%",
            record.key.mining_site_id,
            record.key.shift,
            record.key.date,
            record.actual_production,
            record.target_production,
            record.achievement,
            record.total_trips,
            record.avg_cycle_time,
            record.cancelled_trips,
            record.utilization_rate,
        );
    }
    println!(
        "📈 completion {:.2}%, delays {:.2}%, avg load {:.2} t",
        statistics.completion_rate, statistics.delay_rate, statistics.avg_load_weight
    );
    println!(
        "🎯 {} of {} cycles hit target weight ({:.2}%), load progress {:.2}%",
        achievement.completed_count,
        achievement.total_count,
        achievement.achievement,
        achievement.load_weight_progress
    );

    Ok(())
}
