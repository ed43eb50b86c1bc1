//! Command-line front end for the delivery planner
//!
//! Loads a JSON scenario, runs the chosen planner, executes the
//! assignment, and prints the outcome report as JSON.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use drone_delivery::{DeliverySystem, GeneticConfig, Strategy};

#[derive(Parser, Debug)]
#[command(name = "delivery_cli", about = "Drone delivery fleet planning and simulation")]
struct Args {
    /// Path to the JSON scenario configuration
    #[arg(long)]
    config: PathBuf,

    /// Use the genetic planner instead of the CSP planner
    #[arg(long)]
    genetic: bool,

    /// Use the greedy baseline planner
    #[arg(long, conflicts_with = "genetic")]
    greedy: bool,

    /// Seed for the genetic planner's RNG
    #[arg(long)]
    seed: Option<u64>,

    /// Print each drone's flown route alongside the report
    #[arg(long)]
    visualize: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut system = DeliverySystem::from_config_file(&args.config)
        .with_context(|| format!("loading scenario from {:?}", args.config))?;

    if let Some(seed) = args.seed {
        system.set_genetic_config(GeneticConfig {
            seed: Some(seed),
            ..GeneticConfig::default()
        });
    }

    let strategy = if args.genetic {
        Strategy::Genetic
    } else if args.greedy {
        Strategy::Greedy
    } else {
        Strategy::Csp
    };

    let assignment = system.optimize(strategy)?;
    system.execute(&assignment)?;

    let report = system.generate_report();
    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.visualize {
        for drone in system.drones() {
            let route: Vec<String> = drone
                .route
                .iter()
                .map(|p| format!("({:.1}, {:.1})", p.x, p.y))
                .collect();
            println!("drone {}: {}", drone.id, route.join(" -> "));
        }
    }

    Ok(())
}
