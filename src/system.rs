//! Top-level delivery system: scenario state, planning entry points,
//! execution, and reporting

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::executor::Executor;
use crate::genetic::{GeneticConfig, GeneticPlanner};
use crate::solver::{CspPlanner, DeliveryPlanner, GreedyPlanner};
use crate::types::{Assignment, Delivery, DeliveryStatus, Drone};
use crate::zone::NoFlyZone;
use crate::{DeliveryError, DeliveryResult};

const DEFAULT_GRID_SIZE: (usize, usize) = (100, 100);

/// Which planner to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Csp,
    Genetic,
    Greedy,
}

/// On-disk scenario description
#[derive(Debug, Serialize, Deserialize)]
struct SystemConfig {
    #[serde(default = "default_grid_size")]
    grid_size: (usize, usize),
    #[serde(default)]
    drones: Vec<Drone>,
    #[serde(default)]
    deliveries: Vec<Delivery>,
    #[serde(default)]
    no_fly_zones: Vec<NoFlyZone>,
}

fn default_grid_size() -> (usize, usize) {
    DEFAULT_GRID_SIZE
}

/// Per-drone execution statistics for the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneStatistics {
    /// Remaining battery as a percentage of capacity
    pub battery_remaining: f64,
    pub distance_traveled: f64,
    pub deliveries_completed: usize,
}

/// Outcome summary returned to the caller after a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub total_deliveries: usize,
    pub completed_deliveries: usize,
    pub failed_deliveries: usize,
    pub in_progress_deliveries: usize,
    pub drone_statistics: HashMap<String, DroneStatistics>,
}

/// Owns the fleet, delivery set, and zones for the duration of a session.
///
/// Planners get exclusive access to the collections while a solve runs;
/// the executor is the only other mutator.
#[derive(Debug)]
pub struct DeliverySystem {
    drones: Vec<Drone>,
    deliveries: Vec<Delivery>,
    no_fly_zones: Vec<NoFlyZone>,
    current_time: DateTime<Utc>,
    grid_size: (usize, usize),
    genetic_config: GeneticConfig,
}

impl DeliverySystem {
    pub fn new(grid_size: (usize, usize)) -> Self {
        Self {
            drones: Vec::new(),
            deliveries: Vec::new(),
            no_fly_zones: Vec::new(),
            current_time: Utc::now(),
            grid_size,
            genetic_config: GeneticConfig::default(),
        }
    }

    /// Load a scenario from a JSON configuration file, failing loudly on
    /// malformed polygons, reversed windows, or unknown statuses.
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> DeliveryResult<Self> {
        let file = File::open(&path).map_err(|e| {
            DeliveryError::Config(format!("cannot open {:?}: {e}", path.as_ref()))
        })?;
        let config: SystemConfig = serde_json::from_reader(BufReader::new(file))?;

        let mut seen = HashSet::new();
        for drone in &config.drones {
            if !seen.insert(drone.id.as_str()) {
                return Err(DeliveryError::Config(format!(
                    "duplicate drone id {:?}",
                    drone.id
                )));
            }
        }

        let mut system = Self::new(config.grid_size);
        system.drones = config.drones;
        system.deliveries = config.deliveries;
        system.no_fly_zones = config.no_fly_zones;
        info!(
            drones = system.drones.len(),
            deliveries = system.deliveries.len(),
            zones = system.no_fly_zones.len(),
            "scenario loaded"
        );
        Ok(system)
    }

    /// Write the current scenario back out as JSON
    pub fn save_config<P: AsRef<Path>>(&self, path: P) -> DeliveryResult<()> {
        let file = File::create(&path).map_err(|e| {
            DeliveryError::Config(format!("cannot create {:?}: {e}", path.as_ref()))
        })?;
        let config = SystemConfig {
            grid_size: self.grid_size,
            drones: self.drones.clone(),
            deliveries: self.deliveries.clone(),
            no_fly_zones: self.no_fly_zones.clone(),
        };
        serde_json::to_writer_pretty(BufWriter::new(file), &config)?;
        Ok(())
    }

    /// Pin the session clock, e.g. for reproducible runs
    pub fn with_current_time(mut self, at: DateTime<Utc>) -> Self {
        self.current_time = at;
        self
    }

    pub fn set_genetic_config(&mut self, config: GeneticConfig) {
        self.genetic_config = config;
    }

    pub fn add_drone(&mut self, drone: Drone) {
        self.drones.push(drone);
    }

    pub fn add_delivery(&mut self, delivery: Delivery) {
        self.deliveries.push(delivery);
    }

    pub fn add_no_fly_zone(&mut self, zone: NoFlyZone) {
        self.no_fly_zones.push(zone);
    }

    pub fn drones(&self) -> &[Drone] {
        &self.drones
    }

    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    pub fn no_fly_zones(&self) -> &[NoFlyZone] {
        &self.no_fly_zones
    }

    pub fn current_time(&self) -> DateTime<Utc> {
        self.current_time
    }

    /// Run the chosen planner over the session state.
    ///
    /// A failed genetic run falls back to the greedy baseline.
    pub fn optimize(&mut self, strategy: Strategy) -> DeliveryResult<Assignment> {
        match strategy {
            Strategy::Csp => self.run(&mut CspPlanner::new(self.grid_size)),
            Strategy::Greedy => self.run(&mut GreedyPlanner::new(self.grid_size)),
            Strategy::Genetic => {
                let mut planner =
                    GeneticPlanner::with_config(self.grid_size, self.genetic_config.clone());
                match self.run(&mut planner) {
                    Ok(assignment) => Ok(assignment),
                    Err(error) => {
                        warn!(%error, "genetic planner failed, falling back to greedy");
                        self.run(&mut GreedyPlanner::new(self.grid_size))
                    }
                }
            }
        }
    }

    fn run(&mut self, planner: &mut dyn DeliveryPlanner) -> DeliveryResult<Assignment> {
        info!(planner = planner.name(), "optimizing deliveries");
        planner.plan(
            &mut self.drones,
            &mut self.deliveries,
            &self.no_fly_zones,
            self.current_time,
        )
    }

    /// Fly the assigned routes and stamp delivery outcomes.
    ///
    /// A no-op for deliveries a planner already finalised, so running it
    /// after the CSP planner is harmless.
    pub fn execute(&mut self, assignment: &Assignment) -> DeliveryResult<()> {
        Executor::new(self.grid_size).execute(
            assignment,
            &mut self.drones,
            &mut self.deliveries,
            &self.no_fly_zones,
            self.current_time,
        )
    }

    pub fn generate_report(&self) -> Report {
        let count = |status: DeliveryStatus| {
            self.deliveries
                .iter()
                .filter(|d| d.status == status)
                .count()
        };

        let drone_statistics = self
            .drones
            .iter()
            .map(|drone| {
                let completed = self
                    .deliveries
                    .iter()
                    .filter(|d| {
                        d.assigned_drone.as_deref() == Some(drone.id.as_str())
                            && d.status == DeliveryStatus::Completed
                    })
                    .count();
                (
                    drone.id.clone(),
                    DroneStatistics {
                        battery_remaining: drone.battery_percentage(),
                        distance_traveled: drone.distance_traveled(),
                        deliveries_completed: completed,
                    },
                )
            })
            .collect();

        Report {
            total_deliveries: self.deliveries.len(),
            completed_deliveries: count(DeliveryStatus::Completed),
            failed_deliveries: count(DeliveryStatus::Failed),
            in_progress_deliveries: count(DeliveryStatus::InProgress),
            drone_statistics,
        }
    }
}
