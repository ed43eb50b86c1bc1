//! Assignment planners: sequential constraint solver and greedy baseline

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::feasibility::{DroneSnapshot, FeasibilityOracle, FeasibilityRecord};
use crate::geometry::Position;
use crate::routing::AStarRouter;
use crate::types::{Assignment, Delivery, Drone};
use crate::zone::NoFlyZone;
use crate::{DeliveryError, DeliveryResult};

/// Default wall-clock budget for a single solve
pub const DEFAULT_PLANNER_DEADLINE: Duration = Duration::from_secs(30);

/// Planner over a fleet, a delivery set, and the active zones.
///
/// Planners have exclusive access to the collections for the duration of
/// a solve; a deadline expiry yields a partial but valid assignment.
pub trait DeliveryPlanner {
    fn plan(
        &mut self,
        drones: &mut [Drone],
        deliveries: &mut [Delivery],
        zones: &[NoFlyZone],
        now: DateTime<Utc>,
    ) -> DeliveryResult<Assignment>;

    fn name(&self) -> &'static str;
}

fn check_inputs(drones: &[Drone], deliveries: &[Delivery]) -> DeliveryResult<()> {
    if drones.is_empty() {
        return Err(DeliveryError::InvalidInput("no drones in fleet".to_string()));
    }
    if deliveries.is_empty() {
        return Err(DeliveryError::InvalidInput("no deliveries to plan".to_string()));
    }
    Ok(())
}

/// Per-drone working state advanced as deliveries are committed
struct WorkingState {
    position: Position,
    battery: f64,
    clock: DateTime<Utc>,
    route: Vec<Position>,
}

impl WorkingState {
    fn of(drone: &Drone, clock: DateTime<Utc>) -> Self {
        Self {
            position: drone.current_position,
            battery: drone.current_battery,
            clock,
            route: drone.route.clone(),
        }
    }

    fn snapshot(&self) -> DroneSnapshot {
        DroneSnapshot {
            position: self.position,
            battery: self.battery,
            clock: self.clock,
        }
    }

    fn advance(&mut self, delivery: &Delivery, record: &FeasibilityRecord) {
        self.position = delivery.position;
        self.battery -= record.energy_cost;
        self.clock = record.arrival_time;
        self.route.extend(record.path.iter().skip(1).copied());
    }
}

/// Sequential greedy-by-priority assignment.
///
/// Deliveries are tried in (priority desc, window start asc) order; each
/// goes to the drone with the earliest feasible arrival, ties broken by
/// fleet order. Drone snapshots advance as deliveries commit and are
/// written back to the real fleet after the loop, so this planner
/// finalises both the assignment and the simulated outcome.
pub struct CspPlanner {
    router: AStarRouter,
    deadline: Duration,
}

impl CspPlanner {
    pub fn new(grid_size: (usize, usize)) -> Self {
        Self {
            router: AStarRouter::new(grid_size),
            deadline: DEFAULT_PLANNER_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

impl DeliveryPlanner for CspPlanner {
    fn plan(
        &mut self,
        drones: &mut [Drone],
        deliveries: &mut [Delivery],
        zones: &[NoFlyZone],
        now: DateTime<Utc>,
    ) -> DeliveryResult<Assignment> {
        check_inputs(drones, deliveries)?;
        let started = Instant::now();
        let oracle = FeasibilityOracle::new(&self.router, zones);

        let mut order: Vec<usize> = (0..deliveries.len()).collect();
        order.sort_by(|&a, &b| {
            deliveries[b]
                .priority
                .cmp(&deliveries[a].priority)
                .then(deliveries[a].time_window_start.cmp(&deliveries[b].time_window_start))
        });

        let mut states: Vec<WorkingState> =
            drones.iter().map(|d| WorkingState::of(d, now)).collect();
        let mut assignment = Assignment::for_fleet(drones);

        for &di in &order {
            if started.elapsed() >= self.deadline {
                // Remaining deliveries stay pending; the partial result is valid.
                info!(
                    planned = assignment.assigned_count(),
                    "planner deadline exceeded, returning partial assignment"
                );
                break;
            }

            let mut best: Option<(usize, FeasibilityRecord)> = None;
            for (vi, drone) in drones.iter().enumerate() {
                if let Ok(record) = oracle.evaluate(drone, &states[vi].snapshot(), &deliveries[di])
                {
                    let better = best
                        .as_ref()
                        .map_or(true, |(_, b)| record.arrival_time < b.arrival_time);
                    if better {
                        best = Some((vi, record));
                    }
                }
            }

            match best {
                Some((vi, record)) => {
                    debug!(
                        delivery = %deliveries[di].id,
                        drone = %drones[vi].id,
                        arrival = %record.arrival_time,
                        "assigned"
                    );
                    assignment.push(&drones[vi].id, &deliveries[di].id);
                    states[vi].advance(&deliveries[di], &record);
                    let drone_id = drones[vi].id.clone();
                    deliveries[di].assign_to(&drone_id);
                    deliveries[di].mark_completed();
                }
                None => deliveries[di].mark_failed(),
            }
        }

        // Commit the working snapshots back to the real fleet
        for (drone, state) in drones.iter_mut().zip(states) {
            drone.current_position = state.position;
            drone.current_battery = state.battery;
            drone.route = state.route;
        }

        Ok(assignment)
    }

    fn name(&self) -> &'static str {
        "csp"
    }
}

/// Nearest-feasible-drone baseline.
///
/// Each delivery, in original order, goes to the closest drone whose
/// oracle verdict from its initial state is feasible; the executor then
/// flies the routes. Also used as the fallback when genetic search fails.
pub struct GreedyPlanner {
    router: AStarRouter,
}

impl GreedyPlanner {
    pub fn new(grid_size: (usize, usize)) -> Self {
        Self {
            router: AStarRouter::new(grid_size),
        }
    }
}

impl DeliveryPlanner for GreedyPlanner {
    fn plan(
        &mut self,
        drones: &mut [Drone],
        deliveries: &mut [Delivery],
        zones: &[NoFlyZone],
        now: DateTime<Utc>,
    ) -> DeliveryResult<Assignment> {
        check_inputs(drones, deliveries)?;
        let oracle = FeasibilityOracle::new(&self.router, zones);
        let mut assignment = Assignment::for_fleet(drones);

        for delivery in deliveries.iter_mut() {
            let mut best: Option<(usize, f64)> = None;
            for (vi, drone) in drones.iter().enumerate() {
                if oracle
                    .evaluate(drone, &DroneSnapshot::of(drone, now), delivery)
                    .is_ok()
                {
                    let distance = drone.current_position.distance_to(delivery.position);
                    if best.map_or(true, |(_, d)| distance < d) {
                        best = Some((vi, distance));
                    }
                }
            }

            match best {
                Some((vi, _)) => {
                    assignment.push(&drones[vi].id, &delivery.id);
                    delivery.assign_to(&drones[vi].id.clone());
                }
                None => delivery.mark_failed(),
            }
        }

        Ok(assignment)
    }

    fn name(&self) -> &'static str {
        "greedy"
    }
}
