//! Shared feasibility oracle consumed by every planner

use chrono::{DateTime, Duration, Utc};

use crate::geometry::{path_length, Position};
use crate::routing::AStarRouter;
use crate::types::{Delivery, Drone};
use crate::zone::{path_blocked, NoFlyZone};

/// Why a (drone state, delivery) pair cannot be served.
///
/// Rejections are planner inputs, never errors: planners branch on the
/// kind and keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Infeasibility {
    WeightExceeded,
    NoPath,
    PathBlocked,
    BatteryInsufficient,
    OutsideTimeWindow,
}

/// A costed, obstacle-avoiding candidate trajectory for one delivery
#[derive(Debug, Clone, PartialEq)]
pub struct FeasibilityRecord {
    pub path: Vec<Position>,
    pub total_distance: f64,
    /// Travel time in minutes
    pub travel_time: f64,
    pub arrival_time: DateTime<Utc>,
    /// Energy drained, one unit per unit of distance
    pub energy_cost: f64,
}

/// A drone's working state as seen by a planner: where it is, how much
/// battery remains, and its notional clock.
#[derive(Debug, Clone, Copy)]
pub struct DroneSnapshot {
    pub position: Position,
    pub battery: f64,
    pub clock: DateTime<Utc>,
}

impl DroneSnapshot {
    pub fn of(drone: &Drone, clock: DateTime<Utc>) -> Self {
        Self {
            position: drone.current_position,
            battery: drone.current_battery,
            clock,
        }
    }
}

/// Shift an instant forward by a fractional number of minutes
pub(crate) fn minutes_after(t: DateTime<Utc>, minutes: f64) -> DateTime<Utc> {
    t + Duration::milliseconds((minutes * 60_000.0).round() as i64)
}

/// Evaluates whether one drone state can serve one delivery.
///
/// Checks run in a fixed order: payload mass, route existence, route
/// clearance, battery, and finally the delivery window against the
/// computed arrival.
pub struct FeasibilityOracle<'a> {
    router: &'a AStarRouter,
    zones: &'a [NoFlyZone],
}

impl<'a> FeasibilityOracle<'a> {
    pub fn new(router: &'a AStarRouter, zones: &'a [NoFlyZone]) -> Self {
        Self { router, zones }
    }

    pub fn evaluate(
        &self,
        drone: &Drone,
        state: &DroneSnapshot,
        delivery: &Delivery,
    ) -> Result<FeasibilityRecord, Infeasibility> {
        if delivery.weight > drone.max_weight {
            return Err(Infeasibility::WeightExceeded);
        }

        let path = self
            .router
            .find_path(state.position, delivery.position, drone, self.zones, state.clock);
        if path.len() < 2 {
            return Err(Infeasibility::NoPath);
        }
        if path_blocked(&path, self.zones, state.clock) {
            return Err(Infeasibility::PathBlocked);
        }

        let total_distance = path_length(&path);
        let travel_time = total_distance / drone.speed;
        let arrival_time = minutes_after(state.clock, travel_time);
        let energy_cost = total_distance;

        if energy_cost > state.battery {
            return Err(Infeasibility::BatteryInsufficient);
        }
        if !(delivery.time_window_start <= arrival_time
            && arrival_time <= delivery.time_window_end)
        {
            return Err(Infeasibility::OutsideTimeWindow);
        }

        Ok(FeasibilityRecord {
            path,
            total_distance,
            travel_time,
            arrival_time,
            energy_cost,
        })
    }
}
