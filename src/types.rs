//! Core entities: drones, deliveries, and assignments

use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::{path_length, Position};
use crate::{DeliveryError, DeliveryResult};

/// A battery-powered delivery drone.
///
/// Battery is drained one unit per unit of distance flown. The route always
/// begins at the home position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DroneRecord")]
pub struct Drone {
    pub id: String,
    pub max_weight: f64,
    pub battery_capacity: f64,
    /// Cruise speed in distance units per minute
    pub speed: f64,
    pub start_position: Position,
    pub current_position: Position,
    pub current_battery: f64,
    pub current_weight: f64,
    pub route: Vec<Position>,
}

/// Wire form of [`Drone`]: the mutable fields are optional and default to
/// the fresh state derived from the static ones.
#[derive(Deserialize)]
struct DroneRecord {
    id: String,
    max_weight: f64,
    battery_capacity: f64,
    speed: f64,
    start_position: Position,
    #[serde(default)]
    current_position: Option<Position>,
    #[serde(default)]
    current_battery: Option<f64>,
    #[serde(default)]
    current_weight: f64,
    #[serde(default)]
    route: Option<Vec<Position>>,
}

impl From<DroneRecord> for Drone {
    fn from(record: DroneRecord) -> Self {
        let start = record.start_position;
        Self {
            id: record.id,
            max_weight: record.max_weight,
            battery_capacity: record.battery_capacity,
            speed: record.speed,
            start_position: start,
            current_position: record.current_position.unwrap_or(start),
            current_battery: record.current_battery.unwrap_or(record.battery_capacity),
            current_weight: record.current_weight,
            route: record.route.filter(|r| !r.is_empty()).unwrap_or_else(|| vec![start]),
        }
    }
}

impl Drone {
    pub fn new(
        id: impl Into<String>,
        max_weight: f64,
        battery_capacity: f64,
        speed: f64,
        start_position: Position,
    ) -> Self {
        Self {
            id: id.into(),
            max_weight,
            battery_capacity,
            speed,
            start_position,
            current_position: start_position,
            current_battery: battery_capacity,
            current_weight: 0.0,
            route: vec![start_position],
        }
    }

    /// Whether the drone can carry the given additional payload mass
    pub fn can_carry(&self, weight: f64) -> bool {
        self.current_weight + weight <= self.max_weight
    }

    /// Whether the remaining battery covers the given flight distance
    pub fn has_sufficient_battery(&self, distance: f64) -> bool {
        self.current_battery >= distance
    }

    /// Advance the drone to a new position, draining battery by the
    /// distance flown and extending the route.
    pub fn update_position(&mut self, new_position: Position, distance: f64) {
        self.current_position = new_position;
        self.current_battery -= distance;
        self.route.push(new_position);
    }

    /// Reset the drone to its fresh state at home
    pub fn reset(&mut self) {
        self.current_position = self.start_position;
        self.current_battery = self.battery_capacity;
        self.current_weight = 0.0;
        self.route = vec![self.start_position];
    }

    /// Remaining battery as a percentage of capacity
    pub fn battery_percentage(&self) -> f64 {
        (self.current_battery / self.battery_capacity) * 100.0
    }

    /// Total length of the route flown so far
    pub fn distance_traveled(&self) -> f64 {
        path_length(&self.route)
    }
}

/// Lifecycle state of a delivery.
///
/// `Pending -> InProgress -> {Completed | Failed}`; terminal states stick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl DeliveryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Completed | DeliveryStatus::Failed)
    }
}

/// A single parcel drop with a hard time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DeliveryRecord")]
pub struct Delivery {
    pub id: String,
    pub position: Position,
    pub weight: f64,
    /// Urgency 1..=5, larger is more urgent
    pub priority: u8,
    pub time_window_start: DateTime<Utc>,
    pub time_window_end: DateTime<Utc>,
    pub assigned_drone: Option<String>,
    pub status: DeliveryStatus,
}

#[derive(Deserialize)]
struct DeliveryRecord {
    id: String,
    position: Position,
    weight: f64,
    priority: u8,
    time_window_start: DateTime<Utc>,
    time_window_end: DateTime<Utc>,
    #[serde(default)]
    assigned_drone: Option<String>,
    #[serde(default)]
    status: DeliveryStatus,
}

impl TryFrom<DeliveryRecord> for Delivery {
    type Error = DeliveryError;

    fn try_from(record: DeliveryRecord) -> DeliveryResult<Self> {
        Delivery::validated(Self {
            id: record.id,
            position: record.position,
            weight: record.weight,
            priority: record.priority,
            time_window_start: record.time_window_start,
            time_window_end: record.time_window_end,
            assigned_drone: record.assigned_drone,
            status: record.status,
        })
    }
}

impl Delivery {
    pub fn new(
        id: impl Into<String>,
        position: Position,
        weight: f64,
        priority: u8,
        time_window_start: DateTime<Utc>,
        time_window_end: DateTime<Utc>,
    ) -> DeliveryResult<Self> {
        Self::validated(Self {
            id: id.into(),
            position,
            weight,
            priority,
            time_window_start,
            time_window_end,
            assigned_drone: None,
            status: DeliveryStatus::Pending,
        })
    }

    fn validated(delivery: Self) -> DeliveryResult<Self> {
        if !(1..=5).contains(&delivery.priority) {
            return Err(DeliveryError::InvalidInput(format!(
                "delivery {}: priority {} is outside 1..=5",
                delivery.id, delivery.priority
            )));
        }
        if delivery.time_window_start > delivery.time_window_end {
            return Err(DeliveryError::InvalidTimeWindow {
                start: delivery.time_window_start,
                end: delivery.time_window_end,
            });
        }
        Ok(delivery)
    }

    /// Whether the given instant falls within the closed delivery window
    pub fn is_within_time_window(&self, at: DateTime<Utc>) -> bool {
        self.time_window_start <= at && at <= self.time_window_end
    }

    /// Time remaining until the window closes (negative once past)
    pub fn time_until_deadline(&self, at: DateTime<Utc>) -> chrono::Duration {
        self.time_window_end - at
    }

    /// Sort key: priority descending, then earlier deadline first
    pub fn urgency(&self) -> (Reverse<u8>, DateTime<Utc>) {
        (Reverse(self.priority), self.time_window_end)
    }

    /// Hand the delivery to a drone. No effect once terminal.
    pub fn assign_to(&mut self, drone_id: &str) {
        if self.status.is_terminal() {
            return;
        }
        self.assigned_drone = Some(drone_id.to_string());
        self.status = DeliveryStatus::InProgress;
    }

    pub fn mark_completed(&mut self) {
        if !self.status.is_terminal() {
            self.status = DeliveryStatus::Completed;
        }
    }

    pub fn mark_failed(&mut self) {
        if !self.status.is_terminal() {
            self.status = DeliveryStatus::Failed;
        }
    }
}

/// Mapping from drone id to an ordered list of delivery ids.
///
/// Every drone in the fleet has a key, possibly with an empty list; a
/// delivery appears in at most one list. Map iteration order is
/// unspecified; callers that need a deterministic order walk their own
/// fleet and look up each drone's list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assignment {
    routes: HashMap<String, Vec<String>>,
}

impl Assignment {
    /// An empty assignment with a key for every drone in the fleet
    pub fn for_fleet(drones: &[Drone]) -> Self {
        Self {
            routes: drones
                .iter()
                .map(|d| (d.id.clone(), Vec::new()))
                .collect(),
        }
    }

    pub fn push(&mut self, drone_id: &str, delivery_id: &str) {
        self.routes
            .entry(drone_id.to_string())
            .or_default()
            .push(delivery_id.to_string());
    }

    pub fn deliveries_for(&self, drone_id: &str) -> &[String] {
        self.routes.get(drone_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drone ids present in the mapping, in no particular order
    pub fn drone_ids(&self) -> impl Iterator<Item = &String> {
        self.routes.keys()
    }

    /// Total number of assigned deliveries across the fleet
    pub fn assigned_count(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_drone_fresh_state() {
        let drone = Drone::new("d1", 5.0, 100.0, 10.0, Position::new(0.0, 0.0));
        assert_eq!(drone.current_position, drone.start_position);
        assert_eq!(drone.current_battery, 100.0);
        assert_eq!(drone.route, vec![Position::new(0.0, 0.0)]);
    }

    #[test]
    fn test_drone_can_carry() {
        let drone = Drone::new("d1", 5.0, 100.0, 10.0, Position::new(0.0, 0.0));
        assert!(drone.can_carry(2.0));
        // Exactly at capacity is still feasible
        assert!(drone.can_carry(5.0));
        assert!(!drone.can_carry(6.0));
    }

    #[test]
    fn test_drone_battery_drains_by_distance() {
        let mut drone = Drone::new("d1", 5.0, 100.0, 10.0, Position::new(0.0, 0.0));
        drone.update_position(Position::new(3.0, 4.0), 5.0);
        assert_eq!(drone.current_battery, 95.0);
        assert_eq!(drone.route.len(), 2);
        assert!((drone.distance_traveled() - 5.0).abs() < 1e-9);
        assert!((drone.battery_percentage() - 95.0).abs() < 1e-9);

        drone.reset();
        assert_eq!(drone.current_battery, 100.0);
        assert_eq!(drone.route.len(), 1);
    }

    #[test]
    fn test_drone_json_round_trip() {
        let mut drone = Drone::new("d1", 5.0, 100.0, 10.0, Position::new(1.0, 2.0));
        drone.update_position(Position::new(4.0, 6.0), 5.0);

        let json = serde_json::to_string(&drone).unwrap();
        let restored: Drone = serde_json::from_str(&json).unwrap();
        assert_eq!(drone, restored);
    }

    #[test]
    fn test_drone_deserialize_defaults() {
        let json = r#"{
            "id": "d1",
            "max_weight": 4.0,
            "battery_capacity": 50.0,
            "speed": 8.0,
            "start_position": [10.0, 10.0]
        }"#;
        let drone: Drone = serde_json::from_str(json).unwrap();
        assert_eq!(drone.current_position, Position::new(10.0, 10.0));
        assert_eq!(drone.current_battery, 50.0);
        assert_eq!(drone.route, vec![Position::new(10.0, 10.0)]);
    }

    #[test]
    fn test_delivery_window_and_ordering() {
        let a = Delivery::new(
            "a",
            Position::new(1.0, 1.0),
            1.0,
            2,
            t0(),
            t0() + chrono::Duration::hours(1),
        )
        .unwrap();
        let b = Delivery::new(
            "b",
            Position::new(2.0, 2.0),
            1.0,
            5,
            t0(),
            t0() + chrono::Duration::hours(2),
        )
        .unwrap();

        assert!(a.is_within_time_window(t0()));
        assert!(a.is_within_time_window(t0() + chrono::Duration::hours(1)));
        assert!(!a.is_within_time_window(t0() + chrono::Duration::hours(2)));

        let mut deliveries = vec![a, b];
        deliveries.sort_by_key(Delivery::urgency);
        assert_eq!(deliveries[0].id, "b");
    }

    #[test]
    fn test_delivery_rejects_bad_input() {
        assert!(Delivery::new("x", Position::new(0.0, 0.0), 1.0, 0, t0(), t0()).is_err());
        assert!(Delivery::new("x", Position::new(0.0, 0.0), 1.0, 6, t0(), t0()).is_err());
        assert!(Delivery::new(
            "x",
            Position::new(0.0, 0.0),
            1.0,
            3,
            t0() + chrono::Duration::hours(1),
            t0(),
        )
        .is_err());
    }

    #[test]
    fn test_delivery_terminal_states_stick() {
        let mut delivery = Delivery::new(
            "a",
            Position::new(1.0, 1.0),
            1.0,
            3,
            t0(),
            t0() + chrono::Duration::hours(1),
        )
        .unwrap();

        delivery.assign_to("d1");
        assert_eq!(delivery.status, DeliveryStatus::InProgress);
        delivery.mark_completed();
        assert_eq!(delivery.status, DeliveryStatus::Completed);
        delivery.mark_failed();
        assert_eq!(delivery.status, DeliveryStatus::Completed);
        delivery.assign_to("d2");
        assert_eq!(delivery.assigned_drone.as_deref(), Some("d1"));
    }

    #[test]
    fn test_delivery_json_round_trip() {
        let mut delivery = Delivery::new(
            "a",
            Position::new(1.5, 2.5),
            1.0,
            3,
            t0(),
            t0() + chrono::Duration::hours(1),
        )
        .unwrap();
        delivery.assign_to("d1");

        let json = serde_json::to_string(&delivery).unwrap();
        assert!(json.contains("\"in_progress\""));
        let restored: Delivery = serde_json::from_str(&json).unwrap();
        assert_eq!(delivery, restored);
    }

    #[test]
    fn test_delivery_rejects_unknown_status() {
        let json = r#"{
            "id": "a",
            "position": [1.0, 1.0],
            "weight": 1.0,
            "priority": 3,
            "time_window_start": "2024-01-01T00:00:00Z",
            "time_window_end": "2024-01-01T01:00:00Z",
            "status": "lost"
        }"#;
        assert!(serde_json::from_str::<Delivery>(json).is_err());
    }

    #[test]
    fn test_assignment_covers_fleet() {
        let drones = vec![
            Drone::new("d1", 5.0, 100.0, 10.0, Position::new(0.0, 0.0)),
            Drone::new("d2", 5.0, 100.0, 10.0, Position::new(1.0, 1.0)),
        ];
        let mut assignment = Assignment::for_fleet(&drones);
        assert_eq!(assignment.drone_ids().count(), 2);
        assert!(assignment.is_empty());

        assignment.push("d1", "a");
        assignment.push("d1", "b");
        assert_eq!(assignment.deliveries_for("d1"), ["a", "b"]);
        assert!(assignment.deliveries_for("d2").is_empty());
        assert_eq!(assignment.assigned_count(), 2);
    }
}
