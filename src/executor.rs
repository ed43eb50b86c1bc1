//! Assignment execution: fly the routes and stamp outcomes

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::geometry::path_length;
use crate::routing::AStarRouter;
use crate::types::{Assignment, Delivery, Drone};
use crate::zone::{path_blocked, NoFlyZone};
use crate::{DeliveryError, DeliveryResult};

/// Replays an assignment against the real fleet.
///
/// Deliveries already in a terminal state are skipped, which makes
/// execution a no-op for CSP-derived assignments and makes repeated
/// execution idempotent. Per-delivery failures are stamped on the
/// delivery; only a malformed assignment (unknown drone or delivery id)
/// is an error.
pub struct Executor {
    router: AStarRouter,
}

impl Executor {
    pub fn new(grid_size: (usize, usize)) -> Self {
        Self {
            router: AStarRouter::new(grid_size),
        }
    }

    pub fn execute(
        &self,
        assignment: &Assignment,
        drones: &mut [Drone],
        deliveries: &mut [Delivery],
        zones: &[NoFlyZone],
        now: DateTime<Utc>,
    ) -> DeliveryResult<()> {
        for drone_id in assignment.drone_ids() {
            if !drones.iter().any(|d| &d.id == drone_id) {
                return Err(DeliveryError::UnknownDrone(drone_id.clone()));
            }
        }

        // Fleet order, not map order, fixes the mutation sequence.
        for vi in 0..drones.len() {
            let assigned: Vec<String> = assignment.deliveries_for(&drones[vi].id).to_vec();
            for delivery_id in assigned {
                let di = deliveries
                    .iter()
                    .position(|d| d.id == delivery_id)
                    .ok_or_else(|| DeliveryError::UnknownDelivery(delivery_id.clone()))?;
                if deliveries[di].status.is_terminal() {
                    continue;
                }

                let drone = &mut drones[vi];
                let path = self.router.find_path(
                    drone.current_position,
                    deliveries[di].position,
                    drone,
                    zones,
                    now,
                );

                let flyable = path.len() >= 2
                    && !path_blocked(&path, zones, now)
                    && drone.has_sufficient_battery(path_length(&path));

                if flyable {
                    for seg in path.windows(2) {
                        drone.update_position(seg[1], seg[0].distance_to(seg[1]));
                    }
                    let drone_id = drone.id.clone();
                    deliveries[di].assign_to(&drone_id);
                    deliveries[di].mark_completed();
                } else {
                    debug!(delivery = %deliveries[di].id, "route invalid at execution time");
                    deliveries[di].mark_failed();
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Position;
    use crate::types::DeliveryStatus;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn fleet() -> Vec<Drone> {
        vec![Drone::new("1", 4.0, 12000.0, 8.0, Position::new(10.0, 10.0))]
    }

    fn pending_delivery(id: &str, position: Position) -> Delivery {
        Delivery::new(
            id,
            position,
            1.5,
            3,
            t0(),
            t0() + chrono::Duration::minutes(60),
        )
        .unwrap()
    }

    #[test]
    fn test_executes_assigned_delivery() {
        let mut drones = fleet();
        let mut deliveries = vec![pending_delivery("p1", Position::new(15.0, 25.0))];
        let mut assignment = Assignment::for_fleet(&drones);
        assignment.push("1", "p1");

        Executor::new((100, 100))
            .execute(&assignment, &mut drones, &mut deliveries, &[], t0())
            .unwrap();

        assert_eq!(deliveries[0].status, DeliveryStatus::Completed);
        assert_eq!(deliveries[0].assigned_drone.as_deref(), Some("1"));
        assert_eq!(drones[0].current_position, Position::new(15.0, 25.0));
        assert!(drones[0].route.len() >= 2);
        assert_eq!(drones[0].route[0], Position::new(10.0, 10.0));
        let expected = drones[0].battery_capacity - drones[0].distance_traveled();
        assert!((drones[0].current_battery - expected).abs() < 1e-9);
    }

    #[test]
    fn test_terminal_deliveries_are_skipped() {
        let mut drones = fleet();
        let mut deliveries = vec![pending_delivery("p1", Position::new(15.0, 25.0))];
        deliveries[0].mark_completed();
        let mut assignment = Assignment::for_fleet(&drones);
        assignment.push("1", "p1");

        Executor::new((100, 100))
            .execute(&assignment, &mut drones, &mut deliveries, &[], t0())
            .unwrap();

        // Already completed: the drone never moves.
        assert_eq!(drones[0].route.len(), 1);
        assert_eq!(drones[0].current_battery, drones[0].battery_capacity);
    }

    #[test]
    fn test_execution_is_idempotent() {
        let mut drones = fleet();
        let mut deliveries = vec![pending_delivery("p1", Position::new(15.0, 25.0))];
        let mut assignment = Assignment::for_fleet(&drones);
        assignment.push("1", "p1");

        let executor = Executor::new((100, 100));
        executor
            .execute(&assignment, &mut drones, &mut deliveries, &[], t0())
            .unwrap();
        let after_first = (drones[0].clone(), deliveries[0].clone());

        executor
            .execute(&assignment, &mut drones, &mut deliveries, &[], t0())
            .unwrap();
        assert_eq!(drones[0], after_first.0);
        assert_eq!(deliveries[0], after_first.1);
    }

    #[test]
    fn test_blocked_route_fails_delivery_in_place() {
        let zone = NoFlyZone::new(
            "box",
            vec![
                Position::new(12.0, 20.0),
                Position::new(20.0, 20.0),
                Position::new(20.0, 30.0),
                Position::new(12.0, 30.0),
            ],
            t0(),
            t0() + chrono::Duration::hours(2),
        )
        .unwrap();

        let mut drones = fleet();
        let mut deliveries = vec![pending_delivery("p1", Position::new(15.0, 25.0))];
        let mut assignment = Assignment::for_fleet(&drones);
        assignment.push("1", "p1");

        Executor::new((100, 100))
            .execute(&assignment, &mut drones, &mut deliveries, &[zone], t0())
            .unwrap();

        assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
        assert_eq!(drones[0].current_position, Position::new(10.0, 10.0));
        assert_eq!(drones[0].route.len(), 1);
    }

    #[test]
    fn test_insufficient_battery_fails_delivery() {
        let mut drones = fleet();
        drones[0].current_battery = 5.0;
        let mut deliveries = vec![pending_delivery("p1", Position::new(15.0, 25.0))];
        let mut assignment = Assignment::for_fleet(&drones);
        assignment.push("1", "p1");

        Executor::new((100, 100))
            .execute(&assignment, &mut drones, &mut deliveries, &[], t0())
            .unwrap();

        assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
        assert_eq!(drones[0].current_battery, 5.0);
    }

    #[test]
    fn test_unknown_ids_are_hard_errors() {
        let mut drones = fleet();
        let mut deliveries = vec![pending_delivery("p1", Position::new(15.0, 25.0))];

        let mut assignment = Assignment::for_fleet(&drones);
        assignment.push("ghost", "p1");
        assert!(matches!(
            Executor::new((100, 100)).execute(&assignment, &mut drones, &mut deliveries, &[], t0()),
            Err(DeliveryError::UnknownDrone(_))
        ));

        let mut assignment = Assignment::for_fleet(&drones);
        assignment.push("1", "ghost");
        assert!(matches!(
            Executor::new((100, 100)).execute(&assignment, &mut drones, &mut deliveries, &[], t0()),
            Err(DeliveryError::UnknownDelivery(_))
        ));
    }
}
