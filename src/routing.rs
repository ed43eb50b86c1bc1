//! Grid-based A* route search through time-active no-fly zones

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::geometry::Position;
use crate::types::Drone;
use crate::zone::NoFlyZone;

/// Distance below which cells are penalised for hugging a zone boundary
const PROXIMITY_THRESHOLD: f64 = 5.0;
/// Penalty weight per unit of boundary proximity
const PROXIMITY_WEIGHT: f64 = 2.0;

const NEIGHBOR_OFFSETS: [(i64, i64); 8] = [
    (0, 1),
    (1, 0),
    (0, -1),
    (-1, 0),
    (1, 1),
    (-1, 1),
    (1, -1),
    (-1, -1),
];

type Cell = (i64, i64);

/// Frontier entry ordered by lowest f-score; the insertion counter is a
/// strict tie-breaker so pops are deterministic.
#[derive(Debug)]
struct FrontierNode {
    f: f64,
    counter: u64,
    cell: Cell,
}

impl PartialEq for FrontierNode {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f && self.counter == other.counter
    }
}

impl Eq for FrontierNode {}

impl Ord for FrontierNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert to pop the lowest f first
        other
            .f
            .partial_cmp(&self.f)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.counter.cmp(&self.counter))
    }
}

impl PartialOrd for FrontierNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* router over an 8-connected grid.
///
/// Real coordinate `(x, y)` maps to cell `(floor(x / r), floor(y / r))`
/// for resolution `r`. Step cost is the Euclidean distance between cell
/// centres (1 or sqrt(2)).
///
/// The heuristic adds a proximity penalty near active zone boundaries and
/// is therefore NOT admissible: paths are biased away from zone edges at
/// the cost of strict optimality, which produces smoother routes.
#[derive(Debug, Clone)]
pub struct AStarRouter {
    grid_size: (usize, usize),
    resolution: f64,
}

impl AStarRouter {
    pub fn new(grid_size: (usize, usize)) -> Self {
        Self::with_resolution(grid_size, 1.0)
    }

    pub fn with_resolution(grid_size: (usize, usize), resolution: f64) -> Self {
        Self {
            grid_size,
            resolution,
        }
    }

    pub fn grid_size(&self) -> (usize, usize) {
        self.grid_size
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Search for an obstacle-avoiding route from `start` to `goal`,
    /// evaluated against the zones active at `at`.
    ///
    /// Returns a sequence of real coordinates whose first element is the
    /// caller's exact start, or an empty sequence when no route exists.
    /// The drone reference is kept for future per-vehicle costs and is
    /// not consulted today.
    pub fn find_path(
        &self,
        start: Position,
        goal: Position,
        _drone: &Drone,
        zones: &[NoFlyZone],
        at: DateTime<Utc>,
    ) -> Vec<Position> {
        let start_cell = self.to_cell(start);
        let goal_cell = self.to_cell(goal);

        // The search cannot begin inside an active zone.
        let start_real = self.to_real(start_cell);
        if zones
            .iter()
            .any(|zone| zone.is_active(at) && zone.contains(start_real))
        {
            return Vec::new();
        }

        let mut open: BinaryHeap<FrontierNode> = BinaryHeap::new();
        let mut closed: HashSet<Cell> = HashSet::new();
        let mut came_from: HashMap<Cell, Cell> = HashMap::new();
        let mut g_score: HashMap<Cell, f64> = HashMap::new();

        g_score.insert(start_cell, 0.0);
        open.push(FrontierNode {
            f: self.heuristic(start_cell, goal_cell, zones, at),
            counter: 0,
            cell: start_cell,
        });
        let mut counter: u64 = 1;

        while let Some(FrontierNode { cell: current, .. }) = open.pop() {
            if current == goal_cell {
                return self.reconstruct(&came_from, current, start);
            }

            closed.insert(current);

            for neighbor in self.neighbors(current) {
                if closed.contains(&neighbor) || !self.step_is_clear(current, neighbor, zones, at) {
                    continue;
                }

                let tentative = g_score[&current] + cell_distance(current, neighbor);
                if g_score.get(&neighbor).map_or(true, |&g| tentative < g) {
                    came_from.insert(neighbor, current);
                    g_score.insert(neighbor, tentative);
                    open.push(FrontierNode {
                        f: tentative + self.heuristic(neighbor, goal_cell, zones, at),
                        counter,
                        cell: neighbor,
                    });
                    counter += 1;
                }
            }
        }

        Vec::new()
    }

    fn to_cell(&self, p: Position) -> Cell {
        (
            (p.x / self.resolution).floor() as i64,
            (p.y / self.resolution).floor() as i64,
        )
    }

    fn to_real(&self, cell: Cell) -> Position {
        Position::new(cell.0 as f64 * self.resolution, cell.1 as f64 * self.resolution)
    }

    fn neighbors(&self, cell: Cell) -> impl Iterator<Item = Cell> + '_ {
        let (w, h) = (self.grid_size.0 as i64, self.grid_size.1 as i64);
        NEIGHBOR_OFFSETS
            .iter()
            .map(move |&(dx, dy)| (cell.0 + dx, cell.1 + dy))
            .filter(move |&(x, y)| x >= 0 && x < w && y >= 0 && y < h)
    }

    /// A grid step is clear when its real segment avoids every active zone
    fn step_is_clear(&self, from: Cell, to: Cell, zones: &[NoFlyZone], at: DateTime<Utc>) -> bool {
        let a = self.to_real(from);
        let b = self.to_real(to);
        !zones
            .iter()
            .any(|zone| zone.is_active(at) && zone.intersects_segment(a, b))
    }

    fn heuristic(&self, cell: Cell, goal: Cell, zones: &[NoFlyZone], at: DateTime<Utc>) -> f64 {
        let base = cell_distance(cell, goal);
        let real = self.to_real(cell);
        let mut penalty = 0.0;
        for zone in zones.iter().filter(|z| z.is_active(at)) {
            let distance = zone.distance_to_boundary(real);
            if distance < PROXIMITY_THRESHOLD {
                penalty += (PROXIMITY_THRESHOLD - distance) * PROXIMITY_WEIGHT;
            }
        }
        base + penalty
    }

    /// Walk parent pointers back from the goal, then prepend the caller's
    /// exact (unquantized) start position.
    fn reconstruct(&self, came_from: &HashMap<Cell, Cell>, goal: Cell, start: Position) -> Vec<Position> {
        let mut path = Vec::new();
        let mut current = goal;
        while let Some(&previous) = came_from.get(&current) {
            path.push(self.to_real(current));
            current = previous;
        }
        path.push(start);
        path.reverse();
        path
    }
}

fn cell_distance(a: Cell, b: Cell) -> f64 {
    let dx = (a.0 - b.0) as f64;
    let dy = (a.1 - b.1) as f64;
    (dx * dx + dy * dy).sqrt()
}
