//! Population search over delivery-to-drone maps

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::feasibility::{DroneSnapshot, FeasibilityOracle, Infeasibility};
use crate::routing::AStarRouter;
use crate::solver::{DeliveryPlanner, DEFAULT_PLANNER_DEADLINE};
use crate::types::{Assignment, Delivery, Drone};
use crate::zone::NoFlyZone;
use crate::{DeliveryError, DeliveryResult};

const TOURNAMENT_SIZE: usize = 3;
const RANDOM_INJECTION_RATE: f64 = 0.2;
const MUTATION_RATE: f64 = 0.3;

const PRIORITY_BONUS: f64 = 10.0;
const BLOCKED_PENALTY: f64 = 100.0;
const ENERGY_WEIGHT: f64 = 2.0;
const WINDOW_PENALTY: f64 = 20.0;
const UNUSED_DRONE_PENALTY: f64 = 50.0;
const IMBALANCE_WEIGHT: f64 = 5.0;
const USED_DRONE_BONUS: f64 = 10.0;

/// Tuning knobs for [`GeneticPlanner`].
///
/// A fixed `seed` makes the whole run deterministic.
#[derive(Debug, Clone)]
pub struct GeneticConfig {
    pub population_size: usize,
    pub max_generations: usize,
    /// Stop after this many generations without improvement
    pub early_stop_rounds: usize,
    /// Hard wall-clock budget, checked at every loop boundary
    pub deadline: Duration,
    pub seed: Option<u64>,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: 30,
            max_generations: 100,
            early_stop_rounds: 5,
            deadline: DEFAULT_PLANNER_DEADLINE,
            seed: None,
        }
    }
}

/// A genome holds one drone index per delivery index; infeasible pairs are
/// not forbidden, only penalised by fitness.
type Genome = Vec<usize>;

/// Genetic assignment search.
///
/// Fitness is evaluated against each drone's initial state; assignments
/// are not chained within one genome. On deadline expiry the best-seen
/// individual is decoded and returned.
pub struct GeneticPlanner {
    router: AStarRouter,
    config: GeneticConfig,
}

impl GeneticPlanner {
    pub fn new(grid_size: (usize, usize)) -> Self {
        Self::with_config(grid_size, GeneticConfig::default())
    }

    pub fn with_config(grid_size: (usize, usize), config: GeneticConfig) -> Self {
        Self {
            router: AStarRouter::new(grid_size),
            config,
        }
    }

    fn fitness(
        &self,
        genome: &Genome,
        drones: &[Drone],
        deliveries: &[Delivery],
        oracle: &FeasibilityOracle<'_>,
        now: DateTime<Utc>,
    ) -> f64 {
        let mut score = 0.0;
        let mut counts = vec![0usize; drones.len()];

        for (di, &vi) in genome.iter().enumerate() {
            counts[vi] += 1;
            let drone = &drones[vi];
            let delivery = &deliveries[di];

            // Energy is penalised on the straight-line distance to the
            // drop, whatever the routed path length turns out to be.
            let distance = drone.current_position.distance_to(delivery.position);
            match oracle.evaluate(drone, &DroneSnapshot::of(drone, now), delivery) {
                Ok(_) => {
                    score += delivery.priority as f64 * PRIORITY_BONUS;
                    score -= (distance / drone.speed) * ENERGY_WEIGHT;
                }
                Err(Infeasibility::NoPath) | Err(Infeasibility::PathBlocked) => {
                    score -= BLOCKED_PENALTY;
                    continue;
                }
                Err(_) => {
                    score -= (distance / drone.speed) * ENERGY_WEIGHT;
                }
            }

            if !delivery.is_within_time_window(now) {
                score -= WINDOW_PENALTY;
            }
        }

        let used = counts.iter().filter(|&&c| c > 0).count();
        score -= (drones.len() - used) as f64 * UNUSED_DRONE_PENALTY;

        let mean = deliveries.len() as f64 / drones.len() as f64;
        for &count in &counts {
            if count > 0 {
                score -= (count as f64 - mean).powi(2) * IMBALANCE_WEIGHT;
            }
        }

        score += used as f64 * USED_DRONE_BONUS;
        score
    }
}

fn random_genome(rng: &mut StdRng, deliveries: usize, drones: usize) -> Genome {
    (0..deliveries).map(|_| rng.gen_range(0..drones)).collect()
}

fn crossover(rng: &mut StdRng, a: &Genome, b: &Genome) -> Genome {
    let point = rng.gen_range(0..a.len());
    let mut child = a[..point].to_vec();
    child.extend_from_slice(&b[point..]);
    child
}

fn mutate(rng: &mut StdRng, genome: &mut Genome, drones: usize) {
    for gene in genome.iter_mut() {
        if rng.gen::<f64>() < MUTATION_RATE {
            *gene = rng.gen_range(0..drones);
        }
    }
}

impl DeliveryPlanner for GeneticPlanner {
    fn plan(
        &mut self,
        drones: &mut [Drone],
        deliveries: &mut [Delivery],
        zones: &[NoFlyZone],
        now: DateTime<Utc>,
    ) -> DeliveryResult<Assignment> {
        if drones.is_empty() {
            return Err(DeliveryError::InvalidInput("no drones in fleet".to_string()));
        }
        if deliveries.is_empty() {
            return Err(DeliveryError::InvalidInput("no deliveries to plan".to_string()));
        }
        if self.config.population_size < 2 {
            return Err(DeliveryError::InvalidInput(
                "population size must be at least 2".to_string(),
            ));
        }

        let started = Instant::now();
        let expired = |started: Instant| started.elapsed() >= self.config.deadline;
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let oracle = FeasibilityOracle::new(&self.router, zones);

        let mut population: Vec<Genome> = (0..self.config.population_size)
            .map(|_| random_genome(&mut rng, deliveries.len(), drones.len()))
            .collect();

        let mut best: Option<(Genome, f64)> = None;
        let mut stale_rounds = 0;

        'generations: for generation in 0..self.config.max_generations {
            if expired(started) {
                info!(generation, "genetic deadline exceeded, keeping best seen");
                break;
            }

            // Score the population; the deadline binds mid-batch too.
            let mut scores = Vec::with_capacity(population.len());
            for genome in &population {
                if expired(started) {
                    info!(generation, "genetic deadline exceeded during scoring");
                    break 'generations;
                }
                scores.push(self.fitness(genome, drones, deliveries, &oracle, now));
            }

            let (gen_best_idx, gen_best) = scores
                .iter()
                .copied()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .expect("population is never empty");

            if best.as_ref().map_or(true, |(_, score)| gen_best > *score) {
                best = Some((population[gen_best_idx].clone(), gen_best));
                stale_rounds = 0;
            } else {
                stale_rounds += 1;
            }
            if stale_rounds >= self.config.early_stop_rounds {
                debug!(generation, "genetic early stop, no recent improvement");
                break;
            }

            // Tournament of 3 per slot, highest fitness wins
            let parents: Vec<usize> = (0..population.len())
                .map(|_| {
                    index::sample(&mut rng, population.len(), TOURNAMENT_SIZE.min(population.len()))
                        .iter()
                        .max_by(|&a, &b| scores[a].total_cmp(&scores[b]))
                        .expect("tournament is never empty")
                })
                .collect();

            let mut next = Vec::with_capacity(self.config.population_size);
            while next.len() < self.config.population_size {
                if expired(started) {
                    info!(generation, "genetic deadline exceeded during breeding");
                    break 'generations;
                }
                if rng.gen::<f64>() < RANDOM_INJECTION_RATE {
                    next.push(random_genome(&mut rng, deliveries.len(), drones.len()));
                } else {
                    let pair = index::sample(&mut rng, parents.len(), 2);
                    let mut child = crossover(
                        &mut rng,
                        &population[parents[pair.index(0)]],
                        &population[parents[pair.index(1)]],
                    );
                    mutate(&mut rng, &mut child, drones.len());
                    next.push(child);
                }
            }
            population = next;
        }

        // With no scored individual the first one stands in.
        let best_genome = match best {
            Some((genome, _)) => genome,
            None => population
                .first()
                .cloned()
                .unwrap_or_else(|| random_genome(&mut rng, deliveries.len(), drones.len())),
        };

        let mut assignment = Assignment::for_fleet(drones);
        for (di, &vi) in best_genome.iter().enumerate() {
            assignment.push(&drones[vi].id, &deliveries[di].id);
        }

        // Stamp each delivery per its final oracle verdict; the executor
        // flies the feasible ones and completes them.
        for (di, &vi) in best_genome.iter().enumerate() {
            let drone = &drones[vi];
            match oracle.evaluate(drone, &DroneSnapshot::of(drone, now), &deliveries[di]) {
                Ok(_) => {
                    let drone_id = drone.id.clone();
                    deliveries[di].assign_to(&drone_id);
                }
                Err(_) => deliveries[di].mark_failed(),
            }
        }

        Ok(assignment)
    }

    fn name(&self) -> &'static str {
        "genetic"
    }
}
