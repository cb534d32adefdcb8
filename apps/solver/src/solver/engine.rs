//! Placement Search Engine — iterative, bounds-expanding search.
//!
//! # Architecture
//! - `SearchEngine::solve` validates the graph, resolves footprints and returns
//!   a lazy `SolveStream`. Nothing runs until the stream is polled.
//! - Each poll runs at most one attempt: build the model for the current bound,
//!   call the oracle inside `tokio::task::spawn_blocking`, yield the attempt.
//! - After an unsat attempt the next poll grows the bound first.
//! - The first sat or unknown attempt is followed by the terminal solution.
//!   Running out of iterations yields a terminal "unsat" solution.
//!
//! Dropping the stream mid-attempt leaves the blocking oracle call running
//! until it notices the cancellation token or its deadline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::solver::catalog::BuildingCatalog;
use crate::solver::constraints::{PlacementItem, PlacementModel};
use crate::solver::models::{
    Bounds, FixedDimensionMode, LayoutSolution, PlacedBuilding, ProductionGraph, SolveEvent,
    SolveStatus, SolverAttempt, SolverConfig,
};
use crate::solver::oracle::{ConstraintOracle, OracleOutcome};

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Edge {edge} references unknown node {node}")]
    UnknownEdgeEndpoint { edge: String, node: String },

    #[error("Unknown building type '{kind}' for node {node}")]
    UnknownBuilding { node: String, kind: String },

    #[error("Solve cancelled")]
    Cancelled,

    #[error("Oracle task failed: {0}")]
    Oracle(String),
}

pub type SolveStream = BoxStream<'static, Result<SolveEvent, SolveError>>;

// ────────────────────────────────────────────────────────────────────────────
// Public entry point
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SearchEngine {
    catalog: Arc<BuildingCatalog>,
    oracle: Arc<dyn ConstraintOracle>,
}

impl SearchEngine {
    pub fn new(catalog: Arc<BuildingCatalog>, oracle: Arc<dyn ConstraintOracle>) -> Self {
        Self { catalog, oracle }
    }

    pub fn catalog(&self) -> &BuildingCatalog {
        &self.catalog
    }

    /// Starting bound for `graph`: a square just large enough to hold the
    /// total footprint area.
    pub fn estimate_initial_bounds(&self, graph: &ProductionGraph) -> Result<Bounds, SolveError> {
        let items = resolve_items(graph, &self.catalog)?;
        let side = estimate_initial_side(&items);
        Ok(Bounds {
            width: side,
            height: side,
        })
    }

    /// Validates `graph` and returns the lazy attempt/solution sequence.
    ///
    /// At most `config.max_iterations` attempts are made, strictly one after
    /// the other. Cancelling `cancel` stops the search; the stream then ends
    /// with `SolveError::Cancelled`.
    pub fn solve(
        &self,
        graph: &ProductionGraph,
        config: SolverConfig,
        cancel: CancellationToken,
    ) -> Result<SolveStream, SolveError> {
        let items = resolve_items(graph, &self.catalog)?;
        let bounds = initial_bounds(&items, &config);

        let state = SearchState {
            items: Arc::new(items),
            config,
            oracle: Arc::clone(&self.oracle),
            cancel,
            bounds,
            iteration: 0,
            attempts: Vec::new(),
            started: Instant::now(),
            phase: Phase::Search,
        };

        Ok(stream::unfold(state, next_event).boxed())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bounds
// ────────────────────────────────────────────────────────────────────────────

/// Smallest `side` with `side² >= Σ footprint area`.
pub fn estimate_initial_side(items: &[PlacementItem]) -> u32 {
    let total: u64 = items.iter().map(PlacementItem::area).sum();
    let mut side = (total as f64).sqrt().ceil() as u64;
    // Float sqrt can land one off for large areas.
    while side * side < total {
        side += 1;
    }
    while side > 0 && (side - 1) * (side - 1) >= total {
        side -= 1;
    }
    u32::try_from(side).unwrap_or(u32::MAX)
}

/// Explicit initial dimensions win over the area estimate; zero counts as unset.
pub fn initial_bounds(items: &[PlacementItem], config: &SolverConfig) -> Bounds {
    let side = estimate_initial_side(items);
    Bounds {
        width: config.initial_width.filter(|w| *w > 0).unwrap_or(side),
        height: config.initial_height.filter(|h| *h > 0).unwrap_or(side),
    }
}

/// Grows the bound after the unsat attempt numbered `iteration` (1-based).
///
/// With no fixed side, width grows after even iterations and height after
/// odd ones.
pub fn expand_bounds(bounds: Bounds, config: &SolverConfig, iteration: u32) -> Bounds {
    let step = config.step();
    let grow_width = match config.fixed_dimension_mode {
        FixedDimensionMode::Width => false,
        FixedDimensionMode::Height => true,
        FixedDimensionMode::None => iteration % 2 == 0,
    };
    if grow_width {
        Bounds {
            width: bounds.width.saturating_add(step),
            ..bounds
        }
    } else {
        Bounds {
            height: bounds.height.saturating_add(step),
            ..bounds
        }
    }
}

/// Checks node/edge references and looks up every footprint.
pub fn resolve_items(
    graph: &ProductionGraph,
    catalog: &BuildingCatalog,
) -> Result<Vec<PlacementItem>, SolveError> {
    let mut seen = HashSet::with_capacity(graph.nodes.len());
    let mut items = Vec::with_capacity(graph.nodes.len());

    for node in &graph.nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(SolveError::DuplicateNode(node.id.clone()));
        }
        let def = catalog
            .get(&node.kind)
            .ok_or_else(|| SolveError::UnknownBuilding {
                node: node.id.clone(),
                kind: node.kind.clone(),
            })?;
        items.push(PlacementItem {
            node_id: node.id.clone(),
            width: def.width,
            length: def.length,
        });
    }

    for edge in &graph.edges {
        for endpoint in [&edge.from, &edge.to] {
            if !seen.contains(endpoint.as_str()) {
                return Err(SolveError::UnknownEdgeEndpoint {
                    edge: edge.id.clone(),
                    node: endpoint.clone(),
                });
            }
        }
    }

    Ok(items)
}

// ────────────────────────────────────────────────────────────────────────────
// Search state machine (driven by `stream::unfold`)
// ────────────────────────────────────────────────────────────────────────────

enum Phase {
    Search,
    /// Last attempt was unsat; grow the bound before the next one.
    Expand,
    Finish(LayoutSolution),
    Done,
}

struct SearchState {
    items: Arc<Vec<PlacementItem>>,
    config: SolverConfig,
    oracle: Arc<dyn ConstraintOracle>,
    cancel: CancellationToken,
    bounds: Bounds,
    iteration: u32,
    attempts: Vec<SolverAttempt>,
    started: Instant,
    phase: Phase,
}

impl SearchState {
    fn solution(&self, status: SolveStatus, placements: Vec<PlacedBuilding>) -> LayoutSolution {
        LayoutSolution {
            status,
            bounds: self.bounds,
            placements,
            conveyors: Vec::new(),
            attempts: self.attempts.clone(),
            elapsed_ms: self.started.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

async fn next_event(
    mut state: SearchState,
) -> Option<(Result<SolveEvent, SolveError>, SearchState)> {
    match std::mem::replace(&mut state.phase, Phase::Done) {
        Phase::Done => return None,
        Phase::Finish(solution) => return Some((Ok(SolveEvent::Solution(solution)), state)),
        Phase::Expand => {
            state.bounds = expand_bounds(state.bounds, &state.config, state.iteration);
        }
        Phase::Search => {}
    }

    if state.cancel.is_cancelled() {
        return Some((Err(SolveError::Cancelled), state));
    }

    if state.iteration >= state.config.max_iterations {
        debug!(
            iterations = state.iteration,
            "Iteration limit reached without a solution"
        );
        let solution = state.solution(SolveStatus::Unsat, Vec::new());
        return Some((Ok(SolveEvent::Solution(solution)), state));
    }

    state.iteration += 1;
    let Bounds { width, height } = state.bounds;
    info!("Attempt {}: {} x {}", state.iteration, width, height);

    let (outcome, placements) = match run_attempt(&state).await {
        Ok(result) => result,
        Err(e) => return Some((Err(e), state)),
    };
    if state.cancel.is_cancelled() {
        return Some((Err(SolveError::Cancelled), state));
    }

    let attempt = SolverAttempt {
        iteration: state.iteration,
        width,
        height,
        status: outcome.status(),
    };
    info!(
        iteration = attempt.iteration,
        width,
        height,
        status = ?attempt.status,
        "Attempt finished"
    );
    state.attempts.push(attempt.clone());

    state.phase = match outcome {
        OracleOutcome::Sat(_) => Phase::Finish(state.solution(SolveStatus::Sat, placements)),
        OracleOutcome::Unknown => Phase::Finish(state.solution(SolveStatus::Unknown, Vec::new())),
        OracleOutcome::Unsat => Phase::Expand,
    };

    Some((Ok(SolveEvent::Attempt(attempt)), state))
}

/// One fresh oracle call at the current bound. CPU-bound, so it runs on the
/// blocking pool.
async fn run_attempt(
    state: &SearchState,
) -> Result<(OracleOutcome, Vec<PlacedBuilding>), SolveError> {
    let items = Arc::clone(&state.items);
    let oracle = Arc::clone(&state.oracle);
    let cancel = state.cancel.clone();
    let bounds = state.bounds;
    let deadline = Duration::from_millis(state.config.timeout_ms_per_attempt);

    tokio::task::spawn_blocking(move || {
        let placement = PlacementModel::build(&items, bounds.width, bounds.height);
        let outcome = oracle.check(&placement.model, deadline, &cancel);
        let placements = match &outcome {
            OracleOutcome::Sat(assignment) => placement.placements(&items, assignment),
            _ => Vec::new(),
        };
        (outcome, placements)
    })
    .await
    .map_err(|e| SolveError::Oracle(format!("spawn_blocking failed in attempt: {e}")))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
