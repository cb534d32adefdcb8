//! Constraint Oracle — the narrow contract the search engine drives.
//!
//! A `ConstraintModel` is a set of named integer variables, bound constraints,
//! disjunctions of difference constraints (`before + gap <= after`) and
//! lexicographic orderings between variable tuples. That is what axis-aligned
//! non-overlap plus symmetry breaking between identical footprints needs.
//!
//! Backends implement `ConstraintOracle`. The engine holds an
//! `Arc<dyn ConstraintOracle>`, so a SAT/SMT binding or a heuristic placer can
//! replace `BacktrackingOracle` without touching the iteration logic.
//!
//! `check` is synchronous and CPU-bound; callers run it inside
//! `tokio::task::spawn_blocking`.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::solver::models::SolveStatus;

pub type VarId = usize;

// ────────────────────────────────────────────────────────────────────────────
// Model
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntVar {
    pub name: String,
}

/// `before + gap <= after`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precedence {
    pub before: VarId,
    pub gap: i64,
    pub after: VarId,
}

impl Precedence {
    fn holds(&self, values: &[i64]) -> bool {
        values[self.before].saturating_add(self.gap) <= values[self.after]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// `var >= value`
    AtLeast { var: VarId, value: i64 },
    /// `var + offset <= limit`
    AtMost { var: VarId, offset: i64, limit: i64 },
    /// `var == value`
    Equals { var: VarId, value: i64 },
    /// At least one precedence holds.
    AnyOf(Vec<Precedence>),
    /// `first <= second`, compared lexicographically. Both have the same length.
    LexLeq { first: Vec<VarId>, second: Vec<VarId> },
}

/// Lexicographic comparison over the prefix of positions already decided.
enum LexState {
    Holds,
    /// Not decided yet by the assigned variables.
    Open,
    /// Violated at position `at`.
    Broken { at: usize },
}

/// `is_set(var)` tells whether `values[var]` is meaningful yet.
fn lex_state(
    first: &[VarId],
    second: &[VarId],
    values: &[i64],
    is_set: impl Fn(VarId) -> bool,
) -> LexState {
    for (at, (&a, &b)) in first.iter().zip(second).enumerate() {
        if !is_set(a) || !is_set(b) {
            return LexState::Open;
        }
        match values[a].cmp(&values[b]) {
            std::cmp::Ordering::Less => return LexState::Holds,
            std::cmp::Ordering::Greater => return LexState::Broken { at },
            std::cmp::Ordering::Equal => {}
        }
    }
    LexState::Holds
}

#[derive(Debug, Clone, Default)]
pub struct ConstraintModel {
    vars: Vec<IntVar>,
    constraints: Vec<Constraint>,
}

impl ConstraintModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_var(&mut self, name: impl Into<String>) -> VarId {
        self.vars.push(IntVar { name: name.into() });
        self.vars.len() - 1
    }

    pub fn add(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn vars(&self) -> &[IntVar] {
        &self.vars
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }
}

/// Values for every variable of a model, indexed by `VarId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    values: Vec<i64>,
}

impl Assignment {
    pub fn new(values: Vec<i64>) -> Self {
        Self { values }
    }

    pub fn value(&self, var: VarId) -> i64 {
        self.values[var]
    }

    /// True when every constraint of `model` holds under this assignment.
    #[cfg(test)]
    pub fn satisfies(&self, model: &ConstraintModel) -> bool {
        if self.values.len() != model.vars().len() {
            return false;
        }
        model.constraints().iter().all(|c| match c {
            Constraint::AtLeast { var, value } => self.values[*var] >= *value,
            Constraint::AtMost { var, offset, limit } => {
                self.values[*var].saturating_add(*offset) <= *limit
            }
            Constraint::Equals { var, value } => self.values[*var] == *value,
            Constraint::AnyOf(options) => options.iter().any(|p| p.holds(&self.values)),
            Constraint::LexLeq { first, second } => !matches!(
                lex_state(first, second, &self.values, |_| true),
                LexState::Broken { .. }
            ),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleOutcome {
    Sat(Assignment),
    Unsat,
    /// Deadline, cancellation or a model this backend cannot search.
    Unknown,
}

impl OracleOutcome {
    pub fn status(&self) -> SolveStatus {
        match self {
            OracleOutcome::Sat(_) => SolveStatus::Sat,
            OracleOutcome::Unsat => SolveStatus::Unsat,
            OracleOutcome::Unknown => SolveStatus::Unknown,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Solves one model per call. Calls are independent; no state carries over.
///
/// Implementations must return `Unknown` once `deadline` has elapsed or
/// `cancel` fires, and must never return `Sat` with an assignment that
/// violates the model.
pub trait ConstraintOracle: Send + Sync {
    fn check(
        &self,
        model: &ConstraintModel,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> OracleOutcome;
}

// ────────────────────────────────────────────────────────────────────────────
// BacktrackingOracle — default backend
// ────────────────────────────────────────────────────────────────────────────

/// Exhaustive depth-first search over finite integer domains.
///
/// Variables are assigned in `VarId` order, values ascending. Each
/// disjunction is checked as soon as its last variable is assigned; when it
/// fails, the current variable jumps straight to the smallest value that
/// could make one of its precedences hold. Lexicographic orderings are checked
/// on every assignment that touches them, so permutations of interchangeable
/// items are cut off early. Exhausting the tree proves UNSAT.
#[derive(Debug, Default, Clone, Copy)]
pub struct BacktrackingOracle;

/// Nodes visited between deadline/cancel checks.
const CHECK_INTERVAL: u64 = 1024;

impl ConstraintOracle for BacktrackingOracle {
    fn check(
        &self,
        model: &ConstraintModel,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> OracleOutcome {
        let stop_at = Instant::now() + deadline;
        let mut search = match Search::new(model, stop_at, cancel) {
            Ok(search) => search,
            Err(outcome) => return outcome,
        };

        let outcome = match search.assign(0) {
            Step::Found => OracleOutcome::Sat(Assignment::new(search.values)),
            Step::Exhausted => OracleOutcome::Unsat,
            Step::Interrupted => OracleOutcome::Unknown,
        };
        debug!(
            vars = model.vars().len(),
            nodes = search.nodes,
            status = ?outcome.status(),
            "Backtracking search finished"
        );
        outcome
    }
}

enum Step {
    Found,
    Exhausted,
    Interrupted,
}

struct Search<'a> {
    domains: Vec<(i64, i64)>,
    clauses: Vec<&'a [Precedence]>,
    /// Clause indices keyed by the highest variable they mention.
    clauses_at: Vec<Vec<usize>>,
    orderings: Vec<(&'a [VarId], &'a [VarId])>,
    /// Ordering indices keyed by every variable they mention.
    orderings_at: Vec<Vec<usize>>,
    values: Vec<i64>,
    nodes: u64,
    stop_at: Instant,
    cancel: &'a CancellationToken,
}

impl<'a> Search<'a> {
    fn new(
        model: &'a ConstraintModel,
        stop_at: Instant,
        cancel: &'a CancellationToken,
    ) -> Result<Self, OracleOutcome> {
        let n = model.vars().len();
        let mut domains = vec![(i64::MIN, i64::MAX); n];
        let mut clauses = Vec::new();
        let mut clauses_at = vec![Vec::new(); n];
        let mut orderings = Vec::new();
        let mut orderings_at: Vec<Vec<usize>> = vec![Vec::new(); n];

        for constraint in model.constraints() {
            match constraint {
                Constraint::AtLeast { var, value } => {
                    domains[*var].0 = domains[*var].0.max(*value);
                }
                Constraint::AtMost { var, offset, limit } => {
                    domains[*var].1 = domains[*var].1.min(limit.saturating_sub(*offset));
                }
                Constraint::Equals { var, value } => {
                    domains[*var].0 = domains[*var].0.max(*value);
                    domains[*var].1 = domains[*var].1.min(*value);
                }
                Constraint::AnyOf(options) => {
                    let Some(trigger) = options.iter().map(|p| p.before.max(p.after)).max() else {
                        return Err(OracleOutcome::Unsat);
                    };
                    clauses_at[trigger].push(clauses.len());
                    clauses.push(options.as_slice());
                }
                Constraint::LexLeq { first, second } => {
                    for &var in first.iter().chain(second) {
                        if !orderings_at[var].contains(&orderings.len()) {
                            orderings_at[var].push(orderings.len());
                        }
                    }
                    orderings.push((first.as_slice(), second.as_slice()));
                }
            }
        }

        for (var, (lo, hi)) in domains.iter().enumerate() {
            if lo > hi {
                return Err(OracleOutcome::Unsat);
            }
            if *lo == i64::MIN || *hi == i64::MAX {
                warn!(var = %model.vars()[var].name, "Variable has no finite domain");
                return Err(OracleOutcome::Unknown);
            }
        }

        let search = Self {
            domains,
            clauses,
            clauses_at,
            orderings,
            orderings_at,
            values: vec![0; n],
            nodes: 0,
            stop_at,
            cancel,
        };
        if search.interrupted() {
            return Err(OracleOutcome::Unknown);
        }
        Ok(search)
    }

    fn interrupted(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.stop_at
    }

    fn assign(&mut self, depth: usize) -> Step {
        if depth == self.values.len() {
            return Step::Found;
        }

        let (lo, hi) = self.domains[depth];
        let mut value = lo;
        while value <= hi {
            self.nodes += 1;
            if self.nodes % CHECK_INTERVAL == 0 && self.interrupted() {
                return Step::Interrupted;
            }

            self.values[depth] = value;
            match self.conflict(depth) {
                Conflict::None => match self.assign(depth + 1) {
                    Step::Exhausted => value += 1,
                    other => return other,
                },
                Conflict::JumpTo(next) => value = next,
                Conflict::Dead => break,
            }
        }
        Step::Exhausted
    }

    /// Checks the clauses completed by assigning `depth`.
    fn conflict(&self, depth: usize) -> Conflict {
        let current = self.values[depth];
        let mut jump: Option<i64> = None;

        for &idx in &self.clauses_at[depth] {
            let clause = self.clauses[idx];
            if clause.iter().any(|p| p.holds(&self.values)) {
                continue;
            }
            // Raising the current value only helps precedences where it is `after`.
            let candidate = clause
                .iter()
                .filter(|p| p.after == depth && p.before != depth)
                .map(|p| self.values[p.before].saturating_add(p.gap))
                .min();
            match candidate {
                Some(c) if c > current => jump = Some(jump.map_or(c, |j| j.max(c))),
                _ => return Conflict::Dead,
            }
        }

        for &idx in &self.orderings_at[depth] {
            let (first, second) = self.orderings[idx];
            match lex_state(first, second, &self.values, |var| var <= depth) {
                LexState::Holds | LexState::Open => {}
                // Only raising the current value up to its counterpart can help.
                LexState::Broken { at } if second[at] == depth => {
                    let c = self.values[first[at]];
                    jump = Some(jump.map_or(c, |j| j.max(c)));
                }
                LexState::Broken { .. } => return Conflict::Dead,
            }
        }

        jump.map_or(Conflict::None, Conflict::JumpTo)
    }
}

enum Conflict {
    None,
    JumpTo(i64),
    Dead,
}
