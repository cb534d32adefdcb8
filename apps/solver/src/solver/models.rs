//! Data contracts shared between the search engine and the hub layer.
//!
//! Every type here maps one-to-one onto its JSON wire shape through `serde`.
//! Graph inputs keep the field names of existing production graphs
//! (`type`, `from_id`, `to_id`, `belts`, `target_product`); placements report
//! a footprint as `width` (y extent) and `length` (x extent), the same terms
//! the building catalog uses.

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Production graph (input)
// ────────────────────────────────────────────────────────────────────────────

/// One machine in the production chain. `kind` names a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A material flow between two machines. Not used for placement yet,
/// only validated against the node set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialFlowEdge {
    pub id: String,
    #[serde(rename = "from_id")]
    pub from: String,
    #[serde(rename = "to_id")]
    pub to: String,
    pub item: String,
    #[serde(rename = "belts")]
    pub throughput: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionGraph {
    pub id: String,
    #[serde(rename = "target_product")]
    pub target_item: String,
    #[serde(rename = "target_belts")]
    pub target_throughput: u32,
    pub nodes: Vec<MachineNode>,
    #[serde(default)]
    pub edges: Vec<MaterialFlowEdge>,
}

// ────────────────────────────────────────────────────────────────────────────
// Solver configuration (input)
// ────────────────────────────────────────────────────────────────────────────

/// Which side of the bounding box stays put while the search expands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixedDimensionMode {
    #[default]
    None,
    /// Width is fixed; only height grows.
    Width,
    /// Height is fixed; only width grows.
    Height,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default)]
    pub initial_width: Option<u32>,
    #[serde(default)]
    pub initial_height: Option<u32>,
    #[serde(default)]
    pub fixed_dimension_mode: FixedDimensionMode,
    #[serde(default = "default_expansion_step")]
    pub expansion_step: u32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms_per_attempt: u64,
}

fn default_expansion_step() -> u32 {
    1
}

fn default_max_iterations() -> u32 {
    50
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            initial_width: None,
            initial_height: None,
            fixed_dimension_mode: FixedDimensionMode::None,
            expansion_step: default_expansion_step(),
            max_iterations: default_max_iterations(),
            timeout_ms_per_attempt: default_timeout_ms(),
        }
    }
}

impl SolverConfig {
    /// Step used when growing a bound. Never below 1.
    pub fn step(&self) -> u32 {
        self.expansion_step.max(1)
    }

    /// Applies server-side ceilings to client-supplied limits.
    pub fn clamped(mut self, max_iterations_limit: u32, max_timeout_ms: u64) -> Self {
        self.expansion_step = self.step();
        self.max_iterations = self.max_iterations.min(max_iterations_limit);
        self.timeout_ms_per_attempt = self.timeout_ms_per_attempt.min(max_timeout_ms);
        self
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Search output
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of one oracle call, and the terminal status of a whole solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveStatus {
    Sat,
    Unsat,
    /// The oracle hit its deadline. Says nothing about feasibility.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverAttempt {
    /// 1-based.
    pub iteration: u32,
    pub width: u32,
    pub height: u32,
    pub status: SolveStatus,
}

/// A building pinned to the grid. `length` runs along x, `width` along y.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedBuilding {
    pub node_id: String,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

/// One routed belt tile. Routing is not implemented, so solutions always
/// carry an empty list; the type pins down the shape clients expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConveyorSegment {
    pub x: i64,
    pub y: i64,
    pub in_direction: Direction,
    pub out_direction: Direction,
    #[serde(default)]
    pub is_bridge: bool,
    #[serde(default)]
    pub edge_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSolution {
    pub status: SolveStatus,
    pub bounds: Bounds,
    /// Empty unless `status` is `Sat`.
    pub placements: Vec<PlacedBuilding>,
    pub conveyors: Vec<ConveyorSegment>,
    pub attempts: Vec<SolverAttempt>,
    pub elapsed_ms: f64,
}

/// One element of the lazy solve sequence: zero or more attempts, then
/// exactly one solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum SolveEvent {
    Attempt(SolverAttempt),
    Solution(LayoutSolution),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_defaults_when_fields_missing() {
        let config: SolverConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, SolverConfig::default());
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.timeout_ms_per_attempt, 30_000);
        assert_eq!(config.fixed_dimension_mode, FixedDimensionMode::None);
    }

    #[test]
    fn test_config_parses_fixed_dimension_mode() {
        let config: SolverConfig = serde_json::from_value(json!({
            "initial_width": 10,
            "fixed_dimension_mode": "height",
            "expansion_step": 2
        }))
        .unwrap();
        assert_eq!(config.initial_width, Some(10));
        assert_eq!(config.initial_height, None);
        assert_eq!(config.fixed_dimension_mode, FixedDimensionMode::Height);
        assert_eq!(config.step(), 2);
    }

    #[test]
    fn test_zero_step_clamped_to_one() {
        let config = SolverConfig {
            expansion_step: 0,
            ..SolverConfig::default()
        };
        assert_eq!(config.step(), 1);
        assert_eq!(config.clamped(500, 120_000).expansion_step, 1);
    }

    #[test]
    fn test_clamped_applies_server_limits() {
        let config = SolverConfig {
            max_iterations: 10_000,
            timeout_ms_per_attempt: 10_000_000,
            ..SolverConfig::default()
        }
        .clamped(500, 120_000);
        assert_eq!(config.max_iterations, 500);
        assert_eq!(config.timeout_ms_per_attempt, 120_000);
    }

    #[test]
    fn test_graph_uses_wire_field_names() {
        let graph: ProductionGraph = serde_json::from_value(json!({
            "id": "g1",
            "target_product": "steel",
            "target_belts": 2,
            "nodes": [{"id": "a", "label": "Refinery A", "type": "refinery"}],
            "edges": [{"id": "e1", "from_id": "a", "to_id": "a", "item": "ore", "belts": 1}]
        }))
        .unwrap();
        assert_eq!(graph.target_item, "steel");
        assert_eq!(graph.nodes[0].kind, "refinery");
        assert_eq!(graph.edges[0].from, "a");
        assert_eq!(graph.edges[0].throughput, 1);
    }

    #[test]
    fn test_attempt_event_shape() {
        let event = SolveEvent::Attempt(SolverAttempt {
            iteration: 1,
            width: 3,
            height: 3,
            status: SolveStatus::Sat,
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "attempt",
                "data": {"iteration": 1, "width": 3, "height": 3, "status": "sat"}
            })
        );
    }

    #[test]
    fn test_solution_event_shape() {
        let event = SolveEvent::Solution(LayoutSolution {
            status: SolveStatus::Unknown,
            bounds: Bounds {
                width: 4,
                height: 5,
            },
            placements: vec![],
            conveyors: vec![],
            attempts: vec![],
            elapsed_ms: 1.5,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "solution");
        assert_eq!(value["data"]["status"], "unknown");
        assert_eq!(value["data"]["bounds"], json!({"width": 4, "height": 5}));
        assert_eq!(value["data"]["conveyors"], json!([]));
    }

    #[test]
    fn test_placement_reports_width_and_length() {
        let placed = PlacedBuilding {
            node_id: "f1".to_string(),
            x: 3,
            y: 0,
            width: 3,
            length: 6,
        };
        assert_eq!(
            serde_json::to_value(&placed).unwrap(),
            json!({"node_id": "f1", "x": 3, "y": 0, "width": 3, "length": 6})
        );
    }
}
