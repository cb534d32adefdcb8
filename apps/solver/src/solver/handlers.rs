//! Hub methods exposing the search engine.
//!
//! - `solve(graph, config)` — streaming; `{"type":"attempt",...}` per attempt,
//!   then one `{"type":"solution",...}`.
//! - `getBuildings()` — the building catalog.
//! - `estimateBounds(graph)` — the starting bound `solve` would use.

use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tracing::info;

use crate::hub::{CallerContext, Hub, HubMethod, ItemStream, StreamingHubMethod};
use crate::solver::engine::SearchEngine;
use crate::solver::models::{ProductionGraph, SolveEvent, SolverConfig};

/// Server-side ceilings applied to every client `SolverConfig`.
#[derive(Debug, Clone, Copy)]
pub struct SolveLimits {
    pub max_iterations: u32,
    pub max_timeout_ms: u64,
}

pub fn register(hub: &mut Hub, engine: SearchEngine, limits: SolveLimits) {
    hub.on_stream(
        "solve",
        SolveMethod {
            engine: engine.clone(),
            limits,
        },
    );
    hub.on(
        "getBuildings",
        GetBuildingsMethod {
            engine: engine.clone(),
        },
    );
    hub.on("estimateBounds", EstimateBoundsMethod { engine });
}

// ────────────────────────────────────────────────────────────────────────────
// solve
// ────────────────────────────────────────────────────────────────────────────

pub struct SolveMethod {
    engine: SearchEngine,
    limits: SolveLimits,
}

#[async_trait]
impl StreamingHubMethod for SolveMethod {
    async fn invoke(&self, ctx: &CallerContext, args: Vec<Value>) -> anyhow::Result<ItemStream> {
        let mut args = args.into_iter();
        let graph = parse_graph(args.next())?;
        let config = match args.next() {
            Some(value) if !value.is_null() => {
                serde_json::from_value::<SolverConfig>(value).context("Invalid solver config")?
            }
            _ => SolverConfig::default(),
        }
        .clamped(self.limits.max_iterations, self.limits.max_timeout_ms);

        info!(
            connection_id = %ctx.connection_id,
            invocation_id = ctx.invocation_id.as_deref().unwrap_or("-"),
            "Starting solve for {} ({} nodes)",
            graph.target_item,
            graph.nodes.len()
        );

        let events = self.engine.solve(&graph, config, ctx.cancel.clone())?;
        let target = graph.target_item;

        Ok(events
            .map(move |event| -> anyhow::Result<Value> {
                let event = event?;
                if let SolveEvent::Solution(solution) = &event {
                    info!(
                        status = ?solution.status,
                        attempts = solution.attempts.len(),
                        elapsed_ms = solution.elapsed_ms,
                        "Solve completed for {}",
                        target
                    );
                }
                Ok(serde_json::to_value(&event)?)
            })
            .boxed())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// getBuildings / estimateBounds
// ────────────────────────────────────────────────────────────────────────────

pub struct GetBuildingsMethod {
    engine: SearchEngine,
}

#[async_trait]
impl HubMethod for GetBuildingsMethod {
    async fn invoke(&self, _ctx: &CallerContext, _args: Vec<Value>) -> anyhow::Result<Value> {
        Ok(serde_json::to_value(self.engine.catalog().all())?)
    }
}

pub struct EstimateBoundsMethod {
    engine: SearchEngine,
}

#[async_trait]
impl HubMethod for EstimateBoundsMethod {
    async fn invoke(&self, _ctx: &CallerContext, args: Vec<Value>) -> anyhow::Result<Value> {
        let graph = parse_graph(args.into_iter().next())?;
        let bounds = self.engine.estimate_initial_bounds(&graph)?;
        Ok(serde_json::to_value(bounds)?)
    }
}

fn parse_graph(value: Option<Value>) -> anyhow::Result<ProductionGraph> {
    let value = value.context("Missing production graph argument")?;
    serde_json::from_value(value).context("Invalid production graph")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::catalog::BuildingCatalog;
    use crate::solver::oracle::BacktrackingOracle;
    use serde_json::json;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn engine() -> SearchEngine {
        SearchEngine::new(
            Arc::new(BuildingCatalog::standard()),
            Arc::new(BacktrackingOracle),
        )
    }

    fn limits() -> SolveLimits {
        SolveLimits {
            max_iterations: 3,
            max_timeout_ms: 5_000,
        }
    }

    fn ctx() -> CallerContext {
        CallerContext {
            connection_id: "conn-test".to_string(),
            invocation_id: Some("1".to_string()),
            cancel: CancellationToken::new(),
        }
    }

    fn steel_graph() -> Value {
        json!({
            "id": "steel",
            "target_product": "steel_bar",
            "target_belts": 1,
            "nodes": [
                {"id": "r1", "label": "Refinery", "type": "refinery"},
                {"id": "c1", "label": "Crusher", "type": "crusher"},
                {"id": "f1", "label": "Filler", "type": "filler"}
            ],
            "edges": [
                {"id": "e1", "from_id": "c1", "to_id": "r1", "item": "ore", "belts": 1},
                {"id": "e2", "from_id": "r1", "to_id": "f1", "item": "ingot", "belts": 1}
            ]
        })
    }

    async fn run_solve(args: Vec<Value>) -> anyhow::Result<Vec<Value>> {
        let method = SolveMethod {
            engine: engine(),
            limits: limits(),
        };
        let items = method.invoke(&ctx(), args).await?;
        items.collect::<Vec<_>>().await.into_iter().collect()
    }

    #[tokio::test]
    async fn test_solve_streams_attempts_then_solution() {
        let items = run_solve(vec![steel_graph(), json!({})]).await.unwrap();
        let last = items.last().unwrap();
        assert_eq!(last["type"], "solution");
        assert_eq!(last["data"]["status"], "sat");
        assert_eq!(last["data"]["placements"].as_array().unwrap().len(), 3);
        assert_eq!(last["data"]["conveyors"], json!([]));

        let attempts = &items[..items.len() - 1];
        assert!(!attempts.is_empty());
        for (n, attempt) in attempts.iter().enumerate() {
            assert_eq!(attempt["type"], "attempt");
            assert_eq!(attempt["data"]["iteration"], json!(n + 1));
        }
        // 3×3 + 3×3 + 3×6 = 36 → starts at 6 × 6, which fits exactly.
        assert_eq!(
            attempts[0]["data"],
            json!({"iteration": 1, "width": 6, "height": 6, "status": "sat"})
        );
    }

    #[tokio::test]
    async fn test_solve_config_is_optional() {
        let items = run_solve(vec![steel_graph()]).await.unwrap();
        assert_eq!(items.last().unwrap()["type"], "solution");
    }

    #[tokio::test]
    async fn test_solve_clamps_max_iterations() {
        let config = json!({"initial_width": 1, "initial_height": 1, "max_iterations": 100});
        let items = run_solve(vec![steel_graph(), config]).await.unwrap();
        let solution = &items.last().unwrap()["data"];
        assert_eq!(solution["status"], "unsat");
        assert_eq!(solution["attempts"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_solve_rejects_missing_graph() {
        let err = run_solve(vec![]).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing production graph argument");
    }

    #[tokio::test]
    async fn test_solve_rejects_malformed_graph() {
        let err = run_solve(vec![json!({"id": "g"})]).await.unwrap_err();
        assert!(format!("{err:#}").starts_with("Invalid production graph"));
    }

    #[tokio::test]
    async fn test_solve_rejects_dangling_edge() {
        let mut graph = steel_graph();
        graph["edges"][0]["from_id"] = json!("ghost");
        let err = run_solve(vec![graph]).await.unwrap_err();
        assert_eq!(err.to_string(), "Edge e1 references unknown node ghost");
    }

    #[tokio::test]
    async fn test_get_buildings_lists_catalog() {
        let method = GetBuildingsMethod { engine: engine() };
        let value = method.invoke(&ctx(), vec![]).await.unwrap();
        let defs = value.as_array().unwrap();
        assert_eq!(defs.len(), 5);
        assert_eq!(defs[0]["type"], "crusher");
        assert_eq!(defs[0]["width"], 3);
    }

    #[tokio::test]
    async fn test_estimate_bounds() {
        let method = EstimateBoundsMethod { engine: engine() };
        let value = method.invoke(&ctx(), vec![steel_graph()]).await.unwrap();
        assert_eq!(value, json!({"width": 6, "height": 6}));
    }
}
