use std::collections::HashMap;

use cutover_common::{
    error::Error,
    phase::{MigrationPhase, PhaseStatus},
    run::RunStatus,
};
use petgraph::{
    Direction::Incoming,
    algo::is_cyclic_directed,
    graph::{DiGraph, NodeIndex},
};

/// Dependency graph over migration phases.
/// ---
/// Nodes are phase ids; an edge from phase A to phase B means A must
/// finish (complete or be skipped) before B can start. Built once at
/// `initialize_migration` time and immutable afterwards.
#[derive(Debug)]
pub struct PhaseGraph {
    graph: DiGraph<String, ()>,
    id_to_node: HashMap<String, NodeIndex>,

    /// Phase ids in the order they were declared in the plan; readiness
    /// queries return ids in this order so output is deterministic.
    declared_order: Vec<String>,
}

impl PhaseGraph {
    /// Validates the phase list and builds the graph.
    /// Duplicate ids are a `Conflict`; unknown dependency ids and
    /// dependency cycles are a `Config` error. Fails before any state
    /// is persisted.
    pub fn new(phases: &[MigrationPhase]) -> Result<Self, Error> {
        let mut graph = DiGraph::new();
        let mut id_to_node = HashMap::new();
        let mut declared_order = Vec::with_capacity(phases.len());

        for phase in phases {
            if id_to_node.contains_key(&phase.id) {
                return Err(Error::Conflict(format!(
                    "Duplicate phase ID {} in migration plan",
                    phase.id
                )));
            }

            let node_idx = graph.add_node(phase.id.clone());
            id_to_node.insert(phase.id.clone(), node_idx);
            declared_order.push(phase.id.clone());
        }

        // Dependencies may reference phases declared later, so edges are
        // added in a second pass.
        for phase in phases {
            let node_idx = id_to_node[&phase.id];
            for dep_id in &phase.depends_on {
                let dep_idx = id_to_node.get(dep_id).ok_or_else(|| {
                    Error::Config(format!(
                        "Phase {} depends on unknown phase ID {}",
                        phase.id, dep_id
                    ))
                })?;

                graph.add_edge(*dep_idx, node_idx, ());
            }
        }

        if is_cyclic_directed(&graph) {
            return Err(Error::Config(
                "Dependency cycle detected in migration plan".to_string(),
            ));
        }

        Ok(Self {
            graph,
            id_to_node,
            declared_order,
        })
    }

    pub fn contains(&self, phase_id: &str) -> bool {
        self.id_to_node.contains_key(phase_id)
    }

    pub fn dependencies(&self, phase_id: &str) -> Vec<&str> {
        let Some(node_idx) = self.id_to_node.get(phase_id) else {
            return Vec::new();
        };

        self.graph
            .neighbors_directed(*node_idx, Incoming)
            .filter_map(|dep_idx| self.graph.node_weight(dep_idx))
            .map(String::as_str)
            .collect()
    }

    /// True iff every dependency of the phase is completed or skipped.
    pub fn is_ready(&self, phase_id: &str, statuses: &HashMap<String, PhaseStatus>) -> bool {
        let Some(node_idx) = self.id_to_node.get(phase_id) else {
            return false;
        };

        self.graph
            .neighbors_directed(*node_idx, Incoming)
            .all(|dep_idx| {
                let dep_id = &self.graph[dep_idx];
                statuses
                    .get(dep_id)
                    .is_some_and(|status| status.satisfies_dependency())
            })
    }

    /// All pending phases whose dependencies are satisfied, in declared
    /// order. Phases across independent branches may run concurrently;
    /// a failed dependency simply keeps its dependents out of this list.
    pub fn ready_phases(&self, statuses: &HashMap<String, PhaseStatus>) -> Vec<String> {
        self.declared_order
            .iter()
            .filter(|id| statuses.get(*id) == Some(&PhaseStatus::Pending))
            .filter(|id| self.is_ready(id, statuses))
            .cloned()
            .collect()
    }

    /// Final run outcome once every phase is terminal; `None` while any
    /// phase is still pending or in progress.
    pub fn run_outcome(&self, statuses: &HashMap<String, PhaseStatus>) -> Option<RunStatus> {
        if self.declared_order.is_empty() {
            return Some(RunStatus::Completed);
        }

        let mut any_failed = false;
        for id in &self.declared_order {
            match statuses.get(id) {
                Some(PhaseStatus::Completed) | Some(PhaseStatus::Skipped) => {}
                Some(PhaseStatus::Failed) => any_failed = true,
                Some(PhaseStatus::Pending) | Some(PhaseStatus::InProgress) | None => return None,
            }
        }

        if any_failed {
            Some(RunStatus::Failed)
        } else {
            Some(RunStatus::Completed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutover_common::{
        phase::PhaseKind,
        plan::PhaseSpec,
    };
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use std::collections::BTreeMap;

    fn phase(id: &str, deps: &[&str]) -> MigrationPhase {
        MigrationPhase::from_spec(&PhaseSpec {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
            kind: PhaseKind::Manual,
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            estimated_duration_minutes: 10,
            sub_tasks: vec![],
            metadata: BTreeMap::new(),
        })
    }

    fn statuses(pairs: &[(&str, PhaseStatus)]) -> HashMap<String, PhaseStatus> {
        pairs
            .iter()
            .map(|(id, status)| (id.to_string(), *status))
            .collect()
    }

    #[test]
    fn test_rejects_dependency_cycle() {
        let phases = vec![phase("a", &["c"]), phase("b", &["a"]), phase("c", &["b"])];
        let err = PhaseGraph::new(&phases).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_dependency() {
        let phases = vec![phase("a", &["ghost"])];
        let err = PhaseGraph::new(&phases).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_duplicate_phase_id() {
        let phases = vec![phase("a", &[]), phase("a", &[])];
        let err = PhaseGraph::new(&phases).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_forward_dependency_references_are_allowed() {
        let phases = vec![phase("b", &["a"]), phase("a", &[])];
        assert!(PhaseGraph::new(&phases).is_ok());
    }

    #[test]
    fn test_completing_shared_dependency_readies_both_branches() {
        let phases = vec![phase("a", &[]), phase("b", &["a"]), phase("c", &["a"])];
        let graph = PhaseGraph::new(&phases).unwrap();

        let before = statuses(&[
            ("a", PhaseStatus::InProgress),
            ("b", PhaseStatus::Pending),
            ("c", PhaseStatus::Pending),
        ]);
        assert!(graph.ready_phases(&before).is_empty());

        let after = statuses(&[
            ("a", PhaseStatus::Completed),
            ("b", PhaseStatus::Pending),
            ("c", PhaseStatus::Pending),
        ]);
        assert_eq!(graph.ready_phases(&after), vec!["b", "c"]);
    }

    #[test]
    fn test_skipped_dependency_satisfies_readiness() {
        let phases = vec![phase("a", &[]), phase("b", &["a"])];
        let graph = PhaseGraph::new(&phases).unwrap();

        let view = statuses(&[("a", PhaseStatus::Skipped), ("b", PhaseStatus::Pending)]);
        assert_eq!(graph.ready_phases(&view), vec!["b"]);
    }

    #[test]
    fn test_failed_dependency_blocks_dependents_only() {
        let phases = vec![
            phase("a", &[]),
            phase("b", &["a"]),
            phase("x", &[]),
        ];
        let graph = PhaseGraph::new(&phases).unwrap();

        let view = statuses(&[
            ("a", PhaseStatus::Failed),
            ("b", PhaseStatus::Pending),
            ("x", PhaseStatus::Pending),
        ]);
        assert_eq!(graph.ready_phases(&view), vec!["x"]);
    }

    #[test]
    fn test_run_outcome_waits_for_terminal_states() {
        let phases = vec![phase("a", &[]), phase("b", &["a"])];
        let graph = PhaseGraph::new(&phases).unwrap();

        let running = statuses(&[("a", PhaseStatus::Completed), ("b", PhaseStatus::InProgress)]);
        assert_eq!(graph.run_outcome(&running), None);

        let done = statuses(&[("a", PhaseStatus::Completed), ("b", PhaseStatus::Completed)]);
        assert_eq!(graph.run_outcome(&done), Some(RunStatus::Completed));

        let failed = statuses(&[("a", PhaseStatus::Completed), ("b", PhaseStatus::Failed)]);
        assert_eq!(graph.run_outcome(&failed), Some(RunStatus::Failed));
    }

    /// Random DAGs (edges only from earlier to later phases, so acyclic
    /// by construction): every phase reported ready must have all of its
    /// dependencies completed or skipped, and no non-pending phase is
    /// ever reported.
    #[test]
    fn test_ready_phases_property_over_random_dags() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..50 {
            let n = rng.random_range(2..12);
            let mut phases = Vec::new();
            for i in 0..n {
                let deps: Vec<String> = (0..i)
                    .filter(|_| rng.random_bool(0.3))
                    .map(|j| format!("p{j}"))
                    .collect();
                let dep_refs: Vec<&str> = deps.iter().map(String::as_str).collect();
                phases.push(phase(&format!("p{i}"), &dep_refs));
            }

            let graph = PhaseGraph::new(&phases).unwrap();

            let all_statuses = [
                PhaseStatus::Pending,
                PhaseStatus::InProgress,
                PhaseStatus::Completed,
                PhaseStatus::Failed,
                PhaseStatus::Skipped,
            ];
            let view: HashMap<String, PhaseStatus> = (0..n)
                .map(|i| {
                    (
                        format!("p{i}"),
                        all_statuses[rng.random_range(0..all_statuses.len())],
                    )
                })
                .collect();

            for ready_id in graph.ready_phases(&view) {
                assert_eq!(view[&ready_id], PhaseStatus::Pending);
                for dep_id in graph.dependencies(&ready_id) {
                    assert!(view[dep_id].satisfies_dependency());
                }
            }
        }
    }
}
