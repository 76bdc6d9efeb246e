// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Graph Ordering
//!
//! Random DAGs are generated by letting node `i` depend only on nodes with a
//! smaller index, which makes every generated declaration acyclic. The
//! declaration order is then shuffled so the tie-break is exercised too.

use cim_provisioning::{ResourceGraph, ResourceKind, ResourceNode, ValidationError};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

// ============================================================================
// Generators
// ============================================================================

/// Dependency lists for `n` nodes, node `i` depending on a subset of `0..i`
fn arb_dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..24).prop_flat_map(|n| {
        let per_node: Vec<_> = (0..n)
            .map(|i| proptest::collection::vec(0..i.max(1), 0..=i.min(4)))
            .collect();
        per_node.prop_map(|deps| {
            deps.into_iter()
                .enumerate()
                .map(|(i, d)| d.into_iter().filter(|&dep| dep < i).collect())
                .collect()
        })
    })
}

fn arb_shuffled_dag() -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<usize>)> {
    arb_dag().prop_flat_map(|deps| {
        let order: Vec<usize> = (0..deps.len()).collect();
        (Just(deps), Just(order).prop_shuffle())
    })
}

fn name(i: usize) -> String {
    format!("N{:02}", i)
}

fn build(deps: &[Vec<usize>], order: &[usize]) -> Result<ResourceGraph, ValidationError> {
    let nodes = order
        .iter()
        .map(|&i| {
            deps[i]
                .iter()
                .fold(ResourceNode::new(name(i), ResourceKind::Compute), |node, &d| {
                    node.depends_on(name(d))
                })
        })
        .collect();
    ResourceGraph::build(nodes)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn dependencies_come_in_strictly_earlier_batches((deps, order) in arb_shuffled_dag()) {
        let graph = build(&deps, &order).unwrap();

        let mut batch_of: HashMap<String, usize> = HashMap::new();
        for (number, batch) in graph.topological_batches().enumerate() {
            for id in batch {
                prop_assert!(batch_of.insert(id.to_string(), number).is_none());
            }
        }

        prop_assert_eq!(batch_of.len(), deps.len());
        for (i, node_deps) in deps.iter().enumerate() {
            for &d in node_deps {
                prop_assert!(batch_of[&name(d)] < batch_of[&name(i)]);
            }
        }
    }

    #[test]
    fn batches_keep_declaration_order((deps, order) in arb_shuffled_dag()) {
        let graph = build(&deps, &order).unwrap();
        let position: HashMap<String, usize> = order
            .iter()
            .enumerate()
            .map(|(p, &i)| (name(i), p))
            .collect();

        for batch in graph.topological_batches() {
            let positions: Vec<usize> = batch.iter().map(|id| position[id.as_str()]).collect();
            let mut sorted = positions.clone();
            sorted.sort_unstable();
            prop_assert_eq!(positions, sorted);
        }
    }

    #[test]
    fn dependents_and_dependencies_mirror_each_other((deps, order) in arb_shuffled_dag()) {
        let graph = build(&deps, &order).unwrap();

        for node in graph.nodes() {
            let id = node.id().as_str();
            let dependents: HashSet<String> = graph
                .transitive_dependents(id)
                .into_iter()
                .map(|n| n.to_string())
                .collect();
            prop_assert!(!dependents.contains(id));

            for other in &dependents {
                let back: Vec<String> = graph
                    .transitive_dependencies(other)
                    .into_iter()
                    .map(|n| n.to_string())
                    .collect();
                prop_assert!(back.iter().any(|b| b == id));
            }
        }
    }

    #[test]
    fn closing_a_chain_is_always_rejected(len in 1usize..16, back_to in 0usize..16) {
        let back_to = back_to % len;
        let mut deps: Vec<Vec<usize>> = (0..len)
            .map(|i| if i == 0 { Vec::new() } else { vec![i - 1] })
            .collect();
        deps[back_to].push(len - 1);
        let order: Vec<usize> = (0..len).collect();

        let result = build(&deps, &order);
        prop_assert!(matches!(result, Err(ValidationError::Cycle { .. })), "{:?}", result.err());
    }
}
