use crate::common;
use crate::graph::Network;
use pyo3::exceptions;
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Visit state for a node during a bounded search.
#[pyclass]
#[derive(Clone, Copy, Debug)]
pub struct NodeVisit {
    #[pyo3(get)]
    pub visited: bool,
    #[pyo3(get)]
    pub discovered: bool,
    #[pyo3(get)]
    pub pred: Option<usize>,
    /// Edge traversed from `pred` into this node.
    #[pyo3(get)]
    pub pred_edge: Option<usize>,
    #[pyo3(get)]
    pub first_hop: Option<usize>,
    #[pyo3(get)]
    pub first_edge: Option<usize>,
    #[pyo3(get)]
    pub dist: f64,
}

#[pymethods]
impl NodeVisit {
    #[new]
    pub fn new() -> Self {
        Self {
            visited: false,
            discovered: false,
            pred: None,
            pred_edge: None,
            first_hop: None,
            first_edge: None,
            dist: f64::INFINITY,
        }
    }
}

impl Default for NodeVisit {
    fn default() -> Self {
        Self::new()
    }
}

/// One UBODT row.
#[pyclass]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[pyo3(get)]
    pub source: usize,
    #[pyo3(get)]
    pub target: usize,
    /// Node visited right after `source` on the way to `target`.
    #[pyo3(get)]
    pub first_n: usize,
    /// Node visited right before `target`.
    #[pyo3(get)]
    pub prev_n: usize,
    /// Edge from `source` to `first_n`.
    #[pyo3(get)]
    pub next_e: usize,
    #[pyo3(get)]
    pub cost: f64,
}

#[pymethods]
impl Record {
    fn __repr__(&self) -> String {
        format!(
            "Record(source={}, target={}, first_n={}, prev_n={}, next_e={}, cost={})",
            self.source, self.target, self.first_n, self.prev_n, self.next_e, self.cost
        )
    }
}

// NodeDistance for heap
struct NodeDistance {
    node_idx: usize,
    metric: f64,
}

// min-heap on distance, lower node index first on ties
impl Ord for NodeDistance {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .metric
            .partial_cmp(&self.metric)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.node_idx.cmp(&self.node_idx))
    }
}

impl PartialOrd for NodeDistance {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NodeDistance {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NodeDistance {}

/// Shortest-path tree of a bounded search, stored as flat per-node arrays.
#[derive(Clone, Debug)]
pub struct SearchTree {
    pub source: usize,
    /// Settled nodes in settle order, the source first.
    pub visited_nodes: Vec<usize>,
    pub tree_map: Vec<NodeVisit>,
}

impl SearchTree {
    /// Node chain from the source to `target`, or `None` if `target` was not reached.
    pub fn trace_nodes(&self, target: usize) -> Option<Vec<usize>> {
        if !self.tree_map.get(target)?.visited {
            return None;
        }
        let mut path = vec![target];
        let mut current = target;
        while let Some(pred) = self.tree_map[current].pred {
            path.push(pred);
            current = pred;
        }
        path.reverse();
        Some(path)
    }

    /// Reduces the tree into one record per reached node other than the source.
    ///
    /// Records follow settle order, so the output for one source is deterministic.
    pub fn records(&self) -> Vec<Record> {
        self.visited_nodes
            .iter()
            .filter(|to_idx| **to_idx != self.source)
            .filter_map(|to_idx| {
                let node_visit = &self.tree_map[*to_idx];
                Some(Record {
                    source: self.source,
                    target: *to_idx,
                    first_n: node_visit.first_hop?,
                    prev_n: node_visit.pred?,
                    next_e: node_visit.first_edge?,
                    cost: node_visit.dist,
                })
            })
            .collect()
    }
}

impl Network {
    /// Dijkstra from `src_idx` that never settles a node further than `delta`.
    ///
    /// Each node keeps the edge that actually reached it, and the first hop and first edge are
    /// carried down from the settled parent, so parallel edges resolve to the traversed one.
    /// On equal distance the lower edge index wins.
    pub fn single_source_upperbound_dijkstra(
        &self,
        src_idx: usize,
        delta: f64,
    ) -> PyResult<SearchTree> {
        if src_idx >= self.node_count() {
            return Err(exceptions::PyValueError::new_err(format!(
                "Source node index {} is out of range for a network of {} nodes.",
                src_idx,
                self.node_count()
            )));
        }
        common::check_delta(delta)?;
        let mut tree_map = vec![NodeVisit::new(); self.node_count()];
        let mut visited_nodes = Vec::new();
        tree_map[src_idx].dist = 0.0;
        tree_map[src_idx].discovered = true;
        let mut active = BinaryHeap::new();
        active.push(NodeDistance {
            node_idx: src_idx,
            metric: 0.0,
        });
        while let Some(NodeDistance { node_idx, .. }) = active.pop() {
            // stale heap entry
            if tree_map[node_idx].visited {
                continue;
            }
            tree_map[node_idx].visited = true;
            visited_nodes.push(node_idx);
            for (edge_idx, nb_idx, length) in self.out_edges(node_idx) {
                if nb_idx == node_idx || tree_map[nb_idx].visited {
                    continue;
                }
                let total_dist = tree_map[node_idx].dist + length;
                if total_dist > delta {
                    continue;
                }
                let nb_visit = &tree_map[nb_idx];
                let improves = total_dist < nb_visit.dist
                    || (total_dist == nb_visit.dist
                        && nb_visit.pred_edge.map_or(true, |e| edge_idx < e));
                if !improves {
                    continue;
                }
                let current = &tree_map[node_idx];
                let (first_hop, first_edge) = if node_idx == src_idx {
                    (nb_idx, edge_idx)
                } else {
                    match (current.first_hop, current.first_edge) {
                        (Some(hop), Some(edge)) => (hop, edge),
                        _ => continue,
                    }
                };
                let nb_visit = &mut tree_map[nb_idx];
                nb_visit.discovered = true;
                nb_visit.dist = total_dist;
                nb_visit.pred = Some(node_idx);
                nb_visit.pred_edge = Some(edge_idx);
                nb_visit.first_hop = Some(first_hop);
                nb_visit.first_edge = Some(first_edge);
                active.push(NodeDistance {
                    node_idx: nb_idx,
                    metric: total_dist,
                });
            }
        }
        Ok(SearchTree {
            source: src_idx,
            visited_nodes,
            tree_map,
        })
    }

    /// UBODT records for a single source.
    pub fn source_records(&self, src_idx: usize, delta: f64) -> PyResult<Vec<Record>> {
        Ok(self
            .single_source_upperbound_dijkstra(src_idx, delta)?
            .records())
    }
}

#[pymethods]
impl Network {
    /// Runs the bounded search and returns the settled nodes and per-node visit state.
    pub fn dijkstra_tree(&self, src_idx: usize, delta: f64) -> PyResult<(Vec<usize>, Vec<NodeVisit>)> {
        let tree = self.single_source_upperbound_dijkstra(src_idx, delta)?;
        Ok((tree.visited_nodes, tree.tree_map))
    }

    /// Node indices along the shortest path, if `dst_idx` lies within `delta` of `src_idx`.
    pub fn shortest_path_nodes(
        &self,
        src_idx: usize,
        dst_idx: usize,
        delta: f64,
    ) -> PyResult<Option<Vec<usize>>> {
        let tree = self.single_source_upperbound_dijkstra(src_idx, delta)?;
        Ok(tree.trace_nodes(dst_idx))
    }

    /// UBODT records for `src_idx`, in settle order.
    pub fn ubodt_records(&self, src_idx: usize, delta: f64) -> PyResult<Vec<Record>> {
        self.source_records(src_idx, delta)
    }
}
