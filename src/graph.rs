use crate::geometry::{self, Point3, Polyline};
use geo::algorithm::Euclidean;
use geo::geometry::Point;
use geo::{BoundingRect, Closest, ClosestPoint, Distance, LineLocatePoint};
use numpy::{PyArray2, PyReadonlyArray2};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::prelude::*;
use pyo3::exceptions;
use pyo3::prelude::*;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

/// External node identifier, caller assigned and possibly sparse or negative.
pub type NodeId = i64;
/// External edge identifier, may be negative to tell the two directions of a road apart.
pub type EdgeId = i64;

/// Payload for a network node.
#[pyclass]
#[derive(Clone, Debug)]
pub struct NodePayload {
    #[pyo3(get)]
    pub node_id: NodeId,
    pub point: Point3,
}

#[pymethods]
impl NodePayload {
    #[getter]
    pub fn point(&self) -> (f64, f64, f64) {
        self.point.xyz()
    }
}

/// A directed road edge.
#[pyclass]
#[derive(Clone, Debug)]
pub struct Edge {
    #[pyo3(get)]
    pub id: EdgeId,
    #[pyo3(get)]
    pub source: NodeId,
    #[pyo3(get)]
    pub target: NodeId,
    #[pyo3(get)]
    pub index: usize,
    #[pyo3(get)]
    pub source_index: usize,
    #[pyo3(get)]
    pub target_index: usize,
    #[pyo3(get)]
    pub length: f64,
    pub geom: Polyline,
}

#[pymethods]
impl Edge {
    #[getter]
    pub fn geom(&self, py: Python<'_>) -> PyResult<Py<PyArray2<f64>>> {
        geometry::polyline_to_array(py, &self.geom)
    }
}

/// Nearby edge found by the spatial index.
#[pyclass]
#[derive(Clone, Debug)]
pub struct Candidate {
    #[pyo3(get)]
    pub edge_index: usize,
    #[pyo3(get)]
    pub edge_id: EdgeId,
    /// Distance from the query point to the edge.
    #[pyo3(get)]
    pub dist: f64,
    /// Distance along the edge from its start to the closest point.
    #[pyo3(get)]
    pub offset: f64,
    #[pyo3(get)]
    pub x: f64,
    #[pyo3(get)]
    pub y: f64,
}

/// Lower distance first; exact ties go to the lower edge index.
pub fn candidate_compare(a: &Candidate, b: &Candidate) -> Ordering {
    a.dist
        .partial_cmp(&b.dist)
        .unwrap_or(Ordering::Equal)
        .then(a.edge_index.cmp(&b.edge_index))
}

fn default_is_wgs84() -> bool {
    true
}

/// JSON document for a whole network.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkDoc {
    #[serde(default = "default_is_wgs84")]
    pub is_wgs84: bool,
    pub edges: Vec<EdgeDoc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeDoc {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub coordinates: Vec<Vec<f64>>,
}

// edge index stored against the bounding box of its geometry
type EdgeRtreeItem = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Road network: a directed multigraph over dense node and edge indices.
///
/// Dense indices are the petgraph indices. Edges are never removed so both stay contiguous.
/// `node_map` and `edge_map` translate external ids into dense indices.
#[pyclass]
pub struct Network {
    pub graph: DiGraph<NodePayload, Edge>,
    pub node_map: HashMap<NodeId, usize>,
    pub edge_map: HashMap<EdgeId, usize>,
    #[pyo3(get)]
    pub is_wgs84: bool,
    pub progress: Arc<AtomicUsize>,
    pub edge_rtree: Option<RTree<EdgeRtreeItem>>,
}

// a clone starts its own progress counter from the current count
impl Clone for Network {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            node_map: self.node_map.clone(),
            edge_map: self.edge_map.clone(),
            is_wgs84: self.is_wgs84,
            progress: Arc::new(AtomicUsize::new(self.progress())),
            edge_rtree: self.edge_rtree.clone(),
        }
    }
}

#[pymethods]
impl Network {
    #[new]
    #[pyo3(signature = (is_wgs84=true))]
    pub fn new(is_wgs84: bool) -> Self {
        Self {
            graph: DiGraph::<NodePayload, Edge>::default(),
            node_map: HashMap::new(),
            edge_map: HashMap::new(),
            is_wgs84,
            progress: Arc::new(AtomicUsize::new(0)),
            edge_rtree: None,
        }
    }

    #[inline]
    pub fn progress_init(&self) {
        self.progress.store(0, AtomicOrdering::Relaxed);
    }

    #[inline]
    pub fn progress(&self) -> usize {
        self.progress.load(AtomicOrdering::Relaxed)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Adds an edge from an `N x 2` or `N x 3` coordinate array.
    ///
    /// Returns the new dense edge index, or `None` when the id is already taken.
    pub fn add_edge(
        &mut self,
        id: EdgeId,
        source: NodeId,
        target: NodeId,
        polyline: PyReadonlyArray2<'_, f64>,
    ) -> PyResult<Option<usize>> {
        let geom = geometry::polyline_from_array(polyline)?;
        self.add_edge_geom(id, source, target, geom)
    }

    pub fn get_edge(&self, id: EdgeId) -> PyResult<Edge> {
        let index = self.get_edge_index(id)?;
        self.get_edge_by_index(index)
    }

    pub fn get_edge_by_index(&self, index: usize) -> PyResult<Edge> {
        self.graph
            .edge_weight(EdgeIndex::new(index))
            .cloned()
            .ok_or_else(|| {
                exceptions::PyValueError::new_err(format!(
                    "No edge for requested edge index {}.",
                    index
                ))
            })
    }

    pub fn get_edges(&self) -> Vec<Edge> {
        self.graph.edge_weights().cloned().collect()
    }

    pub fn get_edge_index(&self, id: EdgeId) -> PyResult<usize> {
        self.edge_map.get(&id).copied().ok_or_else(|| {
            exceptions::PyValueError::new_err(format!("Unknown edge id {}.", id))
        })
    }

    /// Returns -1 for an out of range index.
    pub fn get_edge_id(&self, index: usize) -> EdgeId {
        self.graph
            .edge_weight(EdgeIndex::new(index))
            .map_or(-1, |edge| edge.id)
    }

    pub fn get_node_index(&self, id: NodeId) -> PyResult<usize> {
        self.node_map.get(&id).copied().ok_or_else(|| {
            exceptions::PyValueError::new_err(format!("Unknown node id {}.", id))
        })
    }

    /// Returns -1 for an out of range index.
    pub fn get_node_id(&self, index: usize) -> NodeId {
        self.graph
            .node_weight(NodeIndex::new(index))
            .map_or(-1, |node| node.node_id)
    }

    pub fn get_node_payload(&self, index: usize) -> PyResult<NodePayload> {
        self.graph
            .node_weight(NodeIndex::new(index))
            .cloned()
            .ok_or_else(|| {
                exceptions::PyValueError::new_err(format!(
                    "No payload for requested node index {}.",
                    index
                ))
            })
    }

    pub fn get_node_geom(&self, index: usize) -> PyResult<Point3> {
        self.get_node_payload(index).map(|payload| payload.point)
    }

    #[getter]
    pub fn vertex_points(&self, py: Python<'_>) -> PyResult<Py<PyArray2<f64>>> {
        let points: Vec<Point3> = self.graph.node_weights().map(|node| node.point).collect();
        geometry::polyline_to_array(py, &points)
    }

    pub fn loads(&mut self, json: &str) -> PyResult<()> {
        let doc: NetworkDoc = serde_json::from_str(json).map_err(|e| {
            exceptions::PyValueError::new_err(format!("Invalid network JSON: {}", e))
        })?;
        self.from_json(doc)
    }

    pub fn dumps(&self) -> PyResult<String> {
        serde_json::to_string(&self.to_json())
            .map_err(|e| exceptions::PyValueError::new_err(e.to_string()))
    }

    pub fn load(&mut self, path: &str) -> PyResult<()> {
        let json = fs::read_to_string(path)?;
        self.loads(&json)
    }

    pub fn dump(&self, path: &str) -> PyResult<()> {
        let json = serde_json::to_string_pretty(&self.to_json())
            .map_err(|e| exceptions::PyValueError::new_err(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn export_geojson(&self) -> String {
        self.geojson().to_string()
    }

    pub fn export_geojson_to(&self, path: &str) -> PyResult<()> {
        let json = serde_json::to_string_pretty(&self.geojson())
            .map_err(|e| exceptions::PyValueError::new_err(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Stitches the geometry of a route given as edge ids.
    pub fn route2geometry(&self, path: Vec<EdgeId>, py: Python<'_>) -> PyResult<Py<PyArray2<f64>>> {
        let indices = path
            .iter()
            .map(|id| self.get_edge_index(*id))
            .collect::<PyResult<Vec<usize>>>()?;
        let line = self.route_geometry(&indices)?;
        geometry::polyline_to_array(py, &line)
    }

    /// Stitches the geometry of a route given as dense edge indices.
    pub fn route2geometry_by_index(
        &self,
        path: Vec<usize>,
        py: Python<'_>,
    ) -> PyResult<Py<PyArray2<f64>>> {
        let line = self.route_geometry(&path)?;
        geometry::polyline_to_array(py, &line)
    }

    /// Builds the R-tree over edge bounding boxes.
    pub fn build_rtree_index(&mut self) {
        let edge_count = self.graph.edge_count();
        if edge_count == 0 {
            log::warn!("Cannot build R-tree, graph has no edges.");
            self.edge_rtree = None;
            return;
        }
        let mut rtree_items: Vec<EdgeRtreeItem> = Vec::with_capacity(edge_count);
        let mut skipped_edges = 0;
        for edge in self.graph.edge_weights() {
            let line = geometry::to_line_string(&edge.geom);
            if let Some(rect) = line.bounding_rect() {
                let min_coord = rect.min();
                let max_coord = rect.max();
                let rect_geom =
                    Rectangle::from_corners([min_coord.x, min_coord.y], [max_coord.x, max_coord.y]);
                rtree_items.push(GeomWithData::new(rect_geom, edge.index));
            } else {
                log::warn!(
                    "Skipping edge {} with no bounding box. Geometry might be empty.",
                    edge.id
                );
                skipped_edges += 1;
            }
        }
        let tree = RTree::bulk_load(rtree_items);
        log::info!(
            "Edge R-tree built with {} items. {} edges were skipped.",
            tree.size(),
            skipped_edges
        );
        self.edge_rtree = Some(tree);
    }

    /// Up to `k` edges within `radius` of `(x, y)`, ordered by `candidate_compare`.
    pub fn search_candidates(
        &self,
        x: f64,
        y: f64,
        k: usize,
        radius: f64,
    ) -> PyResult<Vec<Candidate>> {
        let rtree = self.edge_rtree.as_ref().ok_or_else(|| {
            exceptions::PyValueError::new_err(
                "Edge R-tree has not been built. Call build_rtree_index first.",
            )
        })?;
        let envelope = AABB::from_corners([x - radius, y - radius], [x + radius, y + radius]);
        let query = Point::new(x, y);
        let mut candidates: Vec<Candidate> = rtree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|item| {
                let edge = self.graph.edge_weight(EdgeIndex::new(item.data))?;
                let line = geometry::to_line_string(&edge.geom);
                let closest = match line.closest_point(&query) {
                    Closest::Intersection(p) | Closest::SinglePoint(p) => p,
                    Closest::Indeterminate => return None,
                };
                let dist = Euclidean.distance(query, closest);
                if dist > radius {
                    return None;
                }
                let fraction = line.line_locate_point(&closest).unwrap_or(0.0);
                Some(Candidate {
                    edge_index: edge.index,
                    edge_id: edge.id,
                    dist,
                    offset: fraction * edge.length,
                    x: closest.x(),
                    y: closest.y(),
                })
            })
            .collect();
        candidates.sort_by(candidate_compare);
        candidates.truncate(k);
        Ok(candidates)
    }
}

impl Network {
    fn ensure_node(&mut self, id: NodeId, point: Point3) -> usize {
        if let Some(index) = self.node_map.get(&id) {
            return *index;
        }
        let index = self
            .graph
            .add_node(NodePayload { node_id: id, point })
            .index();
        self.node_map.insert(id, index);
        index
    }

    /// Adds an edge, registering unseen endpoint nodes at the polyline boundary points.
    pub fn add_edge_geom(
        &mut self,
        id: EdgeId,
        source: NodeId,
        target: NodeId,
        geom: Polyline,
    ) -> PyResult<Option<usize>> {
        if self.edge_map.contains_key(&id) {
            log::error!("duplicate edge: {}", id);
            return Ok(None);
        }
        let (first, last) = match (geom.first(), geom.last()) {
            (Some(first), Some(last)) if geom.len() >= 2 => (*first, *last),
            _ => {
                return Err(exceptions::PyValueError::new_err(format!(
                    "Edge geometry must have at least 2 coordinates. Found {} for edge {}.",
                    geom.len(),
                    id
                )));
            }
        };
        let source_index = self.ensure_node(source, first);
        let target_index = self.ensure_node(target, last);
        let index = self.graph.edge_count();
        let length = geometry::polyline_length(&geom, self.is_wgs84);
        self.graph.add_edge(
            NodeIndex::new(source_index),
            NodeIndex::new(target_index),
            Edge {
                id,
                source,
                target,
                index,
                source_index,
                target_index,
                length,
                geom,
            },
        );
        self.edge_map.insert(id, index);
        self.edge_rtree = None;
        Ok(Some(index))
    }

    /// Loads edges from a network document. The network must not hold any edges yet.
    ///
    /// Every edge geometry is checked before the network is touched, so a rejected
    /// document leaves it empty.
    pub fn from_json(&mut self, doc: NetworkDoc) -> PyResult<()> {
        if self.graph.edge_count() > 0 {
            return Err(exceptions::PyValueError::new_err(format!(
                "Network already holds {} edges; from_json only loads into an empty network.",
                self.graph.edge_count()
            )));
        }
        let mut edges = Vec::with_capacity(doc.edges.len());
        for edge in &doc.edges {
            let geom = geometry::polyline_from_rows(&edge.coordinates)?;
            if geom.len() < 2 {
                return Err(exceptions::PyValueError::new_err(format!(
                    "Edge geometry must have at least 2 coordinates. Found {} for edge {}.",
                    geom.len(),
                    edge.id
                )));
            }
            edges.push((edge.id, edge.source, edge.target, geom));
        }
        self.is_wgs84 = doc.is_wgs84;
        for (id, source, target, geom) in edges {
            self.add_edge_geom(id, source, target, geom)?;
        }
        log::info!(
            "Number of edges {} nodes {}",
            self.graph.edge_count(),
            self.graph.node_count()
        );
        self.build_rtree_index();
        log::info!("Read network done.");
        Ok(())
    }

    pub fn to_json(&self) -> NetworkDoc {
        NetworkDoc {
            is_wgs84: self.is_wgs84,
            edges: self
                .graph
                .edge_weights()
                .map(|edge| EdgeDoc {
                    id: edge.id,
                    source: edge.source,
                    target: edge.target,
                    coordinates: edge.geom.iter().map(|p| p.to_array().to_vec()).collect(),
                })
                .collect(),
        }
    }

    pub fn geojson(&self) -> serde_json::Value {
        let mut features = Vec::with_capacity(self.graph.node_count() + self.graph.edge_count());
        for node in self.graph.node_weights() {
            features.push(json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": node.point.to_array(),
                },
                "properties": {
                    "type": "node",
                    "_id": node.node_id,
                },
            }));
        }
        for edge in self.graph.edge_weights() {
            let coordinates: Vec<[f64; 3]> = edge.geom.iter().map(|p| p.to_array()).collect();
            features.push(json!({
                "type": "Feature",
                "geometry": {
                    "type": "LineString",
                    "coordinates": coordinates,
                },
                "properties": {
                    "type": "edge",
                    "_id": edge.id,
                    "source": edge.source,
                    "target": edge.target,
                    "length": edge.length,
                },
            }));
        }
        json!({
            "type": "FeatureCollection",
            "features": features,
        })
    }

    /// Concatenates edge polylines, dropping the leading point of every edge after the first.
    pub fn route_geometry(&self, path: &[usize]) -> PyResult<Polyline> {
        let mut line = Polyline::new();
        for (i, edge_index) in path.iter().enumerate() {
            let edge = self
                .graph
                .edge_weight(EdgeIndex::new(*edge_index))
                .ok_or_else(|| {
                    exceptions::PyValueError::new_err(format!(
                        "No edge for requested edge index {}.",
                        edge_index
                    ))
                })?;
            geometry::append_segs(&mut line, &edge.geom, if i == 0 { 0 } else { 1 });
        }
        Ok(line)
    }

    /// Outgoing edges of a node as `(edge index, target index, length)`.
    #[inline]
    pub fn out_edges(&self, node_idx: usize) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.graph
            .edges(NodeIndex::new(node_idx))
            .map(|edge_ref| (edge_ref.id().index(), edge_ref.target().index(), edge_ref.weight().length))
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{abc_network, line};
    use super::*;

    #[test]
    fn test_add_edge_and_lookups() {
        let ns = abc_network();
        assert_eq!(ns.node_count(), 3);
        assert_eq!(ns.edge_count(), 3);
        assert_eq!(ns.get_node_index(1).unwrap(), 0);
        assert_eq!(ns.get_node_index(3).unwrap(), 2);
        assert_eq!(ns.get_node_id(1), 2);
        assert_eq!(ns.get_node_id(3), -1);
        assert_eq!(ns.get_edge_index(12).unwrap(), 2);
        assert_eq!(ns.get_edge_id(0), 10);
        assert_eq!(ns.get_edge_id(7), -1);
        let edge = ns.get_edge(12).unwrap();
        assert_eq!((edge.source_index, edge.target_index), (0, 2));
        assert!((edge.length - 5.0).abs() < 1e-9);
        assert_eq!(ns.get_node_geom(2).unwrap(), Point3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_unknown_ids() {
        pyo3::prepare_freethreaded_python();
        let ns = abc_network();
        assert!(ns.get_node_index(99).is_err());
        assert!(ns.get_edge_index(99).is_err());
        assert!(ns.get_edge(99).is_err());
        assert!(ns.get_edge_by_index(3).is_err());
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let mut ns = abc_network();
        let res = ns
            .add_edge_geom(11, 7, 8, line(&[(5.0, 5.0), (6.0, 6.0)]))
            .unwrap();
        assert!(res.is_none());
        assert_eq!(ns.edge_count(), 3);
        assert_eq!(ns.node_count(), 3);
        assert!(ns.get_node_index(7).is_err());
    }

    #[test]
    fn test_degenerate_geometry_rejected() {
        pyo3::prepare_freethreaded_python();
        let mut ns = Network::new(false);
        assert!(ns.add_edge_geom(1, 1, 2, line(&[(0.0, 0.0)])).is_err());
        assert_eq!(ns.edge_count(), 0);
        assert_eq!(ns.node_count(), 0);
    }

    #[test]
    fn test_negative_and_sparse_ids() {
        let mut ns = Network::new(false);
        ns.add_edge_geom(-5, 1000, -3, line(&[(0.0, 0.0), (0.0, 1.0)]))
            .unwrap();
        ns.add_edge_geom(5, -3, 1000, line(&[(0.0, 1.0), (0.0, 0.0)]))
            .unwrap();
        assert_eq!(ns.get_node_index(1000).unwrap(), 0);
        assert_eq!(ns.get_node_index(-3).unwrap(), 1);
        assert_eq!(ns.get_edge_index(-5).unwrap(), 0);
        assert_eq!(ns.get_edge_index(5).unwrap(), 1);
    }

    #[test]
    fn test_json_round_trip() {
        let ns = abc_network();
        let dumped = ns.dumps().unwrap();
        let mut loaded = Network::new(true);
        loaded.loads(&dumped).unwrap();
        assert!(!loaded.is_wgs84);
        assert_eq!(loaded.edge_count(), ns.edge_count());
        assert_eq!(loaded.node_count(), ns.node_count());
        for (a, b) in ns.get_edges().iter().zip(loaded.get_edges().iter()) {
            assert_eq!((a.id, a.source, a.target), (b.id, b.source, b.target));
            assert_eq!(a.geom.len(), b.geom.len());
            for (p, q) in a.geom.iter().zip(b.geom.iter()) {
                assert!((p.x - q.x).abs() < 1e-9);
                assert!((p.y - q.y).abs() < 1e-9);
                assert!((p.z - q.z).abs() < 1e-9);
            }
        }
        assert!(loaded.edge_rtree.is_some());
    }

    #[test]
    fn test_from_json_defaults_and_z() {
        let json = r#"{"edges": [{"id": 1, "source": 1, "target": 2, "coordinates": [[4.0, 50.0], [4.001, 50.0, 12.5]]}]}"#;
        let mut ns = Network::new(false);
        ns.loads(json).unwrap();
        assert!(ns.is_wgs84);
        let edge = ns.get_edge(1).unwrap();
        assert_eq!(edge.geom[0].z, 0.0);
        assert_eq!(edge.geom[1].z, 12.5);
        // ~71.5m per 0.001 degree of longitude at 50N
        assert!(edge.length > 60.0 && edge.length < 80.0);
    }

    #[test]
    fn test_invalid_document_leaves_network_empty() {
        pyo3::prepare_freethreaded_python();
        let bad = r#"{"is_wgs84": false, "edges": [
            {"id": 1, "source": 1, "target": 2, "coordinates": [[0.0, 0.0], [1.0, 0.0]]},
            {"id": 2, "source": 2, "target": 3, "coordinates": [[1.0, 0.0]]}
        ]}"#;
        let mut ns = Network::new(true);
        assert!(ns.loads(bad).is_err());
        assert_eq!(ns.edge_count(), 0);
        assert_eq!(ns.node_count(), 0);
        assert!(ns.is_wgs84);
        let short_row = r#"{"edges": [{"id": 1, "source": 1, "target": 2, "coordinates": [[0.0, 0.0], [1.0]]}]}"#;
        assert!(ns.loads(short_row).is_err());
        assert_eq!(ns.edge_count(), 0);
        // the same network still accepts a valid document
        let good = r#"{"is_wgs84": false, "edges": [
            {"id": 1, "source": 1, "target": 2, "coordinates": [[0.0, 0.0], [1.0, 0.0]]}
        ]}"#;
        ns.loads(good).unwrap();
        assert_eq!(ns.edge_count(), 1);
        assert_eq!(ns.node_count(), 2);
        assert!(!ns.is_wgs84);
        assert!(ns.edge_rtree.is_some());
    }

    #[test]
    fn test_vertical_edge_length() {
        let mut ns = Network::new(false);
        let geom = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 10.0)];
        ns.add_edge_geom(1, 1, 2, geom).unwrap();
        assert!((ns.get_edge(1).unwrap().length - 10.0).abs() < 1e-9);
        assert!(ns.source_records(0, 0.0).unwrap().is_empty());
        assert_eq!(ns.source_records(0, 10.0).unwrap().len(), 1);
    }

    #[test]
    fn test_clone_has_own_progress() {
        let ns = abc_network();
        ns.progress.fetch_add(2, AtomicOrdering::Relaxed);
        let copy = ns.clone();
        assert_eq!(copy.progress(), 2);
        copy.progress_init();
        assert_eq!(copy.progress(), 0);
        assert_eq!(ns.progress(), 2);
    }

    #[test]
    fn test_from_json_requires_empty_network() {
        pyo3::prepare_freethreaded_python();
        let mut ns = abc_network();
        let doc = ns.to_json();
        assert!(ns.from_json(doc).is_err());
        assert_eq!(ns.edge_count(), 3);
    }

    #[test]
    fn test_export_geojson() {
        let ns = abc_network();
        let fc = ns.geojson();
        assert_eq!(fc["type"], "FeatureCollection");
        let features = fc["features"].as_array().unwrap();
        assert_eq!(features.len(), 6);
        let nodes: Vec<_> = features
            .iter()
            .filter(|f| f["properties"]["type"] == "node")
            .collect();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0]["geometry"]["type"], "Point");
        assert_eq!(nodes[0]["properties"]["_id"], 1);
        let edges: Vec<_> = features
            .iter()
            .filter(|f| f["properties"]["type"] == "edge")
            .collect();
        assert_eq!(edges.len(), 3);
        assert_eq!(edges[1]["properties"]["_id"], 11);
        assert_eq!(edges[1]["properties"]["source"], 2);
        assert_eq!(edges[1]["properties"]["target"], 3);
        assert_eq!(edges[1]["properties"]["length"], 1.0);
        assert_eq!(edges[2]["geometry"]["coordinates"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_route_geometry_stitching() {
        let ns = abc_network();
        let line = ns.route_geometry(&[0, 1]).unwrap();
        assert_eq!(
            line,
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
            ]
        );
        assert!(ns.route_geometry(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_search_candidates() {
        pyo3::prepare_freethreaded_python();
        let mut ns = abc_network();
        assert!(ns.search_candidates(0.5, 0.1, 3, 1.0).is_err());
        ns.build_rtree_index();
        let candidates = ns.search_candidates(0.5, 0.1, 3, 1.0).unwrap();
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].edge_id, 10);
        assert!((candidates[0].dist - 0.1).abs() < 1e-9);
        assert!((candidates[0].offset - 0.5).abs() < 1e-9);
        assert_eq!(candidates[1].edge_id, 12);
        assert!((candidates[1].dist - 0.5).abs() < 1e-9);
        assert!((candidates[1].offset - 0.1).abs() < 1e-9);
        assert_eq!(candidates[2].edge_id, 11);
        let near = ns.search_candidates(0.5, 0.1, 3, 0.2).unwrap();
        assert_eq!(near.len(), 1);
        let top = ns.search_candidates(0.5, 0.1, 1, 1.0).unwrap();
        assert_eq!(top.len(), 1);
        // adding an edge invalidates the index
        ns.add_edge_geom(13, 3, 1, line(&[(2.0, 0.0), (0.0, 0.0)]))
            .unwrap();
        assert!(ns.edge_rtree.is_none());
    }

    #[test]
    fn test_candidate_compare_ties() {
        let a = Candidate {
            edge_index: 4,
            edge_id: 1,
            dist: 1.0,
            offset: 0.0,
            x: 0.0,
            y: 0.0,
        };
        let mut b = a.clone();
        b.edge_index = 2;
        assert_eq!(candidate_compare(&a, &b), Ordering::Greater);
        b.dist = 2.0;
        assert_eq!(candidate_compare(&a, &b), Ordering::Less);
    }
}
