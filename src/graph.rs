//! Graph consolidation: deduplicated vertex table plus edge table.
//!
//! Raw vertices from every ingested source are keyed by rounded (x, y) at a
//! fixed decimal precision; the first occurrence of a key allocates a compact
//! index and later occurrences map onto it. Ways become edges keyed by their
//! compact endpoints, keeping the full pre-dedup point sequence (vseq) as the
//! edge's true polyline shape.

use std::collections::HashSet;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::geo::{haversine_distance, Extent};
use crate::vector::VectorData;

/// Decimal places used when rounding coordinates for deduplication.
///
/// 1e-7 degrees (~1.1 cm at the equator) matches the fixed-point coordinate
/// precision OSM itself stores.
pub const DEFAULT_PRECISION: u32 = 7;

/// Deduplicated graph vertex. Elevation is unset until the model assigns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

/// Edge between compact vertices `i < j`, carrying the highway tag, length
/// along the polyline, and the ordered pre-dedup point ids (vseq).
///
/// Interior vseq entries are ids in the raw numbering space, not compact
/// vertex indices; only the first and last entries are guaranteed to sit at
/// the same physical locations as vertices `i` and `j`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub i: usize,
    pub j: usize,
    pub tag: String,
    pub length_m: f64,
    pub vseq: Vec<u64>,
}

/// Counts of per-way problems skipped during ingestion and consolidation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphWarnings {
    /// Ways referencing node ids absent from their own source.
    pub malformed_ways: u64,
    /// Ways with fewer than 2 points or zero-length self-loops.
    pub degenerate_ways: u64,
}

/// Consolidated output of [`GraphBuilder::consolidate`].
#[derive(Debug, Clone)]
pub struct Graph {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<Edge>,
    pub warnings: GraphWarnings,
    raw_coords: Vec<(f64, f64)>,
}

impl Graph {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// (x, y) of a pre-dedup point referenced by an edge's vseq.
    pub fn raw_coord(&self, raw_id: u64) -> Option<(f64, f64)> {
        self.raw_coords.get(raw_id as usize).copied()
    }

    /// Compact vertex indices adjacent to vertex `i`.
    pub fn neighbors(&self, i: usize) -> HashSet<usize> {
        let mut out = HashSet::new();
        for e in &self.edges {
            if e.i == i {
                out.insert(e.j);
            }
            if e.j == i {
                out.insert(e.i);
            }
        }
        out
    }

    /// First edge connecting `i` and `j` in either order, if any.
    pub fn edge_between(&self, i: usize, j: usize) -> Option<&Edge> {
        let (a, b) = if i <= j { (i, j) } else { (j, i) };
        self.edges.iter().find(|e| e.i == a && e.j == b)
    }

    /// Bounding extent of the vertex table, or None when empty.
    pub fn extent(&self) -> Option<Extent> {
        let first = self.vertices.first()?;
        let mut ext = Extent {
            xmin: first.x,
            xmax: first.x,
            ymin: first.y,
            ymax: first.y,
        };
        for v in &self.vertices[1..] {
            ext.xmin = ext.xmin.min(v.x);
            ext.xmax = ext.xmax.max(v.x);
            ext.ymin = ext.ymin.min(v.y);
            ext.ymax = ext.ymax.max(v.y);
        }
        Some(ext)
    }
}

/// Hash-keyed vertex dedup index.
///
/// Rounding uses `f64::round`, which rounds half away from zero -- the
/// deterministic tie-break the consolidation relies on.
struct DedupIndex {
    scale: f64,
    map: FxHashMap<(i64, i64), usize>,
    /// First-seen coordinates per compact index.
    coords: Vec<(f64, f64)>,
}

impl DedupIndex {
    fn new(precision: u32) -> Self {
        Self {
            scale: 10f64.powi(precision as i32),
            map: FxHashMap::default(),
            coords: Vec::new(),
        }
    }

    fn key(&self, x: f64, y: f64) -> (i64, i64) {
        ((x * self.scale).round() as i64, (y * self.scale).round() as i64)
    }

    /// Compact index for (x, y), allocating on first occurrence.
    fn insert(&mut self, x: f64, y: f64) -> usize {
        let key = self.key(x, y);
        if let Some(&idx) = self.map.get(&key) {
            return idx;
        }
        let idx = self.coords.len();
        self.map.insert(key, idx);
        self.coords.push((x, y));
        idx
    }
}

struct PendingWay {
    way_id: i64,
    tag: String,
    /// Global pre-dedup point ids, one per way node.
    raw_ids: Vec<u64>,
}

/// Accumulates raw geometry from many sources and consolidates it into a
/// [`Graph`]. The dedup index is owned here, never shared, so independent
/// builders cannot interfere.
pub struct GraphBuilder {
    index: DedupIndex,
    /// Global raw id -> coordinates, across all ingested sources.
    raw_coords: Vec<(f64, f64)>,
    /// Global raw id -> compact vertex index.
    raw_to_compact: Vec<usize>,
    ways: Vec<PendingWay>,
    warnings: GraphWarnings,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::with_precision(DEFAULT_PRECISION)
    }

    pub fn with_precision(precision: u32) -> Self {
        Self {
            index: DedupIndex::new(precision),
            raw_coords: Vec::new(),
            raw_to_compact: Vec::new(),
            ways: Vec::new(),
            warnings: GraphWarnings::default(),
        }
    }

    /// Ingest one source's raw geometry, extending the dedup index.
    ///
    /// Ways that reference node ids missing from their own source are
    /// skipped and counted as malformed; ingestion continues.
    pub fn add_source(&mut self, data: &VectorData) {
        // Source-local OSM id -> global raw id
        let mut local: FxHashMap<i64, u64> =
            FxHashMap::with_capacity_and_hasher(data.nodes.len(), Default::default());

        for &(osm_id, x, y) in &data.nodes {
            let raw_id = self.raw_coords.len() as u64;
            local.insert(osm_id, raw_id);
            self.raw_coords.push((x, y));
            let compact = self.index.insert(x, y);
            self.raw_to_compact.push(compact);
        }

        for way in &data.ways {
            let mut raw_ids = Vec::with_capacity(way.node_ids.len());
            let mut missing = false;
            for osm_id in &way.node_ids {
                match local.get(osm_id) {
                    Some(&raw) => raw_ids.push(raw),
                    None => {
                        missing = true;
                        break;
                    }
                }
            }
            if missing {
                log::warn!(
                    "source '{}': way {} references a node absent from the source, skipping",
                    data.name,
                    way.id
                );
                self.warnings.malformed_ways += 1;
                continue;
            }
            self.ways.push(PendingWay {
                way_id: way.id,
                tag: way.tag.clone(),
                raw_ids,
            });
        }
    }

    /// Produce the final vertex and edge tables.
    ///
    /// A non-empty `include` set drops every way whose tag is not a member;
    /// vertices no longer referenced by any kept edge are pruned and the
    /// remaining indices compacted. Consolidating twice from the same
    /// builder yields identical tables.
    pub fn consolidate(&self, include: Option<&HashSet<String>>) -> Graph {
        let filter = include.filter(|set| !set.is_empty());
        let mut warnings = self.warnings;
        let mut edges = Vec::new();
        // Compact indices referenced by at least one kept edge.
        let mut used = vec![false; self.index.coords.len()];

        for way in &self.ways {
            if way.raw_ids.len() < 2 {
                log::warn!(
                    "{}, skipping",
                    Error::DegenerateGeometry { way_id: way.way_id }
                );
                warnings.degenerate_ways += 1;
                continue;
            }
            if let Some(set) = filter {
                if !set.contains(&way.tag) {
                    continue;
                }
            }

            let mut length_m = 0.0;
            for pair in way.raw_ids.windows(2) {
                let (x0, y0) = self.raw_coords[pair[0] as usize];
                let (x1, y1) = self.raw_coords[pair[1] as usize];
                length_m += haversine_distance(y0, x0, y1, x1);
            }

            let i = self.raw_to_compact[way.raw_ids[0] as usize];
            let j = self.raw_to_compact[*way.raw_ids.last().unwrap() as usize];

            // Zero-length self-loops collapse to a single physical point.
            if i == j && length_m == 0.0 {
                log::warn!(
                    "{}, skipping",
                    Error::DegenerateGeometry { way_id: way.way_id }
                );
                warnings.degenerate_ways += 1;
                continue;
            }

            // Orient i < j; reverse vseq so its ends still align with (i, j).
            let mut vseq = way.raw_ids.clone();
            let (i, j) = if i <= j {
                (i, j)
            } else {
                vseq.reverse();
                (j, i)
            };

            for &raw in &vseq {
                used[self.raw_to_compact[raw as usize]] = true;
            }
            edges.push(Edge {
                i,
                j,
                tag: way.tag.clone(),
                length_m,
                vseq,
            });
        }

        // Prune orphans and compact the surviving indices, preserving
        // first-seen order.
        let mut remap = vec![usize::MAX; used.len()];
        let mut vertices = Vec::new();
        for (old, &keep) in used.iter().enumerate() {
            if keep {
                remap[old] = vertices.len();
                let (x, y) = self.index.coords[old];
                vertices.push(Vertex { x, y, z: None });
            }
        }
        for edge in &mut edges {
            edge.i = remap[edge.i];
            edge.j = remap[edge.j];
        }

        Graph {
            vertices,
            edges,
            warnings,
            raw_coords: self.raw_coords.clone(),
        }
    }

    pub fn raw_vertex_count(&self) -> usize {
        self.raw_coords.len()
    }

    pub fn way_count(&self) -> usize {
        self.ways.len()
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
