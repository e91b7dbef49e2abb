//! OSM vector source ingestion.
//!
//! One source file yields a raw node list and a raw way list with highway
//! tags. Parsing mechanics are delegated to the `osmpbf` collaborator; this
//! module only shapes its output into [`VectorData`].

use std::path::Path;

use osmpbf::{Element, ElementReader};

use crate::error::Result;
use crate::model::DEFAULT_CRS;

/// One way as read from the source: OSM node refs plus its highway class.
#[derive(Debug, Clone)]
pub struct RawWay {
    pub id: i64,
    pub node_ids: Vec<i64>,
    pub tag: String,
}

/// Raw geometry of one vector source, before any deduplication.
///
/// Nodes are `(osm_id, lon, lat)` sorted by id for determinism. Only ways
/// carrying a `highway` tag are kept; the tag value becomes [`RawWay::tag`].
#[derive(Debug, Clone)]
pub struct VectorData {
    pub name: String,
    pub crs: u32,
    pub nodes: Vec<(i64, f64, f64)>,
    pub ways: Vec<RawWay>,
}

impl VectorData {
    /// Load a vector source from an OSM PBF file.
    pub fn from_pbf<P: AsRef<Path>>(path: P) -> Result<VectorData> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("vector")
            .to_string();

        let reader = ElementReader::from_path(path)?;
        let mut nodes = Vec::new();
        let mut ways = Vec::new();

        reader.for_each(|element| match element {
            Element::Node(node) => {
                nodes.push((node.id(), node.lon(), node.lat()));
            }
            Element::DenseNode(node) => {
                nodes.push((node.id(), node.lon(), node.lat()));
            }
            Element::Way(way) => {
                let tag = way
                    .tags()
                    .find(|(k, _)| *k == "highway")
                    .map(|(_, v)| v.to_string());
                if let Some(tag) = tag {
                    ways.push(RawWay {
                        id: way.id(),
                        node_ids: way.refs().collect(),
                        tag,
                    });
                }
            }
            Element::Relation(_) => {}
        })?;

        // Sort by ID for determinism
        nodes.sort_by_key(|(id, _, _)| *id);
        ways.sort_by_key(|w| w.id);

        log::info!(
            "loaded vector source '{}': {} nodes, {} highway ways",
            name,
            nodes.len(),
            ways.len()
        );

        Ok(VectorData {
            name,
            crs: DEFAULT_CRS,
            nodes,
            ways,
        })
    }

    /// Build a source from in-memory geometry (used in tests).
    pub fn from_parts(name: &str, nodes: Vec<(i64, f64, f64)>, ways: Vec<RawWay>) -> VectorData {
        VectorData {
            name: name.to_string(),
            crs: DEFAULT_CRS,
            nodes,
            ways,
        }
    }
}
