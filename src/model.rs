//! Top-level model: accumulate sources, build, query.
//!
//! A model owns one consolidated vertex/edge table and one raster mosaic.
//! `add()` resolves each path to a source kind once; `build()` loads the
//! pending sources in parallel, merges them under a single writer, and
//! joins graph and mosaic by sampling an elevation for every vertex.
//! Repeated `build()` calls re-run deterministically from the same
//! accumulated sources.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::geo::Extent;
use crate::graph::{Edge, Graph, GraphBuilder, GraphWarnings, Vertex, DEFAULT_PRECISION};
use crate::mosaic::{MosaicBuilder, OverlapPolicy, RasterMosaic};
use crate::raster::RasterTile;
use crate::vector::VectorData;

/// EPSG code carried through when sources do not disagree.
pub const DEFAULT_CRS: u32 = 4326;

/// Closed set of source kinds, resolved once at add() time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Vector,
    Raster,
}

fn detect_kind(path: &Path) -> Option<SourceKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pbf" => Some(SourceKind::Vector),
        "tif" | "tiff" => Some(SourceKind::Raster),
        _ => None,
    }
}

/// A pending source: a path not yet loaded, or data already in memory.
/// Loaded data is cached so rebuilds do not touch the filesystem again.
enum Input<T> {
    Path(PathBuf),
    Loaded(T),
}

/// Warnings accumulated across a build. Per-source and per-vertex problems
/// land here instead of failing the build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModelWarnings {
    pub graph: GraphWarnings,
    /// Sources that could not be loaded at build time.
    pub failed_sources: u64,
    /// Sources whose CRS disagreed with the model's.
    pub crs_disagreements: u64,
    /// Vertices whose elevation query failed (OutOfBounds or NoData).
    pub elevation_misses: u64,
}

/// Read-only snapshot of a model, serializable for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub crs: u32,
    pub built: bool,
    pub source_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub extent: Option<Extent>,
    pub value_range: Option<(f64, f64)>,
    pub warnings: ModelWarnings,
}

struct BuiltModel {
    graph: Graph,
    mosaic: RasterMosaic,
    warnings: ModelWarnings,
}

/// Road-network model joining a consolidated graph with a terrain mosaic.
pub struct Model {
    name: String,
    crs: u32,
    precision: u32,
    policy: OverlapPolicy,
    include: Option<HashSet<String>>,
    vectors: Vec<Input<VectorData>>,
    rasters: Vec<Input<RasterTile>>,
    built: Option<BuiltModel>,
}

impl Model {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            crs: DEFAULT_CRS,
            precision: DEFAULT_PRECISION,
            policy: OverlapPolicy::default(),
            include: None,
            vectors: Vec::new(),
            rasters: Vec::new(),
            built: None,
        }
    }

    /// Vertex-coincidence rounding precision in decimal places.
    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Restrict the edge table to ways whose tag is in `include`.
    pub fn with_include(mut self, include: HashSet<String>) -> Self {
        self.include = Some(include);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    /// Register a source file, dispatching on its kind.
    ///
    /// Fails with [`Error::UnsupportedFormat`] when the kind cannot be
    /// determined or the file cannot be read; existing state is untouched.
    pub fn add<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let kind = detect_kind(path).ok_or_else(|| Error::UnsupportedFormat(path.to_path_buf()))?;
        if std::fs::metadata(path).is_err() {
            return Err(Error::UnsupportedFormat(path.to_path_buf()));
        }
        match kind {
            SourceKind::Vector => self.vectors.push(Input::Path(path.to_path_buf())),
            SourceKind::Raster => self.rasters.push(Input::Path(path.to_path_buf())),
        }
        Ok(())
    }

    /// Register an in-memory vector source.
    pub fn add_vector_data(&mut self, data: VectorData) {
        self.vectors.push(Input::Loaded(data));
    }

    /// Register an in-memory raster tile.
    pub fn add_raster_tile(&mut self, tile: RasterTile) {
        self.rasters.push(Input::Loaded(tile));
    }

    pub fn source_count(&self) -> usize {
        self.vectors.len() + self.rasters.len()
    }

    /// Load any pending paths, in parallel. Sources that fail to load are
    /// dropped with a warning; loaded data replaces the path entry so the
    /// next build reuses it.
    fn load_pending(&mut self) -> u64 {
        let mut failed = 0;

        let loaded: Vec<Option<VectorData>> = std::mem::take(&mut self.vectors)
            .into_par_iter()
            .map(|input| match input {
                Input::Loaded(data) => Some(data),
                Input::Path(path) => match VectorData::from_pbf(&path) {
                    Ok(data) => Some(data),
                    Err(err) => {
                        log::warn!("skipping vector source {}: {}", path.display(), err);
                        None
                    }
                },
            })
            .collect();
        for data in loaded {
            match data {
                Some(data) => self.vectors.push(Input::Loaded(data)),
                None => failed += 1,
            }
        }

        let loaded: Vec<Option<RasterTile>> = std::mem::take(&mut self.rasters)
            .into_par_iter()
            .map(|input| match input {
                Input::Loaded(tile) => Some(tile),
                Input::Path(path) => match RasterTile::from_tiff(&path) {
                    Ok(tile) => Some(tile),
                    Err(err) => {
                        log::warn!("skipping raster source {}: {}", path.display(), err);
                        None
                    }
                },
            })
            .collect();
        for tile in loaded {
            match tile {
                Some(tile) => self.rasters.push(Input::Loaded(tile)),
                None => failed += 1,
            }
        }

        failed
    }

    /// Consolidate the graph, finalize the mosaic, and assign elevations.
    ///
    /// Always succeeds: per-source and per-vertex failures are recorded as
    /// warnings, and a model with no usable sources builds to a valid empty
    /// state. Calling build() again re-runs the same deterministic pipeline
    /// over the accumulated sources.
    pub fn build(&mut self) {
        let mut warnings = ModelWarnings {
            failed_sources: self.load_pending(),
            ..Default::default()
        };

        // Single-writer merge: the dedup index is updated sequentially.
        let mut crs = None;
        let mut graph_builder = GraphBuilder::with_precision(self.precision);
        for input in &self.vectors {
            if let Input::Loaded(data) = input {
                match crs {
                    None => crs = Some(data.crs),
                    Some(current) if current != data.crs => {
                        log::warn!(
                            "source '{}' uses EPSG:{} but the model uses EPSG:{}; keeping EPSG:{}",
                            data.name,
                            data.crs,
                            current,
                            DEFAULT_CRS
                        );
                        warnings.crs_disagreements += 1;
                        crs = Some(DEFAULT_CRS);
                    }
                    Some(_) => {}
                }
                graph_builder.add_source(data);
            }
        }
        let mut graph = graph_builder.consolidate(self.include.as_ref());
        warnings.graph = graph.warnings;

        let mut mosaic_builder = MosaicBuilder::with_policy(self.policy);
        for input in &self.rasters {
            if let Input::Loaded(tile) = input {
                mosaic_builder.add_tile(tile.clone());
            }
        }
        let mosaic = mosaic_builder.finalize();

        // Join: one elevation per vertex, misses flagged instead of fatal.
        // With no rasters at all every elevation stays unset, unflagged.
        if mosaic.tile_count() > 0 {
            let points: Vec<(f64, f64)> = graph.vertices.iter().map(|v| (v.x, v.y)).collect();
            let elevations = mosaic.interpolate_batch(&points);
            for (vertex, elevation) in graph.vertices.iter_mut().zip(elevations) {
                match elevation {
                    Ok(z) => vertex.z = Some(z),
                    Err(err) => {
                        log::debug!("elevation miss at ({}, {}): {}", vertex.x, vertex.y, err);
                        warnings.elevation_misses += 1;
                    }
                }
            }
        }

        self.crs = crs.unwrap_or(DEFAULT_CRS);
        log::info!(
            "built model '{}': {} nodes, {} edges, {} tiles",
            self.name,
            graph.vertex_count(),
            graph.edge_count(),
            mosaic.tile_count()
        );

        self.built = Some(BuiltModel {
            graph,
            mosaic,
            warnings,
        });
    }

    /// Node table of the built model. Empty before build().
    pub fn nodes(&self) -> &[Vertex] {
        self.built.as_ref().map_or(&[], |b| &b.graph.vertices)
    }

    /// Edge table of the built model. Empty before build().
    pub fn edges(&self) -> &[Edge] {
        self.built.as_ref().map_or(&[], |b| &b.graph.edges)
    }

    pub fn graph(&self) -> Option<&Graph> {
        self.built.as_ref().map(|b| &b.graph)
    }

    pub fn mosaic(&self) -> Option<&RasterMosaic> {
        self.built.as_ref().map(|b| &b.mosaic)
    }

    pub fn node_count(&self) -> usize {
        self.nodes().len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges().len()
    }

    /// Read-only snapshot: name, CRS, counts, extent, value range.
    pub fn summary(&self) -> ModelSummary {
        let built = self.built.as_ref();
        ModelSummary {
            name: self.name.clone(),
            crs: self.crs,
            built: built.is_some(),
            source_count: self.source_count(),
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            extent: built.and_then(|b| b.graph.extent()),
            value_range: built.and_then(|b| b.mosaic.value_range()),
            warnings: built.map(|b| b.warnings).unwrap_or_default(),
        }
    }

    /// Print the summary to stdout, one field per line.
    pub fn dump(&self) {
        let s = self.summary();
        println!("name: {}", s.name);
        println!("crs: EPSG:{}", s.crs);
        println!("built: {}", s.built);
        println!("node_count: {}", s.node_count);
        println!("edge_count: {}", s.edge_count);
        if let Some(e) = s.extent {
            println!("extent: [{}, {}] x [{}, {}]", e.xmin, e.xmax, e.ymin, e.ymax);
        }
        if let Some((zmin, zmax)) = s.value_range {
            println!("value_range: [{}, {}]", zmin, zmax);
        }
    }

    /// Write `nodes.csv` and `edges.csv` into `dir`.
    ///
    /// Refuses to overwrite existing files unless `overwrite` is set.
    pub fn export<P: AsRef<Path>>(&self, dir: P, overwrite: bool) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let nodes_path = dir.join("nodes.csv");
        let edges_path = dir.join("edges.csv");
        if !overwrite {
            for path in [&nodes_path, &edges_path] {
                if path.exists() {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        format!("{} already exists", path.display()),
                    )));
                }
            }
        }

        let mut w = BufWriter::new(File::create(&nodes_path)?);
        writeln!(w, "fid,x,y,z")?;
        for (fid, v) in self.nodes().iter().enumerate() {
            match v.z {
                Some(z) => writeln!(w, "{},{},{},{}", fid, v.x, v.y, z)?,
                None => writeln!(w, "{},{},{},", fid, v.x, v.y)?,
            }
        }
        w.flush()?;

        let mut w = BufWriter::new(File::create(&edges_path)?);
        writeln!(w, "fid,i,j,tag,length,vseq")?;
        for (fid, e) in self.edges().iter().enumerate() {
            let vseq = e
                .vseq
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(
                w,
                "{},{},{},{},{},\"{}\"",
                fid, e.i, e.j, e.tag, e.length_m, vseq
            )?;
        }
        w.flush()?;

        Ok(())
    }
}
