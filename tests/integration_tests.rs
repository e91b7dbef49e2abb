//! End-to-end tests for the model pipeline: vector consolidation, raster
//! mosaicking, and the elevation join, driven through the public API with
//! in-memory fixtures.

use std::collections::HashSet;

use roadnet::vector::RawWay;
use roadnet::{Extent, Model, OverlapPolicy, RasterTile, VectorData};

fn test_extent() -> Extent {
    Extent {
        xmin: 4.0,
        xmax: 5.0,
        ymin: 50.0,
        ymax: 51.0,
    }
}

/// Five locations, all on grid nodes of the 3x3 test raster.
fn road_network() -> VectorData {
    VectorData::from_parts(
        "roads",
        vec![
            (1, 4.0, 50.0),
            (2, 4.5, 50.0),
            (3, 5.0, 50.0),
            (4, 4.5, 50.5),
            (5, 4.5, 51.0),
        ],
        vec![
            RawWay {
                id: 10,
                node_ids: vec![1, 2],
                tag: "trunk".to_string(),
            },
            RawWay {
                id: 11,
                node_ids: vec![2, 3],
                tag: "residential".to_string(),
            },
            RawWay {
                id: 12,
                node_ids: vec![2, 4],
                tag: "trunk".to_string(),
            },
            RawWay {
                id: 13,
                node_ids: vec![4, 5],
                tag: "motorway".to_string(),
            },
        ],
    )
}

/// 3x3 grid over the test extent, row 0 at the northern edge.
fn terrain() -> RasterTile {
    RasterTile::from_grid(
        "terrain",
        test_extent(),
        3,
        3,
        vec![
            100.0, 200.0, 300.0, // y = 51.0
            400.0, 500.0, 600.0, // y = 50.5
            700.0, 800.0, 900.0, // y = 50.0
        ],
        None,
    )
}

#[test]
fn test_build_assigns_exact_grid_elevations() {
    let mut model = Model::new("e2e");
    model.add_vector_data(road_network());
    model.add_raster_tile(terrain());
    model.build();

    assert_eq!(model.node_count(), 5);
    assert_eq!(model.edge_count(), 4);

    // Vertices sit on grid nodes, so bilinear weights collapse to the
    // sample value itself.
    let expect = |x: f64, y: f64| -> f64 {
        match (x, y) {
            (4.0, 50.0) => 700.0,
            (4.5, 50.0) => 800.0,
            (5.0, 50.0) => 900.0,
            (4.5, 50.5) => 500.0,
            (4.5, 51.0) => 200.0,
            _ => panic!("unexpected vertex at ({x}, {y})"),
        }
    };
    for v in model.nodes() {
        assert!((v.z.unwrap() - expect(v.x, v.y)).abs() < 1e-6);
    }
    assert_eq!(model.summary().warnings.elevation_misses, 0);
}

#[test]
fn test_coincident_nodes_merge_across_sources() {
    // A second extract names the shared junction by a different raw id
    // at the same coordinates.
    let second = VectorData::from_parts(
        "roads-2",
        vec![(101, 4.5, 50.0), (102, 4.5, 49.5)],
        vec![RawWay {
            id: 20,
            node_ids: vec![101, 102],
            tag: "trunk".to_string(),
        }],
    );

    let mut model = Model::new("merge");
    model.add_vector_data(road_network());
    model.add_vector_data(second);
    model.build();

    // One new vertex, not two: (4.5, 50.0) resolves to the existing one.
    assert_eq!(model.node_count(), 6);
    assert_eq!(model.edge_count(), 5);

    let graph = model.graph().unwrap();
    let junction = graph
        .vertices
        .iter()
        .position(|v| v.x == 4.5 && v.y == 50.0)
        .unwrap();
    // three in-source neighbors plus the cross-source endpoint
    assert_eq!(graph.neighbors(junction).len(), 4);
}

#[test]
fn test_overlapping_rasters_last_wins() {
    let flat = |name: &str, value: f32| {
        RasterTile::from_grid(name, test_extent(), 2, 2, vec![value; 4], None)
    };

    let mut model = Model::new("overlap");
    model.add_vector_data(road_network());
    model.add_raster_tile(flat("older", 10.0));
    model.add_raster_tile(flat("newer", 20.0));
    model.build();

    for v in model.nodes() {
        assert!((v.z.unwrap() - 20.0).abs() < 1e-6);
    }
}

#[test]
fn test_overlap_policy_max() {
    let flat = |name: &str, value: f32| {
        RasterTile::from_grid(name, test_extent(), 2, 2, vec![value; 4], None)
    };

    let mut model = Model::new("overlap-max").with_overlap_policy(OverlapPolicy::Max);
    model.add_vector_data(road_network());
    model.add_raster_tile(flat("high", 30.0));
    model.add_raster_tile(flat("low", 5.0));
    model.build();

    for v in model.nodes() {
        assert!((v.z.unwrap() - 30.0).abs() < 1e-6);
    }
}

#[test]
fn test_rebuild_is_idempotent() {
    let mut model = Model::new("rebuild");
    model.add_vector_data(road_network());
    model.add_raster_tile(terrain());

    model.build();
    let first_nodes = model.nodes().to_vec();
    let first_edges = model.edges().to_vec();

    model.build();
    assert_eq!(model.nodes(), &first_nodes[..]);
    assert_eq!(model.edges(), &first_edges[..]);
}

#[test]
fn test_tag_filter_drops_edges_and_orphans() {
    let include: HashSet<String> = ["motorway".to_string()].into_iter().collect();
    let mut model = Model::new("filtered").with_include(include);
    model.add_vector_data(road_network());
    model.add_raster_tile(terrain());
    model.build();

    assert_eq!(model.edge_count(), 1);
    assert_eq!(model.edges()[0].tag, "motorway");
    // Only the motorway's two endpoints survive orphan pruning
    assert_eq!(model.node_count(), 2);
}

#[test]
fn test_unknown_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roads.shp");
    std::fs::write(&path, b"not a supported format").unwrap();

    let mut model = Model::new("dispatch");
    let err = model.add(&path).unwrap_err();
    assert!(err.to_string().contains("roads.shp"));
    assert_eq!(model.source_count(), 0);
}

#[test]
fn test_summary_serializes_to_json() {
    let mut model = Model::new("json");
    model.add_vector_data(road_network());
    model.add_raster_tile(terrain());
    model.build();

    let json = serde_json::to_string(&model.summary()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["name"], "json");
    assert_eq!(value["crs"], 4326);
    assert_eq!(value["node_count"], 5);
    assert_eq!(value["edge_count"], 4);
    assert_eq!(value["value_range"][0], 100.0);
    assert_eq!(value["value_range"][1], 900.0);
}

#[test]
fn test_export_writes_tables() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = Model::new("export");
    model.add_vector_data(road_network());
    model.add_raster_tile(terrain());
    model.build();
    model.export(dir.path(), false).unwrap();

    let nodes = std::fs::read_to_string(dir.path().join("nodes.csv")).unwrap();
    let edges = std::fs::read_to_string(dir.path().join("edges.csv")).unwrap();
    assert_eq!(nodes.lines().count(), 6);
    assert_eq!(edges.lines().count(), 5);
    assert!(edges.lines().nth(1).unwrap().contains("trunk"));
}
