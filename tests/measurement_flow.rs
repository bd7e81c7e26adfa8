//! End-to-end measurement sessions driven through the dispatcher and the
//! owner thread.
//!
//! The scene is a 10 mm square box centred on the origin, seen through a
//! 120×120 viewport with a 12×12 grid. With the 10% fit margin that makes
//! one cell exactly 1 mm, so cell corners (offsets 0, 0) land on whole
//! millimetres: `G7` is the origin and `J3` is (3, 4).

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use cad_bridge_mcp::config::ScreenshotConfig;
use cad_bridge_mcp::diagnostics::Diagnostics;
use cad_bridge_mcp::dispatcher::{Dispatcher, ToolCall};
use cad_bridge_mcp::executor::{Executor, OwnerHandle};
use cad_bridge_mcp::host::{SceneBox, SimHost, Vec3};
use cad_bridge_mcp::measure::MeasurementState;
use cad_bridge_mcp::session::Session;
use cad_bridge_mcp::tools::ToolRegistry;

const TOLERANCE: f64 = 1e-9;

fn dispatcher() -> (Dispatcher, OwnerHandle) {
    let diagnostics = Diagnostics::new();
    let session_diagnostics = diagnostics.clone();
    let (executor, owner) = Executor::spawn(
        "measurement-owner",
        move || {
            let scene = [SceneBox {
                name: "Block".to_string(),
                min: Vec3::new(-5.0, -5.0, 0.0),
                max: Vec3::new(5.0, 5.0, 2.0),
            }];
            let screenshot = ScreenshotConfig {
                attach_to_results: false,
                ..ScreenshotConfig::default()
            };
            Session::new(
                Box::new(SimHost::with_scene(120, 120, &scene)),
                MeasurementState::new(12, 12),
                screenshot,
                session_diagnostics,
            )
        },
        diagnostics,
    )
    .unwrap();
    let registry = Arc::new(ToolRegistry::builtin().unwrap());
    (
        Dispatcher::new(registry, executor, Duration::from_secs(5)),
        owner,
    )
}

fn call(d: &Dispatcher, tool: &str, arguments: Value) -> Value {
    let arguments = arguments.as_object().cloned().unwrap_or_default();
    d.dispatch(ToolCall::new(tool, arguments)).to_value()
}

fn ok(d: &Dispatcher, tool: &str, arguments: Value) -> Value {
    let result = call(d, tool, arguments);
    assert_eq!(result["success"], true, "{tool} failed: {result}");
    result
}

fn coords(value: &Value) -> [f64; 3] {
    let c = value["coords"].as_array().unwrap();
    [
        c[0].as_f64().unwrap(),
        c[1].as_f64().unwrap(),
        c[2].as_f64().unwrap(),
    ]
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < TOLERANCE,
        "expected {expected}, got {actual}"
    );
}

fn select_corner(d: &Dispatcher, cell: &str) -> Value {
    ok(
        d,
        "select_point",
        json!({"grid_cell": cell, "offset_x": 0.0, "offset_y": 0.0}),
    )
}

#[test]
fn three_four_five() {
    let (d, _owner) = dispatcher();
    ok(&d, "start_measurement", json!({}));

    let a = select_corner(&d, "G7");
    let [x, y, z] = coords(&a);
    assert_close(x, 0.0);
    assert_close(y, 0.0);
    assert_close(z, 2.0);

    let b = select_corner(&d, "J3");
    let [x, y, _] = coords(&b);
    assert_close(x, 3.0);
    assert_close(y, 4.0);

    ok(&d, "confirm_point", json!({"point_id": "point_1"}));
    ok(&d, "confirm_point", json!({"point_id": "point_2"}));

    let report = ok(
        &d,
        "measure_distance",
        json!({"point_a": "point_1", "point_b": "point_2"}),
    );
    assert_close(report["distance"].as_f64().unwrap(), 5.0);
    assert_close(report["distance_cm"].as_f64().unwrap(), 0.5);
    assert_close(report["distance_m"].as_f64().unwrap(), 0.005);
}

#[test]
fn zoomed_cells_refer_to_the_zoomed_region() {
    let (d, _owner) = dispatcher();
    ok(&d, "start_measurement", json!({}));

    let zoom = ok(&d, "zoom_grid_region", json!({"start_cell": "A1", "size": 6}));
    assert_close(zoom["region"]["x_max"].as_f64().unwrap(), 0.5);
    assert_close(zoom["region"]["y_max"].as_f64().unwrap(), 0.5);

    // G7 is now the centre of the top-left quarter.
    let p = select_corner(&d, "G7");
    let [x, y, _] = coords(&p);
    assert_close(x, -3.0);
    assert_close(y, 3.0);

    // A second zoom narrows the region further.
    let zoom = ok(&d, "zoom_grid_region", json!({"start_cell": "G7", "size": 6}));
    assert_close(zoom["region"]["x_min"].as_f64().unwrap(), 0.25);
    assert_close(zoom["region"]["x_max"].as_f64().unwrap(), 0.5);

    let reset = ok(&d, "reset_grid_zoom", json!({}));
    assert_eq!(reset["region"]["x_min"], 0.0);
    assert_eq!(reset["region"]["x_max"], 1.0);
}

#[test]
fn missing_the_geometry_is_an_error() {
    let (d, _owner) = dispatcher();
    ok(&d, "start_measurement", json!({}));

    // A1's corner is in the margin around the box.
    let result = call(
        &d,
        "select_point",
        json!({"grid_cell": "A1", "offset_x": 0.0, "offset_y": 0.0}),
    );
    assert_eq!(result["success"], false);

    // Misses do not consume point ids.
    let p = ok(&d, "select_point", json!({"grid_cell": "F6"}));
    assert_eq!(p["point_id"], "point_1");
}

#[test]
fn confirmed_points_and_lines_survive_end_measurement() {
    let (d, _owner) = dispatcher();
    ok(&d, "start_measurement", json!({}));
    select_corner(&d, "G7");
    select_corner(&d, "J3");
    select_corner(&d, "H8");
    ok(&d, "confirm_point", json!({"point_id": "point_1"}));
    ok(&d, "confirm_point", json!({"point_id": "point_2"}));
    ok(
        &d,
        "measure_distance",
        json!({"point_a": "point_1", "point_b": "point_2"}),
    );

    let ended = ok(&d, "end_measurement", json!({}));
    assert_eq!(ended["discarded_points"], json!(["point_3"]));

    let listed = ok(&d, "list_points", json!({}));
    assert_eq!(listed["pending"], 0);
    assert_eq!(listed["confirmed"], 2);

    // Measuring again works outside measurement mode.
    let again = ok(
        &d,
        "measure_distance",
        json!({"point_a": "point_2", "point_b": "point_1"}),
    );
    assert_close(again["distance"].as_f64().unwrap(), 5.0);

    let info = ok(&d, "get_grid_info", json!({}));
    assert_eq!(info["mode"], "inactive");
    assert_eq!(info["measurements"], 2);

    let cleared = ok(&d, "clear_measurements", json!({}));
    assert_eq!(cleared["lines_removed"], 2);
    assert_eq!(cleared["points_removed"], 2);
}

#[test]
fn point_state_errors() {
    let (d, _owner) = dispatcher();
    ok(&d, "start_measurement", json!({}));
    select_corner(&d, "G7");
    select_corner(&d, "J3");

    // Pending points cannot be measured.
    let result = call(
        &d,
        "measure_distance",
        json!({"point_a": "point_1", "point_b": "point_2"}),
    );
    assert_eq!(result["success"], false);

    ok(&d, "confirm_point", json!({"point_id": "point_1"}));
    let twice = call(&d, "confirm_point", json!({"point_id": "point_1"}));
    assert_eq!(twice["success"], false);
    assert!(twice["error"].as_str().unwrap().contains("already confirmed"));

    let unknown = call(&d, "confirm_point", json!({"point_id": "point_9"}));
    assert_eq!(unknown["success"], false);

    let bad_cell = call(&d, "select_point", json!({"grid_cell": "Z99"}));
    assert_eq!(bad_cell["success"], false);

    let cleared = ok(&d, "clear_point", json!({"point_id": "ALL"}));
    assert_eq!(cleared["count"], 2);
}
