//! Measurement-mode tools: grid zoom, point picking and distances.

use serde_json::{json, Value};

use super::{
    payload, ArgDefault, ArgKind, ArgSpec, Arguments, HandlerResult, Payload, ToolHandler,
    ToolSpec,
};
use crate::measure::PointStatus;
use crate::session::Session;

const POINT_DOCUMENT_ARG: ArgSpec = ArgSpec::optional(
    "document",
    ArgKind::String,
    ArgDefault::None,
    "Document to pick in or draw into: a name, or 'target' / 'work' in dual document mode",
);

pub(super) const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "start_measurement",
        description: "Enter measurement mode. Screenshots show a labelled grid (columns A, B, \
                      C..., rows 1, 2, 3...) that cells are referenced by.",
        args: &[],
        handler: ToolHandler::Session(start_measurement),
        attach_snapshot: true,
    },
    ToolSpec {
        name: "end_measurement",
        description: "Leave measurement mode. Pending points are discarded; confirmed points \
                      and measurements are kept.",
        args: &[],
        handler: ToolHandler::Session(end_measurement),
        attach_snapshot: true,
    },
    ToolSpec {
        name: "zoom_grid_region",
        description: "Narrow the grid to a size x size block of cells starting at start_cell. \
                      Zooms compose: each one subdivides the current region.",
        args: &[
            ArgSpec::required(
                "start_cell",
                ArgKind::String,
                "Top-left cell of the block, e.g. 'C2'",
            ),
            ArgSpec::required(
                "size",
                ArgKind::Integer,
                "Block size in cells, from 1 to min(columns, rows)",
            ),
        ],
        handler: ToolHandler::Session(zoom_grid_region),
        attach_snapshot: true,
    },
    ToolSpec {
        name: "reset_grid_zoom",
        description: "Restore the full grid region and fit the view to all geometry.",
        args: &[],
        handler: ToolHandler::Session(reset_grid_zoom),
        attach_snapshot: true,
    },
    ToolSpec {
        name: "select_point",
        description: "Pick the surface point under a grid cell. The point is pending until \
                      confirmed with confirm_point.",
        args: &[
            ArgSpec::required("grid_cell", ArgKind::String, "Cell reference, e.g. 'D4'"),
            ArgSpec::optional(
                "offset_x",
                ArgKind::Number,
                ArgDefault::Num(0.5),
                "Horizontal position inside the cell, 0 (left) to 1 (right)",
            ),
            ArgSpec::optional(
                "offset_y",
                ArgKind::Number,
                ArgDefault::Num(0.5),
                "Vertical position inside the cell, 0 (top) to 1 (bottom)",
            ),
            POINT_DOCUMENT_ARG,
        ],
        handler: ToolHandler::Session(select_point),
        attach_snapshot: true,
    },
    ToolSpec {
        name: "confirm_point",
        description: "Confirm a pending point so it can be measured.",
        args: &[ArgSpec::required(
            "point_id",
            ArgKind::String,
            "Id returned by select_point, e.g. 'point_1'",
        )],
        handler: ToolHandler::Session(confirm_point),
        attach_snapshot: true,
    },
    ToolSpec {
        name: "clear_point",
        description: "Remove a pending or confirmed point and its marker, or every point with \
                      'all'.",
        args: &[ArgSpec::required(
            "point_id",
            ArgKind::String,
            "Point id, or 'all'",
        )],
        handler: ToolHandler::Session(clear_point),
        attach_snapshot: true,
    },
    ToolSpec {
        name: "list_points",
        description: "List pending and confirmed points.",
        args: &[],
        handler: ToolHandler::Session(list_points),
        attach_snapshot: false,
    },
    ToolSpec {
        name: "measure_distance",
        description: "Measure between two confirmed points and draw a line between them.",
        args: &[
            ArgSpec::required("point_a", ArgKind::String, "First confirmed point id"),
            ArgSpec::required("point_b", ArgKind::String, "Second confirmed point id"),
            POINT_DOCUMENT_ARG,
        ],
        handler: ToolHandler::Session(measure_distance),
        attach_snapshot: true,
    },
    ToolSpec {
        name: "clear_measurements",
        description: "Remove every measurement line and every point.",
        args: &[],
        handler: ToolHandler::Session(clear_measurements),
        attach_snapshot: true,
    },
    ToolSpec {
        name: "get_grid_info",
        description: "Grid size, current region, measurement mode and point counts.",
        args: &[],
        handler: ToolHandler::Session(get_grid_info),
        attach_snapshot: false,
    },
];

fn with_message(value: Value, message: String) -> Payload {
    let mut out = payload(value);
    out.insert("message".to_string(), Value::String(message));
    out
}

fn start_measurement(session: &mut Session, _: &Arguments) -> HandlerResult {
    let (host, state, diagnostics) = session.measure_parts();
    let info = state.start(host, diagnostics);
    let message = format!(
        "Measurement mode active. Grid cells {} ({} columns x {} rows)",
        info.cells, info.columns, info.rows
    );
    Ok(with_message(json!(info), message))
}

fn end_measurement(session: &mut Session, _: &Arguments) -> HandlerResult {
    let (host, state, diagnostics) = session.measure_parts();
    let discarded = state.end(host, diagnostics);
    let kept = state.confirmed().count();
    Ok(payload(json!({
        "discarded_points": discarded,
        "confirmed_points": kept,
        "measurements": state.lines().len(),
        "message": format!(
            "Measurement mode ended. {} pending point(s) discarded, {kept} confirmed kept",
            discarded.len()
        ),
    })))
}

fn zoom_grid_region(session: &mut Session, args: &Arguments) -> HandlerResult {
    let start_cell = args.required_str("start_cell")?;
    let size = args.int("size").unwrap_or_default();
    let (host, state, diagnostics) = session.measure_parts();
    let report = state.zoom(host, diagnostics, start_cell, size)?;
    let message = if report.camera_adjusted {
        format!("Zoomed to {size}x{size} cells from {}", start_cell.trim().to_uppercase())
    } else {
        "Grid region narrowed but the view could not follow; the grid covers part of the \
         screenshot"
            .to_string()
    };
    Ok(with_message(json!(report), message))
}

fn reset_grid_zoom(session: &mut Session, _: &Arguments) -> HandlerResult {
    let (host, state, diagnostics) = session.measure_parts();
    let report = state.reset_zoom(host, diagnostics);
    Ok(with_message(json!(report), "Grid reset to the full view".to_string()))
}

fn select_point(session: &mut Session, args: &Arguments) -> HandlerResult {
    let grid_cell = args.required_str("grid_cell")?;
    let offset_x = args.number("offset_x").unwrap_or(0.5);
    let offset_y = args.number("offset_y").unwrap_or(0.5);
    let document = session.resolve_document(args.str("document"))?;

    let (host, state, _) = session.measure_parts();
    let point = state.select_point(host, &document, grid_cell, offset_x, offset_y)?;
    let c = point.coords;
    Ok(payload(json!({
        "point_id": point.id,
        "coords": c,
        "grid_cell": point.source_cell,
        "document": point.document,
        "color": point.color,
        "marker_radius": point.marker_radius,
        "status": PointStatus::Pending,
        "message": format!(
            "Selected {} at ({:.2}, {:.2}, {:.2}). Call confirm_point to keep it",
            point.id, c.x, c.y, c.z
        ),
    })))
}

fn confirm_point(session: &mut Session, args: &Arguments) -> HandlerResult {
    let point_id = args.required_str("point_id")?;
    let (_, state, _) = session.measure_parts();
    let point = state.confirm_point(point_id)?;
    Ok(payload(json!({
        "point_id": point.id,
        "coords": point.coords,
        "status": PointStatus::Confirmed,
        "confirmed_points": state.confirmed().count(),
    })))
}

fn clear_point(session: &mut Session, args: &Arguments) -> HandlerResult {
    let point_id = args.required_str("point_id")?;
    let (host, state, diagnostics) = session.measure_parts();
    let cleared = state.clear_point(host, diagnostics, point_id)?;
    Ok(payload(json!({
        "count": cleared.len(),
        "cleared": cleared,
    })))
}

fn list_points(session: &mut Session, _: &Arguments) -> HandlerResult {
    let state = session.measurement();
    Ok(payload(json!({
        "points": state.list_points(),
        "pending": state.pending().count(),
        "confirmed": state.confirmed().count(),
    })))
}

fn measure_distance(session: &mut Session, args: &Arguments) -> HandlerResult {
    let point_a = args.required_str("point_a")?;
    let point_b = args.required_str("point_b")?;
    let document = session.resolve_document(args.str("document"))?;

    let (host, state, _) = session.measure_parts();
    let report = state.measure_distance(host, &document, point_a, point_b)?;
    let message = format!(
        "Distance {point_a} to {point_b}: {:.3} mm",
        report.distance
    );
    Ok(with_message(json!(report), message))
}

fn clear_measurements(session: &mut Session, _: &Arguments) -> HandlerResult {
    let (host, state, diagnostics) = session.measure_parts();
    let (lines, points) = state.clear_measurements(host, diagnostics);
    Ok(payload(json!({
        "lines_removed": lines,
        "points_removed": points,
    })))
}

fn get_grid_info(session: &mut Session, _: &Arguments) -> HandlerResult {
    Ok(payload(json!(session.measurement().grid_info())))
}
