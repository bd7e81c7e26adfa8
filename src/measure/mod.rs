//! Measurement mode.
//!
//! A caller narrows the viewport with a labelled grid, picks surface points
//! by cell reference, confirms the ones it wants to keep and measures the
//! distance between confirmed points.
//!
//! ```text
//!  inactive ──start_measurement──► active ──end_measurement──► inactive
//!                                    │
//!                     zoom_grid_region / reset_grid_zoom
//!                        (narrow or restore the region)
//!
//!  select_point ──► pending ──confirm_point──► confirmed ──measure_distance
//!                      └──────── clear_point / clear_measurements ───────┘
//! ```
//!
//! Every visual artifact (point marker, measurement line) is owned by the
//! record that created it and removed with it. Removal is best-effort: a
//! failure is logged and counted but never fails the operation.

pub mod grid;
pub mod overlay;

pub use grid::{GridCell, GridConfig, Region, MAX_COLUMNS};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::diagnostics::Diagnostics;
use crate::error::ToolError;
use crate::host::{ArtifactId, BoundingBox, Host, LineArtifact, Marker, Vec3};
use crate::render::Color;

/// Colours cycled through by successive points.
pub const MARKER_PALETTE: [Color; 8] = [
    Color::rgb(0xe6, 0x19, 0x4b),
    Color::rgb(0x3c, 0xb4, 0x4b),
    Color::rgb(0xff, 0xe1, 0x19),
    Color::rgb(0x43, 0x63, 0xd8),
    Color::rgb(0xf5, 0x82, 0x31),
    Color::rgb(0x91, 0x1e, 0xb4),
    Color::rgb(0x42, 0xd4, 0xf4),
    Color::rgb(0xf0, 0x32, 0xe6),
];

/// Colour of measurement lines.
pub const LINE_COLOR: Color = Color::rgb(0xff, 0xff, 0xff);

const MARKER_RADIUS_FRACTION: f64 = 0.015;
const MARKER_RADIUS_MIN: f64 = 0.5;
const MARKER_RADIUS_MAX: f64 = 5.0;
const MARKER_RADIUS_FALLBACK: f64 = 1.0;

/// Marker radius for a document with the given extent, in millimetres.
fn marker_radius(bounds: Option<BoundingBox>) -> f64 {
    bounds.map_or(MARKER_RADIUS_FALLBACK, |bb| {
        (bb.diagonal() * MARKER_RADIUS_FRACTION).clamp(MARKER_RADIUS_MIN, MARKER_RADIUS_MAX)
    })
}

/// Keyword accepted by [`MeasurementState::clear_point`] to clear everything.
pub const ALL_POINTS: &str = "all";

/// Whether measurement mode is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Grid hidden, zoom rejected.
    #[default]
    Inactive,
    /// Grid shown, zoom allowed.
    Active,
}

/// Which set a point is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PointStatus {
    /// Picked, awaiting confirmation.
    Pending,
    /// Eligible for measurement.
    Confirmed,
}

/// A picked surface point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    /// Unique id, `point_N`.
    pub id: String,
    /// Model-space coordinates.
    pub coords: Vec3,
    /// Grid cell it was picked from.
    pub source_cell: String,
    /// Document it was picked in.
    pub document: String,
    /// Marker artifact.
    pub marker: ArtifactId,
    /// Marker radius in millimetres.
    pub marker_radius: f64,
    /// Marker colour.
    pub color: Color,
}

/// A point together with its status, as reported by [`MeasurementState::list_points`].
#[derive(Debug, Clone, Serialize)]
pub struct PointEntry {
    /// The point.
    #[serde(flatten)]
    pub point: Point,
    /// Current status.
    pub status: PointStatus,
}

/// A drawn measurement between two confirmed points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementLine {
    /// First point id.
    pub point_a: String,
    /// Second point id.
    pub point_b: String,
    /// Distance in millimetres.
    pub distance: f64,
    /// Line artifact.
    pub artifact: ArtifactId,
}

/// Result of `measure_distance`.
#[derive(Debug, Clone, Serialize)]
pub struct DistanceReport {
    /// Distance in millimetres.
    pub distance: f64,
    /// Same value, explicit unit.
    pub distance_mm: f64,
    /// Distance in centimetres.
    pub distance_cm: f64,
    /// Distance in metres.
    pub distance_m: f64,
    /// Component-wise `b - a`.
    pub delta: Vec3,
    /// First point.
    pub point_a: PointCoords,
    /// Second point.
    pub point_b: PointCoords,
    /// The line drawn between them.
    pub line: ArtifactId,
}

/// A point id with its coordinates.
#[derive(Debug, Clone, Serialize)]
pub struct PointCoords {
    /// Point id.
    pub id: String,
    /// Coordinates.
    pub coords: Vec3,
}

/// Snapshot of the grid and point counts.
#[derive(Debug, Clone, Serialize)]
pub struct GridInfo {
    /// Measurement mode.
    pub mode: Mode,
    /// Grid columns.
    pub columns: usize,
    /// Grid rows.
    pub rows: usize,
    /// Cell label range, e.g. `A1-H6`.
    pub cells: String,
    /// Whether the grid is drawn.
    pub grid_enabled: bool,
    /// Current region.
    pub region: Region,
    /// Pending point count.
    pub pending: usize,
    /// Confirmed point count.
    pub confirmed: usize,
    /// Measurement line count.
    pub measurements: usize,
}

/// Result of a zoom or zoom reset.
#[derive(Debug, Clone, Serialize)]
pub struct ZoomReport {
    /// The new region.
    pub region: Region,
    /// Whether the camera followed the region.
    pub camera_adjusted: bool,
}

/// Measurement session state.
#[derive(Debug, Clone)]
pub struct MeasurementState {
    mode: Mode,
    grid: GridConfig,
    pending: IndexMap<String, Point>,
    confirmed: IndexMap<String, Point>,
    lines: Vec<MeasurementLine>,
    counter: u64,
    /// Region the camera currently shows.
    view: Region,
}

impl MeasurementState {
    /// Creates an inactive state with a `columns`×`rows` grid.
    #[must_use]
    pub fn new(columns: usize, rows: usize) -> Self {
        Self {
            mode: Mode::Inactive,
            grid: GridConfig::new(columns, rows),
            pending: IndexMap::new(),
            confirmed: IndexMap::new(),
            lines: Vec::new(),
            counter: 0,
            view: Region::FULL,
        }
    }

    /// Current mode.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether measurement mode is on.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.mode == Mode::Active
    }

    /// The grid.
    #[must_use]
    pub const fn grid(&self) -> &GridConfig {
        &self.grid
    }

    /// Whether the displayed view matches the grid region. When false the
    /// camera could not follow the last zoom, and the grid covers only part
    /// of the displayed view.
    #[must_use]
    pub fn camera_follows_region(&self) -> bool {
        self.view == self.grid.region
    }

    /// Where the grid region lies within the displayed view, normalised to
    /// the displayed image.
    #[must_use]
    pub fn overlay_area(&self) -> Region {
        let (g, v) = (self.grid.region, self.view);
        Region {
            x_min: (g.x_min - v.x_min) / v.width(),
            x_max: (g.x_max - v.x_min) / v.width(),
            y_min: (g.y_min - v.y_min) / v.height(),
            y_max: (g.y_max - v.y_min) / v.height(),
        }
    }

    /// Pending points in pick order.
    pub fn pending(&self) -> impl Iterator<Item = &Point> {
        self.pending.values()
    }

    /// Confirmed points in confirmation order.
    pub fn confirmed(&self) -> impl Iterator<Item = &Point> {
        self.confirmed.values()
    }

    /// Measurement lines in creation order.
    #[must_use]
    pub fn lines(&self) -> &[MeasurementLine] {
        &self.lines
    }

    /// Grid and point summary.
    #[must_use]
    pub fn grid_info(&self) -> GridInfo {
        GridInfo {
            mode: self.mode,
            columns: self.grid.columns,
            rows: self.grid.rows,
            cells: format!(
                "A1-{}{}",
                self.grid.last_column_letter(),
                self.grid.rows
            ),
            grid_enabled: self.grid.enabled,
            region: self.grid.region,
            pending: self.pending.len(),
            confirmed: self.confirmed.len(),
            measurements: self.lines.len(),
        }
    }

    /// Enters measurement mode with the full region. Calling it again while
    /// active only resets the region.
    pub fn start(&mut self, host: &mut dyn Host, diagnostics: &Diagnostics) -> GridInfo {
        self.mode = Mode::Active;
        self.grid.enabled = true;
        self.grid.region = Region::FULL;
        if !self.view.is_full() {
            self.fit_camera(host, diagnostics);
        }
        info!(columns = self.grid.columns, rows = self.grid.rows, "Measurement mode started");
        self.grid_info()
    }

    /// Leaves measurement mode and discards pending points. Confirmed points
    /// and measurement lines are kept.
    pub fn end(&mut self, host: &mut dyn Host, diagnostics: &Diagnostics) -> Vec<String> {
        self.mode = Mode::Inactive;
        self.grid.enabled = false;
        let removed: Vec<String> = self.pending.keys().cloned().collect();
        for (_, point) in self.pending.drain(..) {
            remove_artifact(host, diagnostics, &point.marker);
        }
        info!(
            discarded = removed.len(),
            kept = self.confirmed.len(),
            "Measurement mode ended"
        );
        removed
    }

    /// Narrows the region to a `size`×`size` block of cells starting at
    /// `start_cell`, and tries to zoom the camera to match.
    ///
    /// # Errors
    ///
    /// Fails if measurement mode is off, the cell is invalid, or `size` is
    /// outside `1..=min(columns, rows)`.
    pub fn zoom(
        &mut self,
        host: &mut dyn Host,
        diagnostics: &Diagnostics,
        start_cell: &str,
        size: i64,
    ) -> Result<ZoomReport, ToolError> {
        if !self.is_active() {
            return Err(ToolError::State(
                "Measurement mode is not active. Call start_measurement first".to_string(),
            ));
        }
        let cell = self.grid.parse_cell(start_cell)?;
        let max = self.grid.max_zoom_size();
        let size = usize::try_from(size)
            .ok()
            .filter(|s| (1..=max).contains(s))
            .ok_or_else(|| ToolError::invalid("size", format!("must be between 1 and {max}")))?;

        self.grid.region = self.grid.sub_region(cell, size);
        let camera_adjusted = match host.zoom_to_region(&self.grid.region) {
            Ok(()) => {
                self.view = self.grid.region;
                true
            }
            Err(e) => {
                diagnostics.record_camera_failure();
                warn!(error = %e, "Camera did not follow grid zoom");
                false
            }
        };
        debug!(cell = %cell, size, region = ?self.grid.region, "Grid region narrowed");
        Ok(ZoomReport {
            region: self.grid.region,
            camera_adjusted,
        })
    }

    /// Restores the full region and fits the camera to all geometry.
    pub fn reset_zoom(&mut self, host: &mut dyn Host, diagnostics: &Diagnostics) -> ZoomReport {
        self.grid.region = Region::FULL;
        let camera_adjusted = self.fit_camera(host, diagnostics);
        ZoomReport {
            region: self.grid.region,
            camera_adjusted,
        }
    }

    /// Picks the surface under an offset within a grid cell and records it
    /// as a pending point with a marker in `document`.
    ///
    /// # Errors
    ///
    /// Fails if the cell or offsets are invalid, the ray hits nothing, or the
    /// marker cannot be created.
    pub fn select_point(
        &mut self,
        host: &mut dyn Host,
        document: &str,
        grid_cell: &str,
        offset_x: f64,
        offset_y: f64,
    ) -> Result<Point, ToolError> {
        let cell = self.grid.parse_cell(grid_cell)?;
        for (name, value) in [("offset_x", offset_x), ("offset_y", offset_y)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ToolError::invalid(name, "must be between 0 and 1"));
            }
        }

        let (nx, ny) = self.grid.cell_position(cell, offset_x, offset_y);
        let (width, height) = host.viewport_size();
        let px = nx * f64::from(width);
        let py = ny * f64::from(height);
        let coords = host
            .pick(document, px, py)?
            .ok_or_else(|| ToolError::NoSurface {
                cell: cell.to_string(),
            })?;

        let index = self.counter;
        let id = format!("point_{}", index + 1);
        #[allow(clippy::cast_possible_truncation)]
        let color = MARKER_PALETTE[(index % MARKER_PALETTE.len() as u64) as usize];
        let radius = marker_radius(host.bounding_box(document));
        let marker = host.add_marker(
            document,
            Marker {
                position: coords,
                radius,
                color,
                label: id.clone(),
            },
        )?;
        self.counter += 1;

        let point = Point {
            id: id.clone(),
            coords,
            source_cell: cell.to_string(),
            document: document.to_string(),
            marker,
            marker_radius: radius,
            color,
        };
        info!(point = %id, cell = %cell, x = coords.x, y = coords.y, z = coords.z, "Point selected");
        self.pending.insert(id, point.clone());
        Ok(point)
    }

    /// Moves a pending point to the confirmed set.
    ///
    /// # Errors
    ///
    /// Fails if the point is already confirmed or unknown.
    pub fn confirm_point(&mut self, point_id: &str) -> Result<Point, ToolError> {
        if self.confirmed.contains_key(point_id) {
            return Err(ToolError::State(format!(
                "Point {point_id} is already confirmed"
            )));
        }
        let point = self
            .pending
            .shift_remove(point_id)
            .ok_or_else(|| ToolError::NotFound(format!("Point {point_id} is not pending")))?;
        debug!(point = %point_id, "Point confirmed");
        self.confirmed.insert(point.id.clone(), point.clone());
        Ok(point)
    }

    /// Removes one point, or every point when given `"all"`. Returns the ids
    /// removed.
    ///
    /// # Errors
    ///
    /// Fails if a specific id is in neither set.
    pub fn clear_point(
        &mut self,
        host: &mut dyn Host,
        diagnostics: &Diagnostics,
        point_id: &str,
    ) -> Result<Vec<String>, ToolError> {
        if point_id.eq_ignore_ascii_case(ALL_POINTS) {
            return Ok(self.clear_all_points(host, diagnostics));
        }
        let point = self
            .pending
            .shift_remove(point_id)
            .or_else(|| self.confirmed.shift_remove(point_id))
            .ok_or_else(|| ToolError::NotFound(format!("Point {point_id} not found")))?;
        remove_artifact(host, diagnostics, &point.marker);
        Ok(vec![point.id])
    }

    /// All points, pending first, each tagged with its status.
    #[must_use]
    pub fn list_points(&self) -> Vec<PointEntry> {
        let tag = |status| move |p: &Point| PointEntry {
            point: p.clone(),
            status,
        };
        self.pending
            .values()
            .map(tag(PointStatus::Pending))
            .chain(self.confirmed.values().map(tag(PointStatus::Confirmed)))
            .collect()
    }

    /// Measures between two confirmed points and draws a line in `document`.
    ///
    /// # Errors
    ///
    /// Fails if either point is not confirmed, both ids are the same, or the
    /// line cannot be created.
    pub fn measure_distance(
        &mut self,
        host: &mut dyn Host,
        document: &str,
        point_a: &str,
        point_b: &str,
    ) -> Result<DistanceReport, ToolError> {
        if point_a == point_b {
            return Err(ToolError::invalid(
                "point_b",
                "must differ from point_a",
            ));
        }
        let a = self.confirmed_coords(point_a)?;
        let b = self.confirmed_coords(point_b)?;

        let distance = a.distance_to(b);
        let artifact = host.add_line(
            document,
            LineArtifact {
                start: a,
                end: b,
                color: LINE_COLOR,
                label: format!("{distance:.2} mm"),
            },
        )?;
        info!(point_a, point_b, distance, "Distance measured");
        self.lines.push(MeasurementLine {
            point_a: point_a.to_string(),
            point_b: point_b.to_string(),
            distance,
            artifact: artifact.clone(),
        });

        Ok(DistanceReport {
            distance,
            distance_mm: distance,
            distance_cm: distance / 10.0,
            distance_m: distance / 1000.0,
            delta: a.delta_to(b),
            point_a: PointCoords {
                id: point_a.to_string(),
                coords: a,
            },
            point_b: PointCoords {
                id: point_b.to_string(),
                coords: b,
            },
            line: artifact,
        })
    }

    /// Removes every measurement line and every point. Returns the number of
    /// lines and points removed.
    pub fn clear_measurements(
        &mut self,
        host: &mut dyn Host,
        diagnostics: &Diagnostics,
    ) -> (usize, usize) {
        let lines = self.lines.len();
        for line in self.lines.drain(..) {
            remove_artifact(host, diagnostics, &line.artifact);
        }
        let points = self.clear_all_points(host, diagnostics).len();
        info!(lines, points, "Measurements cleared");
        (lines, points)
    }

    /// Drops all state and artifacts and returns to the initial state. The
    /// point counter is kept so ids are never reused.
    pub fn reset(&mut self, host: &mut dyn Host, diagnostics: &Diagnostics) {
        self.clear_measurements(host, diagnostics);
        self.mode = Mode::Inactive;
        self.grid.enabled = false;
        self.grid.region = Region::FULL;
        if !self.view.is_full() {
            self.fit_camera(host, diagnostics);
        }
    }

    fn confirmed_coords(&self, point_id: &str) -> Result<Vec3, ToolError> {
        if let Some(point) = self.confirmed.get(point_id) {
            return Ok(point.coords);
        }
        if self.pending.contains_key(point_id) {
            return Err(ToolError::State(format!(
                "Point {point_id} is not confirmed. Call confirm_point first"
            )));
        }
        Err(ToolError::NotFound(format!("Point {point_id} not found")))
    }

    fn clear_all_points(&mut self, host: &mut dyn Host, diagnostics: &Diagnostics) -> Vec<String> {
        let mut removed = Vec::with_capacity(self.pending.len() + self.confirmed.len());
        for (id, point) in self.pending.drain(..).chain(self.confirmed.drain(..)) {
            remove_artifact(host, diagnostics, &point.marker);
            removed.push(id);
        }
        removed
    }

    fn fit_camera(&mut self, host: &mut dyn Host, diagnostics: &Diagnostics) -> bool {
        match host.fit_all() {
            Ok(()) => {
                self.view = Region::FULL;
                true
            }
            Err(e) => {
                diagnostics.record_camera_failure();
                warn!(error = %e, "Camera fit failed");
                false
            }
        }
    }
}

fn remove_artifact(host: &mut dyn Host, diagnostics: &Diagnostics, id: &ArtifactId) {
    if let Err(e) = host.remove_artifact(id) {
        diagnostics.record_cleanup_failure();
        warn!(artifact = %id, error = %e, "Could not remove artifact");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{SceneBox, SimHost};

    const DOC: &str = "Scene";

    fn host() -> SimHost {
        SimHost::with_scene(
            800,
            600,
            &[SceneBox {
                name: "Plate".to_string(),
                min: Vec3::new(0.0, 0.0, 0.0),
                max: Vec3::new(80.0, 60.0, 5.0),
            }],
        )
    }

    fn active(host: &mut SimHost, diagnostics: &Diagnostics) -> MeasurementState {
        let mut state = MeasurementState::new(8, 6);
        state.start(host, diagnostics);
        state
    }

    #[test]
    fn start_is_idempotent() {
        let mut host = host();
        let diagnostics = Diagnostics::new();
        let mut state = active(&mut host, &diagnostics);
        state.zoom(&mut host, &diagnostics, "B2", 2).unwrap();

        let first = state.start(&mut host, &diagnostics);
        let second = state.start(&mut host, &diagnostics);
        assert_eq!(first.mode, Mode::Active);
        assert_eq!(second.mode, Mode::Active);
        assert_eq!(first.region, Region::FULL);
        assert_eq!(second.region, Region::FULL);
    }

    #[test]
    fn zoom_requires_active_mode() {
        let mut host = host();
        let diagnostics = Diagnostics::new();
        let mut state = MeasurementState::new(8, 6);
        let err = state.zoom(&mut host, &diagnostics, "A1", 2).unwrap_err();
        assert!(matches!(err, ToolError::State(_)));
    }

    #[test]
    fn zoom_rejects_bad_size() {
        let mut host = host();
        let diagnostics = Diagnostics::new();
        let mut state = active(&mut host, &diagnostics);
        for size in [0, 7, -1] {
            let err = state.zoom(&mut host, &diagnostics, "A1", size).unwrap_err();
            assert!(matches!(err, ToolError::InvalidArgument { .. }), "{size}");
        }
        assert!(state.zoom(&mut host, &diagnostics, "A1", 6).is_ok());
    }

    #[test]
    fn zoom_composes_and_moves_camera() {
        let mut host = host();
        let diagnostics = Diagnostics::new();
        let mut state = active(&mut host, &diagnostics);

        let report = state.zoom(&mut host, &diagnostics, "A1", 2).unwrap();
        assert!(report.camera_adjusted);
        assert!((report.region.x_max - 0.25).abs() < 1e-12);
        assert!((report.region.y_max - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(host.zoom_region(), report.region);

        let report = state.zoom(&mut host, &diagnostics, "A1", 2).unwrap();
        assert!((report.region.x_max - 0.0625).abs() < 1e-12);
        assert!((report.region.y_max - 1.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn camera_failure_is_counted_not_fatal() {
        let mut host = host();
        host.set_camera_locked(true);
        let diagnostics = Diagnostics::new();
        let mut state = active(&mut host, &diagnostics);

        let report = state.zoom(&mut host, &diagnostics, "C2", 3).unwrap();
        assert!(!report.camera_adjusted);
        assert!(!state.camera_follows_region());
        assert_eq!(diagnostics.snapshot().camera_failures, 1);

        // The view stayed at full extent, so the grid covers a sub-rectangle.
        let area = state.overlay_area();
        assert!((area.x_min - 2.0 / 8.0).abs() < 1e-12);
        assert!((area.x_max - 5.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn select_confirm_and_relist() {
        let mut host = host();
        let diagnostics = Diagnostics::new();
        let mut state = active(&mut host, &diagnostics);

        let point = state.select_point(&mut host, DOC, "D3", 0.5, 0.5).unwrap();
        assert_eq!(point.id, "point_1");
        assert!((point.coords.z - 5.0).abs() < 1e-9);
        let listed = state.list_points();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, PointStatus::Pending);

        state.confirm_point("point_1").unwrap();
        let listed = state.list_points();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, PointStatus::Confirmed);

        let err = state.confirm_point("point_1").unwrap_err();
        assert!(err.to_string().contains("already confirmed"));
        assert!(matches!(
            state.confirm_point("point_99"),
            Err(ToolError::NotFound(_))
        ));
    }

    #[test]
    fn miss_does_not_consume_an_id() {
        let mut host = host();
        let diagnostics = Diagnostics::new();
        let mut state = active(&mut host, &diagnostics);

        // The corner cell's top-left corner is in the empty margin.
        let err = state.select_point(&mut host, DOC, "A1", 0.0, 0.0).unwrap_err();
        assert!(matches!(err, ToolError::NoSurface { .. }));
        let point = state.select_point(&mut host, DOC, "D3", 0.5, 0.5).unwrap();
        assert_eq!(point.id, "point_1");
    }

    #[test]
    fn offsets_are_validated() {
        let mut host = host();
        let diagnostics = Diagnostics::new();
        let mut state = active(&mut host, &diagnostics);
        let err = state.select_point(&mut host, DOC, "D3", 1.5, 0.5).unwrap_err();
        assert!(err.to_string().contains("offset_x"));
    }

    #[test]
    fn ids_are_never_reused_and_colours_cycle() {
        let mut host = host();
        let diagnostics = Diagnostics::new();
        let mut state = active(&mut host, &diagnostics);

        let first = state.select_point(&mut host, DOC, "D3", 0.5, 0.5).unwrap();
        state.clear_point(&mut host, &diagnostics, "all").unwrap();
        let second = state.select_point(&mut host, DOC, "D3", 0.5, 0.5).unwrap();
        assert_eq!(second.id, "point_2");
        assert_eq!(first.color, MARKER_PALETTE[0]);
        assert_eq!(second.color, MARKER_PALETTE[1]);
    }

    fn picked_radius(max: Vec3) -> f64 {
        let mut host = SimHost::with_scene(
            800,
            600,
            &[SceneBox {
                name: "Block".to_string(),
                min: Vec3::new(0.0, 0.0, 0.0),
                max,
            }],
        );
        let diagnostics = Diagnostics::new();
        let mut state = active(&mut host, &diagnostics);
        state
            .select_point(&mut host, DOC, "D3", 0.5, 0.5)
            .unwrap()
            .marker_radius
    }

    #[test]
    fn marker_radius_scales_with_scene() {
        // Diagonal of 80x60x5 is ~100.1 mm.
        let radius = picked_radius(Vec3::new(80.0, 60.0, 5.0));
        assert!((radius - 1.5).abs() < 0.01, "{radius}");
    }

    #[test]
    fn marker_radius_is_clamped() {
        assert_eq!(picked_radius(Vec3::new(1.0, 1.0, 1.0)), MARKER_RADIUS_MIN);
        assert_eq!(picked_radius(Vec3::new(1000.0, 1000.0, 10.0)), MARKER_RADIUS_MAX);
    }

    #[test]
    fn marker_radius_without_extent_uses_fallback() {
        assert_eq!(marker_radius(None), MARKER_RADIUS_FALLBACK);
        let tiny = BoundingBox::from_corners(Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 0.0));
        assert_eq!(marker_radius(Some(tiny)), MARKER_RADIUS_MIN);
    }

    #[test]
    fn end_keeps_only_confirmed() {
        let mut host = host();
        let diagnostics = Diagnostics::new();
        let mut state = active(&mut host, &diagnostics);

        state.select_point(&mut host, DOC, "C3", 0.5, 0.5).unwrap();
        state.select_point(&mut host, DOC, "E4", 0.5, 0.5).unwrap();
        state.confirm_point("point_1").unwrap();

        let removed = state.end(&mut host, &diagnostics);
        assert_eq!(removed, vec!["point_2".to_string()]);
        let listed = state.list_points();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].point.id, "point_1");
        assert_eq!(host.list_documents()[0].artifacts, 1);
        assert_eq!(state.mode(), Mode::Inactive);
    }

    #[test]
    fn clear_point_unknown_id_fails() {
        let mut host = host();
        let diagnostics = Diagnostics::new();
        let mut state = active(&mut host, &diagnostics);
        assert!(matches!(
            state.clear_point(&mut host, &diagnostics, "point_7"),
            Err(ToolError::NotFound(_))
        ));
        assert!(state.clear_point(&mut host, &diagnostics, "ALL").unwrap().is_empty());
    }

    #[test]
    fn measure_requires_confirmed_points() {
        let mut host = host();
        let diagnostics = Diagnostics::new();
        let mut state = active(&mut host, &diagnostics);
        state.select_point(&mut host, DOC, "C3", 0.5, 0.5).unwrap();
        state.select_point(&mut host, DOC, "E4", 0.5, 0.5).unwrap();
        state.confirm_point("point_1").unwrap();

        let err = state
            .measure_distance(&mut host, DOC, "point_1", "point_2")
            .unwrap_err();
        assert!(matches!(err, ToolError::State(_)));
        let err = state
            .measure_distance(&mut host, DOC, "point_1", "point_1")
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument { .. }));
    }

    #[test]
    fn measure_distance_and_clear() {
        let mut host = host();
        let diagnostics = Diagnostics::new();
        let mut state = active(&mut host, &diagnostics);
        let a = state.select_point(&mut host, DOC, "C3", 0.5, 0.5).unwrap();
        let b = state.select_point(&mut host, DOC, "F5", 0.5, 0.5).unwrap();
        state.confirm_point(&a.id).unwrap();
        state.confirm_point(&b.id).unwrap();

        let report = state.measure_distance(&mut host, DOC, &a.id, &b.id).unwrap();
        assert!((report.distance - a.coords.distance_to(b.coords)).abs() < 1e-9);
        assert!((report.distance_cm * 10.0 - report.distance).abs() < 1e-9);
        assert_eq!(state.lines().len(), 1);
        assert_eq!(host.list_documents()[0].artifacts, 3);

        let (lines, points) = state.clear_measurements(&mut host, &diagnostics);
        assert_eq!((lines, points), (1, 2));
        assert_eq!(host.list_documents()[0].artifacts, 0);
        assert_eq!(diagnostics.snapshot().cleanup_failures, 0);
    }

    #[test]
    fn missing_artifacts_are_skipped_on_clear() {
        let mut host = host();
        let diagnostics = Diagnostics::new();
        let mut state = active(&mut host, &diagnostics);
        let point = state.select_point(&mut host, DOC, "C3", 0.5, 0.5).unwrap();
        host.remove_artifact(&point.marker).unwrap();

        let (_, points) = state.clear_measurements(&mut host, &diagnostics);
        assert_eq!(points, 1);
        assert_eq!(diagnostics.snapshot().cleanup_failures, 1);
    }
}
