//! In-process simulated host.
//!
//! Documents hold axis-aligned boxes. The camera is orthographic and looks
//! straight down the -Z axis, so a pick ray through a pixel hits the top
//! face of the highest box under it.

use std::path::{Path, PathBuf};

use image::RgbaImage;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{
    ArtifactId, BoundingBox, DocumentSummary, Host, HostError, LineArtifact, Marker, ObjectInfo,
    Vec3,
};
use crate::measure::Region;
use crate::render::{self, Color};

/// Fraction of the scene extent left free around the geometry.
const FIT_MARGIN: f64 = 0.1;

/// Extent shown when there is no geometry at all.
const EMPTY_EXTENT: f64 = 100.0;

const BOX_PALETTE: [Color; 4] = [
    Color::rgb(0x6f, 0x8f, 0xaf),
    Color::rgb(0x9f, 0xaf, 0x7f),
    Color::rgb(0xb0, 0x90, 0x70),
    Color::rgb(0x90, 0x80, 0xb0),
];

/// A box seeded into the initial document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneBox {
    /// Object name.
    pub name: String,
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

#[derive(Debug, Clone)]
enum Shape {
    Solid(BoundingBox),
    Mesh(PathBuf),
}

#[derive(Debug, Clone)]
struct SimObject {
    name: String,
    shape: Shape,
}

impl SimObject {
    fn info(&self) -> ObjectInfo {
        match &self.shape {
            Shape::Solid(bb) => {
                let d = bb.min.delta_to(bb.max);
                ObjectInfo {
                    name: self.name.clone(),
                    kind: "Part::Box".to_string(),
                    volume: Some(d.x * d.y * d.z),
                    area: Some(2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)),
                    bounds: Some(*bb),
                    source: None,
                }
            }
            Shape::Mesh(path) => ObjectInfo {
                name: self.name.clone(),
                kind: "Mesh::Feature".to_string(),
                volume: None,
                area: None,
                bounds: None,
                source: Some(path.clone()),
            },
        }
    }

    const fn solid(&self) -> Option<&BoundingBox> {
        match &self.shape {
            Shape::Solid(bb) => Some(bb),
            Shape::Mesh(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Artifact {
    Marker(Marker),
    Line(LineArtifact),
}

#[derive(Debug, Clone, Default)]
struct SimDocument {
    objects: Vec<SimObject>,
    artifacts: IndexMap<ArtifactId, Artifact>,
}

impl SimDocument {
    fn bounds(&self) -> Option<BoundingBox> {
        self.objects
            .iter()
            .filter_map(SimObject::solid)
            .copied()
            .reduce(|a, b| a.union(&b))
    }

    fn unique_object_name(&self, base: &str) -> String {
        unique_name(base, |candidate| {
            self.objects.iter().any(|o| o.name == candidate)
        })
    }
}

/// Mapping between model XY and the reference (un-zoomed) viewport.
#[derive(Debug, Clone, Copy)]
struct Frame {
    center_x: f64,
    center_y: f64,
    /// Pixels per millimetre.
    scale: f64,
    width: f64,
    height: f64,
}

impl Frame {
    fn fit(bounds: Option<BoundingBox>, viewport: (u32, u32)) -> Self {
        let width = f64::from(viewport.0.max(1));
        let height = f64::from(viewport.1.max(1));
        let (center_x, center_y, span_x, span_y) = bounds.map_or(
            (0.0, 0.0, EMPTY_EXTENT, EMPTY_EXTENT),
            |bb| {
                (
                    (bb.min.x + bb.max.x) / 2.0,
                    (bb.min.y + bb.max.y) / 2.0,
                    (bb.max.x - bb.min.x).max(1e-6),
                    (bb.max.y - bb.min.y).max(1e-6),
                )
            },
        );
        let padding = 1.0 + 2.0 * FIT_MARGIN;
        let scale = (width / (span_x * padding)).min(height / (span_y * padding));
        Self {
            center_x,
            center_y,
            scale,
            width,
            height,
        }
    }

    /// Model XY to normalised reference-view coordinates.
    fn normalise(&self, point: Vec3) -> (f64, f64) {
        let px = self.width / 2.0 + (point.x - self.center_x) * self.scale;
        let py = self.height / 2.0 - (point.y - self.center_y) * self.scale;
        (px / self.width, py / self.height)
    }

    /// Reference-view pixel to model XY.
    fn unproject(&self, px: f64, py: f64) -> (f64, f64) {
        (
            self.center_x + (px - self.width / 2.0) / self.scale,
            self.center_y - (py - self.height / 2.0) / self.scale,
        )
    }
}

/// Simulated CAD host.
#[derive(Debug, Clone)]
pub struct SimHost {
    documents: IndexMap<String, SimDocument>,
    active: Option<String>,
    viewport: (u32, u32),
    zoom: Region,
    split: Option<(String, String)>,
    camera_locked: bool,
}

impl SimHost {
    /// Creates a host with no documents.
    #[must_use]
    pub fn new(viewport_width: u32, viewport_height: u32) -> Self {
        Self {
            documents: IndexMap::new(),
            active: None,
            viewport: (viewport_width.max(1), viewport_height.max(1)),
            zoom: Region::FULL,
            split: None,
            camera_locked: false,
        }
    }

    /// Creates a host whose active document holds `boxes`.
    ///
    /// No document is created when `boxes` is empty.
    #[must_use]
    pub fn with_scene(viewport_width: u32, viewport_height: u32, boxes: &[SceneBox]) -> Self {
        let mut host = Self::new(viewport_width, viewport_height);
        if !boxes.is_empty() {
            let name = host.create_document("Scene");
            for b in boxes {
                host.insert_box(&name, &b.name, b.min, b.max);
            }
        }
        host
    }

    /// Adds a box to a document, returning the object name actually used.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not exist.
    pub fn add_box(
        &mut self,
        document: &str,
        name: &str,
        min: Vec3,
        max: Vec3,
    ) -> Result<String, HostError> {
        if !self.documents.contains_key(document) {
            return Err(HostError::DocumentNotFound(document.to_string()));
        }
        Ok(self.insert_box(document, name, min, max))
    }

    /// Makes every camera adjustment fail, as a host with a locked view
    /// would.
    pub fn set_camera_locked(&mut self, locked: bool) {
        self.camera_locked = locked;
    }

    /// Documents shown side by side, if split view is on.
    #[must_use]
    pub fn split_view(&self) -> Option<(&str, &str)> {
        self.split.as_ref().map(|(l, r)| (l.as_str(), r.as_str()))
    }

    /// The current zoom region.
    #[must_use]
    pub const fn zoom_region(&self) -> Region {
        self.zoom
    }

    fn insert_box(&mut self, document: &str, name: &str, min: Vec3, max: Vec3) -> String {
        let Some(doc) = self.documents.get_mut(document) else {
            return name.to_string();
        };
        let name = doc.unique_object_name(name);
        doc.objects.push(SimObject {
            name: name.clone(),
            shape: Shape::Solid(BoundingBox::from_corners(min, max)),
        });
        name
    }

    fn create_document(&mut self, requested: &str) -> String {
        let base = if requested.trim().is_empty() {
            "Unnamed"
        } else {
            requested.trim()
        };
        let name = unique_name(base, |candidate| self.documents.contains_key(candidate));
        self.documents.insert(name.clone(), SimDocument::default());
        self.active = Some(name.clone());
        name
    }

    fn document(&self, name: &str) -> Result<&SimDocument, HostError> {
        self.documents
            .get(name)
            .ok_or_else(|| HostError::DocumentNotFound(name.to_string()))
    }

    fn document_mut(&mut self, name: &str) -> Result<&mut SimDocument, HostError> {
        self.documents
            .get_mut(name)
            .ok_or_else(|| HostError::DocumentNotFound(name.to_string()))
    }

    fn frame(&self) -> Frame {
        let bounds = self
            .documents
            .values()
            .filter_map(SimDocument::bounds)
            .reduce(|a, b| a.union(&b));
        Frame::fit(bounds, self.viewport)
    }

    fn add_artifact(
        &mut self,
        document: &str,
        prefix: &str,
        artifact: Artifact,
    ) -> Result<ArtifactId, HostError> {
        let doc = self.document_mut(document)?;
        let id = ArtifactId(format!("{prefix}_{}", Uuid::new_v4().simple()));
        doc.artifacts.insert(id.clone(), artifact);
        debug!(document, artifact = %id, "Artifact added");
        Ok(id)
    }
}

fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

impl Host for SimHost {
    fn new_document(&mut self, name: &str) -> Result<String, HostError> {
        let name = self.create_document(name);
        debug!(document = %name, "Document created");
        Ok(name)
    }

    fn list_documents(&self) -> Vec<DocumentSummary> {
        self.documents
            .iter()
            .map(|(name, doc)| DocumentSummary {
                name: name.clone(),
                objects: doc.objects.len(),
                artifacts: doc.artifacts.len(),
                active: self.active.as_deref() == Some(name.as_str()),
            })
            .collect()
    }

    fn active_document(&self) -> Option<String> {
        self.active.clone()
    }

    fn set_active_document(&mut self, name: &str) -> Result<(), HostError> {
        self.document(name)?;
        self.active = Some(name.to_string());
        Ok(())
    }

    fn list_objects(&self, document: &str) -> Result<Vec<ObjectInfo>, HostError> {
        Ok(self.document(document)?.objects.iter().map(SimObject::info).collect())
    }

    fn object_info(&self, document: &str, object: &str) -> Result<ObjectInfo, HostError> {
        self.document(document)?
            .objects
            .iter()
            .find(|o| o.name == object)
            .map(SimObject::info)
            .ok_or_else(|| HostError::ObjectNotFound {
                document: document.to_string(),
                object: object.to_string(),
            })
    }

    fn bounding_box(&self, document: &str) -> Option<BoundingBox> {
        self.documents.get(document).and_then(SimDocument::bounds)
    }

    fn import_reference_mesh(&mut self, document: &str, path: &Path) -> Result<String, HostError> {
        if !path.is_file() {
            return Err(HostError::FileNotFound(path.to_path_buf()));
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("Mesh");
        let doc = self.document_mut(document)?;
        let name = doc.unique_object_name(stem);
        doc.objects.push(SimObject {
            name: name.clone(),
            shape: Shape::Mesh(path.to_path_buf()),
        });
        debug!(document, object = %name, path = %path.display(), "Reference mesh imported");
        Ok(name)
    }

    fn add_marker(&mut self, document: &str, marker: Marker) -> Result<ArtifactId, HostError> {
        self.add_artifact(document, "Marker", Artifact::Marker(marker))
    }

    fn add_line(&mut self, document: &str, line: LineArtifact) -> Result<ArtifactId, HostError> {
        self.add_artifact(document, "Line", Artifact::Line(line))
    }

    fn remove_artifact(&mut self, id: &ArtifactId) -> Result<(), HostError> {
        self.documents
            .values_mut()
            .find_map(|doc| doc.artifacts.shift_remove(id))
            .map(|_| ())
            .ok_or_else(|| HostError::ArtifactNotFound(id.to_string()))
    }

    fn viewport_size(&self) -> (u32, u32) {
        self.viewport
    }

    fn pick(&self, document: &str, x: f64, y: f64) -> Result<Option<Vec3>, HostError> {
        let doc = self.document(document)?;
        let (mx, my) = self.frame().unproject(x, y);
        let hit = doc
            .objects
            .iter()
            .filter_map(SimObject::solid)
            .filter(|bb| bb.contains_xy(mx, my))
            .map(|bb| bb.max.z)
            .reduce(f64::max);
        Ok(hit.map(|z| Vec3::new(mx, my, z)))
    }

    fn project(&self, point: Vec3, width: u32, height: u32) -> Option<(f64, f64)> {
        let z = self.zoom;
        if z.width() <= 0.0 || z.height() <= 0.0 {
            return None;
        }
        let (nx, ny) = self.frame().normalise(point);
        Some((
            (nx - z.x_min) / z.width() * f64::from(width),
            (ny - z.y_min) / z.height() * f64::from(height),
        ))
    }

    fn zoom_to_region(&mut self, region: &Region) -> Result<(), HostError> {
        if self.camera_locked {
            return Err(HostError::Camera("view is locked".to_string()));
        }
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        let valid = [region.x_min, region.x_max, region.y_min, region.y_max]
            .into_iter()
            .all(in_unit)
            && region.width() > 0.0
            && region.height() > 0.0;
        if !valid {
            return Err(HostError::Camera(format!(
                "region {region:?} is not inside the viewport"
            )));
        }
        self.zoom = *region;
        Ok(())
    }

    fn fit_all(&mut self) -> Result<(), HostError> {
        if self.camera_locked {
            return Err(HostError::Camera("view is locked".to_string()));
        }
        self.zoom = Region::FULL;
        Ok(())
    }

    fn set_split_view(&mut self, left: &str, right: &str) -> Result<(), HostError> {
        self.document(left)?;
        self.document(right)?;
        self.split = Some((left.to_string(), right.to_string()));
        Ok(())
    }

    fn render(
        &mut self,
        document: &str,
        width: u32,
        height: u32,
        background: Color,
    ) -> Result<RgbaImage, HostError> {
        if width == 0 || height == 0 {
            return Err(HostError::Render(format!(
                "image size {width}x{height} is empty"
            )));
        }
        let doc = self.document(document)?;
        let frame = self.frame();
        let mut img = render::blank(width, height, background);
        let to_image = |p: Vec3| self.project(p, width, height);
        let px_per_mm = frame.scale / frame.width * f64::from(width) / self.zoom.width();

        let mut solids: Vec<(usize, &BoundingBox)> = doc
            .objects
            .iter()
            .filter_map(SimObject::solid)
            .enumerate()
            .collect();
        solids.sort_by(|a, b| a.1.max.z.total_cmp(&b.1.max.z));

        let (z_lo, z_hi) = solids.iter().fold((f64::MAX, f64::MIN), |(lo, hi), (_, bb)| {
            (lo.min(bb.max.z), hi.max(bb.max.z))
        });
        let z_range = (z_hi - z_lo).max(1e-9);

        for (index, bb) in solids {
            let (Some(a), Some(b)) = (
                to_image(Vec3::new(bb.min.x, bb.max.y, 0.0)),
                to_image(Vec3::new(bb.max.x, bb.min.y, 0.0)),
            ) else {
                continue;
            };
            let base = BOX_PALETTE[index % BOX_PALETTE.len()];
            let shade = 0.55 + 0.45 * (bb.max.z - z_lo) / z_range;
            render::fill_rect(&mut img, a.0, a.1, b.0, b.1, base.shade(shade).with_alpha(255));
            let edge = base.shade(shade * 0.6).with_alpha(255);
            render::draw_thick_line(&mut img, a, (b.0, a.1), 1.0, edge);
            render::draw_thick_line(&mut img, (b.0, a.1), b, 1.0, edge);
            render::draw_thick_line(&mut img, b, (a.0, b.1), 1.0, edge);
            render::draw_thick_line(&mut img, (a.0, b.1), a, 1.0, edge);
        }

        for artifact in doc.artifacts.values() {
            if let Artifact::Line(line) = artifact {
                if let (Some(a), Some(b)) = (to_image(line.start), to_image(line.end)) {
                    render::draw_thick_line(&mut img, a, b, 2.0, line.color.with_alpha(255));
                    #[allow(clippy::cast_possible_truncation)]
                    let (mx, my) = (((a.0 + b.0) / 2.0) as i64, ((a.1 + b.1) / 2.0) as i64);
                    render::draw_label(&mut img, mx + 4, my + 4, &line.label, 1, line.color.with_alpha(255));
                }
            }
        }
        for artifact in doc.artifacts.values() {
            if let Artifact::Marker(marker) = artifact {
                if let Some((x, y)) = to_image(marker.position) {
                    let radius = (marker.radius * px_per_mm).max(3.0);
                    render::draw_disc(&mut img, x, y, radius + 1.0, Color::rgb(0, 0, 0).with_alpha(200));
                    render::draw_disc(&mut img, x, y, radius, marker.color.with_alpha(255));
                }
            }
        }

        Ok(img)
    }
}
