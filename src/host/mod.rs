//! Host abstraction.
//!
//! The bridge never implements geometry or rendering itself. Everything it
//! needs from the CAD application is expressed by the [`Host`] trait: a
//! document store, visual artifacts (point markers and measurement lines),
//! and a viewport that can pick, zoom and render.
//!
//! A host is created on the owner thread and only ever used there, so it
//! does not need to be `Send`.
//!
//! [`SimHost`] is the bundled in-process implementation.

mod sim;

pub use sim::{SceneBox, SimHost};

use std::path::{Path, PathBuf};

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::measure::Region;
use crate::render::Color;

/// A point or direction in model space (millimetres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Vec3 {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl Vec3 {
    /// Creates a vector.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Component-wise difference `other - self`.
    #[must_use]
    pub fn delta_to(self, other: Self) -> Self {
        Self::new(other.x - self.x, other.y - self.y, other.z - self.z)
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance_to(self, other: Self) -> f64 {
        self.delta_to(other).length()
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl BoundingBox {
    /// Creates a box from two opposite corners in any order.
    #[must_use]
    pub fn from_corners(a: Vec3, b: Vec3) -> Self {
        Self {
            min: Vec3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Vec3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Length of the box diagonal.
    #[must_use]
    pub fn diagonal(&self) -> f64 {
        self.min.distance_to(self.max)
    }

    /// Smallest box containing both.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self::from_corners(
            Vec3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            Vec3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        )
    }

    /// Whether the XY footprint contains `(x, y)`.
    #[must_use]
    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        x >= self.min.x && x <= self.max.x && y >= self.min.y && y <= self.max.y
    }
}

/// Handle of a visual artifact owned by the bridge (marker or line).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub String);

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A small sphere marking a picked point.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// Centre in model space.
    pub position: Vec3,
    /// Radius in millimetres.
    pub radius: f64,
    /// Display colour.
    pub color: Color,
    /// Label shown next to the marker.
    pub label: String,
}

/// A line drawn between two measured points.
#[derive(Debug, Clone, PartialEq)]
pub struct LineArtifact {
    /// Start point.
    pub start: Vec3,
    /// End point.
    pub end: Vec3,
    /// Display colour.
    pub color: Color,
    /// Label shown at the midpoint.
    pub label: String,
}

/// Summary of an open document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    /// Document name.
    pub name: String,
    /// Number of geometry objects.
    pub objects: usize,
    /// Number of bridge-owned artifacts.
    pub artifacts: usize,
    /// Whether this is the active document.
    pub active: bool,
}

/// Description of one object in a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectInfo {
    /// Object name.
    pub name: String,
    /// Host type identifier.
    #[serde(rename = "type")]
    pub kind: String,
    /// Volume in mm³, if the object is a solid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    /// Surface area in mm², if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
    /// Bounds, if the object has geometry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
    /// File the object was imported from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

/// Errors reported by a host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// No document is active.
    #[error("No active document")]
    NoActiveDocument,

    /// A named document does not exist.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// A named object does not exist.
    #[error("Object '{object}' not found in document '{document}'")]
    ObjectNotFound {
        /// Document searched.
        document: String,
        /// Object name.
        object: String,
    },

    /// An artifact handle is unknown.
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    /// A file to import does not exist.
    #[error("Reference file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The camera could not be adjusted.
    #[error("Camera adjustment failed: {0}")]
    Camera(String),

    /// The view could not be rendered.
    #[error("Rendering failed: {0}")]
    Render(String),
}

/// The CAD application as seen by the bridge.
pub trait Host {
    // ---- documents ----

    /// Creates a document and makes it active. Returns its actual name,
    /// which may differ from `name` if that was taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot create documents.
    fn new_document(&mut self, name: &str) -> Result<String, HostError>;

    /// Lists open documents.
    fn list_documents(&self) -> Vec<DocumentSummary>;

    /// Name of the active document.
    fn active_document(&self) -> Option<String>;

    /// Makes `name` the active document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not exist.
    fn set_active_document(&mut self, name: &str) -> Result<(), HostError>;

    /// Lists the geometry objects in a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not exist.
    fn list_objects(&self, document: &str) -> Result<Vec<ObjectInfo>, HostError>;

    /// Describes one object.
    ///
    /// # Errors
    ///
    /// Returns an error if the document or object does not exist.
    fn object_info(&self, document: &str, object: &str) -> Result<ObjectInfo, HostError>;

    /// Overall bounds of a document's geometry, if it has any.
    fn bounding_box(&self, document: &str) -> Option<BoundingBox>;

    /// Imports a reference mesh file into a document. Returns the new
    /// object's name.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or document does not exist.
    fn import_reference_mesh(&mut self, document: &str, path: &Path)
        -> Result<String, HostError>;

    // ---- artifacts ----

    /// Adds a point marker to a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not exist.
    fn add_marker(&mut self, document: &str, marker: Marker) -> Result<ArtifactId, HostError>;

    /// Adds a measurement line to a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not exist.
    fn add_line(&mut self, document: &str, line: LineArtifact) -> Result<ArtifactId, HostError>;

    /// Removes a marker or line.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact is unknown.
    fn remove_artifact(&mut self, id: &ArtifactId) -> Result<(), HostError>;

    // ---- viewport ----

    /// Viewport size in pixels.
    fn viewport_size(&self) -> (u32, u32);

    /// Casts a ray from the camera through pixel `(x, y)` of the reference
    /// view of `document` and returns the first surface hit.
    ///
    /// The reference view is the un-zoomed view; picking is unaffected by
    /// [`zoom_to_region`](Self::zoom_to_region).
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not exist.
    fn pick(&self, document: &str, x: f64, y: f64) -> Result<Option<Vec3>, HostError>;

    /// Projects a model-space point into an image of the given size showing
    /// the current (possibly zoomed) view.
    fn project(&self, point: Vec3, width: u32, height: u32) -> Option<(f64, f64)>;

    /// Narrows the displayed view to a normalised region of the reference
    /// view.
    ///
    /// # Errors
    ///
    /// Returns an error if the camera cannot be adjusted.
    fn zoom_to_region(&mut self, region: &Region) -> Result<(), HostError>;

    /// Fits the camera to all geometry and resets any zoom.
    ///
    /// # Errors
    ///
    /// Returns an error if the camera cannot be adjusted.
    fn fit_all(&mut self) -> Result<(), HostError>;

    /// Shows two documents side by side.
    ///
    /// # Errors
    ///
    /// Returns an error if either document does not exist.
    fn set_split_view(&mut self, left: &str, right: &str) -> Result<(), HostError>;

    /// Renders a document's current view.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not exist or rendering fails.
    fn render(
        &mut self,
        document: &str,
        width: u32,
        height: u32,
        background: Color,
    ) -> Result<RgbaImage, HostError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 4.0, 0.0);
        assert!((a.distance_to(b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn vec3_serialises_as_array() {
        let json = serde_json::to_string(&Vec3::new(1.0, 2.5, -3.0)).unwrap();
        assert_eq!(json, "[1.0,2.5,-3.0]");
        let back: Vec3 = serde_json::from_str("[1, 2, 3]").unwrap();
        assert_eq!(back, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn bounding_box_normalises_corners() {
        let bb = BoundingBox::from_corners(Vec3::new(10.0, 0.0, 5.0), Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(bb.min, Vec3::new(0.0, 0.0, 0.0));
        assert_eq!(bb.max, Vec3::new(10.0, 10.0, 5.0));
        assert!(bb.contains_xy(5.0, 5.0));
        assert!(!bb.contains_xy(11.0, 5.0));
        assert!((bb.diagonal() - 15.0).abs() < 1e-9);
    }
}
