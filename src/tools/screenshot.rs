//! Viewport capture.
//!
//! Screenshots are rendered by the host and post-processed here: the grid
//! overlay and point labels while measuring, and side-by-side composition
//! in dual document mode.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::{imageops, RgbaImage};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    payload, ArgDefault, ArgKind, ArgSpec, Arguments, HandlerResult, ToolHandler, ToolSpec,
};
use crate::error::ToolError;
use crate::host::HostError;
use crate::measure::overlay::{self, PointLabel};
use crate::render::{self, Color};
use crate::session::Session;

/// Largest accepted screenshot edge in pixels.
const MAX_DIMENSION: u32 = 4096;

pub(super) const TOOLS: &[ToolSpec] = &[ToolSpec {
    name: "take_screenshot",
    description: "Capture the viewport as a PNG. 'auto' shows the grid while measuring and both \
                  documents side by side in dual document mode.",
    args: &[
        ArgSpec::optional("mode", ArgKind::String, ArgDefault::Str("auto"), "Capture mode")
            .one_of(&["auto", "plain", "grid", "split"]),
        ArgSpec::optional(
            "width",
            ArgKind::Integer,
            ArgDefault::None,
            "Image width in pixels (default from configuration)",
        ),
        ArgSpec::optional(
            "height",
            ArgKind::Integer,
            ArgDefault::None,
            "Image height in pixels (default from configuration)",
        ),
        ArgSpec::optional(
            "background",
            ArgKind::String,
            ArgDefault::None,
            "Background colour as #rrggbb (default from configuration)",
        ),
        ArgSpec::optional(
            "save_path",
            ArgKind::String,
            ArgDefault::None,
            "Also write the PNG to this file",
        ),
        ArgSpec::optional(
            "document",
            ArgKind::String,
            ArgDefault::None,
            "Document to capture in plain or grid mode (default: the main view)",
        ),
    ],
    handler: ToolHandler::Session(take_screenshot),
    attach_snapshot: false,
}];

/// Resolved capture mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CaptureMode {
    Plain,
    Grid,
    Split,
}

struct Capture {
    png: Vec<u8>,
    width: u32,
    height: u32,
    mode: CaptureMode,
    documents: Vec<String>,
}

impl Capture {
    fn describe(&self) -> Value {
        json!({
            "image": BASE64_STANDARD.encode(&self.png),
            "format": "png",
            "width": self.width,
            "height": self.height,
            "mode": self.mode,
            "documents": self.documents,
        })
    }
}

fn auto_mode(session: &Session) -> CaptureMode {
    if session.dual().enabled {
        CaptureMode::Split
    } else if session.measurement().is_active() {
        CaptureMode::Grid
    } else {
        CaptureMode::Plain
    }
}

fn take_screenshot(session: &mut Session, args: &Arguments) -> HandlerResult {
    let settings = session.screenshot_settings();
    let width = args.dimension("width", MAX_DIMENSION)?.unwrap_or(settings.width);
    let height = args.dimension("height", MAX_DIMENSION)?.unwrap_or(settings.height);
    let background = match args.str("background") {
        Some(hex) => Color::parse_hex(hex)
            .ok_or_else(|| ToolError::invalid("background", "expected a colour like #262a33"))?,
        None => settings.background,
    };

    let mode = match args.str("mode").unwrap_or("auto") {
        "plain" => CaptureMode::Plain,
        "grid" => CaptureMode::Grid,
        "split" => CaptureMode::Split,
        _ => auto_mode(session),
    };
    let document = match (mode, args.str("document")) {
        (CaptureMode::Split, _) | (_, None) => None,
        (_, Some(d)) => Some(session.resolve_document(Some(d))?),
    };

    let capture = capture(session, mode, document, width, height, background)?;
    let mut out = payload(capture.describe());
    out.insert(
        "captured_at".to_string(),
        json!(chrono::Utc::now().to_rfc3339()),
    );
    if let Some(path) = args.str("save_path") {
        std::fs::write(Path::new(path), &capture.png).map_err(|e| {
            ToolError::invalid("save_path", format!("could not write '{path}': {e}"))
        })?;
        debug!(path, bytes = capture.png.len(), "Screenshot saved");
        out.insert("saved_to".to_string(), json!(path));
    }
    Ok(out)
}

/// Captures the main view with the configured defaults, in the mode
/// `take_screenshot` would pick automatically.
///
/// # Errors
///
/// Fails if there is nothing to capture or rendering fails.
pub fn snapshot(session: &mut Session) -> Result<Value, ToolError> {
    let settings = session.screenshot_settings().clone();
    let mode = auto_mode(session);
    let capture = capture(
        session,
        mode,
        None,
        settings.width,
        settings.height,
        settings.background,
    )?;
    Ok(capture.describe())
}

fn capture(
    session: &mut Session,
    mode: CaptureMode,
    document: Option<String>,
    width: u32,
    height: u32,
    background: Color,
) -> Result<Capture, ToolError> {
    let (image, documents) = if mode == CaptureMode::Split {
        let (target, work) = match (&session.dual().target, &session.dual().work) {
            (Some(t), Some(w)) if session.dual().enabled => (t.clone(), w.clone()),
            _ => {
                return Err(ToolError::State(
                    "Split screenshots need dual document mode. Call setup_dual_docs first"
                        .to_string(),
                ))
            }
        };
        if width < 2 {
            return Err(ToolError::invalid("width", "split screenshots need at least 2 pixels"));
        }
        (
            render_split(session, &target, &work, width, height, background)?,
            vec![target, work],
        )
    } else {
        let document = document
            .or_else(|| session.view_document())
            .ok_or_else(|| ToolError::from(HostError::NoActiveDocument))?;
        let mut image = session
            .host_mut()
            .render(&document, width, height, background)?;
        if mode == CaptureMode::Grid {
            decorate(session, &mut image, &document, true);
        }
        (image, vec![document])
    };

    let png = render::encode_png(&image).map_err(|e| HostError::Render(e.to_string()))?;
    Ok(Capture {
        png,
        width,
        height,
        mode,
        documents,
    })
}

fn render_split(
    session: &mut Session,
    target: &str,
    work: &str,
    width: u32,
    height: u32,
    background: Color,
) -> Result<RgbaImage, ToolError> {
    let left_width = width / 2;
    let right_width = width - left_width;
    let measuring = session.measurement().is_active();

    let mut left = session
        .host_mut()
        .render(target, left_width, height, background)?;
    decorate(session, &mut left, target, false);
    let mut right = session
        .host_mut()
        .render(work, right_width, height, background)?;
    decorate(session, &mut right, work, measuring);

    let mut canvas = render::blank(width, height, background);
    imageops::replace(&mut canvas, &left, 0, 0);
    imageops::replace(&mut canvas, &right, i64::from(left_width), 0);
    render::fill_rect(
        &mut canvas,
        f64::from(left_width) - 1.0,
        0.0,
        f64::from(left_width) + 1.0,
        f64::from(height),
        Color::rgb(0x80, 0x80, 0x80).with_alpha(255),
    );
    Ok(canvas)
}

/// Draws the grid (optionally) and labels the points that belong to
/// `document`.
fn decorate(session: &Session, image: &mut RgbaImage, document: &str, grid: bool) {
    let state = session.measurement();
    if grid {
        overlay::draw_grid(image, state.grid(), state.overlay_area());
    }
    let (w, h) = image.dimensions();
    let labels: Vec<PointLabel> = state
        .pending()
        .chain(state.confirmed())
        .filter(|p| p.document == document)
        .filter_map(|p| {
            session.host().project(p.coords, w, h).map(|position| PointLabel {
                position,
                text: p.id.clone(),
                color: p.color,
            })
        })
        .collect();
    overlay::draw_point_labels(image, &labels);
}
