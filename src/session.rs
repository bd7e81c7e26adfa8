//! Per-process session context owned by the owner thread.
//!
//! Everything a tool handler may mutate lives here: the host, the
//! measurement state and the dual-document state. A `Session` is built on
//! the owner thread and never leaves it.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{Config, ScreenshotConfig};
use crate::diagnostics::Diagnostics;
use crate::error::ToolError;
use crate::executor::Executor;
use crate::host::{Host, SimHost};
use crate::measure::MeasurementState;

/// Default name of the reference document in dual mode.
pub const DEFAULT_TARGET_DOC: &str = "Target";
/// Default name of the working document in dual mode.
pub const DEFAULT_WORK_DOC: &str = "Work";

/// Reference and working documents shown side by side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DualModeState {
    /// Whether dual mode is on.
    pub enabled: bool,
    /// Reference document.
    pub target: Option<String>,
    /// Working document.
    pub work: Option<String>,
}

/// Which document(s) a call addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentTarget {
    /// The dual-mode reference document.
    Target,
    /// The dual-mode working document.
    Work,
    /// Both dual-mode documents.
    Both,
    /// A document by name.
    Named(String),
    /// Whatever the default is for the current mode.
    Default,
}

impl DocumentTarget {
    /// Interprets a `document` argument.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::Default,
            Some(v) if v.eq_ignore_ascii_case("target") => Self::Target,
            Some(v) if v.eq_ignore_ascii_case("work") => Self::Work,
            Some(v) if v.eq_ignore_ascii_case("both") => Self::Both,
            Some(v) => Self::Named(v.to_string()),
        }
    }
}

/// Owner-thread state.
pub struct Session {
    host: Box<dyn Host>,
    measurement: MeasurementState,
    dual: DualModeState,
    screenshot: ScreenshotConfig,
    diagnostics: Diagnostics,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("measurement", &self.measurement)
            .field("dual", &self.dual)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session around `host`.
    #[must_use]
    pub fn new(
        host: Box<dyn Host>,
        measurement: MeasurementState,
        screenshot: ScreenshotConfig,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            host,
            measurement,
            dual: DualModeState::default(),
            screenshot,
            diagnostics,
        }
    }

    /// Creates a session with a [`SimHost`] seeded from the configured scene.
    #[must_use]
    pub fn from_config(config: &Config, diagnostics: Diagnostics) -> Self {
        let scene = &config.scene;
        let host = SimHost::with_scene(scene.viewport_width, scene.viewport_height, &scene.boxes);
        Self::new(
            Box::new(host),
            MeasurementState::new(
                config.measurement.grid_columns,
                config.measurement.grid_rows,
            ),
            config.screenshot.clone(),
            diagnostics,
        )
    }

    /// The host.
    #[must_use]
    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    /// The host, mutably.
    pub fn host_mut(&mut self) -> &mut dyn Host {
        self.host.as_mut()
    }

    /// Measurement state.
    #[must_use]
    pub const fn measurement(&self) -> &MeasurementState {
        &self.measurement
    }

    /// Host and measurement state together, for operations that drive both.
    pub fn measure_parts(&mut self) -> (&mut dyn Host, &mut MeasurementState, &Diagnostics) {
        (self.host.as_mut(), &mut self.measurement, &self.diagnostics)
    }

    /// Dual-mode state.
    #[must_use]
    pub const fn dual(&self) -> &DualModeState {
        &self.dual
    }

    /// Screenshot defaults.
    #[must_use]
    pub const fn screenshot_settings(&self) -> &ScreenshotConfig {
        &self.screenshot
    }

    /// Shared diagnostics.
    #[must_use]
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Turns dual mode on with the given documents.
    pub fn enable_dual_mode(&mut self, target: String, work: String) {
        info!(%target, %work, "Dual document mode enabled");
        self.dual = DualModeState {
            enabled: true,
            target: Some(target),
            work: Some(work),
        };
    }

    /// Resolves a `document` argument to one or more document names.
    ///
    /// In dual mode the keywords `target`, `work` and `both` pick the
    /// corresponding documents and the default is `work`. Otherwise the
    /// default is the active document. Any other value is a document name.
    ///
    /// # Errors
    ///
    /// Fails if a keyword is used outside dual mode, if there is no active
    /// document to default to, or if a named document does not exist.
    pub fn resolve_documents(&self, document: Option<&str>) -> Result<Vec<String>, ToolError> {
        let names = match (DocumentTarget::parse(document), self.dual_docs()) {
            (DocumentTarget::Named(name), _) => vec![name],
            (DocumentTarget::Target, Some((target, _))) => vec![target.to_string()],
            (DocumentTarget::Work | DocumentTarget::Default, Some((_, work))) => {
                vec![work.to_string()]
            }
            (DocumentTarget::Both, Some((target, work))) => {
                vec![target.to_string(), work.to_string()]
            }
            (DocumentTarget::Default, None) => vec![self
                .host
                .active_document()
                .ok_or_else(|| ToolError::State("No active document".to_string()))?],
            (DocumentTarget::Target | DocumentTarget::Work | DocumentTarget::Both, None) => {
                return Err(ToolError::State(
                    "Dual document mode is not enabled. Call setup_dual_docs first".to_string(),
                ));
            }
        };

        let open = self.host.list_documents();
        for name in &names {
            if !open.iter().any(|d| &d.name == name) {
                return Err(ToolError::NotFound(format!("Document not found: {name}")));
            }
        }
        Ok(names)
    }

    /// Resolves a `document` argument that must name exactly one document.
    ///
    /// # Errors
    ///
    /// As [`resolve_documents`](Self::resolve_documents), and fails for
    /// `both`.
    pub fn resolve_document(&self, document: Option<&str>) -> Result<String, ToolError> {
        let mut names = self.resolve_documents(document)?;
        if names.len() != 1 {
            return Err(ToolError::invalid(
                "document",
                "this operation needs a single document, not 'both'",
            ));
        }
        Ok(names.remove(0))
    }

    /// The document shown in the main view: the working document in dual
    /// mode, the active document otherwise.
    #[must_use]
    pub fn view_document(&self) -> Option<String> {
        self.dual_docs()
            .map(|(_, work)| work.to_string())
            .or_else(|| self.host.active_document())
    }

    /// Clears all measurement artifacts and leaves dual mode.
    pub fn reset(&mut self) {
        self.measurement
            .reset(self.host.as_mut(), &self.diagnostics);
        self.dual = DualModeState::default();
        info!("Session reset");
    }

    /// Resets the session on its owner thread before the process stops.
    /// Failures are logged and do not block shutdown.
    pub async fn teardown(executor: &Executor<Self>, timeout: Duration) {
        if let Err(e) = executor.execute_async(Self::reset, timeout).await {
            warn!(error = %e, "Session teardown did not run");
        }
    }

    fn dual_docs(&self) -> Option<(&str, &str)> {
        if !self.dual.enabled {
            return None;
        }
        Some((self.dual.target.as_deref()?, self.dual.work.as_deref()?))
    }
}
