//! Labelled grid over the viewport.
//!
//! Columns are letters (A = column 0), rows are 1-based numbers counted from
//! the top of the view. The grid always subdivides the current [`Region`],
//! a normalised sub-rectangle of the reference view that narrows as the
//! caller zooms in.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::ToolError;

/// Maximum columns: one letter per column.
pub const MAX_COLUMNS: usize = 26;

/// Normalised viewport rectangle, `[0, 1]` on both axes, y pointing down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Region {
    /// Left edge.
    pub x_min: f64,
    /// Right edge.
    pub x_max: f64,
    /// Top edge.
    pub y_min: f64,
    /// Bottom edge.
    pub y_max: f64,
}

impl Region {
    /// The whole viewport.
    pub const FULL: Self = Self {
        x_min: 0.0,
        x_max: 1.0,
        y_min: 0.0,
        y_max: 1.0,
    };

    /// Region width.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    /// Region height.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Whether this is the full viewport.
    #[must_use]
    pub fn is_full(&self) -> bool {
        *self == Self::FULL
    }

    /// Maps a position normalised to this region into viewport coordinates.
    #[must_use]
    pub fn map(&self, nx: f64, ny: f64) -> (f64, f64) {
        (
            self.x_min + nx * self.width(),
            self.y_min + ny * self.height(),
        )
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::FULL
    }
}

/// A parsed cell reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    /// 0-based column.
    pub column: usize,
    /// 0-based row.
    pub row: usize,
}

impl std::fmt::Display for GridCell {
    #[allow(clippy::cast_possible_truncation)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = char::from(b'A' + self.column as u8);
        write!(f, "{letter}{}", self.row + 1)
    }
}

/// Grid layout and the region it currently covers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridConfig {
    /// Number of columns (at most [`MAX_COLUMNS`]).
    pub columns: usize,
    /// Number of rows.
    pub rows: usize,
    /// Whether the grid is drawn on screenshots.
    pub enabled: bool,
    /// Current region.
    pub region: Region,
}

impl GridConfig {
    /// Creates a disabled grid over the full viewport.
    #[must_use]
    pub fn new(columns: usize, rows: usize) -> Self {
        Self {
            columns: columns.clamp(1, MAX_COLUMNS),
            rows: rows.max(1),
            enabled: false,
            region: Region::FULL,
        }
    }

    /// Parses a cell reference and checks it against this grid.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidCell`] if the reference is malformed or
    /// outside the grid.
    pub fn parse_cell(&self, reference: &str) -> Result<GridCell, ToolError> {
        let invalid = |message: String| ToolError::InvalidCell {
            cell: reference.to_string(),
            message,
        };

        let captures = cell_pattern()
            .captures(reference.trim())
            .ok_or_else(|| invalid(describe_malformed(reference.trim())))?;

        let letter = captures["column"]
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .ok_or_else(|| invalid("missing column letter".to_string()))?;
        let column = (letter as usize) - ('A' as usize);

        let row: usize = captures["row"]
            .parse()
            .map_err(|_| invalid("row number is too large".to_string()))?;
        if row == 0 {
            return Err(invalid("rows are numbered from 1".to_string()));
        }

        if column >= self.columns {
            return Err(invalid(format!(
                "column {letter} is outside the grid (A-{})",
                self.last_column_letter()
            )));
        }
        if row > self.rows {
            return Err(invalid(format!(
                "row {row} is outside the grid (1-{})",
                self.rows
            )));
        }

        Ok(GridCell {
            column,
            row: row - 1,
        })
    }

    /// Computes the region covered by a `size`×`size` block of cells whose
    /// top-left cell is `start`. The result never extends past the current
    /// region.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sub_region(&self, start: GridCell, size: usize) -> Region {
        let cols = self.columns as f64;
        let rows = self.rows as f64;
        let r = self.region;

        let x_min = r.x_min + start.column as f64 / cols * r.width();
        let y_min = r.y_min + start.row as f64 / rows * r.height();
        Region {
            x_min,
            x_max: (x_min + size as f64 / cols * r.width()).min(r.x_max),
            y_min,
            y_max: (y_min + size as f64 / rows * r.height()).min(r.y_max),
        }
    }

    /// Viewport-normalised position of an offset inside a cell.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cell_position(&self, cell: GridCell, offset_x: f64, offset_y: f64) -> (f64, f64) {
        let nx = (cell.column as f64 + offset_x) / self.columns as f64;
        let ny = (cell.row as f64 + offset_y) / self.rows as f64;
        self.region.map(nx, ny)
    }

    /// Largest block size accepted by a zoom.
    #[must_use]
    pub fn max_zoom_size(&self) -> usize {
        self.columns.min(self.rows)
    }

    /// Letter of the last column.
    #[must_use]
    pub fn last_column_letter(&self) -> char {
        GridCell {
            column: self.columns - 1,
            row: 0,
        }
        .to_string()
        .chars()
        .next()
        .unwrap_or('A')
    }
}

fn cell_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<column>[A-Za-z])(?P<row>[0-9]+)$").unwrap_or_else(|e| {
            unreachable!("grid cell pattern is a valid regex: {e}")
        })
    })
}

fn describe_malformed(reference: &str) -> String {
    let mut chars = reference.chars();
    match chars.next() {
        None => "cell reference is empty".to_string(),
        Some(c) if !c.is_ascii_alphabetic() => {
            format!("column must be a letter A-Z, got '{c}'")
        }
        Some(_) => {
            let rest: String = chars.collect();
            if rest.is_empty() {
                "missing row number".to_string()
            } else {
                format!("row must be a positive integer, got '{rest}'")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridConfig {
        GridConfig::new(8, 6)
    }

    fn cell(column: usize, row: usize) -> GridCell {
        GridCell { column, row }
    }

    #[test]
    fn parses_valid_cells() {
        assert_eq!(grid().parse_cell("A1").unwrap(), cell(0, 0));
        assert_eq!(grid().parse_cell("C2").unwrap(), cell(2, 1));
        assert_eq!(grid().parse_cell("h6").unwrap(), cell(7, 5));
        assert_eq!(grid().parse_cell(" b3 ").unwrap(), cell(1, 2));
    }

    #[test]
    fn rejects_malformed_cells() {
        for bad in ["1A", "A", "", "AA1", "A-1", "A1.5"] {
            let err = grid().parse_cell(bad).unwrap_err();
            assert!(
                matches!(err, ToolError::InvalidCell { .. }),
                "expected InvalidCell for {bad:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn rejects_out_of_bounds_cells() {
        assert!(grid().parse_cell("Z1").is_err());
        assert!(grid().parse_cell("I1").is_err());
        assert!(grid().parse_cell("A7").is_err());
        assert!(grid().parse_cell("A0").is_err());
    }

    #[test]
    fn malformed_messages_are_descriptive() {
        let msg = grid().parse_cell("1A").unwrap_err().to_string();
        assert!(msg.contains("column must be a letter"), "{msg}");
        let msg = grid().parse_cell("Cx").unwrap_err().to_string();
        assert!(msg.contains("row must be a positive integer"), "{msg}");
        let msg = grid().parse_cell("Z1").unwrap_err().to_string();
        assert!(msg.contains("A-H"), "{msg}");
    }

    #[test]
    fn cell_display_round_trips_label() {
        assert_eq!(cell(2, 1).to_string(), "C2");
        assert_eq!(grid().last_column_letter(), 'H');
    }

    #[test]
    fn sub_region_composes_multiplicatively() {
        let mut g = grid();
        g.region = g.sub_region(cell(0, 0), 2);
        assert!((g.region.x_max - 2.0 / 8.0).abs() < 1e-12);
        assert!((g.region.y_max - 2.0 / 6.0).abs() < 1e-12);

        g.region = g.sub_region(cell(0, 0), 2);
        assert!((g.region.x_max - (2.0 / 8.0) * (2.0 / 8.0)).abs() < 1e-12);
        assert!((g.region.y_max - (2.0 / 6.0) * (2.0 / 6.0)).abs() < 1e-12);
    }

    #[test]
    fn sub_region_is_clamped_to_current_region() {
        let g = grid();
        let r = g.sub_region(cell(7, 5), 3);
        assert!((r.x_min - 7.0 / 8.0).abs() < 1e-12);
        assert!((r.x_max - 1.0).abs() < 1e-12);
        assert!((r.y_max - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cell_position_uses_region() {
        let mut g = grid();
        let (x, y) = g.cell_position(cell(0, 0), 0.5, 0.5);
        assert!((x - 0.0625).abs() < 1e-12);
        assert!((y - 1.0 / 12.0).abs() < 1e-12);

        g.region = Region {
            x_min: 0.5,
            x_max: 1.0,
            y_min: 0.0,
            y_max: 0.5,
        };
        let (x, _) = g.cell_position(cell(0, 0), 0.0, 0.0);
        assert!((x - 0.5).abs() < 1e-12);
    }

    #[test]
    fn columns_are_capped() {
        let g = GridConfig::new(40, 0);
        assert_eq!(g.columns, MAX_COLUMNS);
        assert_eq!(g.rows, 1);
    }
}
