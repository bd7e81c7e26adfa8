//! Grid and point-label overlay for screenshots.

use image::{Rgba, RgbaImage};

use super::grid::{GridCell, GridConfig, Region};
use crate::render::{self, Color};

const GRID_LINE: Rgba<u8> = Rgba([255, 255, 255, 150]);
const REGION_BORDER: Rgba<u8> = Rgba([255, 200, 0, 220]);
const LABEL_TEXT: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Cells at least this many pixels across get double-size labels.
const LARGE_LABEL_CELL: f64 = 60.0;

/// A label to draw next to a projected point.
#[derive(Debug, Clone)]
pub struct PointLabel {
    /// Pixel position of the point.
    pub position: (f64, f64),
    /// Text.
    pub text: String,
    /// Label colour.
    pub color: Color,
}

/// Draws cell boundaries and labels of `grid` inside `area`, a normalised
/// sub-rectangle of the image.
///
/// Column letters run along the top edge of the area and row numbers down
/// its left edge. When the area does not cover the whole image its border is
/// highlighted.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn draw_grid(img: &mut RgbaImage, grid: &GridConfig, area: Region) {
    let w = f64::from(img.width());
    let h = f64::from(img.height());
    let x0 = area.x_min * w;
    let y0 = area.y_min * h;
    let cell_w = area.width() * w / grid.columns as f64;
    let cell_h = area.height() * h / grid.rows as f64;
    let x1 = x0 + cell_w * grid.columns as f64;
    let y1 = y0 + cell_h * grid.rows as f64;

    for c in 0..=grid.columns {
        let x = x0 + cell_w * c as f64;
        render::draw_thick_line(img, (x, y0), (x, y1), 1.0, GRID_LINE);
    }
    for r in 0..=grid.rows {
        let y = y0 + cell_h * r as f64;
        render::draw_thick_line(img, (x0, y), (x1, y), 1.0, GRID_LINE);
    }

    if !area.is_full() {
        let corners = [(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)];
        for pair in corners.windows(2) {
            render::draw_thick_line(img, pair[0], pair[1], 2.0, REGION_BORDER);
        }
    }

    let scale = if cell_w.min(cell_h) >= LARGE_LABEL_CELL { 2 } else { 1 };
    let pad = 3.0;
    for c in 0..grid.columns {
        let label = GridCell { column: c, row: 0 }.to_string();
        let letter = &label[..1];
        let text_w = f64::from(render::text_width(letter, scale));
        let x = x0 + cell_w * (c as f64 + 0.5) - text_w / 2.0;
        render::draw_label(img, x as i64, (y0 + pad) as i64, letter, scale, LABEL_TEXT);
    }
    for r in 0..grid.rows {
        let number = (r + 1).to_string();
        let text_h = f64::from(8 * scale);
        let y = y0 + cell_h * (r as f64 + 0.5) - text_h / 2.0;
        render::draw_label(img, (x0 + pad) as i64, y as i64, &number, scale, LABEL_TEXT);
    }
}

/// Draws each label just above and to the right of its point.
#[allow(clippy::cast_possible_truncation)]
pub fn draw_point_labels(img: &mut RgbaImage, labels: &[PointLabel]) {
    for label in labels {
        let (x, y) = label.position;
        render::draw_label(
            img,
            (x + 6.0) as i64,
            (y - 14.0) as i64,
            &label.text,
            1,
            label.color.with_alpha(255),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(img: &RgbaImage, x: u32, y: u32) -> bool {
        img.get_pixel(x, y)[0] > 0
    }

    #[test]
    fn full_area_grid_draws_cell_boundaries() {
        let grid = GridConfig::new(4, 2);
        let mut img = render::blank(400, 200, Color::rgb(0, 0, 0));
        draw_grid(&mut img, &grid, Region::FULL);

        // Vertical boundary at x = 100, away from any label.
        assert!(lit(&img, 100, 150));
        // Middle of a cell stays dark.
        assert!(!lit(&img, 150, 150));
    }

    #[test]
    fn partial_area_leaves_outside_untouched() {
        let grid = GridConfig::new(2, 2);
        let mut img = render::blank(200, 200, Color::rgb(0, 0, 0));
        let area = Region {
            x_min: 0.5,
            x_max: 1.0,
            y_min: 0.5,
            y_max: 1.0,
        };
        draw_grid(&mut img, &grid, area);
        assert!(!lit(&img, 50, 50));
        assert!(lit(&img, 150, 199));
    }

    #[test]
    fn point_labels_are_drawn() {
        let mut img = render::blank(100, 100, Color::rgb(0, 0, 0));
        draw_point_labels(
            &mut img,
            &[PointLabel {
                position: (20.0, 50.0),
                text: "point_1".to_string(),
                color: Color::rgb(255, 0, 0),
            }],
        );
        let red = img.pixels().filter(|p| p[0] == 255 && p[1] == 0).count();
        assert!(red > 0);
    }
}
