use eframe::egui::{self, Color32, Pos2, Sense, Shape, Stroke, Vec2};
use log::debug;

use super::buffer::Sample;

/// Width of the scrolling display window, anchored at the newest sample.
pub const WINDOW_MS: i64 = 5000;
/// Reference grid pitch in logical pixels.
pub const GRID_STEP: f32 = 20.0;

const BACKGROUND: Color32 = Color32::from_rgb(6, 12, 10);
const GRID: Color32 = Color32::from_rgb(22, 48, 40);
const TRACE: Color32 = Color32::from_rgb(0, 230, 118);
const TRACE_ALARM: Color32 = Color32::from_rgb(236, 19, 19);

/// Backing-surface bookkeeping for the scope.
///
/// Tracks the physical pixel dimensions (logical size scaled by pixel
/// density) and rebuilds the reference grid layout only when they change.
pub struct ScopeSurface {
    px_w: u32,
    px_h: u32,
    grid_xs: Vec<f32>,
    grid_ys: Vec<f32>,
}

impl ScopeSurface {
    pub fn new() -> Self {
        Self {
            px_w: 0,
            px_h: 0,
            grid_xs: Vec::new(),
            grid_ys: Vec::new(),
        }
    }

    /// Fits the surface to the given logical size and pixel density.
    /// Returns true when the physical dimensions changed and the grid
    /// layout was rebuilt.
    pub fn fit(&mut self, logical: Vec2, pixels_per_point: f32) -> bool {
        let px_w = physical(logical.x, pixels_per_point);
        let px_h = physical(logical.y, pixels_per_point);
        if (px_w, px_h) == (self.px_w, self.px_h) {
            return false;
        }
        self.px_w = px_w;
        self.px_h = px_h;
        self.grid_xs = grid_steps(logical.x);
        self.grid_ys = grid_steps(logical.y);
        debug!("scope surface resized to {}x{} px", px_w, px_h);
        true
    }

    pub fn pixel_dims(&self) -> (u32, u32) {
        (self.px_w, self.px_h)
    }

    pub fn grid_xs(&self) -> &[f32] {
        &self.grid_xs
    }

    pub fn grid_ys(&self) -> &[f32] {
        &self.grid_ys
    }
}

impl Default for ScopeSurface {
    fn default() -> Self {
        Self::new()
    }
}

fn physical(logical: f32, pixels_per_point: f32) -> u32 {
    ((logical * pixels_per_point).floor() as u32).max(1)
}

fn grid_steps(extent: f32) -> Vec<f32> {
    let mut steps = Vec::new();
    let mut at = 0.0;
    while at < extent {
        steps.push(at);
        at += GRID_STEP;
    }
    steps
}

/// Maps samples into scope-local coordinates over the fixed display
/// window. Samples older than the window are mapped anyway and land left
/// of the visible area; the painter clips them.
pub fn trace_points(samples: &[Sample], width: f32, height: f32) -> Vec<Pos2> {
    let Some(latest) = samples.last() else {
        return Vec::new();
    };
    let window_start = latest.time - WINDOW_MS;
    samples
        .iter()
        .map(|s| {
            let x = (s.time - window_start) as f32 / WINDOW_MS as f32 * width;
            let y = height * (1.0 - s.value as f32 / 1024.0);
            Pos2::new(x, y)
        })
        .collect()
}

/// Draws one frame of the scrolling trace into the available space.
pub fn show(ui: &mut egui::Ui, surface: &mut ScopeSurface, samples: &[Sample], alarm: bool) {
    let (response, painter) = ui.allocate_painter(ui.available_size(), Sense::hover());
    let rect = response.rect;
    surface.fit(rect.size(), ui.ctx().pixels_per_point());

    painter.rect_filled(rect, 0.0, BACKGROUND);

    let grid_stroke = Stroke::new(0.5, GRID);
    for &x in surface.grid_xs() {
        let x = rect.left() + x;
        painter.line_segment(
            [Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())],
            grid_stroke,
        );
    }
    for &y in surface.grid_ys() {
        let y = rect.top() + y;
        painter.line_segment(
            [Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)],
            grid_stroke,
        );
    }

    if samples.len() >= 2 {
        let points: Vec<Pos2> = trace_points(samples, rect.width(), rect.height())
            .into_iter()
            .map(|p| Pos2::new(rect.left() + p.x, rect.top() + p.y))
            .collect();
        let color = if alarm { TRACE_ALARM } else { TRACE };
        painter.add(Shape::line(points, Stroke::new(2.5, color)));
    }
}
