//! Chart capture for the sandbox.
//!
//! Generated code records chart specs through `plot(spec)`; after the run the
//! executor renders the most recent spec to an inline SVG so an image exists
//! even when the code never asked for one.

use serde::{Deserialize, Serialize};

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 400.0;
const PAD: f64 = 48.0;

/// Loose chart description. Unknown fields are ignored so slightly
/// off-spec model output still renders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    /// `[x, y]` pairs for line charts.
    #[serde(default)]
    pub points: Vec<[f64; 2]>,
    /// Category labels for bar charts.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Bar heights, matched to `labels` by index.
    #[serde(default)]
    pub values: Vec<f64>,
}

impl ChartSpec {
    pub fn is_renderable(&self) -> bool {
        !self.points.is_empty() || !self.values.is_empty()
    }
}

/// Render a spec to a standalone SVG document.
pub fn render_svg(spec: &ChartSpec) -> String {
    let mut body = String::new();
    body.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">"#
    ));
    body.push_str(r#"<rect width="100%" height="100%" fill="white"/>"#);

    if let Some(title) = &spec.title {
        body.push_str(&format!(
            r#"<text x="{}" y="24" text-anchor="middle" font-family="sans-serif" font-size="16">{}</text>"#,
            WIDTH / 2.0,
            escape_text(title)
        ));
    }

    if spec.kind == "bar" || (!spec.values.is_empty() && spec.points.is_empty()) {
        render_bars(spec, &mut body);
    } else {
        render_line(spec, &mut body);
    }

    body.push_str("</svg>");
    body
}

fn render_line(spec: &ChartSpec, body: &mut String) {
    if spec.points.is_empty() {
        return;
    }
    let (min_x, max_x) = bounds(spec.points.iter().map(|p| p[0]));
    let (min_y, max_y) = bounds(spec.points.iter().map(|p| p[1]));
    let span_x = (max_x - min_x).max(f64::EPSILON);
    let span_y = (max_y - min_y).max(f64::EPSILON);

    let coords: Vec<String> = spec
        .points
        .iter()
        .map(|p| {
            let x = PAD + (p[0] - min_x) / span_x * (WIDTH - 2.0 * PAD);
            let y = HEIGHT - PAD - (p[1] - min_y) / span_y * (HEIGHT - 2.0 * PAD);
            format!("{x:.1},{y:.1}")
        })
        .collect();

    body.push_str(&format!(
        r#"<polyline fill="none" stroke="steelblue" stroke-width="2" points="{}"/>"#,
        coords.join(" ")
    ));
}

fn render_bars(spec: &ChartSpec, body: &mut String) {
    if spec.values.is_empty() {
        return;
    }
    let (_, max_v) = bounds(spec.values.iter().copied());
    let max_v = max_v.max(f64::EPSILON);
    let slot = (WIDTH - 2.0 * PAD) / spec.values.len() as f64;
    let bar_width = (slot * 0.8).max(1.0);

    for (index, value) in spec.values.iter().enumerate() {
        let height = (value / max_v).max(0.0) * (HEIGHT - 2.0 * PAD);
        let x = PAD + index as f64 * slot + (slot - bar_width) / 2.0;
        let y = HEIGHT - PAD - height;
        body.push_str(&format!(
            r#"<rect x="{x:.1}" y="{y:.1}" width="{bar_width:.1}" height="{height:.1}" fill="steelblue"/>"#
        ));
        if let Some(label) = spec.labels.get(index) {
            body.push_str(&format!(
                r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-family="sans-serif" font-size="11">{}</text>"#,
                x + bar_width / 2.0,
                HEIGHT - PAD + 16.0,
                escape_text(label)
            ));
        }
    }
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for value in values {
        if value < min {
            min = value;
        }
        if value > max {
            max = value;
        }
    }
    if min > max {
        (0.0, 0.0)
    } else {
        (min, max)
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
