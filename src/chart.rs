use crate::models::PriceBar;

/// Projects close prices onto a `width` x `height` canvas with y growing downwards.
pub fn project(bars: &[PriceBar], width: f64, height: f64) -> Vec<(f64, f64)> {
    if bars.is_empty() {
        return Vec::new();
    }

    let (min, max) = bars.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, bar| {
        (acc.0.min(bar.close), acc.1.max(bar.close))
    });
    let span = max - min;
    let step = if bars.len() > 1 {
        width / (bars.len() - 1) as f64
    } else {
        0.0
    };

    bars.iter()
        .enumerate()
        .map(|(idx, bar)| {
            let x = step * idx as f64;
            let y = if span > f64::EPSILON {
                height - (bar.close - min) / span * height
            } else {
                height / 2.0
            };
            (x, y)
        })
        .collect()
}

/// SVG `points` attribute for a polyline over the projected closes.
pub fn svg_points(bars: &[PriceBar], width: f64, height: f64) -> String {
    project(bars, width, height)
        .iter()
        .map(|(x, y)| format!("{:.1},{:.1}", x, y))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowest and highest close, for axis labels.
pub fn close_range(bars: &[PriceBar]) -> Option<(f64, f64)> {
    let first = bars.first()?.close;
    Some(bars.iter().fold((first, first), |(lo, hi), bar| {
        (lo.min(bar.close), hi.max(bar.close))
    }))
}
