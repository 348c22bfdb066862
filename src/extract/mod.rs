//! Star extraction
//!
//! Reduces an intensity buffer to a list of star centroids: estimate the
//! background with sigma-clipped statistics, flood-fill the pixels above
//! threshold into connected components, and centroid each component with
//! flux weighting. The result is sorted brightest first, which is the order
//! the matcher consumes.

use std::collections::VecDeque;

use log::debug;
use ndarray::Array2;

use crate::asterism::Star;

/// Extraction parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionConfig {
    /// Digital range upper bound; pixels at or above it count as saturated
    pub adu_max: f64,
    /// Minimum separation between two distinct stars, in pixels
    pub radius_px: f64,
    /// Detection threshold in background sigmas
    pub sigma: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            adu_max: 65535.0,
            radius_px: 3.0,
            sigma: 5.0,
        }
    }
}

/// Sigma-clipped median and standard deviation of the finite buffer values
fn background_stats(image: &Array2<f32>) -> (f64, f64) {
    let mut values: Vec<f64> = image
        .iter()
        .filter(|v| v.is_finite())
        .map(|&v| v as f64)
        .collect();
    if values.is_empty() {
        return (0.0, 1.0);
    }

    // Two clipping rounds at three sigma knock out the stars themselves.
    for _ in 0..2 {
        values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = values[values.len() / 2];
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
            / values.len() as f64;
        let sigma = var.sqrt();
        if sigma == 0.0 {
            return (median, 1e-10);
        }
        values.retain(|v| (v - median).abs() <= 3.0 * sigma);
        if values.is_empty() {
            return (median, sigma.max(1e-10));
        }
    }

    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = values[values.len() / 2];
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var =
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    (median, var.sqrt().max(1e-10))
}

/// Detect stars in an intensity buffer, brightest first
pub fn extract_stars(image: &Array2<f32>, config: &ExtractionConfig) -> Vec<Star> {
    let (rows, cols) = image.dim();
    if rows < 3 || cols < 3 {
        return Vec::new();
    }

    let (bg_median, bg_sigma) = background_stats(image);
    let threshold = bg_median + config.sigma * bg_sigma;
    debug!(
        "background median {:.2}, sigma {:.3}, threshold {:.2}",
        bg_median, bg_sigma, threshold
    );

    let clamp = |v: f64| v.min(config.adu_max);
    let mut visited = Array2::<bool>::default((rows, cols));
    let mut stars: Vec<Star> = Vec::new();

    for r in 1..rows - 1 {
        for c in 1..cols - 1 {
            let v = image[[r, c]] as f64;
            if v <= threshold || visited[[r, c]] || !v.is_finite() {
                continue;
            }

            // Flood-fill the 8-connected component above threshold.
            let mut queue = VecDeque::new();
            let mut component: Vec<(usize, usize)> = Vec::new();
            queue.push_back((r, c));
            visited[[r, c]] = true;

            while let Some((cr, cc)) = queue.pop_front() {
                component.push((cr, cc));
                for (dr, dc) in [
                    (-1i64, 0i64),
                    (1, 0),
                    (0, -1),
                    (0, 1),
                    (-1, -1),
                    (-1, 1),
                    (1, -1),
                    (1, 1),
                ] {
                    let nr = cr as i64 + dr;
                    let nc = cc as i64 + dc;
                    if nr < 0 || nc < 0 || nr >= rows as i64 || nc >= cols as i64 {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    if visited[[nr, nc]] {
                        continue;
                    }
                    let nv = image[[nr, nc]] as f64;
                    if nv > threshold && nv.is_finite() {
                        visited[[nr, nc]] = true;
                        queue.push_back((nr, nc));
                    }
                }
            }

            if component.len() < 3 || component.len() > 5000 {
                continue;
            }

            // Flux-weighted centroid over the background-subtracted pixels.
            let mut sum_flux = 0.0;
            let mut sum_x = 0.0;
            let mut sum_y = 0.0;
            for &(pr, pc) in &component {
                let f = (clamp(image[[pr, pc]] as f64) - bg_median).max(0.0);
                sum_flux += f;
                sum_x += pc as f64 * f;
                sum_y += pr as f64 * f;
            }
            if sum_flux <= 0.0 {
                continue;
            }

            stars.push(Star::new(sum_x / sum_flux, sum_y / sum_flux, sum_flux));
        }
    }

    stars.sort_by(|a, b| {
        b.intensity
            .partial_cmp(&a.intensity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Keep only the brightest of any pair closer than the extraction radius.
    let min_sep2 = config.radius_px * config.radius_px;
    let mut deduped: Vec<Star> = Vec::with_capacity(stars.len());
    for star in stars {
        let close = deduped.iter().any(|kept| {
            let dx = kept.x - star.x;
            let dy = kept.y - star.y;
            dx * dx + dy * dy < min_sep2
        });
        if !close {
            deduped.push(star);
        }
    }

    debug!("extracted {} stars", deduped.len());
    deduped
}
