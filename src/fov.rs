//! Field-of-view sizing

use crate::{Result, SolveError};

/// Catalog search radius proxy for an image, in degrees
///
/// Takes sqrt(2) times the smaller angular image dimension.
pub fn radial_extent(
    width: usize,
    height: usize,
    pixel_scale_x: f64,
    pixel_scale_y: f64,
) -> Result<f64> {
    if width == 0 || height == 0 {
        return Err(SolveError::InvalidInput(format!(
            "image dimensions must be positive, got {}x{}",
            width, height
        )));
    }
    if pixel_scale_x <= 0.0 || pixel_scale_y <= 0.0 {
        return Err(SolveError::InvalidInput(format!(
            "pixel scales must be positive, got ({}, {})",
            pixel_scale_x, pixel_scale_y
        )));
    }

    let fov_x = pixel_scale_x * width as f64;
    let fov_y = pixel_scale_y * height as f64;
    Ok(std::f64::consts::SQRT_2 * fov_x.min(fov_y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_radial_extent_uses_smaller_dimension() {
        let r = radial_extent(1000, 800, 0.001, 0.001).unwrap();
        assert_abs_diff_eq!(r, std::f64::consts::SQRT_2 * 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_radial_extent_rejects_bad_input() {
        assert!(radial_extent(0, 800, 0.001, 0.001).is_err());
        assert!(radial_extent(1000, 800, 0.0, 0.001).is_err());
        assert!(radial_extent(1000, 800, 0.001, -1.0).is_err());
    }
}
