//! Celestial coordinates
//!
//! Equatorial (RA/Dec) positions are carried in decimal degrees throughout the
//! crate. External inputs are validated on construction; intermediate results
//! of internal computations may wander outside the canonical ranges and are
//! renormalised when emitted.

pub mod projection;

use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::{Result, SolveError};

/// ICRS equatorial coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Equatorial {
    /// Right ascension in degrees, `0 <= ra < 360`
    pub ra: f64,
    /// Declination in degrees, `-90 <= dec <= 90`
    pub dec: f64,
}

impl Equatorial {
    /// Create a coordinate, rejecting values outside the canonical ranges
    pub fn new(ra: f64, dec: f64) -> Result<Self> {
        if !ra.is_finite() || !(0.0..360.0).contains(&ra) {
            return Err(SolveError::InvalidInput(format!(
                "right ascension {} outside [0, 360)",
                ra
            )));
        }
        if !dec.is_finite() || !(-90.0..=90.0).contains(&dec) {
            return Err(SolveError::InvalidInput(format!(
                "declination {} outside [-90, 90]",
                dec
            )));
        }
        Ok(Self { ra, dec })
    }

    /// Create a coordinate, wrapping RA into `[0, 360)` and clamping Dec
    pub fn normalized(ra: f64, dec: f64) -> Self {
        Self {
            ra: ra.rem_euclid(360.0),
            dec: dec.clamp(-90.0, 90.0),
        }
    }

    /// Right ascension in radians
    pub fn ra_radians(&self) -> f64 {
        self.ra.to_radians()
    }

    /// Declination in radians
    pub fn dec_radians(&self) -> f64 {
        self.dec.to_radians()
    }

    /// Unit vector in ICRS cartesian coordinates
    pub fn unit_vector(&self) -> na::Vector3<f64> {
        let ra = self.ra_radians();
        let dec = self.dec_radians();
        na::Vector3::new(dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin())
    }

    /// Great-circle separation to another coordinate, in degrees
    pub fn angular_distance(&self, other: &Equatorial) -> f64 {
        let cos_dist = self.unit_vector().dot(&other.unit_vector());

        // Handle numerical precision issues at the extremes
        cos_dist.clamp(-1.0, 1.0).acos().to_degrees()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_new_validates_ranges() {
        assert!(Equatorial::new(0.0, 0.0).is_ok());
        assert!(Equatorial::new(359.999, -90.0).is_ok());
        assert!(Equatorial::new(360.0, 0.0).is_err());
        assert!(Equatorial::new(-0.1, 0.0).is_err());
        assert!(Equatorial::new(10.0, 90.5).is_err());
        assert!(Equatorial::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_normalized_wraps_and_clamps() {
        let c = Equatorial::normalized(-10.0, 95.0);
        assert_abs_diff_eq!(c.ra, 350.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c.dec, 90.0);

        let d = Equatorial::normalized(725.0, -100.0);
        assert_abs_diff_eq!(d.ra, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d.dec, -90.0);
    }

    #[test]
    fn test_unit_vector_norm() {
        let c = Equatorial::new(279.2, 38.78).unwrap();
        assert_abs_diff_eq!(c.unit_vector().norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_angular_distance() {
        let p1 = Equatorial::new(10.0, 20.0).unwrap();
        assert_abs_diff_eq!(p1.angular_distance(&p1), 0.0, epsilon = 1e-5);

        // Antipodal points are 180 degrees apart; acos loses precision at
        // the extreme, hence the looser bound.
        let p2 = Equatorial::new(190.0, -20.0).unwrap();
        assert_abs_diff_eq!(p1.angular_distance(&p2), 180.0, epsilon = 1e-5);

        // Polaris to Vega is about 51 degrees
        let polaris = Equatorial::new(37.95, 89.26).unwrap();
        let vega = Equatorial::new(279.23, 38.78).unwrap();
        assert_abs_diff_eq!(polaris.angular_distance(&vega), 51.0, epsilon = 1.0);
    }
}
