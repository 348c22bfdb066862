//! Sphere-to-plane projections
//!
//! The gnomonic projection provides the local tangent plane used when
//! verifying candidate matches; the Lambert cylindrical and interrupted
//! Collignon projections are the equatorial-belt and polar-cap charts
//! underlying the HEALPix pixelisation.

use std::f64::consts::PI;

use super::Equatorial;

/// Guard against projecting points on or beyond the anti-hemisphere.
const GNOMONIC_EPS: f64 = 1e-10;

/// Gnomonic (TAN) projection of `coord` onto the tangent plane at `center`
///
/// Returns dimensionless tangent-plane offsets. Points at or beyond 90
/// degrees from the center have no gnomonic image and collapse to `(0, 0)`;
/// downstream tolerance checks reject them.
pub fn gnomonic(coord: Equatorial, center: Equatorial) -> (f64, f64) {
    let ra = coord.ra_radians();
    let dec = coord.dec_radians();
    let ra0 = center.ra_radians();
    let dec0 = center.dec_radians();

    let c = dec0.sin() * dec.sin() + dec0.cos() * dec.cos() * (ra - ra0).cos();
    if c < GNOMONIC_EPS {
        return (0.0, 0.0);
    }

    let x = dec.cos() * (ra - ra0).sin() / c;
    let y = (dec0.cos() * dec.sin() - dec0.sin() * dec.cos() * (ra - ra0).cos()) / c;
    (x, y)
}

/// Lambert cylindrical equal-area projection, both axes in degrees
pub fn lambert_cylindrical(coord: Equatorial) -> (f64, f64) {
    let z = coord.dec_radians().sin();
    (coord.ra, (3.0 * PI / 8.0 * z).to_degrees())
}

/// Interrupted Collignon projection of the polar caps, both axes in degrees
///
/// The sphere above |dec| = 41.81 degrees maps onto four triangular facets;
/// longitudes are compressed toward each facet's central meridian as the
/// pole is approached.
pub fn collignon(coord: Equatorial) -> (f64, f64) {
    let ra = coord.ra_radians();
    let z = coord.dec_radians().sin();

    let sigma = (3.0 * (1.0 - z.abs())).sqrt();
    let y = PI / 4.0 * (2.0 - sigma) * coord.dec.signum();

    // Central meridian of the facet containing ra: pi/4, 3pi/4, 5pi/4 or 7pi/4.
    let facet_x = PI / 4.0 * (2.0 * (2.0 + 2.0 * ra / PI).floor() - 3.0);
    let x = facet_x + sigma * (ra - facet_x);

    (x.to_degrees(), y.to_degrees())
}

/// Spherical dead-reckoning: step `radius_deg` degrees from `center` along
/// the azimuth `azimuth_deg` (measured from north, turning east)
pub fn polar_offset(center: Equatorial, radius_deg: f64, azimuth_deg: f64) -> Equatorial {
    let dec0 = center.dec_radians();
    let delta = radius_deg.to_radians();
    let theta = azimuth_deg.to_radians();

    let dec = (dec0.sin() * delta.cos() + dec0.cos() * delta.sin() * theta.cos()).asin();
    let ra = center.ra_radians()
        + (theta.sin() * delta.sin() * dec0.cos()).atan2(delta.cos() - dec0.sin() * dec.sin());

    Equatorial::normalized(ra.to_degrees(), dec.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn eq(ra: f64, dec: f64) -> Equatorial {
        Equatorial::new(ra, dec).unwrap()
    }

    #[test]
    fn test_gnomonic_identity_at_center() {
        let (x, y) = gnomonic(eq(10.0, 20.0), eq(10.0, 20.0));
        assert_eq!(x, 0.0);
        assert_eq!(y, 0.0);
    }

    #[test]
    fn test_gnomonic_small_offsets() {
        let center = eq(180.0, 0.0);

        // One degree east maps to tan(1 deg) on the x axis.
        let (x, y) = gnomonic(eq(181.0, 0.0), center);
        assert_abs_diff_eq!(x, 1.0_f64.to_radians().tan(), epsilon = 1e-12);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-12);

        // One degree north maps to tan(1 deg) on the y axis.
        let (x, y) = gnomonic(eq(180.0, 1.0), center);
        assert_abs_diff_eq!(x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(y, 1.0_f64.to_radians().tan(), epsilon = 1e-12);
    }

    #[test]
    fn test_gnomonic_far_hemisphere_collapses() {
        let (x, y) = gnomonic(eq(190.0, 0.0), eq(10.0, 0.0));
        assert_eq!((x, y), (0.0, 0.0));

        // Exactly 90 degrees away is also rejected.
        let (x, y) = gnomonic(eq(100.0, 0.0), eq(10.0, 0.0));
        assert_eq!((x, y), (0.0, 0.0));
    }

    #[test]
    fn test_lambert_cylindrical() {
        let (x, y) = lambert_cylindrical(eq(123.4, 0.0));
        assert_abs_diff_eq!(x, 123.4);
        assert_abs_diff_eq!(y, 0.0);

        let (_, y) = lambert_cylindrical(eq(0.0, 90.0));
        assert_abs_diff_eq!(y, 67.5, epsilon = 1e-9);

        let (_, y) = lambert_cylindrical(eq(0.0, -90.0));
        assert_abs_diff_eq!(y, -67.5, epsilon = 1e-9);
    }

    #[test]
    fn test_collignon_pole_reaches_facet_apex() {
        // At the pole sigma is zero, so y peaks and x sits on the facet meridian.
        let (x, y) = collignon(eq(0.0, 90.0));
        assert_abs_diff_eq!(y, 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(x, 45.0, epsilon = 1e-9);

        let (_, y) = collignon(eq(0.0, -90.0));
        assert_abs_diff_eq!(y, -90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_collignon_facet_meridians() {
        // The facet center depends only on which quadrant the RA falls in.
        for (ra, want) in [(10.0, 45.0), (100.0, 135.0), (200.0, 225.0), (300.0, 315.0)] {
            let (x, _) = collignon(eq(ra, 89.9999));
            assert_abs_diff_eq!(x, want, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_polar_offset_cardinal_directions() {
        let center = eq(10.0, 20.0);

        let north = polar_offset(center, 1.0, 0.0);
        assert_abs_diff_eq!(north.dec, 21.0, epsilon = 1e-9);
        assert_abs_diff_eq!(north.ra, 10.0, epsilon = 1e-9);

        let south = polar_offset(center, 1.0, 180.0);
        assert_abs_diff_eq!(south.dec, 19.0, epsilon = 1e-9);

        let east = polar_offset(center, 1.0, 90.0);
        assert!(east.ra > 10.0);
        assert_abs_diff_eq!(center.angular_distance(&east), 1.0, epsilon = 1e-9);

        let west = polar_offset(center, 1.0, 270.0);
        assert!(west.ra < 10.0);
    }

    #[test]
    fn test_polar_offset_wraps_ra() {
        let stepped = polar_offset(eq(0.5, 0.0), 1.0, 270.0);
        assert!(stepped.ra > 359.0, "ra should wrap, got {}", stepped.ra);
    }
}
