//! Planar geometry primitives for asterism fingerprinting
//!
//! Triangles built from star positions are reduced to four scalars that are
//! unchanged under translation, rotation and uniform scaling: two side-length
//! ratios and two vertex angles. Those invariants are what the pattern matcher
//! compares between the pixel plane and the sky plane.

use serde::{Deserialize, Serialize};

use crate::{Result, SolveError};

/// Euclidean distance between two planar points
pub fn distance(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    (x2 - x1).hypot(y2 - y1)
}

/// Interior angle at vertex `a` of the triangle `(a, b, c)`, in degrees
///
/// Computed with the law of cosines. Fails if any side has zero length.
pub fn vertex_angle(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Result<f64> {
    // Side naming follows the opposite-vertex convention: side `sa` is
    // opposite vertex a, and so on.
    let sa = distance(b.0, b.1, c.0, c.1);
    let sb = distance(a.0, a.1, c.0, c.1);
    let sc = distance(a.0, a.1, b.0, b.1);
    if sa == 0.0 || sb == 0.0 || sc == 0.0 {
        return Err(SolveError::DegenerateTriangle);
    }
    let cos_a = (sb * sb + sc * sc - sa * sa) / (2.0 * sb * sc);
    Ok(cos_a.clamp(-1.0, 1.0).acos().to_degrees())
}

/// Scale, rotation and translation invariant descriptor of a triangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InvariantFeatures {
    /// min/max ratio of the sides adjacent to vertices A and B
    pub ratio_ab: f64,
    /// min/max ratio of the sides adjacent to vertices A and C
    pub ratio_ac: f64,
    /// Interior angle at vertex A in degrees
    pub angle_a: f64,
    /// Interior angle at vertex B in degrees
    pub angle_b: f64,
}

/// Compute the invariant features of the triangle `(a, b, c)`
///
/// Degenerate triangles (any zero-length side) are rejected; callers
/// enumerating triples are expected to skip them.
pub fn invariant_features(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Result<InvariantFeatures> {
    let sa = distance(b.0, b.1, c.0, c.1);
    let sb = distance(a.0, a.1, c.0, c.1);
    let sc = distance(a.0, a.1, b.0, b.1);
    if sa == 0.0 || sb == 0.0 || sc == 0.0 {
        return Err(SolveError::DegenerateTriangle);
    }

    Ok(InvariantFeatures {
        ratio_ab: sc.min(sa) / sc.max(sa),
        ratio_ac: sb.min(sa) / sb.max(sa),
        angle_a: vertex_angle(a, b, c)?,
        angle_b: vertex_angle(b, a, c)?,
    })
}

/// Tolerances for deciding whether two feature records describe the same shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Maximum difference allowed between side-length ratios
    pub length_ratio: f64,
    /// Maximum difference allowed between vertex angles, in degrees
    pub angle_deg: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            length_ratio: 0.02,
            angle_deg: 0.5,
        }
    }
}

/// Whether two feature records agree within the given tolerances
///
/// Symmetric and reflexive: both ratios must agree within
/// `tol.length_ratio` and both angles within `tol.angle_deg`.
pub fn compare_features(f1: &InvariantFeatures, f2: &InvariantFeatures, tol: Tolerance) -> bool {
    (f1.ratio_ab - f2.ratio_ab).abs() <= tol.length_ratio
        && (f1.ratio_ac - f2.ratio_ac).abs() <= tol.length_ratio
        && (f1.angle_a - f2.angle_a).abs() <= tol.angle_deg
        && (f1.angle_b - f2.angle_b).abs() <= tol.angle_deg
}
