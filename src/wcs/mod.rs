//! World Coordinate System fitting
//!
//! Turns a list of verified pixel/sky correspondences into the affine CD
//! matrix of a TAN projection, optionally augmented with SIP polynomial
//! distortion terms, and exposes the forward (pixel to sky) and inverse
//! (sky to pixel) transforms of the assembled record.

use serde::{Deserialize, Serialize};

use crate::matcher::Match;
use crate::matrix::Matrix;
use crate::{Result, SolveError};

/// One SIP polynomial term `value * u^p * v^q`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SipTerm {
    pub p: u32,
    pub q: u32,
    pub value: f64,
}

/// SIP distortion polynomials, forward (`a`, `b`) and inverse (`ap`, `bp`)
///
/// Terms of total degree below two are absorbed by the CD matrix and never
/// stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sip {
    pub order: usize,
    pub a: Vec<SipTerm>,
    pub b: Vec<SipTerm>,
    pub ap: Vec<SipTerm>,
    pub bp: Vec<SipTerm>,
}

fn eval_terms(terms: &[SipTerm], u: f64, v: f64) -> f64 {
    terms
        .iter()
        .map(|t| t.value * u.powi(t.p as i32) * v.powi(t.q as i32))
        .sum()
}

/// A fitted World Coordinate System record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wcs {
    /// Reference pixel (image center)
    pub crpix1: f64,
    pub crpix2: f64,
    /// Sky value at the reference pixel, degrees
    pub crval1: f64,
    pub crval2: f64,
    /// Axis types, TAN or TAN-SIP
    pub ctype1: String,
    pub ctype2: String,
    /// Axis units
    pub cunit1: String,
    pub cunit2: String,
    /// Per-axis increments, degrees per pixel
    pub cdelt1: f64,
    pub cdelt2: f64,
    /// Linear part of the pixel-to-sky transform
    pub cd1_1: f64,
    pub cd1_2: f64,
    pub cd2_1: f64,
    pub cd2_2: f64,
    /// Translation offsets of the underlying affine fit
    pub e: f64,
    pub f: f64,
    /// Optional distortion polynomials
    pub sip: Option<Sip>,
}

impl Wcs {
    /// Project a pixel position to the sky, degrees
    ///
    /// RA is normalised into `[0, 360)` on emission.
    pub fn forward(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.crpix1;
        let dy = y - self.crpix2;

        let (dxp, dyp) = match &self.sip {
            Some(sip) => (dx + eval_terms(&sip.a, dx, dy), dy + eval_terms(&sip.b, dx, dy)),
            None => (dx, dy),
        };

        let ra = self.cd1_1 * dxp + self.cd1_2 * dyp + self.crval1;
        let dec = self.cd2_1 * dxp + self.cd2_2 * dyp + self.crval2;
        (ra.rem_euclid(360.0), dec)
    }

    /// Project a sky position to pixels
    ///
    /// Returns `(0, 0)` when the CD matrix has no inverse.
    pub fn inverse(&self, ra: f64, dec: f64) -> (f64, f64) {
        let det = self.cd1_1 * self.cd2_2 - self.cd1_2 * self.cd2_1;
        if det == 0.0 {
            return (0.0, 0.0);
        }

        // Shortest-way RA difference, robust across the 0/360 seam.
        let dra = (ra - self.crval1 + 180.0).rem_euclid(360.0) - 180.0;
        let ddec = dec - self.crval2;

        let u = (self.cd2_2 * dra - self.cd1_2 * ddec) / det;
        let v = (-self.cd2_1 * dra + self.cd1_1 * ddec) / det;

        let (x, y) = match &self.sip {
            Some(sip) => (u + eval_terms(&sip.ap, u, v), v + eval_terms(&sip.bp, u, v)),
            None => (u, v),
        };
        (x + self.crpix1, y + self.crpix2)
    }

    /// The record as ordered `key -> value` pairs, ready for header
    /// injection or the side-car file
    pub fn to_key_values(&self) -> Vec<(String, String)> {
        let mut out = vec![
            ("WCSAXES".to_string(), "2".to_string()),
            ("CRPIX1".to_string(), format!("{:.2}", self.crpix1)),
            ("CRPIX2".to_string(), format!("{:.2}", self.crpix2)),
            ("CRVAL1".to_string(), format!("{:.8}", self.crval1)),
            ("CRVAL2".to_string(), format!("{:.8}", self.crval2)),
            ("CTYPE1".to_string(), self.ctype1.clone()),
            ("CTYPE2".to_string(), self.ctype2.clone()),
            ("CUNIT1".to_string(), self.cunit1.clone()),
            ("CUNIT2".to_string(), self.cunit2.clone()),
            ("CDELT1".to_string(), format!("{:.12E}", self.cdelt1)),
            ("CDELT2".to_string(), format!("{:.12E}", self.cdelt2)),
            ("CD1_1".to_string(), format!("{:.12E}", self.cd1_1)),
            ("CD1_2".to_string(), format!("{:.12E}", self.cd1_2)),
            ("CD2_1".to_string(), format!("{:.12E}", self.cd2_1)),
            ("CD2_2".to_string(), format!("{:.12E}", self.cd2_2)),
        ];

        if let Some(sip) = &self.sip {
            out.push(("A_ORDER".to_string(), sip.order.to_string()));
            out.push(("B_ORDER".to_string(), sip.order.to_string()));
            for (prefix, terms) in [("A", &sip.a), ("B", &sip.b)] {
                for t in terms.iter() {
                    out.push((format!("{}_{}_{}", prefix, t.p, t.q), format!("{:.12E}", t.value)));
                }
            }
            out.push(("AP_ORDER".to_string(), sip.order.to_string()));
            out.push(("BP_ORDER".to_string(), sip.order.to_string()));
            for (prefix, terms) in [("AP", &sip.ap), ("BP", &sip.bp)] {
                for t in terms.iter() {
                    out.push((format!("{}_{}_{}", prefix, t.p, t.q), format!("{:.12E}", t.value)));
                }
            }
        }

        out
    }
}

/// Affine pixel-to-sky coefficients `(A, B, C, D, E, F)` such that
/// `ra = A*x + B*y + E` and `dec = C*x + D*y + F`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Affine {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

/// Fit a WCS to at least three pixel/sky correspondences
///
/// `width` and `height` place the reference pixel at the image center.
/// When `sip_order` is two or more, forward and inverse SIP distortion
/// polynomials of that order are fitted to the affine residuals.
pub fn fit_wcs(
    matches: &[Match],
    width: usize,
    height: usize,
    sip_order: Option<usize>,
) -> Result<Wcs> {
    if matches.len() < 3 {
        return Err(SolveError::InsufficientMatches(matches.len()));
    }

    let affine = fit_affine(matches)?;

    let crpix1 = width as f64 / 2.0;
    let crpix2 = height as f64 / 2.0;
    let crval1 = (affine.a * crpix1 + affine.b * crpix2 + affine.e).rem_euclid(360.0);
    let crval2 = affine.c * crpix1 + affine.d * crpix2 + affine.f;

    let mut wcs = Wcs {
        crpix1,
        crpix2,
        crval1,
        crval2,
        ctype1: "RA---TAN".to_string(),
        ctype2: "DEC--TAN".to_string(),
        cunit1: "deg".to_string(),
        cunit2: "deg".to_string(),
        cdelt1: -(affine.a * affine.a + affine.c * affine.c).sqrt(),
        cdelt2: (affine.b * affine.b + affine.d * affine.d).sqrt(),
        cd1_1: affine.a,
        cd1_2: affine.b,
        cd2_1: affine.c,
        cd2_2: affine.d,
        e: affine.e,
        f: affine.f,
        sip: None,
    };

    if let Some(order) = sip_order {
        if order >= 2 {
            wcs.sip = Some(fit_sip(matches, &wcs, order)?);
            wcs.ctype1 = "RA---TAN-SIP".to_string();
            wcs.ctype2 = "DEC--TAN-SIP".to_string();
        }
    }

    Ok(wcs)
}

fn fit_affine(matches: &[Match]) -> Result<Affine> {
    let n = matches.len();

    // Each correspondence contributes one RA row and one Dec row.
    let mut design = Matrix::new(2 * n, 6)?;
    let mut target = Matrix::new(2 * n, 1)?;
    for (i, m) in matches.iter().enumerate() {
        design.set(2 * i, 0, m.star.x)?;
        design.set(2 * i, 1, m.star.y)?;
        design.set(2 * i, 2, 1.0)?;
        target.set(2 * i, 0, m.source.position.ra)?;

        design.set(2 * i + 1, 3, m.star.x)?;
        design.set(2 * i + 1, 4, m.star.y)?;
        design.set(2 * i + 1, 5, 1.0)?;
        target.set(2 * i + 1, 0, m.source.position.dec)?;
    }

    let p = solve_normal_equations(&design, &target)?;
    let affine = Affine {
        a: p[0],
        b: p[1],
        e: p[2],
        c: p[3],
        d: p[4],
        f: p[5],
    };

    if !p.iter().all(|v| v.is_finite()) {
        return Err(SolveError::FitUnstable);
    }
    Ok(affine)
}

fn fit_sip(matches: &[Match], wcs: &Wcs, order: usize) -> Result<Sip> {
    let det = wcs.cd1_1 * wcs.cd2_2 - wcs.cd1_2 * wcs.cd2_1;
    if det == 0.0 {
        return Err(SolveError::FitSingular);
    }

    let terms = polynomial_terms(order);
    let n = matches.len();

    // Forward fit: affine sky residuals mapped back through the inverse CD
    // matrix, as polynomials in CRPIX-relative pixel offsets.
    let mut design = Matrix::new(n, terms.len())?;
    let mut res_u = Matrix::new(n, 1)?;
    let mut res_v = Matrix::new(n, 1)?;
    // Inverse fit: pixel residuals as polynomials in the CD-inverse-mapped
    // world offsets.
    let mut inv_design = Matrix::new(n, terms.len())?;
    let mut inv_res_u = Matrix::new(n, 1)?;
    let mut inv_res_v = Matrix::new(n, 1)?;

    for (i, m) in matches.iter().enumerate() {
        let dx = m.star.x - wcs.crpix1;
        let dy = m.star.y - wcs.crpix2;

        let ra_pred = wcs.cd1_1 * dx + wcs.cd1_2 * dy + wcs.crval1;
        let dec_pred = wcs.cd2_1 * dx + wcs.cd2_2 * dy + wcs.crval2;
        let dra = (m.source.position.ra - ra_pred + 180.0).rem_euclid(360.0) - 180.0;
        let ddec = m.source.position.dec - dec_pred;

        // Degree residuals in pixel-equivalent units.
        let ru = (wcs.cd2_2 * dra - wcs.cd1_2 * ddec) / det;
        let rv = (-wcs.cd2_1 * dra + wcs.cd1_1 * ddec) / det;
        res_u.set(i, 0, ru)?;
        res_v.set(i, 0, rv)?;
        for (j, &(p, q)) in terms.iter().enumerate() {
            design.set(i, j, dx.powi(p as i32) * dy.powi(q as i32))?;
        }

        // Intermediate world offsets of the true sky position.
        let tra = (m.source.position.ra - wcs.crval1 + 180.0).rem_euclid(360.0) - 180.0;
        let tdec = m.source.position.dec - wcs.crval2;
        let u = (wcs.cd2_2 * tra - wcs.cd1_2 * tdec) / det;
        let v = (-wcs.cd2_1 * tra + wcs.cd1_1 * tdec) / det;
        inv_res_u.set(i, 0, dx - u)?;
        inv_res_v.set(i, 0, dy - v)?;
        for (j, &(p, q)) in terms.iter().enumerate() {
            inv_design.set(i, j, u.powi(p as i32) * v.powi(q as i32))?;
        }
    }

    let a = solve_sip_axis(&design, &res_u, &terms)?;
    let b = solve_sip_axis(&design, &res_v, &terms)?;
    let ap = solve_sip_axis(&inv_design, &inv_res_u, &terms)?;
    let bp = solve_sip_axis(&inv_design, &inv_res_v, &terms)?;

    Ok(Sip {
        order,
        a,
        b,
        ap,
        bp,
    })
}

fn solve_sip_axis(design: &Matrix, target: &Matrix, terms: &[(usize, usize)]) -> Result<Vec<SipTerm>> {
    let coeffs = solve_normal_equations(design, target)?;
    if !coeffs.iter().all(|v| v.is_finite()) {
        return Err(SolveError::FitUnstable);
    }

    // Constant and linear corrections are already carried by the CD matrix
    // and must not appear again in the distortion polynomial.
    Ok(terms
        .iter()
        .zip(coeffs)
        .filter(|(&(p, q), _)| p + q >= 2)
        .map(|(&(p, q), value)| SipTerm {
            p: p as u32,
            q: q as u32,
            value,
        })
        .collect())
}

/// Monomial exponents `(p, q)` with `p + q <= order`, lowest degree first
fn polynomial_terms(order: usize) -> Vec<(usize, usize)> {
    let mut terms = Vec::new();
    for degree in 0..=order {
        for p in (0..=degree).rev() {
            terms.push((p, degree - p));
        }
    }
    terms
}

fn solve_normal_equations(design: &Matrix, target: &Matrix) -> Result<Vec<f64>> {
    let transposed = design.transpose();
    let normal = transposed.multiply(design)?;
    let inverse = normal.invert().map_err(|e| match e {
        SolveError::SingularError => SolveError::FitSingular,
        other => other,
    })?;
    let solution = inverse.multiply(&transposed.multiply(target)?)?;

    let mut out = Vec::with_capacity(solution.rows());
    for r in 0..solution.rows() {
        out.push(solution.at(r, 0)?);
    }
    Ok(out)
}
