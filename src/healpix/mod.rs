//! HEALPix sphere pixelisation
//!
//! Partitions the celestial sphere into `12 * NSide^2` equal-area pixels laid
//! out on rings of constant colatitude, supporting both the RING and NESTED
//! numbering schemes. The index builder uses it to enumerate catalog regions;
//! `pixels_in_disk` drives the radial region queries.
//!
//! The pixel equations follow the standard Gorski/Hivon derivation: the
//! equatorial belt (`|cos theta| <= 2/3`) is treated in the cylindrical chart
//! and the polar caps in the interrupted Collignon chart, with longitudes
//! scaled into `[0, 4)` quadrant units.

mod tables;

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::coordinates::projection::polar_offset;
use crate::coordinates::Equatorial;
use crate::{Result, SolveError};

use tables::{
    compress_bits, spread_bits, JPLL, JRLL, NB_FACEARRAY, NB_SWAPARRAY, NB_XOFFSET, NB_YOFFSET,
};

/// Pixel numbering scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scheme {
    /// Pixels numbered by increasing colatitude, then increasing RA
    Ring,
    /// Pixels numbered by recursive subdivision of the twelve base faces
    Nested,
}

impl std::str::FromStr for Scheme {
    type Err = SolveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RING" => Ok(Scheme::Ring),
            "NESTED" => Ok(Scheme::Nested),
            other => Err(SolveError::InvalidInput(format!(
                "unknown HEALPix scheme: {}",
                other
            ))),
        }
    }
}

/// Azimuth step used when sampling a disk of pixels, in degrees.
const DISK_AZIMUTH_STEP_DEG: f64 = 15.0;

/// A HEALPix pixelisation of the sphere
///
/// Immutable after construction. `nside` is forced down to the nearest power
/// of two, so `order` is always exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealPix {
    nside: i64,
    order: u32,
    scheme: Scheme,
}

impl HealPix {
    /// Create a pixelisation with the given resolution and scheme
    ///
    /// `nside` values that are not powers of two are rounded down to the
    /// nearest power of two; values below 1 are rejected.
    pub fn new(nside: u64, scheme: Scheme) -> Result<Self> {
        if nside == 0 {
            return Err(SolveError::InvalidInput(
                "NSide must be at least 1".to_string(),
            ));
        }
        // Largest power of two not exceeding the requested resolution.
        let order = 63 - nside.leading_zeros();
        Ok(Self {
            nside: 1i64 << order,
            order,
            scheme,
        })
    }

    /// Resolution parameter (always a power of two)
    pub fn nside(&self) -> u64 {
        self.nside as u64
    }

    /// Numbering scheme
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Total number of pixels, `12 * NSide^2`
    pub fn npix(&self) -> u64 {
        (12 * self.nside * self.nside) as u64
    }

    /// Area of one pixel in square degrees
    pub fn pixel_area(&self) -> f64 {
        let steradians = 4.0 * PI / self.npix() as f64;
        steradians * (180.0 / PI) * (180.0 / PI)
    }

    /// Radius in degrees of a polar disc with the same area as one pixel
    pub fn pixel_radial_extent(&self) -> f64 {
        // Cap area 2*pi*(1 - cos r) equated to the pixel area in steradians.
        let area = 4.0 * PI / self.npix() as f64;
        (1.0 - area / (2.0 * PI)).acos().to_degrees()
    }

    /// Map an equatorial coordinate to its pixel id in the configured scheme
    pub fn eq_to_pix(&self, coord: Equatorial) -> u64 {
        // Colatitude convention: z = cos(theta) = sin(dec), with theta
        // clamped to [0, pi] and phi wrapped into [0, 2*pi).
        let z = coord.dec_radians().sin().clamp(-1.0, 1.0);
        let sth = coord.dec_radians().cos().abs();
        let phi = coord.ra_radians().rem_euclid(2.0 * PI);

        let pix = match self.scheme {
            Scheme::Ring => self.ang2pix_ring(z, sth, phi),
            Scheme::Nested => self.ang2pix_nest(z, sth, phi),
        };
        pix as u64
    }

    /// Center of the pixel `idx` as an equatorial coordinate
    pub fn pix_to_eq(&self, idx: u64) -> Result<Equatorial> {
        self.check_pixel(idx)?;
        let (z, phi) = match self.scheme {
            Scheme::Ring => self.pix2ang_ring(idx as i64),
            Scheme::Nested => self.pix2ang_nest(idx as i64),
        };
        let dec = z.clamp(-1.0, 1.0).asin().to_degrees();
        Ok(Equatorial::normalized(phi.to_degrees(), dec))
    }

    /// Decompose a pixel id into `(face, ix, iy)` coordinates
    pub fn face_xy(&self, idx: u64) -> Result<(u64, u64, u64)> {
        self.check_pixel(idx)?;
        let (ix, iy, face) = match self.scheme {
            Scheme::Ring => self.ring2xyf(idx as i64),
            Scheme::Nested => self.nest2xyf(idx as i64),
        };
        Ok((face as u64, ix as u64, iy as u64))
    }

    /// Recompose a pixel id from `(face, ix, iy)` coordinates
    pub fn pix_from_face_xy(&self, face: u64, ix: u64, iy: u64) -> Result<u64> {
        if face >= 12 || ix >= self.nside as u64 || iy >= self.nside as u64 {
            return Err(SolveError::InvalidInput(format!(
                "face/xy ({}, {}, {}) out of range for NSide {}",
                face, ix, iy, self.nside
            )));
        }
        let pix = match self.scheme {
            Scheme::Ring => self.xyf2ring(ix as i64, iy as i64, face as i64),
            Scheme::Nested => self.xyf2nest(ix as i64, iy as i64, face as i64),
        };
        Ok(pix as u64)
    }

    /// Pixel ids adjacent to `idx`
    ///
    /// Interior pixels have eight neighbours; the eight pixels touching the
    /// cut corners of the polar faces have seven.
    pub fn neighbors(&self, idx: u64) -> Result<Vec<u64>> {
        self.check_pixel(idx)?;
        let (ix, iy, face) = match self.scheme {
            Scheme::Ring => self.ring2xyf(idx as i64),
            Scheme::Nested => self.nest2xyf(idx as i64),
        };

        let nside = self.nside;
        let mut out = Vec::with_capacity(8);
        let mut push = |pix: i64| {
            let pix = pix as u64;
            if pix != idx && !out.contains(&pix) {
                out.push(pix);
            }
        };

        if ix > 0 && ix < nside - 1 && iy > 0 && iy < nside - 1 {
            // Interior of a face: all eight neighbours share the face.
            for dir in 0..8 {
                let x = ix + NB_XOFFSET[dir];
                let y = iy + NB_YOFFSET[dir];
                push(self.xyf2scheme(x, y, face));
            }
        } else {
            for dir in 0..8 {
                let mut x = ix + NB_XOFFSET[dir];
                let mut y = iy + NB_YOFFSET[dir];
                let mut overflow = 4usize;
                if x < 0 {
                    x += nside;
                    overflow -= 1;
                } else if x >= nside {
                    x -= nside;
                    overflow += 1;
                }
                if y < 0 {
                    y += nside;
                    overflow -= 3;
                } else if y >= nside {
                    y -= nside;
                    overflow += 3;
                }

                let nbr_face = NB_FACEARRAY[overflow][face as usize];
                if nbr_face < 0 {
                    // Stepped across a cut corner; no pixel there.
                    continue;
                }
                let bits = NB_SWAPARRAY[overflow][(face >> 2) as usize];
                if bits & 1 != 0 {
                    x = nside - x - 1;
                }
                if bits & 2 != 0 {
                    y = nside - y - 1;
                }
                if bits & 4 != 0 {
                    std::mem::swap(&mut x, &mut y);
                }
                push(self.xyf2scheme(x, y, nbr_face));
            }
        }

        Ok(out)
    }

    /// Unique pixel ids intersecting the polar disc of `radius_deg` degrees
    /// around `center`, in first-encounter order
    ///
    /// The disc is sampled along concentric rings from the inside out, each
    /// ring swept in azimuth steps starting at north and turning east, with
    /// the disc center itself sampled last.
    pub fn pixels_in_disk(&self, center: Equatorial, radius_deg: f64) -> Vec<u64> {
        let steps = (10.0 * radius_deg).ceil() as usize;
        let mut out: Vec<u64> = Vec::new();
        let mut push = |pix: u64| {
            if !out.contains(&pix) {
                out.push(pix);
            }
        };

        for ring in 1..=steps {
            let radius = radius_deg * ring as f64 / steps as f64;
            let mut azimuth = 0.0;
            while azimuth < 360.0 {
                let sample = polar_offset(center, radius, azimuth);
                push(self.eq_to_pix(sample));
                azimuth += DISK_AZIMUTH_STEP_DEG;
            }
        }
        push(self.eq_to_pix(center));

        out
    }

    fn check_pixel(&self, idx: u64) -> Result<()> {
        if idx >= self.npix() {
            return Err(SolveError::InvalidInput(format!(
                "pixel {} out of range for NSide {} ({} pixels)",
                idx,
                self.nside,
                self.npix()
            )));
        }
        Ok(())
    }

    fn xyf2scheme(&self, ix: i64, iy: i64, face: i64) -> i64 {
        match self.scheme {
            Scheme::Ring => self.xyf2ring(ix, iy, face),
            Scheme::Nested => self.xyf2nest(ix, iy, face),
        }
    }

    // Forward pixel equations.

    fn ang2pix_ring(&self, z: f64, sth: f64, phi: f64) -> i64 {
        let nside = self.nside;
        let za = z.abs();
        let tt = phi * 2.0 / PI; // in [0, 4)

        if za <= 2.0 / 3.0 {
            // Equatorial belt.
            let temp1 = nside as f64 * (0.5 + tt);
            let temp2 = nside as f64 * z * 0.75;
            let jp = (temp1 - temp2) as i64;
            let jm = (temp1 + temp2) as i64;

            // Ring number counted from z = 2/3; ties round toward the
            // lower ring index.
            let ir = nside + 1 + jp - jm;
            let kshift = 1 - (ir & 1);
            let ip = ((jp + jm - nside + kshift + 1) / 2).rem_euclid(4 * nside);
            2 * nside * (nside - 1) + (ir - 1) * 4 * nside + ip
        } else {
            // Polar caps.
            let tp = tt.fract();
            let tmp = if za < 0.99 {
                nside as f64 * (3.0 * (1.0 - za)).sqrt()
            } else {
                nside as f64 * sth / ((1.0 + za) / 3.0).sqrt()
            };
            let jp = (tp * tmp) as i64;
            let jm = ((1.0 - tp) * tmp) as i64;

            let ir = jp + jm + 1;
            let ip = ((tt * ir as f64) as i64).rem_euclid(4 * ir);
            if z > 0.0 {
                2 * ir * (ir - 1) + ip
            } else {
                12 * nside * nside - 2 * ir * (ir + 1) + ip
            }
        }
    }

    fn ang2pix_nest(&self, z: f64, sth: f64, phi: f64) -> i64 {
        let nside = self.nside;
        let za = z.abs();
        let tt = phi * 2.0 / PI;

        let (face, ix, iy);
        if za <= 2.0 / 3.0 {
            let temp1 = nside as f64 * (0.5 + tt);
            let temp2 = nside as f64 * z * 0.75;
            let jp = (temp1 - temp2) as i64;
            let jm = (temp1 + temp2) as i64;
            let ifp = jp >> self.order;
            let ifm = jm >> self.order;

            face = if ifp == ifm {
                ifp | 4
            } else if ifp < ifm {
                ifp
            } else {
                ifm + 8
            };
            ix = jm & (nside - 1);
            iy = nside - (jp & (nside - 1)) - 1;
        } else {
            let ntt = (tt as i64).min(3);
            let tp = tt - ntt as f64;
            let tmp = if za < 0.99 {
                nside as f64 * (3.0 * (1.0 - za)).sqrt()
            } else {
                nside as f64 * sth / ((1.0 + za) / 3.0).sqrt()
            };
            let jp = ((tp * tmp) as i64).min(nside - 1);
            let jm = (((1.0 - tp) * tmp) as i64).min(nside - 1);

            if z >= 0.0 {
                face = ntt;
                ix = nside - jm - 1;
                iy = nside - jp - 1;
            } else {
                face = ntt + 8;
                ix = jp;
                iy = jm;
            }
        }
        self.xyf2nest(ix, iy, face)
    }

    // Inverse pixel equations.

    fn pix2ang_ring(&self, pix: i64) -> (f64, f64) {
        let nside = self.nside;
        let ncap = 2 * nside * (nside - 1);
        let npix = 12 * nside * nside;
        let fact2 = 4.0 / npix as f64;

        if pix < ncap {
            // North polar cap.
            let iring = (1 + isqrt(1 + 2 * pix)) >> 1;
            let iphi = (pix + 1) - 2 * iring * (iring - 1);
            let z = 1.0 - (iring * iring) as f64 * fact2;
            let phi = (iphi as f64 - 0.5) * PI / (2.0 * iring as f64);
            (z, phi)
        } else if pix < npix - ncap {
            // Equatorial belt.
            let fact1 = 2.0 / (3.0 * nside as f64);
            let ip = pix - ncap;
            let iring = ip / (4 * nside) + nside;
            let iphi = ip % (4 * nside) + 1;
            let fodd = if (iring + nside) & 1 != 0 { 1.0 } else { 0.5 };
            let z = (2 * nside - iring) as f64 * fact1;
            let phi = (iphi as f64 - fodd) * PI / (2.0 * nside as f64);
            (z, phi)
        } else {
            // South polar cap.
            let ip = npix - pix;
            let iring = (1 + isqrt(2 * ip - 1)) >> 1;
            let iphi = 4 * iring + 1 - (ip - 2 * iring * (iring - 1));
            let z = -1.0 + (iring * iring) as f64 * fact2;
            let phi = (iphi as f64 - 0.5) * PI / (2.0 * iring as f64);
            (z, phi)
        }
    }

    fn pix2ang_nest(&self, pix: i64) -> (f64, f64) {
        let nside = self.nside;
        let nl4 = 4 * nside;
        let npix = 12 * nside * nside;
        let fact2 = 4.0 / npix as f64;
        let (ix, iy, face) = self.nest2xyf(pix);

        let jr = JRLL[face as usize] * nside - ix - iy - 1;
        let (nr, z, kshift);
        if jr < nside {
            nr = jr;
            z = 1.0 - (nr * nr) as f64 * fact2;
            kshift = 0;
        } else if jr > 3 * nside {
            nr = nl4 - jr;
            z = (nr * nr) as f64 * fact2 - 1.0;
            kshift = 0;
        } else {
            let fact1 = 2.0 / (3.0 * nside as f64);
            nr = nside;
            z = (2 * nside - jr) as f64 * fact1;
            kshift = (jr - nside) & 1;
        }

        let mut jp = (JPLL[face as usize] * nr + ix - iy + 1 + kshift) / 2;
        if jp > nl4 {
            jp -= nl4;
        }
        if jp < 1 {
            jp += nl4;
        }

        let phi = (jp as f64 - (kshift + 1) as f64 * 0.5) * PI / (2.0 * nr as f64);
        (z, phi)
    }

    // Conversions between pixel numbers and (face, ix, iy) coordinates.

    fn xyf2nest(&self, ix: i64, iy: i64, face: i64) -> i64 {
        (face << (2 * self.order)) + spread_bits(ix) + 2 * spread_bits(iy)
    }

    fn nest2xyf(&self, pix: i64) -> (i64, i64, i64) {
        let npface = self.nside * self.nside;
        let face = pix >> (2 * self.order);
        let rem = pix & (npface - 1);
        (compress_bits(rem), compress_bits(rem >> 1), face)
    }

    fn xyf2ring(&self, ix: i64, iy: i64, face: i64) -> i64 {
        let nside = self.nside;
        let nl4 = 4 * nside;
        let ncap = 2 * nside * (nside - 1);
        let npix = 12 * nside * nside;

        let jr = JRLL[face as usize] * nside - ix - iy - 1;
        let (nr, n_before, kshift);
        if jr < nside {
            nr = jr;
            n_before = 2 * nr * (nr - 1);
            kshift = 0;
        } else if jr > 3 * nside {
            nr = nl4 - jr;
            n_before = npix - 2 * (nr + 1) * nr;
            kshift = 0;
        } else {
            nr = nside;
            n_before = ncap + (jr - nside) * nl4;
            kshift = (jr - nside) & 1;
        }

        let mut jp = (JPLL[face as usize] * nr + ix - iy + 1 + kshift) / 2;
        if jp > nl4 {
            jp -= nl4;
        } else if jp < 1 {
            jp += nl4;
        }
        n_before + jp - 1
    }

    fn ring2xyf(&self, pix: i64) -> (i64, i64, i64) {
        let nside = self.nside;
        let ncap = 2 * nside * (nside - 1);
        let npix = 12 * nside * nside;
        let nl2 = 2 * nside;

        let (iring, iphi, kshift, nr, face);
        if pix < ncap {
            // North polar cap.
            let ir = (1 + isqrt(1 + 2 * pix)) >> 1;
            iphi = (pix + 1) - 2 * ir * (ir - 1);
            kshift = 0;
            nr = ir;
            face = (iphi - 1) / nr;
            iring = ir;
        } else if pix < npix - ncap {
            // Equatorial belt.
            let ip = pix - ncap;
            iring = ip / (4 * nside) + nside;
            iphi = ip % (4 * nside) + 1;
            kshift = (iring + nside) & 1;
            nr = nside;
            let ire = iring - nside + 1;
            let irm = nl2 + 2 - ire;
            let ifm = (iphi - ire / 2 + nside - 1) / nside;
            let ifp = (iphi - irm / 2 + nside - 1) / nside;
            face = if ifp == ifm {
                (ifp & 3) + 4
            } else if ifp < ifm {
                ifp
            } else {
                ifm + 8
            };
        } else {
            // South polar cap.
            let ip = npix - pix;
            let ir = (1 + isqrt(2 * ip - 1)) >> 1;
            iphi = 4 * ir + 1 - (ip - 2 * ir * (ir - 1));
            kshift = 0;
            nr = ir;
            face = 8 + (iphi - 1) / nr;
            iring = 2 * nl2 - ir;
        }

        let irt = iring - JRLL[face as usize] * nside + 1;
        let mut ipt = 2 * iphi - JPLL[face as usize] * nr - kshift - 1;
        if ipt >= nl2 {
            ipt -= 8 * nside;
        }
        ((ipt - irt) >> 1, (-(ipt + irt)) >> 1, face)
    }
}

/// Integer square root for pixel ring arithmetic
fn isqrt(v: i64) -> i64 {
    (v as f64 + 0.5).sqrt() as i64
}
