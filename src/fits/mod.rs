//! Minimal FITS image support
//!
//! Reads the primary HDU of simple FITS files into an `ndarray` buffer and
//! injects fitted WCS cards into a copy of the original file. Only what the
//! solver needs is implemented: two-dimensional images, the integer and
//! float BITPIX variants, and linear BSCALE/BZERO rescaling.

use std::fs;
use std::path::Path;

use log::debug;
use ndarray::Array2;

use crate::coordinates::Equatorial;
use crate::wcs::Wcs;
use crate::{Result, SolveError};

const RECORD_LEN: usize = 2880;
const CARD_LEN: usize = 80;

/// Parsed header cards of the primary HDU
#[derive(Debug, Clone, Default)]
pub struct FitsHeader {
    cards: Vec<(String, String)>,
}

impl FitsHeader {
    /// Raw value string for a keyword, if present
    pub fn get(&self, key: &str) -> Option<&str> {
        self.cards
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Numeric value for a keyword, if present and parseable
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.parse::<f64>().ok())
    }

    /// All cards in file order
    pub fn cards(&self) -> &[(String, String)] {
        &self.cards
    }
}

/// A decoded primary-HDU image with its header
#[derive(Debug, Clone)]
pub struct FitsImage {
    /// Pixel data, row-major `(height, width)`
    pub data: Array2<f32>,
    /// NAXIS1
    pub width: usize,
    /// NAXIS2
    pub height: usize,
    /// Digital range upper bound implied by BITPIX
    pub adu: f64,
    /// Header cards
    pub header: FitsHeader,
}

impl FitsImage {
    /// Read and decode the primary HDU of a FITS file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(&path)?;
        let (header, header_len) = parse_header(&bytes)?;

        if header.get("SIMPLE").map(|v| v.starts_with('T')) != Some(true) {
            return Err(SolveError::InvalidInput(format!(
                "{} is not a simple FITS file",
                path.as_ref().display()
            )));
        }

        let bitpix = header
            .get_f64("BITPIX")
            .ok_or_else(|| SolveError::MissingHeader("BITPIX".to_string()))?
            as i64;
        let naxis = header
            .get_f64("NAXIS")
            .ok_or_else(|| SolveError::MissingHeader("NAXIS".to_string()))? as i64;
        if naxis != 2 {
            return Err(SolveError::InvalidInput(format!(
                "expected a 2-axis image, got NAXIS = {}",
                naxis
            )));
        }

        let width = read_positive_axis(&header, "NAXIS1")?;
        let height = read_positive_axis(&header, "NAXIS2")?;

        let bscale = header.get_f64("BSCALE").unwrap_or(1.0);
        let bzero = header.get_f64("BZERO").unwrap_or(0.0);

        let count = width * height;
        let bytes_per_value = (bitpix.unsigned_abs() / 8) as usize;
        let data_bytes = bytes_per_value
            .checked_mul(count)
            .ok_or_else(|| SolveError::InvalidInput("image size overflow".to_string()))?;
        let raw = bytes
            .get(header_len..header_len + data_bytes)
            .ok_or_else(|| SolveError::InvalidInput("truncated FITS data section".to_string()))?;

        let mut values = Vec::with_capacity(count);
        for chunk in raw.chunks_exact(bytes_per_value) {
            let v = match bitpix {
                8 => chunk[0] as f64,
                16 => i16::from_be_bytes([chunk[0], chunk[1]]) as f64,
                32 => i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64,
                -32 => f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64,
                -64 => f64::from_be_bytes([
                    chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6],
                    chunk[7],
                ]),
                other => {
                    return Err(SolveError::InvalidInput(format!(
                        "unsupported BITPIX: {}",
                        other
                    )))
                }
            };
            values.push((bzero + bscale * v) as f32);
        }

        let data = Array2::from_shape_vec((height, width), values)
            .map_err(|e| SolveError::InvalidInput(format!("bad image shape: {}", e)))?;

        let adu = match bitpix {
            8 => 255.0,
            16 => 65535.0,
            32 => u32::MAX as f64,
            _ => 65535.0,
        };

        debug!(
            "opened {}: {}x{} BITPIX {}",
            path.as_ref().display(),
            width,
            height,
            bitpix
        );
        Ok(Self {
            data,
            width,
            height,
            adu,
            header,
        })
    }

    /// Approximate pointing from the RA/DEC header cards, degrees
    pub fn pointing(&self) -> Result<Equatorial> {
        let ra = self
            .header
            .get_f64("RA")
            .ok_or_else(|| SolveError::MissingHeader("RA".to_string()))?;
        let dec = self
            .header
            .get_f64("DEC")
            .ok_or_else(|| SolveError::MissingHeader("DEC".to_string()))?;
        if !(0.0..=360.0).contains(&ra) || !(-90.0..=90.0).contains(&dec) {
            return Err(SolveError::InvalidInput(format!(
                "header pointing ({}, {}) out of range",
                ra, dec
            )));
        }
        Ok(Equatorial::normalized(ra, dec))
    }
}

fn read_positive_axis(header: &FitsHeader, key: &str) -> Result<usize> {
    let value = header
        .get_f64(key)
        .ok_or_else(|| SolveError::MissingHeader(key.to_string()))?;
    if !value.is_finite() || value <= 0.0 || value.fract() != 0.0 {
        return Err(SolveError::InvalidInput(format!(
            "{} must be a positive integer, got {}",
            key, value
        )));
    }
    Ok(value as usize)
}

/// Parse the primary header; returns the cards and the byte length of the
/// header section including padding
fn parse_header(bytes: &[u8]) -> Result<(FitsHeader, usize)> {
    let mut cards = Vec::new();
    let mut offset = 0;

    loop {
        let record = bytes.get(offset..offset + RECORD_LEN).ok_or_else(|| {
            SolveError::InvalidInput("FITS header ended without END card".to_string())
        })?;

        for card in record.chunks_exact(CARD_LEN) {
            let key = String::from_utf8_lossy(&card[..8]).trim().to_string();
            if key == "END" {
                return Ok((FitsHeader { cards }, offset + RECORD_LEN));
            }
            if key.is_empty() || key == "COMMENT" || key == "HISTORY" {
                continue;
            }
            if &card[8..10] != b"= " {
                continue;
            }

            // Strip an inline comment, respecting quoted string values.
            let text = String::from_utf8_lossy(&card[10..]).into_owned();
            let raw = text.trim();
            let value = if let Some(rest) = raw.strip_prefix('\'') {
                match rest.find('\'') {
                    Some(end) => rest[..end].trim_end().to_string(),
                    None => rest.trim().to_string(),
                }
            } else {
                raw.split('/').next().unwrap_or("").trim().to_string()
            };
            cards.push((key, value));
        }
        offset += RECORD_LEN;
    }
}

/// Format one 80-byte header card
fn format_card(key: &str, value: &str) -> [u8; CARD_LEN] {
    let body = if value.parse::<f64>().is_ok() {
        format!("{:<8}= {:>20}", key, value)
    } else {
        format!("{:<8}= '{}'", key, value)
    };
    let mut card = [b' '; CARD_LEN];
    let copy_len = body.len().min(CARD_LEN);
    card[..copy_len].copy_from_slice(&body.as_bytes()[..copy_len]);
    card
}

/// Copy `src` to `dst` with the fitted WCS cards injected into the primary
/// header, replacing any cards those keywords already had
pub fn write_with_wcs<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q, wcs: &Wcs) -> Result<()> {
    let bytes = fs::read(&src)?;
    let (_, header_len) = parse_header(&bytes)?;

    let injected = wcs.to_key_values();
    let replaced: Vec<&str> = injected.iter().map(|(k, _)| k.as_str()).collect();

    // Keep every original card except the ones being replaced and END.
    let mut cards: Vec<[u8; CARD_LEN]> = Vec::new();
    for card in bytes[..header_len].chunks_exact(CARD_LEN) {
        let key_text = String::from_utf8_lossy(&card[..8]);
        let key = key_text.trim();
        if key == "END" || replaced.contains(&key) {
            continue;
        }
        let mut raw = [b' '; CARD_LEN];
        raw.copy_from_slice(card);
        cards.push(raw);
    }
    for (key, value) in &injected {
        cards.push(format_card(key, value));
    }
    cards.push(format_card_end());

    let mut out = Vec::with_capacity(bytes.len() + RECORD_LEN);
    for card in &cards {
        out.extend_from_slice(card);
    }
    while out.len() % RECORD_LEN != 0 {
        out.push(b' ');
    }
    out.extend_from_slice(&bytes[header_len..]);

    fs::write(&dst, out)?;
    debug!(
        "wrote {} with {} WCS cards",
        dst.as_ref().display(),
        injected.len()
    );
    Ok(())
}

fn format_card_end() -> [u8; CARD_LEN] {
    let mut card = [b' '; CARD_LEN];
    card[..3].copy_from_slice(b"END");
    card
}

/// Write the WCS record as a `key -> value` JSON side-car
pub fn write_wcs_sidecar<P: AsRef<Path>>(path: P, wcs: &Wcs) -> Result<()> {
    let mut map = serde_json::Map::new();
    for (key, value) in wcs.to_key_values() {
        map.insert(key, serde_json::Value::String(value));
    }
    let text = serde_json::to_string_pretty(&serde_json::Value::Object(map))
        .map_err(|e| SolveError::InvalidInput(format!("failed to serialise WCS: {}", e)))?;
    fs::write(path, text)?;
    Ok(())
}
