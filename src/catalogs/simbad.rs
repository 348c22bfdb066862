//! SIMBAD catalog back-end
//!
//! Covers fainter and non-stellar objects that the Gaia cone search can
//! miss. Queries the CDS TAP service synchronously and adapts the result
//! rows to the common `Source` shape.

use std::time::Duration;

use log::{debug, info};

use super::{csv_rows, find_column, Catalog, Source};
use crate::coordinates::Equatorial;
use crate::{Result, SolveError};

const SIMBAD_TAP_URL: &str = "https://simbad.cds.unistra.fr/simbad/sim-tap/sync";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Synchronous TAP client for SIMBAD
#[derive(Debug, Clone)]
pub struct SimbadClient {
    endpoint: String,
    timeout: Duration,
    connect_timeout: Duration,
}

impl Default for SimbadClient {
    fn default() -> Self {
        Self {
            endpoint: SIMBAD_TAP_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl SimbadClient {
    /// Client against the default CDS endpoint
    pub fn new() -> Self {
        Self::default()
    }

    /// Client against a custom TAP endpoint
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Override the overall request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn cone_query(center: Equatorial, radius_deg: f64, limit: usize, mag_limit: f64) -> String {
        format!(
            "SELECT TOP {} b.oid, b.main_id, b.ra, b.dec, b.pmra, b.pmdec, b.plx_value, f.G \
             FROM basic AS b JOIN allfluxes AS f ON b.oid = f.oidref \
             WHERE 1 = CONTAINS(POINT('ICRS', b.ra, b.dec), CIRCLE('ICRS', {}, {}, {})) \
             AND f.G < {} \
             ORDER BY f.G ASC",
            limit, center.ra, center.dec, radius_deg, mag_limit
        )
    }
}

impl Catalog for SimbadClient {
    fn radial_search(
        &self,
        center: Equatorial,
        radius_deg: f64,
        limit: usize,
        mag_limit: f64,
    ) -> Result<Vec<Source>> {
        let query = Self::cone_query(center, radius_deg, limit, mag_limit);
        debug!("simbad cone query: {}", query);

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| SolveError::CatalogError(format!("failed to create HTTP client: {}", e)))?;

        let response = client
            .post(&self.endpoint)
            .form(&[
                ("REQUEST", "doQuery"),
                ("LANG", "ADQL"),
                ("FORMAT", "csv"),
                ("QUERY", query.as_str()),
            ])
            .send()
            .map_err(|e| SolveError::CatalogError(format!("simbad request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SolveError::CatalogError(format!(
                "simbad request failed with status {}",
                response.status()
            )));
        }

        let body = response.text().map_err(|e| {
            SolveError::CatalogError(format!("failed to read simbad response: {}", e))
        })?;

        let sources = parse_simbad_csv(&body)?;
        info!(
            "simbad returned {} sources within {:.3} deg of ({:.4}, {:.4})",
            sources.len(),
            radius_deg,
            center.ra,
            center.dec
        );
        Ok(sources)
    }
}

fn parse_simbad_csv(text: &str) -> Result<Vec<Source>> {
    let (headers, rows) = csv_rows(text)?;

    let oid_idx = find_column(&headers, "oid")?;
    let main_id_idx = find_column(&headers, "main_id")?;
    let ra_idx = find_column(&headers, "ra")?;
    let dec_idx = find_column(&headers, "dec")?;
    let pmra_idx = find_column(&headers, "pmra")?;
    let pmdec_idx = find_column(&headers, "pmdec")?;
    let plx_idx = find_column(&headers, "plx_value")?;
    let mag_idx = find_column(&headers, "G")?;

    let mut sources = Vec::new();
    for row in rows {
        if row.len() < headers.len() {
            continue;
        }

        let uid = match row[oid_idx].parse::<u64>() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let ra = match row[ra_idx].parse::<f64>() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let dec = match row[dec_idx].parse::<f64>() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let magnitude = match row[mag_idx].parse::<f64>() {
            Ok(v) => v,
            Err(_) => continue,
        };

        sources.push(Source {
            uid,
            designation: row[main_id_idx].trim_matches('"').to_string(),
            position: Equatorial::normalized(ra, dec),
            pm_ra: row[pmra_idx].parse::<f64>().ok(),
            pm_dec: row[pmdec_idx].parse::<f64>().ok(),
            parallax: row[plx_idx].parse::<f64>().ok(),
            flux: flux_from_magnitude(magnitude),
            magnitude,
        });
    }

    Ok(sources)
}

/// Approximate G-band flux from a magnitude, for back-ends that only report
/// magnitudes
fn flux_from_magnitude(magnitude: f64) -> f64 {
    10.0_f64.powf(10.0 - 0.4 * magnitude)
}
