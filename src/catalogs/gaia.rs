//! Gaia DR3 catalog back-ends
//!
//! Two flavours share the parsing logic: `GaiaClient` issues synchronous
//! TAP cone searches against the ESA archive, and `GaiaFileCatalog` loads a
//! local CSV (or gzipped CSV) export once and answers radial searches from
//! memory.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

use log::{debug, info};

use super::{csv_rows, find_column, sort_brightest_first, Catalog, Source};
use crate::coordinates::Equatorial;
use crate::{Result, SolveError};

const GAIA_TAP_URL: &str = "https://gea.esac.esa.int/tap-server/tap/sync";

/// Default cap on the whole catalog request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default cap on establishing the connection, TLS included.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Synchronous TAP client for the Gaia archive
#[derive(Debug, Clone)]
pub struct GaiaClient {
    endpoint: String,
    timeout: Duration,
    connect_timeout: Duration,
}

impl Default for GaiaClient {
    fn default() -> Self {
        Self {
            endpoint: GAIA_TAP_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl GaiaClient {
    /// Client against the default ESA archive endpoint
    pub fn new() -> Self {
        Self::default()
    }

    /// Client against a custom TAP endpoint (mirrors, test servers)
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
            "SELECT TOP {} source_id, designation, ra, dec, pmra, pmdec, parallax, \
             phot_g_mean_flux, phot_g_mean_mag \
             FROM gaiadr3.gaia_source \
             WHERE 1 = CONTAINS(POINT('ICRS', ra, dec), CIRCLE('ICRS', {}, {}, {})) \
             AND phot_g_mean_mag < {} \
             ORDER BY phot_g_mean_mag ASC",
            limit, center.ra, center.dec, radius_deg, mag_limit
        )
    }
}

impl Catalog for GaiaClient {
    fn radial_search(
        &self,
        center: Equatorial,
        radius_deg: f64,
        limit: usize,
        mag_limit: f64,
    ) -> Result<Vec<Source>> {
        let query = Self::cone_query(center, radius_deg, limit, mag_limit);
        debug!("gaia cone query: {}", query);

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
            .map_err(|e| SolveError::CatalogError(format!("gaia request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SolveError::CatalogError(format!(
                "gaia request failed with status {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .map_err(|e| SolveError::CatalogError(format!("failed to read gaia response: {}", e)))?;

        let sources = parse_gaia_csv(&body)?;
        info!(
            "gaia returned {} sources within {:.3} deg of ({:.4}, {:.4})",
            sources.len(),
            radius_deg,
            center.ra,
            center.dec
        );
        Ok(sources)
    }
}

/// Parse a Gaia CSV table (TAP response or archive export) into sources
fn parse_gaia_csv(text: &str) -> Result<Vec<Source>> {
    let (headers, rows) = csv_rows(text)?;

    let source_id_idx = find_column(&headers, "source_id")?;
    let designation_idx = find_column(&headers, "designation").ok();
    let ra_idx = find_column(&headers, "ra")?;
    let dec_idx = find_column(&headers, "dec")?;
    let pmra_idx = find_column(&headers, "pmra")?;
    let pmdec_idx = find_column(&headers, "pmdec")?;
    let parallax_idx = find_column(&headers, "parallax")?;
    let flux_idx = find_column(&headers, "phot_g_mean_flux")?;
    let mag_idx = find_column(&headers, "phot_g_mean_mag")?;

    let mut sources = Vec::new();
    for row in rows {
        if row.len() < headers.len() {
            continue; // Skip rows with insufficient columns
        }

        // Rows with unparseable required fields are skipped; masked values
        // in optional columns become None.
        let uid = match row[source_id_idx].parse::<u64>() {
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
        let flux = row[flux_idx].parse::<f64>().unwrap_or(0.0);

        let designation = designation_idx
            .map(|i| row[i].trim_matches('"').to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| format!("Gaia DR3 {}", uid));

        sources.push(Source {
            uid,
            designation,
            position: Equatorial::normalized(ra, dec),
            pm_ra: row[pmra_idx].parse::<f64>().ok(),
            pm_dec: row[pmdec_idx].parse::<f64>().ok(),
            parallax: row[parallax_idx].parse::<f64>().ok(),
            flux,
            magnitude,
        });
    }

    Ok(sources)
}

/// Gaia catalog loaded from a local CSV or gzipped CSV export
#[derive(Debug, Clone)]
pub struct GaiaFileCatalog {
    sources: Vec<Source>,
    mag_limit: f64,
}

impl GaiaFileCatalog {
    /// Load an export file, keeping sources brighter than `mag_limit`
    pub fn from_file<P: AsRef<Path>>(path: P, mag_limit: f64) -> Result<Self> {
        let file = File::open(&path)?;
        if file.metadata()?.len() == 0 {
            return Err(SolveError::CatalogError(format!(
                "gaia export {} is empty",
                path.as_ref().display()
            )));
        }

        let is_gzipped = path
            .as_ref()
            .extension()
            .map(|e| e.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);

        let mut text = String::new();
        if is_gzipped {
            debug!("loading gzipped gaia export: {}", path.as_ref().display());
            let mut decoder = flate2::read::GzDecoder::new(BufReader::new(file));
            decoder.read_to_string(&mut text).map_err(|e| {
                SolveError::CatalogError(format!("failed to decompress gaia export: {}", e))
            })?;
        } else {
            debug!("loading gaia export: {}", path.as_ref().display());
            BufReader::new(file).read_to_string(&mut text)?;
        }

        let mut sources = parse_gaia_csv(&text)?;
        sources.retain(|s| s.magnitude <= mag_limit);
        if sources.is_empty() {
            return Err(SolveError::CatalogError(format!(
                "no sources brighter than {} in {}",
                mag_limit,
                path.as_ref().display()
            )));
        }

        info!(
            "loaded {} gaia sources from {}",
            sources.len(),
            path.as_ref().display()
        );
        Ok(Self { sources, mag_limit })
    }

    /// Magnitude limit applied when the file was loaded
    pub fn mag_limit(&self) -> f64 {
        self.mag_limit
    }

    /// Total number of loaded sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the catalog holds no sources
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Catalog for GaiaFileCatalog {
    fn radial_search(
        &self,
        center: Equatorial,
        radius_deg: f64,
        limit: usize,
        mag_limit: f64,
    ) -> Result<Vec<Source>> {
        let mut hits: Vec<Source> = self
            .sources
            .iter()
            .filter(|s| s.magnitude <= mag_limit)
            .filter(|s| center.angular_distance(&s.position) <= radius_deg)
            .cloned()
            .collect();
        sort_brightest_first(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }
}
