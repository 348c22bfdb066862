//! Reference star catalogs
//!
//! Every back-end answers the same radial-search contract: given a sky
//! center, a search radius in degrees, a result limit and a limiting
//! magnitude, return the matching sources. Two remote services are
//! supported (Gaia for the fully indexed stellar catalog, SIMBAD for
//! fainter objects) along with local Gaia CSV exports and a seeded
//! synthetic catalog for tests and offline work.

mod gaia;
mod simbad;
pub mod synthetic;

pub use gaia::{GaiaClient, GaiaFileCatalog};
pub use simbad::SimbadClient;
pub use synthetic::SyntheticCatalog;

use serde::{Deserialize, Serialize};

use crate::coordinates::Equatorial;
use crate::{Result, SolveError};

/// A catalog source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Catalog-assigned unique identifier
    pub uid: u64,
    /// Human-readable designation
    pub designation: String,
    /// ICRS position in degrees
    pub position: Equatorial,
    /// Proper motion in RA (mas/year), if known
    pub pm_ra: Option<f64>,
    /// Proper motion in Dec (mas/year), if known
    pub pm_dec: Option<f64>,
    /// Parallax (mas), if known
    pub parallax: Option<f64>,
    /// G-band mean flux (electron/s)
    pub flux: f64,
    /// G-band mean magnitude (lower is brighter)
    pub magnitude: f64,
}

/// Radial-search contract shared by all catalog back-ends
///
/// Back-ends are shared read-only across the solver's fan-out, hence the
/// `Sync` bound.
pub trait Catalog: Sync {
    /// Sources within `radius_deg` degrees of `center`, at most `limit` of
    /// them, all brighter than `mag_limit`
    fn radial_search(
        &self,
        center: Equatorial,
        radius_deg: f64,
        limit: usize,
        mag_limit: f64,
    ) -> Result<Vec<Source>>;
}

/// Sort sources brightest first (ascending magnitude), stable
pub fn sort_brightest_first(sources: &mut [Source]) {
    sources.sort_by(|a, b| {
        a.magnitude
            .partial_cmp(&b.magnitude)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Split a CSV response into a header row and data rows
///
/// Both TAP services and local Gaia exports use plain comma separation
/// without quoting in the columns queried here.
pub(crate) fn csv_rows(text: &str) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| SolveError::CatalogError("empty catalog response".to_string()))?;
    let headers: Vec<String> = header.split(',').map(|h| h.trim().to_string()).collect();

    let rows = lines
        .map(|line| line.split(',').map(|f| f.trim().to_string()).collect())
        .collect();
    Ok((headers, rows))
}

/// Position of a named column in a CSV header
pub(crate) fn find_column(headers: &[String], name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .ok_or_else(|| SolveError::CatalogError(format!("missing column: {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(uid: u64, mag: f64) -> Source {
        Source {
            uid,
            designation: format!("TEST {}", uid),
            position: Equatorial::normalized(10.0, 20.0),
            pm_ra: None,
            pm_dec: None,
            parallax: None,
            flux: 1000.0,
            magnitude: mag,
        }
    }

    #[test]
    fn test_sort_brightest_first() {
        let mut sources = vec![source(1, 5.0), source(2, -1.4), source(3, 2.2)];
        sort_brightest_first(&mut sources);
        let uids: Vec<u64> = sources.iter().map(|s| s.uid).collect();
        assert_eq!(uids, vec![2, 3, 1]);
    }

    #[test]
    fn test_csv_rows() {
        let text = "a,b,c\n1,2,3\n\n4,5,6\n";
        let (headers, rows) = csv_rows(text).unwrap();
        assert_eq!(headers, vec!["a", "b", "c"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["4", "5", "6"]);
    }

    #[test]
    fn test_csv_rows_empty_response() {
        assert!(csv_rows("").is_err());
    }

    #[test]
    fn test_find_column() {
        let (headers, _) = csv_rows("source_id,ra,dec\n").unwrap();
        assert_eq!(find_column(&headers, "ra").unwrap(), 1);
        assert_eq!(find_column(&headers, "DEC").unwrap(), 2);
        assert!(find_column(&headers, "pmra").is_err());
    }
}
