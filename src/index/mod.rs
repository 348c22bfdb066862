//! Prebuilt asterism index
//!
//! Walks every pixel of a HEALPix pixelisation, fetches the catalog sources
//! inside it and writes the triangle asterisms of the brightest few to one
//! JSON file per pixel. An interrupted or failed build rolls back the files
//! it already wrote so no partial index is left behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::asterism::{enumerate_asterisms, quantize, DEFAULT_KEY_PRECISION};
use crate::catalogs::{Catalog, Source};
use crate::coordinates::Equatorial;
use crate::geometry::InvariantFeatures;
use crate::healpix::{HealPix, Scheme};
use crate::{Result, SolveError};

/// Default cap on sources per pixel; the brightest ones win.
const DEFAULT_SOURCE_CAP: usize = 5;
/// Result limit passed to the catalog cone query, before partition filtering.
const QUERY_LIMIT: usize = 64;

/// One serialised catalog asterism
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsterismRecord {
    /// Quantised feature key
    pub key: String,
    pub features: InvariantFeatures,
    /// Vertex source uids in `(A, B, C)` order
    pub uids: [u64; 3],
    pub positions: [Equatorial; 3],
    pub magnitudes: [f64; 3],
}

/// Contents of one per-pixel index file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelIndexFile {
    pub nside: u64,
    pub scheme: Scheme,
    pub pixel: u64,
    pub created: String,
    pub asterisms: Vec<AsterismRecord>,
}

/// Statistics of a completed build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub pixels: u64,
    pub files: usize,
    pub asterisms: usize,
}

/// Index builder for a fixed pixelisation
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    healpix: HealPix,
    out_dir: PathBuf,
    source_cap: usize,
    mag_limit: f64,
}

impl IndexBuilder {
    /// Builder writing under `out_dir/<NSide>/<pixel>.json`
    pub fn new(healpix: HealPix, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            healpix,
            out_dir: out_dir.into(),
            source_cap: DEFAULT_SOURCE_CAP,
            mag_limit: 14.0,
        }
    }

    /// Override the per-pixel cap on the brightest sources
    pub fn with_source_cap(mut self, cap: usize) -> Self {
        self.source_cap = cap;
        self
    }

    /// Override the limiting magnitude of the catalog queries
    pub fn with_mag_limit(mut self, mag_limit: f64) -> Self {
        self.mag_limit = mag_limit;
        self
    }

    /// Directory the pixel files of this resolution land in
    pub fn resolution_dir(&self) -> PathBuf {
        self.out_dir.join(self.healpix.nside().to_string())
    }

    /// Build the full per-pixel file set
    ///
    /// Checks `cancel` between pixels; when it trips, or any pixel fails,
    /// every file written so far is removed before the error is returned.
    pub fn build(&self, catalog: &dyn Catalog, cancel: Option<&AtomicBool>) -> Result<BuildSummary> {
        let dir = self.resolution_dir();
        fs::create_dir_all(&dir)?;

        let npix = self.healpix.npix();
        let mut written: Vec<PathBuf> = Vec::new();
        let mut total_asterisms = 0;

        info!(
            "building index for NSide {} ({} pixels) into {}",
            self.healpix.nside(),
            npix,
            dir.display()
        );

        for pixel in 0..npix {
            if cancel.map(|c| c.load(Ordering::SeqCst)).unwrap_or(false) {
                warn!("index build cancelled at pixel {}, rolling back", pixel);
                rollback(&written);
                return Err(SolveError::Cancelled);
            }

            match self.build_pixel(catalog, pixel) {
                Ok(file) => {
                    total_asterisms += file.asterisms.len();
                    let path = dir.join(format!("{}.json", pixel));
                    if let Err(e) = write_pixel_file(&path, &file) {
                        rollback(&written);
                        return Err(e);
                    }
                    written.push(path);
                }
                Err(e) => {
                    warn!("pixel {} failed ({}), rolling back", pixel, e);
                    rollback(&written);
                    return Err(e);
                }
            }
        }

        info!(
            "index complete: {} files, {} asterisms",
            written.len(),
            total_asterisms
        );
        Ok(BuildSummary {
            pixels: npix,
            files: written.len(),
            asterisms: total_asterisms,
        })
    }

    fn build_pixel(&self, catalog: &dyn Catalog, pixel: u64) -> Result<PixelIndexFile> {
        let center = self.healpix.pix_to_eq(pixel)?;
        let radius = self.healpix.pixel_radial_extent();

        let sources = catalog.radial_search(center, radius, QUERY_LIMIT, self.mag_limit)?;

        // The disc query overlaps neighbouring pixels; keep only sources
        // whose own pixel id matches, so every source lands in exactly one
        // file.
        let mut owned: Vec<Source> = sources
            .into_iter()
            .filter(|s| self.healpix.eq_to_pix(s.position) == pixel)
            .collect();

        if owned.len() > self.source_cap {
            // Keep the brightest few without disturbing catalog order.
            let mut by_brightness: Vec<usize> = (0..owned.len()).collect();
            by_brightness.sort_by(|&a, &b| {
                owned[a]
                    .magnitude
                    .partial_cmp(&owned[b].magnitude)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let mut keep: Vec<usize> = by_brightness[..self.source_cap].to_vec();
            keep.sort_unstable();
            owned = keep.into_iter().map(|i| owned[i].clone()).collect();
        }

        let points: Vec<(f64, f64)> = owned
            .iter()
            .map(|s| (s.position.ra, s.position.dec))
            .collect();
        let asterisms = enumerate_asterisms(&points)
            .into_iter()
            .map(|a| {
                let [i, j, k] = a.indices;
                AsterismRecord {
                    key: quantize(&a.features, DEFAULT_KEY_PRECISION),
                    features: a.features,
                    uids: [owned[i].uid, owned[j].uid, owned[k].uid],
                    positions: [
                        owned[i].position,
                        owned[j].position,
                        owned[k].position,
                    ],
                    magnitudes: [
                        owned[i].magnitude,
                        owned[j].magnitude,
                        owned[k].magnitude,
                    ],
                }
            })
            .collect();

        Ok(PixelIndexFile {
            nside: self.healpix.nside(),
            scheme: self.healpix.scheme(),
            pixel,
            created: chrono::Utc::now().format("%Y-%m-%d").to_string(),
            asterisms,
        })
    }
}

fn write_pixel_file(path: &Path, file: &PixelIndexFile) -> Result<()> {
    let text = serde_json::to_string(file)
        .map_err(|e| SolveError::InvalidInput(format!("failed to serialise index file: {}", e)))?;
    fs::write(path, text)?;
    Ok(())
}

/// Load one pixel file back
pub fn read_pixel_file<P: AsRef<Path>>(path: P) -> Result<PixelIndexFile> {
    let text = fs::read_to_string(&path)?;
    serde_json::from_str(&text).map_err(|e| {
        SolveError::InvalidInput(format!(
            "malformed index file {}: {}",
            path.as_ref().display(),
            e
        ))
    })
}

/// Best-effort removal of already-written files
fn rollback(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            warn!("rollback failed for {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogs::SyntheticCatalog;
    use std::sync::atomic::AtomicBool;

    fn dense_catalog() -> SyntheticCatalog {
        // Enough stars spread over the whole sphere that many pixels are
        // populated at NSide 2.
        let mut sources = Vec::new();
        let mut uid = 1;
        for ra_step in 0..24 {
            for dec_step in 0..12 {
                let ra = ra_step as f64 * 15.0 + (dec_step as f64) * 0.9;
                let dec = -83.0 + dec_step as f64 * 15.0 + (ra_step as f64) * 0.13;
                sources.push(crate::catalogs::Source {
                    uid,
                    designation: format!("SYN {}", uid),
                    position: Equatorial::normalized(ra, dec),
                    pm_ra: None,
                    pm_dec: None,
                    parallax: None,
                    flux: 1.0e5,
                    magnitude: 5.0 + (uid % 7) as f64,
                });
                uid += 1;
            }
        }
        SyntheticCatalog::from_sources(sources)
    }

    #[test]
    fn test_build_writes_every_pixel() {
        let dir = tempfile::tempdir().unwrap();
        let hp = HealPix::new(2, Scheme::Nested).unwrap();
        let builder = IndexBuilder::new(hp, dir.path());

        let summary = builder.build(&dense_catalog(), None).unwrap();
        assert_eq!(summary.pixels, 48);
        assert_eq!(summary.files, 48);

        for pixel in 0..48 {
            let path = builder.resolution_dir().join(format!("{}.json", pixel));
            assert!(path.exists(), "missing {}", path.display());
        }
    }

    #[test]
    fn test_pixel_files_partition_sources() {
        let dir = tempfile::tempdir().unwrap();
        let hp = HealPix::new(2, Scheme::Ring).unwrap();
        let builder = IndexBuilder::new(hp, dir.path());
        builder.build(&dense_catalog(), None).unwrap();

        let mut total = 0;
        for pixel in 0..48u64 {
            let path = builder.resolution_dir().join(format!("{}.json", pixel));
            let file = read_pixel_file(&path).unwrap();
            assert_eq!(file.pixel, pixel);
            assert_eq!(file.nside, 2);
            for record in &file.asterisms {
                total += 1;
                for pos in &record.positions {
                    assert_eq!(hp.eq_to_pix(*pos), pixel, "source leaked across pixels");
                }
            }
        }
        assert!(total > 0, "no asterisms were emitted at all");
    }

    #[test]
    fn test_source_cap_limits_asterisms() {
        let dir = tempfile::tempdir().unwrap();
        let hp = HealPix::new(2, Scheme::Ring).unwrap();
        let builder = IndexBuilder::new(hp, dir.path()).with_source_cap(3);
        builder.build(&dense_catalog(), None).unwrap();

        for pixel in 0..48u64 {
            let path = builder.resolution_dir().join(format!("{}.json", pixel));
            let file = read_pixel_file(&path).unwrap();
            // Three sources make at most one triangle.
            assert!(file.asterisms.len() <= 1);
        }
    }

    #[test]
    fn test_cancellation_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let hp = HealPix::new(2, Scheme::Nested).unwrap();
        let builder = IndexBuilder::new(hp, dir.path());

        let cancel = AtomicBool::new(true);
        match builder.build(&dense_catalog(), Some(&cancel)) {
            Err(SolveError::Cancelled) => {}
            other => panic!("expected Cancelled, got {:?}", other),
        }

        let leftovers = fs::read_dir(builder.resolution_dir())
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    struct FailingCatalog {
        after: std::sync::atomic::AtomicUsize,
    }

    impl Catalog for FailingCatalog {
        fn radial_search(
            &self,
            _center: Equatorial,
            _radius_deg: f64,
            _limit: usize,
            _mag_limit: f64,
        ) -> Result<Vec<Source>> {
            use std::sync::atomic::Ordering;
            let remaining = self.after.load(Ordering::SeqCst);
            if remaining == 0 {
                return Err(SolveError::CatalogError("backend went away".to_string()));
            }
            self.after.store(remaining - 1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_backend_failure_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let hp = HealPix::new(2, Scheme::Nested).unwrap();
        let builder = IndexBuilder::new(hp, dir.path());

        let catalog = FailingCatalog {
            after: std::sync::atomic::AtomicUsize::new(10),
        };
        match builder.build(&catalog, None) {
            Err(SolveError::CatalogError(_)) => {}
            other => panic!("expected CatalogError, got {:?}", other),
        }

        let leftovers = fs::read_dir(builder.resolution_dir())
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0, "rollback left files behind");
    }
}
