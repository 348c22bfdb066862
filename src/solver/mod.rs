//! Plate-solve orchestration
//!
//! Wires the pipeline together: star extraction and the catalog cone fetch
//! run as two producers joined at a barrier, their outputs feed the pattern
//! matcher, and the verified correspondences go to the WCS fitter. All
//! stages are deterministic for fixed inputs, whether the producers run
//! serially or in parallel.

use std::thread;

use log::info;

use crate::asterism::Star;
use crate::catalogs::Catalog;
use crate::coordinates::Equatorial;
use crate::extract::{extract_stars, ExtractionConfig};
use crate::fits::FitsImage;
use crate::fov;
use crate::matcher::{dedupe_matches, find_matches, Match, MatchConfig};
use crate::wcs::{fit_wcs, Wcs};
use crate::Result;

/// Solver configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SolveConfig {
    /// Pixel scale along x, degrees per pixel
    pub pixel_scale_x: f64,
    /// Pixel scale along y, degrees per pixel
    pub pixel_scale_y: f64,
    /// Matching tolerances and limits
    pub match_config: MatchConfig,
    /// Minimum pixel separation between two matched stars
    pub euclidian_distance_tolerance: f64,
    /// Star extraction parameters
    pub extraction: ExtractionConfig,
    /// Brightest image stars fed to the matcher
    pub max_stars: usize,
    /// Result limit of the catalog cone query
    pub catalog_limit: usize,
    /// Limiting magnitude of the catalog cone query
    pub mag_limit: f64,
    /// SIP distortion order, if requested
    pub sip_order: Option<usize>,
}

impl SolveConfig {
    /// Configuration for a given pixel scale, everything else defaulted
    pub fn new(pixel_scale_x: f64, pixel_scale_y: f64) -> Self {
        Self {
            pixel_scale_x,
            pixel_scale_y,
            match_config: MatchConfig::default(),
            euclidian_distance_tolerance: 10.0,
            extraction: ExtractionConfig::default(),
            max_stars: 12,
            catalog_limit: 32,
            mag_limit: 14.0,
            sip_order: None,
        }
    }
}

/// A successful solve: the correspondences used and the fitted WCS
#[derive(Debug, Clone)]
pub struct PlateSolution {
    pub matches: Vec<Match>,
    pub wcs: Wcs,
}

/// Plate solver bound to a catalog back-end
pub struct PlateSolver<'a> {
    catalog: &'a dyn Catalog,
    config: SolveConfig,
}

impl<'a> PlateSolver<'a> {
    /// Solver over the given catalog
    pub fn new(catalog: &'a dyn Catalog, config: SolveConfig) -> Self {
        Self { catalog, config }
    }

    /// Solve a decoded image around the approximate `pointing`
    ///
    /// Star extraction and the catalog fetch are independent; they fan out
    /// onto two producers and join before matching.
    pub fn solve_image(&self, image: &FitsImage, pointing: Equatorial) -> Result<PlateSolution> {
        let radius = fov::radial_extent(
            image.width,
            image.height,
            self.config.pixel_scale_x,
            self.config.pixel_scale_y,
        )?;

        let (stars, sources) = thread::scope(|scope| {
            let extractor =
                scope.spawn(|| extract_stars(&image.data, &self.config.extraction));
            let fetcher = scope.spawn(|| {
                self.catalog.radial_search(
                    pointing,
                    radius,
                    self.config.catalog_limit,
                    self.config.mag_limit,
                )
            });
            let stars = extractor.join().expect("extraction worker panicked");
            let sources = fetcher.join().expect("catalog worker panicked");
            (stars, sources)
        });
        let sources = sources?;

        let mut stars = stars;
        stars.truncate(self.config.max_stars);
        info!(
            "solving with {} stars and {} sources (radius {:.3} deg)",
            stars.len(),
            sources.len(),
            radius
        );

        self.solve_prepared(&stars, &sources, image.width, image.height, pointing)
    }

    /// Solve from already-extracted star centroids
    ///
    /// Stars are expected brightest first, as the extractor emits them.
    pub fn solve_stars(
        &self,
        stars: &[Star],
        width: usize,
        height: usize,
        pointing: Equatorial,
    ) -> Result<PlateSolution> {
        let radius = fov::radial_extent(
            width,
            height,
            self.config.pixel_scale_x,
            self.config.pixel_scale_y,
        )?;
        let sources = self.catalog.radial_search(
            pointing,
            radius,
            self.config.catalog_limit,
            self.config.mag_limit,
        )?;

        let capped = &stars[..stars.len().min(self.config.max_stars)];
        self.solve_prepared(capped, &sources, width, height, pointing)
    }

    fn solve_prepared(
        &self,
        stars: &[Star],
        sources: &[crate::catalogs::Source],
        width: usize,
        height: usize,
        pointing: Equatorial,
    ) -> Result<PlateSolution> {
        let matches = find_matches(stars, sources, pointing, &self.config.match_config);
        let matches = dedupe_matches(matches, self.config.euclidian_distance_tolerance);
        info!("{} matches after de-duplication", matches.len());

        let wcs = fit_wcs(&matches, width, height, self.config.sip_order)?;
        Ok(PlateSolution { matches, wcs })
    }
}
