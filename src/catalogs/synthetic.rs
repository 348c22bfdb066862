//! Deterministic synthetic catalog
//!
//! Generates a reproducible star field around a chosen center, useful for
//! tests and for exercising the solver offline. A fixed seed always yields
//! the same sources.

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{sort_brightest_first, Catalog, Source};
use crate::coordinates::Equatorial;
use crate::Result;

/// In-memory catalog of generated or hand-built sources
#[derive(Debug, Clone)]
pub struct SyntheticCatalog {
    sources: Vec<Source>,
}

impl SyntheticCatalog {
    /// Generate `count` sources in a square window of `spread_deg` degrees
    /// half-width around `center`, with a magnitude distribution weighted
    /// toward fainter stars
    pub fn generate(seed: u64, count: usize, center: Equatorial, spread_deg: f64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let ra_dist = Uniform::from(center.ra - spread_deg..center.ra + spread_deg);
        let dec_dist = Uniform::from(center.dec - spread_deg..center.dec + spread_deg);
        let uniform = Uniform::from(0.0..1.0f64);

        // For every step in magnitude there are ~2.5x more stars.
        let min_mag = 3.0;
        let max_mag = 12.0;
        let log_base: f64 = 2.5;
        let exp_range = log_base.powf(max_mag - min_mag) - 1.0;

        let mut sources = Vec::with_capacity(count);
        for i in 0..count {
            let u = uniform.sample(&mut rng);
            let t: f64 = u * exp_range + 1.0;
            let magnitude = min_mag + t.log(log_base).clamp(0.0, max_mag - min_mag);

            let uid = 9_000_000_000_000_000_000u64.wrapping_add(i as u64);
            sources.push(Source {
                uid,
                designation: format!("SYN {}", i + 1),
                position: Equatorial::normalized(
                    ra_dist.sample(&mut rng),
                    dec_dist.sample(&mut rng),
                ),
                pm_ra: None,
                pm_dec: None,
                parallax: None,
                flux: 10.0_f64.powf(10.0 - 0.4 * magnitude),
                magnitude,
            });
        }

        Self { sources }
    }

    /// Wrap an explicit source list
    pub fn from_sources(sources: Vec<Source>) -> Self {
        Self { sources }
    }

    /// Number of sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the catalog holds no sources
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Catalog for SyntheticCatalog {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let center = Equatorial::normalized(120.0, -20.0);
        let a = SyntheticCatalog::generate(42, 100, center, 2.0);
        let b = SyntheticCatalog::generate(42, 100, center, 2.0);
        assert_eq!(a.sources, b.sources);

        let c = SyntheticCatalog::generate(43, 100, center, 2.0);
        assert_ne!(a.sources, c.sources);
    }

    #[test]
    fn test_sources_stay_near_center() {
        let center = Equatorial::normalized(120.0, -20.0);
        let catalog = SyntheticCatalog::generate(7, 200, center, 1.5);
        for s in &catalog.sources {
            assert!(center.angular_distance(&s.position) < 3.0);
        }
    }

    #[test]
    fn test_radial_search_limits() {
        let center = Equatorial::normalized(50.0, 10.0);
        let catalog = SyntheticCatalog::generate(1, 500, center, 1.0);

        let all = catalog.radial_search(center, 2.0, 500, 20.0).unwrap();
        assert!(!all.is_empty());

        let capped = catalog.radial_search(center, 2.0, 5, 20.0).unwrap();
        assert_eq!(capped.len(), 5);
        // Brightest first within the cap.
        for pair in capped.windows(2) {
            assert!(pair[0].magnitude <= pair[1].magnitude);
        }

        let bright = catalog.radial_search(center, 2.0, 500, 4.0).unwrap();
        assert!(bright.len() < all.len());
    }
}
