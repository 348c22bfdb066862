//! Invariant-feature pattern matcher
//!
//! Correlates triangles of image stars against triangles of catalog sources.
//! Image-side features live in the pixel plane and source-side features in
//! the sky plane; because the features are similarity invariants, a bucket
//! lookup on the quantised key narrows the candidates, and a gnomonic
//! re-projection around the approximate pointing verifies each survivor
//! before any correspondence is emitted.
//!
//! Matching is deterministic for fixed inputs: image asterisms are visited
//! in enumeration order (callers pass stars brightest first), buckets keep
//! insertion order, and the first passing vertex permutation wins.

use std::collections::HashMap;
use std::thread;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::asterism::{enumerate_asterisms, SourceIndex, Star, DEFAULT_KEY_PRECISION};
use crate::catalogs::Source;
use crate::coordinates::projection::gnomonic;
use crate::coordinates::Equatorial;
use crate::geometry::{compare_features, invariant_features, Tolerance};

/// Vertex assignments tried when verifying a candidate pair.
const PERMUTATIONS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

/// A verified pixel/sky correspondence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub star: Star,
    pub source: Source,
}

/// Matcher configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchConfig {
    /// Feature comparison tolerances used during verification
    pub tolerance: Tolerance,
    /// Stop once this many correspondences have been collected
    pub max_matches: usize,
    /// Decimal places of the quantised bucket key
    pub key_precision: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::default(),
            max_matches: 32,
            key_precision: DEFAULT_KEY_PRECISION,
        }
    }
}

/// Match image stars to catalog sources around an approximate pointing
///
/// Returns an empty list when nothing correlates. Stars are consumed in the
/// given order; each star is assigned at most one source, first assignment
/// wins.
pub fn find_matches(
    stars: &[Star],
    sources: &[Source],
    pointing: Equatorial,
    config: &MatchConfig,
) -> Vec<Match> {
    let star_points: Vec<(f64, f64)> = stars.iter().map(|s| (s.x, s.y)).collect();
    // Sky-plane coordinates treated as cartesian; the gnomonic verification
    // below absorbs the chart distortion.
    let source_points: Vec<(f64, f64)> = sources
        .iter()
        .map(|s| (s.position.ra, s.position.dec))
        .collect();

    // The two enumerations are independent; fan out and join before lookup.
    let (star_asterisms, source_asterisms) = thread::scope(|scope| {
        let image_side = scope.spawn(|| enumerate_asterisms(&star_points));
        let catalog_side = scope.spawn(|| enumerate_asterisms(&source_points));
        (
            image_side.join().expect("image asterism worker panicked"),
            catalog_side.join().expect("source asterism worker panicked"),
        )
    });
    debug!(
        "enumerated {} image and {} source asterisms",
        star_asterisms.len(),
        source_asterisms.len()
    );

    let index = SourceIndex::from_asterisms(config.key_precision, source_asterisms);

    let mut matches: Vec<Match> = Vec::new();
    let mut assigned: HashMap<usize, u64> = HashMap::new();

    'outer: for image_asterism in &star_asterisms {
        for candidate in index.candidates(&image_asterism.features) {
            let verified = PERMUTATIONS.iter().find(|perm| {
                let projected: Vec<(f64, f64)> = perm
                    .iter()
                    .map(|&v| {
                        let src = &sources[candidate.indices[v]];
                        gnomonic(src.position, pointing)
                    })
                    .collect();
                match invariant_features(projected[0], projected[1], projected[2]) {
                    Ok(features) => {
                        compare_features(&image_asterism.features, &features, config.tolerance)
                    }
                    Err(_) => false,
                }
            });

            if let Some(perm) = verified {
                for (slot, &v) in perm.iter().enumerate() {
                    let star_idx = image_asterism.indices[slot];
                    let source = &sources[candidate.indices[v]];
                    if assigned.contains_key(&star_idx) {
                        continue;
                    }
                    assigned.insert(star_idx, source.uid);

                    let mut star = stars[star_idx].clone();
                    star.designation = Some(source.designation.clone());
                    matches.push(Match {
                        star,
                        source: source.clone(),
                    });

                    if matches.len() >= config.max_matches {
                        break 'outer;
                    }
                }
                // First verified candidate settles this image asterism.
                continue 'outer;
            }
        }
    }

    info!(
        "matched {} of {} image stars against {} sources",
        matches.len(),
        stars.len(),
        sources.len()
    );
    matches
}

/// Drop matches whose star centroid sits within `distance_px` of an earlier
/// match, keeping first occurrence
///
/// Guards the fit against blended detections being assigned twice.
pub fn dedupe_matches(matches: Vec<Match>, distance_px: f64) -> Vec<Match> {
    let mut kept: Vec<Match> = Vec::with_capacity(matches.len());
    for m in matches {
        let close = kept.iter().any(|k| {
            crate::geometry::distance(k.star.x, k.star.y, m.star.x, m.star.y) < distance_px
        });
        if !close {
            kept.push(m);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a star field whose pixel plane is an exact similarity image of
    /// the sources' (ra, dec) chart, so the quantised keys line up.
    fn field(center: Equatorial, offsets: &[(f64, f64)], scale: f64) -> (Vec<Star>, Vec<Source>) {
        let mut stars = Vec::new();
        let mut sources = Vec::new();
        for (i, (dra, ddec)) in offsets.iter().enumerate() {
            stars.push(Star::new(dra / scale + 500.0, ddec / scale + 500.0, 1000.0 - i as f64));
            sources.push(Source {
                uid: i as u64 + 1,
                designation: format!("SYN {}", i + 1),
                position: Equatorial::normalized(center.ra + dra, center.dec + ddec),
                pm_ra: None,
                pm_dec: None,
                parallax: None,
                flux: 1.0e6,
                magnitude: i as f64,
            });
        }
        (stars, sources)
    }

    fn test_offsets() -> Vec<(f64, f64)> {
        vec![
            (0.00, 0.00),
            (0.30, 0.04),
            (0.07, 0.25),
            (-0.21, 0.11),
            (-0.10, -0.28),
            (0.17, -0.15),
        ]
    }

    #[test]
    fn test_matches_identity_field() {
        let center = Equatorial::normalized(180.0, 0.0);
        let (stars, sources) = field(center, &test_offsets(), 0.001);

        let config = MatchConfig {
            tolerance: Tolerance {
                length_ratio: 0.025,
                angle_deg: 0.5,
            },
            ..MatchConfig::default()
        };
        let matches = find_matches(&stars, &sources, center, &config);

        assert!(matches.len() >= 3, "got {} matches", matches.len());
        // Every correspondence pairs a star with its generating source.
        for m in &matches {
            let idx = m.source.uid as usize - 1;
            let expected = &stars[idx];
            assert_eq!(m.star.x, expected.x);
            assert_eq!(m.star.y, expected.y);
            assert_eq!(m.star.designation.as_deref(), Some(m.source.designation.as_str()));
        }
    }

    #[test]
    fn test_no_overlap_returns_empty() {
        let center = Equatorial::normalized(180.0, 0.0);
        let (stars, _) = field(center, &test_offsets(), 0.001);
        // A catalog with unrelated geometry shares no quantised keys.
        let (_, sources) = field(
            center,
            &[(0.0, 0.0), (0.4, 0.01), (0.39, 0.02), (0.11, 0.33)],
            0.001,
        );

        let matches = find_matches(&stars, &sources, center, &MatchConfig::default());
        assert!(matches.is_empty());
    }

    #[test]
    fn test_too_few_stars_returns_empty() {
        let center = Equatorial::normalized(180.0, 0.0);
        let (stars, sources) = field(center, &test_offsets(), 0.001);
        let matches = find_matches(&stars[..2], &sources, center, &MatchConfig::default());
        assert!(matches.is_empty());
    }

    #[test]
    fn test_max_matches_caps_output() {
        let center = Equatorial::normalized(180.0, 0.0);
        let (stars, sources) = field(center, &test_offsets(), 0.001);

        let config = MatchConfig {
            tolerance: Tolerance {
                length_ratio: 0.025,
                angle_deg: 0.5,
            },
            max_matches: 3,
            ..MatchConfig::default()
        };
        let matches = find_matches(&stars, &sources, center, &config);
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn test_each_star_assigned_once() {
        let center = Equatorial::normalized(180.0, 0.0);
        let (stars, sources) = field(center, &test_offsets(), 0.001);

        let config = MatchConfig {
            tolerance: Tolerance {
                length_ratio: 0.025,
                angle_deg: 0.5,
            },
            ..MatchConfig::default()
        };
        let matches = find_matches(&stars, &sources, center, &config);

        let mut seen: Vec<(u64, u64)> = matches
            .iter()
            .map(|m| (m.star.x.to_bits(), m.source.uid))
            .collect();
        seen.sort_unstable();
        let before = seen.len();
        seen.dedup_by_key(|pair| pair.0);
        assert_eq!(before, seen.len(), "a star was matched twice");
    }

    #[test]
    fn test_dedupe_matches_by_distance() {
        let center = Equatorial::normalized(180.0, 0.0);
        let (stars, sources) = field(center, &test_offsets(), 0.001);
        let mut matches: Vec<Match> = stars
            .iter()
            .zip(&sources)
            .map(|(star, source)| Match {
                star: star.clone(),
                source: source.clone(),
            })
            .collect();
        // A blended duplicate 2 px from the first star.
        let mut blended = matches[0].clone();
        blended.star.x += 2.0;
        matches.push(blended);

        let kept = dedupe_matches(matches, 10.0);
        assert_eq!(kept.len(), stars.len());
    }

    #[test]
    fn test_matching_is_deterministic() {
        let center = Equatorial::normalized(180.0, 0.0);
        let (stars, sources) = field(center, &test_offsets(), 0.001);

        let config = MatchConfig {
            tolerance: Tolerance {
                length_ratio: 0.025,
                angle_deg: 0.5,
            },
            ..MatchConfig::default()
        };
        let first = find_matches(&stars, &sources, center, &config);
        let second = find_matches(&stars, &sources, center, &config);
        assert_eq!(first, second);
    }
}
