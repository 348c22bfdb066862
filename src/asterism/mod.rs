//! Asterisms and the quantised feature index
//!
//! An asterism is a triangle of stars used as a search fingerprint. Its
//! invariant features are quantised into a textual key so that candidate
//! catalog triangles can be found with a single hash lookup instead of a
//! linear scan; key collisions are only candidates and still have to pass
//! the tolerance comparison.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{invariant_features, InvariantFeatures};

/// Decimal places used when quantising features into bucket keys.
pub const DEFAULT_KEY_PRECISION: usize = 4;

/// A star detected on the image plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Star {
    /// Pixel centroid column
    pub x: f64,
    /// Pixel centroid row
    pub y: f64,
    /// Brightness measure, extractor-defined units
    pub intensity: f64,
    /// Optional catalog designation once identified
    pub designation: Option<String>,
}

impl Star {
    /// Create an anonymous star at a pixel position
    pub fn new(x: f64, y: f64, intensity: f64) -> Self {
        Self {
            x,
            y,
            intensity,
            designation: None,
        }
    }
}

/// A triangle of points with its invariant feature record
///
/// `indices` refer to the originating star or source list, in the
/// `(A, B, C)` vertex order the features were computed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asterism {
    pub indices: [usize; 3],
    pub features: InvariantFeatures,
}

/// Enumerate all non-degenerate triangles over a list of planar points
///
/// Triples are visited in lexicographic index order `(i < j < k)`, which
/// keeps downstream matching deterministic. Degenerate triangles are
/// silently skipped.
pub fn enumerate_asterisms(points: &[(f64, f64)]) -> Vec<Asterism> {
    let n = points.len();
    let mut out = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                if let Ok(features) = invariant_features(points[i], points[j], points[k]) {
                    out.push(Asterism {
                        indices: [i, j, k],
                        features,
                    });
                }
            }
        }
    }
    out
}

/// Quantise a feature record into a textual bucket key
///
/// Each component is formatted to `precision` decimals and joined with a
/// hyphen. The result is a pure function of `(features, precision)`.
pub fn quantize(features: &InvariantFeatures, precision: usize) -> String {
    format!(
        "{:.p$}-{:.p$}-{:.p$}-{:.p$}",
        features.ratio_ab,
        features.ratio_ac,
        features.angle_a,
        features.angle_b,
        p = precision
    )
}

/// Hash index from quantised feature keys to catalog asterisms
///
/// Built in one pass over the source asterisms and read-only afterwards.
/// Within a bucket, insertion order is preserved.
#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    precision: usize,
    buckets: HashMap<String, Vec<Asterism>>,
}

impl SourceIndex {
    /// Create an empty index with the given key precision
    pub fn new(precision: usize) -> Self {
        Self {
            precision,
            buckets: HashMap::new(),
        }
    }

    /// Build an index from a set of source asterisms
    pub fn from_asterisms(precision: usize, asterisms: impl IntoIterator<Item = Asterism>) -> Self {
        let mut index = Self::new(precision);
        for asterism in asterisms {
            index.insert(asterism);
        }
        index
    }

    /// Key precision this index was built with
    pub fn precision(&self) -> usize {
        self.precision
    }

    /// Insert one asterism under its quantised key
    pub fn insert(&mut self, asterism: Asterism) {
        let key = quantize(&asterism.features, self.precision);
        self.buckets.entry(key).or_default().push(asterism);
    }

    /// Candidate asterisms sharing the quantised key of `features`
    pub fn candidates(&self, features: &InvariantFeatures) -> &[Asterism] {
        let key = quantize(features, self.precision);
        self.buckets.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether the index holds no asterisms
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
