//! Starsolve: astrometric plate solving in Rust
//!
//! Given the pixel centroids of stars detected in an astronomical image, an
//! approximate pointing and a pixel scale, this crate recovers the precise
//! pixel-to-sky mapping (a World Coordinate System) by matching
//! scale/rotation/translation-invariant triangle features against a reference
//! star catalog.

use thiserror::Error;

pub mod asterism;
pub mod catalogs;
pub mod coordinates;
pub mod extract;
pub mod fits;
pub mod fov;
pub mod geometry;
pub mod healpix;
pub mod index;
pub mod matcher;
pub mod matrix;
pub mod solver;
pub mod wcs;

// Re-export commonly used types
pub use asterism::Star;
pub use catalogs::Source;
pub use coordinates::Equatorial;
pub use geometry::{InvariantFeatures, Tolerance};
pub use healpix::{HealPix, Scheme};
pub use matcher::{Match, MatchConfig};
pub use wcs::Wcs;

/// Main error type for the starsolve library
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("missing header: {0}")]
    MissingHeader(String),

    #[error("matrix dimension error: {0}")]
    DimError(String),

    #[error("matrix index error: {0}")]
    IndexError(String),

    #[error("matrix is singular")]
    SingularError,

    #[error("degenerate triangle: zero-length side")]
    DegenerateTriangle,

    #[error("insufficient matches: found {0}, need at least 3")]
    InsufficientMatches(usize),

    #[error("normal equations are singular")]
    FitSingular,

    #[error("fit produced non-finite coefficients")]
    FitUnstable,

    #[error("catalog error: {0}")]
    CatalogError(String),

    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for starsolve operations
pub type Result<T> = std::result::Result<T, SolveError>;
