//! End-to-end plate solving against a synthetic sky
//!
//! A star field is generated from a known pixel-to-sky mapping, pushed
//! through the full pipeline (extraction where applicable, matching,
//! fitting) and the recovered WCS is checked against the generating truth.

use ndarray::Array2;

use starsolve::catalogs::{Source, SyntheticCatalog};
use starsolve::coordinates::Equatorial;
use starsolve::geometry::Tolerance;
use starsolve::solver::{PlateSolver, SolveConfig};
use starsolve::Star;

/// Degrees per pixel of the synthetic mapping.
const SCALE: f64 = 0.001;
const WIDTH: usize = 1000;
const HEIGHT: usize = 1000;

/// Truth anchored so that pixel (578.23, 485.62) lands on (98.6467, 2.5375).
const TRUE_RA: f64 = 98.6467;
const TRUE_DEC: f64 = 2.5375;
const PROBE_X: f64 = 578.23;
const PROBE_Y: f64 = 485.62;

fn ra0() -> f64 {
    TRUE_RA - SCALE * PROBE_X
}

fn dec0() -> f64 {
    TRUE_DEC - SCALE * PROBE_Y
}

/// Sky position of a pixel under the generating map.
fn sky_of(x: f64, y: f64) -> Equatorial {
    Equatorial::normalized(ra0() + SCALE * x, dec0() + SCALE * y)
}

/// Integer star pixels, pairwise well separated and away from the borders.
fn star_pixels() -> Vec<(usize, usize)> {
    vec![
        (120, 640),
        (305, 223),
        (512, 512),
        (700, 830),
        (850, 150),
        (430, 905),
        (95, 90),
        (644, 402),
    ]
}

fn scene() -> (Vec<Star>, SyntheticCatalog, Equatorial) {
    let mut stars = Vec::new();
    let mut sources = Vec::new();
    for (i, &(x, y)) in star_pixels().iter().enumerate() {
        stars.push(Star::new(x as f64, y as f64, 20000.0 - i as f64 * 1000.0));
        sources.push(Source {
            uid: i as u64 + 1,
            designation: format!("SYN {}", i + 1),
            position: sky_of(x as f64, y as f64),
            pm_ra: None,
            pm_dec: None,
            parallax: None,
            flux: 1.0e6,
            magnitude: 4.0 + i as f64 * 0.5,
        });
    }
    let pointing = sky_of(WIDTH as f64 / 2.0, HEIGHT as f64 / 2.0);
    (stars, SyntheticCatalog::from_sources(sources), pointing)
}

fn solve_config() -> SolveConfig {
    let mut config = SolveConfig::new(SCALE, SCALE);
    config.match_config.tolerance = Tolerance {
        length_ratio: 0.025,
        angle_deg: 0.5,
    };
    config
}

#[test]
fn solve_from_centroids_recovers_known_position() {
    let (stars, catalog, pointing) = scene();
    let solver = PlateSolver::new(&catalog, solve_config());

    let solution = solver.solve_stars(&stars, WIDTH, HEIGHT, pointing).unwrap();
    assert!(solution.matches.len() >= 3);

    let (ra, dec) = solution.wcs.forward(PROBE_X, PROBE_Y);
    assert!(
        (ra - TRUE_RA).abs() < 0.001,
        "RA off: {} vs {}",
        ra,
        TRUE_RA
    );
    assert!(
        (dec - TRUE_DEC).abs() < 0.001,
        "Dec off: {} vs {}",
        dec,
        TRUE_DEC
    );
}

#[test]
fn solved_wcs_round_trips_the_probe_pixel() {
    let (stars, catalog, pointing) = scene();
    let solver = PlateSolver::new(&catalog, solve_config());
    let solution = solver.solve_stars(&stars, WIDTH, HEIGHT, pointing).unwrap();

    let (ra, dec) = solution.wcs.forward(PROBE_X, PROBE_Y);
    let (x, y) = solution.wcs.inverse(ra, dec);
    assert!((x - PROBE_X).abs() < 1e-7);
    assert!((y - PROBE_Y).abs() < 1e-7);
}

#[test]
fn solve_tolerates_imperfect_pointing() {
    let (stars, catalog, pointing) = scene();
    let solver = PlateSolver::new(&catalog, solve_config());

    // A pointing off by a tenth of a degree still has to solve.
    let rough = Equatorial::normalized(pointing.ra + 0.1, pointing.dec - 0.08);
    let solution = solver.solve_stars(&stars, WIDTH, HEIGHT, rough).unwrap();
    let (ra, dec) = solution.wcs.forward(PROBE_X, PROBE_Y);
    assert!((ra - TRUE_RA).abs() < 0.001);
    assert!((dec - TRUE_DEC).abs() < 0.001);
}

#[test]
fn solve_from_pixels_via_extraction() {
    let (_, catalog, pointing) = scene();

    // Render the same field as an image: flat background plus symmetric
    // integer-valued Gaussian stamps, so centroids land exactly on the
    // generating pixels.
    let mut data = Array2::from_elem((HEIGHT, WIDTH), 100.0f32);
    for (i, &(x, y)) in star_pixels().iter().enumerate() {
        let peak = 20000.0 - i as f64 * 1000.0;
        for dy in -5i64..=5 {
            for dx in -5i64..=5 {
                let r = y as i64 + dy;
                let c = x as i64 + dx;
                let d2 = (dx * dx + dy * dy) as f64;
                data[[r as usize, c as usize]] += (peak * (-d2 / 8.0).exp()).round() as f32;
            }
        }
    }

    let image = starsolve::fits::FitsImage {
        data,
        width: WIDTH,
        height: HEIGHT,
        adu: 65535.0,
        header: Default::default(),
    };

    let solver = PlateSolver::new(&catalog, solve_config());
    let solution = solver.solve_image(&image, pointing).unwrap();
    assert!(solution.matches.len() >= 3);

    let (ra, dec) = solution.wcs.forward(PROBE_X, PROBE_Y);
    assert!((ra - TRUE_RA).abs() < 0.001, "RA off: {}", ra);
    assert!((dec - TRUE_DEC).abs() < 0.001, "Dec off: {}", dec);
}
