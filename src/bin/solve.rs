//! Command line plate solver
//!
//! `solve astrometry` recovers the WCS of an image and writes it back as
//! header cards plus a JSON side-car; `solve indexer` prebuilds the
//! per-HEALPix-pixel asterism index.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use log::info;

use starsolve::catalogs::{Catalog, GaiaClient, GaiaFileCatalog, SimbadClient};
use starsolve::coordinates::Equatorial;
use starsolve::fits::{write_wcs_sidecar, write_with_wcs, FitsImage};
use starsolve::healpix::{HealPix, Scheme};
use starsolve::index::IndexBuilder;
use starsolve::solver::{PlateSolver, SolveConfig};
use starsolve::{Result, SolveError};

#[derive(Parser)]
#[command(name = "solve", about = "Astrometric plate solving", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recover the WCS of an image from an approximate pointing
    Astrometry(AstrometryArgs),
    /// Prebuild the per-pixel asterism index
    Indexer(IndexerArgs),
}

#[derive(Args)]
struct AstrometryArgs {
    /// Input FITS image
    #[arg(short, long)]
    input: PathBuf,

    /// Approximate right ascension in degrees (falls back to the RA header)
    #[arg(long)]
    ra: Option<f64>,

    /// Approximate declination in degrees (falls back to the DEC header)
    #[arg(long)]
    dec: Option<f64>,

    /// Pixel scale along x, degrees per pixel
    #[arg(short = 'x', long)]
    pixel_scale_x: f64,

    /// Pixel scale along y, degrees per pixel
    #[arg(short = 'y', long)]
    pixel_scale_y: f64,

    /// Length-ratio tolerance of the feature comparison
    #[arg(long, default_value_t = 0.02)]
    quad_tolerance: f64,

    /// Minimum pixel separation between two matched stars
    #[arg(long, default_value_t = 10.0)]
    euclidian_distance_tolerance: f64,

    /// Fit SIP distortion polynomials of this order
    #[arg(long)]
    sip_order: Option<usize>,

    /// Solve against a local Gaia CSV export instead of the remote archive
    #[arg(long)]
    catalog_file: Option<PathBuf>,

    /// Solve against SIMBAD instead of Gaia
    #[arg(long)]
    simbad: bool,
}

#[derive(Args)]
struct IndexerArgs {
    /// HEALPix resolution parameter
    #[arg(short, long)]
    nside: u64,

    /// Pixel numbering scheme
    #[arg(short, long, default_value = "NESTED")]
    scheme: Scheme,

    /// Output directory for the index tree
    #[arg(short, long, default_value = "indexes")]
    out_dir: PathBuf,

    /// Limiting magnitude of the catalog queries
    #[arg(long, default_value_t = 14.0)]
    mag_limit: f64,

    /// Build from a local Gaia CSV export instead of the remote archive
    #[arg(long)]
    catalog_file: Option<PathBuf>,

    /// Build from SIMBAD instead of Gaia
    #[arg(long)]
    simbad: bool,
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Astrometry(args) => run_astrometry(&args),
        Command::Indexer(args) => run_indexer(&args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn select_catalog(
    catalog_file: &Option<PathBuf>,
    simbad: bool,
    mag_limit: f64,
) -> Result<Box<dyn Catalog>> {
    if let Some(path) = catalog_file {
        return Ok(Box::new(GaiaFileCatalog::from_file(path, mag_limit)?));
    }
    if simbad {
        return Ok(Box::new(SimbadClient::new()));
    }
    Ok(Box::new(GaiaClient::new()))
}

fn run_astrometry(args: &AstrometryArgs) -> Result<()> {
    let image = FitsImage::open(&args.input)?;
    let pointing = resolve_pointing(args, &image)?;
    info!(
        "solving {} around ({:.4}, {:.4})",
        args.input.display(),
        pointing.ra,
        pointing.dec
    );

    let mut config = SolveConfig::new(args.pixel_scale_x, args.pixel_scale_y);
    config.match_config.tolerance.length_ratio = args.quad_tolerance;
    config.euclidian_distance_tolerance = args.euclidian_distance_tolerance;
    config.sip_order = args.sip_order;

    let catalog = select_catalog(&args.catalog_file, args.simbad, config.mag_limit)?;
    let solver = PlateSolver::new(catalog.as_ref(), config);
    let solution = solver.solve_image(&image, pointing)?;

    let (ra, dec) = solution
        .wcs
        .forward(image.width as f64 / 2.0, image.height as f64 / 2.0);
    println!(
        "solved: center ({:.5}, {:.5}) deg from {} matches",
        ra,
        dec,
        solution.matches.len()
    );

    let solved_path = sibling_path(&args.input, "solved.fits");
    let sidecar_path = sibling_path(&args.input, "wcs.json");
    write_with_wcs(&args.input, &solved_path, &solution.wcs)?;
    if let Err(e) = write_wcs_sidecar(&sidecar_path, &solution.wcs) {
        // Leave no partial output pair behind.
        let _ = std::fs::remove_file(&solved_path);
        return Err(e);
    }

    println!("wrote {}", solved_path.display());
    println!("wrote {}", sidecar_path.display());
    Ok(())
}

fn run_indexer(args: &IndexerArgs) -> Result<()> {
    let healpix = HealPix::new(args.nside, args.scheme)?;
    let catalog = select_catalog(&args.catalog_file, args.simbad, args.mag_limit)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| SolveError::InvalidInput(format!("failed to install signal handler: {}", e)))?;

    let builder = IndexBuilder::new(healpix, args.out_dir.clone()).with_mag_limit(args.mag_limit);
    let summary = builder.build(catalog.as_ref(), Some(cancel.as_ref()))?;

    println!(
        "indexed {} pixels ({} asterisms) under {}",
        summary.pixels,
        summary.asterisms,
        builder.resolution_dir().display()
    );
    Ok(())
}

fn resolve_pointing(args: &AstrometryArgs, image: &FitsImage) -> Result<Equatorial> {
    let ra = match args.ra {
        Some(ra) => ra,
        None => image
            .header
            .get_f64("RA")
            .ok_or_else(|| SolveError::MissingHeader("RA".to_string()))?,
    };
    let dec = match args.dec {
        Some(dec) => dec,
        None => image
            .header
            .get_f64("DEC")
            .ok_or_else(|| SolveError::MissingHeader("DEC".to_string()))?,
    };
    Equatorial::new(ra, dec)
}

fn sibling_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{}.{}", stem, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_astrometry() {
        let cli = Cli::parse_from([
            "solve",
            "astrometry",
            "-i",
            "frame.fits",
            "--ra",
            "98.6",
            "--dec",
            "2.5",
            "-x",
            "0.001",
            "-y",
            "0.001",
        ]);
        match cli.command {
            Command::Astrometry(args) => {
                assert_eq!(args.input, PathBuf::from("frame.fits"));
                assert_eq!(args.ra, Some(98.6));
                assert_eq!(args.quad_tolerance, 0.02);
                assert_eq!(args.euclidian_distance_tolerance, 10.0);
            }
            _ => panic!("expected astrometry subcommand"),
        }
    }

    #[test]
    fn test_cli_requires_pixel_scales() {
        let result = Cli::try_parse_from(["solve", "astrometry", "-i", "frame.fits"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parses_indexer_defaults() {
        let cli = Cli::parse_from(["solve", "indexer", "-n", "8"]);
        match cli.command {
            Command::Indexer(args) => {
                assert_eq!(args.nside, 8);
                assert_eq!(args.scheme, Scheme::Nested);
                assert_eq!(args.out_dir, PathBuf::from("indexes"));
            }
            _ => panic!("expected indexer subcommand"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_scheme() {
        let result = Cli::try_parse_from(["solve", "indexer", "-n", "8", "-s", "SPIRAL"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_sibling_path() {
        let p = sibling_path(Path::new("/data/m42.fits"), "wcs.json");
        assert_eq!(p, PathBuf::from("/data/m42.wcs.json"));
    }
}
