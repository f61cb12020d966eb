//! Star track calculator
//!
//! Prints which detector pixel a star falls on as the sky rotates between two
//! times, the catalog search box for the field, and the field's altitude and
//! azimuth at the configured observing site. Detector geometry and the site
//! come from the instrument parameter file.

use clap::Parser;
use ephemeris::celestial::catalog::{load_catalog, stars_in_range};
use ephemeris::{
    earth_rotation_angle, range_calculate, to_altaz, FieldPointing, RangeParameters, Star,
};
use shared::datetime_parser::{parse_datetimes, unixtime_to_datetime, utc_now};
use shared::ConfigStorage;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Star Track",
    about = "Projects a star onto the detector over a time interval",
    long_about = None
)]
struct Args {
    /// Star right ascension in hours
    #[arg(long, allow_hyphen_values = true)]
    ra: f64,

    /// Star declination in degrees
    #[arg(long, allow_hyphen_values = true)]
    dec: f64,

    /// Field right ascension offset in degrees
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    ra0: f64,

    /// Field declination in degrees
    #[arg(long, allow_hyphen_values = true)]
    dec0: f64,

    /// Field roll angle in degrees
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    psi: f64,

    /// Focal length, in the units of the pixel size setting
    #[arg(long)]
    focal_length: f64,

    /// Start time, e.g. "2024-03-05 21:00" (default: now)
    #[arg(long, default_value = "")]
    start: String,

    /// End time, e.g. "h=23 m=30" (default: start)
    #[arg(long, default_value = "")]
    end: String,

    /// Number of samples between start and end
    #[arg(long, default_value_t = 10)]
    steps: usize,

    /// Optional CSV star catalog to search for other stars in the field
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Configuration directory (default: ~/.vtl_config)
    #[arg(long)]
    config_dir: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let storage = match args.config_dir {
        Some(ref dir) => ConfigStorage::with_path(dir.clone()),
        None => ConfigStorage::default(),
    };
    let settings = storage.load_settings()?;
    let geometry = settings.detector_geometry();

    let now = utc_now();
    let start = parse_datetimes(&args.start, now);
    let end = if args.end.is_empty() {
        start
    } else {
        parse_datetimes(&args.end, now)
    };
    if end < start {
        return Err(format!("End time precedes start time ({end} < {start})").into());
    }

    let pointing = FieldPointing {
        ra0: args.ra0.to_radians(),
        dec: args.dec0.to_radians(),
        psi: args.psi.to_radians(),
        focal_length: args.focal_length,
    };
    let star = Star::new(
        (args.ra * 15.0).to_radians(),
        args.dec.to_radians(),
        "target",
        0,
    );

    println!("Star Track");
    println!("==========");
    println!(
        "Detector: {}x{} pixels, pitch {}, gap {}",
        geometry.grid_size(),
        geometry.grid_size(),
        geometry.pixel_size,
        geometry.half_gap_size * 2.0
    );
    println!();
    println!("{:<22} {:>10} {:>10} {:>10} {:>6} {:>6}", "Time", "ERA", "x", "y", "i", "j");
    println!("{:-<70}", "");

    let samples = args.steps.max(1);
    for k in 0..samples {
        let fraction = if samples == 1 {
            0.0
        } else {
            k as f64 / (samples - 1) as f64
        };
        let unix = start + (end - start) * fraction;
        let era = earth_rotation_angle(unixtime_to_datetime(unix)?);
        let local = star.get_local_coords(era, &pointing);
        let (i, j) = local.pixel(&geometry);
        println!(
            "{:<22} {:>10.5} {:>10.3} {:>10.3} {:>6} {:>6}",
            settings.format_datetime(unix)?,
            era,
            local.x,
            local.y,
            i,
            j
        );
    }

    let range = range_calculate(
        &RangeParameters {
            ra0: args.ra0,
            dec0: args.dec0,
            f: args.focal_length,
        },
        unixtime_to_datetime(start)?,
        unixtime_to_datetime(end)?,
        &geometry,
    )?;
    println!();
    println!(
        "Catalog search box: RA {:.4} .. {:.4} rad, Dec {:.4} .. {:.4} rad",
        range.ra_low, range.ra_high, range.dec_low, range.dec_high
    );

    let (lat, lon) = settings.site_radians();
    let (alt, az) = to_altaz(pointing.dec, pointing.ra0, lat, lon);
    println!(
        "Field at site ({:.4}, {:.4}): alt {:.3} deg, az {:.3} deg",
        settings.main_latitude,
        settings.main_longitude,
        alt.to_degrees(),
        az.to_degrees()
    );

    if let Some(path) = args.catalog {
        let stars = load_catalog(&path)?;
        let candidates = stars_in_range(&stars, &range);
        println!();
        println!("{} catalog stars may cross the field:", candidates.len());
        for candidate in candidates {
            println!("  {:>8}  {}", candidate.identifier, candidate.name);
        }
    }

    Ok(())
}
