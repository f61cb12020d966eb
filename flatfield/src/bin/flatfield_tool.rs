//! Flat-field model tool
//!
//! Inspects saved flat-field models, applies them to frame files and
//! composes them into chains.
//!
//! # Usage
//!
//! ```bash
//! # Show the model kind, gain and broken pixels
//! cargo run --release --bin flatfield_tool -- describe linear_2024.json
//!
//! # Calibrate a frame series, zeroing broken pixels
//! cargo run --release --bin flatfield_tool -- apply linear_2024.json raw.json out.json --nobreak
//!
//! # Per-frame calibrated sums
//! cargo run --release --bin flatfield_tool -- light-curve linear_2024.json raw.json
//!
//! # Compose two saved models (names resolve in the config directory)
//! cargo run --release --bin flatfield_tool -- chain combined.json linear_2024 pileup_2024
//!
//! # Look raw frames up on per-pixel calibration curves
//! cargo run --release --bin flatfield_tool -- interpolate raw.json curves.json 0,1,2,4,8 out.json
//! ```
//!
//! Model arguments are file paths, or names of models saved under the
//! `flatfield/` directory of the configuration store. The worker pool size
//! comes from the `NPROC` setting.

use clap::{Parser, Subcommand};
use flatfield::{interpolate_matrix, light_curve, read_frames, write_frames, Chain, FlatFieldModel};
use ndarray::{ArrayView1, Ix3};
use shared::kernels::init_thread_pool;
use shared::ConfigStorage;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about = "Flat-field model tool", long_about = None)]
struct Cli {
    /// Configuration directory (default: ~/.vtl_config)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the model kind, master coefficient and broken pixels
    Describe {
        /// Model file or saved model name
        model: String,
    },

    /// Calibrate a frame file
    Apply {
        /// Model file or saved model name
        model: String,
        /// Input frames (nested JSON lists)
        input: PathBuf,
        /// Output frames
        output: PathBuf,
        /// Zero the output of broken pixels
        #[arg(long)]
        nobreak: bool,
        /// Use this master coefficient instead of the stored one
        #[arg(long)]
        master_coeff: Option<f64>,
    },

    /// Print the calibrated per-frame sum over the detector
    LightCurve {
        /// Model file or saved model name
        model: String,
        /// Input frame series (frames x rows x columns)
        input: PathBuf,
    },

    /// Compose models into a chain and save it
    Chain {
        /// Output file, or a name to save into the config directory with --store
        output: String,
        /// Models applied in order
        #[arg(required = true)]
        models: Vec<String>,
        /// Save under the config directory instead of a plain path
        #[arg(long)]
        store: bool,
    },

    /// List models saved in the config directory
    List,

    /// Interpolate frames on per-pixel calibration curves
    Interpolate {
        /// Raw frames (a frame or a frame series)
        input: PathBuf,
        /// Per-pixel curve readings (curve points x rows x columns)
        curves: PathBuf,
        /// Reference values of the curve points
        #[arg(value_delimiter = ',', allow_hyphen_values = true)]
        values: Vec<f64>,
        /// Output frames
        output: PathBuf,
    },
}

fn resolve_model(storage: &ConfigStorage, model: &str) -> PathBuf {
    let path = Path::new(model);
    if path.exists() {
        path.to_path_buf()
    } else {
        storage.flatfield_path(model)
    }
}

fn load_model(
    storage: &ConfigStorage,
    model: &str,
) -> Result<FlatFieldModel, Box<dyn std::error::Error>> {
    let path = resolve_model(storage, model);
    FlatFieldModel::load(&path).map_err(|e| format!("{}: {e}", path.display()).into())
}

fn describe(model: &FlatFieldModel) {
    println!("Model:          {model}");
    match model.shape() {
        Some((rows, cols)) => println!("Pixel grid:     {rows}x{cols}"),
        None => println!("Pixel grid:     any"),
    }
    println!("Master coeff:   {}", model.master_coeff);

    for parameter in model.display_parameters() {
        if let Some(values) = parameter.values {
            let finite = values.iter().copied().filter(|v| v.is_finite());
            let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
            println!("{:<40} min {lo:>12.5}  max {hi:>12.5}", parameter.title);
        }
    }

    let broken = model.broken_query();
    println!("Broken pixels:  {}", broken.len());
    for (i, j) in broken {
        println!("  ({i:>2}, {j:>2})");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let storage = match cli.config_dir {
        Some(dir) => ConfigStorage::with_path(dir),
        None => ConfigStorage::default(),
    };
    let settings = storage.load_settings()?;
    init_thread_pool(settings.nproc);

    match cli.command {
        Commands::Describe { model } => {
            describe(&load_model(&storage, &model)?);
        }
        Commands::Apply {
            model,
            input,
            output,
            nobreak,
            master_coeff,
        } => {
            let mut model = load_model(&storage, &model)?;
            if let Some(coeff) = master_coeff {
                model.master_coeff = coeff;
            }
            let frames = read_frames(&input)?;
            let calibrated = if nobreak {
                model.apply_nobreak(&frames)?
            } else {
                model.apply(&frames)?
            };
            write_frames(&output, &calibrated)?;
            println!(
                "Applied {model} to {:?} frames, written to {}",
                frames.shape(),
                output.display()
            );
        }
        Commands::LightCurve { model, input } => {
            let model = load_model(&storage, &model)?;
            let frames = read_frames(&input)?.into_dimensionality::<Ix3>()?;
            let curve = light_curve(&model, &frames)?;
            println!("{:>6} {:>16}", "Frame", "Sum");
            println!("{:-<23}", "");
            for (t, sum) in curve.iter().enumerate() {
                println!("{t:>6} {sum:>16.6}");
            }
        }
        Commands::Chain {
            output,
            models,
            store,
        } => {
            let mut chain = Chain::default();
            for name in &models {
                chain.append_model(load_model(&storage, name)?)?;
            }
            let chain = FlatFieldModel::new(chain);
            let path = if store {
                storage.prepare_flatfield_path(&output)?
            } else {
                PathBuf::from(&output)
            };
            chain.save(&path, None)?;
            println!("Saved {chain} to {}", path.display());
        }
        Commands::List => {
            let names = storage.list_flatfield_models()?;
            if names.is_empty() {
                println!("No models in {}", storage.flatfield_dir().display());
            }
            for name in names {
                match FlatFieldModel::load(&storage.flatfield_path(&name)) {
                    Ok(model) => println!("{name:<32} {model}"),
                    Err(e) => println!("{name:<32} unreadable: {e}"),
                }
            }
        }
        Commands::Interpolate {
            input,
            curves,
            values,
            output,
        } => {
            let frames = read_frames(&input)?;
            let curves = read_frames(&curves)?.into_dimensionality::<Ix3>()?;
            let values = ArrayView1::from(&values);
            let result = interpolate_matrix(frames.view(), curves.view(), values)?;
            write_frames(&output, &result)?;
            println!(
                "Interpolated {:?} frames, written to {}",
                frames.shape(),
                output.display()
            );
        }
    }

    Ok(())
}
