use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use roadnet::{Model, MosaicBuilder, OverlapPolicy, RasterTile};

#[derive(Parser)]
#[command(name = "roadnet")]
#[command(about = "Road-network model builder with terrain elevation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a model from OSM PBF and GeoTIFF sources, export CSV tables
    Build {
        /// Input files (.pbf, .tif); kind is detected per file
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Output directory for nodes.csv and edges.csv
        #[arg(short, long, default_value = "out")]
        out: PathBuf,
        /// Model name
        #[arg(long, default_value = "model")]
        name: String,
        /// Keep only ways with these highway tags (comma-separated)
        #[arg(long)]
        filter: Option<String>,
        /// Vertex-coincidence rounding precision in decimal places
        #[arg(long, default_value = "7")]
        precision: u32,
        /// Raster overlap policy: last-wins, max, or mean
        #[arg(long, default_value = "last-wins")]
        overlap: String,
        /// Overwrite existing output files
        #[arg(long)]
        overwrite: bool,
        /// Also write a JSON summary to this path
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Build a model in memory and print its summary
    Info {
        /// Input files (.pbf, .tif)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Print the summary as JSON instead of plain lines
        #[arg(long)]
        json: bool,
    },
    /// Query elevations from GeoTIFF rasters at given coordinates
    Height {
        /// Input raster files (.tif)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Query coordinates (lon,lat), repeatable
        #[arg(long = "at", required = true)]
        at: Vec<String>,
    },
}

fn parse_coord(s: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        anyhow::bail!("Coordinate must be in format 'lon,lat'");
    }
    let x = parts[0].trim().parse::<f64>()?;
    let y = parts[1].trim().parse::<f64>()?;
    Ok((x, y))
}

fn parse_overlap(s: &str) -> Result<OverlapPolicy> {
    match s {
        "last-wins" => Ok(OverlapPolicy::LastWins),
        "max" => Ok(OverlapPolicy::Max),
        "mean" => Ok(OverlapPolicy::Mean),
        other => anyhow::bail!("Unknown overlap policy '{}'", other),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            inputs,
            out,
            name,
            filter,
            precision,
            overlap,
            overwrite,
            json,
        } => {
            let mut model = Model::new(&name)
                .with_precision(precision)
                .with_overlap_policy(parse_overlap(&overlap)?);
            if let Some(filter) = filter {
                let include: HashSet<String> =
                    filter.split(',').map(|t| t.trim().to_string()).collect();
                model = model.with_include(include);
            }

            for input in &inputs {
                model.add(input)?;
            }

            println!("Building model '{}' from {} sources...", name, inputs.len());
            let start = Instant::now();
            model.build();
            println!("Build took {:.2}s", start.elapsed().as_secs_f64());

            model.dump();
            model.export(&out, overwrite)?;
            println!("Tables written to {}", out.display());

            if let Some(json_path) = json {
                let summary = serde_json::to_string_pretty(&model.summary())?;
                std::fs::write(&json_path, summary)?;
                println!("Summary written to {}", json_path.display());
            }
        }
        Commands::Info { inputs, json } => {
            let mut model = Model::new("info");
            for input in &inputs {
                model.add(input)?;
            }
            model.build();
            if json {
                println!("{}", serde_json::to_string_pretty(&model.summary())?);
            } else {
                model.dump();
            }
        }
        Commands::Height { inputs, at } => {
            let mut builder = MosaicBuilder::new();
            for input in &inputs {
                builder.add_tile(RasterTile::from_tiff(input)?);
            }
            let mosaic = builder.finalize();

            for coord in &at {
                let (x, y) = parse_coord(coord)?;
                match mosaic.interpolate(x, y) {
                    Ok(z) => println!("{},{}: {:.2}m", x, y, z),
                    Err(err) => println!("{},{}: {}", x, y, err),
                }
            }
        }
    }

    Ok(())
}
