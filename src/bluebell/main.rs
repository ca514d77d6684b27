// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use anyhow::{Context, Result};
use catenary_schematic::config::SchematicConfig;
use catenary_schematic::convergence::{ConvergenceOutcome, Orchestrator};
use catenary_schematic::grid_compaction::{reduce, reduce_spacing};
use catenary_schematic::guided_merge::merge_all_by_table;
use catenary_schematic::line_sizing::{
    CanvasExtent, CurrentDimensions, FocalPoint, MinCellDimensions, SizingOptions, measure_grid,
};
use catenary_schematic::station_merge::{merge_all, merge_once};
use catenary_schematic::weight_table::build_table;
use catenary_schematic::{Axis, GridDocument};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// RON config file with merge and convergence settings
    #[arg(long, env = "SCHEMATIC_CONFIG")]
    config: Option<PathBuf>,

    /// Log every merge and compaction step
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Print the per-line max weight table
    Table {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Merge stations whose neighbouring weights are within the gap tolerance
    Merge {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overrides gap_tolerance from the config
        #[arg(long)]
        gap: Option<f64>,
        /// Restrict merges to horizontal or vertical runs
        #[arg(long)]
        axis: Option<Axis>,
        /// Walk the weight table, lightest line pairs first
        #[arg(long)]
        guided: bool,
        /// Stop after the first merge
        #[arg(long, conflicts_with = "guided")]
        once: bool,
    },
    /// Remove empty grid lines
    Reduce {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Only remove unpinned even (spacing) lines
        #[arg(long)]
        spacing_only: bool,
    },
    /// Report proportional line sizes and the smallest cell
    Measure {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        /// Size every line equally
        #[arg(long)]
        uniform: bool,
        #[arg(long, requires = "focal_y")]
        focal_x: Option<i64>,
        #[arg(long, requires = "focal_x")]
        focal_y: Option<i64>,
    },
    /// Merge and compact until every cell reaches the minimum size
    Converge {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Minimum cell size in points
        #[arg(long)]
        min_cell: Option<u32>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MeasureOutput {
    min_cell_dimensions: MinCellDimensions,
    current_dimensions: CurrentDimensions,
    column_sizes: Vec<f64>,
    row_sizes: Vec<f64>,
    hidden_columns: Vec<usize>,
    hidden_rows: Vec<usize>,
}

fn load(path: &Path) -> Result<GridDocument> {
    GridDocument::load(path).with_context(|| format!("Failed to load layout {}", path.display()))
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => SchematicConfig::load(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => SchematicConfig::default(),
    };

    match args.cmd {
        Command::Table { input, output } => {
            let doc = load(&input)?;
            let table = build_table(&doc.routes);
            tracing::info!("{} table rows", table.len());
            write_json(&table, output.as_deref())?;
        }
        Command::Merge {
            input,
            output,
            gap,
            axis,
            guided,
            once,
        } => {
            let doc = load(&input)?;
            let gap = gap.unwrap_or(config.gap_tolerance);

            let routes = if guided {
                let table = build_table(&doc.routes);
                let outcome = merge_all_by_table(&doc.routes, &table, gap, axis);
                tracing::info!("{} guided merges", outcome.value.merges);
                outcome.value.routes
            } else if once {
                let outcome = merge_once(&doc.routes, gap, axis);
                if !outcome.modified {
                    tracing::info!("No station qualified for merging at gap {}", gap);
                }
                outcome.value
            } else {
                let outcome = merge_all(&doc.routes, gap, axis);
                tracing::info!("{} merges", outcome.value.merges);
                outcome.value.routes
            };

            write_json(&doc.with_routes(routes), output.as_deref())?;
        }
        Command::Reduce {
            input,
            output,
            spacing_only,
        } => {
            let doc = load(&input)?;
            let outcome = if spacing_only {
                reduce_spacing(&doc)
            } else {
                reduce(&doc)
            };
            tracing::info!(
                "Grid is now {}x{} (changed: {})",
                outcome.value.meta.grid_width,
                outcome.value.meta.grid_height,
                outcome.modified
            );
            write_json(&outcome.value, output.as_deref())?;
        }
        Command::Measure {
            input,
            output,
            width,
            height,
            uniform,
            focal_x,
            focal_y,
        } => {
            let doc = load(&input)?;
            let defaults = config.convergence.canvas;
            let canvas = CanvasExtent {
                width_px: width.unwrap_or(defaults.width_px),
                height_px: height.unwrap_or(defaults.height_px),
            };
            let sizing = if uniform {
                SizingOptions::uniform()
            } else {
                config.convergence.sizing.clone()
            };
            let focal = focal_x.zip(focal_y).map(|(x, y)| FocalPoint { x, y });

            let measurement = measure_grid(&doc, canvas, &sizing, focal);
            write_json(
                &MeasureOutput {
                    min_cell_dimensions: measurement.min_cell,
                    current_dimensions: measurement.current,
                    column_sizes: measurement.columns.pixel_sizes.clone(),
                    row_sizes: measurement.rows.pixel_sizes.clone(),
                    hidden_columns: measurement.columns.hidden.iter().copied().collect(),
                    hidden_rows: measurement.rows.hidden.iter().copied().collect(),
                },
                output.as_deref(),
            )?;
        }
        Command::Converge {
            input,
            output,
            min_cell,
        } => {
            let doc = load(&input)?;
            let mut settings = config.convergence.clone();
            if let Some(min_cell) = min_cell {
                settings.min_cell_points = min_cell;
            }

            tracing::info!(
                "Converging toward a {} pt minimum cell (max {} cycles, max gap {})...",
                settings.min_cell_points, settings.max_iterations, settings.max_gap
            );
            let report = Orchestrator::new(doc, settings).run().await;

            match report.outcome {
                ConvergenceOutcome::Converged => {
                    tracing::info!("Converged after {} cycles", report.cycles.len())
                }
                ConvergenceOutcome::NonConverged(reason) => {
                    eprintln!("Warning: did not converge ({}), writing partial result", reason)
                }
            }
            write_json(&report.document, output.as_deref())?;
        }
    }

    Ok(())
}
