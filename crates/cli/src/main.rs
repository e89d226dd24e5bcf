//! drainnet CLI - channel heads and channel networks from a DEM

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use drainnet_algorithms::heads::DetectorKind;
use drainnet_algorithms::hydrology::{distance_from_outlet, fill, nodes_to_grid, FlowGraph};
use drainnet_algorithms::network::JunctionNetwork;
use drainnet_algorithms::pipeline::{
    heads_from_coordinates, network_from_heads, prepare, run_detectors, ChannelExtraction,
    PreparedSurface,
};
use drainnet_algorithms::spectral::{wiener_filter, wiener_memory_estimate};
use drainnet_algorithms::terrain::surface_fit;
use drainnet_algorithms::{ChiTieBreak, ExtractionConfig};
use drainnet_core::io::{read_geotiff, write_geotiff, GeoTiffOptions};
use drainnet_core::{Raster, RasterElement};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "drainnet")]
#[command(author, version, about = "Channel head detection and channel network extraction", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only report warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Fill depressions in a DEM
    Fill {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Minimum slope enforced along flow paths
        #[arg(short, long, default_value = "0.0001")]
        min_slope: f64,
    },
    /// Wiener-filter a DEM
    Wiener {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Abort above this many megabytes of working memory
        #[arg(long)]
        memory_limit_mb: Option<u64>,
    },
    /// Curvatures from a quadratic surface fit
    Curvature {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Window radius in map units
        #[arg(short, long, default_value = "6.0")]
        radius: f64,
        /// Curvature to write
        #[arg(short = 't', long, value_enum, default_value = "tangential")]
        curvature_type: CurvatureKind,
    },
    /// Detect channel heads and build channel networks
    Extract(ExtractArgs),
    /// Build a channel network from channel heads listed in a CSV file
    Network(NetworkArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum CurvatureKind {
    Tangential,
    Profile,
    Planform,
    Mean,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DetectorArg {
    AreaThreshold,
    Dreich,
    Pelletier,
    Wiener,
}

impl From<DetectorArg> for DetectorKind {
    fn from(arg: DetectorArg) -> Self {
        match arg {
            DetectorArg::AreaThreshold => DetectorKind::AreaThreshold,
            DetectorArg::Dreich => DetectorKind::Dreich,
            DetectorArg::Pelletier => DetectorKind::Pelletier,
            DetectorArg::Wiener => DetectorKind::Wiener,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TieBreakArg {
    MostUpstream,
    FirstBest,
}

impl From<TieBreakArg> for ChiTieBreak {
    fn from(arg: TieBreakArg) -> Self {
        match arg {
            TieBreakArg::MostUpstream => ChiTieBreak::MostUpstream,
            TieBreakArg::FirstBest => ChiTieBreak::FirstBest,
        }
    }
}

/// Where results go and which ones to write
#[derive(Args)]
struct OutputArgs {
    /// Output directory
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,
    /// Prefix for every output file name
    #[arg(long, default_value = "drainnet")]
    out_id: String,
    /// Skip the heads and channel network CSV files
    #[arg(long)]
    no_csv: bool,
    /// Write the heads as a raster (_SI)
    #[arg(long)]
    sources_raster: bool,
    /// Write the stream order raster (_SO)
    #[arg(long)]
    stream_order: bool,
    /// Write the junction index raster (_JI)
    #[arg(long)]
    junction_index: bool,
    /// Write the filled DEM
    #[arg(long)]
    filled: bool,
    /// Write flow distance from the outlet
    #[arg(long)]
    flow_distance: bool,
    /// Write D8 flow directions
    #[arg(long)]
    d8: bool,
}

/// Parameters of the head detectors
#[derive(Args)]
struct ConfigArgs {
    /// Minimum slope enforced by the depression fill
    #[arg(long, default_value = "0.0001")]
    min_slope_for_fill: f64,
    /// Contributing cells for the area threshold detector
    #[arg(long, default_value = "1000")]
    threshold_contributing_pixels: u32,
    /// Smallest channel component kept, in cells
    #[arg(long, default_value = "100")]
    connected_components_threshold: usize,
    /// Junctions searched below each head by the chi refinement
    #[arg(long, default_value = "1")]
    search_depth: usize,
    /// Short-wavelength surface fitting radius, in map units
    #[arg(long, default_value = "6.0")]
    surface_fitting_radius: f64,
    /// Long-wavelength surface fitting radius, in map units
    #[arg(long, default_value = "25.0")]
    long_wavelength_radius: f64,
    /// Drainage area a channel cell needs, in map units squared
    #[arg(long, default_value = "1000.0")]
    pruning_drainage_area: f64,
    /// Pelletier curvature threshold
    #[arg(long, default_value = "0.1")]
    curvature_threshold: f64,
    /// Pelletier minimum drainage area, in map units squared
    #[arg(long, default_value = "400.0")]
    minimum_drainage_area: f64,
    /// Chi reference drainage area
    #[arg(long, default_value = "1.0")]
    a_0: f64,
    /// Chi concavity index
    #[arg(long, default_value = "0.5")]
    m_over_n: f64,
    /// Minimum nodes on each side of a chi split
    #[arg(long, default_value = "10")]
    min_segment_length: usize,
    /// No-data frame Pelletier puts around the filtered DEM, in cells
    #[arg(long, default_value = "100")]
    pelletier_border_width: usize,
    /// Contributing cells for Pelletier's initial sources
    #[arg(long, default_value = "250")]
    pelletier_initial_threshold: u32,
    /// Quantile-quantile departure tolerance, as a fraction of the spread
    #[arg(long, default_value = "0.2")]
    noise_tolerance: f64,
    /// How the chi refinement settles ties
    #[arg(long, value_enum, default_value = "most-upstream")]
    chi_tie_break: TieBreakArg,
    /// Abort spectral filtering above this many megabytes of working memory
    #[arg(long)]
    memory_limit_mb: Option<u64>,
}

impl ConfigArgs {
    fn to_config(&self) -> ExtractionConfig {
        ExtractionConfig {
            min_slope_for_fill: self.min_slope_for_fill,
            threshold_contributing_pixels: self.threshold_contributing_pixels,
            connected_components_threshold: self.connected_components_threshold,
            search_depth: self.search_depth,
            surface_fitting_radius: self.surface_fitting_radius,
            long_wavelength_radius: self.long_wavelength_radius,
            pruning_drainage_area: self.pruning_drainage_area,
            curvature_threshold: self.curvature_threshold,
            minimum_drainage_area: self.minimum_drainage_area,
            a_0: self.a_0,
            m_over_n: self.m_over_n,
            min_segment_length: self.min_segment_length,
            pelletier_border_width: self.pelletier_border_width,
            pelletier_initial_threshold: self.pelletier_initial_threshold,
            noise_tolerance: self.noise_tolerance,
            chi_tie_break: self.chi_tie_break.into(),
            memory_limit_bytes: self.memory_limit_mb.map(megabytes),
        }
    }
}

#[derive(Args)]
struct ExtractArgs {
    /// Input DEM file
    input: PathBuf,
    /// Head detectors to run; repeat to run several
    #[arg(short, long = "detector", value_enum, default_value = "area-threshold")]
    detectors: Vec<DetectorArg>,
    /// Write the Wiener-filtered DEM and curvature of the spectral detectors
    #[arg(long)]
    diagnostics: bool,
    #[command(flatten)]
    output: OutputArgs,
    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Args)]
struct NetworkArgs {
    /// Input DEM file
    input: PathBuf,
    /// CSV file with x and y columns, one channel head per row
    #[arg(long)]
    heads_csv: PathBuf,
    /// Minimum slope enforced by the depression fill
    #[arg(long, default_value = "0.0001")]
    min_slope_for_fill: f64,
    #[command(flatten)]
    output: OutputArgs,
}

// ─── CSV rows ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct HeadRow {
    node: usize,
    row: usize,
    col: usize,
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct HeadPoint {
    x: f64,
    y: f64,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool, quiet: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn megabytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

fn read_dem(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn write_raster<T: RasterElement>(raster: &Raster<T>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path, Some(GeoTiffOptions::default()))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    pb.finish_and_clear();
    Ok(())
}

fn write_csv<S: Serialize>(rows: impl IntoIterator<Item = S>, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_head_points(path: &Path) -> Result<Vec<(f64, f64)>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut points = Vec::new();
    for record in reader.deserialize() {
        let point: HeadPoint =
            record.with_context(|| format!("Malformed head row in {}", path.display()))?;
        points.push((point.x, point.y));
    }
    Ok(points)
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

impl OutputArgs {
    fn path(&self, suffix: &str, ext: &str) -> PathBuf {
        self.out_dir.join(format!("{}_{}.{}", self.out_id, suffix, ext))
    }

    /// Write the heads, network and requested rasters of one network.
    fn write_network(
        &self,
        tag: &str,
        heads: &[usize],
        network: &JunctionNetwork,
        flow: &FlowGraph,
    ) -> Result<()> {
        if !self.no_csv {
            let head_rows = heads.iter().map(|&node| {
                let (row, col) = flow.row_col(node);
                let (x, y) = flow.coordinates(node);
                HeadRow { node, row, col, x, y }
            });
            write_csv(head_rows, &self.path(&format!("{}sources", tag), "csv"))?;
            write_csv(network.export_rows(), &self.path(&format!("{}_CN", tag), "csv"))?;
        }
        if self.sources_raster {
            write_raster(&nodes_to_grid(flow, heads)?, &self.path(&format!("{}_SI", tag), "tif"))?;
        }
        if self.stream_order {
            write_raster(
                &network.stream_order_grid(flow)?,
                &self.path(&format!("{}_SO", tag), "tif"),
            )?;
        }
        if self.junction_index {
            write_raster(
                &network.junction_index_grid(flow)?,
                &self.path(&format!("{}_JI", tag), "tif"),
            )?;
        }
        Ok(())
    }

    /// Rasters describing the prepared surface itself.
    fn write_surface(&self, prepared: &PreparedSurface) -> Result<()> {
        if self.filled {
            write_raster(&prepared.filled, &self.path("fill", "tif"))?;
        }
        if self.flow_distance {
            write_raster(&distance_from_outlet(&prepared.flow)?, &self.path("FD", "tif"))?;
        }
        if self.d8 {
            write_raster(&prepared.flow.flow_direction_grid()?, &self.path("D8", "tif"))?;
        }
        Ok(())
    }
}

// ─── Commands ───────────────────────────────────────────────────────────

fn extract(args: &ExtractArgs) -> Result<()> {
    let start = Instant::now();
    let config = args.config.to_config();
    config.validate().context("Invalid parameters")?;

    let mut kinds: Vec<DetectorKind> = Vec::new();
    for &d in &args.detectors {
        let kind = DetectorKind::from(d);
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    let dem = read_dem(&args.input)?;
    let (rows, cols) = dem.shape();
    if kinds.iter().any(|k| *k != DetectorKind::AreaThreshold) {
        let mb = wiener_memory_estimate(rows, cols) as f64 / (1024.0 * 1024.0);
        info!("Spectral detectors need about {:.0} MB of working memory", mb);
    }
    std::fs::create_dir_all(&args.output.out_dir)
        .with_context(|| format!("Failed to create {}", args.output.out_dir.display()))?;

    let pb = spinner("Filling and routing...");
    let prepared = prepare(dem, &config).context("Failed to prepare the DEM")?;
    pb.finish_and_clear();
    args.output.write_surface(&prepared)?;

    let pb = spinner("Detecting channel heads...");
    let results = run_detectors(&kinds, &prepared, &config);
    pb.finish_and_clear();

    let mut failures = 0;
    for (kind, result) in results {
        match result {
            Ok(run) => write_extraction(&args.output, &run, &prepared, args.diagnostics)?,
            Err(e) => {
                failures += 1;
                eprintln!("{} failed: {}", kind, e);
            }
        }
    }

    if failures == kinds.len() {
        bail!("every detector failed");
    }
    done("Channel networks", &args.output.out_dir, start.elapsed());
    Ok(())
}

fn write_extraction(
    output: &OutputArgs,
    run: &ChannelExtraction,
    prepared: &PreparedSurface,
    diagnostics: bool,
) -> Result<()> {
    let tag = run.detector.tag();
    let flow = run.flow(prepared);
    println!(
        "{}: {} channel heads, {} junctions",
        run.detector,
        run.heads.len(),
        run.network.n_junctions()
    );
    output.write_network(tag, &run.heads, &run.network, flow)?;

    if !run.diagnostics.quantiles.is_empty() && !output.no_csv {
        write_csv(
            run.diagnostics.quantiles.iter(),
            &output.path(&format!("{}_qq", tag), "csv"),
        )?;
    }
    if diagnostics {
        if let Some(filtered) = &run.diagnostics.filtered {
            write_raster(filtered, &output.path(&format!("{}_Wfilt", tag), "tif"))?;
        }
        if let Some(curvature) = &run.diagnostics.curvature {
            write_raster(curvature, &output.path(&format!("{}_tan_curv", tag), "tif"))?;
        }
    }
    Ok(())
}

fn network(args: &NetworkArgs) -> Result<()> {
    let start = Instant::now();
    let config = ExtractionConfig {
        min_slope_for_fill: args.min_slope_for_fill,
        ..Default::default()
    };
    let points = read_head_points(&args.heads_csv)?;
    let dem = read_dem(&args.input)?;
    std::fs::create_dir_all(&args.output.out_dir)
        .with_context(|| format!("Failed to create {}", args.output.out_dir.display()))?;

    let prepared = prepare(dem, &config).context("Failed to prepare the DEM")?;
    args.output.write_surface(&prepared)?;

    let heads = heads_from_coordinates(&points, &prepared.flow);
    if heads.len() < points.len() {
        warn!(
            "{} of {} heads fall outside the DEM or on no-data",
            points.len() - heads.len(),
            points.len()
        );
    }
    let network = network_from_heads(&heads, &prepared.flow)?;
    println!(
        "{} channel heads, {} junctions",
        network.sources().len(),
        network.n_junctions()
    );
    args.output
        .write_network("CH", network.sources(), &network, &prepared.flow)?;
    done("Channel network", &args.output.out_dir, start.elapsed());
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Info { input } => {
            let raster = read_dem(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.transform().bounds(cols, rows);
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
            );
            println!(
                "  Spectral filtering needs about {:.0} MB",
                wiener_memory_estimate(rows, cols) as f64 / (1024.0 * 1024.0)
            );
        }

        Commands::Fill {
            input,
            output,
            min_slope,
        } => {
            let dem = read_dem(&input)?;
            let start = Instant::now();
            let filled = fill(&dem, min_slope).context("Failed to fill the DEM")?;
            let elapsed = start.elapsed();
            write_raster(&filled, &output)?;
            done("Filled DEM", &output, elapsed);
        }

        Commands::Wiener {
            input,
            output,
            memory_limit_mb,
        } => {
            let dem = read_dem(&input)?;
            let start = Instant::now();
            let pb = spinner("Filtering...");
            let filtered = wiener_filter(&dem, memory_limit_mb.map(megabytes))
                .context("Wiener filter failed")?;
            pb.finish_and_clear();
            let elapsed = start.elapsed();
            write_raster(&filtered, &output)?;
            done("Wiener-filtered DEM", &output, elapsed);
        }

        Commands::Curvature {
            input,
            output,
            radius,
            curvature_type,
        } => {
            let dem = read_dem(&input)?;
            let start = Instant::now();
            let fit = surface_fit(&dem, radius).context("Surface fit failed")?;
            let raster = match curvature_type {
                CurvatureKind::Tangential => fit.tangential,
                CurvatureKind::Profile => fit.profile,
                CurvatureKind::Planform => fit.planform,
                CurvatureKind::Mean => fit.mean,
            };
            let elapsed = start.elapsed();
            write_raster(&raster, &output)?;
            done("Curvature", &output, elapsed);
        }

        Commands::Extract(args) => extract(&args)?,

        Commands::Network(args) => network(&args)?,
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet)?;
    run(cli)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drainnet_core::GeoTransform;

    fn valley_dem(dir: &Path) -> PathBuf {
        let (rows, cols) = (20, 15);
        let z: Vec<f64> = (0..rows * cols)
            .map(|i| {
                let (r, c) = (i / cols, i % cols);
                300.0 - 2.0 * r as f64 + 4.0 * (c as f64 - 7.0).abs()
            })
            .collect();
        let mut dem = Raster::from_vec(z, rows, cols).unwrap();
        dem.set_transform(GeoTransform::new(500_000.0, 4_000_000.0, 10.0, -10.0));
        dem.set_nodata(Some(-9999.0));
        let path = dir.join("dem.tif");
        write_geotiff(&dem, &path, None).unwrap();
        path
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("drainnet").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_match_library() {
        let cli = parse(&["extract", "dem.tif"]);
        let Commands::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        assert_eq!(args.config.to_config(), ExtractionConfig::default());
        assert!(args.detectors == vec![DetectorArg::AreaThreshold]);
    }

    #[test]
    fn test_extract_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let dem = valley_dem(dir.path());
        let out = dir.path().join("out");
        let dem_arg = dem.to_str().unwrap();
        let out_arg = out.to_str().unwrap();

        let cli = parse(&[
            "extract",
            dem_arg,
            "--out-dir",
            out_arg,
            "--out-id",
            "test",
            "--threshold-contributing-pixels",
            "8",
            "--stream-order",
            "--junction-index",
            "--sources-raster",
            "--d8",
        ]);
        run(cli).unwrap();

        for name in [
            "test_ATsources.csv",
            "test_AT_CN.csv",
            "test_AT_SO.tif",
            "test_AT_JI.tif",
            "test_AT_SI.tif",
            "test_D8.tif",
        ] {
            assert!(out.join(name).exists(), "missing {}", name);
        }

        let so: Raster<i32> = read_geotiff(out.join("test_AT_SO.tif")).unwrap();
        assert_eq!(so.shape(), (20, 15));
        assert!(so.data().iter().any(|&v| v >= 1));

        // The heads file feeds straight back in as a heads CSV
        let heads = read_head_points(&out.join("test_ATsources.csv")).unwrap();
        assert!(!heads.is_empty());

        let cli = parse(&[
            "network",
            dem_arg,
            "--heads-csv",
            out.join("test_ATsources.csv").to_str().unwrap(),
            "--out-dir",
            out_arg,
            "--out-id",
            "again",
        ]);
        run(cli).unwrap();
        let first = std::fs::read_to_string(out.join("test_AT_CN.csv")).unwrap();
        let second = std::fs::read_to_string(out.join("again_CH_CN.csv")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_parameter_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let dem = valley_dem(dir.path());
        let cli = parse(&["extract", dem.to_str().unwrap(), "--m-over-n=-1"]);
        let err = run(cli).unwrap_err();
        assert!(format!("{:#}", err).contains("m_over_n"));
    }
}
