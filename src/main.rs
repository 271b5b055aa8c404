//! Iterative refocus command line.
//!
//! ```sh
//! refocus_rs -r 4 -n 50 -i 200 -f blurred.ppm -o sharp.ppm
//! refocus_rs -g 2.5 < blurred.pgm > sharp.pgm
//! ```

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use refocus_rs::logger;
use refocus_rs::refocus::pipeline::intermediate_path;
use refocus_rs::refocus::{
    AutoReader, BoundaryMode, OutputFormat, RefocusConfig, RefocusPipeline, StandardWriter, TiffCompression,
};

use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompressionArg {
    None,
    Lzw,
    DeflateFast,
    DeflateBalanced,
    DeflateBest,
}

impl From<CompressionArg> for TiffCompression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => TiffCompression::None,
            CompressionArg::Lzw => TiffCompression::Lzw,
            CompressionArg::DeflateFast => TiffCompression::DeflateFast,
            CompressionArg::DeflateBalanced => TiffCompression::DeflateBalanced,
            CompressionArg::DeflateBest => TiffCompression::DeflateBest,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "refocus_rs")]
#[command(about = "Iterative refocus: restore images blurred by defocus, gaussian or motion blur")]
#[command(version)]
struct Cli {
    /// Defocus radius, 0.0 to 32.0
    #[arg(short = 'r', long = "radius", default_value_t = 6.0)]
    radius: f64,

    /// Gaussian blur variance, 0.0 to 32.0
    #[arg(short = 'g', long = "gauss", default_value_t = 0.0)]
    gauss: f64,

    /// Motion blur length, 0.0 to 64.0
    #[arg(long = "motion", default_value_t = 0.0)]
    motion: f64,

    /// Motion blur direction in degrees
    #[arg(long = "motion-angle", default_value_t = 0.0, allow_negative_numbers = true)]
    motion_angle: f64,

    /// Noise reduction factor, 0.0 to 10000.0
    #[arg(short = 'n', long = "noise", default_value_t = 100.0)]
    noise: f64,

    /// Boundary conditions: mirror or period
    #[arg(short = 'b', long = "boundary", default_value = "mirror")]
    boundary: BoundaryMode,

    /// Area smoothness, 0.0 to 100.0
    #[arg(short = 's', long = "smoothness", default_value_t = 30.0)]
    smoothness: f64,

    /// Do not adapt the noise reduction to local image structure
    #[arg(short = 'a', long = "non-adaptive")]
    non_adaptive: bool,

    /// Save the result of every n-th iteration
    #[arg(short = 'm', long = "intermediate", default_value_t = 0)]
    intermediate: usize,

    /// Write ASCII instead of binary PNM
    #[arg(short = 'c', long = "ascii-pnm")]
    ascii_pnm: bool,

    /// Verbosity level 0..8
    #[arg(short = 'v', long = "verbosity", default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=8))]
    verbosity: u8,

    /// Window size for area smoothing, 1..16
    #[arg(short = 'w', long = "window", default_value_t = 3)]
    window: usize,

    /// Number of iterations to compute
    #[arg(short = 'i', long = "iterations", default_value_t = 100)]
    iterations: usize,

    /// Blurred input image; read from stdin and written to stdout when absent
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,

    /// Output image; defaults to NNNN<input name> next to the input
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Compression for TIFF output
    #[arg(long = "compression", value_enum, default_value_t = CompressionArg::None)]
    compression: CompressionArg,

    /// Seed for reproducible runs
    #[arg(long = "seed")]
    seed: Option<u64>,
}

impl Cli {
    fn config(&self, output: Option<&Path>) -> RefocusConfig {
        let output_format = output
            .and_then(OutputFormat::from_path)
            .unwrap_or_default();
        RefocusConfig::builder()
            .defocus_radius(self.radius)
            .gaussian_variance(self.gauss)
            .motion(self.motion, self.motion_angle)
            .noise_lambda(self.noise)
            .smoothness(self.smoothness)
            .window_size(self.window)
            .iterations(self.iterations)
            .boundary(self.boundary)
            .adaptive(!self.non_adaptive)
            .save_every(self.intermediate)
            .seed(self.seed)
            .output_format(output_format)
            .binary_pnm(!self.ascii_pnm)
            .compression(self.compression.into())
            .predictor(if matches!(self.compression, CompressionArg::None) { None } else { Some(2) })
            .build()
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init(logger::level_for_verbosity(cli.verbosity));
    debug!(?cli, "Parsed arguments");

    let output = match (&cli.file, &cli.output) {
        (_, Some(output)) => Some(output.clone()),
        (Some(input), None) => Some(intermediate_path(input, cli.iterations)?),
        (None, None) => None,
    };

    let pipeline = build_pipeline(&cli, output.as_deref(), interrupt_flag()?)?;

    match (&cli.file, output) {
        (Some(input), Some(output)) => {
            pipeline
                .convert_file(input, &output)
                .with_context(|| format!("failed to refocus {}", input.display()))?;
            info!(output = %output.display(), "Done");
        }
        (None, Some(output)) => {
            let data = read_stdin()?;
            pipeline
                .convert_to_path(&data, &output)
                .with_context(|| format!("failed to write {}", output.display()))?;
        }
        (_, None) => {
            let data = read_stdin()?;
            let stdout = std::io::stdout();
            let mut out = std::io::BufWriter::new(stdout.lock());
            pipeline.convert(&data, &mut out).context("failed to refocus stdin")?;
            out.flush().context("failed to flush stdout")?;
        }
    }

    Ok(())
}

/// Raised by Ctrl-C; the pipeline polls it between passes and stops with nothing written.
fn interrupt_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        warn!("Interrupted, stopping after the current pass");
        handler_flag.store(true, Ordering::Relaxed);
    })
    .context("failed to install Ctrl-C handler")?;
    Ok(flag)
}

fn build_pipeline(
    cli: &Cli,
    output: Option<&Path>,
    cancel: Arc<AtomicBool>,
) -> anyhow::Result<RefocusPipeline<AutoReader, StandardWriter>> {
    let pipeline = RefocusPipeline::new(cli.config(output)).context("invalid parameters")?;
    Ok(pipeline.with_cancel_flag(cancel))
}

fn read_stdin() -> anyhow::Result<Vec<u8>> {
    let mut data = Vec::new();
    std::io::stdin()
        .read_to_end(&mut data)
        .context("failed to read image from stdin")?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use refocus_rs::refocus::{ChannelImage, Raster, RefocusError};

    #[test]
    fn test_raised_flag_stops_cli_pipeline() {
        let cli = Cli::parse_from(["refocus_rs", "-r", "1", "-i", "5", "--seed", "3"]);
        let cancel = Arc::new(AtomicBool::new(false));
        let pipeline = build_pipeline(&cli, None, Arc::clone(&cancel)).unwrap();

        let image = ChannelImage::gray(Raster::filled(4, 4, 50.0).unwrap());
        assert!(pipeline.process(image.clone()).is_ok());

        cancel.store(true, Ordering::Relaxed);
        assert!(matches!(pipeline.process(image), Err(RefocusError::Cancelled(0))));
    }

    #[test]
    fn test_output_extension_selects_format() {
        let cli = Cli::parse_from(["refocus_rs", "--compression", "lzw"]);
        let config = cli.config(Some(Path::new("out.tiff")));
        assert_eq!(config.output_format, OutputFormat::Tiff);
        assert_eq!(config.compression, TiffCompression::Lzw);
        assert_eq!(config.predictor, Some(2));
    }
}
