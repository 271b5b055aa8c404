//! Refocus run configuration types

use std::path::Path;

use crate::refocus::common::error::{RefocusError, Result};
use crate::refocus::core::{BoundaryMode, Kernel};

pub const MAX_DEFOCUS_RADIUS: f64 = 32.0;
pub const MAX_GAUSSIAN_VARIANCE: f64 = 32.0;
pub const MAX_MOTION_LENGTH: f64 = 64.0;
pub const MAX_MOTION_ANGLE: f64 = 360.0;
pub const MAX_NOISE_LAMBDA: f64 = 10000.0;
pub const MAX_SMOOTHNESS: f64 = 100.0;
pub const MAX_WINDOW_SIZE: usize = 16;
pub const MAX_ITERATIONS: usize = 1000;

/// Smoothing is only worth running while the lambda floor stays below this.
pub const USABLE_MIN_LAMBDA: f64 = 0.999;

/// Variance of the Gaussian applied before measuring local variance.
pub const LAMBDA_FILTER_VARIANCE: f64 = 1.0;

/// TIFF compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffCompression {
    /// No compression (fastest, largest file)
    None,
    /// LZW compression
    Lzw,
    /// Deflate compression - fast level
    DeflateFast,
    /// Deflate compression - best compression (slower)
    DeflateBest,
    /// Deflate compression - balanced
    DeflateBalanced,
}

/// Container used when encoding the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Pnm,
    Tiff,
}

impl OutputFormat {
    /// Guesses the format from a file extension; `None` when unknown.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "tif" | "tiff" => Some(OutputFormat::Tiff),
            "pnm" | "pgm" | "ppm" => Some(OutputFormat::Pnm),
            _ => None,
        }
    }
}

/// Parameters of one refocus run.
#[derive(Debug, Clone)]
pub struct RefocusConfig {
    /// Radius of the defocus disc, `[0, 32]`
    pub defocus_radius: f64,
    /// Variance of the Gaussian blur, `[0, 32]`
    pub gaussian_variance: f64,
    /// Length of the motion streak, `[0, 64]`
    pub motion_length: f64,
    /// Direction of the motion streak in degrees
    pub motion_angle: f64,
    /// Noise reduction strength, `[0, 10000]`
    pub noise_lambda: f64,
    /// Area smoothness, `[0, 100)`; higher lets edges keep less smoothing
    pub smoothness: f64,
    /// Half-size of the local variance window, `[1, 16]`
    pub window_size: usize,
    /// Number of relaxation passes, `[1, 1000]`
    pub iterations: usize,
    pub boundary: BoundaryMode,
    /// Recompute the lambda field from the current estimate before every pass
    pub adaptive: bool,
    /// Save every n-th intermediate result; 0 saves only the final one
    pub save_every: usize,
    /// Seed for the step generator; drawn from entropy when `None`
    pub seed: Option<u64>,
    pub output_format: OutputFormat,
    /// Binary (P5/P6) rather than ASCII (P2/P3) PNM output
    pub binary_pnm: bool,
    pub compression: TiffCompression,
    /// Predictor value for TIFF compression (2 for horizontal differencing)
    pub predictor: Option<u16>,
}

impl Default for RefocusConfig {
    fn default() -> Self {
        Self {
            defocus_radius: 6.0,
            gaussian_variance: 0.0,
            motion_length: 0.0,
            motion_angle: 0.0,
            noise_lambda: 100.0,
            smoothness: 30.0,
            window_size: 3,
            iterations: 100,
            boundary: BoundaryMode::Mirror,
            adaptive: true,
            save_every: 0,
            seed: None,
            output_format: OutputFormat::Pnm,
            binary_pnm: true,
            compression: TiffCompression::None,
            predictor: None,
        }
    }
}

fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<()> {
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(RefocusError::InvalidParameter { name, value, min, max })
    }
}

impl RefocusConfig {
    pub fn builder() -> RefocusConfigBuilder {
        RefocusConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        check_range("defocus_radius", self.defocus_radius, 0.0, MAX_DEFOCUS_RADIUS)?;
        check_range("gaussian_variance", self.gaussian_variance, 0.0, MAX_GAUSSIAN_VARIANCE)?;
        check_range("motion_length", self.motion_length, 0.0, MAX_MOTION_LENGTH)?;
        check_range("motion_angle", self.motion_angle, -MAX_MOTION_ANGLE, MAX_MOTION_ANGLE)?;
        check_range("noise_lambda", self.noise_lambda, 0.0, MAX_NOISE_LAMBDA)?;
        if !(self.smoothness >= 0.0 && self.smoothness < MAX_SMOOTHNESS) {
            return Err(RefocusError::InvalidParameter {
                name: "smoothness",
                value: self.smoothness,
                min: 0.0,
                max: MAX_SMOOTHNESS,
            });
        }
        check_range("window_size", self.window_size as f64, 1.0, MAX_WINDOW_SIZE as f64)?;
        check_range("iterations", self.iterations as f64, 1.0, MAX_ITERATIONS as f64)?;
        check_range("save_every", self.save_every as f64, 0.0, MAX_ITERATIONS as f64)?;
        Ok(())
    }

    /// Floor of the lambda field, `exp(-smoothness / 4)`.
    pub fn min_lambda(&self) -> f64 {
        (-self.smoothness / 4.0).exp()
    }

    /// Global smoothing weight handed to the solver.
    pub fn effective_lambda(&self) -> f64 {
        self.noise_lambda / MAX_NOISE_LAMBDA * 0.001 / self.min_lambda()
    }

    /// Whether a lambda field is built at all.
    pub fn is_smooth(&self) -> bool {
        self.effective_lambda() > 1e-8 && self.min_lambda() < USABLE_MIN_LAMBDA
    }

    /// Whether the lambda field follows the estimate between passes.
    pub fn is_adaptive(&self) -> bool {
        self.adaptive && self.is_smooth()
    }

    /// Composed blur mask: defocus, then Gaussian, then motion.
    pub fn build_kernel(&self) -> Result<Kernel> {
        let defocus = Kernel::defocus(self.defocus_radius)?;
        let gaussian = Kernel::gaussian(self.gaussian_variance)?;
        let motion = Kernel::motion(self.motion_length, self.motion_angle)?;
        Kernel::compose([&defocus, &gaussian, &motion])
    }
}

/// Builder for RefocusConfig
#[derive(Default)]
pub struct RefocusConfigBuilder {
    defocus_radius: Option<f64>,
    gaussian_variance: Option<f64>,
    motion_length: Option<f64>,
    motion_angle: Option<f64>,
    noise_lambda: Option<f64>,
    smoothness: Option<f64>,
    window_size: Option<usize>,
    iterations: Option<usize>,
    boundary: Option<BoundaryMode>,
    adaptive: Option<bool>,
    save_every: Option<usize>,
    seed: Option<Option<u64>>,
    output_format: Option<OutputFormat>,
    binary_pnm: Option<bool>,
    compression: Option<TiffCompression>,
    predictor: Option<Option<u16>>,
}

impl RefocusConfigBuilder {
    pub fn defocus_radius(mut self, radius: f64) -> Self {
        self.defocus_radius = Some(radius);
        self
    }

    pub fn gaussian_variance(mut self, variance: f64) -> Self {
        self.gaussian_variance = Some(variance);
        self
    }

    pub fn motion(mut self, length: f64, angle: f64) -> Self {
        self.motion_length = Some(length);
        self.motion_angle = Some(angle);
        self
    }

    pub fn noise_lambda(mut self, lambda: f64) -> Self {
        self.noise_lambda = Some(lambda);
        self
    }

    pub fn smoothness(mut self, smoothness: f64) -> Self {
        self.smoothness = Some(smoothness);
        self
    }

    pub fn window_size(mut self, size: usize) -> Self {
        self.window_size = Some(size);
        self
    }

    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = Some(iterations);
        self
    }

    pub fn boundary(mut self, boundary: BoundaryMode) -> Self {
        self.boundary = Some(boundary);
        self
    }

    pub fn adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = Some(adaptive);
        self
    }

    pub fn save_every(mut self, n: usize) -> Self {
        self.save_every = Some(n);
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn binary_pnm(mut self, binary: bool) -> Self {
        self.binary_pnm = Some(binary);
        self
    }

    pub fn compression(mut self, compression: TiffCompression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn predictor(mut self, predictor: Option<u16>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn build(self) -> RefocusConfig {
        let default = RefocusConfig::default();
        RefocusConfig {
            defocus_radius: self.defocus_radius.unwrap_or(default.defocus_radius),
            gaussian_variance: self.gaussian_variance.unwrap_or(default.gaussian_variance),
            motion_length: self.motion_length.unwrap_or(default.motion_length),
            motion_angle: self.motion_angle.unwrap_or(default.motion_angle),
            noise_lambda: self.noise_lambda.unwrap_or(default.noise_lambda),
            smoothness: self.smoothness.unwrap_or(default.smoothness),
            window_size: self.window_size.unwrap_or(default.window_size),
            iterations: self.iterations.unwrap_or(default.iterations),
            boundary: self.boundary.unwrap_or(default.boundary),
            adaptive: self.adaptive.unwrap_or(default.adaptive),
            save_every: self.save_every.unwrap_or(default.save_every),
            seed: self.seed.unwrap_or(default.seed),
            output_format: self.output_format.unwrap_or(default.output_format),
            binary_pnm: self.binary_pnm.unwrap_or(default.binary_pnm),
            compression: self.compression.unwrap_or(default.compression),
            predictor: self.predictor.unwrap_or(default.predictor),
        }
    }
}
