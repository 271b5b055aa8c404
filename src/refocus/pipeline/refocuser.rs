//! Per-run orchestration of one solver per channel.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::refocus::common::error::Result;
use crate::refocus::config::types::LAMBDA_FILTER_VARIANCE;
use crate::refocus::config::RefocusConfig;
use crate::refocus::core::{HopfieldSolver, Kernel, LambdaField, PassStats};
use crate::refocus::io::ChannelImage;

/// Restores all channels of an image in lock step.
pub struct Refocuser<R: Rng = StdRng> {
    solvers: Vec<HopfieldSolver<R>>,
    adaptive: bool,
    iterations_done: usize,
    scale: f64,
}

impl Refocuser<StdRng> {
    /// Channel generators are derived from `config.seed`, or from entropy when unset.
    pub fn new(config: &RefocusConfig, image: ChannelImage) -> Result<Self> {
        let mut seeds = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rngs(config, image, |_| StdRng::seed_from_u64(seeds.r#gen()))
    }
}

impl<R: Rng> Refocuser<R> {
    /// Builds the solvers; `make_rng` is called once per channel index.
    pub fn with_rngs<F>(config: &RefocusConfig, image: ChannelImage, mut make_rng: F) -> Result<Self>
    where
        F: FnMut(usize) -> R,
    {
        config.validate()?;

        let kernel = config.build_kernel()?;
        let lambda = config.effective_lambda();
        let smooth = config.is_smooth();
        let adaptive = config.is_adaptive();
        let filter = if smooth {
            Some(Kernel::gaussian(LAMBDA_FILTER_VARIANCE)?)
        } else {
            None
        };

        info!(
            kernel_radius = kernel.radius(),
            boundary = %config.boundary,
            lambda,
            min_lambda = config.min_lambda(),
            smooth,
            adaptive,
            channels = image.channel_count(),
            "Preparing refocus"
        );

        let (width, height) = (image.width, image.height);
        let scale = image.scale;
        let mut solvers = Vec::with_capacity(image.channel_count());
        for (index, channel) in image.channels.into_iter().enumerate() {
            let mut solver =
                HopfieldSolver::new(&kernel, channel, config.boundary, make_rng(index))?.with_lambda(lambda);
            if smooth {
                let field = LambdaField::new(width, height, config.min_lambda(), config.window_size, filter.clone())?
                    .with_boundary(config.boundary)
                    .with_nonlinear(true);
                solver = solver.with_lambda_field(field)?;
                if !adaptive {
                    // Fixed for the whole run, measured on the degraded input.
                    solver.refresh_lambda_field()?;
                }
            }
            solvers.push(solver);
        }

        Ok(Self {
            solvers,
            adaptive,
            iterations_done: 0,
            scale,
        })
    }

    /// One relaxation pass over every channel.
    pub fn step(&mut self) -> Result<PassStats> {
        let mut total = PassStats::default();
        for solver in &mut self.solvers {
            if self.adaptive {
                solver.refresh_lambda_field()?;
            }
            total += solver.iterate();
        }
        self.iterations_done += 1;
        debug!(
            iteration = self.iterations_done,
            energy_delta = total.energy_delta,
            updated = total.updated_pixels,
            "iteration finished"
        );
        Ok(total)
    }

    pub fn iterations_done(&self) -> usize {
        self.iterations_done
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    pub fn channel_count(&self) -> usize {
        self.solvers.len()
    }

    pub fn solvers(&self) -> &[HopfieldSolver<R>] {
        &self.solvers
    }

    /// Copy of the current estimate.
    pub fn snapshot(&self) -> Result<ChannelImage> {
        let channels = self.solvers.iter().map(|s| s.image().clone()).collect();
        ChannelImage::new(channels, self.scale)
    }

    /// Stops the solvers and hands back the estimate.
    pub fn finish(self) -> Result<ChannelImage> {
        let channels = self
            .solvers
            .into_iter()
            .map(|mut solver| {
                solver.finish();
                solver.into_image()
            })
            .collect();
        ChannelImage::new(channels, self.scale)
    }
}
