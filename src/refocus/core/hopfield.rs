//! Stochastic relaxation of the restoration energy.
//!
//! The energy of an estimate `u` is
//!
//! ```text
//! E(u) = 1/2 |h * u - g|^2 + lambda/2 |L u|^2
//! ```
//!
//! with `h` the blur mask, `g` the degraded input and `L` the 5-point
//! Laplacian (optionally weighted per pixel by a [`LambdaField`]). Each pass
//! visits every pixel once and moves it by a random integer step towards the
//! minimum of the one-dimensional quadratic through that pixel, only when the
//! move lowers the energy.

use std::marker::PhantomData;
use std::ops::AddAssign;

use rand::Rng;
use tracing::{debug, trace, warn};

use crate::refocus::common::error::{RefocusError, Result};
use crate::refocus::core::boundary::{Boundary, BoundaryMode, Mirror, Periodic};
use crate::refocus::core::kernel::Kernel;
use crate::refocus::core::lambda::{LambdaField, VarianceRange};
use crate::refocus::core::raster::Raster;
use crate::refocus::core::threshold::EnergyThreshold;
use crate::refocus::core::weights::EnergyWeights;

/// Largest representable intensity of the estimate.
pub const MAX_INTENSITY: i64 = 255;

/// Global smoothing weights at or below this disable the lambda field.
pub const MIN_EFFECTIVE_LAMBDA: f64 = 1e-8;

/// Steps never exceed the intensity range, so larger ratios are clamped.
const MAX_STEP_RATIO: f64 = 2.0 * MAX_INTENSITY as f64;

/// Offsets of the smoothing stencil; entry 0 is the centre.
pub const STENCIL_OFFSETS: [(isize, isize); 13] = [
    (0, 0),
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (2, 0),
    (-2, 0),
    (0, 2),
    (0, -2),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Squared 5-point Laplacian, laid out as [`STENCIL_OFFSETS`].
pub const BIHARMONIC_COEFFICIENTS: [f64; 13] = [
    20.0, -8.0, -8.0, -8.0, -8.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0,
];

/// Source of the smoothing-stencil coefficients at a pixel.
pub trait SmoothingStencil {
    fn coefficients(&self, x: usize, y: usize) -> [f64; 13];
}

/// The same biharmonic stencil everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantStencil;

impl SmoothingStencil for ConstantStencil {
    #[inline]
    fn coefficients(&self, _x: usize, _y: usize) -> [f64; 13] {
        BIHARMONIC_COEFFICIENTS
    }
}

/// Biharmonic stencil reweighted by the lambda field around each pixel.
///
/// With a uniform field of `1.0` this reproduces [`ConstantStencil`] exactly.
/// For other fields it is a heuristic: it keeps the stencil shape but is not
/// derived from a weighted energy.
pub struct AdaptiveStencil<'a, B> {
    field: &'a LambdaField,
    _boundary: PhantomData<B>,
}

impl<'a, B: Boundary> AdaptiveStencil<'a, B> {
    pub fn new(field: &'a LambdaField) -> Self {
        Self {
            field,
            _boundary: PhantomData,
        }
    }
}

impl<B: Boundary> SmoothingStencil for AdaptiveStencil<'_, B> {
    #[inline]
    fn coefficients(&self, x: usize, y: usize) -> [f64; 13] {
        let (x, y) = (x as isize, y as isize);
        let c = self.field.get_with::<B>(x, y);
        let right = self.field.get_with::<B>(x + 1, y);
        let left = self.field.get_with::<B>(x - 1, y);
        let down = self.field.get_with::<B>(x, y + 1);
        let up = self.field.get_with::<B>(x, y - 1);
        [
            down + right + left + up + 16.0 * c,
            -4.0 * (right + c),
            -4.0 * (c + left),
            -4.0 * (down + c),
            -4.0 * (c + up),
            right,
            left,
            down,
            up,
            right + down,
            right + up,
            down + left,
            up + left,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Ready,
    Iterating,
    Done,
}

/// Outcome of one relaxation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PassStats {
    /// Twice the energy change of the accepted moves; never positive.
    pub energy_delta: f64,
    /// Pixels moved by a non-zero step.
    pub updated_pixels: usize,
}

impl AddAssign for PassStats {
    fn add_assign(&mut self, rhs: Self) {
        self.energy_delta += rhs.energy_delta;
        self.updated_pixels += rhs.updated_pixels;
    }
}

/// Restores one channel.
pub struct HopfieldSolver<R: Rng> {
    image: Raster,
    weights: EnergyWeights,
    threshold: EnergyThreshold,
    lambda_field: Option<LambdaField>,
    lambda: f64,
    boundary: BoundaryMode,
    rng: R,
    state: SolverState,
    passes: usize,
}

impl<R: Rng> HopfieldSolver<R> {
    /// Builds weights and threshold for `kernel`; `image` is the degraded channel
    /// and becomes the initial estimate.
    pub fn new(kernel: &Kernel, image: Raster, boundary: BoundaryMode, rng: R) -> Result<Self> {
        let weights = EnergyWeights::build(kernel)?;
        let threshold = EnergyThreshold::build(kernel, &image, boundary)?;
        Self::from_parts(image, weights, threshold, boundary, rng)
    }

    pub fn from_parts(
        image: Raster,
        weights: EnergyWeights,
        threshold: EnergyThreshold,
        boundary: BoundaryMode,
        rng: R,
    ) -> Result<Self> {
        let (width, height) = threshold.dimensions();
        image.ensure_same_size(width, height)?;
        Ok(Self {
            image,
            weights,
            threshold,
            lambda_field: None,
            lambda: 0.0,
            boundary,
            rng,
            state: SolverState::Ready,
            passes: 0,
        })
    }

    /// Global smoothing strength.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda.max(0.0);
        self
    }

    /// Attaches a per-pixel weighting of the smoothing term.
    pub fn with_lambda_field(mut self, field: LambdaField) -> Result<Self> {
        let (width, height) = field.dimensions();
        self.image.ensure_same_size(width, height)?;
        if field.boundary() != self.boundary {
            return Err(RefocusError::BoundaryMismatch {
                field: field.boundary(),
                solver: self.boundary,
            });
        }
        self.lambda_field = Some(field);
        Ok(self)
    }

    pub fn image(&self) -> &Raster {
        &self.image
    }

    pub fn into_image(self) -> Raster {
        self.image
    }

    pub fn weights(&self) -> &EnergyWeights {
        &self.weights
    }

    pub fn threshold(&self) -> &EnergyThreshold {
        &self.threshold
    }

    pub fn lambda_field(&self) -> Option<&LambdaField> {
        self.lambda_field.as_ref()
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn boundary(&self) -> BoundaryMode {
        self.boundary
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Whether passes use the lambda field rather than the constant stencil.
    pub fn is_adaptive(&self) -> bool {
        self.lambda_field.is_some() && self.lambda > MIN_EFFECTIVE_LAMBDA
    }

    /// Recomputes the attached lambda field from the current estimate.
    pub fn refresh_lambda_field(&mut self) -> Result<Option<VarianceRange>> {
        match self.lambda_field.as_mut() {
            Some(field) => field.compute(&self.image).map(Some),
            None => Ok(None),
        }
    }

    /// No further passes will be run.
    pub fn finish(&mut self) {
        self.state = SolverState::Done;
    }

    /// Runs one relaxation pass over every pixel in row-major order.
    pub fn iterate(&mut self) -> PassStats {
        if self.state == SolverState::Done {
            warn!("iterate called on a finished solver");
            return PassStats::default();
        }
        self.state = SolverState::Iterating;

        let adaptive = self.is_adaptive();
        let Self {
            image,
            weights,
            threshold,
            lambda_field,
            lambda,
            boundary,
            rng,
            ..
        } = self;
        let pass = Pass {
            weights,
            threshold,
            lambda: *lambda,
        };

        let field = lambda_field.as_ref().filter(|_| adaptive);
        let stats = match (*boundary, field) {
            (BoundaryMode::Mirror, Some(field)) => {
                pass.run::<Mirror, _, _>(image, &AdaptiveStencil::<Mirror>::new(field), rng)
            }
            (BoundaryMode::Mirror, None) => pass.run::<Mirror, _, _>(image, &ConstantStencil, rng),
            (BoundaryMode::Periodic, Some(field)) => {
                pass.run::<Periodic, _, _>(image, &AdaptiveStencil::<Periodic>::new(field), rng)
            }
            (BoundaryMode::Periodic, None) => pass.run::<Periodic, _, _>(image, &ConstantStencil, rng),
        };

        self.passes += 1;
        trace!(
            pass = self.passes,
            energy_delta = stats.energy_delta,
            updated = stats.updated_pixels,
            "relaxation pass"
        );
        stats
    }

    /// Convenience loop; marks the solver finished afterwards.
    pub fn run(&mut self, passes: usize) -> PassStats {
        let mut total = PassStats::default();
        for _ in 0..passes {
            total += self.iterate();
        }
        self.finish();
        debug!(
            passes,
            energy_delta = total.energy_delta,
            updated = total.updated_pixels,
            "relaxation finished"
        );
        total
    }
}

/// Read-only inputs of a pass.
struct Pass<'a> {
    weights: &'a EnergyWeights,
    threshold: &'a EnergyThreshold,
    lambda: f64,
}

impl Pass<'_> {
    fn run<B: Boundary, S: SmoothingStencil, R: Rng>(
        &self,
        image: &mut Raster,
        stencil: &S,
        rng: &mut R,
    ) -> PassStats {
        let (width, height) = image.dimensions();
        let nzx = self.weights.nzx() as isize;
        let nzy = self.weights.nzy() as isize;
        let w00 = self.weights.center();
        let mut stats = PassStats::default();

        for j in 0..height {
            for i in 0..width {
                let (x, y) = (i as isize, j as isize);

                let mut s = 0.0;
                for q in -nzy..=nzy {
                    for p in -nzx..=nzx {
                        s += self.weights.get(p, q) * image.get_with::<B>(x + p, y + q);
                    }
                }

                let coef = stencil.coefficients(i, j);
                let z: f64 = STENCIL_OFFSETS
                    .iter()
                    .zip(coef.iter())
                    .map(|(&(dx, dy), &c)| c * image.get_with::<B>(x + dx, y + dy))
                    .sum();
                s -= self.lambda * z;
                s += self.threshold.get(i, j);

                // Negated curvature of the energy along this pixel; always < 0.
                let pom = w00 - coef[0] * self.lambda;
                let value = ((image.get(i, j) + 0.5).floor() as i64).clamp(0, MAX_INTENSITY);

                let dui: i64 = if s >= 0.0 { 1 } else { -1 };
                if -2.0 * s * dui as f64 - pom >= 0.0 {
                    continue;
                }

                let ratio = (s / pom).trunc().clamp(-MAX_STEP_RATIO, MAX_STEP_RATIO) as i64;
                let k = -ratio + dui;
                let dk = if k > 0 && value < MAX_INTENSITY {
                    rng.gen_range(1..=k.min(MAX_INTENSITY - value))
                } else if k < 0 && value > 0 {
                    -rng.gen_range(1..=(-k).min(value))
                } else {
                    0
                };
                if dk != 0 {
                    let dkf = dk as f64;
                    stats.energy_delta += (-2.0 * s - pom * dkf) * dkf;
                    stats.updated_pixels += 1;
                }
                image.set(i, j, (value + dk) as f64);
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seeded_rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn blurred_square(size: usize, kernel: &Kernel, boundary: BoundaryMode) -> Raster {
        let mut sharp = Raster::filled(size, size, 40.0).unwrap();
        for y in size / 4..3 * size / 4 {
            for x in size / 4..3 * size / 4 {
                sharp.set(x, y, 220.0);
            }
        }
        let blurred = sharp.convolved(kernel, boundary).unwrap();
        let data = blurred.data().iter().map(|v| v.round()).collect();
        Raster::from_vec(size, size, data).unwrap()
    }

    #[test]
    fn test_constant_stencil_matches_uniform_adaptive_stencil() {
        let field = LambdaField::new(4, 4, 0.5, 1, None).unwrap();
        let adaptive = AdaptiveStencil::<Mirror>::new(&field);
        assert_eq!(adaptive.coefficients(2, 1), ConstantStencil.coefficients(2, 1));
        assert_eq!(BIHARMONIC_COEFFICIENTS.iter().sum::<f64>(), 0.0);
    }

    #[test]
    fn test_state_transitions() {
        let kernel = Kernel::defocus(1.0).unwrap();
        let image = Raster::filled(6, 6, 100.0).unwrap();
        let mut solver = HopfieldSolver::new(&kernel, image, BoundaryMode::Mirror, seeded_rng()).unwrap();
        assert_eq!(solver.state(), SolverState::Ready);
        solver.iterate();
        assert_eq!(solver.state(), SolverState::Iterating);
        assert_eq!(solver.passes(), 1);
        solver.finish();
        assert_eq!(solver.state(), SolverState::Done);
        assert_eq!(solver.iterate(), PassStats::default());
        assert_eq!(solver.passes(), 1);
    }

    #[test]
    fn test_identity_kernel_leaves_integer_image_unchanged() {
        let data = (0..25).map(|v| (v * 10) as f64).collect();
        let image = Raster::from_vec(5, 5, data).unwrap();
        let mut solver =
            HopfieldSolver::new(&Kernel::identity(), image.clone(), BoundaryMode::Periodic, seeded_rng()).unwrap();
        let stats = solver.run(5);
        assert_eq!(stats.updated_pixels, 0);
        assert_eq!(solver.image(), &image);
    }

    #[test]
    fn test_pass_keeps_range_and_never_raises_energy() {
        let kernel = Kernel::defocus(2.0).unwrap();
        for boundary in [BoundaryMode::Mirror, BoundaryMode::Periodic] {
            for adaptive in [false, true] {
                let image = blurred_square(16, &kernel, boundary);
                let mut solver = HopfieldSolver::new(&kernel, image, boundary, seeded_rng())
                    .unwrap()
                    .with_lambda(1e-4);
                if adaptive {
                    let field = LambdaField::new(16, 16, 0.1, 2, Some(Kernel::gaussian(1.0).unwrap()))
                        .unwrap()
                        .with_boundary(boundary)
                        .with_nonlinear(true);
                    solver = solver.with_lambda_field(field).unwrap();
                }
                let mut moved = 0;
                for _ in 0..10 {
                    if adaptive {
                        solver.refresh_lambda_field().unwrap();
                    }
                    let stats = solver.iterate();
                    assert!(stats.energy_delta <= 0.0, "{boundary} adaptive={adaptive}");
                    assert!(solver.image().data().iter().all(|&v| (0.0..=255.0).contains(&v)));
                    moved += stats.updated_pixels;
                }
                assert!(moved > 0);
            }
        }
    }

    #[test]
    fn test_same_seed_same_result() {
        let kernel = Kernel::defocus(1.5).unwrap();
        let image = blurred_square(12, &kernel, BoundaryMode::Mirror);
        let run = |seed| {
            let mut solver =
                HopfieldSolver::new(&kernel, image.clone(), BoundaryMode::Mirror, StdRng::seed_from_u64(seed))
                    .unwrap();
            solver.run(5);
            solver.into_image()
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn test_uniform_field_equals_plain_regularization() {
        let kernel = Kernel::gaussian(1.0).unwrap();
        for boundary in [BoundaryMode::Mirror, BoundaryMode::Periodic] {
            let image = blurred_square(10, &kernel, boundary);
            let mut plain = HopfieldSolver::new(&kernel, image.clone(), boundary, seeded_rng())
                .unwrap()
                .with_lambda(5e-3);
            let field = LambdaField::new(10, 10, 0.3, 1, None).unwrap().with_boundary(boundary);
            let mut adaptive = HopfieldSolver::new(&kernel, image, boundary, seeded_rng())
                .unwrap()
                .with_lambda(5e-3)
                .with_lambda_field(field)
                .unwrap();
            assert!(adaptive.is_adaptive());
            for _ in 0..4 {
                assert_eq!(plain.iterate(), adaptive.iterate());
            }
            assert_eq!(plain.image(), adaptive.image());
        }
    }

    #[test]
    fn test_lambda_field_ignored_without_smoothing() {
        let kernel = Kernel::defocus(1.0).unwrap();
        let image = Raster::filled(4, 4, 10.0).unwrap();
        let field = LambdaField::new(4, 4, 0.5, 1, None).unwrap();
        let solver = HopfieldSolver::new(&kernel, image, BoundaryMode::Mirror, seeded_rng())
            .unwrap()
            .with_lambda_field(field)
            .unwrap();
        assert!(!solver.is_adaptive());
    }

    #[test]
    fn test_lambda_field_size_checked() {
        let kernel = Kernel::identity();
        let image = Raster::filled(4, 4, 10.0).unwrap();
        let field = LambdaField::new(5, 4, 0.5, 1, None).unwrap();
        let solver = HopfieldSolver::new(&kernel, image, BoundaryMode::Mirror, seeded_rng()).unwrap();
        assert!(solver.with_lambda_field(field).is_err());
    }

    #[test]
    fn test_lambda_field_boundary_must_match() {
        let kernel = Kernel::identity();
        let image = Raster::filled(4, 4, 10.0).unwrap();
        let field = LambdaField::new(4, 4, 0.5, 1, None)
            .unwrap()
            .with_boundary(BoundaryMode::Mirror);
        let solver = HopfieldSolver::new(&kernel, image, BoundaryMode::Periodic, seeded_rng()).unwrap();
        assert!(matches!(
            solver.with_lambda_field(field),
            Err(RefocusError::BoundaryMismatch {
                field: BoundaryMode::Mirror,
                solver: BoundaryMode::Periodic,
            })
        ));
    }
}
