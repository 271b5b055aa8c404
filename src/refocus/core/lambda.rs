//! Spatially varying regularization weight.
//!
//! Flat areas of the estimate get full smoothing (`1.0`); textured areas,
//! where local variance is high, get down to `min_lambda` so edges survive.

use tracing::debug;

use crate::refocus::common::buffer;
use crate::refocus::common::error::{RefocusError, Result};
use crate::refocus::core::boundary::{Boundary, BoundaryMode, Mirror, Periodic};
use crate::refocus::core::kernel::Kernel;
use crate::refocus::core::raster::Raster;

/// Variance spread below which the image is considered flat.
const DEGENERATE_VARIANCE_RANGE: f64 = 1e-9;

/// Extremes of the local variance seen during the last computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarianceRange {
    pub min: f64,
    pub max: f64,
}

impl VarianceRange {
    pub fn is_degenerate(&self) -> bool {
        self.max - self.min < DEGENERATE_VARIANCE_RANGE
    }
}

#[derive(Debug, Clone)]
pub struct LambdaField {
    width: usize,
    height: usize,
    winsize: usize,
    min_lambda: f64,
    boundary: BoundaryMode,
    nonlinear: bool,
    filter: Option<Kernel>,
    values: Vec<f64>,
}

impl LambdaField {
    /// Creates a uniform field of `1.0`; call [`LambdaField::compute`] to fill it.
    pub fn new(
        width: usize,
        height: usize,
        min_lambda: f64,
        winsize: usize,
        filter: Option<Kernel>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RefocusError::InvalidDimensions(width, height));
        }
        if !(min_lambda > 0.0 && min_lambda <= 1.0) {
            return Err(RefocusError::InvalidParameter {
                name: "min_lambda",
                value: min_lambda,
                min: f64::MIN_POSITIVE,
                max: 1.0,
            });
        }
        let mut values = buffer::zeroed(buffer::area(width, height)?)?;
        values.fill(1.0);
        Ok(Self {
            width,
            height,
            winsize,
            min_lambda,
            boundary: BoundaryMode::Mirror,
            nonlinear: false,
            filter,
            values,
        })
    }

    pub fn with_boundary(mut self, boundary: BoundaryMode) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_nonlinear(mut self, nonlinear: bool) -> Self {
        self.nonlinear = nonlinear;
        self
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn winsize(&self) -> usize {
        self.winsize
    }

    pub fn boundary(&self) -> BoundaryMode {
        self.boundary
    }

    pub fn is_nonlinear(&self) -> bool {
        self.nonlinear
    }

    pub fn min_lambda(&self) -> f64 {
        self.min_lambda
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.values[y * self.width + x]
    }

    #[inline]
    pub fn get_with<B: Boundary>(&self, x: isize, y: isize) -> f64 {
        self.values[B::resolve(y, self.height) * self.width + B::resolve(x, self.width)]
    }

    /// Recomputes every value from the local variance of `image`.
    pub fn compute(&mut self, image: &Raster) -> Result<VarianceRange> {
        image.ensure_same_size(self.width, self.height)?;

        let smoothed;
        let source = match &self.filter {
            Some(filter) => {
                smoothed = image.convolved(filter, self.boundary)?;
                &smoothed
            }
            None => image,
        };

        let mut variance = buffer::zeroed(self.values.len())?;
        let range = match self.boundary {
            BoundaryMode::Mirror => local_variance::<Mirror>(source, self.winsize, &mut variance),
            BoundaryMode::Periodic => local_variance::<Periodic>(source, self.winsize, &mut variance),
        };

        if range.is_degenerate() {
            debug!(min = range.min, max = range.max, "flat variance, using uniform lambda");
            self.values.fill(1.0);
            return Ok(range);
        }

        let min_lambda = self.min_lambda;
        if self.nonlinear {
            let alpha = (1.0 - min_lambda) / (min_lambda * (range.max - range.min));
            for (value, &var) in self.values.iter_mut().zip(&variance) {
                *value = 1.0 / (1.0 + alpha * (var - range.min));
            }
        } else {
            let b = (1.0 - min_lambda) / (range.min - range.max);
            let a = 1.0 - range.min * b;
            for (value, &var) in self.values.iter_mut().zip(&variance) {
                *value = a + b * var;
            }
        }

        debug!(
            min_var = range.min,
            max_var = range.max,
            nonlinear = self.nonlinear,
            "computed lambda field"
        );
        Ok(range)
    }
}

/// Windowed variance of every pixel; returns the global extremes.
fn local_variance<B: Boundary>(image: &Raster, winsize: usize, out: &mut [f64]) -> VarianceRange {
    let w = winsize as isize;
    let count = ((2 * winsize + 1) * (2 * winsize + 1)) as f64;
    let (width, height) = image.dimensions();
    let mut range = VarianceRange {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    };

    for j in 0..height {
        for i in 0..width {
            let (x, y) = (i as isize, j as isize);
            let mut sum = 0.0;
            let mut sum2 = 0.0;
            for l in -w..=w {
                for k in -w..=w {
                    let c = image.get_with::<B>(x + k, y + l);
                    sum += c;
                    sum2 += c * c;
                }
            }
            let mean = sum / count;
            let var = (sum2 / count - mean * mean).max(0.0);
            out[j * width + i] = var;
            range.min = range.min.min(var);
            range.max = range.max.max(var);
        }
    }
    range
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_image() -> Raster {
        let mut image = Raster::new(12, 8).unwrap();
        for y in 0..8 {
            for x in 6..12 {
                image.set(x, y, 200.0);
            }
        }
        image
    }

    #[test]
    fn test_flat_image_gives_uniform_field() {
        let image = Raster::filled(6, 6, 77.0).unwrap();
        for nonlinear in [false, true] {
            for boundary in [BoundaryMode::Mirror, BoundaryMode::Periodic] {
                let mut field = LambdaField::new(6, 6, 0.05, 2, Some(Kernel::gaussian(1.0).unwrap()))
                    .unwrap()
                    .with_boundary(boundary)
                    .with_nonlinear(nonlinear);
                let range = field.compute(&image).unwrap();
                assert!(range.is_degenerate());
                assert!(field.values().iter().all(|&v| v == 1.0));
            }
        }
    }

    #[test]
    fn test_linear_mapping_endpoints() {
        let image = edge_image();
        let mut field = LambdaField::new(12, 8, 0.1, 1, None)
            .unwrap()
            .with_boundary(BoundaryMode::Mirror);
        field.compute(&image).unwrap();
        let (lo, hi) = field
            .values()
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        assert!((lo - 0.1).abs() < 1e-9);
        assert!((hi - 1.0).abs() < 1e-9);
        // Far from the edge the image is flat.
        assert!((field.get(0, 4) - 1.0).abs() < 1e-9);
        assert!(field.get(6, 4) < 0.5);
    }

    #[test]
    fn test_nonlinear_mapping_range() {
        let image = edge_image();
        let mut field = LambdaField::new(12, 8, 0.2, 2, Some(Kernel::gaussian(1.0).unwrap()))
            .unwrap()
            .with_boundary(BoundaryMode::Mirror)
            .with_nonlinear(true);
        field.compute(&image).unwrap();
        for &v in field.values() {
            assert!(v > 0.0 && v <= 1.0);
            assert!(v >= 0.2 - 1e-9);
        }
        let hi = field.values().iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!((hi - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_periodic_wraps_edge_into_border() {
        // With wrap-around the left border sees the bright right half.
        let image = edge_image();
        let mut periodic = LambdaField::new(12, 8, 0.1, 1, None)
            .unwrap()
            .with_boundary(BoundaryMode::Periodic);
        periodic.compute(&image).unwrap();
        let mut mirror = LambdaField::new(12, 8, 0.1, 1, None).unwrap();
        mirror.compute(&image).unwrap();
        assert!(periodic.get(0, 3) < 0.5);
        assert!((mirror.get(0, 3) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_min_lambda_rejected() {
        assert!(LambdaField::new(4, 4, 0.0, 1, None).is_err());
        assert!(LambdaField::new(4, 4, 1.5, 1, None).is_err());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut field = LambdaField::new(4, 4, 0.5, 1, None).unwrap();
        let image = Raster::new(5, 4).unwrap();
        assert!(matches!(
            field.compute(&image),
            Err(RefocusError::DimensionMismatch { .. })
        ));
    }
}
