//! Single-channel real-valued image.

use crate::refocus::common::buffer;
use crate::refocus::common::error::{RefocusError, Result};
use crate::refocus::core::boundary::{Boundary, BoundaryMode, Mirror, Periodic};
use crate::refocus::core::kernel::Kernel;

/// Row-major grid of intensities, nominally in `[0, 255]`.
///
/// Values are not clamped; the solver keeps its own estimate in range.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl Raster {
    /// Allocates a zero-filled raster.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RefocusError::InvalidDimensions(width, height));
        }
        let data = buffer::zeroed(buffer::area(width, height)?)?;
        Ok(Self { width, height, data })
    }

    /// Wraps existing row-major samples.
    pub fn from_vec(width: usize, height: usize, data: Vec<f64>) -> Result<Self> {
        if width == 0 || height == 0 || buffer::area(width, height)? != data.len() {
            return Err(RefocusError::InvalidDimensions(width, height));
        }
        Ok(Self { width, height, data })
    }

    /// Raster of the same size as `self`, zero-filled.
    pub fn zeroed_like(&self) -> Result<Self> {
        Self::new(self.width, self.height)
    }

    pub fn filled(width: usize, height: usize, value: f64) -> Result<Self> {
        let mut raster = Self::new(width, height)?;
        raster.data.fill(value);
        Ok(raster)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        debug_assert!(x < self.width && y < self.height);
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f64) {
        debug_assert!(x < self.width && y < self.height);
        self.data[y * self.width + x] = value;
    }

    /// Sample at any integer coordinate, resolved by the strategy `B`.
    #[inline]
    pub fn get_with<B: Boundary>(&self, x: isize, y: isize) -> f64 {
        self.data[B::resolve(y, self.height) * self.width + B::resolve(x, self.width)]
    }

    pub fn get_mirror(&self, x: isize, y: isize) -> f64 {
        self.get_with::<Mirror>(x, y)
    }

    pub fn get_period(&self, x: isize, y: isize) -> f64 {
        self.get_with::<Periodic>(x, y)
    }

    pub fn get_extended(&self, mode: BoundaryMode, x: isize, y: isize) -> f64 {
        match mode {
            BoundaryMode::Mirror => self.get_mirror(x, y),
            BoundaryMode::Periodic => self.get_period(x, y),
        }
    }

    pub(crate) fn ensure_same_size(&self, width: usize, height: usize) -> Result<()> {
        if self.width != width || self.height != height {
            return Err(RefocusError::DimensionMismatch {
                expected_width: width,
                expected_height: height,
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Convolves `src` with `kernel` into `dst`.
    ///
    /// `dst(i, j) = sum kernel(k, l) * src(i - k, j - l)` with out-of-range
    /// samples taken from the boundary extension.
    pub fn convolve(dst: &mut Raster, src: &Raster, kernel: &Kernel, mode: BoundaryMode) -> Result<()> {
        dst.ensure_same_size(src.width, src.height)?;
        match mode {
            BoundaryMode::Mirror => convolve_with::<Mirror>(dst, src, kernel),
            BoundaryMode::Periodic => convolve_with::<Periodic>(dst, src, kernel),
        }
        Ok(())
    }

    /// Allocating variant of [`Raster::convolve`].
    pub fn convolved(&self, kernel: &Kernel, mode: BoundaryMode) -> Result<Raster> {
        let mut dst = self.zeroed_like()?;
        Self::convolve(&mut dst, self, kernel, mode)?;
        Ok(dst)
    }

    pub fn min_max(&self) -> (f64, f64) {
        self.data
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }
}

fn convolve_with<B: Boundary>(dst: &mut Raster, src: &Raster, kernel: &Kernel) {
    let r = kernel.radius() as isize;
    for j in 0..src.height {
        for i in 0..src.width {
            let (x, y) = (i as isize, j as isize);
            let mut value = 0.0;
            for l in -r..=r {
                for k in -r..=r {
                    value += kernel.get(k, l) * src.get_with::<B>(x - k, y - l);
                }
            }
            dst.set(i, j, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize) -> Raster {
        let data = (0..width * height).map(|v| (v * 7 % 256) as f64).collect();
        Raster::from_vec(width, height, data).unwrap()
    }

    #[test]
    fn test_new_is_zeroed() {
        let raster = Raster::new(3, 2).unwrap();
        assert_eq!(raster.dimensions(), (3, 2));
        assert!(raster.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(matches!(Raster::new(0, 4), Err(RefocusError::InvalidDimensions(0, 4))));
        assert!(Raster::from_vec(2, 2, vec![0.0; 3]).is_err());
    }

    #[test]
    fn test_boundary_access() {
        let raster = ramp(4, 3);
        assert_eq!(raster.get_mirror(-1, 0), raster.get(1, 0));
        assert_eq!(raster.get_mirror(4, 2), raster.get(2, 2));
        assert_eq!(raster.get_period(-1, -1), raster.get(3, 2));
        assert_eq!(raster.get_period(4, 3), raster.get(0, 0));
        assert_eq!(raster.get_extended(BoundaryMode::Mirror, 1, 1), raster.get(1, 1));
    }

    #[test]
    fn test_identity_convolution_round_trip() {
        let raster = ramp(5, 4);
        let identity = Kernel::identity();
        for mode in [BoundaryMode::Mirror, BoundaryMode::Periodic] {
            let out = raster.convolved(&identity, mode).unwrap();
            assert_eq!(out, raster);
        }
    }

    #[test]
    fn test_convolution_preserves_flat_field() {
        let raster = Raster::filled(6, 5, 42.0).unwrap();
        let kernel = Kernel::gaussian(1.5).unwrap();
        for mode in [BoundaryMode::Mirror, BoundaryMode::Periodic] {
            let out = raster.convolved(&kernel, mode).unwrap();
            assert!(out.data().iter().all(|&v| (v - 42.0).abs() < 1e-9));
        }
    }

    #[test]
    fn test_convolution_is_true_convolution() {
        // A one-sided kernel shifts the image towards positive offsets.
        let mut kernel = Kernel::new(1).unwrap();
        kernel.set(1, 0, 1.0);
        let raster = ramp(5, 1);
        let out = raster.convolved(&kernel, BoundaryMode::Periodic).unwrap();
        for i in 0..5 {
            assert_eq!(out.get(i, 0), raster.get_period(i as isize - 1, 0));
        }
    }

    #[test]
    fn test_convolve_dimension_mismatch() {
        let src = Raster::new(4, 4).unwrap();
        let mut dst = Raster::new(4, 3).unwrap();
        let result = Raster::convolve(&mut dst, &src, &Kernel::identity(), BoundaryMode::Mirror);
        assert!(matches!(result, Err(RefocusError::DimensionMismatch { .. })));
    }
}
