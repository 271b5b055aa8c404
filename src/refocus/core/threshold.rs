//! Per-pixel bias of the Hopfield energy, `h^T g` for the degraded image `g`.

use crate::refocus::common::buffer;
use crate::refocus::common::error::Result;
use crate::refocus::core::boundary::{Boundary, BoundaryMode, Mirror, Periodic};
use crate::refocus::core::kernel::Kernel;
use crate::refocus::core::raster::Raster;

/// Computed once from the degraded input and never updated during a solve.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyThreshold {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl EnergyThreshold {
    pub fn build(kernel: &Kernel, image: &Raster, mode: BoundaryMode) -> Result<Self> {
        match mode {
            BoundaryMode::Mirror => Self::build_with::<Mirror>(kernel, image),
            BoundaryMode::Periodic => Self::build_with::<Periodic>(kernel, image),
        }
    }

    fn build_with<B: Boundary>(kernel: &Kernel, image: &Raster) -> Result<Self> {
        let (width, height) = image.dimensions();
        let mut data = buffer::zeroed(buffer::area(width, height)?)?;
        let r = kernel.radius() as isize;
        for j in 0..height {
            for i in 0..width {
                let (x, y) = (i as isize, j as isize);
                let mut s = 0.0;
                for l in -r..=r {
                    for k in -r..=r {
                        s += kernel.get(k, l) * image.get_with::<B>(x + k, y + l);
                    }
                }
                data[j * width + i] = s;
            }
        }
        Ok(Self { width, height, data })
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_threshold_copies_image() {
        let image = Raster::from_vec(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let threshold = EnergyThreshold::build(&Kernel::identity(), &image, BoundaryMode::Mirror).unwrap();
        assert_eq!(threshold.dimensions(), (3, 2));
        for j in 0..2 {
            for i in 0..3 {
                assert_eq!(threshold.get(i, j), image.get(i, j));
            }
        }
    }

    #[test]
    fn test_threshold_is_correlation() {
        let mut kernel = Kernel::new(1).unwrap();
        kernel.set(1, 0, 1.0);
        let image = Raster::from_vec(4, 1, vec![10.0, 20.0, 30.0, 40.0]).unwrap();
        let periodic = EnergyThreshold::build(&kernel, &image, BoundaryMode::Periodic).unwrap();
        assert_eq!(periodic.get(0, 0), 20.0);
        assert_eq!(periodic.get(3, 0), 10.0);
        let mirrored = EnergyThreshold::build(&kernel, &image, BoundaryMode::Mirror).unwrap();
        assert_eq!(mirrored.get(3, 0), 30.0);
    }

    #[test]
    fn test_flat_image_threshold_is_flat() {
        let image = Raster::filled(5, 5, 128.0).unwrap();
        let kernel = Kernel::defocus(2.0).unwrap();
        let threshold = EnergyThreshold::build(&kernel, &image, BoundaryMode::Periodic).unwrap();
        for j in 0..5 {
            for i in 0..5 {
                assert!((threshold.get(i, j) - 128.0).abs() < 1e-9);
            }
        }
    }
}
