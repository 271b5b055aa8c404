//! Interaction weights of the Hopfield energy.
//!
//! For a blur mask `h`, the data term `|h * u - g|^2` couples every pair of
//! pixels whose offset lies within twice the mask radius. The coupling is the
//! negated autocorrelation of `h`.

use tracing::debug;

use crate::refocus::common::buffer;
use crate::refocus::common::error::Result;
use crate::refocus::core::kernel::Kernel;

/// Magnitude below which a weight does not widen the visited neighbourhood.
pub const NEGLIGIBLE_WEIGHT: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct EnergyWeights {
    radius: usize,
    w: Vec<f64>,
    nzx: usize,
    nzy: usize,
}

impl EnergyWeights {
    pub fn build(kernel: &Kernel) -> Result<Self> {
        let r = kernel.radius() as isize;
        let radius = 2 * kernel.radius();
        let side = 2 * radius + 1;
        let mut weights = Self {
            radius,
            w: buffer::zeroed(buffer::area(side, side)?)?,
            nzx: 0,
            nzy: 0,
        };

        for i in 0..=2 * r {
            for j in 0..=2 * r {
                let mut direct = 0.0;
                let mut cross = 0.0;
                for k in -r..=r - i {
                    for l in -r..=r - j {
                        direct -= kernel.get(k, l) * kernel.get(k + i, l + j);
                        cross -= kernel.get(k, l + j) * kernel.get(k + i, l);
                    }
                }
                weights.track_support(i, j, direct);
                weights.track_support(i, j, cross);

                weights.set(i, j, direct);
                weights.set(-i, -j, direct);
                weights.set(-i, j, cross);
                weights.set(i, -j, cross);
            }
        }

        debug!(
            kernel_radius = kernel.radius(),
            nzx = weights.nzx,
            nzy = weights.nzy,
            "built energy weights"
        );
        Ok(weights)
    }

    fn track_support(&mut self, i: isize, j: isize, value: f64) {
        if value.abs() > NEGLIGIBLE_WEIGHT {
            self.nzx = self.nzx.max(i as usize);
            self.nzy = self.nzy.max(j as usize);
        }
    }

    #[inline]
    fn index(&self, x: isize, y: isize) -> usize {
        let r = self.radius as isize;
        ((y + r) as usize) * (2 * self.radius + 1) + (x + r) as usize
    }

    fn set(&mut self, x: isize, y: isize, value: f64) {
        let idx = self.index(x, y);
        self.w[idx] = value;
    }

    /// Weight at offset `(x, y)`; zero outside `[-2r, 2r]^2`.
    #[inline]
    pub fn get(&self, x: isize, y: isize) -> f64 {
        let r = self.radius as isize;
        if (-r..=r).contains(&x) && (-r..=r).contains(&y) {
            self.w[self.index(x, y)]
        } else {
            0.0
        }
    }

    /// Half-width of the table, twice the mask radius.
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Largest x offset carrying a non-negligible weight.
    pub fn nzx(&self) -> usize {
        self.nzx
    }

    /// Largest y offset carrying a non-negligible weight.
    pub fn nzy(&self) -> usize {
        self.nzy
    }

    pub fn center(&self) -> f64 {
        self.get(0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_kernel_weights() {
        let weights = EnergyWeights::build(&Kernel::identity()).unwrap();
        assert_eq!(weights.radius(), 0);
        assert_eq!(weights.center(), -1.0);
        assert_eq!((weights.nzx(), weights.nzy()), (0, 0));
    }

    #[test]
    fn test_weights_point_symmetric() {
        let kernel = Kernel::compose([
            &Kernel::defocus(2.3).unwrap(),
            &Kernel::motion(3.0, 20.0).unwrap(),
        ])
        .unwrap();
        let weights = EnergyWeights::build(&kernel).unwrap();
        let r = weights.radius() as isize;
        for y in -r..=r {
            for x in -r..=r {
                assert_eq!(weights.get(x, y), weights.get(-x, -y));
            }
        }
    }

    #[test]
    fn test_weights_are_negated_autocorrelation() {
        let kernel = Kernel::motion(2.0, 30.0).unwrap();
        let weights = EnergyWeights::build(&kernel).unwrap();
        let r = kernel.radius() as isize;
        let r2 = 2 * r;
        for y in -r2..=r2 {
            for x in -r2..=r2 {
                let mut expected = 0.0;
                for l in -r..=r {
                    for k in -r..=r {
                        expected -= kernel.get(k, l) * kernel.get(k + x, l + y);
                    }
                }
                assert!(
                    (weights.get(x, y) - expected).abs() < 1e-12,
                    "weight ({x}, {y})"
                );
            }
        }
    }

    #[test]
    fn test_weights_sum_to_minus_one_for_normalized_kernel() {
        let kernel = Kernel::gaussian(1.2).unwrap();
        let weights = EnergyWeights::build(&kernel).unwrap();
        let r = weights.radius() as isize;
        let mut sum = 0.0;
        for y in -r..=r {
            for x in -r..=r {
                sum += weights.get(x, y);
            }
        }
        assert!((sum + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unit_disc_support_bound() {
        let kernel = Kernel::defocus(1.0).unwrap();
        assert_eq!(kernel.radius(), 1);
        let weights = EnergyWeights::build(&kernel).unwrap();
        assert_eq!(weights.nzx(), 2);
        assert_eq!(weights.nzy(), 2);
        assert_eq!(weights.get(3, 0), 0.0);
    }
}
