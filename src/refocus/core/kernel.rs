//! Origin-centred convolution masks.

use std::fmt;

use crate::refocus::common::buffer;
use crate::refocus::common::error::Result;

/// Square mask of side `2 * radius + 1`, addressed by signed offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    radius: usize,
    coef: Vec<f64>,
}

impl Kernel {
    /// Zero-filled mask.
    pub fn new(radius: usize) -> Result<Self> {
        let side = 2 * radius + 1;
        let coef = buffer::zeroed(buffer::area(side, side)?)?;
        Ok(Self { radius, coef })
    }

    /// Radius 0 with a single unit coefficient.
    pub fn identity() -> Self {
        Self {
            radius: 0,
            coef: vec![1.0],
        }
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn side(&self) -> usize {
        2 * self.radius + 1
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coef
    }

    #[inline]
    fn contains(&self, x: isize, y: isize) -> bool {
        let r = self.radius as isize;
        (-r..=r).contains(&x) && (-r..=r).contains(&y)
    }

    #[inline]
    fn index(&self, x: isize, y: isize) -> usize {
        let r = self.radius as isize;
        ((y + r) as usize) * self.side() + (x + r) as usize
    }

    /// Coefficient at offset `(x, y)`; zero outside the support.
    #[inline]
    pub fn get(&self, x: isize, y: isize) -> f64 {
        if self.contains(x, y) {
            self.coef[self.index(x, y)]
        } else {
            0.0
        }
    }

    /// # Panics
    ///
    /// If `(x, y)` lies outside `[-radius, radius]^2`.
    #[inline]
    pub fn set(&mut self, x: isize, y: isize, value: f64) {
        assert!(self.contains(x, y), "offset ({x}, {y}) outside radius {}", self.radius);
        let idx = self.index(x, y);
        self.coef[idx] = value;
    }

    /// Writes `value` to the four quadrant reflections of `(i, j)`.
    pub fn set_circle_symmetric(&mut self, i: isize, j: isize, value: f64) {
        self.set(i, j, value);
        self.set(-i, j, value);
        self.set(i, -j, value);
        self.set(-i, -j, value);
    }

    pub fn sum(&self) -> f64 {
        self.coef.iter().sum()
    }

    /// Scales the coefficients to sum to one.
    pub fn normalize(&mut self) -> &mut Self {
        let sum = self.sum();
        if sum != 0.0 {
            self.coef.iter_mut().for_each(|c| *c /= sum);
        }
        self
    }

    pub fn is_identity(&self) -> bool {
        self.radius == 0 && self.coef[0] == 1.0
    }

    /// Full 2D convolution of two masks; the result has radius `a.radius + b.radius`.
    ///
    /// The result is not renormalized.
    pub fn convolve(a: &Kernel, b: &Kernel) -> Result<Kernel> {
        let mut out = Kernel::new(a.radius + b.radius)?;
        let r = out.radius as isize;
        let rb = b.radius as isize;
        for y in -r..=r {
            for x in -r..=r {
                let mut sum = 0.0;
                for y0 in -rb..=rb {
                    for x0 in -rb..=rb {
                        sum += a.get(x - x0, y - y0) * b.get(x0, y0);
                    }
                }
                out.set(x, y, sum);
            }
        }
        Ok(out)
    }

    /// Convolves a sequence of masks left to right.
    pub fn compose<'a, I>(kernels: I) -> Result<Kernel>
    where
        I: IntoIterator<Item = &'a Kernel>,
    {
        kernels
            .into_iter()
            .try_fold(Kernel::identity(), |acc, k| Kernel::convolve(&acc, k))
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.radius as isize;
        for y in -r..=r {
            for x in -r..=r {
                write!(f, " {:1.4}", self.get(x, y))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_offset_indexing() {
        let mut kernel = Kernel::new(2).unwrap();
        kernel.set(-2, -2, 1.0);
        kernel.set(2, 2, 2.0);
        kernel.set(1, -1, 3.0);
        assert_eq!(kernel.coefficients()[0], 1.0);
        assert_eq!(kernel.coefficients()[24], 2.0);
        assert_eq!(kernel.coefficients()[((-1isize + 2) * 5 + (1 + 2)) as usize], 3.0);
    }

    #[test]
    fn test_out_of_support_reads_zero() {
        let kernel = Kernel::identity();
        assert_eq!(kernel.get(0, 0), 1.0);
        assert_eq!(kernel.get(1, 0), 0.0);
        assert_eq!(kernel.get(-3, 7), 0.0);
    }

    #[test]
    #[should_panic]
    fn test_set_outside_support_panics() {
        let mut kernel = Kernel::new(1).unwrap();
        kernel.set(2, 0, 1.0);
    }

    #[test]
    fn test_set_circle_symmetric() {
        let mut kernel = Kernel::new(2).unwrap();
        kernel.set_circle_symmetric(1, 2, 0.5);
        for (x, y) in [(1, 2), (-1, 2), (1, -2), (-1, -2)] {
            assert_eq!(kernel.get(x, y), 0.5);
        }
        assert_eq!(kernel.sum(), 2.0);
    }

    #[test]
    fn test_normalize_sums_to_one() {
        let mut kernel = Kernel::new(3).unwrap();
        for y in -3..=3isize {
            for x in -3..=3isize {
                kernel.set(x, y, ((x * x + 2 * y * y) as f64).sqrt() + 0.25);
            }
        }
        kernel.normalize();
        assert!((kernel.sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_convolve_radius_and_identity() {
        let gauss = Kernel::gaussian(1.0).unwrap();
        let composed = Kernel::convolve(&gauss, &Kernel::identity()).unwrap();
        assert_eq!(composed.radius(), gauss.radius());
        for (a, b) in composed.coefficients().iter().zip(gauss.coefficients()) {
            assert!((a - b).abs() < 1e-15);
        }
        let disc = Kernel::defocus(2.0).unwrap();
        let both = Kernel::convolve(&disc, &gauss).unwrap();
        assert_eq!(both.radius(), disc.radius() + gauss.radius());
    }

    #[test]
    fn test_convolve_two_impulses() {
        let mut a = Kernel::new(1).unwrap();
        a.set(1, 0, 1.0);
        let mut b = Kernel::new(1).unwrap();
        b.set(0, -1, 1.0);
        let c = Kernel::convolve(&a, &b).unwrap();
        assert_eq!(c.radius(), 2);
        assert_eq!(c.get(1, -1), 1.0);
        assert_eq!(c.sum(), 1.0);
    }

    #[test]
    fn test_repeated_composition_stays_normalized() {
        let disc = Kernel::defocus(3.3).unwrap();
        let gauss = Kernel::gaussian(0.8).unwrap();
        let motion = Kernel::motion(4.0, 30.0).unwrap();
        let mut acc = Kernel::identity();
        for _ in 0..3 {
            acc = Kernel::compose([&acc, &disc, &gauss, &motion]).unwrap();
        }
        assert!((acc.sum() - 1.0).abs() < 1e-9);
    }
}
