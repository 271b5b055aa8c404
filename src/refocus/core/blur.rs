//! Point-spread functions for the supported degradations.
//!
//! All builders return normalized masks and collapse to the identity when the
//! blur parameter is too small to matter.

use std::f64::consts::PI;

use tracing::debug;

use crate::refocus::common::error::Result;
use crate::refocus::core::kernel::Kernel;

/// Below this, a radius/variance is treated as zero.
const GAUSS_EPSILON: f64 = 1e-6;
const MOTION_EPSILON: f64 = 1e-4;
const DISC_EPSILON: f64 = 1e-4;

/// Relative magnitude at which the Gaussian support is cut off.
const GAUSS_CUTOFF: f64 = 1e-2;

impl Kernel {
    /// Out-of-focus blur: a uniform disc with anti-aliased edges.
    ///
    /// Each coefficient is the exact area of the unit cell around `(i, j)`
    /// covered by the circle, so the mask is smooth in `radius`.
    pub fn defocus(radius: f64) -> Result<Kernel> {
        let r = (radius + 0.5).max(0.0) as usize;
        if r < 1 {
            return Ok(Kernel::identity());
        }
        let mut kernel = Kernel::new(r)?;
        for i in 0..=r as isize {
            for j in 0..=r as isize {
                let value = circle_intensity(i, j, radius).max(0.0);
                kernel.set_circle_symmetric(i, j, value);
            }
        }
        kernel.normalize();
        debug!(radius, support = r, "built defocus kernel");
        Ok(kernel)
    }

    /// Gaussian blur with standard deviation `variance` pixels.
    pub fn gaussian(variance: f64) -> Result<Kernel> {
        if variance < GAUSS_EPSILON {
            return Ok(Kernel::identity());
        }
        let epsilon = (-2.0 * GAUSS_CUTOFF.ln()).sqrt();
        let r = (variance * epsilon + 0.5) as usize;
        let mut kernel = Kernel::new(r)?;
        let two_var = 2.0 * variance * variance;
        let mult = two_var * PI;
        for i in 0..=r as isize {
            for j in 0..=r as isize {
                let value = (-((i * i + j * j) as f64) / two_var).exp() / mult;
                kernel.set_circle_symmetric(i, j, value);
            }
        }
        kernel.normalize();
        debug!(variance, support = r, "built gaussian kernel");
        Ok(kernel)
    }

    /// Linear motion blur of the given length along `angle_degrees`.
    ///
    /// The streak is a rectangle one pixel wide, centred on the origin and
    /// spanning `length` pixels plus half a pixel at each end; each
    /// coefficient is the area it shares with the unit cell around `(i, j)`.
    pub fn motion(length: f64, angle_degrees: f64) -> Result<Kernel> {
        if length < MOTION_EPSILON {
            return Ok(Kernel::identity());
        }
        let r = (length / 2.0 + 1.0).ceil() as usize;
        let strip = motion_strip(length, angle_degrees);
        let mut kernel = Kernel::new(r)?;
        for j in -(r as isize)..=r as isize {
            for i in -(r as isize)..=r as isize {
                kernel.set(i, j, cell_overlap(&strip, i as f64, j as f64));
            }
        }
        kernel.normalize();
        debug!(length, angle_degrees, support = r, "built motion kernel");
        Ok(kernel)
    }
}

/// Integral of `sqrt(radius^2 - z^2)` for `z` from 0 to `x`.
fn circle_integral(x: f64, radius: f64) -> f64 {
    if radius < GAUSS_EPSILON {
        return 0.0;
    }
    let sin = x / radius;
    let sq_diff = radius * radius - x * x;
    // Guards against rounding just outside the circle.
    if sq_diff < 0.0 || !(-1.0..=1.0).contains(&sin) {
        if sin < 0.0 {
            -0.25 * radius * radius * PI
        } else {
            0.25 * radius * radius * PI
        }
    } else {
        0.5 * x * sq_diff.sqrt() + 0.5 * radius * radius * sin.asin()
    }
}

/// Fraction of the disc's area that falls inside the unit cell at `(x, y)`.
fn circle_intensity(x: isize, y: isize, radius: f64) -> f64 {
    if radius <= DISC_EPSILON {
        return if x == 0 && y == 0 { 1.0 } else { 0.0 };
    }
    let r2 = radius * radius;
    let mut xlo = x.abs() as f64 - 0.5;
    let xhi = x.abs() as f64 + 0.5;
    let mut ylo = y.abs() as f64 - 0.5;
    let yhi = y.abs() as f64 + 0.5;
    let mut symmetry = 1.0;

    // Cells straddling an axis are integrated over one half and doubled.
    if xlo < 0.0 {
        xlo = 0.0;
        symmetry *= 2.0;
    }
    if ylo < 0.0 {
        ylo = 0.0;
        symmetry *= 2.0;
    }

    // xc1: where the top edge leaves the circle; xc2: same for the bottom edge.
    let xc1 = if xlo * xlo + yhi * yhi > r2 {
        xlo
    } else if xhi * xhi + yhi * yhi > r2 {
        (r2 - yhi * yhi).sqrt()
    } else {
        xhi
    };
    let xc2 = if xlo * xlo + ylo * ylo > r2 {
        xlo
    } else if xhi * xhi + ylo * ylo > r2 {
        (r2 - ylo * ylo).sqrt()
    } else {
        xhi
    };

    let strip = (yhi - ylo) * (xc1 - xlo);
    let segment = circle_integral(xc2, radius) - circle_integral(xc1, radius) - (xc2 - xc1) * ylo;
    (strip + segment) * symmetry / (PI * r2)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Point {
    x: f64,
    y: f64,
}

impl Point {
    fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn lerp(self, other: Point, t: f64) -> Point {
        Point::new(self.x + t * (other.x - self.x), self.y + t * (other.y - self.y))
    }
}

fn motion_strip(length: f64, angle_degrees: f64) -> [Point; 4] {
    let (sin, cos) = angle_degrees.to_radians().sin_cos();
    let half = length / 2.0 + 0.5;
    [
        Point::new(-half, -0.5),
        Point::new(half, -0.5),
        Point::new(half, 0.5),
        Point::new(-half, 0.5),
    ]
    .map(|p| Point::new(cos * p.x - sin * p.y, sin * p.x + cos * p.y))
}

/// Sutherland-Hodgman step: keeps the part of `poly` where `n . p <= limit`.
fn clip_half_plane(poly: &[Point], normal: Point, limit: f64) -> Vec<Point> {
    let mut out = Vec::with_capacity(poly.len() + 2);
    let Some(&last) = poly.last() else {
        return out;
    };
    let distance = |p: Point| normal.x * p.x + normal.y * p.y - limit;

    let mut prev = last;
    let mut prev_d = distance(prev);
    for &cur in poly {
        let cur_d = distance(cur);
        match (prev_d <= 0.0, cur_d <= 0.0) {
            (true, true) => out.push(cur),
            (false, true) => {
                out.push(prev.lerp(cur, prev_d / (prev_d - cur_d)));
                out.push(cur);
            }
            (true, false) => out.push(prev.lerp(cur, prev_d / (prev_d - cur_d))),
            (false, false) => {}
        }
        prev = cur;
        prev_d = cur_d;
    }
    out
}

/// Shoelace formula.
fn polygon_area(poly: &[Point]) -> f64 {
    let Some(&last) = poly.last() else {
        return 0.0;
    };
    let mut prev = last;
    let mut sum = 0.0;
    for &cur in poly {
        sum += (cur.x - prev.x) * (cur.y + prev.y);
        prev = cur;
    }
    sum.abs() / 2.0
}

/// Area shared by `strip` and the unit cell centred at `(x, y)`.
fn cell_overlap(strip: &[Point], x: f64, y: f64) -> f64 {
    let planes = [
        (Point::new(1.0, 0.0), x + 0.5),
        (Point::new(0.0, 1.0), y + 0.5),
        (Point::new(-1.0, 0.0), -(x - 0.5)),
        (Point::new(0.0, -1.0), -(y - 0.5)),
    ];
    let mut poly = strip.to_vec();
    for (normal, limit) in planes {
        poly = clip_half_plane(&poly, normal, limit);
        if poly.len() < 3 {
            return 0.0;
        }
    }
    polygon_area(&poly)
}
