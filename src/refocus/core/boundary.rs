//! Boundary extension of out-of-range coordinates.
//!
//! Every component that samples outside the image (convolution, threshold,
//! lambda field, relaxation pass) resolves coordinates through one of the two
//! strategies defined here, so the choice made in the configuration stays
//! consistent across the whole solve.

use std::fmt;
use std::str::FromStr;

/// Reflects `x` into `[0, length)` with the edge pixels acting as mirrors.
///
/// `-1` maps to `1` and `length` maps to `length - 2`; offsets that cross the
/// image more than once keep reflecting back and forth.
pub fn mirror(x: isize, length: usize) -> usize {
    debug_assert!(length >= 1);
    if length <= 1 {
        return 0;
    }
    let len = length as isize;
    if (0..len).contains(&x) {
        return x as usize;
    }
    let period = 2 * (len - 1);
    let folded = x.rem_euclid(period);
    if folded < len {
        folded as usize
    } else {
        (period - folded) as usize
    }
}

/// Wraps `x` into `[0, length)`.
pub fn periodic(x: isize, length: usize) -> usize {
    debug_assert!(length >= 1);
    let len = length as isize;
    if (0..len).contains(&x) {
        x as usize
    } else {
        x.rem_euclid(len) as usize
    }
}

/// A boundary extension strategy, resolved at compile time inside hot loops.
pub trait Boundary {
    const MODE: BoundaryMode;

    fn resolve(x: isize, length: usize) -> usize;
}

/// Reflection about the first and last pixel.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mirror;

/// Wrap-around extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct Periodic;

impl Boundary for Mirror {
    const MODE: BoundaryMode = BoundaryMode::Mirror;

    #[inline]
    fn resolve(x: isize, length: usize) -> usize {
        mirror(x, length)
    }
}

impl Boundary for Periodic {
    const MODE: BoundaryMode = BoundaryMode::Periodic;

    #[inline]
    fn resolve(x: isize, length: usize) -> usize {
        periodic(x, length)
    }
}

/// Runtime selection between the two strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryMode {
    #[default]
    Mirror,
    Periodic,
}

impl BoundaryMode {
    pub fn resolve(self, x: isize, length: usize) -> usize {
        match self {
            BoundaryMode::Mirror => mirror(x, length),
            BoundaryMode::Periodic => periodic(x, length),
        }
    }

    pub fn is_mirror(self) -> bool {
        self == BoundaryMode::Mirror
    }
}

impl fmt::Display for BoundaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryMode::Mirror => write!(f, "mirror"),
            BoundaryMode::Periodic => write!(f, "period"),
        }
    }
}

impl FromStr for BoundaryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mirror" => Ok(BoundaryMode::Mirror),
            "period" | "periodic" => Ok(BoundaryMode::Periodic),
            other => Err(format!(
                "invalid boundary '{other}', expected mirror|period"
            )),
        }
    }
}
