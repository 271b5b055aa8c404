use crate::refocus::common::error::{RefocusError, Result};

/// Allocates a zero-filled buffer, reporting allocator failure instead of aborting.
pub(crate) fn zeroed(len: usize) -> Result<Vec<f64>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| RefocusError::AllocationFailure(len))?;
    buffer.resize(len, 0.0);
    Ok(buffer)
}

/// Element count of a `width` x `height` grid, treating overflow as an allocation failure.
pub(crate) fn area(width: usize, height: usize) -> Result<usize> {
    width
        .checked_mul(height)
        .ok_or(RefocusError::AllocationFailure(usize::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_buffer() {
        let buffer = zeroed(16).unwrap();
        assert_eq!(buffer.len(), 16);
        assert!(buffer.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_area_overflow_is_allocation_failure() {
        assert!(matches!(
            area(usize::MAX, 2),
            Err(RefocusError::AllocationFailure(_))
        ));
        assert_eq!(area(3, 4).unwrap(), 12);
    }
}
