// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

use crate::error::SetupError;
use core::ops::Range;

/// Fixed-capacity backing store.
///
/// The buffer is allocated once, zero-filled, and never resized or moved; addresses handed out by
/// the allocator are offsets into it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub(crate) struct Arena {
    bytes: Box<[u8]>,
}

impl Arena {
    /// Allocates a zero-filled buffer of `size` bytes.
    ///
    /// Fails with [`SetupError::Overflow`] if the buffer cannot be allocated, which is always the
    /// case past `isize::MAX` bytes.
    pub(crate) fn new(size: usize) -> Result<Self, SetupError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| SetupError::Overflow)?;
        bytes.resize(size, 0u8);
        Ok(Self {
            bytes: bytes.into_boxed_slice(),
        })
    }

    #[inline]
    #[must_use]
    pub(crate) fn size(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    #[must_use]
    pub(crate) fn contains(&self, range: &Range<usize>) -> bool {
        range.start <= range.end && range.end <= self.size()
    }

    pub(crate) fn get(&self, range: Range<usize>) -> &[u8] {
        debug_assert!(self.contains(&range), "{range:?} is outside of the arena");
        &self.bytes[range]
    }

    pub(crate) fn get_mut(&mut self, range: Range<usize>) -> &mut [u8] {
        debug_assert!(self.contains(&range), "{range:?} is outside of the arena");
        &mut self.bytes[range]
    }

    /// Zeroes `range`, so that freed memory does not leak into later allocations.
    pub(crate) fn clear(&mut self, range: Range<usize>) {
        self.get_mut(range).fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_on_creation() {
        let arena = Arena::new(64).unwrap();
        assert_eq!(arena.size(), 64);
        assert!(arena.get(0..64).iter().all(|&b| b == 0));
    }

    #[test]
    fn write_and_clear() {
        let mut arena = Arena::new(16).unwrap();
        arena.get_mut(4..8).copy_from_slice(b"abcd");
        assert_eq!(arena.get(2..10), b"\0\0abcd\0\0");
        arena.clear(4..6);
        assert_eq!(arena.get(4..8), b"\0\0cd");
    }

    #[test]
    fn too_large() {
        assert_eq!(Arena::new(usize::MAX), Err(SetupError::Overflow));
        assert_eq!(Arena::new(isize::MAX as usize + 1), Err(SetupError::Overflow));
    }

    #[test]
    fn contains() {
        let arena = Arena::new(16).unwrap();
        assert!(arena.contains(&(0..16)));
        assert!(arena.contains(&(16..16)));
        assert!(!arena.contains(&(8..17)));
    }
}
