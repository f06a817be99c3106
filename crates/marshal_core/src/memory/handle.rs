//! # Resource Handles
//!
//! A handle is an index into the owner's slot array plus a generation
//! counter for detecting stale references.

use std::fmt;

/// Opaque identifier of a server-owned resource.
///
/// The ID is split into two parts:
/// - Lower 32 bits: slot index in the owning storage
/// - Upper 32 bits: generation of that slot when the handle was issued
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Rid(u64);

impl Rid {
    /// Null/invalid handle.
    pub const NULL: Self = Self(u64::MAX);

    /// Creates a handle from slot index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the slot generation.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Checks if this handle is null.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }

    /// Raw 64-bit value, stable for the lifetime of the resource.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }
}

impl Default for Rid {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("Rid(null)")
        } else {
            write!(f, "Rid({}v{})", self.index(), self.generation())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let rid = Rid::new(17, 3);
        assert_eq!(rid.index(), 17);
        assert_eq!(rid.generation(), 3);
        assert!(!rid.is_null());
    }

    #[test]
    fn test_null() {
        assert!(Rid::default().is_null());
        assert_eq!(format!("{:?}", Rid::NULL), "Rid(null)");
        assert_eq!(format!("{:?}", Rid::new(2, 1)), "Rid(2v1)");
    }
}
