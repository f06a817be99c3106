//! # Handle Owner
//!
//! Generational slot storage that issues [`Rid`]s and resolves them.

use super::handle::Rid;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Storage for server-owned resources addressed by [`Rid`].
///
/// Slots are recycled through a free list. Each reuse bumps the slot's
/// generation, so a handle to a freed resource never resolves to its
/// successor.
///
/// # Thread Safety
///
/// This storage is NOT thread-safe. It lives inside the server, and the
/// server lives on one thread.
///
/// # Example
///
/// ```rust,ignore
/// let mut bodies: RidOwner<Body> = RidOwner::with_capacity(1024);
///
/// let rid = bodies.make_rid(Body::default());
/// bodies.get_mut(rid).unwrap().mass = 2.0;
/// bodies.free(rid);
/// assert!(bodies.get(rid).is_none());
/// ```
pub struct RidOwner<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    len: usize,
}

impl<T> RidOwner<T> {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates empty storage with room for `capacity` resources.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Number of live resources.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no resource is live.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores a resource and returns its handle.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX - 1` slots would be needed.
    pub fn make_rid(&mut self, value: T) -> Rid {
        self.len += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Rid::new(index, slot.generation);
        }

        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        assert!(index < u32::MAX, "RidOwner slot space exhausted");
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Rid::new(index, 0)
    }

    /// Returns true if the handle resolves to a live resource.
    #[inline]
    #[must_use]
    pub fn owns(&self, rid: Rid) -> bool {
        self.get(rid).is_some()
    }

    /// Resolves a handle.
    #[must_use]
    pub fn get(&self, rid: Rid) -> Option<&T> {
        let slot = self.slots.get(rid.index() as usize)?;
        if slot.generation != rid.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    /// Resolves a handle mutably.
    pub fn get_mut(&mut self, rid: Rid) -> Option<&mut T> {
        let slot = self.slots.get_mut(rid.index() as usize)?;
        if slot.generation != rid.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    /// Frees a resource, returning it.
    ///
    /// Stale or unknown handles return `None` and change nothing.
    pub fn free(&mut self, rid: Rid) -> Option<T> {
        let slot = self.slots.get_mut(rid.index() as usize)?;
        if slot.generation != rid.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(rid.index());
        self.len -= 1;
        Some(value)
    }

    /// Iterates over all live resources.
    pub fn iter(&self) -> impl Iterator<Item = (Rid, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|v| (Rid::new(index as u32, slot.generation), v))
        })
    }

    /// Iterates mutably over all live resources.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Rid, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|v| (Rid::new(index as u32, generation), v))
        })
    }
}

impl<T> Default for RidOwner<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_get_free() {
        let mut owner: RidOwner<u32> = RidOwner::new();

        let rid = owner.make_rid(42);
        assert_eq!(owner.get(rid), Some(&42));
        assert_eq!(owner.len(), 1);

        assert_eq!(owner.free(rid), Some(42));
        assert!(owner.is_empty());
        assert!(!owner.owns(rid));
    }

    #[test]
    fn test_stale_handle_does_not_resolve() {
        let mut owner: RidOwner<u32> = RidOwner::with_capacity(1);

        let first = owner.make_rid(1);
        owner.free(first);

        let second = owner.make_rid(2);
        assert_eq!(first.index(), second.index()); // Same slot reused
        assert_ne!(first.generation(), second.generation());
        assert!(owner.get(first).is_none());
        assert!(owner.free(first).is_none());
        assert_eq!(owner.get(second), Some(&2));
    }

    #[test]
    fn test_null_never_resolves() {
        let mut owner: RidOwner<u32> = RidOwner::new();
        owner.make_rid(1);
        assert!(owner.get(Rid::NULL).is_none());
    }

    #[test]
    fn test_iter_skips_freed() {
        let mut owner: RidOwner<&str> = RidOwner::new();
        let a = owner.make_rid("a");
        let b = owner.make_rid("b");
        let c = owner.make_rid("c");
        owner.free(b);

        let live: Vec<_> = owner.iter().map(|(rid, v)| (rid, *v)).collect();
        assert_eq!(live, vec![(a, "a"), (c, "c")]);

        for (_, v) in owner.iter_mut() {
            *v = "z";
        }
        assert_eq!(owner.get(a), Some(&"z"));
    }
}
