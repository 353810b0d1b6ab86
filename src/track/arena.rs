//! Generational slot storage for a track's clips
//!
//! Removing a clip frees its slot and bumps the slot generation, so any
//! [`ClipHandle`] still held elsewhere is detected as stale instead of
//! silently addressing whatever clip reuses the slot.

use serde::{Deserialize, Serialize};

/// Stable reference to a clip owned by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipHandle {
    index: u32,
    generation: u32,
}

impl ClipHandle {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot arena addressed by generation-checked handles
#[derive(Debug, Clone)]
pub struct ClipArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for ClipArena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }
}

impl<T> ClipArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store `value`, reusing a free slot when one exists
    pub fn insert(&mut self, value: T) -> ClipHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return ClipHandle::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        ClipHandle::new(index, 0)
    }

    /// Take the value out, invalidating `handle`
    pub fn remove(&mut self, handle: ClipHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Swap the value behind a live handle, returning the old one
    pub fn replace(&mut self, handle: ClipHandle, value: T) -> Option<T> {
        let slot = self.get_mut(handle)?;
        Some(std::mem::replace(slot, value))
    }

    pub fn get(&self, handle: ClipHandle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: ClipHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, handle: ClipHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Live entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (ClipHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_ref()
                .map(|value| (ClipHandle::new(i as u32, slot.generation), value))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ClipHandle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|value| (ClipHandle::new(i as u32, generation), value))
        })
    }

    pub fn handles(&self) -> Vec<ClipHandle> {
        self.iter().map(|(handle, _)| handle).collect()
    }
}
