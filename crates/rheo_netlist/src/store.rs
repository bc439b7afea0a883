//! Tombstoning slot store for ID-indexed netlist entities.
//!
//! The [`Store`] provides O(1) insertion and lookup by opaque [`StoreId`]
//! keys. Removal tombstones the slot instead of freeing it, and slots are
//! never reused, so an ID that was ever removed stays invalid for the
//! lifetime of the store.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Trait for opaque ID types used as store keys.
///
/// Implementors must provide a bijection between `u32` indices and the ID type.
pub trait StoreId: Copy {
    /// Creates an ID from a raw `u32` index.
    fn from_raw(index: u32) -> Self;

    /// Returns the raw `u32` index.
    fn as_raw(self) -> u32;
}

/// An ID-indexed container whose removals are permanent tombstones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store<I: StoreId, T> {
    slots: Vec<Option<T>>,
    live: usize,
    #[serde(skip)]
    _marker: PhantomData<I>,
}

impl<I: StoreId, T> Default for Store<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: StoreId, T> Store<I, T> {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
            _marker: PhantomData,
        }
    }

    /// Inserts a new item and returns its ID.
    pub fn insert(&mut self, item: T) -> I {
        let id = I::from_raw(self.slots.len() as u32);
        self.slots.push(Some(item));
        self.live += 1;
        id
    }

    /// Removes the item with the given ID, tombstoning its slot.
    ///
    /// Returns the item, or `None` if the ID is unknown or already removed.
    pub fn remove(&mut self, id: I) -> Option<T> {
        let slot = self.slots.get_mut(id.as_raw() as usize)?;
        let item = slot.take();
        if item.is_some() {
            self.live -= 1;
        }
        item
    }

    /// Returns a reference to the item with the given ID, if it is live.
    pub fn get(&self, id: I) -> Option<&T> {
        self.slots.get(id.as_raw() as usize)?.as_ref()
    }

    /// Returns a mutable reference to the item with the given ID, if it is live.
    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slots.get_mut(id.as_raw() as usize)?.as_mut()
    }

    /// Returns `true` if the ID refers to a live item.
    pub fn contains(&self, id: I) -> bool {
        self.get(id).is_some()
    }

    /// Returns the number of live items.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if the store holds no live items.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterates over `(ID, &T)` pairs of live items in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|item| (I::from_raw(i as u32), item)))
    }

    /// Iterates over `(ID, &mut T)` pairs of live items in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (I, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|item| (I::from_raw(i as u32), item)))
    }

    /// Iterates over live item IDs in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = I> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| I::from_raw(i as u32)))
    }
}

impl<I: StoreId, T> Index<I> for Store<I, T> {
    type Output = T;

    fn index(&self, id: I) -> &T {
        match self.get(id) {
            Some(item) => item,
            None => panic!("dead or unknown store id {}", id.as_raw()),
        }
    }
}

impl<I: StoreId, T> IndexMut<I> for Store<I, T> {
    fn index_mut(&mut self, id: I) -> &mut T {
        match self.get_mut(id) {
            Some(item) => item,
            None => panic!("dead or unknown store id"),
        }
    }
}
