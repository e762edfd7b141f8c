//! Block storage.
//!
//! The basic blocks of an operation body refer to each other through their
//! edges, so they live in an append-only [Arena] owned by the body and are
//! named by copyable [Handle]s. A wrapper handle such as a block implements
//! [ArenaHandle] to resolve itself against its owner, which lets graph
//! utilities walk nodes without knowing where they are stored.
//!
//! Blocks are never removed on their own, so a handle stays valid as long as
//! the body it came from.
//!
//! # Examples
//!
//! ```rust
//! use ek9ir::arena_handle;
//! use ek9ir::collections::storage::{Arena, ArenaHandle, Handle};
//!
//! struct Step { this: StepId, name: String }
//!
//! #[derive(Clone, Copy, PartialEq, Eq)]
//! struct StepId(Handle<Step>);
//!
//! #[derive(Default)]
//! struct Plan { steps: Arena<Step> }
//!
//! arena_handle!(Plan, Step, StepId, steps);
//!
//! let mut plan = Plan::default();
//! let load = StepId(plan.steps.push_with(|this| Step { this: StepId(this), name: "load".into() }));
//! let store = StepId(plan.steps.push_with(|this| Step { this: StepId(this), name: "store".into() }));
//!
//! assert_eq!(load.resolve(&plan).name, "load");
//! assert!(store.resolve(&plan).this == store);
//!
//! store.resolve_mut(&mut plan).name.push('!');
//! assert_eq!(store.resolve(&plan).name, "store!");
//! ```

use std::{
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
};

use crate::ice;

/// The position of a value in an [Arena] of `T`.
pub struct Handle<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: usize) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    /// The creation order of the value.
    pub fn index(self) -> usize { self.index }
}

// Manual impls: the derives would require `T` to implement each trait.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self { *self }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool { self.index == other.index }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) { self.index.hash(state); }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.index) }
}

/// Append-only storage, iterated in creation order.
#[derive(Clone)]
pub struct Arena<T> {
    slots: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self { Self { slots: Vec::new() } }
}

impl<T: fmt::Debug> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.debug_list().entries(&self.slots).finish() }
}

impl<T> Arena<T> {
    /// Store the value built by `build`, which receives the handle the value
    /// will have.
    pub fn push_with(&mut self, build: impl FnOnce(Handle<T>) -> T) -> Handle<T> {
        let handle = Handle::new(self.slots.len());
        self.slots.push(build(handle));
        handle
    }

    pub fn push(&mut self, value: T) -> Handle<T> { self.push_with(|_| value) }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> { self.slots.get(handle.index) }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> { self.slots.get_mut(handle.index) }

    pub fn len(&self) -> usize { self.slots.len() }

    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    pub fn handles(&self) -> impl Iterator<Item = Handle<T>> + '_ { (0..self.slots.len()).map(Handle::new) }

    pub fn values(&self) -> impl Iterator<Item = &T> + '_ { self.slots.iter() }
}

/// A handle that resolves against the value owning its arena.
pub trait ArenaHandle: Copy + Eq {
    /// The owner of the arena, e.g. a body for its blocks.
    type Owner;
    type Target;

    fn get(self, owner: &Self::Owner) -> Option<&Self::Target>;

    fn get_mut(self, owner: &mut Self::Owner) -> Option<&mut Self::Target>;

    /// # Panics
    ///
    /// Panics with an internal compiler error if the handle is not from
    /// `owner`.
    fn resolve(self, owner: &Self::Owner) -> &Self::Target {
        match self.get(owner) {
            Some(target) => target,
            None => ice!("handle resolved against a foreign arena"),
        }
    }

    /// # Panics
    ///
    /// Panics with an internal compiler error if the handle is not from
    /// `owner`.
    fn resolve_mut(self, owner: &mut Self::Owner) -> &mut Self::Target {
        match self.get_mut(owner) {
            Some(target) => target,
            None => ice!("handle resolved against a foreign arena"),
        }
    }
}

/// Implement [ArenaHandle] for `$handle`, a newtype over a [Handle] into the
/// `$field` arena of `$owner`.
#[macro_export]
macro_rules! arena_handle {
    ($owner:ty, $target:ty, $handle:path, $field:ident) => {
        impl $crate::collections::storage::ArenaHandle for $handle {
            type Owner = $owner;
            type Target = $target;

            fn get(self, owner: &$owner) -> Option<&$target> { owner.$field.get(self.0) }

            fn get_mut(self, owner: &mut $owner) -> Option<&mut $target> { owner.$field.get_mut(self.0) }
        }
    };
}
