//! Load priorities and completion tokens.

use bytemuck::{Pod, Zeroable};
use static_assertions::assert_eq_size;

use crate::types::LOAD_PRIORITY_COUNT;

/// Scheduling class of a load request.
///
/// `Update` is used for re-uploads of resources that are already resident,
/// the other classes for fresh loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum LoadPriority {
    /// Re-upload of an already resident resource.
    Update = 0,
    /// Fresh load needed soon.
    High,
    /// Fresh load.
    Normal,
    /// Background load.
    Low,
}

impl LoadPriority {
    /// Every class, in drain-cycle order.
    pub const ALL: [Self; LOAD_PRIORITY_COUNT] = [Self::Update, Self::High, Self::Normal, Self::Low];

    /// Items taken from this class per drain cycle.
    pub fn weight(self) -> usize {
        match self {
            Self::Update => 4,
            Self::High => 3,
            Self::Normal => 2,
            Self::Low => 1,
        }
    }

    /// Slot of the class in a [`SyncToken`].
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Completion point of one or more load requests.
///
/// Each slot holds the request counter of one [`LoadPriority`] class. A
/// token is complete once the loader's completed counters reach every slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
#[repr(C)]
pub struct SyncToken {
    /// Counter to reach, per priority class.
    pub wait_index: [u64; LOAD_PRIORITY_COUNT],
}

assert_eq_size!(SyncToken, [u64; LOAD_PRIORITY_COUNT]);

impl SyncToken {
    /// Token waiting for request `counter` of `priority`.
    pub fn at(priority: LoadPriority, counter: u64) -> Self {
        let mut token = Self::default();
        token.wait_index[priority.index()] = counter;
        token
    }

    /// Counter of one class.
    pub fn get(&self, priority: LoadPriority) -> u64 {
        self.wait_index[priority.index()]
    }

    /// Component-wise maximum of two tokens.
    pub fn max(self, other: Self) -> Self {
        let mut merged = self;
        merged.merge(&other);
        merged
    }

    /// Raise this token to also cover `other`.
    pub fn merge(&mut self, other: &Self) {
        for (mine, theirs) in self.wait_index.iter_mut().zip(other.wait_index) {
            *mine = (*mine).max(theirs);
        }
    }

    /// Returns true if every slot of `self` is at least the one of `other`.
    pub fn reaches(&self, other: &Self) -> bool {
        self.wait_index
            .iter()
            .zip(other.wait_index.iter())
            .all(|(mine, theirs)| mine >= theirs)
    }
}
