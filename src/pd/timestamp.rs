//! Timestamps allocated by the PD timestamp oracle

use crate::proto::pdpb;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of low bits of a composed version reserved for the logical part
pub const PHYSICAL_SHIFT_BITS: u32 = 18;
const LOGICAL_MASK: u64 = (1 << PHYSICAL_SHIFT_BITS) - 1;

/// A `(physical, logical)` pair ordered lexicographically.
///
/// `physical` is wall-clock milliseconds on the PD leader, `logical` a
/// counter that disambiguates timestamps allocated within one millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    physical: i64,
    logical: i64,
}

impl Timestamp {
    pub fn new(physical: i64, logical: i64) -> Self {
        Self { physical, logical }
    }

    pub fn physical(&self) -> i64 {
        self.physical
    }

    pub fn logical(&self) -> i64 {
        self.logical
    }

    /// Composes the pair into the single 64-bit version used by MVCC storage.
    pub fn version(&self) -> u64 {
        ((self.physical as u64) << PHYSICAL_SHIFT_BITS) + self.logical as u64
    }

    /// Splits a composed version back into its parts.
    pub fn from_version(version: u64) -> Self {
        Self {
            physical: (version >> PHYSICAL_SHIFT_BITS) as i64,
            logical: (version & LOGICAL_MASK) as i64,
        }
    }
}

impl From<pdpb::Timestamp> for Timestamp {
    fn from(ts: pdpb::Timestamp) -> Self {
        Self::new(ts.physical, ts.logical)
    }
}

impl From<Timestamp> for pdpb::Timestamp {
    fn from(ts: Timestamp) -> Self {
        pdpb::Timestamp {
            physical: ts.physical,
            logical: ts.logical,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.physical, self.logical)
    }
}
