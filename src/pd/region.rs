//! Region descriptors as seen by callers

use crate::proto::{kvrpcpb, metapb};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Transaction isolation level attached to resolved regions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationLevel {
    /// Snapshot isolation
    Si,
    /// Read committed
    #[default]
    Rc,
}

impl IsolationLevel {
    fn to_u8(self) -> u8 {
        match self {
            IsolationLevel::Si => 0,
            IsolationLevel::Rc => 1,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => IsolationLevel::Si,
            _ => IsolationLevel::Rc,
        }
    }
}

impl From<IsolationLevel> for kvrpcpb::IsolationLevel {
    fn from(level: IsolationLevel) -> Self {
        match level {
            IsolationLevel::Si => kvrpcpb::IsolationLevel::Si,
            IsolationLevel::Rc => kvrpcpb::IsolationLevel::Rc,
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsolationLevel::Si => write!(f, "si"),
            IsolationLevel::Rc => write!(f, "rc"),
        }
    }
}

impl std::str::FromStr for IsolationLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "si" | "snapshot" => Ok(IsolationLevel::Si),
            "rc" | "read-committed" => Ok(IsolationLevel::Rc),
            other => Err(crate::Error::InvalidConfig(format!(
                "unknown isolation level: {}",
                other
            ))),
        }
    }
}

/// Client-wide isolation level, read by every region-producing call.
#[derive(Debug)]
pub(crate) struct IsolationCell(AtomicU8);

impl IsolationCell {
    pub(crate) fn new(level: IsolationLevel) -> Self {
        Self(AtomicU8::new(level.to_u8()))
    }

    pub(crate) fn get(&self) -> IsolationLevel {
        IsolationLevel::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, level: IsolationLevel) {
        self.0.store(level.to_u8(), Ordering::Release);
    }
}

/// A region, the peer currently leading it, and the isolation level in
/// force when it was resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    meta: metapb::Region,
    leader: Option<metapb::Peer>,
    isolation_level: IsolationLevel,
}

impl Region {
    pub fn new(
        meta: metapb::Region,
        leader: Option<metapb::Peer>,
        isolation_level: IsolationLevel,
    ) -> Self {
        Self {
            meta,
            leader,
            isolation_level,
        }
    }

    pub fn id(&self) -> u64 {
        self.meta.id
    }

    pub fn meta(&self) -> &metapb::Region {
        &self.meta
    }

    pub fn leader(&self) -> Option<&metapb::Peer> {
        self.leader.as_ref()
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    /// Is the encoded key inside `[start_key, end_key)`?
    pub fn contains(&self, encoded_key: &[u8]) -> bool {
        encoded_key >= self.meta.start_key.as_slice()
            && (self.meta.end_key.is_empty() || encoded_key < self.meta.end_key.as_slice())
    }

    pub fn into_meta(self) -> metapb::Region {
        self.meta
    }
}
