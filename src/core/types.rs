use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identifier of one multiplexed peer link on the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(u8);

impl LinkId {
    /// Creates a link id, rejecting anything outside `0..MAX_LINKS`
    pub fn new(id: u8) -> Option<Self> {
        if (id as usize) < super::MAX_LINKS {
            Some(LinkId(id))
        } else {
            None
        }
    }

    /// Parses a decimal link id as it appears on the wire
    pub fn from_ascii(digits: &[u8]) -> Option<Self> {
        if digits.is_empty() || digits.len() > 3 || !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let value = digits
            .iter()
            .fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0'));
        u8::try_from(value).ok().and_then(LinkId::new)
    }

    /// Returns every valid link id in ascending order
    pub fn all() -> impl Iterator<Item = LinkId> {
        (0..super::MAX_LINKS as u8).map(LinkId)
    }

    /// Returns the raw id
    pub fn get(&self) -> u8 {
        self.0
    }

    /// Table index for this id
    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One complete inbound data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Link the data arrived on
    pub link: LinkId,
    /// Exactly the number of bytes the header announced
    pub payload: Bytes,
}

impl Frame {
    /// Creates a frame
    pub fn new(link: LinkId, payload: impl Into<Bytes>) -> Self {
        Frame {
            link,
            payload: payload.into(),
        }
    }
}

/// Network reachability reported by bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReachabilityState {
    /// Bring-up has not completed
    Unjoined,
    /// Joined the preferred network and listening
    JoinedExisting,
    /// Hosting an own access point and listening
    HostingOwn,
    /// Neither branch succeeded; run without network
    Failed,
}

impl ReachabilityState {
    /// Whether peers can reach the service port
    pub fn is_reachable(&self) -> bool {
        matches!(self, ReachabilityState::JoinedExisting | ReachabilityState::HostingOwn)
    }
}
