//! MariaDB global transaction identifiers
//!
//! A GTID is the `(domain, server_id, sequence)` triple MariaDB prints as
//! `0-1-5`. The converter additionally tracks an event number inside the
//! transaction so that a resumed conversion knows how far into a transaction
//! it had written.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A position in the replicated transaction stream.
///
/// Ordering is lexicographic over `(domain, server_id, sequence, event_num)`,
/// which matches the order the converter emits records in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Gtid {
    pub domain: u32,
    pub server_id: u32,
    pub sequence: u64,
    /// Event number inside the transaction, starting from 1.
    pub event_num: u64,
}

impl Gtid {
    pub fn new(domain: u32, server_id: u32, sequence: u64) -> Self {
        Self {
            domain,
            server_id,
            sequence,
            event_num: 1,
        }
    }

    /// True if this GTID has been set from a real GTID event.
    pub fn is_set(&self) -> bool {
        self.event_num > 0
    }

    /// The form written into records and requested by clients: `0-1-5`.
    pub fn triplet(&self) -> String {
        format!("{}-{}-{}", self.domain, self.server_id, self.sequence)
    }

    /// The checkpoint form with the in-transaction event number: `0-1-5:2`.
    pub fn with_event_num(&self) -> String {
        format!("{}:{}", self.triplet(), self.event_num)
    }

    /// True if `self` is at or past `other`, ignoring the event number.
    ///
    /// Client seek requests name a transaction, not an event inside one.
    pub fn reaches(&self, other: &Gtid) -> bool {
        self.domain == other.domain
            && self.server_id == other.server_id
            && self.sequence >= other.sequence
    }
}

impl fmt::Display for Gtid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.domain, self.server_id, self.sequence)
    }
}

impl FromStr for Gtid {
    type Err = String;

    /// Parse `domain-server_id-sequence` with an optional `:event_num` tail.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (triplet, event_num) = match s.split_once(':') {
            Some((head, tail)) => {
                let ev = tail
                    .parse::<u64>()
                    .map_err(|_| format!("invalid GTID event number in '{s}'"))?;
                (head, ev)
            }
            None => (s, 1),
        };

        let mut parts = triplet.splitn(3, '-');
        let domain = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| format!("invalid GTID domain in '{s}'"))?;
        let server_id = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| format!("invalid GTID server id in '{s}'"))?;
        let sequence = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| format!("invalid GTID sequence in '{s}'"))?;

        Ok(Self {
            domain,
            server_id,
            sequence,
            event_num,
        })
    }
}
