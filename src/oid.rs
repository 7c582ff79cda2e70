//! Object Identifier type: an ordered sequence of unsigned subidentifiers.
//!
//! A fixed-capacity subid list plus a cached BER encoded length so lookups
//! and table ordering never need to recompute it.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{AgentError, Result};

/// Upper bound on the number of subidentifiers in one OID.
pub const MAX_SUBIDS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid {
    subids: Vec<u32>,
    encoded_length: usize,
}

impl Oid {
    /// Builds an `Oid` from subidentifiers, validating that length >= 2,
    /// `subid[0]*40 + subid[1] <= 255`, and the `MAX_SUBIDS` bound.
    pub fn new(subids: Vec<u32>) -> Result<Self> {
        if subids.len() < 2 {
            return Err(AgentError::MalformedPacket("OID needs at least 2 subids"));
        }
        if subids.len() > MAX_SUBIDS {
            return Err(AgentError::OidOverflow(MAX_SUBIDS));
        }
        if subids[0] * 40 + subids[1] > 255 {
            return Err(AgentError::MalformedPacket(
                "first two OID subids overflow a byte",
            ));
        }

        let encoded_length = Self::compute_encoded_length(&subids);
        Ok(Oid {
            subids,
            encoded_length,
        })
    }

    /// Builds an `Oid` from a raw subtree prefix plus a column/row
    /// extension, skipping the `new()` validation — used by the MIB
    /// builder where the prefix is already known-good and the extension
    /// is a small constant. Still bounds-checks the length.
    pub fn from_parts(prefix: &[u32], extension: &[u32]) -> Result<Self> {
        let mut subids = Vec::with_capacity(prefix.len() + extension.len());
        subids.extend_from_slice(prefix);
        subids.extend_from_slice(extension);
        Oid::new(subids)
    }

    pub fn subids(&self) -> &[u32] {
        &self.subids
    }

    pub fn len(&self) -> usize {
        self.subids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subids.is_empty()
    }

    /// Total BER byte length: tag + length-of-length + content.
    pub fn encoded_length(&self) -> usize {
        self.encoded_length
    }

    fn content_length(subids: &[u32]) -> usize {
        let mut len = 1; // first byte covers subid[0] and subid[1]
        for &s in &subids[2..] {
            len += Self::base128_len(s);
        }
        len
    }

    fn base128_len(mut v: u32) -> usize {
        let mut n = 1;
        v >>= 7;
        while v > 0 {
            n += 1;
            v >>= 7;
        }
        n
    }

    fn compute_encoded_length(subids: &[u32]) -> usize {
        let content_len = Self::content_length(subids);
        let header_len = if content_len < 128 { 2 } else { 3 };
        header_len + content_len
    }

    /// True if `self` is a prefix of `other` (or equal to it).
    pub fn is_prefix_of(&self, other: &Oid) -> bool {
        self.subids.len() <= other.subids.len() && self.subids[..] == other.subids[..self.subids.len()]
    }

    /// Lexicographic comparison: a strict prefix compares less than any
    /// extension of itself. This is the ordering the MIB store relies on.
    pub fn compare(&self, other: &Oid) -> Ordering {
        self.subids.cmp(&other.subids)
    }

    /// Parses a leading-dot dotted form, e.g. `.1.3.6.1.2.1.1.1.0`.
    /// Returns `None` on: missing leading dot, an empty segment, fewer
    /// than 2 subids, or the first-byte overflow check.
    pub fn from_ascii(s: &str) -> Option<Oid> {
        let rest = s.strip_prefix('.')?;
        if rest.is_empty() {
            return None;
        }

        let mut subids = Vec::new();
        for seg in rest.split('.') {
            if seg.is_empty() {
                return None;
            }
            subids.push(seg.parse::<u32>().ok()?);
        }

        Oid::new(subids).ok()
    }

    /// Inverse of `from_ascii`.
    pub fn to_ascii(&self) -> String {
        let mut s = String::new();
        for sub in &self.subids {
            s.push('.');
            s.push_str(&sub.to_string());
        }
        s
    }
}

impl Ord for Oid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for Oid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ascii())
    }
}
