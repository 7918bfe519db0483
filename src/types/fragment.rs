use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use chrono::Utc;
use uuid::Uuid;

pub const FRAGMENT_PREFIX: &str = "fragments/";

/// Object storage key of a single fragment: `fragments/fragment_{index}_{stamp}.bin`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct FragmentKey(pub String);

impl FragmentKey {
    pub fn new(index: usize, stamp: Stamp) -> Self {
        Self(format!("{}fragment_{}_{}.bin", FRAGMENT_PREFIX, index, stamp))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits a well-formed key back into `(index, millis)`.
    ///
    /// Keys written without a nonce (`fragment_{index}_{millis}.bin`) parse too.
    pub fn parse(&self) -> Option<(usize, u64)> {
        let rest = self.0.strip_prefix(FRAGMENT_PREFIX)?;
        let rest = rest.strip_prefix("fragment_")?.strip_suffix(".bin")?;
        let (index, stamp) = rest.split_once('_')?;
        let millis = match stamp.split_once('-') {
            Some((millis, nonce)) => {
                u64::from_str_radix(nonce, 16).ok()?;
                millis
            }
            None => stamp,
        };
        Some((index.parse().ok()?, millis.parse().ok()?))
    }
}

impl fmt::Display for FragmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Time component of a fragment key plus the nonce of the stamper that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stamp {
    pub millis: u64,
    pub nonce: u64,
}

impl Stamp {
    pub fn new(millis: u64, nonce: u64) -> Self {
        Self { millis, nonce }
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:016x}", self.millis, self.nonce)
    }
}

/// Hands out stamps that never repeat, within a process or across processes
/// writing to the same bucket.
///
/// Milliseconds are strictly increasing per stamper: when two ingests land in
/// the same millisecond the later one is pushed one millisecond forward. Each
/// stamper also draws a random nonce once, so two stampers (two coordinators,
/// or two processes) issuing the same millisecond still produce distinct keys.
#[derive(Debug)]
pub struct KeyStamper {
    last: AtomicU64,
    nonce: u64,
}

impl Default for KeyStamper {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStamper {
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
            nonce: Uuid::new_v4().as_u128() as u64,
        }
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn next(&self) -> Stamp {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return Stamp::new(candidate, self.nonce),
                Err(observed) => last = observed,
            }
        }
    }
}
