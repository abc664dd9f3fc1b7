use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// The seven fixed clustering thresholds, narrowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level { T0, T5, T10, T25, T50, T100, T250 }

impl Level {
    pub const ALL: [Level; 7] = [
        Level::T0, Level::T5, Level::T10, Level::T25, Level::T50, Level::T100, Level::T250,
    ];

    /// The SNP distance threshold of this level.
    #[must_use]
    pub fn threshold(self) -> u32 {
        match self {
            Level::T0   => 0,
            Level::T5   => 5,
            Level::T10  => 10,
            Level::T25  => 25,
            Level::T50  => 50,
            Level::T100 => 100,
            Level::T250 => 250,
        }
    }

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Level::T0   => 0,
            Level::T5   => 1,
            Level::T10  => 2,
            Level::T25  => 3,
            Level::T50  => 4,
            Level::T100 => 5,
            Level::T250 => 6,
        }
    }

    /// The narrowest level whose threshold contains the given distance, or
    /// `None` when the distance exceeds even the widest threshold.
    #[must_use]
    pub fn smallest_containing(distance: u32) -> Option<Level> {
        Level::ALL.into_iter().find(|l| distance <= l.threshold())
    }

    /// The next wider level, if any.
    #[must_use]
    pub fn wider(self) -> Option<Level> {
        Level::ALL.get(self.index() + 1).copied()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.threshold())
    }
}

/// A per-level cluster identifier tuple: the sample's SNP address.
///
/// Stored narrowest-level first (t0..t250). The textual form is the reverse,
/// widest first: "t250.t100.t50.t25.t10.t5.t0".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnpAddress([u32; 7]);

impl SnpAddress {
    /// The reference sample's address, by definition.
    pub const REFERENCE: SnpAddress = SnpAddress([1; 7]);

    #[must_use]
    pub fn new(ids: [u32; 7]) -> Self {
        Self(ids)
    }

    #[must_use]
    pub fn level(&self, level: Level) -> u32 {
        self.0[level.index()]
    }

    pub fn set_level(&mut self, level: Level, cluster: u32) {
        self.0[level.index()] = cluster;
    }

    /// This address with a single level replaced.
    #[must_use]
    pub fn with_level(mut self, level: Level, cluster: u32) -> Self {
        self.set_level(level, cluster);
        self
    }

    #[must_use]
    pub fn levels(&self) -> [u32; 7] {
        self.0
    }
}

impl fmt::Display for SnpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut widest_first = Level::ALL;
        widest_first.reverse();
        let text: Vec<String> = widest_first.iter().map(|l| self.level(*l).to_string()).collect();
        write!(f, "{}", text.join("."))
    }
}

impl FromStr for SnpAddress {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 7 {
            return Err(StoreError::InvalidAddress(s.to_string()));
        }
        let mut ids = [0u32; 7];
        for (widest_offset, part) in parts.iter().enumerate() {
            let id = part.parse::<u32>().map_err(|_| StoreError::InvalidAddress(s.to_string()))?;
            ids[6 - widest_offset] = id;
        }
        Ok(Self(ids))
    }
}
