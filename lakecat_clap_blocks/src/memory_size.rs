//! Byte sizes given on the command line, e.g. `128MiB`, `1mb` or `1024`
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemorySizeError {
    #[error("memory size must not be empty")]
    Empty,

    #[error("invalid number in memory size '{0}'")]
    Number(String),

    #[error("unknown unit '{unit}' in memory size '{input}', expected one of b, kb, mb, gb, tb")]
    Unit { input: String, unit: String },

    #[error("memory size '{0}' does not fit in 64 bits")]
    Overflow(String),
}

/// A number of bytes
///
/// Units are case insensitive and binary: `kb` and `kib` both mean 1024 bytes. A bare number is
/// taken as bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemorySize(u64);

impl MemorySize {
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn from_mebibytes(mebibytes: u64) -> Self {
        Self(mebibytes * 1024 * 1024)
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }
}

fn multiplier(unit: &str) -> Option<u64> {
    let shift = match unit {
        "" | "b" | "bytes" => 0,
        "k" | "kb" | "kib" => 10,
        "m" | "mb" | "mib" => 20,
        "g" | "gb" | "gib" => 30,
        "t" | "tb" | "tib" => 40,
        _ => return None,
    };
    Some(1 << shift)
}

impl FromStr for MemorySize {
    type Err = MemorySizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MemorySizeError::Empty);
        }

        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (number, unit) = s.split_at(split);
        let number: u64 = number
            .parse()
            .map_err(|_| MemorySizeError::Number(s.to_string()))?;
        let unit = unit.trim().to_ascii_lowercase();
        let multiplier = multiplier(&unit).ok_or_else(|| MemorySizeError::Unit {
            input: s.to_string(),
            unit,
        })?;

        number
            .checked_mul(multiplier)
            .map(Self)
            .ok_or_else(|| MemorySizeError::Overflow(s.to_string()))
    }
}

impl std::fmt::Display for MemorySize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}b", self.0)
    }
}

impl From<MemorySize> for u64 {
    fn from(size: MemorySize) -> Self {
        size.0
    }
}
