//! Memory quantities (`4 GB`, `2000 Mb`, `512`)

use crate::error::{AbiQueueError, Result};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Div, Mul};

const MB_PER_GB: f64 = 1024.0;

/// Amount of memory stored in megabytes
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Memory(f64);

impl Memory {
    /// Zero megabytes
    pub const ZERO: Memory = Memory(0.0);

    /// Create from megabytes
    pub fn from_mb(mb: f64) -> Self {
        Self(mb)
    }

    /// Create from gigabytes
    pub fn from_gb(gb: f64) -> Self {
        Self(gb * MB_PER_GB)
    }

    /// Create from a byte count
    pub fn from_bytes(bytes: u64) -> Self {
        Self(bytes as f64 / (1024.0 * 1024.0))
    }

    /// Value in megabytes
    pub fn mb(&self) -> f64 {
        self.0
    }

    /// Value in gigabytes
    pub fn gb(&self) -> f64 {
        self.0 / MB_PER_GB
    }

    /// Value in bytes (rounded down)
    pub fn bytes(&self) -> u64 {
        (self.0 * 1024.0 * 1024.0) as u64
    }

    /// Whole megabytes, as used by queue directives
    pub fn whole_mb(&self) -> u64 {
        self.0.floor() as u64
    }

    /// Human-readable representation
    pub fn human(&self) -> String {
        humansize::format_size(self.bytes(), humansize::BINARY)
    }

    /// Parse a memory string.
    ///
    /// A bare number is interpreted as megabytes. Units are case-insensitive
    /// and use binary multiples (`1 GB == 1024 MB`).
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || AbiQueueError::InvalidUnit {
            kind: "memory",
            value: s.to_string(),
        };

        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(trimmed.len());
        let (num_str, unit) = trimmed.split_at(split);

        let value: f64 = num_str.trim().parse().map_err(|_| invalid())?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid());
        }

        let factor = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "m" | "mb" | "mib" => 1.0,
            "b" => 1.0 / (1024.0 * 1024.0),
            "k" | "kb" | "kib" => 1.0 / 1024.0,
            "g" | "gb" | "gib" => MB_PER_GB,
            "t" | "tb" | "tib" => MB_PER_GB * 1024.0,
            _ => return Err(invalid()),
        };

        Ok(Self(value * factor))
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.fract() == 0.0 {
            write!(f, "{} Mb", self.0 as u64)
        } else {
            write!(f, "{:.1} Mb", self.0)
        }
    }
}

impl Add for Memory {
    type Output = Memory;

    fn add(self, rhs: Memory) -> Memory {
        Memory(self.0 + rhs.0)
    }
}

impl Mul<f64> for Memory {
    type Output = Memory;

    fn mul(self, rhs: f64) -> Memory {
        Memory(self.0 * rhs)
    }
}

impl Div<f64> for Memory {
    type Output = Memory;

    fn div(self, rhs: f64) -> Memory {
        Memory(self.0 / rhs)
    }
}

impl Serialize for Memory {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Memory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MemoryVisitor;

        impl<'de> Visitor<'de> for MemoryVisitor {
            type Value = Memory;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a number of megabytes or a string such as \"4 GB\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Memory, E> {
                Ok(Memory(v as f64))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Memory, E> {
                if v < 0 {
                    return Err(E::custom(format!("negative memory {}", v)));
                }
                Ok(Memory(v as f64))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Memory, E> {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom(format!("invalid memory {}", v)));
                }
                Ok(Memory(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Memory, E> {
                Memory::parse(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(MemoryVisitor)
    }
}
