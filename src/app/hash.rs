//! Query signatures
//!
//! A signature identifies a semantically unique query: the same year,
//! dataset, variable set and geography always hash to the same value no
//! matter how the caller ordered its inputs. Signatures are stored as the raw
//! 16-byte MD5 digest and rendered as lowercase hex for file names and the
//! cache index.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::app::models::GeoConstraint;
use crate::errors::CacheError;

/// MD5 digest identifying a cached query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuerySignature([u8; 16]);

/// Canonical form hashed into a signature; field order is part of the format
#[derive(Serialize)]
struct CanonicalQuery<'a> {
    year: u16,
    dataset: &'a str,
    variables: Vec<&'a str>,
    geo_for: String,
    geo_in: Vec<String>,
}

impl QuerySignature {
    /// Compute the signature of a query
    ///
    /// Variables are trimmed, sorted and deduplicated and the geography's
    /// ancestor clauses are sorted before hashing.
    pub fn compute(year: u16, dataset: &str, variables: &[String], geo: &GeoConstraint) -> Self {
        let mut sorted: Vec<&str> = variables.iter().map(|v| v.trim()).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let (geo_for, geo_in) = geo.normalized();
        let canonical = CanonicalQuery {
            year,
            dataset: dataset.trim(),
            variables: sorted,
            geo_for,
            geo_in,
        };

        // Serializing plain strings and integers cannot fail; fall back to Debug anyway
        let encoded = serde_json::to_vec(&canonical)
            .unwrap_or_else(|_| format!("{:?}", (year, dataset, variables, geo)).into_bytes());
        QuerySignature(md5::compute(encoded).0)
    }

    /// Parse a signature from a 32-character hex string (case insensitive)
    pub fn from_hex(hex: &str) -> Result<Self, CacheError> {
        let invalid = || CacheError::IndexCorrupted {
            reason: format!("invalid signature: {}", hex),
        };

        if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let mut bytes = [0u8; 16];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| invalid())?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
        }
        Ok(QuerySignature(bytes))
    }

    /// Lowercase hex representation
    pub fn to_hex(&self) -> String {
        use std::fmt::Write;
        self.0.iter().fold(String::with_capacity(32), |mut acc, b| {
            let _ = write!(&mut acc, "{:02x}", b);
            acc
        })
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        QuerySignature(bytes)
    }
}

impl fmt::Display for QuerySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for QuerySignature {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Serialized as a hex string so the index stays readable
impl Serialize for QuerySignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for QuerySignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_string = String::deserialize(deserializer)?;
        Self::from_hex(&hex_string).map_err(serde::de::Error::custom)
    }
}
