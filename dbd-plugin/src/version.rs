use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use dbd_core::error::{DbdError, Result};

/// Package-style software version: dotted numeric segments with an
/// optional release suffix (`4.2.2.0`, `1.0.0-rc1`, `3.1.0_bp1`).
///
/// Versions rank plugin candidates, so ordering must be total: segments
/// compare numerically with implicit zero padding, a longer sequence of
/// equal-by-padding segments ranks higher, and release suffixes compare
/// lexically with "no suffix" ranking below any suffix.
#[derive(Debug, Clone)]
pub struct Version {
    text: String,
    segments: Vec<u64>,
    release: Option<String>,
}

impl Version {
    /// Parses a version string. Malformed input is rejected here, at
    /// descriptor-creation time, never coerced downstream.
    pub fn parse(text: &str) -> Result<Version> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(DbdError::Version("empty version string".to_string()));
        }

        let (numeric, release) = match trimmed.find(['-', '_']) {
            Some(idx) => {
                let suffix = &trimmed[idx + 1..];
                if suffix.is_empty() {
                    return Err(DbdError::Version(trimmed.to_string()));
                }
                (&trimmed[..idx], Some(suffix.to_string()))
            }
            None => (trimmed, None),
        };

        let mut segments = Vec::new();
        for part in numeric.split('.') {
            let n = part
                .parse::<u64>()
                .map_err(|_| DbdError::Version(trimmed.to_string()))?;
            segments.push(n);
        }

        Ok(Version {
            text: trimmed.to_string(),
            segments,
            release,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    pub fn release(&self) -> Option<&str> {
        self.release.as_deref()
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl FromStr for Version {
    type Err = DbdError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments && self.release == other.release
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
        self.release.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        self.segments
            .len()
            .cmp(&other.segments.len())
            .then_with(|| self.release.cmp(&other.release))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
