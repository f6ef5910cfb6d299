use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Blake3,
    Sha256,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumAlgorithm::Blake3 => write!(f, "blake3"),
            ChecksumAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// An expected artifact digest, written `blake3:<hex>` or `sha256:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub hex: String,
}

impl Checksum {
    pub fn blake3(hex: impl Into<String>) -> Self {
        Self {
            algorithm: ChecksumAlgorithm::Blake3,
            hex: hex.into().to_ascii_lowercase(),
        }
    }

    pub fn sha256(hex: impl Into<String>) -> Self {
        Self {
            algorithm: ChecksumAlgorithm::Sha256,
            hex: hex.into().to_ascii_lowercase(),
        }
    }

    /// Pick the digest of the matching algorithm and compare.
    pub fn matches(&self, blake3_hex: &str, sha256_hex: &str) -> bool {
        let actual = match self.algorithm {
            ChecksumAlgorithm::Blake3 => blake3_hex,
            ChecksumAlgorithm::Sha256 => sha256_hex,
        };
        actual.eq_ignore_ascii_case(&self.hex)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for Checksum {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((algo, hex)) = s.trim().split_once(':') else {
            return Err(format!("checksum '{s}' must be '<algorithm>:<hex>'"));
        };
        let algorithm = match algo.to_ascii_lowercase().as_str() {
            "blake3" => ChecksumAlgorithm::Blake3,
            "sha256" => ChecksumAlgorithm::Sha256,
            other => return Err(format!("unsupported checksum algorithm '{other}'")),
        };
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("checksum '{s}' must carry 64 hex digits"));
        }
        Ok(Self {
            algorithm,
            hex: hex.to_ascii_lowercase(),
        })
    }
}

impl TryFrom<String> for Checksum {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Checksum> for String {
    fn from(value: Checksum) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_algorithms() {
        let b: Checksum = format!("blake3:{}", "A".repeat(64)).parse().unwrap();
        assert_eq!(b.algorithm, ChecksumAlgorithm::Blake3);
        assert_eq!(b.hex, "a".repeat(64));

        let s: Checksum = format!("sha256:{}", "0".repeat(64)).parse().unwrap();
        assert_eq!(s.algorithm, ChecksumAlgorithm::Sha256);
    }

    #[test]
    fn rejects_bad_input() {
        assert!("nocolon".parse::<Checksum>().is_err());
        assert!(format!("md5:{}", "0".repeat(64)).parse::<Checksum>().is_err());
        assert!("blake3:abc".parse::<Checksum>().is_err());
        assert!(format!("blake3:{}", "z".repeat(64)).parse::<Checksum>().is_err());
    }

    #[test]
    fn matches_selects_algorithm() {
        let b = Checksum::blake3("a".repeat(64));
        assert!(b.matches(&"a".repeat(64), &"b".repeat(64)));
        assert!(!b.matches(&"b".repeat(64), &"a".repeat(64)));
        let s = Checksum::sha256("b".repeat(64));
        assert!(s.matches(&"a".repeat(64), &"B".repeat(64)));
    }

    #[test]
    fn display_roundtrips() {
        let c = Checksum::sha256("c".repeat(64));
        let back: Checksum = c.to_string().parse().unwrap();
        assert_eq!(back, c);
    }
}
