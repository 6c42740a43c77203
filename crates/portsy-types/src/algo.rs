use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Content-digest algorithm used for manifest hashes.
///
/// A single [`crate::ProjectState`] uses exactly one algorithm for every file
/// entry; the algorithm is recorded on the state (and on the local cache) so
/// that readers never have to guess.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgo {
    #[default]
    Sha256,
    Blake3,
}

impl HashAlgo {
    /// Wire name of the algorithm (`"sha256"` / `"blake3"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }

    /// Parse an algorithm name, falling back to SHA-256 for anything unknown.
    ///
    /// Cache files written by older versions may carry an empty or unexpected
    /// algorithm string; treating those as the default keeps loads tolerant.
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Hex digest length in characters for this algorithm.
    pub fn hex_len(&self) -> usize {
        // Both SHA-256 and BLAKE3 produce 32-byte digests.
        64
    }
}

impl fmt::Display for HashAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgo {
    type Err = crate::TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(crate::TypeError::UnknownAlgo(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_sha256() {
        assert_eq!(HashAlgo::default(), HashAlgo::Sha256);
    }

    #[test]
    fn wire_names_roundtrip() {
        for algo in [HashAlgo::Sha256, HashAlgo::Blake3] {
            let parsed: HashAlgo = algo.as_str().parse().unwrap();
            assert_eq!(parsed, algo);
        }
    }

    #[test]
    fn parse_lossy_falls_back() {
        assert_eq!(HashAlgo::parse_lossy("md5"), HashAlgo::Sha256);
        assert_eq!(HashAlgo::parse_lossy(""), HashAlgo::Sha256);
        assert_eq!(HashAlgo::parse_lossy("blake3"), HashAlgo::Blake3);
    }

    #[test]
    fn unknown_algo_is_an_error() {
        let err = "crc32".parse::<HashAlgo>().unwrap_err();
        assert!(matches!(err, crate::TypeError::UnknownAlgo(_)));
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&HashAlgo::Blake3).unwrap();
        assert_eq!(json, "\"blake3\"");
        let back: HashAlgo = serde_json::from_str("\"sha256\"").unwrap();
        assert_eq!(back, HashAlgo::Sha256);
    }
}
