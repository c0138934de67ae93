use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a stream is cut into units before encryption, and where each unit's
/// nonce and tag end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// One AEAD call over the entire input; nonce/tag travel out-of-band.
    Whole,
    /// Fixed-size ciphertext chunks, no framing on disk; nonce/tag per chunk
    /// travel in a manifest.
    Split,
    /// Each chunk becomes a self-describing `nonce || ciphertext || tag` package.
    #[default]
    Package,
    /// Like `Package`, but the plaintext per chunk shrinks by the package
    /// overhead so every package occupies exactly one chunk on disk.
    PackageFitted,
}

impl Framing {
    pub const ALL: [Framing; 4] = [
        Framing::Whole,
        Framing::Split,
        Framing::Package,
        Framing::PackageFitted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Framing::Whole => "whole",
            Framing::Split => "split",
            Framing::Package => "package",
            Framing::PackageFitted => "package-fitted",
        }
    }

    /// Whether decryption needs nonce/tag data carried outside the ciphertext.
    pub fn needs_manifest(&self) -> bool {
        matches!(self, Framing::Whole | Framing::Split)
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Framing::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!("unknown framing {s:?} (expected whole, split, package, or package-fitted)")
            })
    }
}

/// Log output format for the binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_parse_roundtrip() {
        for framing in Framing::ALL {
            let parsed: Framing = framing.as_str().parse().unwrap();
            assert_eq!(parsed, framing);
        }
        assert_eq!("SPLIT".parse::<Framing>().unwrap(), Framing::Split);
    }

    #[test]
    fn framing_parse_unknown() {
        let err = "chunky".parse::<Framing>().unwrap_err();
        assert!(err.contains("chunky"));
    }

    #[test]
    fn manifest_requirement() {
        assert!(Framing::Whole.needs_manifest());
        assert!(Framing::Split.needs_manifest());
        assert!(!Framing::Package.needs_manifest());
        assert!(!Framing::PackageFitted.needs_manifest());
    }
}
