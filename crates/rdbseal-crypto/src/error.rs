use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Every failure the engine can report. Nothing is retried or swallowed
/// internally; a failed stream operation leaves whatever it already wrote.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key missing, empty, malformed, or the wrong length; or a chunk size the
    /// selected framing cannot use.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Tag verification failed. No plaintext is returned.
    #[error("authentication failed: ciphertext, nonce, or tag does not verify under this key")]
    Authentication,

    #[error("malformed package: {len} bytes (minimum {min})")]
    MalformedPackage { len: usize, min: usize },

    /// Manifest entries do not line up with the ciphertext available.
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    /// A base64 text payload that does not decode to the expected shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled after {chunks} chunk(s)")]
    Cancelled { chunks: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CryptoError {
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, CryptoError::Authentication)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CryptoError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_malformed_package() {
        let err = CryptoError::MalformedPackage { len: 27, min: 28 };
        assert_eq!(err.to_string(), "malformed package: 27 bytes (minimum 28)");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: CryptoError = io.into();
        assert!(matches!(err, CryptoError::Io(_)));
        assert!(!err.is_authentication_failure());
    }

    #[test]
    fn test_predicates() {
        assert!(CryptoError::Authentication.is_authentication_failure());
        assert!(CryptoError::Cancelled { chunks: 3 }.is_cancelled());
        assert!(!CryptoError::Configuration("x".into()).is_cancelled());
    }
}
