//! rdbseal-crypto: AES-256-GCM sealing for snapshot files and small payloads
//!
//! Payload shapes:
//! ```text
//! detached:  ciphertext            + (nonce, tag) out-of-band
//! package:   [12 nonce][ciphertext][16 tag]
//! chunked:   a stream of either, one unit per fixed-size chunk
//! ```
//!
//! Every encryption draws a fresh 96-bit nonce; callers never supply one.
//! The key arrives as a base64 string and is decoded once per operation.

pub mod engine;
pub mod error;
pub mod keys;
pub mod manifest;
pub mod package;
pub mod payload;
pub mod random;
pub mod stream;

pub use engine::{CipherEngine, CipherSession, Sealed};
pub use error::{CryptoError, CryptoResult};
pub use keys::SealKey;
pub use manifest::{ChunkManifest, ManifestEntry};
pub use package::{decode_package, encode_package, PackageParts};
pub use payload::{EncryptedTextPackagePayload, EncryptedTextPayload};
pub use random::{NonceSource, OsNonceSource};
pub use stream::{ChunkReader, ChunkSteps, ChunkedStreamProcessor, EncryptOutcome, StreamStats};

pub use rdbseal_core::config::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
pub use rdbseal_core::Framing;

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Bytes a package adds on top of its plaintext
pub const PACKAGE_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;
