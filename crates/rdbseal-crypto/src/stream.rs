//! Chunked read → transform → write over byte streams
//!
//! Every operation is one sequential loop: a unit is read, transformed, and
//! written before the next is read, so memory stays bounded by the unit size
//! (whole framing excepted) and output order always matches input order.
//!
//! | framing          | plaintext per unit        | stored per unit            | out-of-band |
//! |------------------|---------------------------|----------------------------|-------------|
//! | `Split`          | `chunk_size`              | `chunk_size`               | manifest    |
//! | `Package`        | `chunk_size`              | `chunk_size + 28`          | none        |
//! | `PackageFitted`  | `chunk_size - 28`         | `chunk_size`               | none        |
//! | `Whole`          | entire input              | entire input               | manifest    |
//!
//! The final unit of a chunked stream may be short; it is never padded.
//!
//! Cancellation is checked once per unit, before the unit is read. A failed or
//! cancelled operation stops immediately and leaves already-written output in
//! place; callers must discard it.

use std::io::{self, Read, Seek, SeekFrom, Write};

use rdbseal_core::Framing;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::engine::{CipherEngine, CipherSession};
use crate::error::{CryptoError, CryptoResult};
use crate::manifest::ChunkManifest;
use crate::package::{decode_package, encode_package};
use crate::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, PACKAGE_OVERHEAD};

/// Upper bound on the capacity reserved before a unit is read
const READ_PREALLOC: usize = 64 * 1024;

/// Progress callback: (units done, input bytes consumed)
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Totals for one stream operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub chunks: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Result of an encryption: stats, plus the manifest for framings that
/// need one to decrypt.
#[derive(Debug, Clone)]
pub struct EncryptOutcome {
    pub manifest: Option<ChunkManifest>,
    pub stats: StreamStats,
}

/// Reads a stream in units of exactly `unit` bytes; only the last may be
/// shorter. A zero-byte read ends the iteration; `Interrupted` is retried.
pub struct ChunkReader<R> {
    reader: R,
    unit: usize,
    done: bool,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(reader: R, unit: usize) -> Self {
        Self {
            reader,
            unit,
            done: false,
        }
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        // The buffer grows with what is actually read, never to `unit` up front.
        let mut buf = Vec::with_capacity(self.unit.min(READ_PREALLOC));
        match (&mut self.reader).take(self.unit as u64).read_to_end(&mut buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(n) => {
                if n < self.unit {
                    self.done = true;
                }
                Some(Ok(buf))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Stored size of a package holding `plain` bytes.
fn with_overhead(plain: usize) -> CryptoResult<usize> {
    plain.checked_add(PACKAGE_OVERHEAD).ok_or_else(|| {
        CryptoError::Configuration(format!("chunk size {plain} overflows with package overhead"))
    })
}

/// Bytes between the current position and the end, position unchanged.
fn remaining_len<R: Seek>(input: &mut R) -> io::Result<u64> {
    let pos = input.stream_position()?;
    let end = input.seek(SeekFrom::End(0))?;
    input.seek(SeekFrom::Start(pos))?;
    Ok(end.saturating_sub(pos))
}

/// One unit after transformation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedChunk {
    pub index: u64,
    pub input_len: usize,
    pub output: Vec<u8>,
}

/// Iterator yielding one transformed unit per step.
///
/// The first error (I/O, transform, or cancellation) is yielded once and ends
/// the iteration.
pub struct ChunkSteps<'c, R, F> {
    chunks: ChunkReader<R>,
    transform: F,
    cancel: &'c CancellationToken,
    index: u64,
    finished: bool,
}

impl<'c, R, F> ChunkSteps<'c, R, F>
where
    R: Read,
    F: FnMut(u64, Vec<u8>) -> CryptoResult<Vec<u8>>,
{
    pub fn new(input: R, unit: usize, cancel: &'c CancellationToken, transform: F) -> Self {
        Self {
            chunks: ChunkReader::new(input, unit),
            transform,
            cancel,
            index: 0,
            finished: false,
        }
    }
}

impl<R, F> Iterator for ChunkSteps<'_, R, F>
where
    R: Read,
    F: FnMut(u64, Vec<u8>) -> CryptoResult<Vec<u8>>,
{
    type Item = CryptoResult<ProcessedChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.finished = true;
            return Some(Err(CryptoError::Cancelled { chunks: self.index }));
        }

        let input = match self.chunks.next()? {
            Ok(input) => input,
            Err(e) => {
                self.finished = true;
                return Some(Err(e.into()));
            }
        };

        let index = self.index;
        let input_len = input.len();
        match (self.transform)(index, input) {
            Ok(output) => {
                self.index += 1;
                Some(Ok(ProcessedChunk {
                    index,
                    input_len,
                    output,
                }))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Drives the engine over streams in any [`Framing`].
pub struct ChunkedStreamProcessor {
    engine: CipherEngine,
    chunk_size: usize,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
}

impl ChunkedStreamProcessor {
    pub fn new(engine: CipherEngine) -> Self {
        Self {
            engine,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Observe `cancel` between units.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn engine(&self) -> &CipherEngine {
        &self.engine
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Plaintext bytes read per unit when encrypting with `framing`.
    pub fn plaintext_unit(&self, framing: Framing) -> CryptoResult<usize> {
        match framing {
            Framing::Whole => Ok(usize::MAX),
            _ if self.chunk_size == 0 => Err(CryptoError::Configuration(
                "chunk size must be non-zero".into(),
            )),
            _ if self.chunk_size > MAX_CHUNK_SIZE => Err(CryptoError::Configuration(format!(
                "chunk size {} exceeds the maximum of {MAX_CHUNK_SIZE}",
                self.chunk_size
            ))),
            Framing::Split | Framing::Package => Ok(self.chunk_size),
            Framing::PackageFitted if self.chunk_size > PACKAGE_OVERHEAD => {
                Ok(self.chunk_size - PACKAGE_OVERHEAD)
            }
            Framing::PackageFitted => Err(CryptoError::Configuration(format!(
                "chunk size {} leaves no room for plaintext after the {PACKAGE_OVERHEAD}-byte package overhead",
                self.chunk_size
            ))),
        }
    }

    /// Stored bytes per unit (what decryption reads) for `framing`.
    pub fn stored_unit(&self, framing: Framing) -> CryptoResult<usize> {
        let plain = self.plaintext_unit(framing)?;
        match framing {
            Framing::Package | Framing::PackageFitted => with_overhead(plain),
            Framing::Split | Framing::Whole => Ok(plain),
        }
    }

    /// Encrypt `input` into `output` with the given framing.
    pub fn encrypt<R: Read, W: Write>(
        &self,
        framing: Framing,
        input: R,
        output: W,
    ) -> CryptoResult<EncryptOutcome> {
        match framing {
            Framing::Split => {
                let (manifest, stats) = self.encrypt_split(input, output)?;
                Ok(EncryptOutcome {
                    manifest: Some(manifest),
                    stats,
                })
            }
            Framing::Whole => {
                let (manifest, stats) = self.encrypt_whole(input, output)?;
                Ok(EncryptOutcome {
                    manifest: Some(manifest),
                    stats,
                })
            }
            Framing::Package | Framing::PackageFitted => {
                let stats = self.encrypt_packaged(framing, input, output)?;
                Ok(EncryptOutcome {
                    manifest: None,
                    stats,
                })
            }
        }
    }

    /// Decrypt `input` into `output`. Split and whole framing require the
    /// manifest produced at encryption time.
    pub fn decrypt<R: Read + Seek, W: Write>(
        &self,
        framing: Framing,
        input: R,
        output: W,
        manifest: Option<&ChunkManifest>,
    ) -> CryptoResult<StreamStats> {
        match (framing, manifest) {
            (Framing::Split, Some(manifest)) => self.decrypt_split(input, output, manifest),
            (Framing::Whole, Some(manifest)) => self.decrypt_whole(input, output, manifest),
            (Framing::Split | Framing::Whole, None) => Err(CryptoError::MalformedManifest(
                format!("{framing} framing cannot be decrypted without its manifest"),
            )),
            (Framing::Package | Framing::PackageFitted, _) => {
                self.decrypt_packaged(framing, input, output)
            }
        }
    }

    /// Split framing: bare ciphertext chunks out, nonce/tag per chunk into the
    /// returned manifest.
    pub fn encrypt_split<R: Read, W: Write>(
        &self,
        input: R,
        mut output: W,
    ) -> CryptoResult<(ChunkManifest, StreamStats)> {
        let unit = self.plaintext_unit(Framing::Split)?;
        let session = self.engine.session()?;
        debug!(framing = "split", chunk_size = unit, "encrypting stream");

        let mut manifest = ChunkManifest::split(unit);
        let steps = ChunkSteps::new(input, unit, &self.cancel, |_, plaintext| {
            let sealed = session.encrypt(&plaintext)?;
            manifest.push(sealed.nonce, sealed.tag);
            Ok(sealed.ciphertext)
        });
        let stats = self.pump(Framing::Split, steps, &mut output)?;

        debug!(chunks = stats.chunks, bytes = stats.bytes_out, "split encryption complete");
        Ok((manifest, stats))
    }

    /// Split framing: chunk boundaries come from the manifest order and the
    /// manifest's chunk size; the final chunk takes whatever remains.
    pub fn decrypt_split<R: Read + Seek, W: Write>(
        &self,
        mut input: R,
        mut output: W,
        manifest: &ChunkManifest,
    ) -> CryptoResult<StreamStats> {
        if manifest.framing != Framing::Split {
            return Err(CryptoError::MalformedManifest(format!(
                "expected a split manifest, got {}",
                manifest.framing
            )));
        }
        let unit = manifest.chunk_size.unwrap_or(0);
        if unit != self.chunk_size {
            warn!(
                manifest = unit,
                configured = self.chunk_size,
                "manifest chunk size differs from configured chunk size; using manifest"
            );
        }

        let available = remaining_len(&mut input)?;
        manifest.validate_against(available)?;
        let session = self.engine.session()?;
        debug!(framing = "split", chunk_size = unit, chunks = manifest.len(), "decrypting stream");

        let entries = manifest.entries();
        let steps = ChunkSteps::new(input, unit, &self.cancel, |index, ciphertext| {
            let entry = entries.get(index as usize).ok_or_else(|| {
                CryptoError::MalformedManifest(format!(
                    "ciphertext continues past the last manifest entry ({})",
                    entries.len()
                ))
            })?;
            session.decrypt(&ciphertext, &entry.nonce, &entry.tag)
        });
        let stats = self.pump(Framing::Split, steps, &mut output)?;

        if stats.chunks != entries.len() as u64 {
            return Err(CryptoError::MalformedManifest(format!(
                "ciphertext ended after {} chunk(s), manifest lists {}",
                stats.chunks,
                entries.len()
            )));
        }
        Ok(stats)
    }

    /// Package framing, plain or fitted.
    pub fn encrypt_packaged<R: Read, W: Write>(
        &self,
        framing: Framing,
        input: R,
        mut output: W,
    ) -> CryptoResult<StreamStats> {
        let unit = self.packaged_plaintext_unit(framing)?;
        let session = self.engine.session()?;
        debug!(framing = %framing, plaintext_unit = unit, "encrypting stream");

        let steps = ChunkSteps::new(input, unit, &self.cancel, |_, plaintext| {
            encode_package(&session, &plaintext)
        });
        let stats = self.pump(framing, steps, &mut output)?;

        debug!(chunks = stats.chunks, bytes = stats.bytes_out, "package encryption complete");
        Ok(stats)
    }

    /// Package framing: each stored unit is an independent package; the last
    /// one may be shorter than the nominal unit.
    pub fn decrypt_packaged<R: Read, W: Write>(
        &self,
        framing: Framing,
        input: R,
        mut output: W,
    ) -> CryptoResult<StreamStats> {
        let unit = with_overhead(self.packaged_plaintext_unit(framing)?)?;
        let session = self.engine.session()?;
        debug!(framing = %framing, stored_unit = unit, "decrypting stream");

        let steps = ChunkSteps::new(input, unit, &self.cancel, |_, blob| {
            decode_package(&session, &blob)
        });
        self.pump(framing, steps, &mut output)
    }

    /// Whole framing: the entire input is buffered and sealed in one call.
    /// Memory use grows with the input; the chunked framings do not.
    pub fn encrypt_whole<R: Read, W: Write>(
        &self,
        mut input: R,
        mut output: W,
    ) -> CryptoResult<(ChunkManifest, StreamStats)> {
        let session = self.engine.session()?;
        self.check_cancelled(0)?;

        let mut plaintext = Vec::new();
        input.read_to_end(&mut plaintext)?;
        debug!(framing = "whole", bytes = plaintext.len(), "encrypting payload");

        let sealed = session.encrypt(&plaintext)?;
        output.write_all(&sealed.ciphertext)?;
        output.flush()?;

        let stats = StreamStats {
            chunks: 1,
            bytes_in: plaintext.len() as u64,
            bytes_out: sealed.ciphertext.len() as u64,
        };
        self.report(&stats);
        Ok((ChunkManifest::whole(sealed.nonce, sealed.tag), stats))
    }

    pub fn decrypt_whole<R: Read, W: Write>(
        &self,
        mut input: R,
        mut output: W,
        manifest: &ChunkManifest,
    ) -> CryptoResult<StreamStats> {
        if manifest.framing != Framing::Whole {
            return Err(CryptoError::MalformedManifest(format!(
                "expected a whole manifest, got {}",
                manifest.framing
            )));
        }
        manifest.validate_against(0)?;
        let session = self.engine.session()?;
        self.check_cancelled(0)?;

        let mut ciphertext = Vec::new();
        input.read_to_end(&mut ciphertext)?;
        debug!(framing = "whole", bytes = ciphertext.len(), "decrypting payload");

        let entry = &manifest.entries()[0];
        let plaintext = session
            .decrypt(&ciphertext, &entry.nonce, &entry.tag)
            .inspect_err(|e| warn!(framing = "whole", error = %e, "decryption aborted"))?;
        output.write_all(&plaintext)?;
        output.flush()?;

        let stats = StreamStats {
            chunks: 1,
            bytes_in: ciphertext.len() as u64,
            bytes_out: plaintext.len() as u64,
        };
        self.report(&stats);
        Ok(stats)
    }

    /// Open a cipher session for callers driving [`ChunkSteps`] by hand.
    pub fn session(&self) -> CryptoResult<CipherSession> {
        self.engine.session()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    fn packaged_plaintext_unit(&self, framing: Framing) -> CryptoResult<usize> {
        match framing {
            Framing::Package | Framing::PackageFitted => self.plaintext_unit(framing),
            other => Err(CryptoError::Configuration(format!(
                "{other} framing does not produce packages"
            ))),
        }
    }

    fn check_cancelled(&self, chunks: u64) -> CryptoResult<()> {
        if self.cancel.is_cancelled() {
            warn!(chunks, "stream cancelled");
            return Err(CryptoError::Cancelled { chunks });
        }
        Ok(())
    }

    fn report(&self, stats: &StreamStats) {
        if let Some(progress) = &self.progress {
            progress(stats.chunks, stats.bytes_in);
        }
    }

    /// Write each step's output as soon as it is produced.
    fn pump<R, W, F>(
        &self,
        framing: Framing,
        steps: ChunkSteps<'_, R, F>,
        output: &mut W,
    ) -> CryptoResult<StreamStats>
    where
        R: Read,
        W: Write,
        F: FnMut(u64, Vec<u8>) -> CryptoResult<Vec<u8>>,
    {
        let mut stats = StreamStats::default();
        for step in steps {
            let chunk = step.inspect_err(|e| {
                warn!(framing = %framing, chunk = stats.chunks, error = %e, "stream aborted");
            })?;
            output.write_all(&chunk.output)?;
            trace!(
                index = chunk.index,
                input = chunk.input_len,
                output = chunk.output.len(),
                "chunk written"
            );
            stats.chunks += 1;
            stats.bytes_in += chunk.input_len as u64;
            stats.bytes_out += chunk.output.len() as u64;
            self.report(&stats);
        }
        output.flush()?;
        Ok(stats)
    }
}
