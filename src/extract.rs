//! Recover the zstd payload of a .rec file.
//!
//! Footer-stripped .rec files are a zstd stream followed by a fixed 12-byte
//! signature.  Extraction checks the signature, cuts the buffer at the end of
//! the last zstd frame and streams the result through the decompressor.
//! Signature problems are reported as [`IntegrityWarning`]s; the caller
//! decides whether they stop the run.  No output sink is opened until every
//! check has passed or been forced through.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::binary::to_hex;
use crate::error::{IntegrityWarning, RecError, Result};
use crate::frame::{find_frame_end_with, FrameBoundary, FrameFormat, Zstd};

/// Last 12 bytes of a footer-stripped .rec file.
pub const TRAILER_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x00, 0x49, 0xCC, 0xD5, 0x76, 0xF4, 0x05, 0x5A, 0x22,
];

/// Exit status used by the CLI when warnings stop an extraction.
pub const EXIT_UNFORCED_WARNING: u8 = 9;

const DECODE_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Input is already a bare zstd stream; skip the footer handling.
    pub is_zst: bool,
    /// Continue past integrity warnings.
    pub force:  bool,
}

/// Payload slice cut out of a larger buffer.
#[derive(Debug)]
pub struct Carved<'a> {
    pub payload:  &'a [u8],
    pub boundary: FrameBoundary,
    pub warnings: Vec<IntegrityWarning>,
}

#[derive(Debug)]
pub enum ExtractOutcome {
    Written {
        compressed_len: u64,
        output_len:     u64,
        warnings:       Vec<IntegrityWarning>,
    },
    /// Stopped on unforced warnings; nothing was written.
    Aborted { warnings: Vec<IntegrityWarning> },
}

// ── Checks ────────────────────────────────────────────────────────────────────

/// Compare the tail of `buf` with [`TRAILER_SIGNATURE`].
pub fn check_trailer(buf: &[u8]) -> Option<IntegrityWarning> {
    let tail = &buf[buf.len().saturating_sub(TRAILER_SIGNATURE.len())..];
    if tail == TRAILER_SIGNATURE {
        return None;
    }
    Some(IntegrityWarning::with_values(
        format!(
            "This doesn't look like a .rec file. The last {} bytes didn't match the expected value.",
            TRAILER_SIGNATURE.len()
        ),
        to_hex(&TRAILER_SIGNATURE),
        to_hex(tail),
    ))
}

pub fn carve_payload(buf: &[u8]) -> Result<Carved<'_>> {
    carve_payload_with(buf, &Zstd)
}

/// Check the trailer, then cut `buf` at the end of its last frame.
pub fn carve_payload_with<'a, F: FrameFormat>(buf: &'a [u8], format: &F) -> Result<Carved<'a>> {
    let warnings: Vec<_> = check_trailer(buf).into_iter().collect();
    for w in &warnings {
        warn!("{}", w.message);
    }

    let boundary = find_frame_end_with(buf, format)?;
    debug!(
        payload = boundary.end,
        discarded = buf.len() - boundary.end,
        "carved compressed payload"
    );
    Ok(Carved { payload: &buf[..boundary.end], boundary, warnings })
}

// ── Decompression ─────────────────────────────────────────────────────────────

/// Stream a zstd input into `output`, returning the decompressed length.
/// Decoder failures are `Decompression`; failures writing `output` are `Io`.
pub fn decompress<R: Read, W: Write>(input: R, output: &mut W) -> Result<u64> {
    let mut decoder = zstd::stream::read::Decoder::new(input)?;
    let mut chunk = vec![0u8; DECODE_CHUNK];
    let mut written = 0u64;
    loop {
        let n = match decoder.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(RecError::Decompression(e.to_string())),
        };
        output.write_all(&chunk[..n])?;
        written += n as u64;
    }
    output.flush()?;
    Ok(written)
}

/// Run a full extraction.  `open_output` is only called once the payload is
/// known to be writable under `opts`.
pub fn extract<R, W, O>(mut input: R, open_output: O, opts: &ExtractOptions) -> Result<ExtractOutcome>
where
    R: Read,
    W: Write,
    O: FnOnce() -> io::Result<W>,
{
    if opts.is_zst {
        let mut out = open_output()?;
        let mut counted = CountingReader { inner: input, count: 0 };
        let output_len = decompress(&mut counted, &mut out)?;
        return Ok(ExtractOutcome::Written {
            compressed_len: counted.count,
            output_len,
            warnings: Vec::new(),
        });
    }

    let mut buf = Vec::new();
    input.read_to_end(&mut buf)?;
    let carved = carve_payload(&buf)?;

    if !carved.warnings.is_empty() && !opts.force {
        return Ok(ExtractOutcome::Aborted { warnings: carved.warnings });
    }

    let mut out = open_output()?;
    let output_len = decompress(carved.payload, &mut out)?;
    info!(compressed = carved.payload.len(), output_len, "extracted payload");
    Ok(ExtractOutcome::Written {
        compressed_len: carved.payload.len() as u64,
        output_len,
        warnings: carved.warnings,
    })
}

/// File-to-file wrapper around [`extract`].  The output file is only created
/// when something will be written to it, and is removed again if the
/// extraction fails after creating it.
pub fn extract_file(input: &Path, output: &Path, opts: &ExtractOptions) -> Result<ExtractOutcome> {
    let file = File::open(input)?;
    let mut created = false;
    let result = extract(
        io::BufReader::new(file),
        || {
            File::create(output).map(|f| {
                created = true;
                io::BufWriter::new(f)
            })
        },
        opts,
    );
    if result.is_err() && created {
        if let Err(e) = fs::remove_file(output) {
            warn!(path = %output.display(), error = %e, "could not remove partial output");
        }
    }
    result
}

struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec_bytes(payload: &[u8]) -> Vec<u8> {
        let mut buf = zstd::encode_all(payload, 3).unwrap();
        buf.extend(TRAILER_SIGNATURE);
        buf
    }

    #[test]
    fn trailer_matches() {
        assert!(check_trailer(&rec_bytes(b"x")).is_none());
    }

    #[test]
    fn corrupted_trailer_warns_with_both_values() {
        let mut buf = rec_bytes(b"x");
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        let w = check_trailer(&buf).unwrap();
        assert_eq!(w.expected.as_deref(), Some("0000 0000 49CC D576 F405 5A22"));
        assert_eq!(w.actual.as_deref(), Some("0000 0000 49CC D576 F405 5ADD"));
    }

    #[test]
    fn short_buffer_warns() {
        assert!(check_trailer(&[0x22]).is_some());
    }

    #[test]
    fn carve_strips_footer() {
        let buf = rec_bytes(b"match data");
        let carved = carve_payload(&buf).unwrap();
        assert!(carved.warnings.is_empty());
        assert_eq!(carved.payload.len(), buf.len() - TRAILER_SIGNATURE.len());
    }

    #[test]
    fn unforced_warning_opens_no_output() {
        let mut buf = rec_bytes(b"payload");
        let last = buf.len() - 1;
        buf[last] = 0;
        let mut opened = false;
        let outcome = extract(
            &buf[..],
            || {
                opened = true;
                Ok(Vec::new())
            },
            &ExtractOptions::default(),
        )
        .unwrap();
        assert!(matches!(outcome, ExtractOutcome::Aborted { ref warnings } if warnings.len() == 1));
        assert!(!opened);
    }

    #[test]
    fn forced_warning_still_writes() {
        let mut buf = rec_bytes(b"payload");
        let last = buf.len() - 1;
        buf[last] = 0;
        let opts = ExtractOptions { force: true, ..Default::default() };
        match extract(&buf[..], || Ok(Vec::new()), &opts).unwrap() {
            ExtractOutcome::Written { output_len, warnings, .. } => {
                assert_eq!(output_len, 7);
                assert_eq!(warnings.len(), 1);
            }
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn bare_zst_input_streams_directly() {
        let compressed = zstd::encode_all(&b"already a zst"[..], 1).unwrap();
        let opts = ExtractOptions { is_zst: true, ..Default::default() };
        match extract(&compressed[..], || Ok(Vec::new()), &opts).unwrap() {
            ExtractOutcome::Written { compressed_len, output_len, .. } => {
                assert_eq!(compressed_len, compressed.len() as u64);
                assert_eq!(output_len, 13);
            }
            other => panic!("expected output, got {:?}", other),
        }
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_write_failure_is_io_error() {
        let compressed = zstd::encode_all(&b"replay payload"[..], 3).unwrap();
        let err = decompress(&compressed[..], &mut FullDisk).unwrap_err();
        assert!(matches!(err, RecError::Io(_)));
    }

    #[test]
    fn truncated_stream_is_decompression_error() {
        let data: Vec<u8> = (0..20_000u32).flat_map(|i| i.to_le_bytes()).collect();
        let compressed = zstd::encode_all(&data[..], 3).unwrap();
        let err = decompress(&compressed[..compressed.len() / 2], &mut Vec::new()).unwrap_err();
        assert!(matches!(err, RecError::Decompression(_)));
    }

    #[test]
    fn failed_extraction_leaves_no_output_file() {
        let data: Vec<u8> = (0..20_000u32).flat_map(|i| i.to_le_bytes()).collect();
        let compressed = zstd::encode_all(&data[..], 3).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("cut.zst");
        let output = dir.path().join("cut.bin");
        fs::write(&input, &compressed[..compressed.len() / 2]).unwrap();

        let opts = ExtractOptions { is_zst: true, ..Default::default() };
        let err = extract_file(&input, &output, &opts).unwrap_err();
        assert!(matches!(err, RecError::Decompression(_)));
        assert!(!output.exists());
    }

    #[test]
    fn missing_magic_is_fatal() {
        let mut buf = vec![0u8; 32];
        buf.extend(TRAILER_SIGNATURE);
        let err = extract(&buf[..], || Ok(Vec::new()), &ExtractOptions { force: true, is_zst: false }).unwrap_err();
        assert!(matches!(err, RecError::MagicNumberNotFound { .. }));
    }
}
