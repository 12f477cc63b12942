use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{C2eError, C2eResult};

/// 55-byte magic prefixed to every Creatures Archive envelope.
pub const ARCHIVE_MAGIC: &[u8; 55] =
    b"Creatures Evolution Engine - Archived information file.";

/// Marker pair separating the envelope header from the zlib payload.
const ARCHIVE_MARKER: [u8; 2] = [0x1A, 0x04];

pub fn deflate(data: &[u8]) -> C2eResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn inflate(data: &[u8]) -> C2eResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| C2eError::Format(format!("zlib inflate failed: {e}")))?;
    Ok(out)
}

/// Wraps `data` in a Creatures Archive envelope: magic, marker pair, then
/// the zlib-compressed payload.
pub fn wrap(data: &[u8]) -> C2eResult<Vec<u8>> {
    let mut out = Vec::with_capacity(ARCHIVE_MAGIC.len() + 2 + data.len() / 2);
    out.extend_from_slice(ARCHIVE_MAGIC);
    out.extend_from_slice(&ARCHIVE_MARKER);
    out.extend_from_slice(&deflate(data)?);
    Ok(out)
}

/// Validates the envelope magic, locates the marker pair and inflates
/// everything after it.
pub fn unwrap(data: &[u8]) -> C2eResult<Vec<u8>> {
    if data.len() < ARCHIVE_MAGIC.len() || &data[..ARCHIVE_MAGIC.len()] != ARCHIVE_MAGIC {
        return Err(C2eError::Format(
            "not a Creatures Archive (bad magic)".into(),
        ));
    }
    let marker = data[ARCHIVE_MAGIC.len()..]
        .windows(2)
        .position(|pair| pair == &ARCHIVE_MARKER[..])
        .ok_or_else(|| C2eError::Format("Creatures Archive marker pair missing".into()))?;
    inflate(&data[ARCHIVE_MAGIC.len() + marker + 2..])
}

/// True if the buffer starts with the envelope magic.
pub fn is_archived(data: &[u8]) -> bool {
    data.len() >= ARCHIVE_MAGIC.len() && &data[..ARCHIVE_MAGIC.len()] == ARCHIVE_MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_unwrap_round_trips() {
        for payload in [&b""[..], b"x", b"some archived information"] {
            assert_eq!(unwrap(&wrap(payload).unwrap()).unwrap(), payload);
        }
    }

    #[test]
    fn unwrap_rejects_bad_magic() {
        let err = unwrap(b"Creatures Evolution Engine - something else entirely...").unwrap_err();
        assert!(matches!(err, C2eError::Format(_)));
    }

    #[test]
    fn unwrap_rejects_garbage_payload() {
        let mut data = ARCHIVE_MAGIC.to_vec();
        data.extend_from_slice(&[0x1A, 0x04]);
        data.extend_from_slice(b"this is not zlib data");
        assert!(matches!(unwrap(&data), Err(C2eError::Format(_))));
    }

    #[test]
    fn unwrap_tolerates_text_between_magic_and_marker() {
        // writers historically append a compressor note after the magic
        let mut data = ARCHIVE_MAGIC.to_vec();
        data.extend_from_slice(b" zLib 1.13 compressed.");
        data.extend_from_slice(&[0x1A, 0x04]);
        data.extend_from_slice(&deflate(b"payload").unwrap());
        assert_eq!(unwrap(&data).unwrap(), b"payload");
    }

    #[test]
    fn zlib_round_trips() {
        let data = vec![7u8; 4096];
        let packed = deflate(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(inflate(&packed).unwrap(), data);
    }
}
