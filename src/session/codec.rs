//! Binary record codec
//!
//! Encodes and decodes one record at a time. All integers are little-endian
//! regardless of the host. The tagged layout is:
//!
//! ```text
//! i64 timestamp | i32 stimulus_code | i32 payload_length | payload
//! ```
//!
//! and the legacy layout keeps only `i32 payload_length | payload`.
//!
//! Files may optionally begin with a 5-byte header (`b"SCAP"` followed by the
//! format byte). Headerless files are the default so existing captures and
//! readers stay compatible.

use std::io::{Read, Write};

use crate::error::{Result, StimCapError};
use crate::types::{Record, Timestamp, NO_STIMULUS};

use super::types::RecordFormat;

/// Magic bytes that open a file carrying an explicit format header
pub const HEADER_MAGIC: [u8; 4] = *b"SCAP";

/// Size of the optional file header
pub const FILE_HEADER_LEN: usize = HEADER_MAGIC.len() + 1;

/// Encoder/decoder for a single record layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCodec {
    format: RecordFormat,
}

impl FrameCodec {
    /// Create a codec for the given layout
    pub fn new(format: RecordFormat) -> Self {
        Self { format }
    }

    /// Codec for the default tagged layout
    pub fn tagged() -> Self {
        Self::new(RecordFormat::Tagged)
    }

    /// Layout handled by this codec
    pub fn format(&self) -> RecordFormat {
        self.format
    }

    /// Exact encoded size of a record with the given payload length
    pub fn encoded_len(&self, payload_len: usize) -> usize {
        self.format.record_header_len() + payload_len
    }

    /// Encode one record into a fresh buffer
    ///
    /// The legacy layout has no room for the timestamp or stimulus code;
    /// both are dropped.
    pub fn encode(&self, timestamp: Timestamp, stimulus_code: i32, payload: &[u8]) -> Result<Vec<u8>> {
        let len = i32::try_from(payload.len())
            .map_err(|_| StimCapError::PayloadTooLarge(payload.len()))?;

        let mut buf = Vec::with_capacity(self.encoded_len(payload.len()));
        if self.format == RecordFormat::Tagged {
            buf.extend_from_slice(&timestamp.raw().to_le_bytes());
            buf.extend_from_slice(&stimulus_code.to_le_bytes());
        }
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(payload);
        Ok(buf)
    }

    /// Encode a record value
    pub fn encode_record(&self, record: &Record) -> Result<Vec<u8>> {
        self.encode(record.captured_at, record.stimulus_code, &record.payload)
    }

    /// Decode exactly one record, treating end-of-stream as truncation
    pub fn decode<R: Read>(&self, reader: &mut R) -> Result<Record> {
        match self.decode_next(reader)? {
            Some(record) => Ok(record),
            None => Err(StimCapError::TruncatedRecord {
                field: self.first_field(),
                expected: self.first_field_len(),
                available: 0,
            }),
        }
    }

    /// Decode the next record, returning `None` on a clean record boundary EOF
    ///
    /// Any other shortfall, including a payload shorter than its declared
    /// length, fails with [`StimCapError::TruncatedRecord`].
    pub fn decode_next<R: Read>(&self, reader: &mut R) -> Result<Option<Record>> {
        let (captured_at, stimulus_code) = match self.format {
            RecordFormat::Tagged => {
                let mut ts = [0u8; 8];
                if read_field(reader, &mut ts, "timestamp", true)? == 0 {
                    return Ok(None);
                }
                let mut code = [0u8; 4];
                read_field(reader, &mut code, "stimulus_code", false)?;
                (
                    Timestamp::from_raw(i64::from_le_bytes(ts)),
                    i32::from_le_bytes(code),
                )
            }
            RecordFormat::Legacy => (Timestamp::ZERO, NO_STIMULUS),
        };

        let mut len = [0u8; 4];
        let allow_eof = self.format == RecordFormat::Legacy;
        if read_field(reader, &mut len, "payload_length", allow_eof)? == 0 {
            return Ok(None);
        }
        let len = i32::from_le_bytes(len);
        let len = usize::try_from(len)
            .map_err(|_| StimCapError::CorruptRecord(format!("negative payload length {}", len)))?;

        let mut payload = Vec::new();
        reader.by_ref().take(len as u64).read_to_end(&mut payload)?;
        if payload.len() < len {
            return Err(StimCapError::TruncatedRecord {
                field: "payload",
                expected: len,
                available: payload.len(),
            });
        }

        Ok(Some(Record {
            captured_at,
            stimulus_code,
            payload,
        }))
    }

    fn first_field(&self) -> &'static str {
        match self.format {
            RecordFormat::Tagged => "timestamp",
            RecordFormat::Legacy => "payload_length",
        }
    }

    fn first_field_len(&self) -> usize {
        match self.format {
            RecordFormat::Tagged => 8,
            RecordFormat::Legacy => 4,
        }
    }
}

/// Write the optional format header
pub fn write_file_header<W: Write>(writer: &mut W, format: RecordFormat) -> Result<()> {
    writer.write_all(&HEADER_MAGIC)?;
    writer.write_all(&[format.header_byte()])?;
    Ok(())
}

/// Parse a header candidate; `Ok(None)` when the bytes do not start with the magic
pub fn parse_file_header(bytes: &[u8]) -> Result<Option<RecordFormat>> {
    if bytes.len() < FILE_HEADER_LEN || bytes[..HEADER_MAGIC.len()] != HEADER_MAGIC {
        return Ok(None);
    }
    let byte = bytes[HEADER_MAGIC.len()];
    RecordFormat::from_header_byte(byte)
        .map(Some)
        .ok_or_else(|| StimCapError::InvalidHeader(format!("unknown format byte {}", byte)))
}

/// Fill `buf` completely, returning the bytes read
///
/// Zero bytes at EOF is only acceptable when `allow_eof` is set; any partial
/// fill is a truncated field.
fn read_field<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    field: &'static str,
    allow_eof: bool,
) -> Result<usize> {
    let filled = read_up_to(reader, buf)?;
    if filled == buf.len() || (filled == 0 && allow_eof) {
        return Ok(filled);
    }
    Err(StimCapError::TruncatedRecord {
        field,
        expected: buf.len(),
        available: filled,
    })
}

/// Read until `buf` is full or the stream ends
pub(crate) fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const EXAMPLE: [u8; 19] = [
        0xE8, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // timestamp 1000
        0x07, 0x00, 0x00, 0x00, // stimulus 7
        0x03, 0x00, 0x00, 0x00, // length 3
        0x01, 0x02, 0x03,
    ];

    #[test]
    fn test_encode_matches_reference_bytes() {
        let bytes = FrameCodec::tagged()
            .encode(Timestamp::from_raw(1000), 7, &[0x01, 0x02, 0x03])
            .unwrap();
        assert_eq!(bytes, EXAMPLE);
    }

    #[test]
    fn test_decode_reference_bytes() {
        let mut cursor = Cursor::new(EXAMPLE.to_vec());
        let record = FrameCodec::tagged().decode(&mut cursor).unwrap();
        assert_eq!(record.captured_at, Timestamp::from_raw(1000));
        assert_eq!(record.stimulus_code, 7);
        assert_eq!(record.payload, vec![0x01, 0x02, 0x03]);
        assert_eq!(cursor.position(), 19);
    }

    #[test]
    fn test_encoded_len() {
        let codec = FrameCodec::tagged();
        let bytes = codec.encode(Timestamp::now(), 0, &[0u8; 42]).unwrap();
        assert_eq!(bytes.len(), 8 + 4 + 4 + 42);
        assert_eq!(codec.encoded_len(42), bytes.len());
    }

    #[test]
    fn test_negative_values_roundtrip() {
        let codec = FrameCodec::tagged();
        let bytes = codec.encode(Timestamp::from_raw(-1), i32::MIN, &[]).unwrap();
        let record = codec.decode(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(record.captured_at.raw(), -1);
        assert_eq!(record.stimulus_code, i32::MIN);
        assert!(record.payload.is_empty());
    }

    #[test]
    fn test_short_payload_is_truncated() {
        let mut cursor = Cursor::new(EXAMPLE[..18].to_vec());
        let err = FrameCodec::tagged().decode(&mut cursor).unwrap_err();
        match err {
            StimCapError::TruncatedRecord {
                field,
                expected,
                available,
            } => {
                assert_eq!(field, "payload");
                assert_eq!(expected, 3);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_partial_header_is_truncated() {
        for cut in [1, 7, 8, 11, 12, 15] {
            let mut cursor = Cursor::new(EXAMPLE[..cut].to_vec());
            let err = FrameCodec::tagged().decode_next(&mut cursor).unwrap_err();
            assert!(err.is_truncated(), "cut at {cut} should be truncated");
        }
    }

    #[test]
    fn test_clean_eof() {
        let codec = FrameCodec::tagged();
        assert!(codec.decode_next(&mut Cursor::new(Vec::new())).unwrap().is_none());
        assert!(codec.decode(&mut Cursor::new(Vec::new())).unwrap_err().is_truncated());
    }

    #[test]
    fn test_negative_length_is_corrupt() {
        let mut bytes = EXAMPLE.to_vec();
        bytes[12..16].copy_from_slice(&(-3i32).to_le_bytes());
        let err = FrameCodec::tagged()
            .decode(&mut Cursor::new(bytes))
            .unwrap_err();
        assert!(matches!(err, StimCapError::CorruptRecord(_)));
    }

    #[test]
    fn test_legacy_layout() {
        let codec = FrameCodec::new(RecordFormat::Legacy);
        let bytes = codec.encode(Timestamp::from_raw(1000), 7, &[9, 9]).unwrap();
        assert_eq!(bytes, vec![0x02, 0x00, 0x00, 0x00, 9, 9]);

        let mut cursor = Cursor::new(bytes);
        let record = codec.decode_next(&mut cursor).unwrap().unwrap();
        assert_eq!(record.captured_at, Timestamp::ZERO);
        assert_eq!(record.stimulus_code, NO_STIMULUS);
        assert_eq!(record.payload, vec![9, 9]);
        assert!(codec.decode_next(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_file_header() {
        let mut buf = Vec::new();
        write_file_header(&mut buf, RecordFormat::Legacy).unwrap();
        assert_eq!(buf.len(), FILE_HEADER_LEN);
        assert_eq!(parse_file_header(&buf).unwrap(), Some(RecordFormat::Legacy));
        assert_eq!(parse_file_header(&EXAMPLE[..5]).unwrap(), None);
        assert!(parse_file_header(b"SCAP\x09").is_err());
    }

    /// Reader that hands out one byte per call
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let end = buf.len().min(1);
            self.0.read(&mut buf[..end])
        }
    }

    #[test]
    fn test_decode_from_short_reads() {
        let mut reader = Trickle(Cursor::new(EXAMPLE.to_vec()));
        let record = FrameCodec::tagged().decode(&mut reader).unwrap();
        assert_eq!(record.payload, vec![1, 2, 3]);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_roundtrip(
            raw in any::<i64>(),
            code in any::<i32>(),
            payload in prop::collection::vec(any::<u8>(), 0..512)
        ) {
            let codec = FrameCodec::tagged();
            let bytes = codec.encode(Timestamp::from_raw(raw), code, &payload).unwrap();
            prop_assert_eq!(bytes.len(), 16 + payload.len());

            let mut cursor = Cursor::new(bytes);
            let record = codec.decode(&mut cursor).unwrap();
            prop_assert_eq!(record.captured_at.raw(), raw);
            prop_assert_eq!(record.stimulus_code, code);
            prop_assert_eq!(record.payload, payload);
            prop_assert!(codec.decode_next(&mut cursor).unwrap().is_none());
        }
    }
}
