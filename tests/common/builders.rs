//! Test data builders for creating test objects

use stimcap_rs::session::{FrameCodec, RecordFormat};
use stimcap_rs::types::{Record, StimulusCode, Timestamp, NO_STIMULUS};

/// Builder for creating test Records
pub struct RecordBuilder {
    captured_at: Timestamp,
    stimulus_code: StimulusCode,
    payload: Vec<u8>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self {
            captured_at: Timestamp::from_raw(1),
            stimulus_code: NO_STIMULUS,
            payload: Vec::new(),
        }
    }

    pub fn timestamp(mut self, raw: i64) -> Self {
        self.captured_at = Timestamp::from_raw(raw);
        self
    }

    pub fn stimulus(mut self, code: StimulusCode) -> Self {
        self.stimulus_code = code;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Record {
        Record::new(self.captured_at, self.stimulus_code, self.payload)
    }
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `count` records with increasing timestamps and distinct payloads
pub fn record_series(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            RecordBuilder::new()
                .timestamp(1_000 + i as i64)
                .payload(&vec![i as u8; i % 7])
                .build()
        })
        .collect()
}

/// Encode records back to back in the given layout
pub fn encode_records(format: RecordFormat, records: &[Record]) -> Vec<u8> {
    let codec = FrameCodec::new(format);
    let mut bytes = Vec::new();
    for record in records {
        bytes.extend(codec.encode_record(record).unwrap());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = RecordBuilder::new()
            .timestamp(42)
            .stimulus(7)
            .payload(b"abc")
            .build();

        assert_eq!(record.captured_at.raw(), 42);
        assert_eq!(record.stimulus_code, 7);
        assert_eq!(record.payload, b"abc");
    }
}
