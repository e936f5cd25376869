// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

// NAL Unit Framing
//
// Conversion between the two NAL unit framings this crate deals with:
// - AVCC (4-byte big-endian length prefix) - what the hardware encoder emits
// - Annex B (00 00 00 01 start code) - what the publishing layer consumes

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::EncodeError;

/// Annex-B start code prepended to every emitted NAL unit and parameter set.
pub const ANNEX_B_START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

const LENGTH_PREFIX_SIZE: usize = 4;

// ============================================================================
// AVCC READER
// ============================================================================

/// Iterator over the records of a length-prefixed NAL unit container.
///
/// Yields each payload as a borrowed slice. The first truncated record
/// yields one `MalformedBitstream` error, after which the iterator is fused.
pub struct AvccReader<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> AvccReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for AvccReader<'a> {
    type Item = Result<&'a [u8], EncodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }

        let remaining = self.data.len() - self.offset;
        if remaining < LENGTH_PREFIX_SIZE {
            self.failed = true;
            return Some(Err(EncodeError::MalformedBitstream {
                offset: self.offset,
                declared: LENGTH_PREFIX_SIZE,
                remaining,
            }));
        }

        let prefix = &self.data[self.offset..self.offset + LENGTH_PREFIX_SIZE];
        let nal_length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        let payload_start = self.offset + LENGTH_PREFIX_SIZE;
        let available = self.data.len() - payload_start;

        if nal_length > available {
            self.failed = true;
            return Some(Err(EncodeError::MalformedBitstream {
                offset: self.offset,
                declared: nal_length,
                remaining: available,
            }));
        }

        let payload = &self.data[payload_start..payload_start + nal_length];
        self.offset = payload_start + nal_length;
        Some(Ok(payload))
    }
}

/// Split a length-prefixed sample into raw NAL units.
///
/// A truncated tail stops the walk and the units parsed so far are returned;
/// the truncation is logged, never raised.
pub fn extract_nal_units(data: &[u8]) -> Vec<Bytes> {
    let mut nal_units = Vec::new();

    for record in AvccReader::new(data) {
        match record {
            Ok(payload) => nal_units.push(Bytes::copy_from_slice(payload)),
            Err(e) => {
                tracing::warn!(
                    "[Bitstream] {} (kept {} NAL units, sample {} bytes)",
                    e,
                    nal_units.len(),
                    data.len()
                );
                break;
            }
        }
    }

    tracing::trace!(
        "[Bitstream] {} bytes AVCC -> {} NAL units",
        data.len(),
        nal_units.len()
    );

    nal_units
}

// ============================================================================
// ANNEX B
// ============================================================================

/// Prepend the 4-byte Annex-B start code to a raw unit.
pub fn annex_b_frame(unit: &[u8]) -> Bytes {
    let mut framed = BytesMut::with_capacity(ANNEX_B_START_CODE.len() + unit.len());
    framed.put_slice(&ANNEX_B_START_CODE);
    framed.put_slice(unit);
    framed.freeze()
}

/// Concatenate already-framed units into one Annex-B buffer.
pub fn concat_units(units: &[Bytes]) -> Bytes {
    let total = units.iter().map(Bytes::len).sum();
    let mut out = BytesMut::with_capacity(total);
    for unit in units {
        out.put_slice(unit);
    }
    out.freeze()
}

/// Parse NAL units from Annex B format (start-code-prefixed)
///
/// Annex B format: [00 00 00 01 or 00 00 01][NAL unit][start code][NAL unit]...
/// Leading bytes before the first start code are ignored.
pub fn split_annex_b(data: &[u8]) -> Vec<Bytes> {
    let mut nal_units = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let Some(start_code_len) = start_code_at(data, i) else {
            i += 1;
            continue;
        };

        // Find next start code (or end of data)
        let nal_start = i + start_code_len;
        let mut nal_end = nal_start;
        while nal_end < data.len() && start_code_at(data, nal_end).is_none() {
            nal_end += 1;
        }

        if nal_end > nal_start {
            nal_units.push(Bytes::copy_from_slice(&data[nal_start..nal_end]));
        }

        i = nal_end;
    }

    nal_units
}

fn start_code_at(data: &[u8], i: usize) -> Option<usize> {
    let rest = &data[i..];
    if rest.starts_with(&ANNEX_B_START_CODE) {
        Some(4)
    } else if rest.starts_with(&ANNEX_B_START_CODE[1..]) {
        Some(3)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avcc(units: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for unit in units {
            out.extend_from_slice(&(unit.len() as u32).to_be_bytes());
            out.extend_from_slice(unit);
        }
        out
    }

    #[test]
    fn test_two_records() {
        let data = [0x00, 0x00, 0x00, 0x02, 0xAA, 0xBB, 0x00, 0x00, 0x00, 0x01, 0xCC];
        let units = extract_nal_units(&data);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].as_ref(), &[0xAA, 0xBB]);
        assert_eq!(units[1].as_ref(), &[0xCC]);
    }

    #[test]
    fn test_declared_length_past_end() {
        let data = [0x00, 0x00, 0x00, 0x05, 0xAA, 0xBB];
        assert!(extract_nal_units(&data).is_empty());
    }

    #[test]
    fn test_empty_buffer() {
        assert!(extract_nal_units(&[]).is_empty());
    }

    #[test]
    fn test_truncated_tail_keeps_prefix() {
        let mut data = avcc(&[&[0x65, 0x01, 0x02], &[0x41, 0x03]]);
        // half a length prefix
        data.extend_from_slice(&[0x00, 0x00]);
        let units = extract_nal_units(&data);
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].as_ref(), &[0x41, 0x03]);
    }

    #[test]
    fn test_zero_length_record_kept() {
        let data = avcc(&[&[], &[0x41]]);
        let units = extract_nal_units(&data);
        assert_eq!(units.len(), 2);
        assert!(units[0].is_empty());
    }

    #[test]
    fn test_reparse_is_stable() {
        let data = avcc(&[&[0x67, 0x42], &[0x68, 0xce], &[0x65, 0x88, 0x84]]);
        assert_eq!(extract_nal_units(&data), extract_nal_units(&data));
    }

    #[test]
    fn test_reader_reports_offset() {
        let data = [0x00, 0x00, 0x00, 0x01, 0xAA, 0x00, 0x00, 0x00, 0x09, 0xBB];
        let mut reader = AvccReader::new(&data);
        assert_eq!(reader.next().unwrap().unwrap(), &[0xAA]);
        match reader.next() {
            Some(Err(EncodeError::MalformedBitstream {
                offset,
                declared,
                remaining,
            })) => {
                assert_eq!(offset, 5);
                assert_eq!(declared, 9);
                assert_eq!(remaining, 1);
            }
            other => panic!("expected malformed bitstream, got {:?}", other),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_annex_b_frame_and_split() {
        let framed = [annex_b_frame(&[0x67, 0x42]), annex_b_frame(&[0x65, 0x88])];
        assert!(framed[0].starts_with(&ANNEX_B_START_CODE));

        let stream = concat_units(&framed);
        let units = split_annex_b(&stream);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].as_ref(), &[0x67, 0x42]);
        assert_eq!(units[1].as_ref(), &[0x65, 0x88]);
    }

    #[test]
    fn test_split_three_byte_start_code() {
        let data = [0x00, 0x00, 0x01, 0x09, 0xF0, 0x00, 0x00, 0x00, 0x01, 0x41];
        let units = split_annex_b(&data);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].as_ref(), &[0x09, 0xF0]);
    }
}
