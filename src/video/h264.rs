//! H.264 Annex-B access unit grouping
//!
//! Both capture sources cut the elementary stream into access units the
//! same way: an SPS or a non-IDR slice opens a new unit, every other NAL
//! (PPS, IDR slice, ...) joins the unit being built.

use bytes::{BufMut, Bytes, BytesMut};
use std::io::Read;
use tracing::{debug, warn};
use webrtc::media::io::h264_reader::{H264Reader, NalUnitType};
use webrtc::media::Error as MediaError;

/// Annex-B 4-byte start code, used when re-emitting parsed NAL units
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];
const SHORT_START_CODE: [u8; 3] = [0, 0, 1];

/// H264Reader buffer size
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Type of the NAL unit a chunk starts with
///
/// Accepts both the 3-byte and the 4-byte start code. Chunks that do not
/// start with a start code (continuation datagrams) give `None`.
pub fn nal_type(chunk: &[u8]) -> Option<NalUnitType> {
    let header = if chunk.starts_with(&START_CODE) {
        chunk.get(START_CODE.len())
    } else if chunk.starts_with(&SHORT_START_CODE) {
        chunk.get(SHORT_START_CODE.len())
    } else {
        None
    }?;

    Some(NalUnitType::from(header & 0x1f))
}

/// Whether a NAL of this type closes the previous access unit
pub fn opens_access_unit(kind: NalUnitType) -> bool {
    matches!(kind, NalUnitType::SPS | NalUnitType::CodedSliceNonIdr)
}

/// Incremental access unit builder for datagram input
#[derive(Debug, Default)]
pub struct AccessUnitAssembler {
    pending: BytesMut,
}

impl AccessUnitAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the unit it completed, if any
    pub fn push(&mut self, chunk: &[u8]) -> Option<Bytes> {
        let opens = nal_type(chunk).is_some_and(opens_access_unit);
        let completed = (opens && !self.pending.is_empty()).then(|| self.pending.split().freeze());
        self.pending.extend_from_slice(chunk);
        completed
    }

    /// Take whatever is buffered
    pub fn flush(&mut self) -> Option<Bytes> {
        (!self.pending.is_empty()).then(|| self.pending.split().freeze())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Split a whole Annex-B stream into access units
///
/// NAL units are parsed with webrtc's `H264Reader`, so 3- and 4-byte start
/// codes are both accepted. Each unit is re-emitted with 4-byte start codes.
/// SEI, AUD and filler NALs are dropped.
///
/// # Arguments
///
/// * `reader` - Annex-B byte stream, which must begin with a start code
///
/// # Example
///
/// ```rust
/// use drone_teleop::video::h264::read_access_units;
/// use std::io::Cursor;
///
/// let stream = [0, 0, 0, 1, 0x67, 0xaa, 0, 0, 1, 0x65, 0xbb, 0, 0, 1, 0x41, 0xcc];
/// let units = read_access_units(Cursor::new(stream));
///
/// assert_eq!(units.len(), 2);
/// assert_eq!(units[1].as_ref(), &[0, 0, 0, 1, 0x41, 0xcc]);
/// ```
pub fn read_access_units<R: Read>(reader: R) -> Vec<Bytes> {
    let mut h264_reader = H264Reader::new(reader, READ_BUFFER_SIZE);
    let mut units = Vec::new();
    let mut current = BytesMut::new();

    loop {
        let nal = match h264_reader.next_nal() {
            Ok(nal) => nal,
            Err(MediaError::ErrIoEOF) => break,
            Err(e) => {
                warn!("Stopped reading H.264 stream: {}", e);
                break;
            }
        };

        if nal.data.is_empty()
            || matches!(nal.unit_type, NalUnitType::AUD | NalUnitType::Filler)
        {
            continue;
        }

        if opens_access_unit(nal.unit_type) && !current.is_empty() {
            units.push(current.split().freeze());
        }

        current.put_slice(&START_CODE);
        current.put_slice(&nal.data);
    }

    if !current.is_empty() {
        units.push(current.freeze());
    }

    debug!("Parsed {} H.264 access units", units.len());
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn nal(kind: u8, payload: &[u8]) -> Vec<u8> {
        let mut v = START_CODE.to_vec();
        v.push(kind);
        v.extend_from_slice(payload);
        v
    }

    fn short_nal(kind: u8, payload: &[u8]) -> Vec<u8> {
        let mut v = SHORT_START_CODE.to_vec();
        v.push(kind);
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn test_nal_type() {
        assert_eq!(nal_type(&nal(0x67, &[1])), Some(NalUnitType::SPS));
        assert_eq!(nal_type(&nal(0x65, &[])), Some(NalUnitType::CodedSliceIdr));
        assert_eq!(nal_type(&short_nal(0x41, &[])), Some(NalUnitType::CodedSliceNonIdr));
        assert_eq!(nal_type(&START_CODE), None);
        assert_eq!(nal_type(&[9, 9, 9]), None);
    }

    #[test]
    fn test_assembler_groups_parameter_sets_with_idr() {
        let mut asm = AccessUnitAssembler::new();

        assert!(asm.push(&nal(0x67, &[1, 2])).is_none());
        assert!(asm.push(&nal(0x68, &[3])).is_none());
        assert!(asm.push(&nal(0x65, &[4])).is_none());
        // Continuation datagram without a start code
        assert!(asm.push(&[9, 9, 9]).is_none());

        let unit = asm.push(&nal(0x41, &[5])).unwrap();
        let mut expected = nal(0x67, &[1, 2]);
        expected.extend(nal(0x68, &[3]));
        expected.extend(nal(0x65, &[4]));
        expected.extend([9, 9, 9]);
        assert_eq!(unit.as_ref(), expected.as_slice());

        assert_eq!(asm.flush().unwrap().as_ref(), nal(0x41, &[5]).as_slice());
        assert!(asm.flush().is_none());
    }

    #[test]
    fn test_assembler_short_start_code_opens_unit() {
        let mut asm = AccessUnitAssembler::new();

        asm.push(&nal(0x41, &[1]));
        let unit = asm.push(&short_nal(0x41, &[2])).unwrap();

        assert_eq!(unit.as_ref(), nal(0x41, &[1]).as_slice());
        assert_eq!(asm.pending_len(), 5);
    }

    #[test]
    fn test_leading_boundary_emits_nothing() {
        let mut asm = AccessUnitAssembler::new();
        assert!(asm.push(&nal(0x41, &[1])).is_none());
        assert_eq!(asm.pending_len(), 6);
    }

    #[test]
    fn test_mixed_start_codes() {
        let mut stream = nal(0x67, &[0xaa, 0xbb]);
        stream.extend(short_nal(0x68, &[0xcc]));
        stream.extend(short_nal(0x65, &[0xdd, 0xdd]));
        stream.extend(nal(0x41, &[0xe1]));
        stream.extend(short_nal(0x41, &[0xe2]));
        stream.extend(short_nal(0x41, &[0xe3]));

        let units = read_access_units(Cursor::new(stream));

        assert_eq!(units.len(), 4);
        let mut first = nal(0x67, &[0xaa, 0xbb]);
        first.extend(nal(0x68, &[0xcc]));
        first.extend(nal(0x65, &[0xdd, 0xdd]));
        assert_eq!(units[0].as_ref(), first.as_slice());
        assert_eq!(units[1].as_ref(), nal(0x41, &[0xe1]).as_slice());
        assert_eq!(units[2].as_ref(), nal(0x41, &[0xe2]).as_slice());
        assert_eq!(units[3].as_ref(), nal(0x41, &[0xe3]).as_slice());
    }

    #[test]
    fn test_delimiters_dropped() {
        let mut stream = nal(0x09, &[0xf0]);
        stream.extend(nal(0x41, &[0xe1]));
        stream.extend(nal(0x09, &[0xf0]));
        stream.extend(nal(0x41, &[0xe2]));

        let units = read_access_units(Cursor::new(stream));

        assert_eq!(units.len(), 2);
        assert_eq!(units[1].as_ref(), nal(0x41, &[0xe2]).as_slice());
    }

    #[test]
    fn test_not_annex_b() {
        assert!(read_access_units(Cursor::new(Vec::new())).is_empty());
        assert!(read_access_units(Cursor::new(vec![1, 2, 3, 4, 5])).is_empty());
    }
}
