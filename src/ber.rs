//! BER (Basic Encoding Rules) primitives for the SNMP subset this agent uses.
//!
//! Decoding operates on `(buffer, position)` pairs and always checks
//! `position + length <= buffer.len()` before reading; encoding checks
//! destination room before writing. Nothing here interprets OIDs — that
//! lives in [`crate::oid`].

use crate::error::{AgentError, Result};
use crate::oid::Oid;

pub const TYPE_BOOLEAN: u8 = 0x01;
pub const TYPE_INTEGER: u8 = 0x02;
pub const TYPE_OCTET_STRING: u8 = 0x04;
pub const TYPE_NULL: u8 = 0x05;
pub const TYPE_OID: u8 = 0x06;
pub const TYPE_SEQUENCE: u8 = 0x30;
pub const TYPE_IP_ADDRESS: u8 = 0x40;
pub const TYPE_COUNTER: u8 = 0x41;
pub const TYPE_GAUGE: u8 = 0x42;
pub const TYPE_TIME_TICKS: u8 = 0x43;

pub const TYPE_NO_SUCH_OBJECT: u8 = 0x80;
pub const TYPE_NO_SUCH_INSTANCE: u8 = 0x81;
pub const TYPE_END_OF_MIB_VIEW: u8 = 0x82;

pub const PDU_GET: u8 = 0xA0;
pub const PDU_GET_NEXT: u8 = 0xA1;
pub const PDU_RESPONSE: u8 = 0xA2;
pub const PDU_SET: u8 = 0xA3;
pub const PDU_GET_BULK: u8 = 0xA5;
pub const PDU_INFORM: u8 = 0xA6;
pub const PDU_TRAP: u8 = 0xA7;
pub const PDU_REPORT: u8 = 0xA8;

/// The four prebuilt exception/constant byte sequences: NULL and the
/// three SNMPv2 exception values (noSuchObject/noSuchInstance/endOfMibView).
pub const NULL_BYTES: [u8; 2] = [TYPE_NULL, 0x00];
pub const NO_SUCH_OBJECT_BYTES: [u8; 2] = [TYPE_NO_SUCH_OBJECT, 0x00];
pub const NO_SUCH_INSTANCE_BYTES: [u8; 2] = [TYPE_NO_SUCH_INSTANCE, 0x00];
pub const END_OF_MIB_VIEW_BYTES: [u8; 2] = [TYPE_END_OF_MIB_VIEW, 0x00];

fn check_room(size: usize, pos: usize, len: usize) -> Result<()> {
    if pos.checked_add(len).map(|end| end <= size).unwrap_or(false) {
        Ok(())
    } else {
        Err(AgentError::MalformedPacket("read past end of buffer"))
    }
}

/// Decodes a tag byte followed by a length field (short or long form, up
/// to 2 length-of-length bytes, i.e. lengths up to 65535). Returns
/// `(type, length, content_start_position)`.
pub fn decode_tag_len(buf: &[u8], pos: usize) -> Result<(u8, usize, usize)> {
    check_room(buf.len(), pos, 1)?;
    let ty = buf[pos];
    let mut p = pos + 1;

    check_room(buf.len(), p, 1)?;
    let first = buf[p];
    p += 1;

    let len = if first & 0x80 == 0 {
        first as usize
    } else {
        let n = (first & 0x7f) as usize;
        if n == 0 || n > 2 {
            return Err(AgentError::MalformedPacket("unsupported length-of-length"));
        }
        check_room(buf.len(), p, n)?;
        let mut len = 0usize;
        for i in 0..n {
            len = (len << 8) | buf[p + i] as usize;
        }
        p += n;
        len
    };

    check_room(buf.len(), p, len)?;
    Ok((ty, len, p))
}

/// Decodes a BER INTEGER content of `len` bytes at `pos`, sign-extending
/// from the MSB of the first content byte.
pub fn decode_integer(buf: &[u8], pos: usize, len: usize) -> Result<i32> {
    check_room(buf.len(), pos, len)?;
    if len == 0 || len > 4 {
        return Err(AgentError::MalformedPacket("invalid integer length"));
    }

    let mut value: i32 = if buf[pos] & 0x80 != 0 { -1 } else { 0 };
    for i in 0..len {
        value = (value << 8) | buf[pos + i] as i32;
    }
    Ok(value)
}

/// Decodes an unsigned counter/gauge/timeticks content of `len` bytes.
pub fn decode_unsigned(buf: &[u8], pos: usize, len: usize) -> Result<u32> {
    check_room(buf.len(), pos, len)?;
    if len == 0 || len > 5 {
        return Err(AgentError::MalformedPacket("invalid unsigned length"));
    }

    let mut value: u32 = 0;
    for i in 0..len {
        value = (value << 8) | buf[pos + i] as u32;
    }
    Ok(value)
}

/// Decodes an OCTET STRING content as raw bytes.
pub fn decode_octet_string(buf: &[u8], pos: usize, len: usize) -> Result<Vec<u8>> {
    check_room(buf.len(), pos, len)?;
    Ok(buf[pos..pos + len].to_vec())
}

/// Decodes an OID content. Rejects a first byte whose high bit is set
/// (a three-subid-prefix form this codec does not support).
pub fn decode_oid(buf: &[u8], pos: usize, len: usize) -> Result<Oid> {
    check_room(buf.len(), pos, len)?;
    if len == 0 {
        return Err(AgentError::MalformedPacket("empty OID"));
    }
    if buf[pos] & 0x80 != 0 {
        return Err(AgentError::MalformedPacket(
            "OID first byte has high bit set",
        ));
    }

    let mut subids = vec![(buf[pos] / 40) as u32, (buf[pos] % 40) as u32];

    let mut i = pos + 1;
    let end = pos + len;
    while i < end {
        let mut v: u32 = 0;
        loop {
            if i >= end {
                return Err(AgentError::MalformedPacket("truncated OID subid"));
            }
            let b = buf[i];
            i += 1;
            v = (v << 7) | (b & 0x7f) as u32;
            if b & 0x80 == 0 {
                break;
            }
        }
        subids.push(v);
    }

    Oid::new(subids)
}

/// Encodes a SEQUENCE/tagged header (tag + length) into `dst[pos..]`,
/// returning the new position. Fails with `EncodingOverflow` if there is
/// no room.
pub fn encode_tag_len(dst: &mut [u8], pos: usize, ty: u8, len: usize) -> Result<usize> {
    let header_len = length_of_length(len) + 1;
    if pos + header_len > dst.len() {
        return Err(AgentError::EncodingOverflow("no room for tag/length"));
    }

    let mut p = pos;
    dst[p] = ty;
    p += 1;

    if len < 128 {
        dst[p] = len as u8;
        p += 1;
    } else {
        let nbytes = if len <= 0xff { 1 } else { 2 };
        dst[p] = 0x80 | nbytes as u8;
        p += 1;
        for i in (0..nbytes).rev() {
            dst[p] = ((len >> (8 * i)) & 0xff) as u8;
            p += 1;
        }
    }

    Ok(p)
}

/// Number of length bytes (not counting the length-of-length byte itself
/// when long form is used) required to encode `len`.
pub fn length_of_length(len: usize) -> usize {
    if len < 128 {
        1
    } else if len <= 0xff {
        2
    } else {
        3
    }
}

/// Minimal byte count needed to represent `val` with correct sign.
pub fn integer_byte_len(val: i32) -> usize {
    if val >= -0x80 && val <= 0x7f {
        1
    } else if val >= -0x8000 && val <= 0x7fff {
        2
    } else if val >= -0x0080_0000 && val <= 0x007f_ffff {
        3
    } else {
        4
    }
}

/// Minimal byte count needed to represent an unsigned 32-bit value.
pub fn unsigned_byte_len(val: u32) -> usize {
    if val <= 0x7f {
        1
    } else if val <= 0x7fff {
        2
    } else if val <= 0x007f_ffff {
        3
    } else if val <= 0x7fff_ffff {
        4
    } else {
        5 // top bit set: needs a leading 0x00 to stay non-negative per BER
    }
}

/// Encodes a full INTEGER TLV (tag 0x02) using the minimal byte count.
pub fn encode_integer(dst: &mut [u8], pos: usize, val: i32) -> Result<usize> {
    let len = integer_byte_len(val);
    let mut p = encode_tag_len(dst, pos, TYPE_INTEGER, len)?;
    if p + len > dst.len() {
        return Err(AgentError::EncodingOverflow("no room for integer content"));
    }
    for i in (0..len).rev() {
        dst[p] = ((val >> (8 * i)) & 0xff) as u8;
        p += 1;
    }
    Ok(p)
}

/// Encodes a full unsigned TLV with the given tag (COUNTER/GAUGE/TIMETICKS
/// all share this content encoding, differing only by tag).
pub fn encode_unsigned(dst: &mut [u8], pos: usize, ty: u8, val: u32) -> Result<usize> {
    let len = unsigned_byte_len(val);
    let mut p = encode_tag_len(dst, pos, ty, len)?;
    if p + len > dst.len() {
        return Err(AgentError::EncodingOverflow("no room for unsigned content"));
    }
    if len == 5 {
        // leading 0x00 keeps the BER INTEGER representation non-negative
        dst[p] = 0x00;
        p += 1;
        for i in (0..4).rev() {
            dst[p] = ((val >> (8 * i)) & 0xff) as u8;
            p += 1;
        }
    } else {
        for i in (0..len).rev() {
            dst[p] = ((val >> (8 * i)) & 0xff) as u8;
            p += 1;
        }
    }
    Ok(p)
}

/// Encodes a full OCTET STRING TLV (tag 0x04).
pub fn encode_octet_string(dst: &mut [u8], pos: usize, s: &[u8]) -> Result<usize> {
    let mut p = encode_tag_len(dst, pos, TYPE_OCTET_STRING, s.len())?;
    if p + s.len() > dst.len() {
        return Err(AgentError::EncodingOverflow("no room for string content"));
    }
    dst[p..p + s.len()].copy_from_slice(s);
    p += s.len();
    Ok(p)
}

/// Encodes a full NULL TLV (tag 0x05, zero-length content).
pub fn encode_null(dst: &mut [u8], pos: usize) -> Result<usize> {
    encode_tag_len(dst, pos, TYPE_NULL, 0)
}

fn oid_content_len(oid: &Oid) -> usize {
    let subids = oid.subids();
    let mut len = 1;
    let mut i = 2;
    while i < subids.len() {
        len += base128_len(subids[i]);
        i += 1;
    }
    len
}

fn base128_len(mut v: u32) -> usize {
    let mut n = 1;
    v >>= 7;
    while v > 0 {
        n += 1;
        v >>= 7;
    }
    n
}

/// Encodes a full OBJECT IDENTIFIER TLV (tag 0x06).
pub fn encode_oid(dst: &mut [u8], pos: usize, oid: &Oid) -> Result<usize> {
    let subids = oid.subids();
    let content_len = oid_content_len(oid);
    let mut p = encode_tag_len(dst, pos, TYPE_OID, content_len)?;
    if p + content_len > dst.len() {
        return Err(AgentError::EncodingOverflow("no room for OID content"));
    }

    dst[p] = (subids[0] * 40 + subids[1]) as u8;
    p += 1;

    for &sub in &subids[2..] {
        let n = base128_len(sub);
        for i in (0..n).rev() {
            let mut byte = ((sub >> (7 * i)) & 0x7f) as u8;
            if i != 0 {
                byte |= 0x80;
            }
            dst[p] = byte;
            p += 1;
        }
    }

    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_minimal_length() {
        assert_eq!(integer_byte_len(0), 1);
        assert_eq!(integer_byte_len(127), 1);
        assert_eq!(integer_byte_len(128), 2);
        assert_eq!(integer_byte_len(-1), 1);
        assert_eq!(integer_byte_len(-129), 2);
        assert_eq!(integer_byte_len(70000), 3);
        assert_eq!(integer_byte_len(i32::MAX), 4);
    }

    #[test]
    fn integer_round_trip() {
        let mut buf = [0u8; 16];
        for val in [0, 1, -1, 127, 128, -128, -129, 1000000, i32::MIN, i32::MAX] {
            let end = encode_integer(&mut buf, 0, val).unwrap();
            let (ty, len, content_pos) = decode_tag_len(&buf, 0).unwrap();
            assert_eq!(ty, TYPE_INTEGER);
            assert_eq!(content_pos + len, end);
            let decoded = decode_integer(&buf, content_pos, len).unwrap();
            assert_eq!(decoded, val);
        }
    }

    #[test]
    fn unsigned_round_trip() {
        let mut buf = [0u8; 16];
        for val in [0u32, 1, 127, 128, 65535, 0x7fffffff, 0x80000000, u32::MAX] {
            let end = encode_unsigned(&mut buf, 0, TYPE_COUNTER, val).unwrap();
            let (ty, len, content_pos) = decode_tag_len(&buf, 0).unwrap();
            assert_eq!(ty, TYPE_COUNTER);
            assert_eq!(content_pos + len, end);
            let decoded = decode_unsigned(&buf, content_pos, len).unwrap();
            assert_eq!(decoded, val);
        }
    }

    #[test]
    fn oid_round_trip() {
        let mut buf = [0u8; 32];
        let oid = Oid::from_ascii(".1.3.6.1.2.1.1.1.0").unwrap();
        let end = encode_oid(&mut buf, 0, &oid).unwrap();
        let (ty, len, content_pos) = decode_tag_len(&buf, 0).unwrap();
        assert_eq!(ty, TYPE_OID);
        assert_eq!(content_pos + len, end);
        let decoded = decode_oid(&buf, content_pos, len).unwrap();
        assert_eq!(decoded, oid);
    }

    #[test]
    fn oid_round_trip_large_subid() {
        let mut buf = [0u8; 32];
        let oid = Oid::from_ascii(".1.3.6.1.4.1.2021.11.60").unwrap();
        let end = encode_oid(&mut buf, 0, &oid).unwrap();
        let (_, len, content_pos) = decode_tag_len(&buf, 0).unwrap();
        let decoded = decode_oid(&buf, content_pos, len).unwrap();
        assert_eq!(decoded, oid);
        assert_eq!(content_pos + len, end);
    }

    #[test]
    fn rejects_oid_high_bit_first_byte() {
        let buf = [TYPE_OID, 0x01, 0x80];
        let (_, len, pos) = decode_tag_len(&buf, 0).unwrap();
        assert!(decode_oid(&buf, pos, len).is_err());
    }

    #[test]
    fn length_forms() {
        for len in [0usize, 127, 128, 255, 256, 65535] {
            let mut buf = vec![0u8; len + 5];
            let content_pos = encode_tag_len(&mut buf, 0, TYPE_OCTET_STRING, len).unwrap();
            let (ty, decoded_len, decoded_pos) = decode_tag_len(&buf, 0).unwrap();
            assert_eq!(ty, TYPE_OCTET_STRING);
            assert_eq!(decoded_len, len);
            assert_eq!(decoded_pos, content_pos);
        }
    }

    #[test]
    fn rejects_length_of_length_over_two() {
        let buf = [TYPE_INTEGER, 0x83, 0x01, 0x00, 0x00];
        assert!(decode_tag_len(&buf, 0).is_err());
    }

    #[test]
    fn malformed_on_truncated_buffer() {
        let buf = [TYPE_INTEGER, 0x04, 0x00]; // claims 4 bytes, only 1 present
        let (_, len, pos) = decode_tag_len(&buf, 0).unwrap();
        assert!(decode_integer(&buf, pos, len).is_err());
    }

    #[test]
    fn encode_overflow_reported() {
        let mut tiny = [0u8; 1];
        assert!(encode_integer(&mut tiny, 0, 1000).is_err());
    }
}
