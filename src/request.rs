//! Request decoder: parses a raw packet into a [`Request`] record,
//! enforcing the BER grammar and the bounded-buffer constraints before any
//! handler ever sees the bytes.

use crate::ber;
use crate::error::{AgentError, Result};
use crate::oid::Oid;

/// Upper bound on the number of varbinds accepted in one request.
pub const MAX_OIDS: usize = 20;
/// Upper bound on the community string length.
pub const MAX_COMMUNITY_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V1,
    V2c,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduKind {
    Get,
    GetNext,
    GetBulk,
    Set,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub version: Version,
    pub community: String,
    pub kind: PduKind,
    pub request_id: i32,
    /// `non_repeaters` for GETBULK, `error_status` slot for everything
    /// else (always 0 on the way in; unused by non-bulk handlers).
    pub non_repeaters: u32,
    /// `max_repetitions` for GETBULK, `error_index` slot otherwise.
    pub max_repetitions: u32,
    pub oids: Vec<Oid>,
}

fn pdu_kind(tag: u8) -> Result<PduKind> {
    match tag {
        ber::PDU_GET => Ok(PduKind::Get),
        ber::PDU_GET_NEXT => Ok(PduKind::GetNext),
        ber::PDU_GET_BULK => Ok(PduKind::GetBulk),
        ber::PDU_SET => Ok(PduKind::Set),
        _ => Err(AgentError::UnsupportedPdu),
    }
}

/// Decodes one complete SNMP message. `buf` must contain exactly one
/// message (the reactor's framing already established this for TCP; for
/// UDP a datagram is always exactly one message).
pub fn decode_request(buf: &[u8]) -> Result<Request> {
    let (outer_ty, outer_len, outer_pos) = ber::decode_tag_len(buf, 0)?;
    if outer_ty != ber::TYPE_SEQUENCE {
        return Err(AgentError::MalformedPacket("expected outer SEQUENCE"));
    }
    if outer_pos + outer_len != buf.len() {
        return Err(AgentError::MalformedPacket(
            "outer sequence length does not match buffer",
        ));
    }

    let mut pos = outer_pos;

    let (ty, len, p) = ber::decode_tag_len(buf, pos)?;
    if ty != ber::TYPE_INTEGER {
        return Err(AgentError::MalformedPacket("expected version INTEGER"));
    }
    let version_raw = ber::decode_integer(buf, p, len)?;
    let version = match version_raw {
        0 => Version::V1,
        1 => Version::V2c,
        _ => return Err(AgentError::MalformedPacket("unsupported SNMP version")),
    };
    pos = p + len;

    let (ty, len, p) = ber::decode_tag_len(buf, pos)?;
    if ty != ber::TYPE_OCTET_STRING {
        return Err(AgentError::MalformedPacket("expected community OCTET STRING"));
    }
    if len == 0 || len > MAX_COMMUNITY_LEN {
        return Err(AgentError::MalformedPacket("community length out of bounds"));
    }
    let community = String::from_utf8_lossy(&ber::decode_octet_string(buf, p, len)?).into_owned();
    pos = p + len;

    let (pdu_tag, pdu_len, pdu_pos) = ber::decode_tag_len(buf, pos)?;
    let kind = pdu_kind(pdu_tag)?;
    if pdu_pos + pdu_len != buf.len() {
        return Err(AgentError::MalformedPacket(
            "PDU length does not match remaining bytes",
        ));
    }
    let mut pos = pdu_pos;

    let (ty, len, p) = ber::decode_tag_len(buf, pos)?;
    if ty != ber::TYPE_INTEGER {
        return Err(AgentError::MalformedPacket("expected request-id INTEGER"));
    }
    let request_id = ber::decode_integer(buf, p, len)?;
    pos = p + len;

    let (ty, len, p) = ber::decode_tag_len(buf, pos)?;
    if ty != ber::TYPE_INTEGER {
        return Err(AgentError::MalformedPacket("expected non-repeaters/error-status INTEGER"));
    }
    let non_repeaters = ber::decode_integer(buf, p, len)?.max(0) as u32;
    pos = p + len;

    let (ty, len, p) = ber::decode_tag_len(buf, pos)?;
    if ty != ber::TYPE_INTEGER {
        return Err(AgentError::MalformedPacket("expected max-repetitions/error-index INTEGER"));
    }
    let max_repetitions = ber::decode_integer(buf, p, len)?.max(0) as u32;
    pos = p + len;

    let (ty, len, p) = ber::decode_tag_len(buf, pos)?;
    if ty != ber::TYPE_SEQUENCE {
        return Err(AgentError::MalformedPacket("expected varbind-list SEQUENCE"));
    }
    if p + len != pdu_pos + pdu_len {
        return Err(AgentError::MalformedPacket(
            "varbind-list length does not match remaining PDU bytes",
        ));
    }

    let mut oids = Vec::new();
    let mut vb_pos = p;
    let vb_end = p + len;
    while vb_pos < vb_end {
        let (vb_ty, vb_len, vb_content) = ber::decode_tag_len(buf, vb_pos)?;
        if vb_ty != ber::TYPE_SEQUENCE {
            return Err(AgentError::MalformedPacket("expected varbind SEQUENCE"));
        }

        let (name_ty, name_len, name_pos) = ber::decode_tag_len(buf, vb_content)?;
        if name_ty != ber::TYPE_OID {
            return Err(AgentError::MalformedPacket("varbind name must be an OID"));
        }
        let oid = ber::decode_oid(buf, name_pos, name_len)?;
        if oid.len() < 1 {
            return Err(AgentError::MalformedPacket("varbind OID too short"));
        }

        let value_pos = name_pos + name_len;
        let (value_ty, value_len, _) = ber::decode_tag_len(buf, value_pos)?;
        let is_null = value_ty == ber::TYPE_NULL;
        if is_null && value_len != 0 {
            return Err(AgentError::MalformedPacket("NULL value must be zero-length"));
        }
        if !is_null && value_len == 0 {
            return Err(AgentError::MalformedPacket(
                "non-NULL varbind value must be non-empty",
            ));
        }

        oids.push(oid);
        if oids.len() > MAX_OIDS {
            return Err(AgentError::MalformedPacket("too many varbinds"));
        }

        vb_pos = vb_content + vb_len;
    }
    if vb_pos != vb_end {
        return Err(AgentError::MalformedPacket("varbind-list truncated"));
    }

    Ok(Request {
        version,
        community,
        kind,
        request_id,
        non_repeaters,
        max_repetitions,
        oids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // sysDescr.0 GET against a single-OID varbind list.
    const GET_SYS_DESCR: [u8; 43] = [
        0x30, 0x29, 0x02, 0x01, 0x00, 0x04, 0x06, 0x70, 0x75, 0x62, 0x6c, 0x69, 0x63, 0xa0, 0x1c,
        0x02, 0x04, 0x00, 0x00, 0x00, 0x01, 0x02, 0x01, 0x00, 0x02, 0x01, 0x00, 0x30, 0x0e, 0x30,
        0x0c, 0x06, 0x08, 0x2b, 0x06, 0x01, 0x02, 0x01, 0x01, 0x01, 0x00, 0x05, 0x00,
    ];

    #[test]
    fn decodes_sys_descr_get() {
        let req = decode_request(&GET_SYS_DESCR).unwrap();
        assert_eq!(req.version, Version::V1);
        assert_eq!(req.community, "public");
        assert_eq!(req.kind, PduKind::Get);
        assert_eq!(req.request_id, 1);
        assert_eq!(req.oids.len(), 1);
        assert_eq!(req.oids[0].to_ascii(), ".1.3.6.1.2.1.1.1.0");
    }

    #[test]
    fn rejects_truncated_outer_length() {
        let mut buf = GET_SYS_DESCR.to_vec();
        buf[1] = 100; // claim 100 bytes of content, only ~40 follow
        assert!(decode_request(&buf).is_err());
    }

    #[test]
    fn rejects_bad_version() {
        let mut buf = GET_SYS_DESCR.to_vec();
        buf[4] = 5;
        assert!(decode_request(&buf).is_err());
    }

    #[test]
    fn rejects_empty_community() {
        // version SEQUENCE { 0 } then empty OCTET STRING then the same PDU,
        // hand-built since shrinking the community shifts lengths.
        let buf = [
            0x30, 0x23, 0x02, 0x01, 0x00, 0x04, 0x00, 0xa0, 0x1c, 0x02, 0x04, 0x00, 0x00, 0x00,
            0x01, 0x02, 0x01, 0x00, 0x02, 0x01, 0x00, 0x30, 0x0e, 0x30, 0x0c, 0x06, 0x08, 0x2b,
            0x06, 0x01, 0x02, 0x01, 0x01, 0x01, 0x00, 0x05, 0x00,
        ];
        assert!(decode_request(&buf).is_err());
    }
}
