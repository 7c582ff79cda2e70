//! Response encoder: serialises a [`Response`] into the bytes of a
//! complete SNMP message. Uses a forward two-pass approach (measure, then
//! emit) as a clearer alternative to encoding backwards from the tail.

use crate::ber;
use crate::error::{AgentError, Result};
use crate::mib::Mib;
use crate::oid::Oid;
use crate::request::Request;

pub const ERROR_OK: i32 = 0;
pub const ERROR_NO_SUCH_NAME: i32 = 2;
pub const ERROR_GEN_ERR: i32 = 5;
pub const ERROR_NO_ACCESS: i32 = 6;

/// One result varbind's value. Cells are either borrowed straight out of
/// the MIB store, or one of the four process-wide exception/NULL
/// constants — never copied.
#[derive(Clone, Copy)]
pub enum Value<'a> {
    Borrowed(&'a [u8]),
    Null,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl<'a> Value<'a> {
    fn bytes(self) -> &'static [u8] {
        match self {
            Value::Borrowed(_) => unreachable!("Borrowed carries its own bytes"),
            Value::Null => &ber::NULL_BYTES,
            Value::NoSuchObject => &ber::NO_SUCH_OBJECT_BYTES,
            Value::NoSuchInstance => &ber::NO_SUCH_INSTANCE_BYTES,
            Value::EndOfMibView => &ber::END_OF_MIB_VIEW_BYTES,
        }
    }

    fn encoded_len(self) -> usize {
        match self {
            Value::Borrowed(b) => b.len(),
            other => other.bytes().len(),
        }
    }

    fn write(self, dst: &mut [u8], pos: usize) -> usize {
        let bytes = match self {
            Value::Borrowed(b) => b,
            other => other.bytes(),
        };
        dst[pos..pos + bytes.len()].copy_from_slice(bytes);
        pos + bytes.len()
    }
}

pub struct VarBind<'a> {
    pub oid: Oid,
    pub value: Value<'a>,
}

pub struct Response<'a> {
    pub request_id: i32,
    pub error_status: i32,
    pub error_index: i32,
    pub varbinds: Vec<VarBind<'a>>,
}

impl<'a> Response<'a> {
    /// Builds an error response for `request`: every varbind's OID is
    /// preserved from the original request, every value replaced by BER
    /// NULL (the v1 convention for error responses).
    pub fn error(request: &Request, error_status: i32, error_index: i32) -> Response<'static> {
        Response {
            request_id: request.request_id,
            error_status,
            error_index,
            varbinds: request
                .oids
                .iter()
                .map(|oid| VarBind {
                    oid: oid.clone(),
                    value: Value::Null,
                })
                .collect(),
        }
    }
}

fn varbind_len(vb: &VarBind) -> usize {
    vb.oid.encoded_length() + vb.value.encoded_len()
}

/// Encodes a complete response message into `dst`, including the SNMP
/// version byte taken from the originating request, returning the message
/// length. `dst` must be at least `MAX_PACKET_SIZE` (2048 B); overflow is
/// reported as `EncodingOverflow` rather than silently truncated.
pub fn encode_response_versioned(
    dst: &mut [u8],
    version: i32,
    community: &str,
    response: &Response,
) -> Result<usize> {
    let varbinds_content_len: usize = response
        .varbinds
        .iter()
        .map(|vb| {
            let inner = varbind_len(vb);
            2 + ber::length_of_length(inner) + inner
        })
        .sum();
    let varbind_list_header = 1 + ber::length_of_length(varbinds_content_len);
    let varbind_list_total = varbind_list_header + varbinds_content_len;

    let inner_ints_len = 1 + ber::length_of_length(ber::integer_byte_len(response.request_id))
        + ber::integer_byte_len(response.request_id)
        + 1
        + ber::length_of_length(ber::integer_byte_len(response.error_status))
        + ber::integer_byte_len(response.error_status)
        + 1
        + ber::length_of_length(ber::integer_byte_len(response.error_index))
        + ber::integer_byte_len(response.error_index);
    let pdu_content_len = inner_ints_len + varbind_list_total;
    let pdu_header_len = 1 + ber::length_of_length(pdu_content_len);
    let pdu_total = pdu_header_len + pdu_content_len;

    let community_total = 1 + ber::length_of_length(community.len()) + community.len();
    let version_len = ber::integer_byte_len(version);
    let version_total = 1 + ber::length_of_length(version_len) + version_len;

    let outer_content_len = version_total + community_total + pdu_total;
    let needed = 1 + ber::length_of_length(outer_content_len) + outer_content_len;
    if dst.len() < needed {
        return Err(AgentError::EncodingOverflow("response does not fit in packet buffer"));
    }

    let mut pos = ber::encode_tag_len(dst, 0, ber::TYPE_SEQUENCE, outer_content_len)?;
    pos = ber::encode_integer(dst, pos, version)?;
    pos = ber::encode_octet_string(dst, pos, community.as_bytes())?;
    pos = ber::encode_tag_len(dst, pos, ber::PDU_RESPONSE, pdu_content_len)?;
    pos = ber::encode_integer(dst, pos, response.request_id)?;
    pos = ber::encode_integer(dst, pos, response.error_status)?;
    pos = ber::encode_integer(dst, pos, response.error_index)?;
    pos = ber::encode_tag_len(dst, pos, ber::TYPE_SEQUENCE, varbinds_content_len)?;

    for vb in &response.varbinds {
        let inner = varbind_len(vb);
        pos = ber::encode_tag_len(dst, pos, ber::TYPE_SEQUENCE, inner)?;
        pos = ber::encode_oid(dst, pos, &vb.oid)?;
        pos = vb.value.write(dst, pos);
    }

    Ok(pos)
}

/// Looks up the MIB cell backing `idx` as a `Value::Borrowed`. Exists so
/// handlers don't reach into `Mib` internals directly.
pub fn borrow_cell(mib: &Mib, idx: usize) -> Value<'_> {
    Value::Borrowed(mib.entry(idx).expect("valid MIB index").cell.bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mib::{CellType, CellValue, Mib};

    #[test]
    fn encodes_single_varbind_response() {
        let mut mib = Mib::new();
        let idx = mib
            .push_entry(Oid::from_ascii(".1.3.6.1.2.1.1.1.0").unwrap(), CellType::OctetString)
            .unwrap();
        mib.update(idx, CellValue::String(b"mini-snmpd-rs")).unwrap();

        let response = Response {
            request_id: 1,
            error_status: ERROR_OK,
            error_index: 0,
            varbinds: vec![VarBind {
                oid: Oid::from_ascii(".1.3.6.1.2.1.1.1.0").unwrap(),
                value: borrow_cell(&mib, idx),
            }],
        };

        let mut buf = [0u8; 2048];
        let len = encode_response_versioned(&mut buf, 0, "public", &response).unwrap();

        let (ty, outer_len, outer_pos) = ber::decode_tag_len(&buf, 0).unwrap();
        assert_eq!(ty, ber::TYPE_SEQUENCE);
        assert_eq!(outer_pos + outer_len, len);
    }

    #[test]
    fn error_response_preserves_oids_with_null_values() {
        use crate::request::{PduKind, Version};

        let req = Request {
            version: Version::V2c,
            community: "private".to_string(),
            kind: PduKind::Get,
            request_id: 42,
            non_repeaters: 0,
            max_repetitions: 0,
            oids: vec![Oid::from_ascii(".1.3.6.1.2.1.1.1.0").unwrap()],
        };
        let response = Response::error(&req, ERROR_NO_ACCESS, 0);
        assert_eq!(response.varbinds.len(), 1);
        assert_eq!(response.varbinds[0].oid.to_ascii(), ".1.3.6.1.2.1.1.1.0");

        let mut buf = [0u8; 2048];
        let len = encode_response_versioned(&mut buf, 1, "private", &response).unwrap();
        assert!(len > 0);
    }

    #[test]
    fn overflow_reported_on_tiny_buffer() {
        let response = Response {
            request_id: 1,
            error_status: ERROR_OK,
            error_index: 0,
            varbinds: vec![VarBind {
                oid: Oid::from_ascii(".1.3.6.1.2.1.1.1.0").unwrap(),
                value: Value::Null,
            }],
        };
        let mut tiny = [0u8; 4];
        assert!(encode_response_versioned(&mut tiny, 0, "public", &response).is_err());
    }
}
