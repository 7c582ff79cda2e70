//! Protocol-level end-to-end scenarios driven through the public
//! decode -> handle -> encode pipeline, the same chain the reactor's
//! internal dispatch function runs per message.

use mini_snmpd_rs::ber;
use mini_snmpd_rs::config::AgentConfig;
use mini_snmpd_rs::handlers::handle_request;
use mini_snmpd_rs::mib::Mib;
use mini_snmpd_rs::mib_build;
use mini_snmpd_rs::oid::Oid;
use mini_snmpd_rs::request::{decode_request, PduKind, Request, Version};
use mini_snmpd_rs::response::{encode_response_versioned, ERROR_NO_ACCESS, ERROR_NO_SUCH_NAME, ERROR_OK};

fn built_mib(cfg: &AgentConfig) -> Mib {
    let mut mib = Mib::new();
    mib_build::build(&mut mib, cfg).unwrap();
    mib
}

fn version_byte(v: Version) -> i32 {
    match v {
        Version::V1 => 0,
        Version::V2c => 1,
    }
}

/// Decodes a single-varbind RESPONSE message and returns
/// `(community, request_id, error_status, error_index, oid_ascii, value_tag)`.
fn decode_response(buf: &[u8]) -> (String, i32, i32, i32, String, u8) {
    let (_, _, mut pos) = ber::decode_tag_len(buf, 0).unwrap();
    let (_, len, p) = ber::decode_tag_len(buf, pos).unwrap(); // version
    pos = p + len;
    let (_, len, p) = ber::decode_tag_len(buf, pos).unwrap(); // community
    let community = String::from_utf8(ber::decode_octet_string(buf, p, len).unwrap()).unwrap();
    pos = p + len;
    let (_, _, pdu_pos) = ber::decode_tag_len(buf, pos).unwrap(); // PDU header
    pos = pdu_pos;

    let (_, len, p) = ber::decode_tag_len(buf, pos).unwrap();
    let request_id = ber::decode_integer(buf, p, len).unwrap();
    pos = p + len;
    let (_, len, p) = ber::decode_tag_len(buf, pos).unwrap();
    let error_status = ber::decode_integer(buf, p, len).unwrap();
    pos = p + len;
    let (_, len, p) = ber::decode_tag_len(buf, pos).unwrap();
    let error_index = ber::decode_integer(buf, p, len).unwrap();
    pos = p + len;

    let (_, _, vb_list_pos) = ber::decode_tag_len(buf, pos).unwrap();
    let (_, _, vb_pos) = ber::decode_tag_len(buf, vb_list_pos).unwrap();
    let (oid_ty, oid_len, oid_pos) = ber::decode_tag_len(buf, vb_pos).unwrap();
    assert_eq!(oid_ty, ber::TYPE_OID);
    let oid = ber::decode_oid(buf, oid_pos, oid_len).unwrap();
    let value_pos = oid_pos + oid_len;
    let (value_ty, _, _) = ber::decode_tag_len(buf, value_pos).unwrap();

    (
        community,
        request_id,
        error_status,
        error_index,
        oid.to_ascii(),
        value_ty,
    )
}

const GET_SYS_DESCR: [u8; 43] = [
    0x30, 0x29, 0x02, 0x01, 0x00, 0x04, 0x06, 0x70, 0x75, 0x62, 0x6c, 0x69, 0x63, 0xa0, 0x1c, 0x02,
    0x04, 0x00, 0x00, 0x00, 0x01, 0x02, 0x01, 0x00, 0x02, 0x01, 0x00, 0x30, 0x0e, 0x30, 0x0c, 0x06,
    0x08, 0x2b, 0x06, 0x01, 0x02, 0x01, 0x01, 0x01, 0x00, 0x05, 0x00,
];

#[test]
fn sys_descr_get_round_trips_byte_exact() {
    let cfg = AgentConfig::default();
    let mib = built_mib(&cfg);

    let request = decode_request(&GET_SYS_DESCR).unwrap();
    assert_eq!(request.community, "public");

    let response = handle_request(&request, &mib, &cfg).unwrap();
    assert_eq!(response.error_status, ERROR_OK);
    assert_eq!(response.varbinds.len(), 1);

    let mut out = [0u8; 2048];
    let len = encode_response_versioned(
        &mut out,
        version_byte(request.version),
        &request.community,
        &response,
    )
    .unwrap();

    let (community, request_id, error_status, error_index, oid_ascii, value_ty) =
        decode_response(&out[..len]);
    assert_eq!(community, "public");
    assert_eq!(request_id, 1);
    assert_eq!(error_status, ERROR_OK);
    assert_eq!(error_index, 0);
    assert_eq!(oid_ascii, ".1.3.6.1.2.1.1.1.0");
    assert_eq!(value_ty, ber::TYPE_OCTET_STRING);
}

#[test]
fn wrong_community_v2c_yields_no_access_with_null_varbinds() {
    let cfg = AgentConfig::default(); // community = "public"
    let mib = built_mib(&cfg);

    // Same structure as GET_SYS_DESCR but community bytes swapped for
    // "privat" (also 6 bytes, so every length field still matches).
    let mut buf = GET_SYS_DESCR;
    buf[7..13].copy_from_slice(b"privat");

    let request = decode_request(&buf).unwrap();
    assert_eq!(request.version, Version::V1); // the fixture's version byte is 0

    // Re-decode as v2c by building the request directly: authentication is
    // only enforced for v2c, so exercise that branch explicitly.
    let v2c_request = Request {
        version: Version::V2c,
        ..request
    };

    let response = handle_request(&v2c_request, &mib, &cfg).unwrap();
    assert_eq!(response.error_status, ERROR_NO_ACCESS);
    assert_eq!(response.error_index, 0);
    assert_eq!(response.varbinds.len(), 1);
    assert_eq!(response.varbinds[0].oid.to_ascii(), ".1.3.6.1.2.1.1.1.0");

    let mut out = [0u8; 2048];
    let len = encode_response_versioned(&mut out, 1, &v2c_request.community, &response).unwrap();
    let (community, _, error_status, error_index, oid_ascii, value_ty) = decode_response(&out[..len]);
    // The response echoes back whatever community the client sent, not the
    // agent's own configured one, even on an auth failure.
    assert_eq!(community, "privat");
    assert_eq!(error_status, ERROR_NO_ACCESS);
    assert_eq!(error_index, 0);
    assert_eq!(oid_ascii, ".1.3.6.1.2.1.1.1.0");
    assert_eq!(value_ty, ber::TYPE_NULL);
}

#[test]
fn get_next_past_last_cpu_counter_is_end_of_mib_view() {
    let cfg = AgentConfig::default();
    let mib = built_mib(&cfg);

    let last_oid = Oid::from_ascii(".1.3.6.1.4.1.2021.11.60").unwrap();
    assert_eq!(mib.entry(mib.len() - 1).unwrap().oid, last_oid);

    let request = Request {
        version: Version::V2c,
        community: "public".to_string(),
        kind: PduKind::GetNext,
        request_id: 9,
        non_repeaters: 0,
        max_repetitions: 0,
        oids: vec![last_oid],
    };

    let response = handle_request(&request, &mib, &cfg).unwrap();
    assert_eq!(response.error_status, ERROR_OK);
    assert_eq!(response.varbinds.len(), 1);
    assert!(matches!(
        response.varbinds[0].value,
        mini_snmpd_rs::response::Value::EndOfMibView
    ));
}

#[test]
fn set_in_v1_is_rejected_with_no_such_name() {
    let cfg = AgentConfig::default();
    let mib = built_mib(&cfg);

    let request = Request {
        version: Version::V1,
        community: "public".to_string(),
        kind: PduKind::Set,
        request_id: 3,
        non_repeaters: 0,
        max_repetitions: 0,
        oids: vec![Oid::from_ascii(".1.3.6.1.2.1.1.6.0").unwrap()],
    };

    let response = handle_request(&request, &mib, &cfg).unwrap();
    assert_eq!(response.error_status, ERROR_NO_SUCH_NAME);
    assert_eq!(response.error_index, 1);
}

#[test]
fn malformed_outer_length_is_rejected_and_would_be_dropped() {
    let mut buf = GET_SYS_DESCR.to_vec();
    buf[1] = 0x7f; // claims far more content than the buffer actually holds
    assert!(decode_request(&buf).is_err());
}

#[test]
fn get_bulk_end_to_end_interleaves_by_repetition_then_variable() {
    use mini_snmpd_rs::mib::{CellType, CellValue};

    let mut mib = Mib::new();
    for (oid, val) in [
        (".1.3.6.1.2.1.1.1.0", "a"),
        (".1.3.6.1.2.1.1.2.0", "b"),
        (".1.3.6.1.2.1.25.1.1.0", "c"),
        (".1.3.6.1.2.1.25.1.2.0", "d"),
    ] {
        let idx = mib
            .push_entry(Oid::from_ascii(oid).unwrap(), CellType::OctetString)
            .unwrap();
        mib.update(idx, CellValue::String(val.as_bytes())).unwrap();
    }
    let cfg = AgentConfig::default();

    let request = Request {
        version: Version::V2c,
        community: "public".to_string(),
        kind: PduKind::GetBulk,
        request_id: 5,
        non_repeaters: 0,
        max_repetitions: 2,
        oids: vec![
            Oid::from_ascii(".1.3.6.1.2.1.1").unwrap(),
            Oid::from_ascii(".1.3.6.1.2.1.25.1").unwrap(),
        ],
    };

    let response = handle_request(&request, &mib, &cfg).unwrap();
    let oids: Vec<String> = response
        .varbinds
        .iter()
        .map(|vb| vb.oid.to_ascii())
        .collect();
    assert_eq!(
        oids,
        vec![
            ".1.3.6.1.2.1.1.1.0",
            ".1.3.6.1.2.1.25.1.1.0",
            ".1.3.6.1.2.1.1.2.0",
            ".1.3.6.1.2.1.25.1.2.0",
        ]
    );

    let mut out = [0u8; 2048];
    let len = encode_response_versioned(&mut out, 1, &request.community, &response).unwrap();
    assert!(len > 0);
}
