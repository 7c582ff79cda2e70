use thiserror::Error;

/// Closed set of failures the codec and MIB layers can report.
///
/// `main`/`reactor` translate these into process behaviour: most variants
/// drop the offending message (dropped datagram or a closed TCP
/// connection), a handful cause a process exit with code 2.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("encoding overflow: {0}")]
    EncodingOverflow(&'static str),

    #[error("MIB table overflow, limit is {0}")]
    TableOverflow(usize),

    #[error("OID overflow, more than {0} subids")]
    OidOverflow(usize),

    #[error("unsupported PDU")]
    UnsupportedPdu,
}

pub type Result<T> = std::result::Result<T, AgentError>;
