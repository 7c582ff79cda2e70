//! Request handlers: `GET` / `GETNEXT` / `GETBULK` / `SET` semantics
//! against the MIB store, plus the authentication gate every request
//! passes through first.

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::mib::Mib;
use crate::oid::Oid;
use crate::request::{PduKind, Request, Version};
use crate::response::{borrow_cell, Response, VarBind, Value, ERROR_GEN_ERR, ERROR_NO_ACCESS, ERROR_NO_SUCH_NAME, ERROR_OK};

/// Checks the request's community against configuration. Returns `Some`
/// error response when authentication fails and dispatch must stop;
/// `None` when the request may proceed.
fn authenticate<'a>(request: &Request, cfg: &AgentConfig) -> Option<Response<'a>> {
    if request.version == Version::V2c && request.community != cfg.community {
        return Some(Response::error(request, ERROR_NO_ACCESS, 0));
    }
    if request.version == Version::V1 && cfg.auth {
        return Some(Response::error(request, ERROR_GEN_ERR, 0));
    }
    None
}

/// Top-level dispatch: authenticate, then route by PDU kind. Only returns
/// `Err` for failures the caller should treat as fatal for this message
/// (today: `MAX_VALUES` overflow during GETBULK); everything else is
/// represented as an error `Response`.
pub fn handle_request<'a>(request: &Request, mib: &'a Mib, cfg: &AgentConfig) -> Result<Response<'a>> {
    if let Some(resp) = authenticate(request, cfg) {
        return Ok(resp);
    }

    match request.kind {
        PduKind::Get => Ok(handle_get(request, mib)),
        PduKind::GetNext => Ok(handle_get_next(request, mib)),
        PduKind::GetBulk => handle_get_bulk(request, mib),
        PduKind::Set => Ok(handle_set(request)),
    }
}

fn is_v2c(request: &Request) -> bool {
    request.version == Version::V2c
}

/// `GET`. For each queried OID, look up the entry whose OID is a prefix
/// of or equal to it, then classify by length relationship.
pub fn handle_get<'a>(request: &Request, mib: &'a Mib) -> Response<'a> {
    let mut varbinds = Vec::with_capacity(request.oids.len());

    for (i, oid) in request.oids.iter().enumerate() {
        let idx = match mib.find_exact_or_prefix(oid) {
            Some(idx) => idx,
            None => {
                if is_v2c(request) {
                    varbinds.push(VarBind {
                        oid: oid.clone(),
                        value: Value::NoSuchObject,
                    });
                    continue;
                } else {
                    return Response::error(request, ERROR_NO_SUCH_NAME, (i + 1) as i32);
                }
            }
        };

        let entry_oid = &mib.entry(idx).unwrap().oid;
        if entry_oid.len() == oid.len() + 1 {
            if is_v2c(request) {
                varbinds.push(VarBind {
                    oid: oid.clone(),
                    value: Value::NoSuchInstance,
                });
                continue;
            } else {
                return Response::error(request, ERROR_NO_SUCH_NAME, (i + 1) as i32);
            }
        }
        if entry_oid.len() != oid.len() {
            if is_v2c(request) {
                varbinds.push(VarBind {
                    oid: oid.clone(),
                    value: Value::NoSuchObject,
                });
                continue;
            } else {
                return Response::error(request, ERROR_NO_SUCH_NAME, (i + 1) as i32);
            }
        }

        varbinds.push(VarBind {
            oid: entry_oid.clone(),
            value: borrow_cell(mib, idx),
        });
    }

    Response {
        request_id: request.request_id,
        error_status: ERROR_OK,
        error_index: 0,
        varbinds,
    }
}

/// `GETNEXT`. Appends the lexicographic successor of each queried OID, or
/// the appropriate end-of-table signal.
pub fn handle_get_next<'a>(request: &Request, mib: &'a Mib) -> Response<'a> {
    let mut varbinds = Vec::with_capacity(request.oids.len());

    for (i, oid) in request.oids.iter().enumerate() {
        match mib.find_next(oid) {
            Some(idx) => varbinds.push(VarBind {
                oid: mib.entry(idx).unwrap().oid.clone(),
                value: borrow_cell(mib, idx),
            }),
            None => {
                if is_v2c(request) {
                    varbinds.push(VarBind {
                        oid: oid.clone(),
                        value: Value::EndOfMibView,
                    });
                } else {
                    return Response::error(request, ERROR_NO_SUCH_NAME, (i + 1) as i32);
                }
            }
        }
    }

    Response {
        request_id: request.request_id,
        error_status: ERROR_OK,
        error_index: 0,
        varbinds,
    }
}

/// `GETBULK`: GETNEXT-once for the first `non_repeaters` OIDs, then
/// up to `max_repetitions` rounds over the rest, interleaved by
/// repetition then by variable. Stops early once a full round makes no
/// progress (every remaining variable is already at `endOfMibView`).
pub fn handle_get_bulk<'a>(request: &Request, mib: &'a Mib) -> Result<Response<'a>> {
    let n = (request.non_repeaters as usize).min(request.oids.len());
    let mut varbinds = Vec::with_capacity(request.oids.len());

    for oid in &request.oids[..n] {
        push_next_or_end(mib, oid, &mut varbinds)?;
    }

    let repeaters = &request.oids[n..];
    let mut cursors: Vec<Oid> = repeaters.to_vec();
    let mut exhausted = vec![false; repeaters.len()];

    for _ in 0..request.max_repetitions {
        if exhausted.iter().all(|d| *d) {
            break;
        }
        let mut progressed = false;
        for (i, cursor) in cursors.iter_mut().enumerate() {
            match mib.find_next(cursor) {
                Some(idx) => {
                    let entry_oid = mib.entry(idx).unwrap().oid.clone();
                    *cursor = entry_oid.clone();
                    varbinds.push(VarBind {
                        oid: entry_oid,
                        value: borrow_cell(mib, idx),
                    });
                    progressed = true;
                }
                None => {
                    // Still append endOfMibView for this variable every
                    // remaining round; only the outer loop's all-exhausted
                    // check above retires it.
                    varbinds.push(VarBind {
                        oid: cursor.clone(),
                        value: Value::EndOfMibView,
                    });
                    exhausted[i] = true;
                }
            }
            if varbinds.len() > crate::mib::MAX_VALUES {
                return Err(AgentError::TableOverflow(crate::mib::MAX_VALUES));
            }
        }
        if !progressed {
            break;
        }
    }

    Ok(Response {
        request_id: request.request_id,
        error_status: ERROR_OK,
        error_index: 0,
        varbinds,
    })
}

fn push_next_or_end<'a>(mib: &'a Mib, oid: &Oid, varbinds: &mut Vec<VarBind<'a>>) -> Result<()> {
    match mib.find_next(oid) {
        Some(idx) => varbinds.push(VarBind {
            oid: mib.entry(idx).unwrap().oid.clone(),
            value: borrow_cell(mib, idx),
        }),
        None => varbinds.push(VarBind {
            oid: oid.clone(),
            value: Value::EndOfMibView,
        }),
    }
    if varbinds.len() > crate::mib::MAX_VALUES {
        return Err(AgentError::TableOverflow(crate::mib::MAX_VALUES));
    }
    Ok(())
}

/// `SET`. Always refused: the agent is read-only.
pub fn handle_set<'a>(request: &Request) -> Response<'a> {
    let error = if is_v2c(request) {
        ERROR_NO_ACCESS
    } else {
        ERROR_NO_SUCH_NAME
    };
    Response::error(request, error, 1)
}
