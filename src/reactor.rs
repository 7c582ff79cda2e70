//! The reactor: single-threaded, `select`-based multiplexing of one
//! UDP socket and a bounded table of TCP clients, with periodic MIB
//! refresh and LRU eviction on TCP table overflow.

use std::io::{ErrorKind, Read, Write};
use std::mem::MaybeUninit;
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Instant;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::ber;
use crate::config::{AddressFamily, AgentConfig};
use crate::handlers;
use crate::mib::Mib;
use crate::mib_build::DynamicIndices;
use crate::request::decode_request;
use crate::response::encode_response_versioned;
use crate::telemetry::ProcessClock;

/// Per-client receive/send buffer size.
pub const MAX_PACKET_SIZE: usize = 2048;
/// Bound on simultaneous TCP connections.
pub const MAX_CLIENTS: usize = 16;
/// Minimum buffered bytes before `snmp_packet_complete` attempts to read
/// the outer length.
const MIN_FRAME_BYTES: usize = 25;

#[derive(Debug, PartialEq, Eq)]
enum Direction {
    Incoming,
    Outgoing,
}

struct TcpClient {
    stream: TcpStream,
    last_activity: Instant,
    buf: Vec<u8>,
    size: usize,
    direction: Direction,
}

enum FrameState {
    Incomplete,
    Complete(usize),
    Malformed,
}

/// Framing predicate for stream transport: once at least
/// `MIN_FRAME_BYTES` are buffered, decode the outer SEQUENCE's tag and
/// length; "complete" iff buffered == header + declared length.
fn snmp_packet_complete(buf: &[u8]) -> FrameState {
    if buf.len() < MIN_FRAME_BYTES {
        return FrameState::Incomplete;
    }
    match ber::decode_tag_len(buf, 0) {
        Ok((ty, len, content_pos)) if ty == ber::TYPE_SEQUENCE => {
            let total = content_pos + len;
            if buf.len() < content_pos {
                FrameState::Incomplete
            } else if buf.len() == total {
                FrameState::Complete(total)
            } else if buf.len() < total {
                FrameState::Incomplete
            } else {
                FrameState::Malformed
            }
        }
        Ok(_) => FrameState::Malformed,
        Err(_) => {
            // decode_tag_len can fail merely because the length-of-length
            // bytes are not all buffered yet; only a tag/len-of-len that
            // is itself illegal is truly malformed. We can't tell the two
            // apart once MIN_FRAME_BYTES are present without re-parsing
            // loosely, so treat decode failure past the threshold as
            // malformed.
            FrameState::Malformed
        }
    }
}

pub struct Reactor {
    udp: UdpSocket,
    tcp: TcpListener,
    clients: Vec<TcpClient>,
    next_refresh: Instant,
}

impl Reactor {
    pub fn bind(cfg: &AgentConfig) -> Result<Self> {
        let bind_addr = match cfg.family {
            AddressFamily::V4 => format!("0.0.0.0:{}", cfg.udp_port),
            AddressFamily::V6 => format!("[::]:{}", cfg.udp_port),
        };
        let udp = UdpSocket::bind(&bind_addr)
            .with_context(|| format!("could not bind UDP socket on {bind_addr}"))?;
        udp.set_nonblocking(true)?;

        let tcp_bind_addr = match cfg.family {
            AddressFamily::V4 => format!("0.0.0.0:{}", cfg.tcp_port),
            AddressFamily::V6 => format!("[::]:{}", cfg.tcp_port),
        };
        let tcp = TcpListener::bind(&tcp_bind_addr)
            .with_context(|| format!("could not bind TCP listener on {tcp_bind_addr}"))?;
        tcp.set_nonblocking(true)?;
        set_reuseaddr(tcp.as_raw_fd())?;

        Ok(Reactor {
            udp,
            tcp,
            clients: Vec::with_capacity(MAX_CLIENTS),
            next_refresh: Instant::now(),
        })
    }

    /// Runs until the signal-quit flag is observed. Every iteration waits
    /// in `select` for at most the time remaining until the next full MIB
    /// refresh.
    pub fn run(&mut self, mib: &mut Mib, indices: &DynamicIndices, clock: &ProcessClock, cfg: &AgentConfig) -> Result<()> {
        loop {
            if crate::signal::quit_requested() {
                info!("quit requested, shutting down reactor");
                return Ok(());
            }

            let remaining = self
                .next_refresh
                .saturating_duration_since(Instant::now());
            let timed_out = self.wait_for_ready(remaining)?;

            if crate::signal::quit_requested() {
                return Ok(());
            }

            if timed_out || Instant::now() >= self.next_refresh {
                crate::mib_build::update(mib, indices, clock, cfg, true)?;
                self.next_refresh = Instant::now()
                    + std::time::Duration::from_millis(cfg.timeout_centiseconds * 10);
            } else {
                crate::mib_build::update(mib, indices, clock, cfg, false)?;
            }

            self.service_udp(mib, cfg)?;
            self.service_tcp_accept(cfg)?;
            self.service_tcp_clients(mib, cfg)?;
        }
    }

    fn wait_for_ready(&self, timeout: std::time::Duration) -> Result<bool> {
        unsafe {
            let mut readfds = MaybeUninit::<libc::fd_set>::uninit();
            let mut writefds = MaybeUninit::<libc::fd_set>::uninit();
            libc::FD_ZERO(readfds.as_mut_ptr());
            libc::FD_ZERO(writefds.as_mut_ptr());
            let mut readfds = readfds.assume_init();
            let mut writefds = writefds.assume_init();

            let mut max_fd: RawFd = 0;
            let mut add_read = |fd: RawFd, set: &mut libc::fd_set, max_fd: &mut RawFd| {
                if (fd as usize) < libc::FD_SETSIZE {
                    libc::FD_SET(fd, set);
                    *max_fd = (*max_fd).max(fd);
                }
            };

            add_read(self.udp.as_raw_fd(), &mut readfds, &mut max_fd);
            add_read(self.tcp.as_raw_fd(), &mut readfds, &mut max_fd);
            for client in &self.clients {
                let fd = client.stream.as_raw_fd();
                match client.direction {
                    Direction::Incoming => add_read(fd, &mut readfds, &mut max_fd),
                    Direction::Outgoing => add_read(fd, &mut writefds, &mut max_fd),
                }
            }

            let mut tv = libc::timeval {
                tv_sec: timeout.as_secs() as libc::time_t,
                tv_usec: timeout.subsec_micros() as libc::suseconds_t,
            };

            let ret = libc::select(
                max_fd + 1,
                &mut readfds,
                &mut writefds,
                std::ptr::null_mut(),
                &mut tv,
            );

            if ret < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == ErrorKind::Interrupted {
                    return Ok(false);
                }
                return Err(anyhow::anyhow!(err).context("select failed"));
            }

            Ok(ret == 0)
        }
    }

    fn service_udp(&mut self, mib: &Mib, cfg: &AgentConfig) -> Result<()> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        match self.udp.recv_from(&mut buf) {
            Ok((n, peer)) => {
                if let Some(reply) = dispatch(&buf[..n], mib, cfg, peer.to_string().as_str()) {
                    let _ = self.udp.send_to(&reply, peer);
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(anyhow::anyhow!(e).context("UDP recv failed")),
        }
    }

    fn service_tcp_accept(&mut self, _cfg: &AgentConfig) -> Result<()> {
        match self.tcp.accept() {
            Ok((stream, peer)) => {
                if (stream.as_raw_fd() as usize) >= libc::FD_SETSIZE {
                    warn!("rejecting TCP client {peer}: fd exceeds FD_SETSIZE");
                    return Ok(());
                }
                stream.set_nonblocking(true)?;

                if self.clients.len() >= MAX_CLIENTS {
                    if let Some((victim, _)) = self
                        .clients
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, c)| c.last_activity)
                        .map(|(i, c)| (i, c.last_activity))
                    {
                        warn!("TCP client table full, evicting LRU client at slot {victim}");
                        self.clients.remove(victim);
                    }
                }

                info!("accepted TCP client {peer}");
                self.clients.push(TcpClient {
                    stream,
                    last_activity: Instant::now(),
                    buf: Vec::with_capacity(MAX_PACKET_SIZE),
                    size: 0,
                    direction: Direction::Incoming,
                });
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => {
                warn!("TCP accept failed: {e}");
                Ok(())
            }
        }
    }

    fn service_tcp_clients(&mut self, mib: &Mib, cfg: &AgentConfig) -> Result<()> {
        let mut to_remove = Vec::new();

        for (i, client) in self.clients.iter_mut().enumerate() {
            match client.direction {
                Direction::Incoming => {
                    let mut chunk = [0u8; MAX_PACKET_SIZE];
                    match client.stream.read(&mut chunk) {
                        Ok(0) => to_remove.push(i),
                        Ok(n) => {
                            client.last_activity = Instant::now();
                            if client.size + n > MAX_PACKET_SIZE {
                                warn!("TCP client buffer overflow, closing");
                                to_remove.push(i);
                                continue;
                            }
                            client.buf.truncate(client.size);
                            client.buf.extend_from_slice(&chunk[..n]);
                            client.size += n;

                            match snmp_packet_complete(&client.buf[..client.size]) {
                                FrameState::Incomplete => {}
                                FrameState::Malformed => {
                                    warn!("malformed TCP frame, closing connection");
                                    to_remove.push(i);
                                }
                                FrameState::Complete(total) => {
                                    let peer = client
                                        .stream
                                        .peer_addr()
                                        .map(|a| a.to_string())
                                        .unwrap_or_default();
                                    match dispatch(&client.buf[..total], mib, cfg, &peer) {
                                        Some(reply) => {
                                            client.buf = reply;
                                            client.size = client.buf.len();
                                            client.direction = Direction::Outgoing;
                                        }
                                        None => to_remove.push(i),
                                    }
                                }
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                        Err(_) => to_remove.push(i),
                    }
                }
                Direction::Outgoing => match client.stream.write(&client.buf[..client.size]) {
                    Ok(n) if n == client.size => {
                        client.buf.clear();
                        client.size = 0;
                        client.direction = Direction::Incoming;
                        client.last_activity = Instant::now();
                    }
                    Ok(_) => to_remove.push(i), // partial write: treat as failure
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                    Err(_) => to_remove.push(i),
                },
            }
        }

        to_remove.sort_unstable();
        to_remove.dedup();
        for idx in to_remove.into_iter().rev() {
            self.clients.remove(idx);
        }
        Ok(())
    }
}

/// Runs the decode → dispatch → encode chain against one complete
/// message. Returns `None` when the message should be silently dropped
/// (malformed input, unsupported PDU, or a fatal handler error).
fn dispatch(buf: &[u8], mib: &Mib, cfg: &AgentConfig, peer: &str) -> Option<Vec<u8>> {
    let request = match decode_request(buf) {
        Ok(r) => r,
        Err(e) => {
            warn!("{peer}: dropping malformed request: {e}");
            return None;
        }
    };

    let response = match handlers::handle_request(&request, mib, cfg) {
        Ok(r) => r,
        Err(e) => {
            warn!("{peer}: dropping request after handler failure: {e}");
            return None;
        }
    };

    let version = match request.version {
        crate::request::Version::V1 => 0,
        crate::request::Version::V2c => 1,
    };

    let mut out = vec![0u8; MAX_PACKET_SIZE];
    match encode_response_versioned(&mut out, version, &request.community, &response) {
        Ok(len) => {
            out.truncate(len);
            Some(out)
        }
        Err(e) => {
            warn!("{peer}: dropping response, encoding failed: {e}");
            None
        }
    }
}

fn set_reuseaddr(fd: RawFd) -> Result<()> {
    let one: libc::c_int = 1;
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(anyhow::anyhow!(std::io::Error::last_os_error()).context("setsockopt(SO_REUSEADDR) failed"));
    }
    Ok(())
}
