//! Per-connection session (C8): one non-blocking stream, one accumulating
//! read buffer, one write queue drained head-first. This protocol's only
//! handshake is the VERIFY frame, handled by the worker (C10), not the
//! session itself, so there's no per-connection handshake state to carry.
//!
//! The send queue is the one piece of state other threads touch directly
//! (the send queue needs mutual exclusion with producers invoking send from
//! other sessions/worker threads), so it lives behind its own mutex in
//! `SessionShared`, reachable via a cheap `Arc` clone independent of the
//! owning reactor thread.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mio::net::TcpStream;
use mio::{Poll, PollOpt, Ready, Registration, SetReadiness, Token};

use flux::UserId;
use netframe::{encode_frame, try_decode, Frame, Tag};

pub type SessionId = usize;

const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SessionState {
    Unverified,
    Verified(UserId),
    Closed,
}

/// Cross-thread handle to one session. The message worker (C10) and
/// mailbox consumer (C11) hold clones of this; only the owning reactor
/// thread touches the `Session` itself.
pub struct SessionShared {
    pub id: SessionId,
    outbound: Mutex<VecDeque<Vec<u8>>>,
    readiness: SetReadiness,
    closed: AtomicBool,
    state: Mutex<SessionState>,
}

pub type SessionHandle = Arc<SessionShared>;

impl SessionShared {
    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("session state mutex poisoned")
    }

    pub fn is_unverified(&self) -> bool {
        matches!(self.state(), SessionState::Unverified)
    }

    pub fn uid(&self) -> Option<UserId> {
        match self.state() {
            SessionState::Verified(uid) => Some(uid),
            _ => None,
        }
    }

    pub fn mark_verified(&self, uid: UserId) {
        *self.state.lock().expect("session state mutex poisoned") = SessionState::Verified(uid);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Appends a frame to the send queue; iff the queue was empty, wakes
    /// the owning reactor so its write loop picks it up. A non-empty queue
    /// means the reactor is already scheduled to drain it, so no extra wake
    /// is needed.
    pub fn send(&self, tag: Tag, payload: &[u8]) {
        if self.is_closed() {
            return;
        }
        let bytes = encode_frame(tag, payload);
        let was_empty = {
            let mut q = self.outbound.lock().expect("session outbound mutex poisoned");
            let was_empty = q.is_empty();
            q.push_back(bytes);
            was_empty
        };
        if was_empty {
            let _ = self.readiness.set_readiness(Ready::writable());
        }
    }

    #[cfg(test)]
    pub(crate) fn test_peek_outbound(&self) -> Vec<Vec<u8>> {
        self.outbound.lock().expect("session outbound mutex poisoned").iter().cloned().collect()
    }

    /// Idempotent close: only the first caller transitions state and wakes
    /// the reactor to actually tear the socket down.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.state.lock().expect("session state mutex poisoned") = SessionState::Closed;
        let _ = self.readiness.set_readiness(Ready::writable() | Ready::readable());
    }
}

/// One live TCP session owned exclusively by its reactor thread.
pub struct Session {
    pub shared: SessionHandle,
    stream: TcpStream,
    registration: Registration,
    read_buf: Vec<u8>,
    read_filled: usize,
}

/// Result of pumping one session's readable/writable readiness.
pub enum Pumped {
    /// Session stays open; zero or more frames were decoded off the wire.
    Frames(Vec<Frame>),
    /// Session must be torn down (socket error, peer close, or an explicit
    /// `close()` observed via the wake registration).
    Gone,
}

impl Session {
    /// Builds a session around an accepted stream plus a `mio::Registration`
    /// the reactor polls alongside the socket, so a remote `send()`/`close()`
    /// can wake the reactor even when the socket itself has no new readiness.
    pub fn new(id: SessionId, stream: TcpStream) -> (Session, SessionHandle) {
        let (registration, readiness) = Registration::new2();
        let shared = Arc::new(SessionShared {
            id,
            outbound: Mutex::new(VecDeque::new()),
            readiness,
            closed: AtomicBool::new(false),
            state: Mutex::new(SessionState::Unverified),
        });

        let session = Session {
            shared: shared.clone(),
            stream,
            registration,
            read_buf: vec![0u8; READ_CHUNK],
            read_filled: 0,
        };

        (session, shared)
    }

    pub fn token_for(id: SessionId) -> Token {
        // Session tokens are offset so they never collide with the
        // reactor's fixed control tokens (listener handoff, wake).
        Token(id * 2)
    }

    pub fn wake_token_for(id: SessionId) -> Token {
        Token(id * 2 + 1)
    }

    pub fn register(&self, poll: &Poll, id: SessionId) -> io::Result<()> {
        poll.register(
            &self.stream,
            Self::token_for(id),
            Ready::readable() | Ready::writable(),
            PollOpt::edge(),
        )?;
        poll.register(
            &self.registration,
            Self::wake_token_for(id),
            Ready::readable() | Ready::writable(),
            PollOpt::edge(),
        )
    }

    pub fn deregister(&self, poll: &Poll) -> io::Result<()> {
        poll.deregister(&self.stream)?;
        poll.deregister(&self.registration)
    }

    /// Drains whatever is readable, decoding as many complete frames as are
    /// buffered. Oversized/malformed frames close the session per C1/C8.
    pub fn pump_readable(&mut self) -> Pumped {
        if self.shared.is_closed() {
            return Pumped::Gone;
        }

        loop {
            if self.read_filled == self.read_buf.len() {
                self.read_buf.resize(self.read_buf.len() * 2, 0);
            }

            match self.stream.read(&mut self.read_buf[self.read_filled..]) {
                Ok(0) => return Pumped::Gone,
                Ok(n) => self.read_filled += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return Pumped::Gone,
            }
        }

        let mut frames = Vec::new();
        let mut consumed_total = 0;
        loop {
            match try_decode(&self.read_buf[consumed_total..self.read_filled]) {
                Ok(Some((frame, consumed))) => {
                    frames.push(frame);
                    consumed_total += consumed;
                }
                Ok(None) => break,
                Err(_) => return Pumped::Gone,
            }
        }

        if consumed_total > 0 {
            self.read_buf.copy_within(consumed_total..self.read_filled, 0);
            self.read_filled -= consumed_total;
        }

        Pumped::Frames(frames)
    }

    /// Writes as much of the queue head as the socket accepts; pops and
    /// moves to the next buffer only once the current head drains fully, so
    /// at most one write is ever in flight per session.
    pub fn pump_writable(&mut self) -> Pumped {
        loop {
            if self.shared.is_closed() && self.queue_is_empty() {
                return Pumped::Gone;
            }

            let mut q = self.shared_outbound();
            let head = match q.front_mut() {
                Some(head) => head,
                None => return Pumped::Frames(Vec::new()),
            };

            match self.stream.write(head) {
                Ok(0) => return Pumped::Gone,
                Ok(n) => {
                    head.drain(0..n);
                    if head.is_empty() {
                        q.pop_front();
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Pumped::Frames(Vec::new()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return Pumped::Gone,
            }
        }
    }

    fn shared_outbound(&self) -> std::sync::MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.shared.outbound.lock().expect("session outbound mutex poisoned")
    }

    fn queue_is_empty(&self) -> bool {
        self.shared_outbound().is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::net::TcpListener as StdTcpListener;

    /// Builds a real loopback `Session` for unit tests elsewhere in the
    /// crate (e.g. the registry) that need a `SessionHandle` without caring
    /// about actual I/O.
    pub(crate) fn test_session(id: SessionId) -> (Session, SessionHandle) {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        client.set_nonblocking(true).unwrap();
        let stream = TcpStream::from_stream(server).unwrap();
        // Keep the client end alive for the session's lifetime by leaking
        // it into the returned tuple's drop order: tests only need the
        // server-side Session, so the client is simply dropped here, which
        // closes its half of the pair -- fine for state-machine assertions
        // that don't exercise actual reads/writes.
        drop(client);
        Session::new(id, stream)
    }

    #[test]
    fn fresh_session_is_unverified() {
        let (_session, handle) = test_session(1);
        assert_eq!(handle.state(), SessionState::Unverified);
        assert!(handle.is_unverified());
        assert!(handle.uid().is_none());
    }

    #[test]
    fn mark_verified_updates_state() {
        let (_session, handle) = test_session(2);
        handle.mark_verified(42);
        assert_eq!(handle.uid(), Some(42));
        assert!(!handle.is_unverified());
    }

    #[test]
    fn close_is_idempotent() {
        let (_session, handle) = test_session(3);
        handle.close();
        handle.close();
        assert_eq!(handle.state(), SessionState::Closed);
        assert!(handle.is_closed());
    }

    #[test]
    fn send_after_close_is_a_no_op() {
        let (_session, handle) = test_session(4);
        handle.close();
        handle.send(Tag::Ping, b"");
        // No panic, no observable queue growth through the public API --
        // this just asserts the early return doesn't encode anything.
    }
}
