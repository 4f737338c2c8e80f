//! One reactor thread's share of the N-way pool: each accepted session is
//! pinned to a per-session serialization domain for its whole lifetime. A
//! slab of sessions plus a free list is polled once per loop iteration and
//! dispatched by readiness. The acceptor lives on its own thread and hands
//! off already-accepted streams through `IncomingHandle`, so each reactor
//! only ever owns one `mio::Poll`.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use mio::net::TcpStream;
use mio::{Events, Poll, PollOpt, Ready, Registration, SetReadiness, Token};

use flux::logging;

use crate::registry::Registry;
use crate::session::{Pumped, Session, SessionId};
use crate::worker::{WorkItem, WorkerHandle};

const NEW_CONN_TOKEN: Token = Token(usize::MAX);

/// The handoff point accepted streams arrive through. Cloning is cheap;
/// `push` wakes the owning reactor even though the stream itself carries no
/// socket readiness yet.
#[derive(Clone)]
pub struct IncomingHandle {
    queue: Arc<Mutex<VecDeque<TcpStream>>>,
    readiness: SetReadiness,
}

impl IncomingHandle {
    pub fn push(&self, stream: TcpStream) {
        self.queue.lock().expect("incoming queue mutex poisoned").push_back(stream);
        let _ = self.readiness.set_readiness(Ready::readable());
    }
}

pub struct Reactor {
    poll: Poll,
    events: Events,
    sessions: Vec<Option<Session>>,
    free: Vec<SessionId>,
    incoming: Arc<Mutex<VecDeque<TcpStream>>>,
    _incoming_registration: Registration,
    worker: WorkerHandle,
    registry: Arc<Registry>,
    log: logging::Logger,
}

impl Reactor {
    pub fn new(worker: WorkerHandle, registry: Arc<Registry>, log: logging::Logger) -> io::Result<(Reactor, IncomingHandle)> {
        let poll = Poll::new()?;
        let (registration, readiness) = Registration::new2();
        poll.register(&registration, NEW_CONN_TOKEN, Ready::readable(), PollOpt::edge())?;

        let queue = Arc::new(Mutex::new(VecDeque::new()));

        let reactor = Reactor {
            poll,
            events: Events::with_capacity(1024),
            sessions: Vec::new(),
            free: Vec::new(),
            incoming: queue.clone(),
            _incoming_registration: registration,
            worker,
            registry,
            log,
        };

        Ok((reactor, IncomingHandle { queue, readiness }))
    }

    /// Runs the poll loop forever. Intended to be the body of a dedicated
    /// thread, one per reactor shard.
    pub fn run(&mut self) {
        loop {
            if let Err(e) = self.poll.poll(&mut self.events, None) {
                logging::error!(self.log, "reactor poll failed"; "error" => %e);
                continue;
            }

            let events: Vec<(Token, Ready)> = self.events.iter().map(|e| (e.token(), e.readiness())).collect();

            for (token, readiness) in events {
                if token == NEW_CONN_TOKEN {
                    self.drain_incoming();
                    continue;
                }

                let id = token.0 / 2;
                let is_wake = token.0 % 2 == 1;

                if id >= self.sessions.len() || self.sessions[id].is_none() {
                    continue;
                }

                if is_wake {
                    self.pump_write(id);
                    continue;
                }

                if readiness.is_readable() {
                    self.pump_read(id);
                }
                if !self.is_gone(id) && readiness.is_writable() {
                    self.pump_write(id);
                }
            }
        }
    }

    fn is_gone(&self, id: SessionId) -> bool {
        self.sessions[id].is_none()
    }

    fn drain_incoming(&mut self) {
        let streams: Vec<TcpStream> = {
            let mut q = self.incoming.lock().expect("incoming queue mutex poisoned");
            q.drain(..).collect()
        };
        for stream in streams {
            self.accept_stream(stream);
        }
    }

    fn accept_stream(&mut self, stream: TcpStream) {
        let id = self.free.pop().unwrap_or(self.sessions.len());
        let (session, handle) = Session::new(id, stream);

        if let Err(e) = session.register(&self.poll, id) {
            logging::warn!(self.log, "session registration failed"; "error" => %e);
            return;
        }

        if id == self.sessions.len() {
            self.sessions.push(Some(session));
        } else {
            self.sessions[id] = Some(session);
        }

        self.registry.add_temp(handle);
    }

    fn pump_read(&mut self, id: SessionId) {
        let result = self.sessions[id].as_mut().expect("session present").pump_readable();
        match result {
            Pumped::Frames(frames) => {
                if frames.is_empty() {
                    return;
                }
                let handle = self.sessions[id].as_ref().expect("session present").shared.clone();
                for frame in frames {
                    self.worker.post(WorkItem::Frame { session: handle.clone(), frame });
                }
            }
            Pumped::Gone => self.teardown(id),
        }
    }

    fn pump_write(&mut self, id: SessionId) {
        if let Pumped::Gone = self.sessions[id].as_mut().expect("session present").pump_writable() {
            self.teardown(id);
        }
    }

    fn teardown(&mut self, id: SessionId) {
        if let Some(session) = self.sessions[id].take() {
            let uid = session.shared.uid();
            let _ = session.deregister(&self.poll);
            self.free.push(id);
            self.worker.post(WorkItem::Tombstone { session_id: id, uid });
        }
    }
}
