//! Worker event loop
//!
//! One thread per worker. Each worker blocks in epoll wait, adopts any
//! connections the dispatcher queued, then services ready sockets one
//! bounded read at a time. No state is shared between workers beyond
//! the counters and the fault injector; a connection is serviced by the
//! worker it was assigned to for its entire life.
//!
//! A request is answered only when a complete header block arrives
//! within a single read. There is no per-connection buffer: a request
//! whose blank line is split across two reads is never answered, and
//! the client is expected to time out and retry.

use crate::fault::{FaultInjector, Verdict};
use crate::registry::{ConnectionRegistry, LiveConnections};
use crate::response::{has_complete_request, ResponseTable};
use crate::stats::ServerStats;
use crate::{sdebug, serror, sinfo, sprintln};
use nix::errno::Errno;
use nix::sys::epoll::EpollEvent;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::thread;

/// Readiness events drained per epoll wait.
const MAX_EVENTS: usize = 64;
/// Receive buffer; a request must fit (and terminate) within one fill.
const RECV_BUFFER_SIZE: usize = 8192;

pub struct Worker {
    id: usize,
    registry: Arc<ConnectionRegistry>,
    injector: Arc<FaultInjector>,
    responses: Arc<ResponseTable>,
    stats: Arc<ServerStats>,
}

impl Worker {
    pub fn new(
        id: usize,
        registry: Arc<ConnectionRegistry>,
        injector: Arc<FaultInjector>,
        responses: Arc<ResponseTable>,
        stats: Arc<ServerStats>,
    ) -> Self {
        Self {
            id,
            registry,
            injector,
            responses,
            stats,
        }
    }

    /// Service this worker's sockets forever. Wait errors are logged and
    /// the loop continues; per-socket errors only tear down that socket.
    pub fn run(&self) -> ! {
        sinfo!("[worker {}] started", self.id);

        let mut live = LiveConnections::new();
        let mut events = [EpollEvent::empty(); MAX_EVENTS];
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        loop {
            let ready = match self.registry.wait(&mut events) {
                Ok(n) => n,
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    serror!("[worker {}] epoll wait failed: {}", self.id, e);
                    continue;
                }
            };

            self.registry.adopt_pending(&mut live);

            for event in &events[..ready] {
                self.service(event.data() as RawFd, &mut live, &mut buf);
            }
        }
    }

    /// One bounded read on one ready socket, and whatever follows from
    /// it: teardown on EOF/error, a response if a complete request
    /// arrived, nothing otherwise.
    fn service(&self, fd: RawFd, live: &mut LiveConnections, buf: &mut [u8]) {
        let teardown = match live.get_mut(&fd) {
            // Stale event for an fd this worker already closed.
            None => return,
            Some(stream) => match stream.read(buf) {
                // No data yet; the connection stays registered.
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
                Err(e) => {
                    if self.stats.debug_enabled() {
                        sprintln!("[worker {}] read error on {}: {}", self.id, fd, e);
                    }
                    true
                }
                // Peer closed. The normal end of a connection's life.
                Ok(0) => true,
                Ok(n) => self.respond(stream, &buf[..n]),
            },
        };

        if teardown && self.registry.remove(live, fd) {
            self.stats.connection_closed();
            if self.stats.debug_enabled() {
                sprintln!("[worker {}] closed connection {}", self.id, fd);
            }
        }
    }

    /// Answer one read's worth of bytes. Returns true when the socket
    /// should be torn down (hard write error).
    fn respond(&self, stream: &mut TcpStream, bytes: &[u8]) -> bool {
        if self.stats.debug_enabled() {
            sprintln!(
                "[worker {}] --- request ({} bytes) ---\n{}\n---",
                self.id,
                bytes.len(),
                String::from_utf8_lossy(bytes)
            );
        }

        if !has_complete_request(bytes) {
            return false;
        }

        self.stats.record_request();

        // Models server-side latency. Stalls this whole worker, so
        // co-located connections feel the head-of-line block too.
        if let Some(delay) = self.injector.delay() {
            thread::sleep(delay);
        }

        let response = match self.injector.decide() {
            Verdict::Deliver => self.responses.ok(),
            Verdict::Inject(index) => {
                sdebug!("[worker {}] injecting error #{}", self.id, index);
                self.responses.error(index)
            }
        };

        // Single best-effort send; no partial-write bookkeeping.
        match stream.write(response) {
            Ok(_) => false,
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
            Err(e) => {
                if self.stats.debug_enabled() {
                    sprintln!("[worker {}] send failed: {}", self.id, e);
                }
                true
            }
        }
    }
}
