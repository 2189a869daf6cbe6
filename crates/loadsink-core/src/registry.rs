//! Per-worker connection registry
//!
//! Owns a worker's epoll instance and the handoff of freshly accepted
//! connections from the dispatcher thread. The dispatcher pushes the
//! owned socket onto a bounded lock-free queue and registers its fd for
//! edge-triggered read readiness; the worker adopts queued sockets into
//! a map only it touches before servicing events. The queue push happens
//! before the epoll registration, so a readiness event can never name an
//! fd the worker is unable to adopt.
//!
//! The worker is the only party that deregisters and closes sockets.
//! Removal is idempotent: removing an fd that is no longer present
//! reports `false`, which keeps the active-connection gauge from being
//! decremented twice for one socket.

use crossbeam_queue::ArrayQueue;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use std::collections::HashMap;
use std::io;
use std::net::TcpStream;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};

/// Sockets currently serviced by one worker, keyed by fd. Exclusively
/// owned by that worker's thread.
pub type LiveConnections = HashMap<RawFd, TcpStream>;

/// One worker's epoll instance plus the incoming-connection queue.
#[derive(Debug)]
pub struct ConnectionRegistry {
    epoll: Epoll,
    pending: ArrayQueue<TcpStream>,
}

impl ConnectionRegistry {
    pub fn new(queue_capacity: usize) -> io::Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;
        Ok(Self {
            epoll,
            pending: ArrayQueue::new(queue_capacity),
        })
    }

    /// Hand a connection to this worker: queue the owned socket, then
    /// register its fd for edge-triggered read readiness. Fails with
    /// `WouldBlock` when the handoff queue is full (the caller drops the
    /// connection; the worker never learns about it).
    pub fn submit(&self, stream: TcpStream) -> io::Result<()> {
        let fd = stream.as_raw_fd();
        if self.pending.push(stream).is_err() {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "connection handoff queue is full",
            ));
        }
        // The queue now owns the socket, so the fd stays open at least
        // until the worker adopts or drops it.
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        self.epoll.add(
            borrowed,
            EpollEvent::new(EpollFlags::EPOLLIN | EpollFlags::EPOLLET, fd as u64),
        )?;
        Ok(())
    }

    /// Move queued connections into the worker's live set. Called by the
    /// worker after every wakeup, before events are serviced.
    pub fn adopt_pending(&self, live: &mut LiveConnections) {
        while let Some(stream) = self.pending.pop() {
            live.insert(stream.as_raw_fd(), stream);
        }
    }

    /// Deregister and close one connection. Returns whether it was still
    /// present; a second removal of the same fd is a no-op.
    pub fn remove(&self, live: &mut LiveConnections, fd: RawFd) -> bool {
        match live.remove(&fd) {
            Some(stream) => {
                // The kernel drops the registration on close anyway;
                // deleting first keeps the table tidy if the fd number
                // is reused. Dropping the stream closes the socket.
                let _ = self.epoll.delete(&stream);
                true
            }
            None => false,
        }
    }

    /// Block until at least one registered socket is ready. No timeout:
    /// the worker has nothing else to do.
    pub fn wait(&self, events: &mut [EpollEvent]) -> nix::Result<usize> {
        self.epoll.wait(events, EpollTimeout::NONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();
        (client, accepted)
    }

    #[test]
    fn test_submit_then_adopt() {
        let registry = ConnectionRegistry::new(8).unwrap();
        let (_client, accepted) = socket_pair();
        let fd = accepted.as_raw_fd();

        registry.submit(accepted).unwrap();

        let mut live = LiveConnections::new();
        registry.adopt_pending(&mut live);
        assert!(live.contains_key(&fd));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = ConnectionRegistry::new(8).unwrap();
        let (_client, accepted) = socket_pair();
        let fd = accepted.as_raw_fd();

        registry.submit(accepted).unwrap();
        let mut live = LiveConnections::new();
        registry.adopt_pending(&mut live);

        assert!(registry.remove(&mut live, fd));
        assert!(!registry.remove(&mut live, fd));
        assert!(live.is_empty());
    }

    #[test]
    fn test_full_queue_refuses_handoff() {
        let registry = ConnectionRegistry::new(1).unwrap();
        let (_c1, first) = socket_pair();
        let (_c2, second) = socket_pair();

        registry.submit(first).unwrap();
        let err = registry.submit(second).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_wait_reports_readable_fd() {
        let registry = ConnectionRegistry::new(8).unwrap();
        let (mut client, accepted) = socket_pair();
        let fd = accepted.as_raw_fd();

        registry.submit(accepted).unwrap();
        client.write_all(b"ping").unwrap();

        let mut events = [EpollEvent::empty(); 8];
        let ready = registry.wait(&mut events).unwrap();
        assert!(ready >= 1);
        assert_eq!(events[0].data() as RawFd, fd);
    }
}
