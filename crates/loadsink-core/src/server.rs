//! Server assembly
//!
//! Binds the listener, builds the shared policy objects, starts the
//! fixed worker pool, and turns the calling thread into the dispatcher.
//! The pool size is decided here and never changes afterwards.

use crate::config::ServerConfig;
use crate::dispatcher::{self, Dispatcher};
use crate::fault::FaultInjector;
use crate::registry::ConnectionRegistry;
use crate::response::ResponseTable;
use crate::sinfo;
use crate::stats::ServerStats;
use crate::worker::Worker;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

/// A bound, ready-to-run server. Workers are already live; `run`
/// consumes the server and accepts until the process is terminated.
pub struct Server {
    dispatcher: Dispatcher,
    stats: Arc<ServerStats>,
}

impl Server {
    /// Bind the port and start the worker pool. Socket setup errors are
    /// returned before any worker thread exists; callers treat them as
    /// fatal. The configuration is expected to be validated already
    /// (see [`ServerConfig::validate`]).
    pub fn bind(config: &ServerConfig) -> io::Result<Server> {
        let listener = dispatcher::listen(config.port)?;

        let stats = Arc::new(ServerStats::new());
        let responses = Arc::new(ResponseTable::new());
        let injector = Arc::new(FaultInjector::new(config.fault_cycle(), config.delay));

        let mut registries = Vec::with_capacity(config.num_workers);
        for id in 0..config.num_workers {
            let registry = Arc::new(ConnectionRegistry::new(config.queue_capacity)?);
            registries.push(Arc::clone(&registry));

            let worker = Worker::new(
                id,
                registry,
                Arc::clone(&injector),
                Arc::clone(&responses),
                Arc::clone(&stats),
            );
            thread::Builder::new()
                .name(format!("loadsink-worker-{}", id))
                .spawn(move || worker.run())?;
        }

        sinfo!(
            "listening on port {} ({} workers, fault cycle {}, delay {:?})",
            config.port,
            config.num_workers,
            injector.cycle(),
            config.delay
        );

        Ok(Server {
            dispatcher: Dispatcher::new(listener, registries, Arc::clone(&stats)),
            stats,
        })
    }

    /// The address actually bound; the port differs from the configured
    /// one when 0 was requested (tests bind ephemeral ports that way).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.dispatcher.local_addr()
    }

    /// Handle to the shared counters, for reporters and toggles.
    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// Run the accept loop on the calling thread. Never returns; the
    /// process is expected to be killed from outside.
    pub fn run(mut self) -> ! {
        self.dispatcher.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::{Duration, Instant};

    const REQUEST: &[u8] = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";

    fn start(config: ServerConfig) -> (SocketAddr, Arc<ServerStats>) {
        let server = Server::bind(&config).unwrap();
        let addr = server.local_addr().unwrap();
        let stats = server.stats();
        thread::spawn(move || server.run());
        (addr, stats)
    }

    fn connect(addr: SocketAddr) -> TcpStream {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    // Read one response: headers up to the blank line, then exactly
    // Content-Length body bytes (the connection stays open).
    fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
        let mut data = Vec::new();
        let mut chunk = [0u8; 1024];

        let header_end = loop {
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "connection closed mid-response");
            data.extend_from_slice(&chunk[..n]);
            if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&data[..header_end]).to_string();
        let content_length: usize = head
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .expect("no Content-Length header")
            .trim()
            .parse()
            .expect("unparseable Content-Length");

        while data.len() < header_end + content_length {
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "connection closed mid-body");
            data.extend_from_slice(&chunk[..n]);
        }

        (head, data[header_end..header_end + content_length].to_vec())
    }

    #[test]
    fn test_delayed_success_and_keep_alive() {
        let (addr, stats) = start(
            ServerConfig::default()
                .port(0)
                .num_workers(2)
                .delay_ms(100)
                .error_rate(0.0),
        );
        let mut stream = connect(addr);

        let started = Instant::now();
        stream.write_all(REQUEST).unwrap();
        let (head, body) = read_response(&mut stream);

        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Connection: keep-alive\r\n"));
        assert_eq!(body, b"Hello, world!");

        // The connection stays open for further requests.
        stream.write_all(REQUEST).unwrap();
        let (head, body) = read_response(&mut stream);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert_eq!(body, b"Hello, world!");

        assert_eq!(stats.requests(), 2);
    }

    #[test]
    fn test_fault_cycle_on_one_connection() {
        // Rate 0.5 means every 2nd request faults, walking the error
        // table in order.
        let (addr, stats) = start(
            ServerConfig::default()
                .port(0)
                .num_workers(2)
                .error_rate(0.5),
        );
        let mut stream = connect(addr);

        let mut statuses = Vec::new();
        for _ in 0..4 {
            stream.write_all(REQUEST).unwrap();
            let (head, _) = read_response(&mut stream);
            statuses.push(head.lines().next().unwrap_or("").to_string());
        }

        assert_eq!(
            statuses,
            vec![
                "HTTP/1.1 200 OK",
                "HTTP/1.1 400 Bad Request",
                "HTTP/1.1 200 OK",
                "HTTP/1.1 401 Unauthorized",
            ]
        );
        assert_eq!(stats.requests(), 4);
    }

    #[test]
    fn test_incomplete_request_gets_no_answer() {
        let (addr, stats) = start(ServerConfig::default().port(0).num_workers(1));
        let mut stream = connect(addr);

        // Header block never terminates within the read; the server
        // must stay silent and count nothing.
        stream.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n").unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(300)))
            .unwrap();

        let mut chunk = [0u8; 64];
        let err = stream.read(&mut chunk).unwrap_err();
        assert!(
            matches!(
                err.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ),
            "expected a read timeout, got {:?}",
            err
        );
        assert_eq!(stats.requests(), 0);
        assert_eq!(stats.active_connections(), 1);
    }

    #[test]
    fn test_close_decrements_active_connections() {
        let (addr, stats) = start(ServerConfig::default().port(0).num_workers(1));

        let mut stream = connect(addr);
        stream.write_all(REQUEST).unwrap();
        let _ = read_response(&mut stream);
        assert_eq!(stats.active_connections(), 1);

        drop(stream);
        // The worker notices the close on its next wakeup.
        let deadline = Instant::now() + Duration::from_secs(5);
        while stats.active_connections() != 0 {
            assert!(Instant::now() < deadline, "close never observed");
            thread::sleep(Duration::from_millis(10));
        }
    }
}
