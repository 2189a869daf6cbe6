//! # loadsink-httpd - fault-injecting HTTP/1.1 load target
//!
//! A benchmark target, not a web server: point wrk/hey/your proxy at it
//! and it answers every complete request with a canned response, with
//! optional artificial latency and a deterministic cycle of canned
//! errors mixed in.
//!
//! ## Usage
//!
//!     loadsink-httpd [port] [bg] [delay=<ms>] [errate=<rate>]
//!
//!     port        listening port, 1-65535 (default 8080)
//!     bg          background mode: no interactive debug toggle
//!     delay=250   sleep 250 ms before every response (max 5000)
//!     errate=0.1  answer ~every 10th request with a canned error
//!
//! Environment (`LOADSINK_*`) provides defaults, arguments override.
//! While running in the foreground, `d` + enter toggles debug logging
//! (full request dumps and per-connection assignment lines).
//!
//! ## Benchmark
//!
//!     wrk -t4 -c100 -d10s http://127.0.0.1:8080/

use loadsink_core::{serror, sinfo, sprintln, swarn};
use loadsink_core::{Server, ServerConfig, ServerStats};

use std::io::Read;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Reporting period for the throughput line.
const STATS_INTERVAL: Duration = Duration::from_secs(10);
/// Open-file limit to aim for; every connection costs one fd.
const FD_LIMIT_TARGET: libc::rlim_t = 100_000;

fn main() {
    loadsink_core::sprint::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match parse_args(&args) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("loadsink-httpd: {}", msg);
            process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("loadsink-httpd: {}", e);
        process::exit(1);
    }

    raise_fd_limit(FD_LIMIT_TARGET);

    let server = match Server::bind(&config) {
        Ok(server) => server,
        Err(e) => {
            serror!("startup failed on port {}: {}", config.port, e);
            process::exit(1);
        }
    };

    let stats = server.stats();
    spawn_stats_reporter(Arc::clone(&stats));

    if config.background {
        sinfo!("background mode: debug toggle disabled");
    } else {
        sprintln!("press 'd' + enter to toggle debug logging");
        spawn_debug_toggle(stats);
    }

    server.run();
}

/// First positional argument is the port; the rest are `bg`/`back`,
/// `delay=<ms>` and `errate=<rate>` in any order. A bad port is fatal,
/// everything else unrecognized is warned about and skipped.
fn parse_args(args: &[String]) -> Result<ServerConfig, String> {
    let mut config = ServerConfig::from_env();

    if let Some(port_arg) = args.first() {
        let port: u32 = port_arg
            .parse()
            .map_err(|_| format!("invalid port '{}': expected 1-65535", port_arg))?;
        if port == 0 || port > u16::MAX as u32 {
            return Err(format!("invalid port {}: expected 1-65535", port));
        }
        config = config.port(port as u16);
    }

    for arg in args.iter().skip(1) {
        if arg.contains("bg") || arg.contains("back") {
            config = config.background(true);
        } else if let Some(value) = arg.strip_prefix("delay=") {
            match value.parse::<u64>() {
                Ok(ms) => config = config.delay_ms(ms),
                Err(_) => swarn!("ignoring unparseable delay '{}'", value),
            }
        } else if let Some(value) = arg.strip_prefix("errate=") {
            match value.parse::<f32>() {
                Ok(rate) => config = config.error_rate(rate),
                Err(_) => swarn!("ignoring unparseable errate '{}'", value),
            }
        } else {
            swarn!("ignoring unknown argument '{}'", arg);
        }
    }

    Ok(config)
}

/// Raise RLIMIT_NOFILE toward `target`. Best effort: an unprivileged
/// process cannot raise its hard limit, so fall back to whatever the
/// hard limit allows. Never fatal.
fn raise_fd_limit(target: libc::rlim_t) {
    let mut current = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut current) } != 0 {
        swarn!(
            "getrlimit(RLIMIT_NOFILE) failed: {}",
            std::io::Error::last_os_error()
        );
        return;
    }
    if current.rlim_cur >= target {
        return;
    }

    let wanted = libc::rlimit {
        rlim_cur: target,
        rlim_max: current.rlim_max.max(target),
    };
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &wanted) } == 0 {
        sinfo!("raised open-file limit {} -> {}", current.rlim_cur, target);
        return;
    }

    let capped = libc::rlimit {
        rlim_cur: current.rlim_max,
        rlim_max: current.rlim_max,
    };
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &capped) } == 0 {
        sinfo!(
            "raised open-file limit {} -> {} (hard cap)",
            current.rlim_cur,
            capped.rlim_cur
        );
    } else {
        swarn!(
            "setrlimit(RLIMIT_NOFILE) failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

/// Print a timestamped throughput line every [`STATS_INTERVAL`].
fn spawn_stats_reporter(stats: Arc<ServerStats>) {
    thread::Builder::new()
        .name("loadsink-stats".into())
        .spawn(move || {
            let start = Instant::now();
            let mut last_total = 0u64;
            loop {
                thread::sleep(STATS_INTERVAL);
                let total = stats.requests();
                let rps = (total - last_total) as f64 / STATS_INTERVAL.as_secs_f64();
                sprintln!(
                    "[{:9.1}s] requests={} active={} rps={:.1}",
                    start.elapsed().as_secs_f64(),
                    total,
                    stats.active_connections(),
                    rps
                );
                last_total = total;
            }
        })
        .expect("failed to spawn stats thread");
}

/// Flip the debug flag on `d`/`D` from stdin. Exits quietly when stdin
/// closes; the flag keeps its last state.
fn spawn_debug_toggle(stats: Arc<ServerStats>) {
    thread::Builder::new()
        .name("loadsink-debug".into())
        .spawn(move || {
            let mut stdin = std::io::stdin();
            let mut byte = [0u8; 1];
            loop {
                match stdin.read(&mut byte) {
                    Ok(0) | Err(_) => return,
                    Ok(_) if matches!(byte[0], b'd' | b'D') => {
                        let enabled = stats.toggle_debug();
                        sprintln!(
                            "debug logging {}",
                            if enabled { "ENABLED" } else { "DISABLED" }
                        );
                    }
                    Ok(_) => {}
                }
            }
        })
        .expect("failed to spawn debug toggle thread");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults_without_args() {
        let config = parse_args(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert!(!config.background);
        assert_eq!(config.error_rate, 0.0);
    }

    #[test]
    fn test_port_and_options() {
        let config = parse_args(&args(&["9090", "bg", "delay=250", "errate=0.5"])).unwrap();
        assert_eq!(config.port, 9090);
        assert!(config.background);
        assert_eq!(config.delay, Duration::from_millis(250));
        assert_eq!(config.error_rate, 0.5);
        assert_eq!(config.fault_cycle(), 2);
    }

    #[test]
    fn test_invalid_ports_rejected() {
        assert!(parse_args(&args(&["0"])).is_err());
        assert!(parse_args(&args(&["99999"])).is_err());
        assert!(parse_args(&args(&["not-a-port"])).is_err());
    }

    #[test]
    fn test_out_of_range_options_clamped() {
        let config = parse_args(&args(&["8080", "delay=60000", "errate=2.5"])).unwrap();
        assert_eq!(config.delay, Duration::from_millis(5000));
        assert_eq!(config.error_rate, 1.0);
        assert!(config.validate().is_ok());
    }
}
