//! Canned HTTP responses
//!
//! Every byte this server ever sends is rendered once at startup and
//! never touched again: the success response and a fixed, ordered table
//! of six error responses. `Content-Length` is computed from the
//! rendered body, so the values on the wire are always accurate.

/// Number of entries in the error-response table.
pub const ERROR_RESPONSE_COUNT: usize = 6;

const OK_BODY: &[u8] = b"Hello, world!";

/// Pre-rendered responses, shared read-only across all workers.
#[derive(Debug)]
pub struct ResponseTable {
    ok: Box<[u8]>,
    errors: [Box<[u8]>; ERROR_RESPONSE_COUNT],
}

impl ResponseTable {
    pub fn new() -> Self {
        Self {
            ok: render_ok(),
            errors: [
                render_error("400 Bad Request", &[], "Bad Request", "Invalid input"),
                render_error(
                    "401 Unauthorized",
                    &["WWW-Authenticate: Bearer realm=\"example\""],
                    "Unauthorized",
                    "Invalid token",
                ),
                render_error("403 Forbidden", &[], "Forbidden", "Access denied"),
                render_error("404 Not Found", &[], "Not Found", "Resource not found"),
                render_error(
                    "500 Internal Server Error",
                    &[],
                    "Internal Server Error",
                    "Something went wrong",
                ),
                render_error(
                    "503 Service Unavailable",
                    &["Retry-After: 3600"],
                    "Service Unavailable",
                    "Server is overloaded",
                ),
            ],
        }
    }

    /// The canned `200 OK` response.
    #[inline]
    pub fn ok(&self) -> &[u8] {
        &self.ok
    }

    /// Error response by table index; out-of-range indices wrap so the
    /// lookup can never go out of bounds.
    #[inline]
    pub fn error(&self, index: usize) -> &[u8] {
        &self.errors[index % ERROR_RESPONSE_COUNT]
    }
}

impl Default for ResponseTable {
    fn default() -> Self {
        Self::new()
    }
}

fn render_ok() -> Box<[u8]> {
    let mut resp = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Length: {}\r\n\
         Connection: keep-alive\r\n\
         Content-Type: text/plain\r\n\
         \r\n",
        OK_BODY.len()
    )
    .into_bytes();
    resp.extend_from_slice(OK_BODY);
    resp.into_boxed_slice()
}

fn render_error(status: &str, extra_headers: &[&str], error: &str, message: &str) -> Box<[u8]> {
    let body = format!("{{\"error\":\"{}\",\"message\":\"{}\"}}", error, message);
    let mut head = format!("HTTP/1.1 {}\r\n", status);
    for header in extra_headers {
        head.push_str(header);
        head.push_str("\r\n");
    }
    head.push_str("Content-Type: application/json\r\n");
    head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));

    let mut resp = head.into_bytes();
    resp.extend_from_slice(body.as_bytes());
    resp.into_boxed_slice()
}

/// True iff `buf` contains a complete header block, i.e. a blank line
/// (`\r\n\r\n`). This is the only request inspection the server does.
#[inline]
pub fn has_complete_request(buf: &[u8]) -> bool {
    buf.len() >= 4 && buf.windows(4).any(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    // Split "HTTP/1.1 ..." bytes into (head, body) at the blank line.
    fn split_response(bytes: &[u8]) -> (String, Vec<u8>) {
        let pos = bytes
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("no header terminator");
        (
            String::from_utf8_lossy(&bytes[..pos + 4]).to_string(),
            bytes[pos + 4..].to_vec(),
        )
    }

    fn content_length(head: &str) -> usize {
        head.lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .expect("no Content-Length header")
            .trim()
            .parse()
            .expect("unparseable Content-Length")
    }

    #[test]
    fn test_ok_response_bytes() {
        let table = ResponseTable::new();
        assert_eq!(
            table.ok(),
            b"HTTP/1.1 200 OK\r\nContent-Length: 13\r\nConnection: keep-alive\r\n\
              Content-Type: text/plain\r\n\r\nHello, world!"
                .as_slice()
        );
    }

    #[test]
    fn test_error_table_order() {
        let table = ResponseTable::new();
        let statuses = ["400", "401", "403", "404", "500", "503"];
        for (i, status) in statuses.iter().enumerate() {
            let (head, _) = split_response(table.error(i));
            assert!(
                head.starts_with(&format!("HTTP/1.1 {}", status)),
                "entry {} starts with {}",
                i,
                head.lines().next().unwrap_or("")
            );
        }
    }

    #[test]
    fn test_error_content_lengths_accurate() {
        let table = ResponseTable::new();
        for i in 0..ERROR_RESPONSE_COUNT {
            let (head, body) = split_response(table.error(i));
            assert_eq!(content_length(&head), body.len(), "entry {}", i);
        }
    }

    #[test]
    fn test_error_extra_headers() {
        let table = ResponseTable::new();
        let (unauthorized, _) = split_response(table.error(1));
        assert!(unauthorized.contains("WWW-Authenticate: Bearer realm=\"example\"\r\n"));

        let (unavailable, _) = split_response(table.error(5));
        assert!(unavailable.contains("Retry-After: 3600\r\n"));
    }

    #[test]
    fn test_error_index_wraps() {
        let table = ResponseTable::new();
        assert_eq!(table.error(0), table.error(ERROR_RESPONSE_COUNT));
        assert_eq!(table.error(1), table.error(ERROR_RESPONSE_COUNT + 1));
    }

    #[test]
    fn test_complete_request_detection() {
        assert!(has_complete_request(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"));
        assert!(has_complete_request(b"junk\r\n\r\ntrailing"));
        assert!(!has_complete_request(b"GET / HTTP/1.1\r\nHost: x\r\n"));
        assert!(!has_complete_request(b"\r\n"));
        assert!(!has_complete_request(b""));
    }
}
