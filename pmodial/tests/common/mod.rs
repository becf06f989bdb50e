//! Minimal scripted HTTP device stub for integration tests.
//!
//! Plain TcpListener + threads; each connection is served until the client
//! closes it, so agent connection reuse works.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    /// Path including the query string, exactly as sent.
    pub path: String,
    pub body: String,
}

pub struct StubServer {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<Request>>>,
}

pub fn bind() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").expect("bind stub listener")
}

/// Starts serving `handler` on `listener`. The handler returns the complete
/// HTTP response bytes for each request.
pub fn serve<F>(listener: TcpListener, handler: F) -> StubServer
where
    F: Fn(&Request) -> String + Send + Sync + 'static,
{
    let addr = listener.local_addr().expect("stub addr");
    let requests: Arc<Mutex<Vec<Request>>> = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);
    let recorded = Arc::clone(&requests);

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let handler = Arc::clone(&handler);
            let recorded = Arc::clone(&recorded);
            std::thread::spawn(move || {
                let _ = handle_connection(stream, handler, recorded);
            });
        }
    });

    StubServer { addr, requests }
}

fn handle_connection(
    stream: TcpStream,
    handler: Arc<dyn Fn(&Request) -> String + Send + Sync>,
    recorded: Arc<Mutex<Vec<Request>>>,
) -> std::io::Result<()> {
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);

    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line)? == 0 {
            return Ok(()); // client closed the connection
        }
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
            return Ok(());
        };
        let method = method.to_string();
        let path = path.to_string();

        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                return Ok(());
            }
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
        }

        let mut body = vec![0u8; content_length];
        if content_length > 0 {
            reader.read_exact(&mut body)?;
        }

        let request = Request {
            method,
            path,
            body: String::from_utf8_lossy(&body).into_owned(),
        };
        recorded.lock().unwrap().push(request.clone());

        let response = handler(&request);
        writer.write_all(response.as_bytes())?;
        writer.flush()?;
    }
}

/// Builds a full HTTP/1.1 response with a correct Content-Length.
pub fn http_response(status_line: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut out = format!("HTTP/1.1 {status_line}\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    out
}

pub fn not_found() -> String {
    http_response("404 Not Found", &[("Content-Type", "text/plain")], "")
}
