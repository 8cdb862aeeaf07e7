#![allow(dead_code)]

use asyncd::{Connection, Hook, HookResult, ListenAddr, Server, hook_fn, keys};
use std::{net::SocketAddr, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::{sleep, timeout},
};

pub const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Servers
// ============================================================================

/// A detached server on an ephemeral loopback port.
pub fn detached_server() -> Server {
    let mut server = loopback_server();
    server.set_option(keys::START_DETACHED, "1").unwrap();
    server
}

/// A synchronous server on an ephemeral loopback port.
pub fn loopback_server() -> Server {
    let mut server = Server::new();
    server.set_option(keys::ADDR, "127.0.0.1").unwrap();
    server.set_option(keys::PORT, "0").unwrap();
    server
}

/// Start a detached server and return its TCP address.
pub fn start(server: &mut Server) -> SocketAddr {
    server.start().expect("server should start");
    tcp_addr(server.local_addr())
}

pub fn tcp_addr(addr: Option<ListenAddr>) -> SocketAddr {
    match addr {
        Some(ListenAddr::Inet(addr)) => addr,
        other => panic!("not a TCP listener: {other:?}"),
    }
}

// ============================================================================
// Hooks
// ============================================================================

/// Writes every input chunk back.
pub fn echo() -> impl Hook {
    hook_fn(|_, conn| {
        let input = conn.input_mut().split();
        conn.write(&input);
        HookResult::Done
    })
}

/// Discards the input, writes `text` and returns `result`.
pub fn reply(text: &'static str, result: HookResult) -> impl Hook {
    hook_fn(move |_, conn| {
        conn.input_mut().clear();
        conn.write(text.as_bytes());
        result
    })
}

// ============================================================================
// Clients
// ============================================================================

pub async fn connect(addr: SocketAddr) -> TcpStream {
    timeout(WAIT, TcpStream::connect(addr))
        .await
        .expect("connect timed out")
        .expect("connect failed")
}

pub async fn send(stream: &mut TcpStream, bytes: &[u8]) {
    stream.write_all(bytes).await.expect("write failed");
}

pub async fn read_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0; n];
    timeout(WAIT, stream.read_exact(&mut buf))
        .await
        .expect("read timed out")
        .expect("read failed");
    buf
}

/// Read until the server closes the connection.
pub async fn read_to_close(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut buf))
        .await
        .expect("server did not close the connection")
        .expect("read failed");
    buf
}

// ============================================================================
// Waiting
// ============================================================================

/// Poll `condition` until it holds or [`WAIT`] elapses.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let polls = WAIT.as_millis() / 10;
    for _ in 0..polls {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Blocking flavor of [`eventually`].
pub fn eventually_blocking(condition: impl Fn() -> bool) -> bool {
    let polls = WAIT.as_millis() / 10;
    for _ in 0..polls {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
