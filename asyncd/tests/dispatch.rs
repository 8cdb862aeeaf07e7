//! Hook chains driven over real sockets.

use asyncd::{
    Connection, Event, EventMask, HookResult, ProtocolHandler, ProtocolHooks, hook_fn, keys,
    testing::{RecordingHook, SequenceLog},
    with_userdata,
};
use std::sync::atomic::{AtomicUsize, Ordering};

mod common;
use common::{
    connect, detached_server, echo, eventually, read_n, read_to_close, reply, send, start,
};

#[tokio::test]
async fn test_echo() {
    let mut server = detached_server();
    server.register_hook(EventMask::READ, echo()).unwrap();
    let addr = start(&mut server);

    let mut client = connect(addr).await;
    send(&mut client, b"hello").await;
    assert_eq!(read_n(&mut client, 5).await, b"hello");
    send(&mut client, b"again").await;
    assert_eq!(read_n(&mut client, 5).await, b"again");

    server.stop().unwrap();
}

#[tokio::test]
async fn test_done_stops_the_chain() {
    let log = SequenceLog::new();
    let mut server = detached_server();
    server
        .register_hook(EventMask::READ, log.hook(1, HookResult::Next))
        .unwrap();
    server
        .register_hook(EventMask::READ, reply("1", HookResult::Next))
        .unwrap();
    server
        .register_hook(EventMask::READ, log.hook(2, HookResult::Next))
        .unwrap();
    server
        .register_hook(EventMask::READ, reply("2", HookResult::Done))
        .unwrap();
    server
        .register_hook(EventMask::READ, log.hook(3, HookResult::Next))
        .unwrap();
    server
        .register_hook(EventMask::READ, reply("3", HookResult::Next))
        .unwrap();
    let addr = start(&mut server);

    let mut client = connect(addr).await;
    send(&mut client, b"x").await;
    assert_eq!(read_n(&mut client, 2).await, b"12");
    assert_eq!(log.ids(), vec![1, 2]);
    assert_eq!(log.calls(3), 0);

    server.stop().unwrap();
}

#[tokio::test]
async fn test_close_flushes_pending_output() {
    let closes = RecordingHook::new();
    let mut server = detached_server();
    server
        .register_hook(EventMask::READ, reply("bye", HookResult::Close))
        .unwrap();
    server
        .register_hook(EventMask::READ, reply("never", HookResult::Next))
        .unwrap();
    server
        .register_hook(EventMask::CLOSE, closes.clone())
        .unwrap();
    let addr = start(&mut server);

    let mut client = connect(addr).await;
    send(&mut client, b"quit").await;
    assert_eq!(read_to_close(&mut client).await, b"bye");
    assert!(eventually(|| closes.count() == 1).await);
    assert_eq!(closes.events(), vec![Event::CLOSE]);

    server.stop().unwrap();
    assert_eq!(closes.count(), 1);
}

#[tokio::test]
async fn test_close_on_init() {
    let mut server = detached_server();
    server
        .register_hook(EventMask::INIT, reply("busy\n", HookResult::Close))
        .unwrap();
    let addr = start(&mut server);

    let mut client = connect(addr).await;
    assert_eq!(read_to_close(&mut client).await, b"busy\n");

    server.stop().unwrap();
}

struct Framed {
    log: SequenceLog,
}

impl ProtocolHandler for Framed {
    fn name(&self) -> &str {
        "framed"
    }

    fn install(&self, hooks: &mut ProtocolHooks<'_>) {
        hooks.register(EventMask::READ | EventMask::CLOSE, self.log.hook(1, HookResult::Next));
    }
}

#[tokio::test]
async fn test_takeover_bypasses_protocol_hooks() {
    let log = SequenceLog::new();
    let mut server = detached_server();
    server
        .register_protocol_handler(Framed { log: log.clone() })
        .unwrap();
    server.set_option(keys::PROTOCOL_HANDLER, "framed").unwrap();
    server
        .register_hook(
            EventMask::READ,
            with_userdata(
                |_, conn, reads: &AtomicUsize| {
                    conn.input_mut().clear();
                    conn.write(b"ack");
                    if reads.fetch_add(1, Ordering::SeqCst) == 0 {
                        HookResult::Takeover
                    } else {
                        HookResult::Done
                    }
                },
                AtomicUsize::new(0),
            ),
        )
        .unwrap();
    let addr = start(&mut server);

    let mut client = connect(addr).await;
    send(&mut client, b"a").await;
    assert_eq!(read_n(&mut client, 3).await, b"ack");
    send(&mut client, b"b").await;
    assert_eq!(read_n(&mut client, 3).await, b"ack");
    drop(client);

    server.stop().unwrap();
    // only the first READ reached the protocol layer; the CLOSE never did
    assert_eq!(log.entries(), vec![(1, Event::Read)]);
}

#[tokio::test]
async fn test_method_filtered_hooks() {
    let mut server = detached_server();
    server
        .register_hook(
            EventMask::READ,
            hook_fn(|_, conn| {
                let input: &[u8] = conn.input();
                let method = input
                    .split(|b| *b == b' ')
                    .next()
                    .map(|word| String::from_utf8_lossy(word).into_owned());
                conn.set_method(method);
                HookResult::Next
            }),
        )
        .unwrap();
    server
        .register_hook_on_method("GET", EventMask::READ, reply("get", HookResult::Done))
        .unwrap();
    server
        .register_hook_on_method("POST", EventMask::READ, reply("post", HookResult::Done))
        .unwrap();
    let addr = start(&mut server);

    let mut client = connect(addr).await;
    send(&mut client, b"POST /x").await;
    assert_eq!(read_n(&mut client, 4).await, b"post");
    send(&mut client, b"GET /y").await;
    assert_eq!(read_n(&mut client, 3).await, b"get");

    server.stop().unwrap();
}

#[tokio::test]
async fn test_write_fires_after_output_drains() {
    let writes = RecordingHook::new();
    let mut server = detached_server();
    server
        .register_hook(EventMask::READ, reply("pong", HookResult::Done))
        .unwrap();
    server
        .register_hook(EventMask::WRITE, writes.clone())
        .unwrap();
    let addr = start(&mut server);

    let mut client = connect(addr).await;
    send(&mut client, b"ping").await;
    assert_eq!(read_n(&mut client, 4).await, b"pong");
    assert!(eventually(|| writes.count() == 1).await);
    assert_eq!(writes.events(), vec![Event::Write]);

    server.stop().unwrap();
}

#[tokio::test]
async fn test_connection_state_is_per_connection() {
    struct Greeted;

    let mut server = detached_server();
    server
        .register_hook(
            EventMask::INIT | EventMask::READ,
            hook_fn(|event, conn| {
                if event == Event::Init {
                    conn.extensions_mut().insert(Greeted);
                    return HookResult::Next;
                }
                conn.input_mut().clear();
                let id = conn.id().0;
                let greeted = conn.extensions().get::<Greeted>().is_some();
                conn.write(format!("{id}:{greeted};").as_bytes());
                HookResult::Done
            }),
        )
        .unwrap();
    let addr = start(&mut server);

    let mut first = connect(addr).await;
    send(&mut first, b".").await;
    assert_eq!(read_n(&mut first, 7).await, b"1:true;");

    let mut second = connect(addr).await;
    send(&mut second, b".").await;
    assert_eq!(read_n(&mut second, 7).await, b"2:true;");

    server.stop().unwrap();
}
