//! Black-box loopback tests: a real TCP client talks to a real `Listener`
//! over `127.0.0.1`, exercising the dialogue scenarios end to end rather
//! than poking at `ServerFsm` directly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::io::{AsyncReadExt, AsyncWriteExt};
use smol::net::TcpStream;

use smtp_server::{Envelope, Listener};

async fn read_reply(stream: &mut TcpStream) -> String {
    let mut buf = [0u8; 1024];
    let mut acc = Vec::new();
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        acc.extend_from_slice(&buf[..n]);
        if acc.ends_with(b"\r\n") {
            // Multi-line replies share a code and use `-` on every line but
            // the last; for this crate's fixed replies a single read is
            // always a single complete line, so this is good enough.
            break;
        }
    }
    String::from_utf8(acc).unwrap()
}

async fn send(stream: &mut TcpStream, line: &str) {
    stream.write_all(line.as_bytes()).await.unwrap();
    stream.write_all(b"\r\n").await.unwrap();
}

#[test]
fn full_session_delivers_expected_envelope() {
    smol::block_on(async {
        let received: Arc<Mutex<Vec<Envelope>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let mut listener = Listener::new(Some("127.0.0.1".to_owned()), 0, "test.example", false);
        listener.hooks().on_mail(move |e| sink.lock().unwrap().push(e));
        let addr = listener.start().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        assert!(read_reply(&mut client).await.starts_with("220 "));

        send(&mut client, "EHLO x").await;
        assert_eq!(read_reply(&mut client).await, "250 Go on.\r\n");

        send(&mut client, "MAIL FROM: <a@b>").await;
        assert_eq!(read_reply(&mut client).await, "250 OK\r\n");

        send(&mut client, "RCPT TO: <c@d>").await;
        assert_eq!(read_reply(&mut client).await, "250 OK\r\n");

        send(&mut client, "DATA").await;
        assert_eq!(
            read_reply(&mut client).await,
            "354 End data with <CR><LF>.<CR><LF>\r\n"
        );

        client.write_all(b"hello\r\n.\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, "250 I'll take it\r\n");

        send(&mut client, "QUIT").await;
        assert_eq!(read_reply(&mut client).await, "221 Bye.\r\n");

        // Give the server task a moment to run its disconnect cleanup
        // before we assert on delivered mail.
        smol::Timer::after(Duration::from_millis(50)).await;

        let envelopes = received.lock().unwrap();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].from, "a@b");
        assert_eq!(envelopes[0].to, vec!["c@d".to_string()]);
        assert_eq!(envelopes[0].data, b"hello\r\n");

        listener.stop().await;
    });
}

#[test]
fn multiple_recipients_are_all_recorded() {
    smol::block_on(async {
        let received: Arc<Mutex<Vec<Envelope>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let mut listener = Listener::new(Some("127.0.0.1".to_owned()), 0, "test.example", false);
        listener.hooks().on_mail(move |e| sink.lock().unwrap().push(e));
        let addr = listener.start().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        read_reply(&mut client).await;
        send(&mut client, "HELO x").await;
        read_reply(&mut client).await;
        send(&mut client, "MAIL FROM:<a@b>").await;
        read_reply(&mut client).await;
        send(&mut client, "RCPT TO:<c@d>").await;
        read_reply(&mut client).await;
        send(&mut client, "RCPT TO:<e@f>").await;
        read_reply(&mut client).await;
        send(&mut client, "DATA").await;
        read_reply(&mut client).await;
        client.write_all(b"body\r\n.\r\n").await.unwrap();
        read_reply(&mut client).await;

        smol::Timer::after(Duration::from_millis(50)).await;
        let envelopes = received.lock().unwrap();
        assert_eq!(envelopes[0].to, vec!["c@d".to_string(), "e@f".to_string()]);

        listener.stop().await;
    });
}

#[test]
fn unknown_verb_does_not_kill_the_connection() {
    smol::block_on(async {
        let mut listener = Listener::new(Some("127.0.0.1".to_owned()), 0, "test.example", false);
        let addr = listener.start().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        read_reply(&mut client).await;

        send(&mut client, "FOO").await;
        assert_eq!(read_reply(&mut client).await, "500 Learn to type!\r\n");

        send(&mut client, "HELO again").await;
        assert_eq!(read_reply(&mut client).await, "250 Go on.\r\n");

        listener.stop().await;
    });
}

#[test]
fn mail_before_helo_is_rejected_and_state_unchanged() {
    smol::block_on(async {
        let mut listener = Listener::new(Some("127.0.0.1".to_owned()), 0, "test.example", false);
        let addr = listener.start().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        read_reply(&mut client).await;

        send(&mut client, "MAIL FROM:<a@b>").await;
        assert_eq!(
            read_reply(&mut client).await,
            "503 Error: send HELO/EHLO first\r\n"
        );

        listener.stop().await;
    });
}

#[test]
fn data_without_rcpt_is_rejected() {
    smol::block_on(async {
        let mut listener = Listener::new(Some("127.0.0.1".to_owned()), 0, "test.example", false);
        let addr = listener.start().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        read_reply(&mut client).await;
        send(&mut client, "HELO x").await;
        read_reply(&mut client).await;
        send(&mut client, "MAIL FROM:<a@b>").await;
        read_reply(&mut client).await;

        send(&mut client, "DATA").await;
        assert_eq!(
            read_reply(&mut client).await,
            "554 Error: need RCPT command\r\n"
        );

        listener.stop().await;
    });
}
