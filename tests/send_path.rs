//! Integration tests for the outbound path: encoding, escaping and write
//! failures.

mod common;

use common::{Plan, ScriptedStream, mock_client, settle, within};
use slircc::{ConnectOptions, ErrorKind, SendArgs};

#[tokio::test]
async fn test_send_returns_exact_wire_line() {
    let (client, mut server, log) = mock_client();
    client
        .connect("irc.test", 6667, ConnectOptions::default())
        .await
        .unwrap();
    let mut conn = server.accept().await;

    let sent = client.send("PRIVMSG", ["#chan", "hello world"]).await;
    assert_eq!(sent.as_deref(), Some("PRIVMSG #chan :hello world\r\n"));
    assert_eq!(conn.read_line().await, "PRIVMSG #chan :hello world\r\n");

    let sent = client.send("JOIN", ["#chan"]).await;
    assert_eq!(sent.as_deref(), Some("JOIN #chan\r\n"));
    assert_eq!(conn.read_line().await, "JOIN #chan\r\n");

    assert!(log.errors().is_empty());
}

#[tokio::test]
async fn test_trailing_parameter_escaping() {
    let (client, mut server, _log) = mock_client();
    client
        .connect("irc.test", 6667, ConnectOptions::default())
        .await
        .unwrap();
    let mut conn = server.accept().await;

    for (param, wire) in [
        ("plain", "PRIVMSG #c plain\r\n"),
        ("", "PRIVMSG #c :\r\n"),
        (":smile", "PRIVMSG #c ::smile\r\n"),
        (" leading", "PRIVMSG #c : leading\r\n"),
        ("trailing ", "PRIVMSG #c :trailing \r\n"),
    ] {
        let sent = client.send("PRIVMSG", ["#c", param]).await;
        assert_eq!(sent.as_deref(), Some(wire));
        assert_eq!(conn.read_line().await, wire);
    }
}

#[tokio::test]
async fn test_absent_trailing_parameters_are_dropped() {
    let (client, mut server, _log) = mock_client();
    client
        .connect("irc.test", 6667, ConnectOptions::default())
        .await
        .unwrap();
    let mut conn = server.accept().await;

    let sent = client.send("TOPIC", [Some("#chan"), None, None]).await;
    assert_eq!(sent.as_deref(), Some("TOPIC #chan\r\n"));
    assert_eq!(conn.read_line().await, "TOPIC #chan\r\n");

    let sent = client.send_raw(&["MODE", "#chan", "+o", "nick"]).await;
    assert_eq!(sent.as_deref(), Some("MODE #chan +o nick\r\n"));
    assert_eq!(conn.read_line().await, "MODE #chan +o nick\r\n");

    let sent = client.send_args(SendArgs::new("QUIT", [None::<&str>])).await;
    assert_eq!(sent.as_deref(), Some("QUIT\r\n"));
    assert_eq!(conn.read_line().await, "QUIT\r\n");
}

#[tokio::test]
async fn test_send_while_disconnected_writes_nothing() {
    let (client, _server, log) = mock_client();

    assert_eq!(client.send("PING", ["x"]).await, None);

    assert_eq!(
        log.errors(),
        vec![(
            ErrorKind::Write,
            "write: unable to send message: not connected".to_string()
        )]
    );
}

#[tokio::test]
async fn test_line_injection_is_rejected() {
    let (client, server, log) = mock_client();
    let stream = ScriptedStream::new();
    let written = stream.written();
    server.plan(Plan::Scripted(stream));
    client
        .connect("irc.test", 6667, ConnectOptions::default())
        .await
        .unwrap();

    let sent = client.send("PRIVMSG", ["#chan", "hi\r\nQUIT :bye"]).await;
    assert_eq!(sent, None);
    assert!(written.lock().is_empty());

    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, ErrorKind::Write);
    assert!(errors[0].1.contains("illegal control character"));
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_empty_send_raw_is_write_error() {
    let (client, _server, log) = mock_client();
    assert_eq!(client.send_raw(&[]).await, None);
    assert_eq!(log.errors()[0], (ErrorKind::Write, "write: empty command".into()));
}

#[tokio::test]
async fn test_concurrent_sends_do_not_interleave() {
    let (client, mut server, _log) = mock_client();
    client
        .connect("irc.test", 6667, ConnectOptions::default())
        .await
        .unwrap();
    let mut conn = server.accept().await;

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let client = client.clone();
            let text = format!("message {i}");
            tokio::spawn(async move { client.send("PRIVMSG", ["#c".to_string(), text]).await })
        })
        .collect();
    for task in tasks {
        assert!(within(task).await.unwrap().is_some());
    }

    let mut seen = Vec::new();
    for _ in 0..20 {
        let line = conn.read_line().await;
        assert!(line.starts_with("PRIVMSG #c :message "), "{line:?}");
        assert!(line.ends_with("\r\n"));
        seen.push(line);
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 20);
}

#[tokio::test]
async fn test_unsafe_middle_parameter_is_write_error() {
    let (client, server, log) = mock_client();
    let stream = ScriptedStream::new();
    let written = stream.written();
    server.plan(Plan::Scripted(stream));
    client
        .connect("irc.test", 6667, ConnectOptions::default())
        .await
        .unwrap();

    let sent = client.send("KICK", ["#chan", "two words", "bye"]).await;
    assert_eq!(sent, None);
    assert!(written.lock().is_empty());
    assert_eq!(
        log.errors(),
        vec![(
            ErrorKind::Write,
            "write: invalid parameter 1: contains a space".to_string()
        )]
    );
}

#[tokio::test]
async fn test_disconnect_does_not_wait_for_stuck_write() {
    let (client, mut server, log) = mock_client();
    client
        .connect("irc.test", 6667, ConnectOptions::default())
        .await
        .unwrap();
    // Never read: the pipe fills and the write blocks.
    let _conn = server.accept().await;

    let sender = client.clone();
    let payload = "x".repeat(200 * 1024);
    let stuck = tokio::spawn(async move { sender.send("PRIVMSG", ["#c".to_string(), payload]).await });
    settle().await;
    assert!(!stuck.is_finished());

    within(client.disconnect()).await;
    assert_eq!(within(stuck).await.unwrap(), None);

    assert!(!client.is_connected());
    assert_eq!(log.disconnects(), 1);
    assert!(log.errors().is_empty());
}
