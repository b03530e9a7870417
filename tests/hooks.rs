//! Integration tests for operation interceptors.

mod common;

use common::{Plan, Recorded, ScriptedStream, mock_client, within};
use parking_lot::Mutex;
use slircc::hooks::Operation;
use slircc::{ConnectOptions, Hook, RemoteAddr};
use std::sync::Arc;

#[tokio::test]
async fn test_short_circuit_send_bypasses_transport() {
    let (client, server, log) = mock_client();
    let stream = ScriptedStream::new();
    let written = stream.written();
    server.plan(Plan::Scripted(stream));
    client
        .connect("irc.test", 6667, ConnectOptions::default())
        .await
        .unwrap();

    client.hook_call(Hook::send(|_client, args, _next| async move {
        Some(format!("intercepted {}", args.command))
    }));

    let sent = client.send("PRIVMSG", ["#chan", "hello"]).await;
    assert_eq!(sent.as_deref(), Some("intercepted PRIVMSG"));
    assert!(written.lock().is_empty());
    assert!(log.errors().is_empty());
}

#[tokio::test]
async fn test_wrapping_interceptor_can_rewrite_arguments() {
    let (client, mut server, _log) = mock_client();
    client
        .connect("irc.test", 6667, ConnectOptions::default())
        .await
        .unwrap();
    let mut conn = server.accept().await;

    client.hook_call(Hook::send(|client, mut args, next| async move {
        if args.command == "PRIVMSG" {
            if let Some(Some(text)) = args.params.last_mut() {
                text.insert_str(0, "[bot] ");
            }
        }
        next.run(client, args).await
    }));

    let sent = client.send("PRIVMSG", ["#chan", "hi"]).await;
    assert_eq!(sent.as_deref(), Some("PRIVMSG #chan :[bot] hi\r\n"));
    assert_eq!(conn.read_line().await, "PRIVMSG #chan :[bot] hi\r\n");
}

#[tokio::test]
async fn test_most_recent_interceptor_runs_outermost() {
    let (client, mut server, _log) = mock_client();
    client
        .connect("irc.test", 6667, ConnectOptions::default())
        .await
        .unwrap();
    let mut conn = server.accept().await;

    let order = Arc::new(Mutex::new(Vec::new()));
    for tag in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        client.hook_call(Hook::send(move |client, args, next| {
            order.lock().push(tag);
            next.run(client, args)
        }));
    }
    assert_eq!(client.hooks().count(Operation::Send), 3);

    client.send("PING", ["x"]).await.unwrap();
    assert_eq!(*order.lock(), ["third", "second", "first"]);
    assert_eq!(conn.read_line().await, "PING x\r\n");
}

#[tokio::test]
async fn test_connect_veto_never_opens_transport() {
    let (client, server, log) = mock_client();

    client.hook_call(Hook::connect(|_client, _args, _next| async { None }));

    let connected = client
        .connect("irc.test", 6667, ConnectOptions::default())
        .await;
    assert_eq!(connected, None);
    assert!(server.attempts().is_empty());
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_connect_interceptor_can_redirect() {
    let (client, mut server, log) = mock_client();

    client.hook_call(Hook::connect(|client, mut args, next| async move {
        args.hostname = "fallback.test".into();
        args.port = 7000;
        next.run(client, args).await
    }));

    let connected = client
        .connect("irc.test", 6667, ConnectOptions::default())
        .await;
    let _conn = server.accept().await;

    let expected = RemoteAddr::new("fallback.test", 7000, false);
    assert_eq!(connected, Some(expected.clone()));
    assert_eq!(server.attempts(), vec![expected.clone()]);
    assert_eq!(log.entries()[0], Recorded::Connecting(expected));
}

#[tokio::test]
async fn test_disconnect_interceptor_observes_and_calls_through() {
    let (client, mut server, log) = mock_client();
    client
        .connect("irc.test", 6667, ConnectOptions::default())
        .await
        .unwrap();
    let _conn = server.accept().await;

    let seen_connected = Arc::new(Mutex::new(None));
    {
        let seen = Arc::clone(&seen_connected);
        client.hook_call(Hook::disconnect(move |client, (), next| {
            *seen.lock() = Some(client.is_connected());
            next.run(client, ())
        }));
    }

    within(client.disconnect()).await;
    assert_eq!(*seen_connected.lock(), Some(true));
    assert_eq!(log.disconnects(), 1);
    assert!(!client.is_connected());
}
