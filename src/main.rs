//! slircc - Straylight IRC Client
//!
//! Connects to the configured server, registers, logs traffic and stays
//! connected until Ctrl-C or until the server closes the connection.

use slircc::events::names;
use slircc::{Client, Config, ConnectOptions, WebSocketPlugin};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "slircc.toml".to_string());

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            slircc::telemetry::init(false);
            error!(path = %config_path, error = %e, "Failed to load config");
            return Err(e.into());
        }
    };

    slircc::telemetry::init(config.log.json);

    info!(
        server = %config.server.hostname,
        tls = config.server.tls,
        websocket = config.client.websocket,
        "Starting slircc"
    );

    let client = Client::builder(config.clone())
        .plugin(WebSocketPlugin)
        .build()?;

    client.on(names::ERROR, |event| {
        if let Some(err) = event.as_error() {
            warn!(kind = %err.kind, code = err.error_code(), error = %err, "Client error");
        }
    });

    client.on(names::RAW, |event| {
        if let Some(msg) = event.as_raw() {
            debug!(command = %msg.command, "<- {}", msg);
        }
    });

    // Register once the transport is up.
    {
        let sender = client.clone();
        let identity = config.identity.clone();
        client.on(names::CONNECTED, move |_| {
            let sender = sender.clone();
            let identity = identity.clone();
            tokio::spawn(async move {
                sender.send("NICK", [identity.nick.as_str()]).await;
                sender
                    .send(
                        "USER",
                        [
                            identity.username.as_str(),
                            "0",
                            "*",
                            identity.realname.as_str(),
                        ],
                    )
                    .await;
            });
        });
    }

    // Answer server keepalives.
    {
        let sender = client.clone();
        client.on(&names::raw("PING"), move |event| {
            let Some(token) = event.as_raw().and_then(|msg| msg.trailing()).map(str::to_owned)
            else {
                return;
            };
            let sender = sender.clone();
            tokio::spawn(async move {
                sender.send("PONG", [token]).await;
            });
        });
    }

    client.on("raw:001", |event| {
        if let Some(msg) = event.as_raw() {
            info!(server = ?msg.prefix, nick = ?msg.param(0), "Registered");
        }
    });

    let disconnected = client.wait(names::DISCONNECTED);

    let port = config.server.resolved_port(config.client.websocket);
    let options = ConnectOptions {
        tls: config.server.tls,
        path: config.server.path.clone(),
    };
    if client
        .connect(config.server.hostname.as_str(), port, options)
        .await
        .is_none()
    {
        anyhow::bail!("failed to connect to {}:{}", config.server.hostname, port);
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            client.send("QUIT", ["Client exiting"]).await;
            client.disconnect().await;
        }
        _ = disconnected => {
            info!("Server closed the connection");
        }
    }

    Ok(())
}
