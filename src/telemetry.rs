//! Tracing setup and span constructors.

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` overrides the `info`
/// default; `json` switches to structured output.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Standardized span constructors for client observability.
pub mod spans {
    use crate::client::RemoteAddr;
    use tracing::{Span, info_span};

    /// Span covering one transport's read loop.
    pub fn connection(transport: u64, remote: &RemoteAddr) -> Span {
        info_span!(
            "connection",
            transport,
            host = %remote.hostname,
            port = remote.port,
            tls = remote.tls
        )
    }

    /// Span covering a WebSocket transport's read loop.
    pub fn websocket(url: &str) -> Span {
        info_span!("websocket", url = %url)
    }
}
