//! Options shared by every command that talks to a running gateway.

use url::Url;

/// Default cap on a single message received from the gateway: 100 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

#[derive(Debug, Clone, clap::Parser)]
pub struct ClientConfig {
    /// The gateway to connect to.
    #[clap(
        short = 'H',
        long = "host",
        env = "GATEWAY_HOST_URL",
        default_value = "http://127.0.0.1:8888",
        value_parser = parse_host_url,
        action
    )]
    pub host_url: Url,

    /// Largest single message accepted from the gateway, in bytes.
    #[clap(
        long = "max-message-size",
        env = "GATEWAY_MAX_MESSAGE_SIZE",
        default_value_t = DEFAULT_MAX_MESSAGE_SIZE,
        action
    )]
    pub max_message_size: usize,
}

fn parse_host_url(s: &str) -> Result<Url, String> {
    let url = Url::parse(s).map_err(|e| format!("invalid host url '{s}': {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!(
            "invalid host url '{s}': scheme must be http or https, got '{other}'"
        )),
    }
}
