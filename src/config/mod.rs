use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub udp: UdpConfig,
    #[serde(default)]
    pub tcp: TcpConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

/// HTTP server hosting the WebSocket transport and the diagnostics API.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UdpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_udp_port")]
    pub port: u16,
    /// Max inbound datagram size in bytes
    #[serde(default = "default_max_datagram")]
    pub max_datagram_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TcpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_tcp_port")]
    pub port: u16,
    /// Per-write timeout so one slow reader only stalls its own connection
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
    /// Depth of each connection's outbound channel
    #[serde(default = "default_conn_buffer")]
    pub send_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Broadcast queue depth; producers drop events beyond this
    #[serde(default = "default_broadcast_depth")]
    pub broadcast_queue_depth: usize,
    /// Register/unregister queue depth
    #[serde(default = "default_control_depth")]
    pub control_queue_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Messages replayed to a client when it joins a room
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Depth of each WebSocket connection's outbound channel
    #[serde(default = "default_conn_buffer")]
    pub send_buffer: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_udp_port() -> u16 {
    9000
}

fn default_tcp_port() -> u16 {
    9001
}

fn default_max_datagram() -> usize {
    8192
}

fn default_write_timeout() -> u64 {
    5000
}

fn default_conn_buffer() -> usize {
    32
}

fn default_broadcast_depth() -> usize {
    100
}

fn default_control_depth() -> usize {
    16
}

fn default_history_limit() -> usize {
    50
}

impl Settings {
    pub fn new() -> Result<Self> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("udp.port", 9000)?
            .set_default("tcp.port", 9001)?
            .set_default("hub.broadcast_queue_depth", 100)?
            .set_default("chat.history_limit", 50)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SERVER_HOST, SERVER_PORT, UDP_PORT, TCP_PORT, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl UdpConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl TcpConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_http_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_udp_port(),
            max_datagram_bytes: default_max_datagram(),
        }
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_tcp_port(),
            write_timeout_ms: default_write_timeout(),
            send_buffer: default_conn_buffer(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            broadcast_queue_depth: default_broadcast_depth(),
            control_queue_depth: default_control_depth(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            send_buffer: default_conn_buffer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let hub = HubConfig::default();
        assert_eq!(hub.broadcast_queue_depth, 100);
        assert_eq!(hub.control_queue_depth, 16);

        let tcp = TcpConfig::default();
        assert_eq!(tcp.write_timeout_ms, 5000);
    }

    #[test]
    fn addr_formatting() {
        let settings = Settings {
            server: ServerConfig::default(),
            udp: UdpConfig::default(),
            tcp: TcpConfig::default(),
            hub: HubConfig::default(),
            chat: ChatConfig::default(),
        };
        assert_eq!(settings.server_addr(), "0.0.0.0:8080");
        assert_eq!(settings.udp.addr(), "0.0.0.0:9000");
        assert_eq!(settings.tcp.addr(), "0.0.0.0:9001");
    }
}
