use std::env;

/// Runtime configuration, loaded from the environment with defaults
/// suitable for local development.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the WebSocket/HTTP server binds to.
    pub bind_addr: String,
    /// TLS certificate path; served plain when missing on disk.
    pub tls_cert_path: String,
    /// TLS private key path.
    pub tls_key_path: String,
    /// Quiet period after the last keystroke before a typing episode ends.
    pub typing_quiet_ms: u64,
    /// Per-kind capacity of the client notification ring buffer.
    pub notification_capacity: usize,
    /// Depth of the per-connection inbound event queue.
    pub inbound_queue_depth: usize,
    /// Initial client reconnect delay.
    pub reconnect_base_ms: u64,
    /// Reconnect delay ceiling.
    pub reconnect_cap_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:2052".into(),
            tls_cert_path: "ssl/chat/certificate.pem".into(),
            tls_key_path: "ssl/chat/private.key".into(),
            typing_quiet_ms: 1000,
            notification_capacity: 100,
            inbound_queue_depth: 64,
            reconnect_base_ms: 500,
            reconnect_cap_ms: 30_000,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("CHAT_BIND_ADDR") {
            if !v.is_empty() {
                cfg.bind_addr = v;
            }
        }
        if let Ok(v) = env::var("CHAT_TLS_CERT") {
            if !v.is_empty() {
                cfg.tls_cert_path = v;
            }
        }
        if let Ok(v) = env::var("CHAT_TLS_KEY") {
            if !v.is_empty() {
                cfg.tls_key_path = v;
            }
        }
        if let Ok(v) = env::var("CHAT_TYPING_QUIET_MS") {
            if let Ok(ms) = v.parse() {
                cfg.typing_quiet_ms = ms;
            }
        }
        if let Ok(v) = env::var("CHAT_NOTIFICATION_CAPACITY") {
            if let Ok(n) = v.parse() {
                cfg.notification_capacity = n;
            }
        }
        if let Ok(v) = env::var("CHAT_INBOUND_QUEUE_DEPTH") {
            if let Ok(n) = v.parse() {
                cfg.inbound_queue_depth = n;
            }
        }
        if let Ok(v) = env::var("CHAT_RECONNECT_BASE_MS") {
            if let Ok(ms) = v.parse() {
                cfg.reconnect_base_ms = ms;
            }
        }
        if let Ok(v) = env::var("CHAT_RECONNECT_CAP_MS") {
            if let Ok(ms) = v.parse() {
                cfg.reconnect_cap_ms = ms;
            }
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_design_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.typing_quiet_ms, 1000);
        assert!(cfg.notification_capacity > 0);
        assert!(cfg.inbound_queue_depth > 0);
    }

    #[test]
    fn reconnect_delays_come_from_the_environment() {
        env::set_var("CHAT_RECONNECT_BASE_MS", "250");
        env::set_var("CHAT_RECONNECT_CAP_MS", "5000");
        let cfg = Config::load();
        env::remove_var("CHAT_RECONNECT_BASE_MS");
        env::remove_var("CHAT_RECONNECT_CAP_MS");
        assert_eq!(cfg.reconnect_base_ms, 250);
        assert_eq!(cfg.reconnect_cap_ms, 5000);
    }
}
