use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tracing::warn;

const DEFAULT_PORT: u16 = 8000;

/// Settings that only matter to the HTTP server. Engine settings come from
/// [`ytscribe::Settings::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: IpAddr,
    pub port: u16,
    /// Load the speech model in the background right after startup.
    pub preload_model: bool,
    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            preload_model: false,
            json_logs: false,
        }
    }
}

impl ServerSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Bad values keep their defaults and log a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(host) = lookup("HOST") {
            match host.trim().parse() {
                Ok(ip) => settings.host = ip,
                Err(_) => warn!(value = %host, "ignoring invalid HOST"),
            }
        }
        if let Some(port) = lookup("PORT") {
            match port.trim().parse() {
                Ok(p) => settings.port = p,
                Err(_) => warn!(value = %port, "ignoring invalid PORT"),
            }
        }
        settings.preload_model = lookup("PRELOAD_MODEL").is_some_and(|v| is_truthy(&v));
        settings.json_logs = is_json(lookup("LOG_FORMAT").as_deref());

        settings
    }

    /// `LOG_FORMAT` alone, for setting up logging before anything else is read.
    pub fn json_logs_from_env() -> bool {
        is_json(std::env::var("LOG_FORMAT").ok().as_deref())
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn is_json(format: Option<&str>) -> bool {
    format.is_some_and(|v| v.trim().eq_ignore_ascii_case("json"))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
