use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Deadline from TCP accept until the header is fully parsed.
    pub header_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub max_sessions: Option<usize>,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 13263)),
            cert_path: PathBuf::from("./cert.pem"),
            key_path: PathBuf::from("./key.pem"),
            header_timeout: Some(Duration::from_secs(10)),
            connect_timeout: Some(Duration::from_secs(10)),
            max_sessions: None,
            log_format: LogFormat::Json,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Unset variables
    /// fall back to [`Config::default`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let listen_addr = match lookup("LISTEN_ADDR") {
            Some(raw) => raw
                .parse()
                .map_err(|e| Error::Config(format!("invalid LISTEN_ADDR: {e}")))?,
            None => defaults.listen_addr,
        };

        let cert_path = lookup("TLS_CERT_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.cert_path);
        let key_path = lookup("TLS_KEY_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.key_path);

        let header_timeout = match lookup("HEADER_TIMEOUT_SECS") {
            Some(raw) => parse_timeout("HEADER_TIMEOUT_SECS", &raw)?,
            None => defaults.header_timeout,
        };
        let connect_timeout = match lookup("CONNECT_TIMEOUT_SECS") {
            Some(raw) => parse_timeout("CONNECT_TIMEOUT_SECS", &raw)?,
            None => defaults.connect_timeout,
        };

        let max_sessions = match lookup("MAX_SESSIONS") {
            Some(raw) => {
                let n: usize = raw
                    .parse()
                    .map_err(|e| Error::Config(format!("invalid MAX_SESSIONS: {e}")))?;
                (n > 0).then_some(n)
            }
            None => defaults.max_sessions,
        };

        let log_format = match lookup("LOG_FORMAT")
            .unwrap_or_else(|| "json".into())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => {
                return Err(Error::Config(format!(
                    "invalid LOG_FORMAT '{other}': must be 'json' or 'pretty'"
                )))
            }
        };

        Ok(Config {
            listen_addr,
            cert_path,
            key_path,
            header_timeout,
            connect_timeout,
            max_sessions,
            log_format,
        })
    }
}

/// Seconds as a timeout; `0` disables it.
fn parse_timeout(key: &str, raw: &str) -> Result<Option<Duration>> {
    let secs: u64 = raw
        .parse()
        .map_err(|e| Error::Config(format!("invalid {key}: {e}")))?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.listen_addr.port(), 13263);
        assert_eq!(config.cert_path, PathBuf::from("./cert.pem"));
        assert_eq!(config.key_path, PathBuf::from("./key.pem"));
        assert_eq!(config.header_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.max_sessions, None);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("LISTEN_ADDR", "127.0.0.1:9443"),
            ("TLS_CERT_PATH", "/etc/relay/tls.crt"),
            ("HEADER_TIMEOUT_SECS", "0"),
            ("CONNECT_TIMEOUT_SECS", "3"),
            ("MAX_SESSIONS", "64"),
            ("LOG_FORMAT", "Pretty"),
        ])
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:9443".parse::<SocketAddr>().unwrap());
        assert_eq!(config.cert_path, PathBuf::from("/etc/relay/tls.crt"));
        assert_eq!(config.header_timeout, None);
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.max_sessions, Some(64));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn zero_max_sessions_means_unbounded() {
        let config = config_from(&[("MAX_SESSIONS", "0")]).unwrap();
        assert_eq!(config.max_sessions, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config_from(&[("LISTEN_ADDR", "not-an-addr")]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            config_from(&[("HEADER_TIMEOUT_SECS", "-1")]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            config_from(&[("LOG_FORMAT", "xml")]),
            Err(Error::Config(_))
        ));
    }
}
