//! Usage: Parse the control API listen address (host, host:port, [ipv6]:port).

use crate::shared::error::{AppError, AppResult};

pub(crate) const DEFAULT_LISTEN_PORT: u16 = 8888;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedListenAddress {
    pub(crate) host: String,
    pub(crate) port: u16,
}

impl ParsedListenAddress {
    pub(crate) fn bind_addr(&self) -> String {
        format_host_port(&self.host, self.port)
    }
}

pub(crate) fn is_wildcard_host(host: &str) -> bool {
    matches!(host.trim(), "0.0.0.0" | "::")
}

pub(crate) fn format_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

fn parse_port(raw: &str) -> AppResult<u16> {
    let port: u16 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::invalid_input("invalid listen port"))?;
    // 0 asks the OS for an ephemeral port.
    if port != 0 && port < 1024 {
        return Err(AppError::invalid_input("listen port must be >= 1024"));
    }
    Ok(port)
}

pub(crate) fn parse_listen_address(input: &str) -> AppResult<ParsedListenAddress> {
    let raw = input.trim();
    if raw.is_empty() {
        return Ok(ParsedListenAddress {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_LISTEN_PORT,
        });
    }
    if raw.contains("://") || raw.contains('/') {
        return Err(AppError::invalid_input(
            "listen address must be host or host:port",
        ));
    }

    if let Some(rest) = raw.strip_prefix('[') {
        let idx = rest
            .find(']')
            .ok_or_else(|| AppError::invalid_input("invalid IPv6 address: missing closing ']'"))?;
        let host = rest[..idx].trim();
        if host.is_empty() {
            return Err(AppError::invalid_input("listen address missing host"));
        }
        let tail = rest[idx + 1..].trim();
        if tail.is_empty() {
            return Ok(ParsedListenAddress {
                host: host.to_string(),
                port: DEFAULT_LISTEN_PORT,
            });
        }
        let port_raw = tail
            .strip_prefix(':')
            .ok_or_else(|| AppError::invalid_input("listen address must be [ipv6]:port"))?;
        return Ok(ParsedListenAddress {
            host: host.to_string(),
            port: parse_port(port_raw)?,
        });
    }

    match raw.split(':').collect::<Vec<_>>().as_slice() {
        [host] => Ok(ParsedListenAddress {
            host: host.trim().to_string(),
            port: DEFAULT_LISTEN_PORT,
        }),
        [host, port_raw] => {
            let host = host.trim();
            if host.is_empty() {
                return Err(AppError::invalid_input("listen address missing host"));
            }
            Ok(ParsedListenAddress {
                host: host.to_string(),
                port: parse_port(port_raw)?,
            })
        }
        _ => Err(AppError::invalid_input("IPv6 must use [addr]:port")),
    }
}
