// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Interface specifier parsing and host/port validation.

use std::net::SocketAddr;

use tokio::net::lookup_host;
use wsa_core::{WsaError, WsaResult};

pub const DEFAULT_COMMAND_PORT: u16 = 37001;
pub const DEFAULT_DATA_PORT: u16 = 37000;

const TCPIP_METHOD: &str = "TCPIP";
const USB_METHOD: &str = "USB";
const FIELD_SEPARATOR: &str = "::";

/// Host plus the two instrument ports parsed from an interface specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentEndpoints {
    pub host: String,
    pub command_port: u16,
    pub data_port: u16,
}

/// Parse `TCPIP::<host>[::<command_port>,<data_port>]`.
///
/// IPv6 hosts must be bracketed (`TCPIP::[::1]`). `USB` is recognized but
/// has no transport behind it.
pub fn parse_interface(interface: &str) -> WsaResult<InstrumentEndpoints> {
    let trimmed = interface.trim();
    let (method, rest) = match trimmed.split_once(FIELD_SEPARATOR) {
        Some((method, rest)) => (method, Some(rest)),
        None => (trimmed, None),
    };

    if method.eq_ignore_ascii_case(USB_METHOD) {
        return Err(WsaError::UsbNotAvailable);
    }
    if !method.eq_ignore_ascii_case(TCPIP_METHOD) {
        return Err(WsaError::InvalidInterface(trimmed.to_string()));
    }
    let rest = rest
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| WsaError::InvalidAddress(trimmed.to_string()))?;

    let (host, ports) = split_host(rest)?;
    if host.is_empty() {
        return Err(WsaError::InvalidAddress(trimmed.to_string()));
    }

    let (command_port, data_port) = match ports {
        None => (DEFAULT_COMMAND_PORT, DEFAULT_DATA_PORT),
        Some(ports) => {
            let (cmd, data) = ports.split_once(',').ok_or_else(|| {
                WsaError::InvalidAddress(format!("expected '<cmd>,<data>' ports in '{ports}'"))
            })?;
            (parse_port(cmd)?, parse_port(data)?)
        }
    };

    Ok(InstrumentEndpoints {
        host: host.to_string(),
        command_port,
        data_port,
    })
}

fn split_host(rest: &str) -> WsaResult<(&str, Option<&str>)> {
    if let Some(inner) = rest.strip_prefix('[') {
        let closing = inner.find(']').ok_or_else(|| {
            WsaError::InvalidAddress(format!("missing closing ']' in '{rest}'"))
        })?;
        let host = &inner[..closing];
        let remainder = &inner[closing + 1..];
        if remainder.is_empty() {
            return Ok((host, None));
        }
        return remainder
            .strip_prefix(FIELD_SEPARATOR)
            .map(|ports| (host, Some(ports)))
            .ok_or_else(|| {
                WsaError::InvalidAddress(format!("expected '::<ports>' after ']' in '{rest}'"))
            });
    }

    Ok(match rest.split_once(FIELD_SEPARATOR) {
        Some((host, ports)) => (host.trim(), Some(ports)),
        None => (rest.trim(), None),
    })
}

fn parse_port(port: &str) -> WsaResult<u16> {
    let value: u16 = port
        .trim()
        .parse()
        .map_err(|_| WsaError::InvalidAddress(format!("invalid port '{}'", port.trim())))?;
    if value == 0 {
        return Err(WsaError::InvalidAddress("invalid port 0".to_string()));
    }
    Ok(value)
}

/// Resolve `host` and `port` to a usable socket address without connecting.
pub async fn validate_address(host: &str, port: &str) -> WsaResult<SocketAddr> {
    let port = parse_port(port)?;
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(WsaError::InvalidAddress("host is empty".to_string()));
    }

    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|e| WsaError::InvalidAddress(format!("{host}:{port}: {e}")))?;
    addrs
        .next()
        .ok_or_else(|| WsaError::InvalidAddress(format!("{host}:{port}: no usable address")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_ports() {
        let ep = parse_interface("TCPIP::192.168.1.20").expect("parse");
        assert_eq!(ep.host, "192.168.1.20");
        assert_eq!(ep.command_port, DEFAULT_COMMAND_PORT);
        assert_eq!(ep.data_port, DEFAULT_DATA_PORT);
    }

    #[test]
    fn test_parse_explicit_ports() {
        let ep = parse_interface("tcpip::wsa.local::4000,4001").expect("parse");
        assert_eq!(ep.host, "wsa.local");
        assert_eq!(ep.command_port, 4000);
        assert_eq!(ep.data_port, 4001);
    }

    #[test]
    fn test_parse_bracketed_ipv6() {
        let ep = parse_interface("TCPIP::[::1]::5000,5001").expect("parse");
        assert_eq!(ep.host, "::1");
        let ep = parse_interface("TCPIP::[fe80::2]").expect("parse");
        assert_eq!(ep.command_port, DEFAULT_COMMAND_PORT);
    }

    #[test]
    fn test_reject_unknown_methods() {
        assert!(matches!(
            parse_interface("USB"),
            Err(WsaError::UsbNotAvailable)
        ));
        assert!(matches!(
            parse_interface("GPIB::3"),
            Err(WsaError::InvalidInterface(_))
        ));
        assert!(matches!(
            parse_interface("TCPIP::"),
            Err(WsaError::InvalidAddress(_))
        ));
        assert!(matches!(
            parse_interface("TCPIP::host::37001"),
            Err(WsaError::InvalidAddress(_))
        ));
        assert!(matches!(
            parse_interface("TCPIP::host::0,37000"),
            Err(WsaError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_loopback() {
        let addr = validate_address("127.0.0.1", "37001")
            .await
            .expect("loopback resolves");
        assert_eq!(addr.port(), 37001);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_validate_rejects_bad_port() {
        assert!(matches!(
            validate_address("127.0.0.1", "http").await,
            Err(WsaError::InvalidAddress(_))
        ));
        assert!(matches!(
            validate_address("", "37001").await,
            Err(WsaError::InvalidAddress(_))
        ));
    }
}
