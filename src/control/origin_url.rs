//! Registration URL parser
//!
//! Controllers register with a URL naming where notifications should go,
//! e.g. `osc.tcp://127.0.0.1:19000/Controller`.

use super::types::{ControlError, ControlResult};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::{alphanumeric1, char, digit1},
    combinator::{all_consuming, map_res, rest},
    sequence::{delimited, preceded, tuple},
    IResult,
};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

/// A decoded registration URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OriginUrl {
    /// Protocol named in the scheme (`tcp`, `udp`)
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Base path without a trailing slash
    pub path: String,
}

impl OriginUrl {
    /// Resolve host and port to a socket address
    pub fn socket_addr(&self, url: &str) -> ControlResult<SocketAddr> {
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }

        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| invalid(url, &e.to_string()))?
            .next()
            .ok_or_else(|| invalid(url, "host did not resolve"))
    }
}

fn invalid(url: &str, reason: &str) -> ControlError {
    ControlError::InvalidOrigin {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

fn scheme(input: &str) -> IResult<&str, &str> {
    delimited(tag("osc."), alphanumeric1, tag("://"))(input)
}

fn host(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('['), take_until("]"), char(']')),
        take_while1(|c: char| c != ':' && c != '/'),
    ))(input)
}

fn port(input: &str) -> IResult<&str, u16> {
    preceded(char(':'), map_res(digit1, |s: &str| s.parse::<u16>()))(input)
}

/// Parse `osc.<proto>://<host>:<port>[/<path>]`
pub fn parse_origin_url(url: &str) -> ControlResult<OriginUrl> {
    let (_, (protocol, host, port, path)) = all_consuming(tuple((scheme, host, port, rest)))(url)
        .map_err(|_| invalid(url, "expected osc.<proto>://<host>:<port>/<path>"))?;

    if !path.is_empty() && !path.starts_with('/') {
        return Err(invalid(url, "path must start with '/'"));
    }

    Ok(OriginUrl {
        protocol: protocol.to_string(),
        host: host.to_string(),
        port,
        path: path.trim_end_matches('/').to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_url() {
        let url = parse_origin_url("osc.tcp://127.0.0.1:19000/Controller").unwrap();
        assert_eq!(url.protocol, "tcp");
        assert_eq!(url.host, "127.0.0.1");
        assert_eq!(url.port, 19000);
        assert_eq!(url.path, "/Controller");
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let url = parse_origin_url("osc.udp://10.0.0.2:9000/Remote/").unwrap();
        assert_eq!(url.path, "/Remote");

        let url = parse_origin_url("osc.udp://10.0.0.2:9000").unwrap();
        assert_eq!(url.path, "");
    }

    #[test]
    fn test_ipv6_host() {
        let url = parse_origin_url("osc.udp://[::1]:9000/x").unwrap();
        assert_eq!(url.host, "::1");
        let addr = url.socket_addr("osc.udp://[::1]:9000/x").unwrap();
        assert!(addr.is_ipv6());
        assert_eq!(addr.port(), 9000);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_origin_url("not a url").is_err());
        assert!(parse_origin_url("http://127.0.0.1:80/x").is_err());
        assert!(parse_origin_url("osc.tcp://127.0.0.1/x").is_err());
        assert!(parse_origin_url("osc.tcp://127.0.0.1:99999/x").is_err());
    }
}
