//! The text (v1) wire format: a single CRLF-terminated ASCII line.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::endpoint::{AddressFamily, Addresses, EndpointInfo, TransportProtocol};
use crate::Error;

/// The longest a v1 line (including its trailing CRLF) can legally be.
const MAX_LINE: usize = 108;

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == b"\r\n")
}

fn parse_port(token: &[u8]) -> Option<u16> {
    let text = std::str::from_utf8(token).ok()?;
    let port: u32 = text.parse().ok()?;
    if port == 0 || port > u32::from(u16::MAX) {
        return None;
    }
    Some(port as u16)
}

/// Parses a v1 header off the front of `buf`.
///
/// Callers must already have established that `buf` starts with `"PROXY"`
/// and holds at least 8 bytes; see [`crate::protocol::parse`].
pub(crate) fn parse(buf: &[u8]) -> Result<Option<(EndpointInfo, usize)>, Error> {
    let window = &buf[..buf.len().min(MAX_LINE)];
    let crlf = find_crlf(window).ok_or(Error::Pp1Crlf)?;
    let consumed = crlf + 2;
    let line = &window[..crlf];

    let after_proxy = line.strip_prefix(b"PROXY").ok_or(Error::Pp1Proxy)?;
    let rest = after_proxy.strip_prefix(b" ").ok_or(Error::Pp1Space)?;

    if rest.len() >= 7 && &rest[..7] == b"UNKNOWN" {
        let info = EndpointInfo::new(Addresses::Unspecified, TransportProtocol::Unspecified);
        return Ok(Some((info, consumed)));
    }

    if rest.iter().position(|&b| b == b' ').is_none() {
        return Err(Error::Pp1TransportFamily);
    }
    if rest.len() < 4 {
        return Err(Error::Pp1TransportFamily);
    }
    let family_tok = &rest[..4];
    let (src_ip_err, dst_ip_err) = if family_tok == b"TCP4" {
        (Error::Pp1Ipv4SrcIp, Error::Pp1Ipv4DstIp)
    } else if family_tok == b"TCP6" {
        (Error::Pp1Ipv6SrcIp, Error::Pp1Ipv6DstIp)
    } else {
        return Err(Error::Pp1TransportFamily);
    };
    let is_v4 = family_tok == b"TCP4";

    let mut ptr = &rest[4..];
    ptr = ptr.strip_prefix(b" ").ok_or(Error::Pp1Space)?;

    let src_end = ptr.iter().position(|&b| b == b' ').ok_or(src_ip_err)?;
    let src_text = std::str::from_utf8(&ptr[..src_end]).map_err(|_| src_ip_err)?;
    ptr = &ptr[src_end..];
    ptr = ptr.strip_prefix(b" ").ok_or(Error::Pp1Space)?;

    let dst_end = ptr.iter().position(|&b| b == b' ').ok_or(dst_ip_err)?;
    let dst_text = std::str::from_utf8(&ptr[..dst_end]).map_err(|_| dst_ip_err)?;
    ptr = &ptr[dst_end..];
    ptr = ptr.strip_prefix(b" ").ok_or(Error::Pp1Space)?;

    let sport_end = ptr.iter().position(|&b| b == b' ').ok_or(Error::Pp1SrcPort)?;
    let source_port = parse_port(&ptr[..sport_end]).ok_or(Error::Pp1SrcPort)?;
    ptr = &ptr[sport_end..];
    ptr = ptr.strip_prefix(b" ").ok_or(Error::Pp1Space)?;

    // Everything left in `ptr` is the destination port token: `line` already
    // excludes the trailing CRLF, so there is no further delimiter to search for.
    let destination_port = parse_port(ptr).ok_or(Error::Pp1DstPort)?;

    let addresses = if is_v4 {
        let source = Ipv4Addr::from_str(src_text).map_err(|_| src_ip_err)?;
        let destination = Ipv4Addr::from_str(dst_text).map_err(|_| dst_ip_err)?;
        Addresses::Ipv4 {
            source,
            destination,
            source_port,
            destination_port,
        }
    } else {
        let source = Ipv6Addr::from_str(src_text).map_err(|_| src_ip_err)?;
        let destination = Ipv6Addr::from_str(dst_text).map_err(|_| dst_ip_err)?;
        Addresses::Ipv6 {
            source,
            destination,
            source_port,
            destination_port,
        }
    };

    let info = EndpointInfo::new(addresses, TransportProtocol::Stream);
    Ok(Some((info, consumed)))
}

/// Renders `info` as a v1 ASCII line, including the trailing CRLF.
pub(crate) fn emit(info: &EndpointInfo) -> Result<Vec<u8>, Error> {
    match info.transport() {
        TransportProtocol::Unspecified | TransportProtocol::Stream => {}
        TransportProtocol::Datagram => return Err(Error::Pp1TransportFamily),
    }

    match info.addresses() {
        Addresses::Unspecified => Ok(b"PROXY UNKNOWN\r\n".to_vec()),
        Addresses::Ipv4 {
            source,
            destination,
            source_port,
            destination_port,
        } => Ok(format!(
            "PROXY TCP4 {source} {destination} {source_port} {destination_port}\r\n"
        )
        .into_bytes()),
        Addresses::Ipv6 {
            source,
            destination,
            source_port,
            destination_port,
        } => Ok(format!(
            "PROXY TCP6 {source} {destination} {source_port} {destination_port}\r\n"
        )
        .into_bytes()),
        Addresses::Unix { .. } => Err(Error::Pp1TransportFamily),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp4() {
        let (info, consumed) = parse(b"PROXY TCP4 1.2.3.4 5.6.7.8 443 65535\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(consumed, 37);
        assert_eq!(info.address_family(), AddressFamily::Inet);
        assert_eq!(info.transport(), TransportProtocol::Stream);
    }

    #[test]
    fn parses_unknown_with_trailing_garbage() {
        let (info, consumed) = parse(b"PROXY UNKNOWN garbage here\r\n").unwrap().unwrap();
        assert_eq!(consumed, 28);
        assert_eq!(info.address_family(), AddressFamily::Unspecified);
    }

    #[test]
    fn rejects_port_zero() {
        let err = parse(b"PROXY TCP4 1.2.3.4 5.6.7.8 0 65535\r\n")
            .unwrap_err();
        assert_eq!(err, Error::Pp1SrcPort);
    }

    #[test]
    fn emits_unspecified() {
        let info = EndpointInfo::new(Addresses::Unspecified, TransportProtocol::Unspecified);
        assert_eq!(emit(&info).unwrap(), b"PROXY UNKNOWN\r\n");
    }
}
