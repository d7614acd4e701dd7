//! Wire-level parsing and emitting, dispatched by version.
//!
//! The v1 (text) and v2 (binary) formats share nothing at the byte level, so
//! [`parse`] only needs to sniff the first bytes of the buffer to know which
//! sub-module to hand off to.

pub(crate) mod v1;
pub(crate) mod v2;

use crate::endpoint::EndpointInfo;
use crate::Error;

/// Parses a single PROXY protocol header (v1 or v2, whichever the buffer
/// starts with) off the front of `buf`.
///
/// Returns `Ok(None)` either when `buf` does not yet hold enough bytes to
/// tell (the caller should read more and retry) or when it is long enough
/// to rule out both wire formats outright — `buf` is simply not a PROXY
/// header, and the caller should treat it as ordinary connection payload.
/// Returns `Ok(Some((info, consumed)))` on success, where `consumed` is the
/// number of bytes the header occupied and any bytes after that belong to
/// the proxied connection's own payload.
pub fn parse(buf: &[u8]) -> Result<Option<(EndpointInfo, usize)>, Error> {
    if buf.len() >= v2::SIGNATURE.len() {
        if buf.starts_with(v2::SIGNATURE) {
            return v2::parse(buf);
        }
    } else if v2::SIGNATURE.starts_with(buf) {
        // Too short to tell apart from a v2 header yet; wait for more bytes.
        return Ok(None);
    }

    if buf.len() >= 8 && buf.starts_with(b"PROXY") {
        return v1::parse(buf);
    }

    // Neither a (possible) v2 signature nor a long-enough "PROXY" prefix:
    // not a PROXY header at all, per the reference `pp_parse_hdr`'s
    // `buffer_length >= 8 && !memcmp(buffer, PP1_SIG, 5)` guard.
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_header_traffic_is_not_an_error() {
        assert_eq!(parse(b"GET / HTTP/1.1\r\n").unwrap(), None);
        assert_eq!(parse(b"XXXXXXXX").unwrap(), None);
    }

    #[test]
    fn short_buffers_wait_for_more_bytes_instead_of_erroring() {
        assert_eq!(parse(b"PROX").unwrap(), None);
        assert_eq!(parse(b"\r\n\r\n").unwrap(), None);
    }

    #[test]
    fn long_enough_proxy_prefix_is_routed_to_v1() {
        let err = parse(b"PROXYX\r\n").unwrap_err();
        assert_eq!(err, Error::Pp1Space);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::endpoint::{Addresses, TransportProtocol};
    use crate::Version;
    use quickcheck_macros::quickcheck;
    use std::net::Ipv4Addr;

    #[quickcheck]
    fn v1_ipv4_round_trips(src: u32, dst: u32, sport: u16, dport: u16) -> bool {
        if sport == 0 || dport == 0 {
            return true;
        }
        let info = EndpointInfo::new(
            Addresses::Ipv4 {
                source: Ipv4Addr::from(src),
                destination: Ipv4Addr::from(dst),
                source_port: sport,
                destination_port: dport,
            },
            TransportProtocol::Stream,
        );
        let Ok(bytes) = info.emit(Version::One) else {
            return true;
        };
        match parse(&bytes) {
            Ok(Some((parsed, consumed))) => {
                consumed == bytes.len() && parsed.addresses() == info.addresses()
            }
            _ => false,
        }
    }

    #[quickcheck]
    fn v2_ipv4_round_trips(src: u32, dst: u32, sport: u16, dport: u16) -> bool {
        let info = EndpointInfo::new(
            Addresses::Ipv4 {
                source: Ipv4Addr::from(src),
                destination: Ipv4Addr::from(dst),
                source_port: sport,
                destination_port: dport,
            },
            TransportProtocol::Stream,
        );
        let Ok(bytes) = info.emit(Version::Two) else {
            return true;
        };
        match parse(&bytes) {
            Ok(Some((parsed, consumed))) => {
                consumed == bytes.len() && parsed.addresses() == info.addresses()
            }
            _ => false,
        }
    }

    #[quickcheck]
    fn v2_alignment_always_divides_header_len(power: u8) -> bool {
        let power = power % 6 + 2; // keep padding bounded: 2..=7
        let mut info = EndpointInfo::new(Addresses::Unspecified, TransportProtocol::Unspecified);
        info.v2_options_mut().local = true;
        info.v2_options_mut().alignment_power = power;
        match v2::emit(&info) {
            Ok(bytes) => bytes.len() % (1usize << power) == 0,
            Err(_) => true,
        }
    }

    #[quickcheck]
    fn parse_never_panics_on_arbitrary_bytes(data: Vec<u8>) -> bool {
        let _ = parse(&data);
        true
    }
}
