//! The unified error taxonomy for parsing and emitting PROXY protocol headers.

use std::fmt;

/// An error produced while parsing or emitting a PROXY protocol header.
///
/// Every variant carries a stable, catalogued message reachable through
/// [`Error::message`] independently of the `Display` impl, so callers that
/// need the bare diagnostic string (for logging, or for parity with the
/// reference implementation's `pp_strerror`) don't have to scrape `Display`
/// output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Error {
    /// `emit` was called with a version other than 1 or 2.
    Version,
    /// v2 header: wrong signature.
    Pp2Signature,
    /// v2 header: wrong version.
    Pp2Version,
    /// v2 header: wrong command.
    Pp2Command,
    /// v2 header: wrong address family.
    Pp2AddressFamily,
    /// v2 header: wrong transport protocol.
    Pp2TransportProtocol,
    /// v2 header: length.
    Pp2Length,
    /// v2 header: invalid IPv4 src IP.
    Pp2Ipv4SrcIp,
    /// v2 header: invalid IPv4 dst IP.
    Pp2Ipv4DstIp,
    /// v2 header: invalid IPv6 src IP.
    Pp2Ipv6SrcIp,
    /// v2 header: invalid IPv6 dst IP.
    Pp2Ipv6DstIp,
    /// v2 header: invalid TLV vector's length.
    Pp2TlvLength,
    /// v2 header: invalid PP2_TYPE_CRC32C.
    Pp2TypeCrc32c,
    /// v2 header: invalid PP2_TYPE_SSL.
    Pp2TypeSsl,
    /// v2 header: invalid PP2_TYPE_UNIQUE_ID.
    Pp2TypeUniqueId,
    /// v2 header: invalid PP2_TYPE_AWS.
    Pp2TypeAws,
    /// v2 header: invalid PP2_TYPE_AZURE.
    Pp2TypeAzure,
    /// v1 header: "\r\n" is missing.
    Pp1Crlf,
    /// v1 header: "PROXY" is missing.
    Pp1Proxy,
    /// v1 header: space is missing.
    Pp1Space,
    /// v1 header: wrong transport protocol or address family.
    Pp1TransportFamily,
    /// v1 header: invalid IPv4 src IP.
    Pp1Ipv4SrcIp,
    /// v1 header: invalid IPv4 dst IP.
    Pp1Ipv4DstIp,
    /// v1 header: invalid IPv6 src IP.
    Pp1Ipv6SrcIp,
    /// v1 header: invalid IPv6 dst IP.
    Pp1Ipv6DstIp,
    /// v1 header: invalid src port.
    Pp1SrcPort,
    /// v1 header: invalid dst port.
    Pp1DstPort,
    /// Heap memory allocation failure.
    ///
    /// Kept only for catalogue parity with the reference implementation;
    /// the safe Rust API has no path that returns this variant.
    HeapAlloc,
}

impl Error {
    /// Returns the stable catalogue message for this error, matching the
    /// reference implementation's `pp_strerror` table verbatim.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Version => "Invalid PROXY protocol version given. Only 1 and 2 are valid",
            Self::Pp2Signature => "v2 PROXY protocol header: wrong signature",
            Self::Pp2Version => "v2 PROXY protocol header: wrong version",
            Self::Pp2Command => "v2 PROXY protocol header: wrong command",
            Self::Pp2AddressFamily => "v2 PROXY protocol header: wrong address family",
            Self::Pp2TransportProtocol => "v2 PROXY protocol header: wrong transport protocol",
            Self::Pp2Length => "v2 PROXY protocol header: length",
            Self::Pp2Ipv4SrcIp => "v2 PROXY protocol header: invalid IPv4 src IP",
            Self::Pp2Ipv4DstIp => "v2 PROXY protocol header: invalid IPv4 dst IP",
            Self::Pp2Ipv6SrcIp => "v2 PROXY protocol header: invalid IPv6 src IP",
            Self::Pp2Ipv6DstIp => "v2 PROXY protocol header: invalid IPv6 dst IP",
            Self::Pp2TlvLength => "v2 PROXY protocol header: invalid TLV vector's length",
            Self::Pp2TypeCrc32c => "v2 PROXY protocol header: invalid PP2_TYPE_CRC32C",
            Self::Pp2TypeSsl => "v2 PROXY protocol header: invalid PP2_TYPE_SSL",
            Self::Pp2TypeUniqueId => "v2 PROXY protocol header: invalid PP2_TYPE_UNIQUE_ID",
            Self::Pp2TypeAws => "v2 PROXY protocol header: invalid PP2_TYPE_AWS",
            Self::Pp2TypeAzure => "v2 PROXY protocol header: invalid PP2_TYPE_AZURE",
            Self::Pp1Crlf => "v1 PROXY protocol header: \"\\r\\n\" is missing",
            Self::Pp1Proxy => "v1 PROXY protocol header: \"PROXY\" is missing",
            Self::Pp1Space => "v1 PROXY protocol header: space is missing",
            Self::Pp1TransportFamily => {
                "v1 PROXY protocol header: wrong transport protocol or address family"
            }
            Self::Pp1Ipv4SrcIp => "v1 PROXY protocol header: invalid IPv4 src IP",
            Self::Pp1Ipv4DstIp => "v1 PROXY protocol header: invalid IPv4 dst IP",
            Self::Pp1Ipv6SrcIp => "v1 PROXY protocol header: invalid IPv6 src IP",
            Self::Pp1Ipv6DstIp => "v1 PROXY protocol header: invalid IPv6 dst IP",
            Self::Pp1SrcPort => "v1 PROXY protocol header: invalid src port",
            Self::Pp1DstPort => "v1 PROXY protocol header: invalid dst port",
            Self::HeapAlloc => "Heap memory allocation failure",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_matches_display() {
        assert_eq!(Error::Pp2TypeCrc32c.to_string(), Error::Pp2TypeCrc32c.message());
    }
}
