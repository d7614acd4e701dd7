//! The parsed/to-be-emitted representation of a PROXY protocol header.

use crate::tlv::{Type, TlvBuildError, TlvStore};
use crate::Error;

/// Which wire format a header was parsed from, or should be emitted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    /// The human-readable text format.
    One,
    /// The binary format, with an optional TLV vector.
    Two,
}

/// The address family of a connection, derived from its [`Addresses`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AddressFamily {
    /// No address information available (a v1 `UNKNOWN` or v2 `LOCAL` connection).
    Unspecified,
    /// IPv4.
    Inet,
    /// IPv6.
    Inet6,
    /// `AF_UNIX`.
    Unix,
}

/// The transport protocol of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TransportProtocol {
    /// No transport information available.
    Unspecified,
    /// Stream-oriented (TCP).
    Stream,
    /// Datagram-oriented (UDP).
    Datagram,
}

/// The Unix domain socket path length, fixed by the v2 wire format.
pub const UNIX_PATH_LEN: usize = 108;

/// The source/destination address pair of a proxied connection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Addresses {
    /// No address information: a v1 `UNKNOWN` header, or a v2 `LOCAL` command.
    Unspecified,
    /// IPv4 source and destination.
    Ipv4 {
        /// Source address.
        source: std::net::Ipv4Addr,
        /// Destination address.
        destination: std::net::Ipv4Addr,
        /// Source port.
        source_port: u16,
        /// Destination port.
        destination_port: u16,
    },
    /// IPv6 source and destination.
    Ipv6 {
        /// Source address.
        source: std::net::Ipv6Addr,
        /// Destination address.
        destination: std::net::Ipv6Addr,
        /// Source port.
        source_port: u16,
        /// Destination port.
        destination_port: u16,
    },
    /// `AF_UNIX` source and destination socket paths.
    ///
    /// Stored as the raw, NUL-padded 108-byte fields the wire format uses;
    /// v1 has no Unix variant, so this only round-trips through v2.
    Unix {
        /// Source socket path, NUL-padded to 108 bytes.
        source: [u8; UNIX_PATH_LEN],
        /// Destination socket path, NUL-padded to 108 bytes.
        destination: [u8; UNIX_PATH_LEN],
    },
}

impl Addresses {
    /// The address family this variant corresponds to.
    #[must_use]
    pub const fn family(&self) -> AddressFamily {
        match self {
            Self::Unspecified => AddressFamily::Unspecified,
            Self::Ipv4 { .. } => AddressFamily::Inet,
            Self::Ipv6 { .. } => AddressFamily::Inet6,
            Self::Unix { .. } => AddressFamily::Unix,
        }
    }
}

/// Parsed SSL/TLS client information carried by a v2 `PP2_TYPE_SSL` TLV.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SslInfo {
    /// Whether the connection was made over SSL/TLS.
    pub ssl: bool,
    /// Whether the client presented a certificate at the connection level.
    pub cert_in_connection: bool,
    /// Whether the client presented a certificate in the TLS session.
    pub cert_in_session: bool,
    /// Whether the presented certificate was verified.
    pub cert_verified: bool,
}

impl SslInfo {
    /// Composes the single `PP2_TYPE_SSL` client byte from these four flags.
    ///
    /// Bit layout from the low bit: `ssl`, `cert_in_connection`,
    /// `cert_in_session`, `cert_verified` each at their own bit, matching the
    /// `PP2_CLIENT_*` bitmask constants.
    pub(crate) const fn client_byte(self) -> u8 {
        (self.ssl as u8)
            | ((self.cert_in_connection as u8) << 1)
            | ((self.cert_in_session as u8) << 2)
            | ((self.cert_verified as u8) << 5)
    }

    pub(crate) const fn from_client_byte(byte: u8) -> Self {
        Self {
            ssl: byte & 0x01 != 0,
            cert_in_connection: byte & 0x02 != 0,
            cert_in_session: byte & 0x04 != 0,
            cert_verified: byte & 0x20 != 0,
        }
    }
}

/// v2-only fields that have no representation in the v1 text format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct V2Options {
    /// Whether the command byte should be emitted as `LOCAL` (connection
    /// originated from the proxy itself, e.g. a health check) rather than
    /// `PROXY`. Parsed `LOCAL` headers carry no address information.
    pub local: bool,
    /// Whether a `CRC32C` TLV should be computed and appended on emit.
    pub crc32c: bool,
    /// Pad the emitted header, via a trailing `NOOP` TLV, to a multiple of
    /// `2^alignment_power` bytes. Zero disables alignment.
    pub alignment_power: u8,
    /// SSL/TLS client information (set only if a `PP2_TYPE_SSL` TLV exists).
    pub ssl: Option<SslInfo>,
}

/// A fully parsed (or to-be-emitted) PROXY protocol header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndpointInfo {
    pub(crate) addresses: AddressesSlot,
    pub(crate) transport: TransportProtocol,
    pub(crate) v2: V2Options,
    pub(crate) tlvs: TlvStore,
}

/// Wraps [`Addresses`] so `EndpointInfo` can derive `Default`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AddressesSlot(pub(crate) Addresses);

impl Default for AddressesSlot {
    fn default() -> Self {
        Self(Addresses::Unspecified)
    }
}

impl Default for TransportProtocol {
    fn default() -> Self {
        Self::Unspecified
    }
}

impl EndpointInfo {
    /// Builds an [`EndpointInfo`] with the given addresses and transport
    /// protocol, and no TLVs or v2 options set.
    #[must_use]
    pub fn new(addresses: Addresses, transport: TransportProtocol) -> Self {
        Self {
            addresses: AddressesSlot(addresses),
            transport,
            v2: V2Options::default(),
            tlvs: TlvStore::new(),
        }
    }

    /// The source/destination address pair.
    #[must_use]
    pub const fn addresses(&self) -> &Addresses {
        &self.addresses.0
    }

    /// The transport protocol.
    #[must_use]
    pub const fn transport(&self) -> TransportProtocol {
        self.transport
    }

    /// The address family, derived from [`Self::addresses`].
    #[must_use]
    pub const fn address_family(&self) -> AddressFamily {
        self.addresses.0.family()
    }

    /// The v2-only options (alignment, CRC32c, `LOCAL`, SSL info).
    #[must_use]
    pub const fn v2_options(&self) -> &V2Options {
        &self.v2
    }

    /// Mutable access to the v2-only options.
    pub fn v2_options_mut(&mut self) -> &mut V2Options {
        &mut self.v2
    }

    /// Resets this value to an empty, `Unspecified`/`Unspecified` state,
    /// dropping every stored TLV.
    pub fn clear(&mut self) {
        self.addresses = AddressesSlot(Addresses::Unspecified);
        self.transport = TransportProtocol::Unspecified;
        self.v2 = V2Options::default();
        self.tlvs.clear();
    }

    /// Builds the infallible v2 health-check header: `LOCAL` command,
    /// `UNSPEC` address family, no TLVs.
    #[must_use]
    pub fn healthcheck_v2() -> Vec<u8> {
        let mut info = Self::new(Addresses::Unspecified, TransportProtocol::Unspecified);
        info.v2.local = true;
        match crate::protocol::v2::emit(&info) {
            Ok(bytes) => bytes,
            Err(_) => unreachable!("a LOCAL/UNSPEC header is always well-formed"),
        }
    }

    /// Emits this value as a v1 or v2 wire header.
    pub fn emit(&self, version: Version) -> Result<Vec<u8>, Error> {
        match version {
            Version::One => crate::protocol::v1::emit(self),
            Version::Two => crate::protocol::v2::emit(self),
        }
    }

    // --- TLV accessors -------------------------------------------------

    /// The `ALPN` TLV value, if present.
    #[must_use]
    pub fn alpn(&self) -> Option<&[u8]> {
        self.tlvs.get(Type::Alpn)
    }

    /// The `AUTHORITY` TLV value (the requested host name), if present.
    #[must_use]
    pub fn authority(&self) -> Option<&[u8]> {
        self.tlvs.get(Type::Authority)
    }

    /// The raw `CRC32C` TLV value, if present. Verification itself happens
    /// during [`crate::parse`]; this just exposes the stored bytes.
    #[must_use]
    pub fn crc32c(&self) -> Option<&[u8]> {
        self.tlvs.get(Type::Crc32c)
    }

    /// The `UNIQUE_ID` TLV value, if present.
    #[must_use]
    pub fn unique_id(&self) -> Option<&[u8]> {
        self.tlvs.get(Type::UniqueId)
    }

    /// The SSL sub-TLV `PP2_SUBTYPE_SSL_VERSION` value, if present.
    #[must_use]
    pub fn ssl_version(&self) -> Option<&[u8]> {
        self.tlvs.get_terminated(Type::SslVersion)
    }

    /// The SSL sub-TLV `PP2_SUBTYPE_SSL_CN` value, if present.
    ///
    /// Unlike the other SSL sub-TLVs this one is UTF-8, not US-ASCII, and is
    /// stored without a NUL terminator.
    #[must_use]
    pub fn ssl_cn(&self) -> Option<&[u8]> {
        self.tlvs.get(Type::SslCn)
    }

    /// The SSL sub-TLV `PP2_SUBTYPE_SSL_CIPHER` value, if present.
    #[must_use]
    pub fn ssl_cipher(&self) -> Option<&[u8]> {
        self.tlvs.get_terminated(Type::SslCipher)
    }

    /// The SSL sub-TLV `PP2_SUBTYPE_SSL_SIG_ALG` value, if present.
    #[must_use]
    pub fn ssl_sig_alg(&self) -> Option<&[u8]> {
        self.tlvs.get_terminated(Type::SslSigAlg)
    }

    /// The SSL sub-TLV `PP2_SUBTYPE_SSL_KEY_ALG` value, if present.
    #[must_use]
    pub fn ssl_key_alg(&self) -> Option<&[u8]> {
        self.tlvs.get_terminated(Type::SslKeyAlg)
    }

    /// The `NETNS` TLV value (the source network namespace), if present.
    #[must_use]
    pub fn netns(&self) -> Option<&[u8]> {
        self.tlvs.get_terminated(Type::NetNs)
    }

    /// The AWS VPC endpoint id sub-TLV, if present.
    #[must_use]
    pub fn aws_vpce_id(&self) -> Option<&[u8]> {
        let raw = self.tlvs.get_subtyped(Type::Aws, Type::AWS_VPCE_ID)?;
        Some(match raw.split_last() {
            Some((0, rest)) => rest,
            _ => raw,
        })
    }

    /// The Azure Private Link service linkid sub-TLV, if present, as the
    /// native-endian `u32` the reference implementation stores it as.
    #[must_use]
    pub fn azure_linkid(&self) -> Option<u32> {
        let raw = self
            .tlvs
            .get_subtyped(Type::Azure, Type::AZURE_PRIVATEENDPOINT_LINKID)?;
        let bytes: [u8; 4] = raw.try_into().ok()?;
        Some(u32::from_ne_bytes(bytes))
    }

    // --- TLV mutators ----------------------------------------------------

    /// Sets the `ALPN` TLV.
    pub fn add_alpn(&mut self, value: &[u8]) -> Result<(), TlvBuildError> {
        if value.len() > usize::from(u16::MAX) {
            return Err(TlvBuildError::ValueTooLarge);
        }
        self.tlvs.push(Type::Alpn, value);
        Ok(())
    }

    /// Sets the `AUTHORITY` TLV.
    pub fn add_authority(&mut self, value: &[u8]) -> Result<(), TlvBuildError> {
        if value.len() > usize::from(u16::MAX) {
            return Err(TlvBuildError::ValueTooLarge);
        }
        self.tlvs.push(Type::Authority, value);
        Ok(())
    }

    /// Sets the `UNIQUE_ID` TLV. Rejects values longer than 128 bytes.
    pub fn add_unique_id(&mut self, value: &[u8]) -> Result<(), TlvBuildError> {
        if value.len() > 128 {
            return Err(TlvBuildError::UniqueIdTooLarge);
        }
        self.tlvs.push(Type::UniqueId, value);
        Ok(())
    }

    /// Sets the SSL client info and, where given, the version/cipher/sig-alg/
    /// key-alg/CN sub-TLVs, composed into a single `PP2_TYPE_SSL` TLV on emit.
    #[allow(clippy::too_many_arguments)]
    pub fn add_ssl(
        &mut self,
        info: SslInfo,
        version: Option<&[u8]>,
        cipher: Option<&[u8]>,
        sig_alg: Option<&[u8]>,
        key_alg: Option<&[u8]>,
        cn: Option<&[u8]>,
    ) -> Result<(), TlvBuildError> {
        self.v2.ssl = Some(info);
        if let Some(v) = version {
            self.tlvs.push_terminated(Type::SslVersion, v)?;
        }
        if let Some(v) = cipher {
            self.tlvs.push_terminated(Type::SslCipher, v)?;
        }
        if let Some(v) = sig_alg {
            self.tlvs.push_terminated(Type::SslSigAlg, v)?;
        }
        if let Some(v) = key_alg {
            self.tlvs.push_terminated(Type::SslKeyAlg, v)?;
        }
        if let Some(v) = cn {
            if v.len() > usize::from(u16::MAX) {
                return Err(TlvBuildError::ValueTooLarge);
            }
            self.tlvs.push(Type::SslCn, v);
        }
        Ok(())
    }

    /// Sets the `NETNS` TLV.
    pub fn add_netns(&mut self, value: &[u8]) -> Result<(), TlvBuildError> {
        self.tlvs.push_terminated(Type::NetNs, value)
    }

    /// Sets the AWS VPC endpoint id sub-TLV.
    pub fn add_aws_vpce_id(&mut self, value: &[u8]) -> Result<(), TlvBuildError> {
        if value.len() + 2 > usize::from(u16::MAX) {
            return Err(TlvBuildError::ValueTooLarge);
        }
        let mut owned = Vec::with_capacity(value.len() + 2);
        owned.push(Type::AWS_VPCE_ID);
        owned.extend_from_slice(value);
        owned.push(0);
        self.tlvs.push_raw(Type::Aws.into(), owned);
        Ok(())
    }

    /// Sets the Azure Private Link service linkid sub-TLV, stored as the
    /// native-endian bytes of `linkid`.
    pub fn add_azure_linkid(&mut self, linkid: u32) -> Result<(), TlvBuildError> {
        let mut owned = Vec::with_capacity(5);
        owned.push(Type::AZURE_PRIVATEENDPOINT_LINKID);
        owned.extend_from_slice(&linkid.to_ne_bytes());
        self.tlvs.push_raw(Type::Azure.into(), owned);
        Ok(())
    }

    /// Read-only access to the full TLV store, for callers that need an
    /// unrecognised or custom TLV the typed accessors don't expose.
    #[must_use]
    pub const fn tlvs(&self) -> &TlvStore {
        &self.tlvs
    }

    /// Mutable access to the TLV store, for the wire-level parser.
    pub(crate) fn tlvs_mut(&mut self) -> &mut TlvStore {
        &mut self.tlvs
    }
}
