//! The binary (v2) wire format: a fixed 16-byte header, an address block,
//! and a stream of TLVs.

use crate::crc32c::crc32c;
use crate::endpoint::{AddressFamily, Addresses, EndpointInfo, SslInfo, TransportProtocol};
use crate::tlv::Type;
use crate::Error;

/// The 12-byte magic that opens every v2 header.
pub(crate) const SIGNATURE: &[u8; 12] = b"\x0D\x0A\x0D\x0A\x00\x0D\x0A\x51\x55\x49\x54\x0A";

fn address_family_nibble(family: AddressFamily) -> u8 {
    match family {
        AddressFamily::Unspecified => 0,
        AddressFamily::Inet => 1,
        AddressFamily::Inet6 => 2,
        AddressFamily::Unix => 3,
    }
}

fn transport_nibble(transport: TransportProtocol) -> u8 {
    match transport {
        TransportProtocol::Unspecified => 0,
        TransportProtocol::Stream => 1,
        TransportProtocol::Datagram => 2,
    }
}

fn push_tlv(out: &mut Vec<u8>, kind: u8, value: &[u8]) {
    out.push(kind);
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value);
}

fn is_ssl_subtype(kind: u8) -> bool {
    matches!(
        Type::from_u8(kind),
        Some(Type::SslVersion)
            | Some(Type::SslCipher)
            | Some(Type::SslSigAlg)
            | Some(Type::SslKeyAlg)
            | Some(Type::SslCn)
    )
}

/// Strips the trailing NUL the store keeps for `NETNS`/`AWS` values: that
/// NUL is an internal storage convention (see [`crate::tlv::TlvStore::get_terminated`]),
/// not part of the wire length, matching `add_netns`/`add_aws_vpce_id` in the
/// reference implementation.
fn wire_value(kind: u8, value: &[u8]) -> &[u8] {
    if matches!(Type::from_u8(kind), Some(Type::NetNs) | Some(Type::Aws)) {
        if let Some((0, rest)) = value.split_last() {
            return rest;
        }
    }
    value
}

/// Composes the single `PP2_TYPE_SSL` value from the client bitfield plus
/// whichever sub-TLVs were stored by [`EndpointInfo::add_ssl`].
///
/// Fixes the reference implementation's bit composition bug, which ORs
/// `cert_in_connection` into both bit 1 and bit 2, making `cert_in_session`
/// unreachable on emit.
fn compose_ssl_value(info: &EndpointInfo, ssl: SslInfo) -> Vec<u8> {
    let mut value = Vec::new();
    value.push(ssl.client_byte());
    let verify: u32 = u32::from(!ssl.cert_verified);
    value.extend_from_slice(&verify.to_be_bytes());

    if let Some(v) = info.tlvs().get_terminated(Type::SslVersion) {
        push_tlv(&mut value, Type::SslVersion.into(), v);
    }
    if let Some(v) = info.tlvs().get_terminated(Type::SslCipher) {
        push_tlv(&mut value, Type::SslCipher.into(), v);
    }
    if let Some(v) = info.tlvs().get_terminated(Type::SslSigAlg) {
        push_tlv(&mut value, Type::SslSigAlg.into(), v);
    }
    if let Some(v) = info.tlvs().get_terminated(Type::SslKeyAlg) {
        push_tlv(&mut value, Type::SslKeyAlg.into(), v);
    }
    if let Some(v) = info.tlvs().get(Type::SslCn) {
        push_tlv(&mut value, Type::SslCn.into(), v);
    }
    value
}

/// Parses the SSL sub-TLV stream, flattening each sub-TLV into the main
/// store keyed by its subtype byte.
fn parse_ssl_tlv(value: &[u8], info: &mut EndpointInfo) -> Result<(), Error> {
    if value.len() < 5 {
        return Err(Error::Pp2TypeSsl);
    }
    let client = value[0];
    let verify = u32::from_be_bytes([value[1], value[2], value[3], value[4]]);
    let parsed = SslInfo::from_client_byte(client);
    let ssl = SslInfo {
        cert_verified: verify == 0,
        ..parsed
    };
    info.v2_options_mut().ssl = Some(ssl);

    let sub_region = &value[5..];
    let mut offset = 0usize;
    let mut version_found = false;
    while offset < sub_region.len() {
        if sub_region.len() - offset < 3 {
            return Err(Error::Pp2TypeSsl);
        }
        let sub_kind = sub_region[offset];
        let sub_len =
            u16::from_be_bytes([sub_region[offset + 1], sub_region[offset + 2]]) as usize;
        let sub_offset = 3 + sub_len;
        if offset + sub_offset > sub_region.len() {
            return Err(Error::Pp2TypeSsl);
        }
        let sub_value = &sub_region[offset + 3..offset + sub_offset];
        match Type::from_u8(sub_kind) {
            Some(Type::SslVersion) => {
                version_found = true;
                let mut owned = sub_value.to_vec();
                owned.push(0);
                info.tlvs_mut().push_raw(sub_kind, owned);
            }
            Some(Type::SslCipher) | Some(Type::SslSigAlg) | Some(Type::SslKeyAlg) => {
                let mut owned = sub_value.to_vec();
                owned.push(0);
                info.tlvs_mut().push_raw(sub_kind, owned);
            }
            Some(Type::SslCn) => {
                info.tlvs_mut().push_raw(sub_kind, sub_value.to_vec());
            }
            _ => return Err(Error::Pp2TypeSsl),
        }
        offset += sub_offset;
    }

    if offset > sub_region.len() || (ssl.ssl && !version_found) {
        return Err(Error::Pp2TypeSsl);
    }
    Ok(())
}

/// Parses a v2 header off the front of `buf`.
///
/// Callers must already have established that `buf` starts with
/// [`SIGNATURE`]; see [`crate::protocol::parse`].
pub(crate) fn parse(buf: &[u8]) -> Result<Option<(EndpointInfo, usize)>, Error> {
    if buf.len() < 16 {
        return Ok(None);
    }

    let ver_cmd = buf[12];
    if ver_cmd >> 4 != 2 {
        return Err(Error::Pp2Version);
    }
    let local = match ver_cmd & 0x0F {
        0 => true,
        1 => false,
        _ => return Err(Error::Pp2Command),
    };

    let fam_byte = buf[13];
    let family = match fam_byte >> 4 {
        0 => AddressFamily::Unspecified,
        1 => AddressFamily::Inet,
        2 => AddressFamily::Inet6,
        3 => AddressFamily::Unix,
        _ => return Err(Error::Pp2AddressFamily),
    };
    let transport = match fam_byte & 0x0F {
        0 => TransportProtocol::Unspecified,
        1 => TransportProtocol::Stream,
        2 => TransportProtocol::Datagram,
        _ => return Err(Error::Pp2TransportProtocol),
    };

    let len = usize::from(u16::from_be_bytes([buf[14], buf[15]]));
    let total = 16 + len;
    if buf.len() < total {
        return Err(Error::Pp2Length);
    }

    let mut cursor = 16usize;
    let addresses = match family {
        AddressFamily::Unspecified => Addresses::Unspecified,
        AddressFamily::Inet => {
            if len < 12 {
                return Err(Error::Pp2Length);
            }
            let source =
                std::net::Ipv4Addr::new(buf[cursor], buf[cursor + 1], buf[cursor + 2], buf[cursor + 3]);
            let destination = std::net::Ipv4Addr::new(
                buf[cursor + 4],
                buf[cursor + 5],
                buf[cursor + 6],
                buf[cursor + 7],
            );
            let source_port = u16::from_be_bytes([buf[cursor + 8], buf[cursor + 9]]);
            let destination_port = u16::from_be_bytes([buf[cursor + 10], buf[cursor + 11]]);
            cursor += 12;
            Addresses::Ipv4 {
                source,
                destination,
                source_port,
                destination_port,
            }
        }
        AddressFamily::Inet6 => {
            if len < 36 {
                return Err(Error::Pp2Length);
            }
            let mut src = [0u8; 16];
            let mut dst = [0u8; 16];
            src.copy_from_slice(&buf[cursor..cursor + 16]);
            dst.copy_from_slice(&buf[cursor + 16..cursor + 32]);
            let source_port = u16::from_be_bytes([buf[cursor + 32], buf[cursor + 33]]);
            let destination_port = u16::from_be_bytes([buf[cursor + 34], buf[cursor + 35]]);
            cursor += 36;
            Addresses::Ipv6 {
                source: std::net::Ipv6Addr::from(src),
                destination: std::net::Ipv6Addr::from(dst),
                source_port,
                destination_port,
            }
        }
        AddressFamily::Unix => {
            if len < 216 {
                return Err(Error::Pp2Length);
            }
            let mut source = [0u8; 108];
            let mut destination = [0u8; 108];
            source.copy_from_slice(&buf[cursor..cursor + 108]);
            destination.copy_from_slice(&buf[cursor + 108..cursor + 216]);
            cursor += 216;
            Addresses::Unix {
                source,
                destination,
            }
        }
    };

    let mut info = EndpointInfo::new(addresses, transport);
    info.v2_options_mut().local = local;

    let mut remaining = len - (cursor - 16);
    let mut pos = cursor;
    while remaining >= 3 {
        let kind = buf[pos];
        let tlv_len = usize::from(u16::from_be_bytes([buf[pos + 1], buf[pos + 2]]));
        let offset = 3 + tlv_len;
        if offset > remaining {
            return Err(Error::Pp2TlvLength);
        }
        let value = &buf[pos + 3..pos + 3 + tlv_len];

        match Type::from_u8(kind) {
            Some(Type::Alpn) => info.tlvs_mut().push(Type::Alpn, value),
            Some(Type::Authority) => info.tlvs_mut().push(Type::Authority, value),
            Some(Type::Crc32c) => {
                if tlv_len != 4 {
                    return Err(Error::Pp2TypeCrc32c);
                }
                let mut scratch = buf[..total].to_vec();
                scratch[pos + 3..pos + 3 + 4].fill(0);
                let computed = crc32c(&scratch);
                let received = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
                if computed != received {
                    return Err(Error::Pp2TypeCrc32c);
                }
                info.tlvs_mut().push_raw(kind, value.to_vec());
                info.v2_options_mut().crc32c = true;
            }
            Some(Type::NoOp) => {}
            Some(Type::UniqueId) => {
                if tlv_len > 128 {
                    return Err(Error::Pp2TypeUniqueId);
                }
                info.tlvs_mut().push(Type::UniqueId, value);
            }
            Some(Type::Ssl) => parse_ssl_tlv(value, &mut info)?,
            Some(Type::NetNs) => {
                let mut owned = value.to_vec();
                owned.push(0);
                info.tlvs_mut().push_raw(kind, owned);
            }
            Some(Type::Aws) => {
                if value.is_empty() {
                    return Err(Error::Pp2TypeAws);
                }
                if value[0] == Type::AWS_VPCE_ID {
                    let mut owned = value.to_vec();
                    owned.push(0);
                    info.tlvs_mut().push_raw(kind, owned);
                }
            }
            Some(Type::Azure) => {
                if value.len() < 5 {
                    return Err(Error::Pp2TypeAzure);
                }
                if value[0] == Type::AZURE_PRIVATEENDPOINT_LINKID {
                    info.tlvs_mut().push_raw(kind, value.to_vec());
                }
            }
            _ => {}
        }

        pos += offset;
        remaining -= offset;
    }

    Ok(Some((info, total)))
}

/// Renders `info` as a v2 header, including TLVs, alignment padding, and an
/// optional CRC32c trailer.
pub(crate) fn emit(info: &EndpointInfo) -> Result<Vec<u8>, Error> {
    let family = info.address_family();
    let cmd_nibble = match family {
        AddressFamily::Unspecified => {
            if !info.v2_options().local {
                return Err(Error::Pp2Command);
            }
            0u8
        }
        _ => 1u8,
    };
    let ver_cmd = 0x20 | cmd_nibble;
    let fam_byte = (address_family_nibble(family) << 4) | transport_nibble(info.transport());

    let mut addr_bytes = Vec::new();
    match info.addresses() {
        Addresses::Unspecified => {}
        Addresses::Ipv4 {
            source,
            destination,
            source_port,
            destination_port,
        } => {
            addr_bytes.extend_from_slice(&source.octets());
            addr_bytes.extend_from_slice(&destination.octets());
            addr_bytes.extend_from_slice(&source_port.to_be_bytes());
            addr_bytes.extend_from_slice(&destination_port.to_be_bytes());
        }
        Addresses::Ipv6 {
            source,
            destination,
            source_port,
            destination_port,
        } => {
            addr_bytes.extend_from_slice(&source.octets());
            addr_bytes.extend_from_slice(&destination.octets());
            addr_bytes.extend_from_slice(&source_port.to_be_bytes());
            addr_bytes.extend_from_slice(&destination_port.to_be_bytes());
        }
        Addresses::Unix {
            source,
            destination,
        } => {
            addr_bytes.extend_from_slice(source);
            addr_bytes.extend_from_slice(destination);
        }
    }

    let mut tlv_bytes = Vec::new();
    for tlv in info.tlvs().iter() {
        if is_ssl_subtype(tlv.kind()) {
            continue;
        }
        push_tlv(&mut tlv_bytes, tlv.kind(), wire_value(tlv.kind(), tlv.value()));
    }
    if let Some(ssl) = info.v2_options().ssl {
        let composed = compose_ssl_value(info, ssl);
        push_tlv(&mut tlv_bytes, Type::Ssl.into(), &composed);
    }

    let mut len = addr_bytes.len() + tlv_bytes.len();
    if info.v2_options().crc32c {
        len += 3 + 4;
    }
    let mut header_len = 16 + len;

    let mut padding_bytes = 0usize;
    let mut pad_present = false;
    let alignment_power = info.v2_options().alignment_power;
    if alignment_power > 1 {
        let align = 1usize << alignment_power;
        if header_len % align != 0 {
            let mut padded = (header_len / align + 1) * align;
            if padded - header_len < 3 {
                padded += align;
            }
            padding_bytes = padded - 16 - len - 3;
            header_len = padded;
            len = padded - 16;
            pad_present = true;
        }
    }

    if len > usize::from(u16::MAX) {
        return Err(Error::Pp2Length);
    }

    let mut out = Vec::with_capacity(header_len);
    out.extend_from_slice(SIGNATURE);
    out.push(ver_cmd);
    out.push(fam_byte);
    out.extend_from_slice(&(len as u16).to_be_bytes());
    out.extend_from_slice(&addr_bytes);
    out.extend_from_slice(&tlv_bytes);

    if pad_present {
        out.push(Type::NoOp.into());
        out.extend_from_slice(&(padding_bytes as u16).to_be_bytes());
        out.extend(std::iter::repeat(0u8).take(padding_bytes));
    }

    if info.v2_options().crc32c {
        out.push(Type::Crc32c.into());
        out.extend_from_slice(&4u16.to_be_bytes());
        let crc_pos = out.len();
        out.extend_from_slice(&[0, 0, 0, 0]);
        let crc = crc32c(&out);
        out[crc_pos..crc_pos + 4].copy_from_slice(&crc.to_be_bytes());
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipv4_proxy_header() {
        let mut buf = SIGNATURE.to_vec();
        buf.push(0x21);
        buf.push(0x11);
        buf.extend_from_slice(&12u16.to_be_bytes());
        buf.extend_from_slice(&[192, 168, 0, 1]);
        buf.extend_from_slice(&[192, 168, 0, 2]);
        buf.extend_from_slice(&54321u16.to_be_bytes());
        buf.extend_from_slice(&80u16.to_be_bytes());

        let (info, consumed) = parse(&buf).unwrap().unwrap();
        assert_eq!(consumed, 28);
        assert_eq!(info.address_family(), AddressFamily::Inet);
        assert_eq!(info.transport(), TransportProtocol::Stream);
    }

    #[test]
    fn parses_local_healthcheck() {
        let mut buf = SIGNATURE.to_vec();
        buf.push(0x20);
        buf.push(0x00);
        buf.extend_from_slice(&0u16.to_be_bytes());

        let (info, consumed) = parse(&buf).unwrap().unwrap();
        assert_eq!(consumed, 16);
        assert_eq!(info.address_family(), AddressFamily::Unspecified);
        assert!(info.v2_options().local);
    }

    #[test]
    fn emit_then_parse_round_trips_unique_id() {
        let mut info = EndpointInfo::new(
            Addresses::Ipv4 {
                source: "10.0.0.1".parse().unwrap(),
                destination: "10.0.0.2".parse().unwrap(),
                source_port: 1111,
                destination_port: 2222,
            },
            TransportProtocol::Stream,
        );
        info.add_unique_id(b"abcd").unwrap();

        let bytes = emit(&info).unwrap();
        let (parsed, consumed) = parse(&bytes).unwrap().unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed.unique_id(), Some(b"abcd".as_slice()));
    }

    #[test]
    fn netns_wire_length_excludes_terminator() {
        let mut info = EndpointInfo::new(
            Addresses::Ipv4 {
                source: "10.0.0.1".parse().unwrap(),
                destination: "10.0.0.2".parse().unwrap(),
                source_port: 1111,
                destination_port: 2222,
            },
            TransportProtocol::Stream,
        );
        info.add_netns(b"ns0").unwrap();

        let bytes = emit(&info).unwrap();
        let tlv_pos = 16 + 12; // fixed header + ipv4 addr block
        assert_eq!(
            u16::from_be_bytes([bytes[tlv_pos + 1], bytes[tlv_pos + 2]]),
            3,
            "wire length must exclude the internal NUL terminator"
        );

        let (parsed, consumed) = parse(&bytes).unwrap().unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed.netns(), Some(b"ns0".as_slice()));
    }

    #[test]
    fn aws_vpce_round_trips_without_growing_a_nul_each_pass() {
        let mut info = EndpointInfo::new(
            Addresses::Ipv4 {
                source: "10.0.0.1".parse().unwrap(),
                destination: "10.0.0.2".parse().unwrap(),
                source_port: 1111,
                destination_port: 2222,
            },
            TransportProtocol::Stream,
        );
        info.add_aws_vpce_id(b"vpce-1").unwrap();

        let once = emit(&info).unwrap();
        let (parsed, _) = parse(&once).unwrap().unwrap();
        assert_eq!(parsed.aws_vpce_id(), Some(b"vpce-1".as_slice()));

        let twice = emit(&parsed).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn crc_tamper_is_detected() {
        let mut info = EndpointInfo::new(
            Addresses::Ipv4 {
                source: "1.1.1.1".parse().unwrap(),
                destination: "2.2.2.2".parse().unwrap(),
                source_port: 1,
                destination_port: 2,
            },
            TransportProtocol::Stream,
        );
        info.v2_options_mut().crc32c = true;

        let mut bytes = emit(&info).unwrap();
        bytes[20] ^= 0x01;
        let err = parse(&bytes).unwrap_err();
        assert_eq!(err, Error::Pp2TypeCrc32c);
    }

    #[test]
    fn alignment_pads_to_multiple() {
        let mut info = EndpointInfo::new(Addresses::Unspecified, TransportProtocol::Unspecified);
        info.v2_options_mut().local = true;
        info.v2_options_mut().alignment_power = 6; // 64-byte alignment

        let bytes = emit(&info).unwrap();
        assert_eq!(bytes.len() % 64, 0);
    }
}
