//! A PROXY protocol codec, supporting both the text (v1) and binary (v2) wire
//! formats.
//!
//! <https://www.haproxy.org/download/1.8/doc/proxy-protocol.txt>
//!
//! This crate only implements the codec: turning a received byte buffer into
//! an [`EndpointInfo`] and turning an [`EndpointInfo`] back into bytes. Reading
//! the header off a socket, deciding what to do with the parsed addresses, and
//! everything else connection-shaped is left to the caller.
//!
//! ```
//! use proxyproto::{parse, Version};
//!
//! let (info, consumed) = parse(b"PROXY TCP4 127.0.0.1 127.0.0.1 443 65535\r\n")
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(consumed, 42);
//!
//! let bytes = info.emit(Version::One).unwrap();
//! assert_eq!(bytes, b"PROXY TCP4 127.0.0.1 127.0.0.1 443 65535\r\n");
//! ```

#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod crc32c;
mod endpoint;
mod error;
mod protocol;
mod tlv;

pub use endpoint::{
    AddressFamily, Addresses, EndpointInfo, SslInfo, TransportProtocol, V2Options, Version,
};
pub use error::Error;
pub use protocol::parse;
pub use tlv::{RawTlv, TlvBuildError, TlvStore, Type as TlvType};
