//! The [`PgTransport`] trait.
use bytes::{Buf, Bytes, BytesMut};
use std::io;

use crate::{
    Result,
    common::verbose,
    postgres::{
        BackendProtocol, FrontendProtocol, ProtocolError,
        backend::{NoticeResponse, ParameterStatus},
        frontend, oid, Oid,
    },
};

/// A blocking byte stream connected to a postgres backend.
///
/// Startup and authentication are expected to be done by the implementor.
pub trait PgTransport {
    /// Send all of `buf` to the backend.
    fn send(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Receive exactly `len` bytes from the backend.
    fn recv(&mut self, len: usize) -> io::Result<Bytes>;

    /// Negotiated server capabilities.
    fn capabilities(&self) -> &Capabilities;

    /// Mutable access to the capabilities, updated on `ParameterStatus`.
    fn capabilities_mut(&mut self) -> &mut Capabilities;
}

impl<P> PgTransport for &mut P where P: PgTransport + ?Sized {
    fn send(&mut self, buf: &[u8]) -> io::Result<()> {
        P::send(self, buf)
    }

    fn recv(&mut self, len: usize) -> io::Result<Bytes> {
        P::recv(self, len)
    }

    fn capabilities(&self) -> &Capabilities {
        P::capabilities(self)
    }

    fn capabilities_mut(&mut self) -> &mut Capabilities {
        P::capabilities_mut(self)
    }
}

/// An extension trait to provide message level API for [`PgTransport`].
pub trait PgTransportExt: PgTransport {
    /// Encode and send a single message.
    fn send_message<F: FrontendProtocol>(&mut self, message: F) -> io::Result<()> {
        let mut buf = BytesMut::new();
        frontend::write(message, &mut buf);
        self.send(&buf)
    }

    /// Receive a backend message.
    ///
    /// `NoticeResponse` is logged and `ParameterStatus` is applied to the
    /// [`Capabilities`], neither is returned.
    fn recv_message<B: BackendProtocol>(&mut self) -> Result<B> {
        loop {
            let mut header = self.recv(5)?;
            let msgtype = header.get_u8();
            let len = header.get_u32();
            let Some(body_len) = (len as usize).checked_sub(4) else {
                return Err(ProtocolError::malformed("message length less than 4").into());
            };
            let body = self.recv(body_len)?;

            match msgtype {
                NoticeResponse::MSGTYPE => {
                    let _notice = NoticeResponse::decode(msgtype, body)?;
                    #[cfg(feature = "log")]
                    log::warn!("{_notice}");
                },
                ParameterStatus::MSGTYPE => {
                    let status = ParameterStatus::decode(msgtype, body)?;
                    verbose!(name = %status.name, value = %status.value, "parameter status");
                    self.capabilities_mut().apply_parameter_status(&status.name, &status.value);
                },
                _ => {
                    #[cfg(feature = "verbose")]
                    use crate::ext::FmtExt;
                    verbose!(msgtype = %[msgtype].lossy(), len, "recv");
                    return Ok(B::decode(msgtype, body)?);
                },
            }
        }
    }
}

impl<T> PgTransportExt for T where T: PgTransport + ?Sized { }

/// Server capabilities which affect how statements are written.
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// `standard_conforming_strings` is `on`, backslashes in plain string literals are literal.
    pub standard_conforming_strings: bool,
    /// Server understands `E'..'` string literals.
    pub supports_extended_escapes: bool,
    binary_oids: Vec<Oid>,
}

impl Capabilities {
    /// Types sent in binary format by default.
    pub const DEFAULT_BINARY_OIDS: [Oid; 8] = [
        oid::BOOL,
        oid::BYTEA,
        oid::INT2,
        oid::INT4,
        oid::INT8,
        oid::FLOAT4,
        oid::FLOAT8,
        oid::UUID,
    ];

    /// Returns `true` if `oid` can be sent in binary format.
    pub fn supports_binary_transfer_for(&self, oid: Oid) -> bool {
        self.binary_oids.contains(&oid)
    }

    /// Enable binary transfer for `oid`.
    pub fn with_binary_transfer(mut self, oid: Oid) -> Self {
        if !self.binary_oids.contains(&oid) {
            self.binary_oids.push(oid);
        }
        self
    }

    /// Set whether backslashes in plain string literals are literal.
    pub fn with_standard_conforming_strings(mut self, enable: bool) -> Self {
        self.standard_conforming_strings = enable;
        self
    }

    /// Disable binary transfer for `oid`.
    pub fn without_binary_transfer(mut self, oid: Oid) -> Self {
        self.binary_oids.retain(|e| *e != oid);
        self
    }

    /// Apply run-time parameter reported by the server.
    pub fn apply_parameter_status(&mut self, name: &str, value: &str) {
        match name {
            "standard_conforming_strings" => {
                self.standard_conforming_strings = value.eq_ignore_ascii_case("on");
            },
            "server_version" => {
                let mut version = value
                    .split(|e: char| !e.is_ascii_digit())
                    .filter(|e| !e.is_empty())
                    .map(|e| e.parse::<u32>().unwrap_or_default());
                let major = version.next().unwrap_or_default();
                let minor = version.next().unwrap_or_default();
                self.supports_extended_escapes = (major, minor) >= (8, 1);
            },
            _ => {},
        }
    }
}

impl Default for Capabilities {
    /// Capabilities of any supported server, postgres 9.1 onwards.
    fn default() -> Self {
        Self {
            standard_conforming_strings: true,
            supports_extended_escapes: true,
            binary_oids: Self::DEFAULT_BINARY_OIDS.to_vec(),
        }
    }
}


#[cfg(test)]
mod test {
    use super::{mock::MockTransport, *};
    use crate::postgres::backend::{BackendMessage, ParseComplete};

    #[test]
    fn skip_async_messages() {
        let mut io = MockTransport::new();
        io.push(b'N', b"SWARNING\0Mcareful\0\0")
            .push(b'S', b"standard_conforming_strings\0off\0")
            .push(b'1', b"");

        io.recv_message::<ParseComplete>().unwrap();
        assert!(!io.capabilities().standard_conforming_strings);
        assert!(io.recv_message::<BackendMessage>().is_err());
    }

    #[test]
    fn server_version() {
        let mut caps = Capabilities::default();
        caps.apply_parameter_status("server_version", "8.0.26");
        assert!(!caps.supports_extended_escapes);
        caps.apply_parameter_status("server_version", "16.2 (Debian 16.2-1)");
        assert!(caps.supports_extended_escapes);
    }

    #[test]
    fn binary_transfer() {
        let caps = Capabilities::default()
            .with_binary_transfer(oid::DATE)
            .without_binary_transfer(oid::INT8);
        assert!(caps.supports_binary_transfer_for(oid::DATE));
        assert!(!caps.supports_binary_transfer_for(oid::INT8));
        assert!(caps.supports_binary_transfer_for(oid::INT4));
    }
}
