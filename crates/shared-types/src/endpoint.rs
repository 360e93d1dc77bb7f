//! # Endpoint Descriptor
//!
//! Identifies a bind/connect target: the transport kind plus the
//! transport-specific address (host/port for Tcp, a name for InProc).
//!
//! Textual form:
//!
//! ```text
//! tcp://localhost:5555
//! inproc://orders
//! ```

use crate::errors::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transport kinds supported by the socket layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Real network stream connection.
    Tcp,
    /// Paired in-memory channel inside one process.
    InProc,
}

impl TransportKind {
    /// URL scheme used in the textual endpoint form.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::InProc => "inproc",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Immutable address descriptor for a bind or connect target.
///
/// Equality is by field value. Created by the caller before `bind`/`connect`
/// and never mutated afterwards; a listener bound to port 0 reports its real
/// address through a *new* endpoint (see [`Endpoint::with_port`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    transport: TransportKind,
    host: String,
    port: u16,
    name: Option<String>,
}

impl Endpoint {
    /// Tcp endpoint at `host:port`.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            transport: TransportKind::Tcp,
            host: host.into(),
            port,
            name: None,
        }
    }

    /// In-process endpoint registered under `name`.
    #[must_use]
    pub fn in_proc(name: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::InProc,
            host: String::new(),
            port: 0,
            name: Some(name.into()),
        }
    }

    /// The transport kind.
    #[must_use]
    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Host part (empty for InProc).
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port (0 for InProc).
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// InProc name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// `host:port` string suitable for socket address resolution.
    #[must_use]
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Copy of this endpoint with a different port.
    #[must_use]
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            port,
            ..self.clone()
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transport {
            TransportKind::Tcp => write!(f, "tcp://{}:{}", self.host, self.port),
            TransportKind::InProc => {
                write!(f, "inproc://{}", self.name.as_deref().unwrap_or_default())
            }
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidEndpoint(s.to_string());

        let (scheme, rest) = s.split_once("://").ok_or_else(invalid)?;
        match scheme {
            "tcp" => {
                let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
                if host.is_empty() {
                    return Err(invalid());
                }
                let port = port.parse::<u16>().map_err(|_| invalid())?;
                Ok(Self::tcp(host, port))
            }
            "inproc" => {
                if rest.is_empty() {
                    return Err(invalid());
                }
                Ok(Self::in_proc(rest))
            }
            _ => Err(invalid()),
        }
    }
}
