//! Notification socket addressing.

use std::fmt;
use std::io;
use std::path::PathBuf;

use tokio::net::UnixDatagram;

use crate::error::{NotifierError, Result};

/// Resolved address of the service manager's notification socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyAddress {
    /// A datagram socket bound to a filesystem path.
    Path(PathBuf),
    /// A Linux abstract-namespace name, without the leading NUL.
    Abstract(Vec<u8>),
}

impl NotifyAddress {
    /// Parse a raw `NOTIFY_SOCKET` value.
    ///
    /// `@name` denotes the abstract name `name`; anything else is a path.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(NotifierError::invalid_address(raw, "empty address"));
        }

        match raw.strip_prefix('@') {
            Some("") => Err(NotifierError::invalid_address(raw, "empty abstract name")),
            Some(name) => Ok(Self::Abstract(name.as_bytes().to_vec())),
            None => Ok(Self::Path(PathBuf::from(raw))),
        }
    }

    /// The `sun_path` bytes as the kernel sees them.
    ///
    /// Abstract names carry a leading NUL in place of the `@`.
    pub fn to_socket_bytes(&self) -> Vec<u8> {
        match self {
            Self::Path(path) => {
                use std::os::unix::ffi::OsStrExt;
                path.as_os_str().as_bytes().to_vec()
            }
            Self::Abstract(name) => {
                let mut bytes = Vec::with_capacity(name.len() + 1);
                bytes.push(0);
                bytes.extend_from_slice(name);
                bytes
            }
        }
    }

    /// Open an unbound datagram socket connected to this address.
    pub(crate) fn connect(&self) -> io::Result<UnixDatagram> {
        let socket = std::os::unix::net::UnixDatagram::unbound()?;

        match self {
            Self::Path(path) => socket.connect(path)?,
            Self::Abstract(name) => connect_abstract(&socket, name)?,
        }

        socket.set_nonblocking(true)?;
        UnixDatagram::from_std(socket)
    }
}

#[cfg(target_os = "linux")]
fn connect_abstract(socket: &std::os::unix::net::UnixDatagram, name: &[u8]) -> io::Result<()> {
    use std::os::linux::net::SocketAddrExt;

    let addr = std::os::unix::net::SocketAddr::from_abstract_name(name)?;
    socket.connect_addr(&addr)
}

#[cfg(target_os = "android")]
fn connect_abstract(socket: &std::os::unix::net::UnixDatagram, name: &[u8]) -> io::Result<()> {
    use std::os::android::net::SocketAddrExt;

    let addr = std::os::unix::net::SocketAddr::from_abstract_name(name)?;
    socket.connect_addr(&addr)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn connect_abstract(_socket: &std::os::unix::net::UnixDatagram, _name: &[u8]) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "abstract namespace sockets are not supported on this platform",
    ))
}

impl fmt::Display for NotifyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Abstract(name) => write!(f, "@{}", String::from_utf8_lossy(name)),
        }
    }
}
