use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Result, TransportError};

/// The family of byte source a session is reading from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    UnixSocket,
    Stdin,
    File,
    /// In-memory or otherwise caller-driven source.
    Memory,
}

impl TransportKind {
    /// Short lowercase name for logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::UnixSocket => "unix-socket",
            TransportKind::Stdin => "stdin",
            TransportKind::File => "file",
            TransportKind::Memory => "memory",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the transport a session is bound to.
///
/// Handed to every subsystem on attach so it can tell connections apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportInfo {
    pub name: String,
    pub kind: TransportKind,
}

impl TransportInfo {
    pub fn new(name: impl Into<String>, kind: TransportKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Transport info for a caller-driven source (tests, replay buffers).
    pub fn memory(name: impl Into<String>) -> Self {
        Self::new(name, TransportKind::Memory)
    }
}

impl fmt::Display for TransportInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// A readable byte source.
///
/// Only the receive direction is modelled; transmit-side buffering is not a
/// concern of the hub.
pub struct ByteStream {
    inner: ByteStreamInner,
    info: TransportInfo,
}

enum ByteStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Stdin(std::io::Stdin),
    File(File),
}

impl Read for ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            ByteStreamInner::Unix(stream) => stream.read(buf),
            ByteStreamInner::Stdin(stdin) => stdin.read(buf),
            ByteStreamInner::File(file) => file.read(buf),
        }
    }
}

impl ByteStream {
    /// Wrap an accepted or connected Unix domain socket.
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream, name: String) -> Self {
        Self {
            inner: ByteStreamInner::Unix(stream),
            info: TransportInfo::new(name, TransportKind::UnixSocket),
        }
    }

    /// Read from the process's standard input.
    pub fn stdin() -> Self {
        Self {
            inner: ByteStreamInner::Stdin(std::io::stdin()),
            info: TransportInfo::new("stdin", TransportKind::Stdin),
        }
    }

    /// Open a file (or device node) for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| TransportError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            inner: ByteStreamInner::File(file),
            info: TransportInfo::new(path.display().to_string(), TransportKind::File),
        })
    }

    /// Identity of this stream.
    pub fn info(&self) -> &TransportInfo {
        &self.info
    }

    /// Set a read timeout where the source supports one.
    ///
    /// Stdin and regular files ignore the timeout.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            ByteStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            ByteStreamInner::Stdin(_) | ByteStreamInner::File(_) => Ok(()),
        }
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream")
            .field("kind", &self.info.kind)
            .field("name", &self.info.name)
            .finish()
    }
}
