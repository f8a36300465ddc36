//! Control socket transport
//!
//! Length-prefixed JSON over a Unix domain socket: each frame is a u32
//! little-endian length followed by that many bytes of JSON. Owning the socket
//! path means owning the control surface; a new daemon displaces the old one.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::MetadataExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants::control::{MAX_MESSAGE_SIZE, RUNTIME_DIR, SOCKET_NAME};

mod listener;
mod messages;
pub use listener::{ControlCall, spawn_control_listener};
pub use messages::{MethodCall, MethodReply};

/// Get default socket path (XDG_RUNTIME_DIR with fallback to cache)
pub fn default_socket_path() -> Result<PathBuf> {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR")
        && !runtime_dir.is_empty()
    {
        return Ok(PathBuf::from(runtime_dir).join(RUNTIME_DIR).join(SOCKET_NAME));
    }

    let cache = dirs::cache_dir()
        .context("Failed to determine cache directory (no XDG_RUNTIME_DIR or HOME)")?;
    Ok(cache.join(RUNTIME_DIR).join(SOCKET_NAME))
}

/// Client side of the control socket (used by the CLI subcommands)
pub struct ControlClient {
    stream: UnixStream,
}

impl ControlClient {
    pub fn connect_to(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .context(format!("Failed to connect to ai-overlay at {} (is the daemon running?)", path.display()))?;
        Ok(Self { stream })
    }

    /// Send one call and wait for its reply
    pub fn call(&mut self, call: &MethodCall) -> Result<MethodReply> {
        write_message(&mut self.stream, call)?;
        read_message(&mut self.stream)?
            .ok_or_else(|| anyhow!("Daemon closed the connection before replying to {}", call.method))
    }
}

/// Bound control socket
///
/// Dropping it removes the socket file, but only while the file is still the
/// one this server created.
pub struct ControlServer {
    listener: UnixListener,
    socket_path: PathBuf,
    inode: u64,
}

impl ControlServer {
    /// Bind at `socket_path`, displacing whatever currently lives there
    pub fn bind_to(socket_path: PathBuf) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create socket directory: {}", parent.display()))?;
        }

        match std::fs::remove_file(&socket_path) {
            Ok(()) => info!(socket = %socket_path.display(), "Replaced existing control socket"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).context(format!("Failed to remove stale socket: {}", socket_path.display()));
            }
        }

        let listener = UnixListener::bind(&socket_path)
            .context(format!("Failed to bind socket at {}", socket_path.display()))?;

        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o700))
                .context("Failed to set socket permissions")?;
        }

        let inode = std::fs::symlink_metadata(&socket_path)
            .context(format!("Failed to stat socket at {}", socket_path.display()))?
            .ino();

        Ok(Self {
            listener,
            socket_path,
            inode,
        })
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }

    /// Whether the socket file on disk is still ours
    pub fn owns_path(&self) -> bool {
        std::fs::symlink_metadata(&self.socket_path)
            .map(|meta| meta.ino() == self.inode)
            .unwrap_or(false)
    }

    fn try_clone_listener(&self) -> Result<UnixListener> {
        self.listener.try_clone().context("Failed to clone control socket listener")
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        if self.owns_path() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(socket = %self.socket_path.display(), error = %e, "Failed to remove control socket");
            }
        } else {
            debug!(socket = %self.socket_path.display(), "Control socket taken over by another instance, leaving it");
        }
    }
}

/// Write one length-prefixed frame
pub(crate) fn write_frame<W: Write>(stream: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes (max: {})", payload.len(), MAX_MESSAGE_SIZE));
    }

    let len = payload.len() as u32;
    stream
        .write_all(&len.to_le_bytes())
        .context("Failed to write message length")?;
    stream.write_all(payload).context("Failed to write message payload")?;
    stream.flush().context("Failed to flush stream")?;

    Ok(())
}

/// Read one length-prefixed frame; None on a clean end of stream
pub(crate) fn read_frame<R: Read>(stream: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("Failed to read message length"),
    }
    let len = u32::from_le_bytes(len_buf) as usize;

    // Sanity check (prevent DoS via huge allocation)
    if len > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes (max: {})", len, MAX_MESSAGE_SIZE));
    }

    let mut payload = vec![0u8; len];
    stream
        .read_exact(&mut payload)
        .context("Failed to read message payload")?;
    Ok(Some(payload))
}

pub(crate) fn write_message<W: Write, T: Serialize>(stream: &mut W, msg: &T) -> Result<()> {
    let json = serde_json::to_vec(msg).context("Failed to serialize message to JSON")?;
    write_frame(stream, &json)
}

pub(crate) fn read_message<R: Read, T: for<'de> Deserialize<'de>>(stream: &mut R) -> Result<Option<T>> {
    match read_frame(stream)? {
        Some(payload) => serde_json::from_slice(&payload)
            .map(Some)
            .context("Failed to deserialize message from JSON"),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_message_over_socket_pair() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        let call = MethodCall::new("SetState", vec![json!("thinking")]);

        write_message(&mut a, &call).unwrap();
        let received: Option<MethodCall> = read_message(&mut b).unwrap();

        assert_eq!(received, Some(call));
    }

    #[test]
    fn test_clean_eof_is_not_an_error() {
        let mut empty = Cursor::new(Vec::new());
        let received: Option<MethodCall> = read_message(&mut empty).unwrap();
        assert!(received.is_none());
    }

    #[test]
    fn test_oversized_frame_rejected_before_allocation() {
        let mut bytes = ((MAX_MESSAGE_SIZE + 1) as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        let result = read_frame(&mut Cursor::new(bytes));
        assert!(result.is_err());
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let mut bytes = 10u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{\"me");
        assert!(read_frame(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_new_server_displaces_previous_owner() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("run").join("control.sock");

        let first = ControlServer::bind_to(path.clone()).expect("Failed to bind first server");
        let second = ControlServer::bind_to(path.clone()).expect("Failed to bind second server");
        assert!(!first.owns_path());
        assert!(second.owns_path());

        // The displaced owner must not remove the new socket
        drop(first);
        assert!(path.exists());

        drop(second);
        assert!(!path.exists());
    }
}
