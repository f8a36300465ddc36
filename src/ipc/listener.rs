//! Control socket listener thread
//!
//! Accepts connections on a plain thread and forwards each decoded call to the
//! event loop, which owns the badge. The reply travels back on a oneshot.

use anyhow::{Context, Result};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::{ControlServer, MethodCall, MethodReply, read_frame, write_message};
use crate::constants::control::{MAX_CONNECTIONS, REFUSE_READ_TIMEOUT_MS};
use crate::control::ControlError;

/// A call waiting for the event loop
#[derive(Debug)]
pub struct ControlCall {
    pub request: MethodCall,
    pub reply: oneshot::Sender<MethodReply>,
}

/// Spawn the accept loop; the server itself stays with the caller for cleanup
pub fn spawn_control_listener(
    server: &ControlServer,
    calls: mpsc::Sender<ControlCall>,
) -> Result<std::thread::JoinHandle<()>> {
    let listener = server.try_clone_listener()?;
    let socket = server.path().to_path_buf();
    std::thread::Builder::new()
        .name("control-listener".to_string())
        .spawn(move || {
            info!(socket = %socket.display(), "Control listener started");
            run_accept_loop(&listener, &calls, MAX_CONNECTIONS);
            debug!("Control listener stopped");
        })
        .context("Failed to spawn control listener thread")
}

/// Holds one slot of the connection budget until dropped
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(open: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        open.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| Self(Arc::clone(open)))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

fn run_accept_loop(listener: &UnixListener, calls: &mpsc::Sender<ControlCall>, max_connections: usize) {
    let open = Arc::new(AtomicUsize::new(0));
    for stream in listener.incoming() {
        if calls.is_closed() {
            break;
        }
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Failed to accept control connection");
                continue;
            }
        };

        let Some(slot) = ConnectionSlot::acquire(&open, max_connections) else {
            warn!(max = max_connections, "Too many control connections, refusing one");
            refuse(stream, max_connections);
            continue;
        };

        let calls = calls.clone();
        let spawned = std::thread::Builder::new()
            .name("control-conn".to_string())
            .spawn(move || {
                let _slot = slot;
                if let Err(e) = serve_connection(stream, &calls) {
                    debug!(error = ?e, "Control connection ended with error");
                }
            });
        if let Err(e) = spawned {
            error!(error = %e, "Failed to spawn control connection thread");
        }
    }
}

/// Answer the first request of a peer over the budget with `Busy`, then hang up
fn refuse(mut stream: UnixStream, max_connections: usize) {
    let timeout = Some(Duration::from_millis(REFUSE_READ_TIMEOUT_MS));
    if let Err(e) = stream.set_read_timeout(timeout) {
        debug!(error = %e, "Failed to set read timeout on refused connection");
    }
    if let Err(e) = read_frame(&mut stream) {
        debug!(error = ?e, "Refused peer sent no request");
    }
    let reply: MethodReply = ControlError::Busy(max_connections).into();
    if let Err(e) = write_message(&mut stream, &reply) {
        debug!(error = ?e, "Failed to send busy reply");
    }
}

/// Answer calls on one connection until the peer hangs up
fn serve_connection(mut stream: UnixStream, calls: &mpsc::Sender<ControlCall>) -> Result<()> {
    while let Some(frame) = read_frame(&mut stream)? {
        let reply = match serde_json::from_slice::<MethodCall>(&frame) {
            Ok(request) => forward(request, calls),
            Err(e) => {
                warn!(error = %e, "Malformed control request");
                ControlError::InvalidRequest(e.to_string()).into()
            }
        };
        write_message(&mut stream, &reply)?;
    }
    Ok(())
}

fn forward(request: MethodCall, calls: &mpsc::Sender<ControlCall>) -> MethodReply {
    let method = request.method.clone();
    let (reply_tx, reply_rx) = oneshot::channel();
    if calls
        .blocking_send(ControlCall {
            request,
            reply: reply_tx,
        })
        .is_err()
    {
        warn!(method = %method, "Event loop gone, dropping control call");
        return ControlError::ShuttingDown.into();
    }
    reply_rx
        .blocking_recv()
        .unwrap_or_else(|_| ControlError::ShuttingDown.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::ControlClient;
    use serde_json::json;
    use tempfile::TempDir;

    /// Stand-in for the event loop: echoes the method name back
    fn spawn_echo_loop(mut rx: mpsc::Receiver<ControlCall>) -> std::thread::JoinHandle<usize> {
        std::thread::spawn(move || {
            let mut served = 0;
            while let Some(call) = rx.blocking_recv() {
                served += 1;
                let _ = call.reply.send(MethodReply::Return {
                    value: Some(call.request.method),
                });
            }
            served
        })
    }

    #[test]
    fn test_call_round_trip_through_listener() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("control.sock");
        let server = ControlServer::bind_to(path.clone()).expect("Failed to bind");

        let (tx, rx) = mpsc::channel(4);
        let _listener = spawn_control_listener(&server, tx).expect("Failed to spawn listener");
        let echo = spawn_echo_loop(rx);

        let mut client = ControlClient::connect_to(&path).expect("Failed to connect");
        let first = client.call(&MethodCall::bare("GetState")).unwrap();
        let second = client
            .call(&MethodCall::new("SetState", vec![json!("idle")]))
            .unwrap();

        assert_eq!(first, MethodReply::Return { value: Some("GetState".into()) });
        assert_eq!(second, MethodReply::Return { value: Some("SetState".into()) });
        drop(client);
        drop(server);
        drop(echo);
    }

    #[test]
    fn test_connections_over_budget_are_refused() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("control.sock");
        let server = ControlServer::bind_to(path.clone()).expect("Failed to bind");
        let listener = server.try_clone_listener().expect("Failed to clone listener");

        let (tx, rx) = mpsc::channel(4);
        std::thread::spawn(move || run_accept_loop(&listener, &tx, 1));
        let _echo = spawn_echo_loop(rx);

        let mut first = ControlClient::connect_to(&path).expect("Failed to connect");
        // The first connection holds the only slot once it has been served
        assert_eq!(
            first.call(&MethodCall::bare("Ping")).unwrap(),
            MethodReply::Return { value: Some("Ping".into()) }
        );

        let mut second = ControlClient::connect_to(&path).expect("Failed to connect");
        match second.call(&MethodCall::bare("Ping")).unwrap() {
            MethodReply::Error { name, .. } => assert_eq!(name, "Busy"),
            other => panic!("expected busy reply, got {other:?}"),
        }
    }

    #[test]
    fn test_slot_released_on_drop() {
        let open = Arc::new(AtomicUsize::new(0));

        let slot = ConnectionSlot::acquire(&open, 1).unwrap();
        assert!(ConnectionSlot::acquire(&open, 1).is_none());
        drop(slot);

        assert!(ConnectionSlot::acquire(&open, 1).is_some());
    }

    #[test]
    fn test_malformed_request_gets_error_reply() {
        let (mut client, server_side) = UnixStream::pair().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let conn = std::thread::spawn(move || serve_connection(server_side, &tx));

        crate::ipc::write_frame(&mut client, b"not json").unwrap();
        let reply: MethodReply = crate::ipc::read_message(&mut client).unwrap().unwrap();
        drop(client);

        match reply {
            MethodReply::Error { name, .. } => assert_eq!(name, "InvalidRequest"),
            other => panic!("expected error reply, got {other:?}"),
        }
        conn.join().unwrap().unwrap();
    }

    #[test]
    fn test_closed_loop_replies_shutting_down() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let reply = forward(MethodCall::bare("Ping"), &tx);

        assert!(matches!(reply, MethodReply::Error { ref name, .. } if name == "ShuttingDown"));
    }
}
