//! In-process relay on tokio channels.
//!
//! Frames are encoded to JSON on send and decoded on delivery, so the
//! wire format is exercised even without a network.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use super::transport::{Frame, RouteTarget, SocketId, Transport};

struct Route {
    user_id: String,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct Routes {
    sockets: HashMap<SocketId, Route>,
    groups: HashMap<String, BTreeSet<SocketId>>,
}

/// Relay shared by every loopback connection.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    routes: Arc<Mutex<Routes>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection for `user_id`.
    pub fn connect(&self, user_id: &str) -> (LoopbackTransport, FrameReceiver) {
        let socket_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        self.routes.lock().sockets.insert(
            socket_id.clone(),
            Route {
                user_id: user_id.to_string(),
                tx,
            },
        );
        debug!(socket = %socket_id, user = user_id, "Loopback connection opened");

        let transport = LoopbackTransport {
            socket_id,
            routes: Arc::clone(&self.routes),
        };
        (transport, FrameReceiver { rx })
    }

    /// Close a connection. Its receiver sees the end of the stream.
    pub fn disconnect(&self, socket_id: &str) {
        let mut routes = self.routes.lock();
        routes.sockets.remove(socket_id);
        for members in routes.groups.values_mut() {
            members.remove(socket_id);
        }
    }

    /// Subscribe a connection to a group's traffic.
    pub fn join_group(&self, group_id: &str, socket_id: &str) {
        self.routes
            .lock()
            .groups
            .entry(group_id.to_string())
            .or_default()
            .insert(socket_id.to_string());
    }

    pub fn connection_count(&self) -> usize {
        self.routes.lock().sockets.len()
    }
}

/// Sending half of a loopback connection.
pub struct LoopbackTransport {
    socket_id: SocketId,
    routes: Arc<Mutex<Routes>>,
}

impl Transport for LoopbackTransport {
    fn socket_id(&self) -> &str {
        &self.socket_id
    }

    fn send(&self, frame: Frame) -> Result<()> {
        let encoded = frame.to_json()?;
        let routes = self.routes.lock();

        let targets: Vec<&SocketId> = match &frame.target {
            RouteTarget::Partner { user_id } => routes
                .sockets
                .iter()
                .filter(|(_, route)| &route.user_id == user_id)
                .map(|(id, _)| id)
                .collect(),
            RouteTarget::Group { group_id } => routes
                .groups
                .get(group_id)
                .map(|members| members.iter().filter(|id| **id != self.socket_id).collect())
                .unwrap_or_default(),
            RouteTarget::Socket { socket_id } => routes
                .sockets
                .keys()
                .filter(|id| *id == socket_id)
                .collect(),
            RouteTarget::Broadcast => routes
                .sockets
                .keys()
                .filter(|id| **id != self.socket_id)
                .collect(),
        };

        if targets.is_empty() {
            return Err(anyhow!("No route for frame to {:?}", frame.target));
        }

        for id in targets {
            if let Some(route) = routes.sockets.get(id) {
                // A closed receiver just means that peer went away.
                if route.tx.send(encoded.clone()).is_err() {
                    trace!(socket = %id, "Dropping frame for closed connection");
                }
            }
        }
        Ok(())
    }
}

/// Receiving half of a loopback connection.
pub struct FrameReceiver {
    rx: mpsc::UnboundedReceiver<String>,
}

impl FrameReceiver {
    /// Next frame, or `None` once the connection is closed.
    pub async fn recv(&mut self) -> Option<Result<Frame>> {
        let raw = self.rx.recv().await?;
        Some(Frame::from_json(&raw))
    }

    /// Next frame if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Result<Frame>> {
        let raw = self.rx.try_recv().ok()?;
        Some(Frame::from_json(&raw))
    }
}
