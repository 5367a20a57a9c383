//! Relay transport: frames, routing, and the client-side handler.

mod handler;
mod loopback;
mod registry;
mod transport;

pub use handler::{FrameHandler, Inbound, SendOutcome, SessionIdentity};
pub use loopback::{FrameReceiver, LoopbackHub, LoopbackTransport};
pub use registry::PeerRegistry;
pub use transport::{
    Frame, FrameBody, IdentityProvider, RouteTarget, SocketId, StaticIdentity, Transport,
};
