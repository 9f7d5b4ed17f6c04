//! Outbound ports - Interfaces for the bridge's collaborators
//!
//! The connection bridge never reaches for a global store or a concrete
//! socket. It is handed a [`HostPort`] (dispatch + session getter) and a
//! [`SocketConnector`] at construction.

pub mod host_port;
pub mod socket_port;

pub use host_port::HostPort;
pub use socket_port::{
    HandleId, SocketConnector, SocketEnvelope, SocketEvent, SocketEvents, SocketHandle,
    SocketState,
};

#[cfg(any(test, feature = "testing"))]
pub use host_port::MockHostPort;
#[cfg(any(test, feature = "testing"))]
pub use socket_port::{MockSocketConnector, MockSocketHandle};
