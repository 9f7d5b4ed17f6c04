//! Test-only infrastructure fakes.
//!
//! These implement the outbound ports so the bridge can be driven through
//! full connection scenarios without a network.

pub mod fake_socket;
pub mod recording_host;

pub use fake_socket::{FakeConnector, FakeSocket};
pub use recording_host::RecordingHost;
