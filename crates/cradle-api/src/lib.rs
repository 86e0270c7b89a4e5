// cradle-api: Async I/O layer for cradle monitor devices.
//
// Everything that touches a socket lives here: the websocket transport
// with its reconnection loop, the UDP broadcast discovery protocol, and
// the HTTP liveness probe. Domain logic (feeds, windowing, the
// connection facade) lives in cradle-core.

pub mod backoff;
pub mod discovery;
pub mod error;
pub mod probe;
pub mod protocol;
pub mod socket;

pub use backoff::ReconnectConfig;
pub use discovery::{Advertise, Discovery, DISCOVERY_PORT};
pub use error::Error;
pub use probe::{HttpProbe, LivenessProbe};
pub use protocol::{Command, DeviceOperation, Envelope};
pub use socket::{SocketDriver, SocketHandle, TransportEvent, DEVICE_PORT};
