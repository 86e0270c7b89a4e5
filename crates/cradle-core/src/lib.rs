// cradle-core: Connection facade and typed event feeds between
// cradle-api and consumers (UI layers, automation).

pub mod config;
pub mod demux;
pub mod error;
pub mod feed;
pub mod heartbeat;
pub mod model;
pub mod monitor;
pub mod registry;
pub mod replay;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::MonitorConfig;
pub use error::CoreError;
pub use feed::{Feed, FeedStream};
pub use heartbeat::HeartbeatMonitor;
pub use model::{Alarm, ConnectionState, Device, Movement, Volume};
pub use monitor::DeviceMonitor;
pub use registry::{DeviceRegistry, MemoryRegistry};
pub use replay::ReplayBuffer;

// Collaborator interfaces and wire types live in the api crate; re-export
// the ones consumers need so they rarely import cradle-api directly.
pub use cradle_api::{Advertise, Command, DeviceOperation, Envelope, LivenessProbe};
