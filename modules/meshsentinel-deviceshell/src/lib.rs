pub mod circuit_breaker;
pub mod pool;
pub mod russh_transport;
pub mod shell;
pub mod transport;

pub use circuit_breaker::CircuitBreaker;
pub use pool::{parse_membership, NodePool, PeerRecord, PeerStatus};
pub use russh_transport::RusshTransport;
pub use shell::DeviceShell;
pub use transport::{ShellCredentials, ShellTransport};

/// Concrete `DeviceShell` type used in production, backed by `russh`.
pub type MeshDeviceShell = DeviceShell<RusshTransport>;

/// Concrete `NodePool` type used in production.
pub type MeshNodePool = NodePool<RusshTransport>;
