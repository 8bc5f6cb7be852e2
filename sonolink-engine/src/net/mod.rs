//! Remote delivery: listener registry, stream encoding, and the paced
//! transport that frames audio for embedded receivers.

pub mod encoder;
pub mod registry;
pub mod transport;

pub use encoder::OpusStreamEncoder;
pub use registry::{DeviceRegistry, RemoteListener, TcpRemoteListener};
pub use transport::RemoteOutputTransport;
