// startwrt-api: Async Rust client for the OpenWrt ubus JSON-RPC API

pub mod error;
pub mod status;
pub mod transport;
pub mod ubus;

pub use error::Error;
pub use status::UbusStatus;
pub use transport::{TlsMode, TransportConfig};
pub use ubus::client::{CallReply, InterceptorId, NULL_SESSION, UbusClient};
pub use ubus::models::{SessionInfo, UciSectionData};
pub use ubus::procedure::{Expect, PreparedCall, Procedure, Shape};
pub use ubus::uci::UciCall;
