//! Client Communication Module
//!
//! Both directions of the client/driver conversation live here:
//!
//! - `proxy`: the driver's [`ResponseChannel`] and its [`ClientProxy`]
//!   implementation, which sends error responses to clients
//! - `driver_proxy`: the client's [`DriverProxy`], which writes commands to
//!   the command queue
//! - `responses`: client-side decoding of error responses

pub mod driver_proxy;
pub mod proxy;
pub mod responses;

pub use driver_proxy::DriverProxy;
pub use proxy::{ClientProxy, ResponseChannel};
pub use responses::{read_error_responses, ErrorResponse};
