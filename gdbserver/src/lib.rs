//! GDB remote serial protocol debug server, generic over any
//! [`avrsim_arch::CoreOps`].

mod codec;
mod dispatcher;
mod hex;
pub mod server;

pub use dispatcher::{Action, Dispatcher};
pub use server::{install_cancel_handler, serve, ServerConfig};
