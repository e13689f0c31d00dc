//! Capability interfaces shared between the virtual core and the GDB remote
//! serial protocol server.
//!
//! The server is written against the [`CoreOps`] trait rather than a
//! concrete core implementation, mirroring the original simulator's
//! function-pointer "comm" table: the server borrows *some* core for the
//! duration of a session and never needs to know its concrete type.

mod addr;
mod ops;
mod step;

pub use addr::{classify, AddrSpace, EEPROM_OFFSET, FLASH_OFFSET, SRAM_OFFSET};
pub use ops::CoreOps;
pub use step::{Error, StepResult};
