//! A minimal [Modbus](http://modbus.org/) TCP server built on [Tokio](https://docs.rs/tokio).
//!
//! The server owns an in-memory [RegisterStore] with four tables (coils, discrete inputs,
//! holding registers and input registers) and serves it to one client at a time.
//!
//! # Supported Functions
//!
//! * Read Coils
//! * Read Discrete Inputs
//! * Read Holding Registers
//! * Read Input Registers
//! * Write Single Coil
//! * Write Single Register
//! * Write Multiple Coils
//! * Write Multiple Registers
//! * Mask Write Register
//! * Read/Write Multiple Registers
//!
//! Any other function code is answered with an `IllegalFunction` exception.
//!
//! # Example
//!
//! ```no_run
//! use mbserve::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = RegisterStore::create(StoreSizes::full())?;
//!     store.seed_identity_holding_registers();
//!
//!     let config = ServerConfig::new("127.0.0.1:502".parse()?)
//!         .with_decode(DecodeLevel::new(
//!             AppDecodeLevel::DataHeaders,
//!             FrameDecodeLevel::Header,
//!             PhysDecodeLevel::Nothing,
//!         ));
//!
//!     let server = spawn_tcp_server_task(config, store.wrap()).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

/// Modbus constants and per-function limits
pub mod constants;

mod common;
mod decode;
mod error;
mod exception;
mod server;
mod store;
mod tcp;
mod types;

pub use crate::decode::*;
pub use crate::error::*;
pub use crate::exception::*;
pub use crate::server::*;
pub use crate::store::*;
pub use crate::types::{AddressRange, Indexed, UnitId};
