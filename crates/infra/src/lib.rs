//! Infrastructure layer: concrete [`Backend`] implementations.
//!
//! The engine only ever talks to the abstract backend contract; this crate
//! supplies the implementations that actually hold data. A SQL or file
//! backend would slot in beside [`memory::MemoryBackend`].
//!
//! [`Backend`]: permgrid_engine::backend::Backend

pub mod memory;

pub use memory::{DataRow, EdgeRow, GroupRow, MemoryBackend, NodeRow};
