//! Building blocks for [`clap`]-driven configuration of lakecat binaries
pub mod cache;
pub mod memory_size;
pub mod object_store;
pub mod socket_addr;
