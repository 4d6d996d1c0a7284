// Part of ethercat-al. Copyright 2026 by the authors.
// This work is dual-licensed under Apache 2.0 and MIT terms.

//! 	A thin application layer on top of an EtherCAT master stack.
//!
//! 	The master stack does the hard work (frame I/O, slave configuration, the AL state machine); this crate brings
//! 	the bus up to OPERATIONAL, runs the cyclic process data exchange and gives typed, bounds-checked access to the
//! 	input and output windows every slave owns inside the process image.
//!
//! 	The entry point is [Session], created over any [MasterStack]: [sim::SimMaster] for tests and demos, or
//! 	`soem::SoemMaster` with the `soem` feature.

mod convert;
pub mod image;
mod master;
mod session;
pub mod sim;
#[cfg(feature = "soem")]
pub mod soem;
mod types;

pub use self::{
    image::PdoValue,
    master::MasterStack,
    session::{
        Session, SessionBuilder, CYCLE_TIMEOUT, OP_CHECK_TIMEOUT, OP_RETRIES, PRIME_TIMEOUT,
        STATE_TIMEOUT,
    },
    types::*,
};
