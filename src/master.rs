// Part of ethercat-al. Copyright 2026 by the authors.
// This work is dual-licensed under Apache 2.0 and MIT terms.

use crate::types::{AlState, SlaveDescriptor};
use std::{io, time::Duration};

/// The EtherCAT master stack this crate drives.
///
/// Implementations own the process image. Slave windows handed out by
/// [`MasterStack::slave`] must index into [`MasterStack::image`] and must not
/// move after [`MasterStack::config_map`]. Slave index 0 addresses all slaves
/// at once.
pub trait MasterStack {
    /// Bind to a network interface.
    fn init(&mut self, ifname: &str) -> io::Result<()>;

    /// Discover and configure slaves, returning how many were found.
    fn config_init(&mut self) -> u16;

    /// Assign every slave its windows in the process image, returning the
    /// number of image bytes in use.
    fn config_map(&mut self) -> usize;

    /// Set up distributed clocks, returning whether any were found.
    fn config_dc(&mut self) -> bool;

    fn slave_count(&self) -> u16;

    /// Descriptor of slave `index`, or `None` past the slave count.
    fn slave(&self, index: u16) -> Option<SlaveDescriptor>;

    /// Expected working counter of a complete cycle.
    fn expected_wkc(&self) -> u16;

    fn image(&self) -> &[u8];

    fn image_mut(&mut self) -> &mut [u8];

    /// Queue the current output windows onto the wire.
    fn send_processdata(&mut self) -> bool;

    /// Wait up to `timeout` for the frame to come back, refreshing the input
    /// windows. Returns the working counter, or `None` if nothing arrived.
    fn receive_processdata(&mut self, timeout: Duration) -> Option<u16>;

    /// Wait up to `timeout` for `slave` to reach `target`, returning the state
    /// it was last seen in.
    fn state_check(&mut self, slave: u16, target: AlState, timeout: Duration) -> AlState;

    /// Request `state` for `slave`.
    fn write_state(&mut self, slave: u16, state: AlState) -> bool;
}
