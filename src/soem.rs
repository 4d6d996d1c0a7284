// Part of ethercat-al. Copyright 2026 by the authors.
// This work is dual-licensed under Apache 2.0 and MIT terms.

//! Master stack backed by the SOEM C library.
//!
//! SOEM keeps its slave table, groups and socket in process-wide globals, so
//! only one [`SoemMaster`] may exist at a time.

use libc::c_int;
use soem_sys as ec;
use std::{
    io, ptr, slice,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use crate::convert::{c_array_to_string, interface_name};
use crate::master::MasterStack;
use crate::types::*;

static IN_USE: AtomicBool = AtomicBool::new(false);

/// The SOEM global context, owning the process image SOEM maps into.
pub struct SoemMaster {
    iomap: *mut u8,
    size: usize,
    bound: bool,
}

// The context is only ever touched through the one owning handle.
unsafe impl Send for SoemMaster {}

fn micros(timeout: Duration) -> c_int {
    c_int::try_from(timeout.as_micros()).unwrap_or(c_int::MAX)
}

impl SoemMaster {
    pub fn new() -> Result<Self> {
        Self::with_image_size(DEFAULT_IMAGE_SIZE)
    }

    pub fn with_image_size(size: usize) -> Result<Self> {
        if IN_USE.swap(true, Ordering::AcqRel) {
            return Err(Error::Busy);
        }
        let iomap = Box::into_raw(vec![0u8; size].into_boxed_slice()) as *mut u8;
        Ok(SoemMaster {
            iomap,
            size,
            bound: false,
        })
    }

    fn offset(&self, data: *mut u8) -> usize {
        if data.is_null() {
            0
        } else {
            (data as usize).saturating_sub(self.iomap as usize)
        }
    }
}

impl Drop for SoemMaster {
    fn drop(&mut self) {
        if self.bound {
            unsafe { ec::ec_close() };
        }
        unsafe {
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(self.iomap, self.size)));
        }
        IN_USE.store(false, Ordering::Release);
    }
}

impl MasterStack for SoemMaster {
    fn init(&mut self, ifname: &str) -> io::Result<()> {
        let name = interface_name(ifname)?;
        if unsafe { ec::ec_init(name.as_ptr()) } <= 0 {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("ec_init failed on {}", ifname),
            ));
        }
        self.bound = true;
        Ok(())
    }

    fn config_init(&mut self) -> u16 {
        unsafe { ec::ec_config_init(0) }.max(0) as u16
    }

    fn config_map(&mut self) -> usize {
        // SOEM does not bound the map, the caller checks the result
        unsafe { ec::ec_config_map(self.iomap.cast()) }.max(0) as usize
    }

    fn config_dc(&mut self) -> bool {
        unsafe { ec::ec_configdc() != 0 }
    }

    fn slave_count(&self) -> u16 {
        unsafe { ec::ec_slavecount }.max(0) as u16
    }

    fn slave(&self, index: u16) -> Option<SlaveDescriptor> {
        if index > self.slave_count() {
            return None;
        }
        let s = unsafe { &*ptr::addr_of!(ec::ec_slave[index as usize]) };
        let inputs = Window::new(self.offset(s.inputs), window_bytes(s.Ibytes, s.Ibits));
        let outputs = Window::new(self.offset(s.outputs), window_bytes(s.Obytes, s.Obits));
        Some(SlaveDescriptor::new(
            index,
            c_array_to_string(&s.name),
            s.Ibytes,
            s.Obytes,
            s.Ibits,
            s.Obits,
            inputs,
            outputs,
            AlState::from(s.state),
        ))
    }

    fn expected_wkc(&self) -> u16 {
        let group = unsafe { &*ptr::addr_of!(ec::ec_group[0]) };
        group.outputsWKC * 2 + group.inputsWKC
    }

    fn image(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.iomap, self.size) }
    }

    fn image_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.iomap, self.size) }
    }

    fn send_processdata(&mut self) -> bool {
        unsafe { ec::ec_send_processdata() > 0 }
    }

    fn receive_processdata(&mut self, timeout: Duration) -> Option<u16> {
        let wkc = unsafe { ec::ec_receive_processdata(micros(timeout)) };
        u16::try_from(wkc).ok()
    }

    fn state_check(&mut self, slave: u16, target: AlState, timeout: Duration) -> AlState {
        AlState::from(unsafe { ec::ec_statecheck(slave, target.raw(), micros(timeout)) })
    }

    fn write_state(&mut self, slave: u16, state: AlState) -> bool {
        if slave > self.slave_count() {
            return false;
        }
        unsafe {
            (*ptr::addr_of_mut!(ec::ec_slave[slave as usize])).state = state.raw();
            ec::ec_writestate(slave) > 0
        }
    }
}
