// Part of ethercat-al. Copyright 2026 by the authors.
// This work is dual-licensed under Apache 2.0 and MIT terms.

//! Bring a bus up to OPERATIONAL and exchange process data with it.

use log::*;
use std::time::Duration;

use crate::image::{self, module_offset, PdoValue, Target};
use crate::master::MasterStack;
use crate::types::*;

/// Per-state timeout unit, 2 s.
pub const STATE_TIMEOUT: Duration = Duration::from_secs(2);
/// Receive timeout of a regular cycle.
pub const CYCLE_TIMEOUT: Duration = Duration::from_micros(2000);
/// Receive timeout of the cycle priming the outputs.
pub const PRIME_TIMEOUT: Duration = Duration::from_micros(2000);
/// State check timeout of a single OPERATIONAL poll.
pub const OP_CHECK_TIMEOUT: Duration = Duration::from_micros(50_000);
pub const OP_RETRIES: u32 = 200;

pub struct SessionBuilder {
    state_timeout: Duration,
    receive_timeout: Duration,
    prime_timeout: Duration,
    op_check_timeout: Duration,
    op_retries: u32,
    distributed_clocks: bool,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            state_timeout: STATE_TIMEOUT,
            receive_timeout: CYCLE_TIMEOUT,
            prime_timeout: PRIME_TIMEOUT,
            op_check_timeout: OP_CHECK_TIMEOUT,
            op_retries: OP_RETRIES,
            distributed_clocks: true,
        }
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout unit for state transitions; SAFE-OP gets four of them.
    pub fn state_timeout(mut self, timeout: Duration) -> Self {
        self.state_timeout = timeout;
        self
    }

    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn prime_timeout(mut self, timeout: Duration) -> Self {
        self.prime_timeout = timeout;
        self
    }

    pub fn op_check_timeout(mut self, timeout: Duration) -> Self {
        self.op_check_timeout = timeout;
        self
    }

    /// How many cycles to wait for OPERATIONAL before giving up.
    pub fn op_retries(mut self, retries: u32) -> Self {
        self.op_retries = retries;
        self
    }

    pub fn distributed_clocks(mut self, enable: bool) -> Self {
        self.distributed_clocks = enable;
        self
    }

    /// Bind `master` to `ifname`, configure and map all slaves and bring them
    /// to OPERATIONAL.
    pub fn initialize<M: MasterStack>(self, mut master: M, ifname: &str) -> Result<Session<M>> {
        if let Err(source) = master.init(ifname) {
            error!("No socket connection on {}: {}", ifname, source);
            return Err(Error::Bind { ifname: ifname.into(), source });
        }
        debug!("Master bound to {}", ifname);

        let count = master.config_init();
        if count == 0 {
            error!("No slaves found on {}", ifname);
            return Err(Error::NoSlaves);
        }
        info!("{} slaves found and configured", count);

        let needed = master.config_map();
        let capacity = master.image().len();
        if needed > capacity {
            error!("Process image overflow: {} > {}", needed, capacity);
            return Err(Error::ImageOverflow { needed, capacity });
        }
        if self.distributed_clocks && !master.config_dc() {
            warn!("No distributed clocks configured");
        }

        let mut slaves = Vec::with_capacity(count as usize + 1);
        for i in 0..=count {
            let slave = master.slave(i).ok_or(Error::NoSuchSlave(i))?;
            let needed = slave.inputs.end().max(slave.outputs.end());
            if needed > capacity {
                error!("Slave {} mapped outside the process image", i);
                return Err(Error::ImageOverflow { needed, capacity });
            }
            debug!(
                "Slave {}: {} Input: {} bytes Output: {} bytes",
                i, slave.name, slave.input_bytes, slave.output_bytes
            );
            slaves.push(slave);
        }

        debug!("Slaves mapped, waiting for SAFE-OP");
        let safe_op_timeout = self.state_timeout.saturating_mul(4);
        let reached = master.state_check(0, AlState::SafeOp, safe_op_timeout);
        if reached != AlState::SafeOp {
            error!("Slaves did not reach SAFE-OP, lowest state {}", reached);
            return Err(Error::StateTimeout { target: AlState::SafeOp, reached });
        }
        info!("All slaves in SAFE-OP");

        // one valid frame so the slaves accept outputs before OP
        master.send_processdata();
        master.receive_processdata(self.prime_timeout);
        master.write_state(0, AlState::Op);

        let mut reached = reached;
        for attempt in 1..=self.op_retries {
            master.send_processdata();
            master.receive_processdata(self.prime_timeout);
            reached = master.state_check(0, AlState::Op, self.op_check_timeout);
            if reached == AlState::Op {
                info!("All slaves OPERATIONAL after {} polls", attempt);
                return Ok(Session {
                    master,
                    slaves,
                    receive_timeout: self.receive_timeout,
                    working_counter: None,
                });
            }
            trace!("OP poll {}: slaves in {}", attempt, reached);
        }

        error!("Slaves did not reach OPERATIONAL, lowest state {}", reached);
        Err(Error::StateTimeout { target: AlState::Op, reached })
    }
}

/// An initialized bus and its process image.
///
/// All access goes through `&self`/`&mut self`, so a session is used from
/// one thread at a time; cycles and accessor calls never overlap.
pub struct Session<M> {
    master: M,
    slaves: Vec<SlaveDescriptor>,
    receive_timeout: Duration,
    working_counter: Option<u16>,
}

impl<M: MasterStack> Session<M> {
    /// Initialize with default timeouts, see [`SessionBuilder::initialize`].
    pub fn initialize(master: M, ifname: &str) -> Result<Self> {
        SessionBuilder::new().initialize(master, ifname)
    }

    pub fn master(&self) -> &M {
        &self.master
    }

    /// Mutable access to the master stack, for control the session does not
    /// wrap, like forcing a slave back to SAFE-OP.
    ///
    /// Windows are read once during initialization. Calling `config_map` or
    /// `config_init` again through this handle may move them, and accessors
    /// keep addressing the old layout.
    pub fn master_mut(&mut self) -> &mut M {
        &mut self.master
    }

    /// Send the outputs and wait for the inputs of one cycle.
    ///
    /// A missing frame is not an error: inputs keep their previous values
    /// and `None` is returned.
    pub fn run_cycle(&mut self) -> Option<u16> {
        self.master.send_processdata();
        let wkc = self.master.receive_processdata(self.receive_timeout);
        self.working_counter = wkc;
        wkc
    }

    /// Working counter of the last cycle, `None` if its frame was lost.
    pub fn working_counter(&self) -> Option<u16> {
        self.working_counter
    }

    pub fn expected_working_counter(&self) -> u16 {
        self.master.expected_wkc()
    }

    pub fn wc_state(&self) -> WcState {
        WcState::classify(self.working_counter.unwrap_or(0), self.expected_working_counter())
    }

    pub fn get_slave_count(&self) -> u16 {
        self.master.slave_count()
    }

    fn descriptor(&self, index: u16) -> Result<&SlaveDescriptor> {
        self.slaves.get(index as usize).ok_or(Error::NoSuchSlave(index))
    }

    /// Descriptor of slave `index`: windows as mapped during initialization,
    /// state as last read by the master stack.
    pub fn slave(&self, index: u16) -> Result<SlaveDescriptor> {
        let mut slave = self.descriptor(index)?.clone();
        slave.state = self.slave_state(index)?;
        Ok(slave)
    }

    /// Current state of slave `index`, as last read by the master stack.
    pub fn slave_state(&self, index: u16) -> Result<AlState> {
        self.master
            .slave(index)
            .map(|s| s.state)
            .ok_or(Error::NoSuchSlave(index))
    }

    pub fn get_input_byte_count(&self, slave: u16) -> Result<u32> {
        self.descriptor(slave).map(|s| s.input_bytes)
    }

    pub fn get_output_byte_count(&self, slave: u16) -> Result<u32> {
        self.descriptor(slave).map(|s| s.output_bytes)
    }

    fn target(&self, slave: u16, direction: Direction) -> Result<Target> {
        let window = self.descriptor(slave)?.window(direction);
        Ok(Target { slave, direction, window })
    }

    /// Input window of `slave`.
    pub fn input(&self, slave: u16) -> Result<&[u8]> {
        let target = self.target(slave, Direction::Input)?;
        Ok(target.slice(self.master.image()))
    }

    /// Output window of `slave`.
    pub fn output(&self, slave: u16) -> Result<&[u8]> {
        let target = self.target(slave, Direction::Output)?;
        Ok(target.slice(self.master.image()))
    }

    pub fn output_mut(&mut self, slave: u16) -> Result<&mut [u8]> {
        let target = self.target(slave, Direction::Output)?;
        Ok(target.slice_mut(self.master.image_mut()))
    }

    /// Read a `T` at byte `offset` of the input window of `slave`.
    pub fn read_input<T: PdoValue>(&self, slave: u16, offset: usize) -> Result<T> {
        let target = self.target(slave, Direction::Input)?;
        image::read(self.master.image(), &target, offset)
    }

    /// Read back a `T` at byte `offset` of the output window of `slave`.
    pub fn read_output<T: PdoValue>(&self, slave: u16, offset: usize) -> Result<T> {
        let target = self.target(slave, Direction::Output)?;
        image::read(self.master.image(), &target, offset)
    }

    /// Write `value` at byte `offset` of the output window of `slave`.
    pub fn write_output<T: PdoValue>(&mut self, slave: u16, offset: usize, value: T) -> Result<()> {
        let target = self.target(slave, Direction::Output)?;
        image::write(self.master.image_mut(), &target, offset, value)
    }

    // Module indexed accessors. 32-bit values are addressed in 4-byte units,
    // 8 and 16-bit values by byte.

    pub fn get_input_byte(&self, slave: u16, module_index: u8) -> Result<u8> {
        self.read_input(slave, module_offset::<u8>(module_index))
    }

    pub fn get_input_uint16(&self, slave: u16, module_index: u8) -> Result<u16> {
        self.read_input(slave, module_offset::<u16>(module_index))
    }

    pub fn get_input_int16(&self, slave: u16, module_index: u8) -> Result<i16> {
        self.read_input(slave, module_offset::<i16>(module_index))
    }

    pub fn get_input_int32(&self, slave: u16, module_index: u8) -> Result<i32> {
        self.read_input(slave, module_offset::<i32>(module_index))
    }

    pub fn set_output_byte(&mut self, slave: u16, module_index: u8, value: u8) -> Result<()> {
        self.write_output(slave, module_offset::<u8>(module_index), value)
    }

    pub fn set_output_uint16(&mut self, slave: u16, module_index: u8, value: u16) -> Result<()> {
        self.write_output(slave, module_offset::<u16>(module_index), value)
    }

    pub fn set_output_int16(&mut self, slave: u16, module_index: u8, value: i16) -> Result<()> {
        self.write_output(slave, module_offset::<i16>(module_index), value)
    }

    pub fn set_output_int32(&mut self, slave: u16, module_index: u8, value: i32) -> Result<()> {
        self.write_output(slave, module_offset::<i32>(module_index), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimMaster, SimSlave};

    // Slave 1: 8 bytes in, 8 bytes out. Slave 2: 2 bytes in, 2 bytes out.
    fn session() -> Session<SimMaster> {
        let bus = vec![SimSlave::new("EL6001", 8, 8), SimSlave::new("EL4002", 2, 2)];
        Session::initialize(SimMaster::new(bus), "sim0").expect("bus comes up")
    }

    #[test]
    fn test_int32_byte_order() {
        let mut s = session();
        s.set_output_int32(1, 0, 0x0102_0304).unwrap();
        assert_eq!(&s.output(1).unwrap()[..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(s.read_output::<i32>(1, 0).unwrap(), 0x0102_0304);
    }

    #[test]
    fn test_module_index_scaling() {
        let mut s = session();

        // 32-bit values: module 1 starts at byte 4
        s.set_output_int32(1, 1, -2).unwrap();
        assert_eq!(&s.output(1).unwrap()[..8], &[0, 0, 0, 0, 0xFE, 0xFF, 0xFF, 0xFF]);

        // 8 and 16-bit values: module 1 starts at byte 1
        s.output_mut(1).unwrap().fill(0);
        s.set_output_uint16(1, 1, 0xA1B2).unwrap();
        assert_eq!(&s.output(1).unwrap()[..3], &[0, 0xB2, 0xA1]);
        s.set_output_int16(1, 3, -1).unwrap();
        assert_eq!(&s.output(1).unwrap()[3..5], &[0xFF, 0xFF]);
        s.set_output_byte(1, 1, 0x5A).unwrap();
        assert_eq!(s.output(1).unwrap()[1], 0x5A);
        assert_eq!(s.read_output::<u8>(1, 1).unwrap(), 0x5A);
    }

    #[test]
    fn test_input_accessors() {
        let mut s = session();
        s.master_mut()
            .stage_inputs(1, &[0x10, 0x20, 0x30, 0x40, 0x78, 0x56, 0x34, 0x12]);
        assert!(s.run_cycle().is_some());

        assert_eq!(s.get_input_byte(1, 0).unwrap(), 0x10);
        assert_eq!(s.get_input_byte(1, 3).unwrap(), 0x40);
        assert_eq!(s.get_input_uint16(1, 1).unwrap(), 0x3020);
        assert_eq!(s.get_input_int16(1, 6).unwrap(), 0x1234);
        assert_eq!(s.get_input_int32(1, 1).unwrap(), 0x1234_5678);
        assert_eq!(s.read_input::<u32>(1, 0).unwrap(), 0x4030_2010);
        assert_eq!(s.input(1).unwrap().len(), 8);
    }

    #[test]
    fn test_bounds() {
        let mut s = session();

        // last fitting value of slave 2, whose window is 2 bytes
        s.set_output_uint16(2, 0, 0xFFFF).unwrap();
        assert!(matches!(
            s.set_output_uint16(2, 1, 0),
            Err(Error::OutOfRange { slave: 2, direction: Direction::Output, offset: 1, width: 2, len: 2 })
        ));
        assert!(s.set_output_int32(2, 0, 0).is_err());
        assert!(s.get_input_int32(1, 2).is_err());
        assert!(s.get_input_int32(1, 1).is_ok());

        // the neighbouring window is untouched
        assert_eq!(s.output(1).unwrap(), &[0; 8]);
        assert_eq!(s.output(2).unwrap(), &[0xFF, 0xFF]);

        assert!(matches!(s.get_input_byte(3, 0), Err(Error::NoSuchSlave(3))));
        assert!(matches!(s.get_input_byte_count(7), Err(Error::NoSuchSlave(7))));
    }

    #[test]
    fn test_byte_counts() {
        let s = session();
        assert_eq!(s.get_slave_count(), 2);
        assert_eq!(s.get_input_byte_count(1).unwrap(), 8);
        assert_eq!(s.get_output_byte_count(2).unwrap(), 2);
        assert_eq!(s.get_input_byte_count(0).unwrap(), 10);
        assert_eq!(s.slave(1).unwrap().name, "EL6001");
        assert_eq!(s.slave_state(2).unwrap(), AlState::Op);
    }

    #[test]
    fn test_descriptor_state_is_current() {
        let mut s = session();
        assert_eq!(s.slave(1).unwrap().state, AlState::Op);
        assert_eq!(s.slave(2).unwrap().state, AlState::Op);
        assert_eq!(s.slave(0).unwrap().state, AlState::Op);

        // slave 2 forced back through the stack handle
        s.master_mut().write_state(2, AlState::SafeOp);
        s.master_mut().state_check(2, AlState::SafeOp, OP_CHECK_TIMEOUT);
        assert_eq!(s.slave(2).unwrap().state, AlState::SafeOp);
        assert_eq!(s.slave(0).unwrap().state, AlState::SafeOp);
        assert_eq!(s.slave(1).unwrap().state, AlState::Op);

        // windows stay where they were mapped
        assert_eq!(s.slave(2).unwrap().outputs, Window::new(8, 2));
        s.set_output_uint16(2, 0, 0x1234).unwrap();
        assert_eq!(s.read_output::<u16>(2, 0).unwrap(), 0x1234);
        assert!(matches!(s.slave(3), Err(Error::NoSuchSlave(3))));
    }

    #[test]
    fn test_huge_state_timeout() {
        let bus = vec![SimSlave::new("EL1008", 1, 0)];
        let s = SessionBuilder::new()
            .state_timeout(Duration::MAX)
            .initialize(SimMaster::new(bus), "sim0")
            .unwrap();
        assert_eq!(s.slave_state(1).unwrap(), AlState::Op);
    }

    #[test]
    fn test_cycle_without_data() {
        let mut s = session();
        s.master_mut().stage_inputs(2, &[0xCA, 0xFE]);
        s.run_cycle();
        let before = s.input(0).unwrap().to_vec();

        // frame comes back without new data
        s.set_output_byte(1, 0, 0x55).unwrap();
        assert!(s.run_cycle().is_some());
        assert_eq!(s.input(0).unwrap(), &before[..]);

        // frame is lost
        s.master_mut().set_link(false);
        assert_eq!(s.run_cycle(), None);
        assert_eq!(s.input(0).unwrap(), &before[..]);
        assert_eq!(s.working_counter(), None);
        assert_eq!(s.wc_state(), WcState::Zero);
    }

    #[test]
    fn test_working_counter() {
        let mut s = session();
        assert_eq!(s.expected_working_counter(), 6);
        assert_eq!(s.run_cycle(), Some(6));
        assert_eq!(s.working_counter(), Some(6));
        assert_eq!(s.wc_state(), WcState::Complete);
    }
}
