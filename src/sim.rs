// Part of ethercat-al. Copyright 2026 by the authors.
// This work is dual-licensed under Apache 2.0 and MIT terms.

//! An in-process master stack with a simulated slave bus.
//!
//! The image is laid out the way SOEM maps it: the output windows of all
//! slaves first, followed by all input windows. Slaves walk the AL state
//! machine on request, and need a few valid process data cycles in SAFE-OP
//! before they accept OPERATIONAL.

use log::*;
use std::{collections::HashMap, io, time::Duration};

use crate::convert::interface_name;
use crate::master::MasterStack;
use crate::types::*;

/// A slave on the simulated bus.
#[derive(Debug, Clone)]
pub struct SimSlave {
    name: String,
    input_bytes: u32,
    output_bytes: u32,
    input_bits: u16,
    output_bits: u16,
    max_state: AlState,
    op_delay: u32,
    dc: bool,
}

impl SimSlave {
    /// A slave with byte-sized input and output data.
    pub fn new(name: impl Into<String>, input_bytes: u32, output_bytes: u32) -> Self {
        Self {
            name: name.into(),
            input_bytes,
            output_bytes,
            input_bits: (input_bytes * 8) as u16,
            output_bits: (output_bytes * 8) as u16,
            max_state: AlState::Op,
            op_delay: 3,
            dc: false,
        }
    }

    /// A slave whose data is smaller than one byte, like a 4 channel terminal.
    pub fn with_bits(name: impl Into<String>, input_bits: u16, output_bits: u16) -> Self {
        Self {
            input_bytes: input_bits as u32 / 8,
            output_bytes: output_bits as u32 / 8,
            input_bits,
            output_bits,
            ..Self::new(name, 0, 0)
        }
    }

    /// Never go beyond `state`.
    pub fn stuck_in(mut self, state: AlState) -> Self {
        self.max_state = state;
        self
    }

    /// Valid cycles in SAFE-OP required before OPERATIONAL is accepted.
    pub fn op_delay(mut self, cycles: u32) -> Self {
        self.op_delay = cycles;
        self
    }

    pub fn with_dc(mut self) -> Self {
        self.dc = true;
        self
    }
}

#[derive(Debug)]
struct Node {
    slave: SimSlave,
    state: AlState,
    requested: AlState,
    valid_cycles: u32,
    inputs: Window,
    outputs: Window,
    history: Vec<AlState>,
}

impl Node {
    fn set_state(&mut self, state: AlState) {
        if self.state != state {
            self.state = state;
            self.history.push(state);
        }
    }

    fn advance(&mut self) {
        let mut target = self.requested;
        if target == AlState::Op && self.valid_cycles < self.slave.op_delay {
            target = AlState::SafeOp;
        }
        if target.raw() > self.slave.max_state.raw() {
            target = self.slave.max_state;
        }
        self.set_state(target);
    }

    fn wkc(&self) -> u16 {
        let outputs = self.outputs.len > 0;
        let inputs = self.inputs.len > 0;
        match self.state {
            AlState::Op => 2 * outputs as u16 + inputs as u16,
            AlState::SafeOp => inputs as u16,
            _ => 0,
        }
    }
}

pub struct SimMaster {
    bus: Vec<SimSlave>,
    image: Vec<u8>,
    nodes: Vec<Node>,
    ifname: Option<String>,
    bind_error: Option<io::ErrorKind>,
    link_up: bool,
    loopback: bool,
    in_flight: bool,
    staged: HashMap<u16, Vec<u8>>,
    cycles: u64,
}

impl SimMaster {
    /// A master with a process image of `DEFAULT_IMAGE_SIZE` bytes.
    pub fn new(bus: Vec<SimSlave>) -> Self {
        Self::with_image_size(bus, DEFAULT_IMAGE_SIZE)
    }

    pub fn with_image_size(bus: Vec<SimSlave>, size: usize) -> Self {
        Self {
            bus,
            image: vec![0; size],
            nodes: Vec::new(),
            ifname: None,
            bind_error: None,
            link_up: true,
            loopback: false,
            in_flight: false,
            staged: HashMap::new(),
            cycles: 0,
        }
    }

    /// Make `init` fail as if the socket could not be opened.
    pub fn fail_bind(mut self, kind: io::ErrorKind) -> Self {
        self.bind_error = Some(kind);
        self
    }

    /// Reflect every slave's outputs into its inputs on each cycle.
    pub fn loopback(mut self, enable: bool) -> Self {
        self.loopback = enable;
        self
    }

    /// Drop all frames while the link is down.
    pub fn set_link(&mut self, up: bool) {
        self.link_up = up;
    }

    /// Input data `slave` will report on the next received frame.
    pub fn stage_inputs(&mut self, slave: u16, data: &[u8]) {
        self.staged.insert(slave, data.to_vec());
    }

    /// Interface the master is bound to.
    pub fn ifname(&self) -> Option<&str> {
        self.ifname.as_deref()
    }

    /// Number of frames that made the round trip.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// States `slave` went through, starting with INIT.
    pub fn history(&self, slave: u16) -> &[AlState] {
        match self.node(slave) {
            Some(node) => node.history.as_slice(),
            None => &[],
        }
    }

    fn node(&self, slave: u16) -> Option<&Node> {
        (slave as usize).checked_sub(1).and_then(|i| self.nodes.get(i))
    }

    fn lowest_state(&self) -> AlState {
        self.nodes
            .iter()
            .map(|n| n.state)
            .min_by_key(|st| st.raw())
            .unwrap_or(AlState::Unknown(0))
    }

    fn total(&self, direction: Direction) -> Window {
        let mut windows = self.nodes.iter().map(|n| match direction {
            Direction::Input => n.inputs,
            Direction::Output => n.outputs,
        });
        match windows.next() {
            Some(first) => {
                let end = windows.fold(first.end(), |end, w| end.max(w.end()));
                Window::new(first.offset, end - first.offset)
            }
            None => Window::default(),
        }
    }
}

impl MasterStack for SimMaster {
    fn init(&mut self, ifname: &str) -> io::Result<()> {
        interface_name(ifname)?;
        if let Some(kind) = self.bind_error {
            return Err(io::Error::new(kind, format!("cannot open raw socket on {}", ifname)));
        }
        self.ifname = Some(ifname.into());
        Ok(())
    }

    fn config_init(&mut self) -> u16 {
        if self.ifname.is_none() {
            return 0;
        }
        self.nodes = self
            .bus
            .iter()
            .cloned()
            .map(|slave| Node {
                slave,
                state: AlState::Init,
                requested: AlState::PreOp,
                valid_cycles: 0,
                inputs: Window::default(),
                outputs: Window::default(),
                history: vec![AlState::Init],
            })
            .collect();
        for node in &mut self.nodes {
            node.advance();
        }
        self.nodes.len() as u16
    }

    fn config_map(&mut self) -> usize {
        let mut offset = 0;
        for node in &mut self.nodes {
            let len = window_bytes(node.slave.output_bytes, node.slave.output_bits);
            node.outputs = Window::new(offset, len);
            offset += len;
        }
        for node in &mut self.nodes {
            let len = window_bytes(node.slave.input_bytes, node.slave.input_bits);
            node.inputs = Window::new(offset, len);
            offset += len;
        }
        for node in &mut self.nodes {
            node.requested = AlState::SafeOp;
        }
        debug!("Simulated image mapped, {} bytes", offset);
        offset
    }

    fn config_dc(&mut self) -> bool {
        self.nodes.iter().any(|n| n.slave.dc)
    }

    fn slave_count(&self) -> u16 {
        self.nodes.len() as u16
    }

    fn slave(&self, index: u16) -> Option<SlaveDescriptor> {
        if index == 0 {
            let sum = |f: fn(&SimSlave) -> u32| self.nodes.iter().map(|n| f(&n.slave)).sum::<u32>();
            return Some(SlaveDescriptor::new(
                0,
                String::new(),
                sum(|s| s.input_bytes),
                sum(|s| s.output_bytes),
                sum(|s| s.input_bits as u32) as u16,
                sum(|s| s.output_bits as u32) as u16,
                self.total(Direction::Input),
                self.total(Direction::Output),
                self.lowest_state(),
            ));
        }
        self.node(index).map(|n| {
            SlaveDescriptor::new(
                index,
                n.slave.name.clone(),
                n.slave.input_bytes,
                n.slave.output_bytes,
                n.slave.input_bits,
                n.slave.output_bits,
                n.inputs,
                n.outputs,
                n.state,
            )
        })
    }

    fn expected_wkc(&self) -> u16 {
        self.nodes
            .iter()
            .map(|n| 2 * (n.outputs.len > 0) as u16 + (n.inputs.len > 0) as u16)
            .sum()
    }

    fn image(&self) -> &[u8] {
        &self.image
    }

    fn image_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }

    fn send_processdata(&mut self) -> bool {
        if self.ifname.is_none() {
            return false;
        }
        self.in_flight = true;
        true
    }

    fn receive_processdata(&mut self, _timeout: Duration) -> Option<u16> {
        if !std::mem::take(&mut self.in_flight) || !self.link_up {
            return None;
        }
        self.cycles += 1;

        for (i, node) in self.nodes.iter_mut().enumerate() {
            let index = i as u16 + 1;
            let (inputs, outputs) = (node.inputs, node.outputs);
            if let Some(data) = self.staged.remove(&index) {
                let n = data.len().min(inputs.len);
                self.image[inputs.offset..inputs.offset + n].copy_from_slice(&data[..n]);
            } else if self.loopback {
                let n = inputs.len.min(outputs.len);
                self.image
                    .copy_within(outputs.offset..outputs.offset + n, inputs.offset);
            }
            if node.state.raw() >= AlState::SafeOp.raw() && !node.state.is_error() {
                node.valid_cycles += 1;
            }
        }

        Some(self.nodes.iter().map(Node::wkc).sum())
    }

    fn state_check(&mut self, slave: u16, target: AlState, _timeout: Duration) -> AlState {
        for node in &mut self.nodes {
            node.advance();
        }
        let reached = match slave {
            0 => self.lowest_state(),
            i => self.node(i).map_or(AlState::Unknown(0), |n| n.state),
        };
        trace!("State check slave {}: wanted {}, got {}", slave, target, reached);
        reached
    }

    fn write_state(&mut self, slave: u16, state: AlState) -> bool {
        match slave {
            0 => self.nodes.iter_mut().for_each(|n| n.requested = state),
            i => match (i as usize).checked_sub(1).and_then(|i| self.nodes.get_mut(i)) {
                Some(node) => node.requested = state,
                None => return false,
            },
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> SimMaster {
        SimMaster::new(vec![
            SimSlave::new("EL1008", 1, 0),
            SimSlave::new("EL2008", 0, 1),
            SimSlave::with_bits("EL2004", 0, 4),
            SimSlave::new("EL3104", 16, 0),
        ])
    }

    #[test]
    fn test_soem_layout() {
        let mut m = bus();
        m.init("sim0").unwrap();
        assert_eq!(m.config_init(), 4);
        assert_eq!(m.config_map(), 1 + 1 + 1 + 16);

        // outputs first, in slave order
        assert_eq!(m.slave(2).unwrap().outputs, Window::new(0, 1));
        assert_eq!(m.slave(3).unwrap().outputs, Window::new(1, 1));
        assert_eq!(m.slave(1).unwrap().inputs, Window::new(2, 1));
        assert_eq!(m.slave(4).unwrap().inputs, Window::new(3, 16));
        assert_eq!(m.slave(1).unwrap().outputs.len, 0);

        let all = m.slave(0).unwrap();
        assert_eq!(all.outputs, Window::new(0, 2));
        assert_eq!(all.inputs, Window::new(2, 17));
        assert_eq!(all.output_bits, 12);
        assert_eq!(all.output_bytes, 1);
        assert!(m.slave(5).is_none());
    }

    #[test]
    fn test_not_bound() {
        let mut m = bus();
        assert_eq!(m.config_init(), 0);
        assert!(!m.send_processdata());
        assert_eq!(m.receive_processdata(Duration::ZERO), None);

        let mut m = bus().fail_bind(io::ErrorKind::PermissionDenied);
        let e = m.init("eth0").unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::PermissionDenied);
        assert!(m.init("").is_err());
    }

    #[test]
    fn test_state_machine() {
        let mut m = SimMaster::new(vec![SimSlave::new("A", 1, 1).op_delay(2)]);
        m.init("sim0").unwrap();
        m.config_init();
        m.config_map();
        assert_eq!(m.state_check(1, AlState::SafeOp, Duration::ZERO), AlState::SafeOp);

        m.write_state(0, AlState::Op);
        assert_eq!(m.state_check(0, AlState::Op, Duration::ZERO), AlState::SafeOp);
        for _ in 0..2 {
            m.send_processdata();
            assert_eq!(m.receive_processdata(Duration::ZERO), Some(1));
        }
        assert_eq!(m.state_check(0, AlState::Op, Duration::ZERO), AlState::Op);
        assert_eq!(m.history(1), &[AlState::Init, AlState::PreOp, AlState::SafeOp, AlState::Op]);

        m.send_processdata();
        assert_eq!(m.receive_processdata(Duration::ZERO), Some(m.expected_wkc()));
        assert!(!m.write_state(2, AlState::Op));
    }

    #[test]
    fn test_stuck_slave() {
        let mut m = SimMaster::new(vec![
            SimSlave::new("A", 1, 1),
            SimSlave::new("B", 1, 1).stuck_in(AlState::PreOp),
        ]);
        m.init("sim0").unwrap();
        m.config_init();
        m.config_map();
        assert_eq!(m.state_check(0, AlState::SafeOp, Duration::ZERO), AlState::PreOp);
        assert_eq!(m.state_check(1, AlState::SafeOp, Duration::ZERO), AlState::SafeOp);
    }

    #[test]
    fn test_inputs() {
        let mut m = SimMaster::new(vec![SimSlave::new("A", 2, 2)]).loopback(true);
        m.init("sim0").unwrap();
        m.config_init();
        m.config_map();

        m.image_mut()[..2].copy_from_slice(&[0x12, 0x34]);
        m.send_processdata();
        m.receive_processdata(Duration::ZERO);
        assert_eq!(&m.image()[2..4], &[0x12, 0x34]);

        // staged data wins over loopback
        m.stage_inputs(1, &[0xAB]);
        m.send_processdata();
        m.receive_processdata(Duration::ZERO);
        assert_eq!(&m.image()[2..4], &[0xAB, 0x34]);

        m.set_link(false);
        m.image_mut()[..2].copy_from_slice(&[0, 0]);
        m.send_processdata();
        assert_eq!(m.receive_processdata(Duration::ZERO), None);
        assert_eq!(&m.image()[2..4], &[0xAB, 0x34]);
        assert_eq!(m.cycles(), 2);

        // a receive needs a preceding send
        m.set_link(true);
        assert_eq!(m.receive_processdata(Duration::ZERO), None);
    }
}
