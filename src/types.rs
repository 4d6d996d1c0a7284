// Part of ethercat-al. Copyright 2026 by the authors.
// This work is dual-licensed under Apache 2.0 and MIT terms.

use derive_new::new;
use std::{fmt, io};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No socket connection on {ifname}, execute as root")]
    Bind {
        ifname: String,
        #[source]
        source: io::Error,
    },
    #[error("Invalid interface name {0:?}")]
    InvalidInterface(String),
    #[error("No slaves found")]
    NoSlaves,
    #[error("Process image too small: {needed} bytes mapped, {capacity} available")]
    ImageOverflow { needed: usize, capacity: usize },
    #[error("Timeout reaching {target} state, slaves are in {reached}")]
    StateTimeout { target: AlState, reached: AlState },
    #[error("Invalid slave index {0}")]
    NoSuchSlave(u16),
    #[error("Slave {slave}: {width} byte access at offset {offset} exceeds {len} byte {direction} window")]
    OutOfRange {
        slave: u16,
        direction: Direction,
        offset: usize,
        width: usize,
        len: usize,
    },
    #[error("Master stack is already in use")]
    Busy,
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        io::Error::new(io::ErrorKind::Other, e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Default capacity of the process image, in bytes.
pub const DEFAULT_IMAGE_SIZE: usize = 4096;

/// Raw AL status bit signalling an error indication.
pub const AL_STATE_ERROR_FLAG: u16 = 0x10;

/// EtherCAT application layer state of a slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlState {
    Init,
    PreOp,
    Boot,
    SafeOp,
    Op,
    /// No state, or a state carrying the error indication flag.
    Unknown(u16),
}

impl AlState {
    pub const fn raw(self) -> u16 {
        match self {
            AlState::Init => 0x01,
            AlState::PreOp => 0x02,
            AlState::Boot => 0x03,
            AlState::SafeOp => 0x04,
            AlState::Op => 0x08,
            AlState::Unknown(x) => x,
        }
    }

    pub const fn is_error(self) -> bool {
        self.raw() & AL_STATE_ERROR_FLAG != 0
    }
}

impl From<u16> for AlState {
    fn from(raw: u16) -> Self {
        match raw {
            0x01 => AlState::Init,
            0x02 => AlState::PreOp,
            0x03 => AlState::Boot,
            0x04 => AlState::SafeOp,
            0x08 => AlState::Op,
            x => AlState::Unknown(x),
        }
    }
}

impl fmt::Display for AlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlState::Init => f.write_str("INIT"),
            AlState::PreOp => f.write_str("PRE-OP"),
            AlState::Boot => f.write_str("BOOT"),
            AlState::SafeOp => f.write_str("SAFE-OP"),
            AlState::Op => f.write_str("OPERATIONAL"),
            AlState::Unknown(x) => write!(f, "0x{:02X}", x),
        }
    }
}

/// Which half of a slave's process data is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Data sent by the slave, refreshed on receive.
    Input,
    /// Data sent to the slave on the next cycle.
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Input => "input",
            Direction::Output => "output",
        })
    }
}

/// A slave's slice of the process image.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, new)]
pub struct Window {
    pub offset: usize,
    pub len: usize,
}

impl Window {
    pub const fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// What the master stack knows about one slave after mapping.
///
/// Index 0 describes all slaves together: its windows span every slave's
/// inputs and outputs, and its state is the lowest state on the bus.
#[derive(Debug, Clone, new)]
pub struct SlaveDescriptor {
    pub index: u16,
    pub name: String,
    pub input_bytes: u32,
    pub output_bytes: u32,
    pub input_bits: u16,
    pub output_bits: u16,
    pub inputs: Window,
    pub outputs: Window,
    pub state: AlState,
}

impl SlaveDescriptor {
    pub const fn window(&self, direction: Direction) -> Window {
        match direction {
            Direction::Input => self.inputs,
            Direction::Output => self.outputs,
        }
    }
}

/// Number of bytes a window of `bytes` bytes and `bits` bits occupies.
///
/// Bit-sized process data still occupies one full byte of the image.
pub const fn window_bytes(bytes: u32, bits: u16) -> usize {
    if bytes == 0 && bits > 0 {
        1
    } else {
        bytes as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WcState {
    Zero = 0,
    Incomplete,
    Complete,
}

impl WcState {
    pub const fn classify(working_counter: u16, expected: u16) -> Self {
        if working_counter == 0 {
            WcState::Zero
        } else if working_counter >= expected {
            WcState::Complete
        } else {
            WcState::Incomplete
        }
    }
}

#[test]
fn test_al_state_raw() {
    for st in [AlState::Init, AlState::PreOp, AlState::Boot, AlState::SafeOp, AlState::Op] {
        assert_eq!(AlState::from(st.raw()), st);
        assert!(!st.is_error());
    }
    let err = AlState::from(0x14);
    assert_eq!(err, AlState::Unknown(0x14));
    assert!(err.is_error());
    assert_eq!(AlState::from(0), AlState::Unknown(0));
    assert_eq!(err.to_string(), "0x14");
    assert_eq!(AlState::SafeOp.to_string(), "SAFE-OP");
}

#[test]
fn test_window_bytes() {
    assert_eq!(window_bytes(0, 0), 0);
    assert_eq!(window_bytes(0, 4), 1);
    assert_eq!(window_bytes(3, 24), 3);
    assert_eq!(Window::new(8, 4).end(), 12);
}

#[test]
fn test_bind_error_source() {
    use std::error::Error as _;

    let e = Error::Bind {
        ifname: "eth0".into(),
        source: io::Error::new(io::ErrorKind::PermissionDenied, "raw socket"),
    };
    assert_eq!(e.to_string(), "No socket connection on eth0, execute as root");
    let source = e.source().and_then(|s| s.downcast_ref::<io::Error>()).unwrap();
    assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);

    let e: io::Error = Error::NoSlaves.into();
    assert_eq!(e.to_string(), "No slaves found");
}

#[test]
fn test_wc_state() {
    assert_eq!(WcState::classify(0, 3), WcState::Zero);
    assert_eq!(WcState::classify(2, 3), WcState::Incomplete);
    assert_eq!(WcState::classify(3, 3), WcState::Complete);
}
