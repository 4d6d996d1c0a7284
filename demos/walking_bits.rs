//! Walking bit demo
//!
//! Brings the bus on `<ifname>` up, then every 80 ms prints the input bytes
//! of slave 1 and moves a bit back and forth over the first output byte of
//! slaves 1 (inverted) and 2.
//!
//! ```bash
//! cargo run --example walking_bits -- eth0
//! cargo run --features soem --example walking_bits -- eth0
//! ```
//!
//! Without the `soem` feature the demo runs against a simulated bus of two
//! 8 channel terminals wired in loopback.

use ethercat_al::Session;
use std::{
    env,
    io::{self, Write},
    thread,
    time::Duration,
};

#[cfg(feature = "soem")]
fn master() -> ethercat_al::Result<ethercat_al::soem::SoemMaster> {
    ethercat_al::soem::SoemMaster::new()
}

#[cfg(not(feature = "soem"))]
fn master() -> ethercat_al::Result<ethercat_al::sim::SimMaster> {
    use ethercat_al::sim::{SimMaster, SimSlave};
    Ok(SimMaster::new(vec![SimSlave::new("EL1008", 1, 1), SimSlave::new("EL2008", 1, 1)]).loopback(true))
}

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("ethercat-al walking bits");

    let ifname = match env::args().nth(1) {
        Some(ifname) => ifname,
        None => {
            println!("usage: walking_bits IFNAME");
            return Ok(());
        }
    };

    let mut session = Session::initialize(master()?, &ifname)?;
    let cycle_time = Duration::from_millis(80);
    let (mut bit, mut dir) = (0u8, 1i8);
    let stdout = io::stdout();

    loop {
        if session.run_cycle().is_none() {
            log::debug!("Cycle timed out");
        }

        let mut out = stdout.lock();
        for byte in session.input(1)? {
            write!(out, " {:02x} ", byte)?;
        }
        write!(out, "\r")?;
        out.flush()?;

        bit = (bit as i8 + dir) as u8;
        if bit > 6 || bit == 0 {
            dir = -dir;
        }
        session.set_output_byte(1, 0, !(1 << bit))?;
        session.set_output_byte(2, 0, 1 << bit)?;

        thread::sleep(cycle_time);
    }
}
