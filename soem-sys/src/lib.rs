// Part of ethercat-al. Copyright 2026 by the authors.
// This work is dual-licensed under Apache 2.0 and MIT terms.

//! Raw bindings to the global-context API of the Simple Open EtherCAT Master.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(clippy::all)]

include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
