// Part of ethercat-al. Copyright 2026 by the authors.
// This work is dual-licensed under Apache 2.0 and MIT terms.

use crate::types::{Error, Result};
use std::ffi::CString;
use std::os::raw::c_char;

/// Longest interface name the kernel accepts (IFNAMSIZ without the NUL).
pub const MAX_IFNAME_LEN: usize = 15;

pub(crate) fn interface_name(input: &str) -> Result<CString> {
    if input.is_empty() || input.len() > MAX_IFNAME_LEN {
        return Err(Error::InvalidInterface(input.into()));
    }
    CString::new(input).map_err(|_| Error::InvalidInterface(input.into()))
}

#[test]
fn test_interface_name() {
    assert_eq!(interface_name("eth0").expect("Name is ok").as_bytes(), b"eth0");
    assert_eq!(
        interface_name("enp0s31f6-long").expect("Name is ok").as_bytes_with_nul(),
        b"enp0s31f6-long\0"
    );

    let e = interface_name("").unwrap_err();
    assert_eq!(e.to_string(), "Invalid interface name \"\"");

    let name = "an-interface-name-that-is-too-long";
    assert!(matches!(interface_name(name), Err(Error::InvalidInterface(n)) if n == name));
    assert!(interface_name("eth\00").is_err());
}

/// Decode a NUL-terminated C string stored in a fixed-size array.
#[cfg_attr(not(feature = "soem"), allow(dead_code))]
pub(crate) fn c_array_to_string(data: &[c_char]) -> String {
    let bytes: Vec<u8> = data
        .iter()
        .take_while(|c| **c != 0)
        .map(|c| *c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[test]
fn test_c_array_to_string() {
    let arr: [c_char; 41] = [0; 41];
    assert_eq!(c_array_to_string(&arr), "");

    let mut arr: [c_char; 41] = [0; 41];
    b"EK1100 EtherCAT Coupler"
        .iter()
        .enumerate()
        .for_each(|(idx, v)| {
            arr[idx] = *v as c_char;
        });
    assert_eq!(c_array_to_string(&arr), "EK1100 EtherCAT Coupler");

    // unterminated arrays stop at the end
    let arr: [c_char; 4] = [b'E' as c_char, b'L' as c_char, b'2' as c_char, b'0' as c_char];
    assert_eq!(c_array_to_string(&arr), "EL20");
}
