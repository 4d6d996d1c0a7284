// Part of ethercat-al. Copyright 2026 by the authors.
// This work is dual-licensed under Apache 2.0 and MIT terms.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=SOEM_PATH");
    let path = env::var("SOEM_PATH")
        .expect("Please set the SOEM_PATH env var to the location of \
                 a SOEM checkout that has been built into SOEM_PATH/build");

    println!("cargo:rustc-link-search=native={}/build", path);
    println!("cargo:rustc-link-lib=static=soem");
    println!("cargo:rustc-link-lib=pthread");
    println!("cargo:rustc-link-lib=rt");

    let bindings = bindgen::Builder::default()
        .header(format!("{}/soem/ethercat.h", path))
        .clang_arg(format!("-I{}/soem", path))
        .clang_arg(format!("-I{}/osal", path))
        .clang_arg(format!("-I{}/osal/linux", path))
        .clang_arg(format!("-I{}/oshw/linux", path))
        .derive_default(true)
        .derive_debug(false)
        .prepend_enum_name(false)
        .allowlist_function("ec_.*")
        .allowlist_var("ec_slave")
        .allowlist_var("ec_slavecount")
        .allowlist_var("ec_group")
        .allowlist_var("EC_MAX.*")
        .allowlist_var("EC_TIMEOUT.*")
        .allowlist_type("ec_slavet")
        .allowlist_type("ec_groupt")
        .layout_tests(false)
        .generate()
        .expect("Unable to generate bindings");

    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("Couldn't write bindings!");
}
