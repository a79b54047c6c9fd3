//! Build Script for ACL Gateway
//!
//! Generates Rust protobuf stubs from the workspace proto definitions.
//!
//! # Panics Policy
//!
//! Build scripts use `.expect()` and panic on failure: there is no caller to
//! propagate errors to, and a missing prerequisite must halt the build.
#![allow(clippy::expect_used)]

use std::{env, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../../packages/proto/gateway/");

    // Emit cfg for coverage detection
    if env::var("CARGO_LLVM_COV").is_ok()
        || env::var("LLVM_PROFILE_FILE").is_ok()
        || env::var("RUSTFLAGS")
            .map(|f| f.contains("instrument-coverage"))
            .unwrap_or(false)
    {
        println!("cargo:rustc-cfg=coverage");
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let proto_root = manifest_dir.join("../../packages/proto");
    let proto_file = proto_root.join("gateway/v1/gateway.proto");
    println!("cargo:rerun-if-changed={}", proto_file.display());

    let mut config = prost_build::Config::new();
    // Prefer a vendored protoc so the build does not depend on the host PATH.
    if env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path().expect("failed to find bundled protoc");
        config.protoc_executable(protoc);
    }
    // Descriptor set used at runtime to list every served method.
    config.file_descriptor_set_path(out_dir.join("gateway_descriptor.bin"));

    tonic_prost_build::configure()
        .build_client(true) // Enable client for integration tests
        .build_server(true)
        .compile_with_config(config, &[proto_file], &[proto_root])
        .expect("Failed to compile protobuf definitions");
}
