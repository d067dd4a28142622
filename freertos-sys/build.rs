// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

// Pre-build code for the freertos-sys crate.

// This locates the kernel config header, generates the numeric config module, and (when building
// for a real target) compiles the small C shim that gives Rust access to the port macros.  The
// header path is published to dependent crates through the `links` metadata, where it arrives as
// `DEP_FREERTOS_CONFIG`.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

/// Sizes of the kernel's static control blocks.  These depend on both the port and the kernel
/// configuration, and can't be derived without a C compiler that sees the kernel headers, so they
/// are taken from the environment.  The shim checks each one with a `_Static_assert`, so a wrong
/// value is a build failure rather than memory corruption.  Defaults are for a 32-bit port.
const STATIC_SIZES: &[(&str, &str, usize)] = &[
    ("STATIC_QUEUE", "StaticQueue_t", 80),
    ("STATIC_EVENT_GROUP", "StaticEventGroup_t", 32),
    ("STATIC_TASK", "StaticTask_t", 100),
    ("STATIC_TIMER", "StaticTimer_t", 44),
    ("STATIC_STREAM_BUFFER", "StaticStreamBuffer_t", 36),
];

fn main() -> anyhow::Result<()> {
    let manifest = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let out_path = PathBuf::from(env::var("OUT_DIR")?);

    println!("cargo:rerun-if-env-changed=FREERTOS_CONFIG");
    let config = match env::var("FREERTOS_CONFIG") {
        Ok(path) => PathBuf::from(path),
        Err(_) => manifest.join("config").join("FreeRTOSConfig.h"),
    };
    let config = config
        .canonicalize()
        .with_context(|| format!("Locating FreeRTOS config {}", config.display()))?;

    // Becomes DEP_FREERTOS_CONFIG in dependents.
    println!("cargo:config={}", config.display());

    freertos_build::build_config_mod_from(&config)?;

    let sizes = gather_sizes()?;
    write_sizes(&out_path.join("sizes.rs"), &sizes)?;

    if env::var_os("CARGO_FEATURE_SIM").is_none() {
        build_shim(&manifest, &config, &sizes)?;
    }

    Ok(())
}

fn gather_sizes() -> anyhow::Result<Vec<(&'static str, &'static str, usize)>> {
    let mut result = Vec::new();
    for &(key, ctype, default) in STATIC_SIZES {
        let var = format!("FREERTOS_SIZEOF_{}", key);
        println!("cargo:rerun-if-env-changed={}", var);
        let size = match env::var(&var) {
            Ok(text) => text
                .trim()
                .parse()
                .with_context(|| format!("{} must be an integer", var))?,
            Err(_) => default,
        };
        result.push((key, ctype, size));
    }
    Ok(result)
}

fn write_sizes(path: &Path, sizes: &[(&str, &str, usize)]) -> anyhow::Result<()> {
    let mut f = File::create(path)?;
    for (key, ctype, size) in sizes {
        writeln!(f, "/// Size of `{}` for this kernel configuration.", ctype)?;
        writeln!(f, "pub const RUST_SIZEOF_{}: usize = {};", key, size)?;
    }
    Ok(())
}

fn build_shim(
    manifest: &Path,
    config: &Path,
    sizes: &[(&str, &str, usize)],
) -> anyhow::Result<()> {
    let shim = manifest.join("shim").join("rust_shim.c");
    println!("cargo:rerun-if-changed={}", shim.display());
    println!("cargo:rerun-if-env-changed=FREERTOS_INCLUDE_DIRS");

    let mut build = cc::Build::new();
    build.file(&shim);

    if let Some(dir) = config.parent() {
        build.include(dir);
    }

    // The kernel and port include directories, whitespace separated.
    let includes = env::var("FREERTOS_INCLUDE_DIRS")
        .context("FREERTOS_INCLUDE_DIRS must name the kernel and port include directories")?;
    for dir in includes.split_whitespace() {
        build.include(dir);
    }

    for (key, _, size) in sizes {
        build.define(&format!("RUST_SIZEOF_{}", key), Some(size.to_string().as_str()));
    }

    build.compile("freertos_rust_shim");
    Ok(())
}
