// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

// Pre-build code for the freertos crates.

// FreeRTOS is configured through a C header, `FreeRTOSConfig.h`, consisting of `#define` lines.
// This module makes the integer valued entries of that header available to Rust, both as
// conditional compilation flags, and as a generated module of constants.
//
// The path to the header is published by the `freertos-sys` crate through its `links` key, and
// arrives in dependent build scripts as `DEP_FREERTOS_CONFIG`.

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use regex::Regex;

/// The value of a single `#define` from the config header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// A non-negative value, the common case.
    Unsigned(u64),
    /// A value written with a leading minus.
    Signed(i64),
}

impl Value {
    /// Is this value considered "enabled" by the C preprocessor?
    pub fn is_set(&self) -> bool {
        match *self {
            Value::Unsigned(v) => v != 0,
            Value::Signed(v) => v != 0,
        }
    }
}

/// A single parsed `#define` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Define {
    /// The macro name, such as `configUSE_MUTEXES`.
    pub name: String,
    /// The decoded value.
    pub value: Value,
}

/// Locate the config header.
///
/// Applications get this from the `freertos-sys` links metadata.  The `freertos-sys` build itself
/// resolves it first, and `FREERTOS_CONFIG` overrides either.
pub fn config_path() -> Result<PathBuf> {
    println!("cargo:rerun-if-env-changed=FREERTOS_CONFIG");
    if let Ok(path) = env::var("FREERTOS_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    env::var("DEP_FREERTOS_CONFIG")
        .map(PathBuf::from)
        .context("DEP_FREERTOS_CONFIG must be set; depend on freertos-sys")
}

/// Parse the text of a config header, returning the integer valued defines.
///
/// Only `config*` and `INCLUDE_*` macros are considered.  Values may carry C casts, parentheses
/// and integer suffixes, which are stripped.  Anything that still isn't a plain integer literal
/// after that (an expression, or a reference to another macro) is skipped.
pub fn parse_config(text: &str) -> Vec<Define> {
    let define = Regex::new(r"^\s*#\s*define\s+((?:config|INCLUDE_)[A-Za-z0-9_]+)\s+(.+)$").unwrap();
    let comment = Regex::new(r"(//.*$)|(/\*.*?\*/)").unwrap();
    let cast = Regex::new(r"\(\s*[A-Za-z_][A-Za-z0-9_ ]*\*?\s*\)").unwrap();
    let int = Regex::new(r"^(-?)(0[xX][0-9a-fA-F]+|[0-9]+)[uUlL]*$").unwrap();

    let mut result = Vec::new();
    for line in text.lines() {
        let Some(caps) = define.captures(line) else {
            continue;
        };
        let name = caps[1].to_string();

        let body = comment.replace_all(&caps[2], "");
        let body = cast.replace_all(&body, "");
        let body: String = body
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '(' && *c != ')')
            .collect();

        let value = match body.as_str() {
            "pdTRUE" => Some(Value::Unsigned(1)),
            "pdFALSE" => Some(Value::Unsigned(0)),
            _ => int.captures(&body).and_then(|v| decode_int(&v[1], &v[2])),
        };

        if let Some(value) = value {
            result.push(Define { name, value });
        }
    }
    result
}

fn decode_int(sign: &str, digits: &str) -> Option<Value> {
    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u64>().ok()?
    };
    if sign.is_empty() {
        Some(Value::Unsigned(magnitude))
    } else {
        let v = i64::try_from(magnitude).ok()?;
        Some(Value::Signed(-v))
    }
}

/// Read and parse the config header at `path`, asking cargo to rerun when it changes.
pub fn load_config(path: &Path) -> Result<Vec<Define>> {
    println!("cargo:rerun-if-changed={}", path.display());
    let text = fs::read_to_string(path)
        .with_context(|| format!("Unable to read FreeRTOS config {}", path.display()))?;
    Ok(parse_config(&text))
}

/// Export the enabled config entries as `cfg` flags.  This must happen in any crate that wishes to
/// conditionally compile on the kernel configuration.
pub fn export_bool_config() -> Result<()> {
    export_bool_config_from(&config_path()?)
}

/// Like [`export_bool_config`], with an explicit header path.
pub fn export_bool_config_from(path: &Path) -> Result<()> {
    for def in load_config(path)? {
        if def.value.is_set() {
            println!("cargo:rustc-cfg={}", def.name);
        }
    }
    Ok(())
}

/// Write the integer config entries to `config.rs` in `OUT_DIR`.
///
/// Values that fit in a `u32` are emitted as `u32` so they can feed const generics (such as the
/// tick rate used by `fugit`).  Larger values become `u64`, and negative ones become `i64`.
pub fn build_config_mod() -> Result<()> {
    build_config_mod_from(&config_path()?)
}

/// Like [`build_config_mod`], with an explicit header path.
pub fn build_config_mod_from(path: &Path) -> Result<()> {
    let outdir = env::var("OUT_DIR").map_err(|_| anyhow!("OUT_DIR must be set"))?;
    let defines = load_config(path)?;
    write_config_mod(&defines, &Path::new(&outdir).join("config.rs"))
}

/// Write a set of defines as a module of constants to a given path.
pub fn write_config_mod(defines: &[Define], path: &Path) -> Result<()> {
    let mut f = File::create(path)
        .with_context(|| format!("Unable to create {}", path.display()))?;
    for def in defines {
        writeln!(&mut f, "#[allow(dead_code)]")?;
        match def.value {
            Value::Unsigned(v) if v <= u32::MAX as u64 => {
                writeln!(&mut f, "pub const {}: u32 = {};", def.name, v)?
            }
            Value::Unsigned(v) => writeln!(&mut f, "pub const {}: u64 = {};", def.name, v)?,
            Value::Signed(v) => writeln!(&mut f, "pub const {}: i64 = {};", def.name, v)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
#ifndef FREERTOS_CONFIG_H
#define FREERTOS_CONFIG_H

#define configUSE_PREEMPTION                    1
#define configTICK_RATE_HZ                      ( ( TickType_t ) 1000 )
#define configMAX_PRIORITIES                    ( 7 )   /* priorities */
#define configTOTAL_HEAP_SIZE                   ( ( size_t ) 0x10000UL )
#define configUSE_RECURSIVE_MUTEXES             pdTRUE
#define configUSE_QUEUE_SETS                    0 // unused
#define configTIMER_TASK_STACK_DEPTH            ( configMINIMAL_STACK_SIZE * 2 )
#define INCLUDE_vTaskSuspend                    1
#define configASSERT( x )                       if( ( x ) == 0 ) { for( ;; ); }
#define portFOO                                 1
#define configNEGATIVE                          -3

#endif
"#;

    fn lookup(defs: &[Define], name: &str) -> Option<Value> {
        defs.iter().find(|d| d.name == name).map(|d| d.value)
    }

    #[test]
    fn parses_plain_and_cast_values() {
        let defs = parse_config(SAMPLE);
        assert_eq!(lookup(&defs, "configUSE_PREEMPTION"), Some(Value::Unsigned(1)));
        assert_eq!(lookup(&defs, "configTICK_RATE_HZ"), Some(Value::Unsigned(1000)));
        assert_eq!(lookup(&defs, "configMAX_PRIORITIES"), Some(Value::Unsigned(7)));
        assert_eq!(lookup(&defs, "configTOTAL_HEAP_SIZE"), Some(Value::Unsigned(0x10000)));
        assert_eq!(lookup(&defs, "configUSE_RECURSIVE_MUTEXES"), Some(Value::Unsigned(1)));
        assert_eq!(lookup(&defs, "configUSE_QUEUE_SETS"), Some(Value::Unsigned(0)));
        assert_eq!(lookup(&defs, "INCLUDE_vTaskSuspend"), Some(Value::Unsigned(1)));
        assert_eq!(lookup(&defs, "configNEGATIVE"), Some(Value::Signed(-3)));
    }

    #[test]
    fn skips_expressions_and_other_macros() {
        let defs = parse_config(SAMPLE);
        assert_eq!(lookup(&defs, "configTIMER_TASK_STACK_DEPTH"), None);
        assert_eq!(lookup(&defs, "configASSERT"), None);
        assert_eq!(lookup(&defs, "portFOO"), None);
        assert_eq!(lookup(&defs, "FREERTOS_CONFIG_H"), None);
    }

    #[test]
    fn zero_is_not_set() {
        assert!(!Value::Unsigned(0).is_set());
        assert!(Value::Unsigned(2).is_set());
        assert!(Value::Signed(-1).is_set());
    }

    #[test]
    fn writes_typed_constants() {
        let dir = env::temp_dir().join(format!("freertos-build-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.rs");
        let defs = vec![
            Define { name: "configA".into(), value: Value::Unsigned(5) },
            Define { name: "configB".into(), value: Value::Unsigned(1 << 40) },
            Define { name: "configC".into(), value: Value::Signed(-2) },
        ];
        write_config_mod(&defs, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("pub const configA: u32 = 5;"));
        assert!(text.contains("pub const configB: u64 = 1099511627776;"));
        assert!(text.contains("pub const configC: i64 = -2;"));
        fs::remove_dir_all(&dir).unwrap();
    }
}
