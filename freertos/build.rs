// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

// Pre-build code for the freertos crate.

// The kernel configuration decides which wrappers exist.  Each enabled `config*` and `INCLUDE_*`
// define in FreeRTOSConfig.h becomes a cfg here, using the header located by freertos-sys.

fn main() -> anyhow::Result<()> {
    freertos_build::export_bool_config()
}
