// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 seektar contributors

use std::time::Duration;

pub fn format_size(size: u64) -> String {
    const UNITS: [(u64, &str); 3] = [
        (1024 * 1024 * 1024, "GB"),
        (1024 * 1024, "MB"),
        (1024, "KB"),
    ];

    for (scale, unit) in UNITS {
        if size >= scale {
            return format!("{:.2} {}", size as f64 / scale as f64, unit);
        }
    }
    format!("{} bytes", size)
}

pub fn format_elapsed_time(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let mins = total_secs / 60;
    let secs = total_secs % 60;
    let millis = duration.subsec_millis();

    if mins > 0 {
        format!("{}m {}.{:03}s", mins, secs, millis)
    } else {
        format!("{}.{:03}s", secs, millis)
    }
}
