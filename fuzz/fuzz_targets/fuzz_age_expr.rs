// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
#![no_main]

use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;
use nh::age::Cutoff;

fuzz_target!(|data: &[u8]| {
    if let Ok(expr) = std::str::from_utf8(data) {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 0).unwrap();
        if let Ok(cutoff) = Cutoff::parse_relative_to(expr, now) {
            // Relative expressions never move forward in time
            if expr.trim_end().ends_with("ago") {
                assert!(cutoff.instant() <= now);
            }
        }
    }
});
