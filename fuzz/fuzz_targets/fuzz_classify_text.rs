// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
#![no_main]

use libfuzzer_sys::fuzz_target;
use nh::nixfile::{classify_text, UnitKind, FLAKE_FILE};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let plain = classify_text(None, &text);
    let flake = classify_text(Some(FLAKE_FILE), &text);

    assert_eq!(flake.kind, UnitKind::Composite);
    assert_eq!(plain.remote_fetch, flake.remote_fetch);
});
