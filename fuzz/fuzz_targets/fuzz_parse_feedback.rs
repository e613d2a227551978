// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use auto_feedback::feedback::{build_prompt, parse_feedback};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = std::str::from_utf8(data) {
        let feedback = parse_feedback(raw);
        if feedback.grade.is_empty() && feedback.feedback.is_empty() {
            assert!(raw.trim_start().starts_with('{'));
        }
        let _ = build_prompt(raw);
    }
});
