//! Fuzz target for jail fragment parsing.
//!
//! Run with: cargo +nightly fuzz run fuzz_fragment_parser
//!
//! Fragments on disk may have been edited by hand; none may panic the
//! parser or the renderer.

#![no_main]

use std::path::Path;

use jailkeeper_core::jail::{parse_fragment, render_fragment};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(def) = parse_fragment("fuzz", "fuzz.local", text) else {
        return;
    };
    if def.check().is_err() {
        return;
    }
    let rendered = render_fragment(&def, Path::new("/etc/fail2ban/jail.d/ignoreip.conf"));
    let _ = parse_fragment("fuzz", "fuzz.local", &rendered);
});
