//! Fuzz target for the daemon reply parsers.
//!
//! Run with: cargo +nightly fuzz run fuzz_reply_parser
//!
//! Replies come from another process; no input may panic the parser.

#![no_main]

use jailkeeper_core::command::CommandFamily;
use jailkeeper_core::parser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    for family in [
        CommandFamily::JailList,
        CommandFamily::JailStatus,
        CommandFamily::BanCount,
        CommandFamily::Echo,
    ] {
        let _ = parser::parse(family, "fuzz", text);
    }
    let _ = parser::parse_jail_status("fuzz", text);
});
