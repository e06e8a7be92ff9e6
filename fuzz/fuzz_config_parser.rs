//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary bytes through `AppConfig::parse()`; any accepted config
//! must yield a usable agent timeout and reaper interval.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = threadline_config::AppConfig::parse(s) {
        assert!(!config.agent.token_timeout().is_zero());
        assert!(!config.agent.reaper_interval().is_zero());
    }
});
