//! Fuzz target for the TOML config loader.
//!
//! Run with: cargo +nightly fuzz run config_fuzz -- -max_total_time=60

#![no_main]

use honeycomb_core::HoneycombConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    // Anything accepted has already been validated.
    if let Ok(config) = HoneycombConfig::from_toml_str(input) {
        assert!(config.validate().is_ok());
        assert!(config.cache.max_depth > 0);
        assert!(config.sync.interval_ms > 0);
    }
});
