#![no_main]

use archipelago_sim::config::SimulationConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Parsing arbitrary YAML must never panic, only error.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = serde_yaml::from_str::<SimulationConfig>(s);
    }
});
