#![no_main]

use archipelago_sim::{initialize_world, SimulationConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // World initialization from fuzzed numeric parameters must validate or
    // error cleanly, never panic.
    if data.len() < 32 {
        return;
    }
    let seed = u64::from_le_bytes(data[0..8].try_into().unwrap());
    let island_count = u16::from_le_bytes(data[8..10].try_into().unwrap()) as usize % 64;
    let agent_count = u16::from_le_bytes(data[10..12].try_into().unwrap()) as usize % 16;
    let tax_rate = f64::from_le_bytes(data[12..20].try_into().unwrap());
    let time_scale = f64::from_le_bytes(data[20..28].try_into().unwrap());

    let config = SimulationConfig {
        seed,
        island_count,
        agent_count,
        tax_rate: if tax_rate.is_finite() { tax_rate.abs() % 1.0 } else { 0.05 },
        time_scale: if time_scale.is_finite() { time_scale.abs().max(0.01) } else { 1.0 },
        ..SimulationConfig::default()
    };
    let _ = initialize_world(&config);
});
