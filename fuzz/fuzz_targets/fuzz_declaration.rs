#![no_main]
use grupin_rs::Grupin;
use libfuzzer_sys::fuzz_target;

// Malformed declarations must fail with an error, never a panic
fuzz_target!(|data: &[u8]| {
    if let Ok(yaml) = std::str::from_utf8(data) {
        let _ = Grupin::from_yaml_str(yaml);
    }
});
