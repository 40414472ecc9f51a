#![no_main]
use libfuzzer_sys::fuzz_target;
use romcard_rs::core::splash::classify;

fuzz_target!(|data: &[u8]| {
    let _ = classify(data, false);
    let _ = classify(data, true);
});
