#![no_main]
use libfuzzer_sys::fuzz_target;
use romcard_rs::RomReader;

// Arbitrary bytes must never panic, and a failed step must not move the state
fuzz_target!(|data: &[u8]| {
    let mut reader = RomReader::new(data.to_vec());

    let steps: [fn(&mut RomReader) -> romcard_rs::Result<()>; 3] = [
        RomReader::acquire_card_header,
        RomReader::acquire_rom_heap,
        RomReader::acquire_databases,
    ];
    for step in steps {
        let before = reader.state();
        if step(&mut reader).is_err() {
            assert_eq!(reader.state(), before);
            break;
        }
    }

    let _ = reader.acquire_features();
    let _ = reader.acquire_splash_db();
    let _ = reader.summary();

    for db in reader.databases() {
        for item in &db.items {
            let _ = reader.item_data(item);
        }
    }
    if let Some(chunk) = reader.splash_chunk() {
        let _ = reader.is_bitmap_color(chunk, true);
    }
});
