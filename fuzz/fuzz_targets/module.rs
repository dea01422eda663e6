#![no_main]

use libfuzzer_sys::fuzz_target;
use dotstub::{File, JsonStore, StringExternalizer, TransformOptions};

fuzz_target!(|data: &[u8]| {
    let Ok(file) = File::from_mem(data.to_vec()) else {
        return;
    };
    if let Ok(mut module) = JsonStore::default().decode(&file) {
        let _ = StringExternalizer::new(TransformOptions::default()).run(&mut module);
    }
});
