#![no_main]

use classveil::codec::{read_class, write_class, ReadOptions};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(class) = read_class(data, ReadOptions::default()) {
        let _ = write_class(&class);
    }
});
