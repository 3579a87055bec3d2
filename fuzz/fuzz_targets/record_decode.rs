#![no_main]

use critical_core::Record;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(record) = Record::from_slice(data) {
        let _ = record.source_ip();
        let _ = record.datetime();
        let _ = record.field("short_message");
    }
});
