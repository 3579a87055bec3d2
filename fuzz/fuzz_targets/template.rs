#![no_main]

use critical_core::Record;
use critical_router::Formatter;
use critical_router::formatter::TemplateFormatter;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(template) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(formatter) = TemplateFormatter::new(template) else {
        return;
    };

    let record = Record::from_value(serde_json::json!({
        "version": "1.1",
        "host": "fuzz",
        "short_message": "message",
        "full_message": "",
        "timestamp": 1700000000.5,
        "level": 3,
        "_facility": "kernel",
    }));
    if let Ok(record) = record {
        let _ = formatter.format(&record);
    }
});
