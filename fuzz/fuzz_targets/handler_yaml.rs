#![no_main]

use critical_core::HandlerSpec;
use critical_router::{Handler, Registry};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // serde_yaml takes &str
    if let Ok(yaml_str) = std::str::from_utf8(data) {
        if let Ok(spec) = HandlerSpec::parse(yaml_str) {
            if spec.validate().is_ok() {
                let _ = Handler::from_spec(&spec, &Registry::with_defaults());
            }
        }
    }
});
