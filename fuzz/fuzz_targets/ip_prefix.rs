#![no_main]

use std::net::IpAddr;

use arbitrary::Arbitrary;
use critical_router::filter::IpPrefix;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    prefix: String,
    addr: IpAddr,
}

fuzz_target!(|input: Input| {
    if let Ok(prefix) = input.prefix.parse::<IpPrefix>() {
        let _ = prefix.contains(input.addr);
    }
});
