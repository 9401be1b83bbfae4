#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let body = String::from_utf8_lossy(data);

    let _ = chargegate::station::xml::decode_value(&body);
    let _ = chargegate::station::xml::decode_status(&body);
    let _ = chargegate::market::parse_variable("price_per_kwh", &body);
});
