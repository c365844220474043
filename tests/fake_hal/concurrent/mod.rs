use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;

// Tests run in parallel, so every fake clock is keyed by the test's name.
lazy_static! {
    static ref CLOCKS_NS: Mutex<HashMap<&'static str, u64>> = Mutex::new(HashMap::new());
}

pub fn reset_clock(name: &'static str) {
    let mut map = CLOCKS_NS.lock().unwrap();
    map.insert(name, 0);
}

pub fn advance_clock_ns(name: &'static str, ns: u64) {
    let mut map = CLOCKS_NS.lock().unwrap();
    *map.entry(name).or_insert(0) += ns;
}

pub fn now_ns(name: &str) -> u64 {
    let map = CLOCKS_NS.lock().unwrap();
    map.get(name).copied().unwrap_or(0)
}

pub fn now_us(name: &str) -> u64 {
    now_ns(name) / 1_000
}
