use super::concurrent;
use embedded_hal::delay::DelayNs;

/// Advances the named fake clock instead of sleeping.
#[derive(Debug)]
pub struct Delay {
    name: &'static str,
    ms_calls: Vec<u32>,
}

impl Delay {
    /// Shares the clock of the fake pin with the same name. Does not reset it.
    pub fn new(name: &'static str) -> Delay {
        Delay {
            name,
            ms_calls: Vec::new(),
        }
    }

    pub fn now_us(&self) -> u64 {
        concurrent::now_us(self.name)
    }

    /// Every `delay_ms` argument, in call order.
    pub fn ms_calls(&self) -> &[u32] {
        &self.ms_calls
    }
}

impl DelayNs for Delay {
    fn delay_ns(&mut self, ns: u32) {
        concurrent::advance_clock_ns(self.name, ns as u64);
    }

    fn delay_us(&mut self, us: u32) {
        concurrent::advance_clock_ns(self.name, us as u64 * 1_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.ms_calls.push(ms);
        concurrent::advance_clock_ns(self.name, ms as u64 * 1_000_000);
    }
}
