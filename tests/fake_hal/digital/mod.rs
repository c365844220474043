use super::concurrent;
use embedded_hal::digital::{ErrorKind, ErrorType, InputPin, OutputPin, PinState};
use rack_sensors::line::{Line, Pull};
use std::collections::VecDeque;

#[derive(Debug, PartialEq)]
pub enum Error {}

impl embedded_hal::digital::Error for Error {
    fn kind(&self) -> ErrorKind {
        match *self {}
    }
}

/// One peripheral response: `(duration_us, level)` segments, measured from the moment the
/// controller releases the line. The last level holds forever.
pub type Trace = Vec<(u32, PinState)>;

/// A DS18B20-like peripheral that answers reset, write and read slots.
#[derive(Debug)]
pub struct OneWireDevice {
    present: bool,
    loopback: bool,
    scratchpad: [u8; 9],
    written: Vec<u8>,
    bits_in: u8,
    bit_count: u8,
    bytes_since_reset: usize,
    function: Option<u8>,
    to_send: VecDeque<bool>,
    echo: VecDeque<bool>,
    sending: Option<bool>,
    falling_edge_ns: u64,
    presence_window_ns: Option<(u64, u64)>,
    resets: usize,
}

const PRESENCE_START_US: u64 = 15;
const PRESENCE_END_US: u64 = 135;
const SLOT_SAMPLE_US: u64 = 15;
const RESET_MIN_US: u64 = 480;

impl OneWireDevice {
    /// A sensor whose scratchpad reads back `scratchpad` as-is, CRC byte included.
    pub fn sensor(scratchpad: [u8; 9]) -> OneWireDevice {
        OneWireDevice {
            present: true,
            loopback: false,
            scratchpad,
            written: Vec::new(),
            bits_in: 0,
            bit_count: 0,
            bytes_since_reset: 0,
            function: None,
            to_send: VecDeque::new(),
            echo: VecDeque::new(),
            sending: None,
            falling_edge_ns: 0,
            presence_window_ns: None,
            resets: 0,
        }
    }

    /// Nothing answers on the line.
    pub fn absent() -> OneWireDevice {
        OneWireDevice {
            present: false,
            ..OneWireDevice::sensor([0; 9])
        }
    }

    /// Sends the bytes written in one session back in the read slots after the next reset.
    pub fn loopback() -> OneWireDevice {
        OneWireDevice {
            loopback: true,
            ..OneWireDevice::sensor([0; 9])
        }
    }

    /// Queues bits for the next read slots.
    pub fn with_bits(mut self, bits: &[bool]) -> OneWireDevice {
        self.to_send.extend(bits.iter().copied());
        self
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn scratchpad(&self) -> [u8; 9] {
        self.scratchpad
    }

    pub fn resets(&self) -> usize {
        self.resets
    }

    fn on_falling_edge(&mut self, now_ns: u64) {
        self.falling_edge_ns = now_ns;
        self.sending = self.to_send.pop_front();
    }

    fn on_release(&mut self, now_ns: u64) {
        let low_us = (now_ns - self.falling_edge_ns) / 1_000;
        if low_us >= RESET_MIN_US {
            self.sending = None;
            self.to_send.clear();
            self.to_send.extend(self.echo.drain(..));
            self.bits_in = 0;
            self.bit_count = 0;
            self.bytes_since_reset = 0;
            self.function = None;
            self.resets += 1;
            if self.present {
                self.presence_window_ns = Some((
                    now_ns + PRESENCE_START_US * 1_000,
                    now_ns + PRESENCE_END_US * 1_000,
                ));
            }
            return;
        }
        if self.sending.is_some() {
            return;
        }

        if low_us < SLOT_SAMPLE_US {
            self.bits_in |= 1 << self.bit_count;
        }
        self.bit_count += 1;
        if self.bit_count == 8 {
            let byte = self.bits_in;
            self.bits_in = 0;
            self.bit_count = 0;
            self.on_byte(byte);
        }
    }

    fn on_byte(&mut self, byte: u8) {
        self.written.push(byte);
        self.bytes_since_reset += 1;
        if self.loopback {
            self.echo.extend((0..8).map(|i| byte & (1 << i) != 0));
            return;
        }

        match (self.bytes_since_reset, self.function) {
            (2, _) => {
                self.function = Some(byte);
                if byte == 0xBE {
                    for pad_byte in self.scratchpad {
                        self.to_send.extend((0..8).map(|i| pad_byte & (1 << i) != 0));
                    }
                }
            }
            (3..=5, Some(0x4E)) => {
                self.scratchpad[self.bytes_since_reset - 1] = byte;
            }
            _ => {}
        }
    }

    fn level(&self, now_ns: u64) -> PinState {
        if let Some((start, end)) = self.presence_window_ns {
            if now_ns >= start && now_ns < end {
                return PinState::Low;
            }
        }
        if self.sending == Some(false) && now_ns - self.falling_edge_ns < SLOT_SAMPLE_US * 1_000 {
            return PinState::Low;
        }
        PinState::High
    }
}

#[derive(Debug)]
enum Bus {
    /// Only the pull-up: reads high whenever the line floats.
    Idle,
    Traces {
        pending: VecDeque<Trace>,
        current: Option<Trace>,
    },
    OneWire(OneWireDevice),
    /// Shorted: reads the same level whenever the line floats.
    Stuck(PinState),
}

#[derive(Debug)]
pub struct Pin {
    name: &'static str,
    driven: bool,
    level: PinState,
    released_at_ns: u64,
    direction_changes: usize,
    pull: Pull,
    bus: Bus,
}

impl Pin {
    /// Creates a floating pin and resets the fake clock of the same name.
    pub fn new(name: &'static str) -> Pin {
        concurrent::reset_clock(name);
        Pin {
            name,
            driven: false,
            level: PinState::High,
            released_at_ns: 0,
            direction_changes: 0,
            pull: Pull::None,
            bus: Bus::Idle,
        }
    }

    /// Queues a peripheral response, played back after the next release.
    pub fn push_trace(&mut self, trace: Trace) {
        match &mut self.bus {
            Bus::Traces { pending, .. } => pending.push_back(trace),
            bus => {
                *bus = Bus::Traces {
                    pending: VecDeque::from(vec![trace]),
                    current: None,
                }
            }
        }
    }

    pub fn attach(&mut self, device: OneWireDevice) {
        self.bus = Bus::OneWire(device);
    }

    pub fn stick(&mut self, level: PinState) {
        self.bus = Bus::Stuck(level);
    }

    pub fn set_pull(&mut self, pull: Pull) {
        self.pull = pull;
    }

    pub fn device(&self) -> Option<&OneWireDevice> {
        match &self.bus {
            Bus::OneWire(device) => Some(device),
            _ => None,
        }
    }

    pub fn is_floating(&self) -> bool {
        !self.driven
    }

    pub fn direction_changes(&self) -> usize {
        self.direction_changes
    }

    fn now_ns(&self) -> u64 {
        concurrent::now_ns(self.name)
    }

    fn line_level(&self) -> PinState {
        if self.driven {
            return self.level;
        }
        match &self.bus {
            Bus::Idle => PinState::High,
            Bus::Traces { current: None, .. } => PinState::High,
            Bus::Traces {
                current: Some(trace),
                ..
            } => {
                let elapsed_us = (self.now_ns() - self.released_at_ns) / 1_000;
                let mut end_us = 0u64;
                for (duration_us, level) in trace.iter() {
                    end_us += *duration_us as u64;
                    if elapsed_us < end_us {
                        return *level;
                    }
                }
                trace.last().map_or(PinState::High, |(_, level)| *level)
            }
            Bus::OneWire(device) => device.level(self.now_ns()),
            Bus::Stuck(level) => *level,
        }
    }
}

impl ErrorType for Pin {
    type Error = Error;
}

impl InputPin for Pin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.line_level() == PinState::High)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.line_level() == PinState::Low)
    }
}

impl OutputPin for Pin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.driven && self.level == PinState::High {
            let now_ns = self.now_ns();
            if let Bus::OneWire(device) = &mut self.bus {
                device.on_falling_edge(now_ns);
            }
        }
        self.level = PinState::Low;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.level = PinState::High;
        Ok(())
    }
}

impl Line for Pin {
    fn set_output(&mut self) -> Result<(), Self::Error> {
        if !self.driven {
            self.direction_changes += 1;
        }
        self.driven = true;
        self.level = PinState::High;
        Ok(())
    }

    fn set_input(&mut self) -> Result<(), Self::Error> {
        if !self.driven {
            return Ok(());
        }
        self.direction_changes += 1;
        self.driven = false;
        let now_ns = self.now_ns();
        self.released_at_ns = now_ns;
        match &mut self.bus {
            Bus::Traces { pending, current } => *current = pending.pop_front(),
            Bus::OneWire(device) if self.level == PinState::Low => device.on_release(now_ns),
            _ => {}
        }
        Ok(())
    }

    fn pull(&self) -> Pull {
        self.pull
    }
}
