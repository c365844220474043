use rack_sensors::adc::AdcChannel;
use std::collections::VecDeque;

#[derive(Debug, PartialEq)]
pub struct AdcError();

/// A converter that returns scripted raw values, each after a few busy polls.
pub struct Adc {
    samples: VecDeque<u16>,
    resolution_bits: u8,
    busy_polls: u8,
    polls_left: u8,
    pending: Option<u16>,
    starts: usize,
}

impl Adc {
    pub fn new(samples: Vec<u16>, resolution_bits: u8) -> Adc {
        Adc {
            samples: samples.into(),
            resolution_bits,
            busy_polls: 2,
            polls_left: 0,
            pending: None,
            starts: 0,
        }
    }

    /// Always returns `raw`.
    pub fn constant(raw: u16, resolution_bits: u8) -> Adc {
        Adc::new(vec![raw; 1024], resolution_bits)
    }

    pub fn starts(&self) -> usize {
        self.starts
    }
}

impl AdcChannel for Adc {
    type Error = AdcError;

    fn start(&mut self) -> Result<(), AdcError> {
        self.starts += 1;
        self.pending = Some(self.samples.pop_front().ok_or(AdcError())?);
        self.polls_left = self.busy_polls;
        Ok(())
    }

    fn poll(&mut self) -> nb::Result<u16, AdcError> {
        if self.polls_left > 0 {
            self.polls_left -= 1;
            return Err(nb::Error::WouldBlock);
        }
        self.pending.take().ok_or(nb::Error::Other(AdcError()))
    }

    fn resolution_bits(&self) -> u8 {
        self.resolution_bits
    }
}
