use core::fmt;
use core::time::Duration;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::PinState;

use crate::line::{Line, Pull, ReleaseOnDrop};

/// The resolution of one raw temperature step, in degrees Celsius.
pub const MAX_RESOLUTION_F32: f32 = 0.0625;

/// Minimum reset pulse width.
pub const RESET_PULSE_US: u32 = 480;
/// Delay after releasing the reset pulse before sampling for presence. Sensors send a 60-240us
/// pulse starting 15-60us after the release.
pub const PRESENCE_SAMPLE_DELAY_US: u32 = 80;
/// Remainder of the reset/presence window after the presence sample.
pub const POST_PRESENCE_DELAY_US: u32 = 400;

/// Every write slot is this wide, whatever the bit value.
pub const WRITE_SLOT_US: u32 = 50;
const WRITE_1_LOW_US: u32 = 1;
const WRITE_1_RELEASED_US: u32 = WRITE_SLOT_US - WRITE_1_LOW_US;

/// Every read slot is this wide.
pub const READ_SLOT_US: u32 = 60;
const READ_REQUEST_LOW_US: u32 = 2;
const READ_POST_SAMPLE_US: u32 = READ_SLOT_US - READ_REQUEST_LOW_US;

/// Number of bytes in the scratchpad, including the CRC.
pub const SCRATCHPAD_LEN: usize = 9;
/// The low five bits of the configuration byte always read as 1.
const CONFIGURATION_RESERVED_BITS: u8 = 0b1_1111;

#[derive(Debug, PartialEq)]
pub enum Error<TIoError> {
    /// Wrapped error from the HAL.
    Wrapped(TIoError),
    /// Invalid argument was provided.
    InvalidArgument,
    /// No presence pulse followed the reset.
    NoPresence,
    /// The scratchpad failed its CRC check or its fixed bits are wrong.
    BadData,
}

impl<TIoError> From<TIoError> for Error<TIoError> {
    fn from(error: TIoError) -> Error<TIoError> {
        Error::Wrapped(error)
    }
}

impl<TIoError> fmt::Display for Error<TIoError>
where
    TIoError: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Wrapped(err) => write!(f, "IO error: {:?}", err),
            Error::InvalidArgument => write!(f, "invalid argument"),
            Error::NoPresence => write!(f, "no presence pulse after reset"),
            Error::BadData => write!(f, "corrupt scratchpad"),
        }
    }
}

/// Outcome of a reset.
///
/// `Absent` is a signalled result, not a fault: the caller decides whether to go on with the
/// session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Nine-bit resolution reads the temperature in 0.5 degree increments.
    NineBit = 0b00,
    /// Ten-bit resolution reads the temperature in 0.25 degree increments.
    TenBit = 0b01,
    /// Eleven-bit resolution reads the temperature in 0.125 degree increments.
    ElevenBit = 0b10,
    /// Twelve-bit resolution reads the temperature in 0.0625 degree increments.
    TwelveBit = 0b11,
}

impl ResolutionMode {
    /// The worst-case time the sensor needs for one conversion.
    pub fn conversion_time(self) -> Duration {
        match self {
            ResolutionMode::NineBit => Duration::from_micros(93_750),
            ResolutionMode::TenBit => Duration::from_micros(187_500),
            ResolutionMode::ElevenBit => Duration::from_millis(375),
            ResolutionMode::TwelveBit => Duration::from_millis(750),
        }
    }

    /// The scratchpad configuration byte for this mode.
    pub fn configuration_byte(self) -> u8 {
        ((self as u8) << 5) | CONFIGURATION_RESERVED_BITS
    }

    fn from_configuration_byte(byte: u8) -> ResolutionMode {
        match (byte >> 5) & 0b11 {
            0b00 => ResolutionMode::NineBit,
            0b01 => ResolutionMode::TenBit,
            0b10 => ResolutionMode::ElevenBit,
            _ => ResolutionMode::TwelveBit,
        }
    }
}

/// Administrative commands for operating the single-wire line.
///
/// Only one device per line is supported, so skipping ROM selection is the only command sent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RomCommand {
    /// Addresses all devices simultaneously.
    Skip = 0xCC,
}

/// Requests the sensor perform some operation.
///
/// These commands can only be sent after a [`RomCommand`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FunctionCommand {
    /// Stores the current temperature in the 2-byte temperature register in the scratchpad.
    ConvertTemperature = 0x44,
    /// Writes T<sub>H</sub>, T<sub>L</sub> and the configuration byte, in that order.
    WriteScratchpad = 0x4E,
    /// Reads the nine scratchpad bytes, ending with the CRC.
    ReadScratchpad = 0xBE,
}

/// Dallas/Maxim CRC-8 (polynomial x<sup>8</sup> + x<sup>5</sup> + x<sup>4</sup> + 1), as used
/// for ROM codes and the scratchpad.
///
/// Running it over data followed by its CRC byte yields 0.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for byte in data {
        let mut byte = *byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
    }
    crc
}

/// Represents a temperature reading from the sensor, in 1/16 degree steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Temperature {
    raw: i16,
}

impl Temperature {
    pub fn from_bytes(low_sig: u8, high_sig: u8) -> Temperature {
        Temperature {
            raw: i16::from_le_bytes([low_sig, high_sig]),
        }
    }

    /// The raw two's-complement reading, in units of [`MAX_RESOLUTION_F32`].
    pub fn raw(&self) -> i16 {
        self.raw
    }

    /// The integer part of the temperature measurement, truncated towards zero.
    pub fn integer_part(&self) -> i16 {
        self.raw / 16
    }

    /// The fractional part, in sixteenths, carrying the sign of the reading.
    pub fn decimal_part(&self) -> i8 {
        (self.raw % 16) as i8
    }

    /// The nearest integer of the temperature measurement.
    ///
    /// Calculated without performing floating-point operations. Halves round away from zero.
    pub fn nearest_integer(&self) -> i16 {
        let half = if self.raw < 0 { -8 } else { 8 };
        ((self.raw as i32 + half) / 16) as i16
    }

    pub fn celsius(&self) -> f32 {
        self.raw as f32 * MAX_RESOLUTION_F32
    }
}

impl From<Temperature> for f32 {
    fn from(temp: Temperature) -> Self {
        temp.celsius()
    }
}

/// The sensor's nine scratchpad bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scratchpad {
    bytes: [u8; SCRATCHPAD_LEN],
}

impl Scratchpad {
    /// Accepts the bytes only if the last one is the CRC of the first eight and the reserved
    /// configuration bits are set.
    ///
    /// All zeroes pass the CRC, and are what a line shorted to ground reads as.
    pub fn from_bytes(bytes: [u8; SCRATCHPAD_LEN]) -> Option<Scratchpad> {
        if crc8(&bytes[..SCRATCHPAD_LEN - 1]) != bytes[SCRATCHPAD_LEN - 1] {
            return None;
        }
        if bytes[4] & CONFIGURATION_RESERVED_BITS != CONFIGURATION_RESERVED_BITS {
            return None;
        }
        Some(Scratchpad { bytes })
    }

    pub fn temperature(&self) -> Temperature {
        Temperature::from_bytes(self.bytes[0], self.bytes[1])
    }

    pub fn alarm_high(&self) -> i8 {
        self.bytes[2] as i8
    }

    pub fn alarm_low(&self) -> i8 {
        self.bytes[3] as i8
    }

    pub fn resolution(&self) -> ResolutionMode {
        ResolutionMode::from_configuration_byte(self.bytes[4])
    }
}

/// Bit-banged driver for a DS18B20 thermometer.
///
/// A session starts with [`Ds18b20::reset`]; bytes written and read afterwards belong to that
/// session. The driver does not refuse writes or reads after an [`Presence::Absent`] reset, but
/// they are meaningless.
///
/// Bits travel least-significant first, unlike the DHT protocol.
#[derive(Debug)]
pub struct Ds18b20<L, D> {
    line: L,
    delay: D,
    resolution: ResolutionMode,
}

impl<L, D> Ds18b20<L, D>
where
    L: Line,
    D: DelayNs,
{
    /// Constructs a driver on the given line, assuming the sensor's power-on 12-bit resolution.
    ///
    /// A line pulled down while floating is rejected with [`Error::InvalidArgument`].
    pub fn new(mut line: L, delay: D) -> Result<Ds18b20<L, D>, Error<L::Error>> {
        if line.pull() == Pull::Down {
            return Err(Error::InvalidArgument);
        }
        line.set_input()?;
        Ok(Ds18b20 {
            line,
            delay,
            resolution: ResolutionMode::TwelveBit,
        })
    }

    pub fn resolution(&self) -> ResolutionMode {
        self.resolution
    }

    /// Drives the reset pulse and samples for a presence pulse.
    ///
    /// Always takes the full reset/presence window, whatever the outcome.
    pub fn reset(&mut self) -> Result<Presence, Error<L::Error>> {
        let mut line = ReleaseOnDrop::new(&mut self.line);
        line.set_output()?;
        line.write(PinState::Low)?;
        self.delay.delay_us(RESET_PULSE_US);
        line.release()?;

        self.delay.delay_us(PRESENCE_SAMPLE_DELAY_US);
        let presence = if self.line.is_low()? {
            Presence::Present
        } else {
            Presence::Absent
        };
        self.delay.delay_us(POST_PRESENCE_DELAY_US);
        log::debug!("ds18b20 reset: {:?}", presence);
        Ok(presence)
    }

    /// Writes one bit in a single write slot.
    pub fn write_bit(&mut self, bit: bool) -> Result<(), Error<L::Error>> {
        let mut line = ReleaseOnDrop::new(&mut self.line);
        line.set_output()?;
        line.write(PinState::Low)?;
        if bit {
            self.delay.delay_us(WRITE_1_LOW_US);
            line.release()?;
            self.delay.delay_us(WRITE_1_RELEASED_US);
        } else {
            self.delay.delay_us(WRITE_SLOT_US);
            line.release()?;
        }
        Ok(())
    }

    /// Reads one bit in a single read slot.
    pub fn read_bit(&mut self) -> Result<bool, Error<L::Error>> {
        let mut line = ReleaseOnDrop::new(&mut self.line);
        line.set_output()?;
        line.write(PinState::Low)?;
        self.delay.delay_us(READ_REQUEST_LOW_US);
        line.release()?;

        let bit = self.line.is_high()?;
        self.delay.delay_us(READ_POST_SAMPLE_US);
        Ok(bit)
    }

    /// Writes one byte, least-significant bit first.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), Error<L::Error>> {
        for i in 0..8 {
            self.write_bit(byte & (1 << i) != 0)?;
        }
        Ok(())
    }

    /// Reads one byte, least-significant bit first.
    pub fn read_byte(&mut self) -> Result<u8, Error<L::Error>> {
        let mut byte = 0u8;
        for i in 0..8 {
            if self.read_bit()? {
                byte |= 1 << i;
            }
        }
        Ok(byte)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error<L::Error>> {
        for byte in bytes {
            self.write_byte(*byte)?;
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<(), Error<L::Error>> {
        for byte in buffer.iter_mut() {
            *byte = self.read_byte()?;
        }
        Ok(())
    }

    /// Resets and addresses the only device on the line, failing if nothing answers.
    fn select_only_device(&mut self) -> Result<(), Error<L::Error>> {
        if self.reset()? == Presence::Absent {
            log::warn!("ds18b20 absent");
            return Err(Error::NoPresence);
        }
        self.write_byte(RomCommand::Skip as u8)
    }

    /// Reads and CRC-checks the scratchpad of the only device on the line.
    pub fn read_scratchpad(&mut self) -> Result<Scratchpad, Error<L::Error>> {
        self.select_only_device()?;
        self.write_byte(FunctionCommand::ReadScratchpad as u8)?;
        let mut bytes = [0u8; SCRATCHPAD_LEN];
        self.read_bytes(&mut bytes)?;
        Scratchpad::from_bytes(bytes).ok_or(Error::BadData)
    }

    /// Writes the alarm thresholds and resolution of the only device on the line.
    pub fn write_scratchpad(
        &mut self,
        alarm_high: i8,
        alarm_low: i8,
        resolution: ResolutionMode,
    ) -> Result<(), Error<L::Error>> {
        self.select_only_device()?;
        self.write_bytes(&[
            FunctionCommand::WriteScratchpad as u8,
            alarm_high as u8,
            alarm_low as u8,
            resolution.configuration_byte(),
        ])?;
        self.resolution = resolution;
        Ok(())
    }

    /// Triggers a conversion on the only device on the line, waits for it, and reads the result.
    pub fn read_temperature(&mut self) -> Result<Temperature, Error<L::Error>> {
        self.select_only_device()?;
        self.write_byte(FunctionCommand::ConvertTemperature as u8)?;
        self.delay
            .delay_us(self.resolution.conversion_time().as_micros() as u32);

        let scratchpad = self.read_scratchpad()?;
        let temperature = scratchpad.temperature();
        log::debug!("ds18b20 temperature: {} (raw)", temperature.raw());
        Ok(temperature)
    }

    /// Returns the line and delay.
    pub fn release(self) -> (L, D) {
        (self.line, self.delay)
    }
}
