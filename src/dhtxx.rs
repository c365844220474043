use core::fmt;
use core::time::Duration;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::PinState;

use crate::line::{Line, Pull, ReleaseOnDrop};

/// How long the line settles after the start pulse before the response is sampled.
pub const RESPONSE_SETTLE_US: u32 = 40;
/// How long the sensor holds its response low before pulling the line high.
pub const RESPONSE_LOW_US: u32 = 80;
/// Delay after a bit's rising edge before sampling it. Zero bits are high for ~26us, one bits for
/// ~70us.
pub const BIT_SAMPLE_DELAY_US: u32 = 40;
/// Granularity of every "wait until the line changes" loop.
pub const POLL_STEP_US: u32 = 1;
/// The default bound for each "wait until the line changes" loop.
pub const DEFAULT_WAIT_TIMEOUT_US: u32 = 1_000;

/// Number of bytes in a full reading, including the checksum.
pub const READING_LEN: usize = 5;

#[derive(Debug, PartialEq)]
pub enum Error<TIoError> {
    /// Wrapped error from the HAL.
    Wrapped(TIoError),
    /// Invalid argument was provided.
    InvalidArgument,
    /// The line never went low during the response settle window.
    NoResponse,
    /// The line went low but was not released high after the response window.
    InvalidResponse,
    /// A "wait until the line changes" loop ran past its configured bound.
    Timeout,
    /// The checksum byte does not match the sum of the data bytes.
    ChecksumMismatch,
    /// The reading decoded to values outside the sensor's range.
    BadData,
}

impl<TIoError> Error<TIoError> {
    /// Whether retrying the whole transaction after a quiet period can be expected to help.
    ///
    /// Timeouts and HAL errors are not recoverable: the sensor stopped responding mid-transaction
    /// or the line itself is broken.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NoResponse | Error::InvalidResponse | Error::ChecksumMismatch | Error::BadData
        )
    }
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
            Error::NoResponse => write!(f, "no response from sensor"),
            Error::InvalidResponse => write!(f, "invalid response from sensor"),
            Error::Timeout => write!(f, "timed out waiting for the line to change"),
            Error::ChecksumMismatch => write!(f, "checksum mismatch"),
            Error::BadData => write!(f, "reading out of range"),
        }
    }
}

/// Which member of the DHT family is on the line.
///
/// The two sensors share the wire protocol but need different start pulses and read intervals,
/// and encode their readings differently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DhtFamily {
    Dht11,
    Dht22,
}

impl DhtFamily {
    /// How long the start pulse holds the line low.
    pub const fn start_hold_us(self) -> u32 {
        match self {
            DhtFamily::Dht11 => 18_000,
            DhtFamily::Dht22 => 1_200,
        }
    }

    /// The minimum time that must pass between two transactions.
    ///
    /// Note that this can vary a bit by device, so check your device's datasheet to be sure. Try
    /// doubling this value if you are encountering problems.
    pub const fn min_read_interval(self) -> Duration {
        match self {
            DhtFamily::Dht11 => Duration::from_millis(1000),
            DhtFamily::Dht22 => Duration::from_millis(2000),
        }
    }
}

/// Outcome of the response handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Response {
    /// The line stayed high through the settle window, so the handshake never started.
    Unset,
    /// Low after the settle window, then high after the response window.
    Valid,
    /// Low after the settle window, and still low after the response window.
    Invalid,
}

/// Options to modify the behavior of the DHT driver.
///
/// The defaults differ per family, see [`Options::defaults_for`].
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// Bound, in microseconds, for each loop that waits for the sensor to change the line level.
    ///
    /// `None` waits forever, which hangs the caller if the sensor stops responding
    /// mid-transaction.
    pub wait_timeout_us: Option<u32>,
    /// Whether [`Dht::read_reading`] checks the checksum byte.
    pub verify_checksum: bool,
    /// The maximum number of transactions for any call to [`Dht::read`].
    ///
    /// Keep in mind the `min_read_interval` when setting this option. For example, if the
    /// `min_read_interval` is set to 2 seconds, and this is set to 3 attempts, each read
    /// could take over 4 seconds.
    pub max_attempts: u8,
    /// The quiet period between two attempts. Cannot be below the sensor family's
    /// [`DhtFamily::min_read_interval`].
    pub min_read_interval: Duration,
}

pub const DEFAULT_DHT11_OPTIONS: Options = Options {
    wait_timeout_us: Some(DEFAULT_WAIT_TIMEOUT_US),
    verify_checksum: true,
    max_attempts: 1,
    min_read_interval: DhtFamily::Dht11.min_read_interval(),
};

pub const DEFAULT_DHT22_OPTIONS: Options = Options {
    wait_timeout_us: Some(DEFAULT_WAIT_TIMEOUT_US),
    verify_checksum: true,
    max_attempts: 1,
    min_read_interval: DhtFamily::Dht22.min_read_interval(),
};

impl Options {
    pub const fn defaults_for(family: DhtFamily) -> Options {
        match family {
            DhtFamily::Dht11 => DEFAULT_DHT11_OPTIONS,
            DhtFamily::Dht22 => DEFAULT_DHT22_OPTIONS,
        }
    }

    fn is_valid_for(&self, family: DhtFamily) -> bool {
        self.max_attempts >= 1
            && self.min_read_interval >= family.min_read_interval()
            && self.wait_timeout_us != Some(0)
    }
}

/// The five raw bytes of one transaction: humidity high/low, temperature high/low, checksum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DhtReading {
    bytes: [u8; READING_LEN],
}

impl DhtReading {
    pub fn from_bytes(bytes: [u8; READING_LEN]) -> DhtReading {
        DhtReading { bytes }
    }

    pub fn bytes(&self) -> [u8; READING_LEN] {
        self.bytes
    }

    pub fn checksum(&self) -> u8 {
        self.bytes[4]
    }

    /// The low-order byte of the sum of the four data bytes.
    pub fn expected_checksum(&self) -> u8 {
        let sum: u16 = self.bytes[..4].iter().map(|byte| *byte as u16).sum();
        sum.to_be_bytes()[1]
    }

    pub fn is_checksum_valid(&self) -> bool {
        self.checksum() == self.expected_checksum()
    }

    /// Decodes the reading for the given family, or `None` if the values are outside what that
    /// sensor can measure.
    pub fn decode(&self, family: DhtFamily) -> Option<Measurement> {
        let [humidity, humidity_low, temperature, temperature_low, _] = self.bytes;
        match family {
            DhtFamily::Dht11 => {
                // DHT11 sensors should only be able to read temperatures from 0-50 degrees Celsius.
                // Validate that + 50% for some wiggle-room in case some sensors can go beyond this.
                let is_valid = ((humidity < 100 && humidity_low < 10)
                    || (humidity == 100 && humidity_low == 0))
                    && ((temperature < 75 && temperature_low < 10)
                        || (temperature == 75 && temperature_low == 0));
                if !is_valid {
                    return None;
                }
                Some(Measurement {
                    humidity: humidity as f32 + humidity_low as f32 * 0.1,
                    temperature: temperature as f32 + temperature_low as f32 * 0.1,
                })
            }
            DhtFamily::Dht22 => {
                let humidity_x10 = u16::from_be_bytes([humidity, humidity_low]);
                let temperature_x10 = u16::from_be_bytes([temperature, temperature_low]);
                // DHT22 sensors should only be able to read temperatures from -40 - 125 degrees
                // Celsius. Validate that + some wiggle-room.
                let is_negative = temperature_x10 & 0x8000 != 0;
                let magnitude = temperature_x10 & 0x7FFF;
                let temperature_is_valid =
                    (is_negative && magnitude < 601) || (!is_negative && magnitude < 1501);
                if humidity_x10 > 1000 || !temperature_is_valid {
                    return None;
                }
                let temperature = magnitude as f32 * 0.1;
                Some(Measurement {
                    humidity: humidity_x10 as f32 * 0.1,
                    temperature: if is_negative { -temperature } else { temperature },
                })
            }
        }
    }
}

/// A decoded reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    /// Relative humidity in percent.
    pub humidity: f32,
    /// Temperature in degrees Celsius.
    pub temperature: f32,
}

/// Bit-banged driver for DHT11 and DHT22 sensors.
///
/// Each transaction runs `start` → `check_response` → five `read_byte`s. The primitives are
/// public so a caller can drive the handshake step by step; [`Dht::read_reading`] runs the whole
/// sequence.
///
/// The driver owns the line exclusively. Every operation leaves it floating.
#[derive(Debug)]
pub struct Dht<L, D> {
    line: L,
    delay: D,
    family: DhtFamily,
    options: Options,
}

impl<L, D> Dht<L, D>
where
    L: Line,
    D: DelayNs,
{
    /// Constructs a DHT driver on the given line.
    ///
    /// If `options` is `None`, the defaults for `family` are used (see [`DEFAULT_DHT11_OPTIONS`]
    /// and [`DEFAULT_DHT22_OPTIONS`]). Options with a read interval below the family minimum,
    /// zero attempts or a zero wait bound are rejected with [`Error::InvalidArgument`]. So is a
    /// line pulled down while floating, since the sensor needs the line to idle high.
    pub fn new(
        mut line: L,
        delay: D,
        family: DhtFamily,
        options: Option<Options>,
    ) -> Result<Dht<L, D>, Error<L::Error>> {
        let options = match options {
            None => Options::defaults_for(family),
            Some(options) => {
                if !options.is_valid_for(family) {
                    return Err(Error::InvalidArgument);
                }
                options
            }
        };
        if line.pull() == Pull::Down {
            return Err(Error::InvalidArgument);
        }
        line.set_input()?;
        Ok(Dht {
            line,
            delay,
            family,
            options,
        })
    }

    pub fn family(&self) -> DhtFamily {
        self.family
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Drives the start pulse, then releases the line to the sensor.
    pub fn start(&mut self) -> Result<(), Error<L::Error>> {
        let mut line = ReleaseOnDrop::new(&mut self.line);
        line.set_output()?;
        line.write(PinState::Low)?;
        self.delay.delay_us(self.family.start_hold_us());
        line.release()?;
        Ok(())
    }

    /// Samples the sensor's response to the start pulse.
    ///
    /// Waits until the line returns low before returning, so that the next step starts at the
    /// first data bit. If the handshake was not [`Response::Valid`], running out of that wait is
    /// not an error: a disconnected sensor leaves the line high for good.
    pub fn check_response(&mut self) -> Result<Response, Error<L::Error>> {
        let timeout = self.options.wait_timeout_us;
        self.delay.delay_us(RESPONSE_SETTLE_US);
        let mut response = Response::Unset;
        if self.line.is_low()? {
            self.delay.delay_us(RESPONSE_LOW_US);
            response = if self.line.is_high()? {
                Response::Valid
            } else {
                Response::Invalid
            };
        }
        match wait_for_level(&mut self.line, &mut self.delay, PinState::Low, timeout) {
            Ok(()) => {}
            Err(Error::Timeout) if response != Response::Valid => {
                log::debug!("dht line idle after {:?} response", response);
            }
            Err(err) => return Err(err),
        }
        Ok(response)
    }

    /// Reads one byte, most-significant bit first, discriminating bits by pulse width.
    pub fn read_byte(&mut self) -> Result<u8, Error<L::Error>> {
        let timeout = self.options.wait_timeout_us;
        let mut byte = 0u8;
        for i in 0..8 {
            wait_for_level(&mut self.line, &mut self.delay, PinState::High, timeout)?;
            self.delay.delay_us(BIT_SAMPLE_DELAY_US);
            if self.line.is_high()? {
                byte |= 1 << (7 - i);
            }
            wait_for_level(&mut self.line, &mut self.delay, PinState::Low, timeout)?;
        }
        Ok(byte)
    }

    /// Runs one full transaction and assembles the five bytes.
    ///
    /// Checks the checksum if [`Options::verify_checksum`] is set.
    pub fn read_reading(&mut self) -> Result<DhtReading, Error<L::Error>> {
        self.start()?;
        match self.check_response()? {
            Response::Valid => {}
            Response::Unset => return Err(Error::NoResponse),
            Response::Invalid => return Err(Error::InvalidResponse),
        }

        let mut bytes = [0u8; READING_LEN];
        for byte in bytes.iter_mut() {
            *byte = self.read_byte()?;
        }
        let reading = DhtReading::from_bytes(bytes);
        log::debug!("dht reading: {:02x?}", bytes);

        if self.options.verify_checksum && !reading.is_checksum_valid() {
            return Err(Error::ChecksumMismatch);
        }
        Ok(reading)
    }

    /// Runs one transaction and decodes it.
    pub fn read_measurement(&mut self) -> Result<Measurement, Error<L::Error>> {
        self.read_reading()?
            .decode(self.family)
            .ok_or(Error::BadData)
    }

    /// Reads a measurement, retrying recoverable failures.
    ///
    /// Up to [`Options::max_attempts`] transactions are run. Between two attempts this
    /// asynchronously sleeps for the minimum read interval using the provided `delay_fn`. The
    /// provided function needs to be capable of millisecond precision or better.
    ///
    /// Due to the tight timing necessary to distinguish bits in the DHT's response, each
    /// transaction itself is blocking. It takes about 4ms plus the start pulse.
    pub async fn read<DelayFn, EmptyFuture>(
        &mut self,
        delay_fn: DelayFn,
    ) -> Result<Measurement, Error<L::Error>>
    where
        DelayFn: Fn(Duration) -> EmptyFuture,
        EmptyFuture: core::future::Future<Output = ()>,
    {
        let mut last_error = Error::NoResponse;
        for attempt in 0..self.options.max_attempts {
            if attempt > 0 {
                delay_fn(self.options.min_read_interval).await;
            }
            match self.read_measurement() {
                Ok(measurement) => return Ok(measurement),
                Err(err) if err.is_recoverable() => {
                    log::warn!("dht attempt {} failed: {:?}", attempt + 1, err);
                    last_error = err;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_error)
    }

    /// Returns the line and delay.
    pub fn release(self) -> (L, D) {
        (self.line, self.delay)
    }
}

/// Polls the line until it reaches `level`.
///
/// With no bound this waits forever, like the sensor's datasheet assumes.
fn wait_for_level<L, D>(
    line: &mut L,
    delay: &mut D,
    level: PinState,
    timeout_us: Option<u32>,
) -> Result<(), Error<L::Error>>
where
    L: Line,
    D: DelayNs,
{
    let mut waited_us = 0u32;
    while line.read()? != level {
        if let Some(limit) = timeout_us {
            if waited_us >= limit {
                log::warn!("timed out after {}us waiting for {:?}", waited_us, level);
                return Err(Error::Timeout);
            }
        }
        delay.delay_us(POLL_STEP_US);
        waited_us = waited_us.saturating_add(POLL_STEP_US);
    }
    Ok(())
}
