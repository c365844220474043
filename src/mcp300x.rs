use core::fmt;
use embedded_hal::spi::SpiDevice;

use crate::adc::AdcChannel;

/// The maximum SPI clock speed when V<sub>DD</sub> is 5V.
pub const MAX_CLOCK_AT_5V: u32 = 3_600_000;
/// The maximum SPI clock speed when V<sub>DD</sub> is 2.7V.
pub const MAX_CLOCK_AT_2_7V: u32 = 1_350_000;

/// The number of addressable channels on an MCP3004.
pub const NUM_CHANNELS_MCP3004: u8 = 4;
/// The number of addressable channels on an MCP3008.
pub const NUM_CHANNELS_MCP3008: u8 = 8;
/// Bits in one conversion result.
pub const RESOLUTION_BITS: u8 = 10;

#[derive(Debug, PartialEq)]
pub enum Error<TIoError> {
    /// Wrapped error from the SPI driver.
    Wrapped(TIoError),
    /// Invalid argument was provided.
    InvalidArgument,
    /// Bad data was read. Check the connection and try again.
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
            Error::Wrapped(err) => write!(f, "SPI error: {:?}", err),
            Error::InvalidArgument => write!(f, "invalid argument"),
            Error::BadData => write!(f, "missing null bit in response"),
        }
    }
}

/// Which channels to read the voltage difference between.
#[derive(Clone, Copy, Debug)]
pub enum DifferentialMode {
    /// Reads V<sub>channel 0</sub> - V<sub>channel 1</sub>.
    ZeroMinusOne,
    /// Reads V<sub>channel 1</sub> - V<sub>channel 0</sub>.
    OneMinusZero,
    /// Reads V<sub>channel 2</sub> - V<sub>channel 3</sub>.
    TwoMinusThree,
    /// Reads V<sub>channel 3</sub> - V<sub>channel 2</sub>.
    ThreeMinusTwo,
    /// Reads V<sub>channel 4</sub> - V<sub>channel 5</sub>. MCP3008 only.
    FourMinusFive,
    /// Reads V<sub>channel 5</sub> - V<sub>channel 4</sub>. MCP3008 only.
    FiveMinusFour,
    /// Reads V<sub>channel 6</sub> - V<sub>channel 7</sub>. MCP3008 only.
    SixMinusSeven,
    /// Reads V<sub>channel 7</sub> - V<sub>channel 6</sub>. MCP3008 only.
    SevenMinusSix,
}

const MAX_DIFFERENTIAL_MODE_MCP3004: DifferentialMode = DifferentialMode::ThreeMinusTwo;

/// The type of read to make from the Mcp300x device.
#[derive(Clone, Copy, Debug)]
pub enum Request {
    /// Read the voltage of the given channel as compared to the voltage between analogue ground
    /// (V<sub>analog ground</sub>) and the reference voltage (V<sub>ref</sub>).
    ///
    /// Output = 1024 * (V<sub>channel</sub> - V<sub>analog ground</sub>) /
    /// (V<sub>ref</sub> - V<sub>analog ground</sub>)
    ///
    /// The given channel must be in the inclusive range \[0,3\] for an MCP3004 or \[0,7\] for an
    /// MCP3008.
    SingleEnded(u8),
    /// Read the voltage of each differential input pair as compared to the voltage between analogue
    /// ground (V<sub>analog ground</sub>) and the reference voltage (V<sub>ref</sub>).
    ///
    /// For example, if reading the CH0 input as IN+ and CH1 input as IN-, the
    /// measured voltage is:
    ///
    /// Output = 1024 * (V<sub>channel a</sub> - V<sub>channel b</sub>) /
    /// (V<sub>ref</sub> - V<sub>analog ground</sub>)
    Differential(DifferentialMode),
}

impl Request {
    /// Converts the request to the appropriate bit sequence for the sensor. See page 19 of
    /// https://cdn-shop.adafruit.com/datasheets/MCP3008.pdf.
    ///
    /// This does *not* include the start-bit that must always be prepended to the request.
    ///
    /// The resulting byte looks like: 0b0000abcd, where:
    ///   a: single-ended (1) or differential read (0)
    ///   bcd: channel select bits, from most-significant to least-significant
    fn to_bits(&self) -> u8 {
        match self {
            Request::SingleEnded(channel) => {
                return 0b1000 | channel;
            }
            Request::Differential(mode) => {
                return *mode as u8;
            }
        }
    }
}

/// Which member of the MCP300x family is on the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    /// Four single-ended channels, or two differential pairs.
    Mcp3004,
    /// Eight single-ended channels, or four differential pairs.
    Mcp3008,
}

impl Variant {
    fn supports(self, request: Request) -> bool {
        match (self, request) {
            (Variant::Mcp3004, Request::SingleEnded(channel)) => channel < NUM_CHANNELS_MCP3004,
            (Variant::Mcp3004, Request::Differential(mode)) => {
                (mode as u8) <= (MAX_DIFFERENTIAL_MODE_MCP3004 as u8)
            }
            (Variant::Mcp3008, Request::SingleEnded(channel)) => channel < NUM_CHANNELS_MCP3008,
            (Variant::Mcp3008, Request::Differential(_)) => true,
        }
    }
}

/// Reads the requested data from the device.
///
/// It's important that the given SPI device is configured correctly to work with the
/// converter. This means:
///
/// * Use 8 bits per word.
/// * Depending on V<sub>DD</sub>, the maximum possible clock speed is:
///   * *2.7V*: 1.35MHz ([`MAX_CLOCK_AT_2_7V`])
///   * *5V*: 3.6MHz ([`MAX_CLOCK_AT_5V`])
/// * Data is sent most-significant-bit first
/// * SPI mode: 0 (i.e. idle low, capture on first transition)
///
/// Chip select is handled by the [`SpiDevice`].
///
/// This returns [`Error::InvalidArgument`] if the request is not possible for this device
/// type. See [`Request`] for more details.
///
/// A valid response is in the range \[0, 1023\]. What this means depends on the request:
///
/// * `SingleEnded`: 1024 * (V<sub>channel</sub> - V<sub>analog ground</sub>) /
///   (V<sub>ref</sub> - V<sub>analog ground</sub>)
/// * `Differential`: 1024 * (V<sub>channel a</sub> - V<sub>channel b</sub>) /
///   (V<sub>ref</sub> - V<sub>analog ground</sub>)
pub fn read<TSpi>(
    variant: Variant,
    request: Request,
    spi: &mut TSpi,
) -> Result<u16, Error<TSpi::Error>>
where
    TSpi: SpiDevice<u8>,
{
    if !variant.supports(request) {
        return Err(Error::InvalidArgument);
    }

    // Send the request aligned such that it is easy to read data using 8-bit words. See page 21 of
    // https://cdn-shop.adafruit.com/datasheets/MCP3008.pdf.
    //
    // The request sequence looks like:
    //   1 - start bit
    //   1/0 - single-ended/differential read
    //   X X X - channel select bits
    let mut buf: [u8; 3] = [0x1, request.to_bits() << 4, 0x0];
    spi.transfer_in_place(&mut buf)?;

    if (buf[1] & 0b100) != 0 {
        // MCP300x sensors should send a null-bit right before the data. If this is missing, then
        // this read can't be trusted.
        return Err(Error::BadData);
    }

    Ok((((buf[1] & 0b11) as u16) << 8) | buf[2] as u16)
}

/// One fixed request on an MCP300x, used as an [`AdcChannel`].
///
/// The SPI exchange completes within [`AdcChannel::start`], so [`AdcChannel::poll`] never
/// blocks.
#[derive(Debug)]
pub struct Mcp300xChannel<TSpi> {
    spi: TSpi,
    variant: Variant,
    request: Request,
    result: Option<u16>,
}

impl<TSpi> Mcp300xChannel<TSpi>
where
    TSpi: SpiDevice<u8>,
{
    pub fn new(
        spi: TSpi,
        variant: Variant,
        request: Request,
    ) -> Result<Mcp300xChannel<TSpi>, Error<TSpi::Error>> {
        if !variant.supports(request) {
            return Err(Error::InvalidArgument);
        }
        Ok(Mcp300xChannel {
            spi,
            variant,
            request,
            result: None,
        })
    }

    /// Returns the SPI device.
    pub fn free(self) -> TSpi {
        self.spi
    }
}

impl<TSpi> AdcChannel for Mcp300xChannel<TSpi>
where
    TSpi: SpiDevice<u8>,
{
    type Error = Error<TSpi::Error>;

    fn start(&mut self) -> Result<(), Self::Error> {
        self.result = Some(read(self.variant, self.request, &mut self.spi)?);
        Ok(())
    }

    fn poll(&mut self) -> nb::Result<u16, Self::Error> {
        // Polling without a started conversion would otherwise block forever.
        self.result
            .take()
            .ok_or(nb::Error::Other(Error::InvalidArgument))
    }

    fn resolution_bits(&self) -> u8 {
        RESOLUTION_BITS
    }
}
