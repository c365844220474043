/// A single analog-to-digital conversion channel.
///
/// Conversions follow the start/poll/read sequence of on-chip converters: [`AdcChannel::start`]
/// triggers one conversion and [`AdcChannel::poll`] returns [`nb::Error::WouldBlock`] until the
/// result is ready.
pub trait AdcChannel {
    type Error;

    /// Starts one conversion.
    fn start(&mut self) -> Result<(), Self::Error>;

    /// Returns the result of the last started conversion once it is ready.
    ///
    /// A valid result is in the range \[0, 2<sup>resolution</sup>).
    fn poll(&mut self) -> nb::Result<u16, Self::Error>;

    /// Number of bits in one conversion result.
    fn resolution_bits(&self) -> u8;

    /// Starts a conversion and waits, without bound, for its result.
    fn read_blocking(&mut self) -> Result<u16, Self::Error> {
        self.start()?;
        nb::block!(self.poll())
    }
}

/// Scales a raw conversion result to volts: `raw × V_ref / 2^resolution`.
pub fn raw_to_volts(raw: u16, reference_voltage: f32, resolution_bits: u8) -> f32 {
    raw as f32 * reference_voltage / (1u32 << resolution_bits) as f32
}
