use core::fmt;
use embedded_hal::delay::DelayNs;

use crate::adc::{raw_to_volts, AdcChannel};

/// Reference pH of calibration buffer A.
pub const BUFFER_A_PH: f32 = 4.01;
/// Reference pH of calibration buffer B.
pub const BUFFER_B_PH: f32 = 6.86;
/// Reference pH of calibration buffer C.
pub const BUFFER_C_PH: f32 = 9.18;

/// Number of conversions filtered into one reading.
pub const SAMPLES: usize = 20;

pub const DEFAULT_REFERENCE_VOLTAGE: f32 = 3.3;
pub const DEFAULT_SETTLE_DELAY_MS: u32 = 50;

/// The calibration points cannot define a line: two of them share a voltage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DegenerateCalibration;

impl fmt::Display for DegenerateCalibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "calibration voltages must be distinct")
    }
}

#[derive(Debug, PartialEq)]
pub enum Error<TAdcError> {
    /// Wrapped error from the converter.
    Wrapped(TAdcError),
    /// Invalid argument was provided.
    InvalidArgument,
    /// See [`DegenerateCalibration`].
    DegenerateCalibration,
}

impl<TAdcError> From<DegenerateCalibration> for Error<TAdcError> {
    fn from(_: DegenerateCalibration) -> Error<TAdcError> {
        Error::DegenerateCalibration
    }
}

impl<TAdcError> fmt::Display for Error<TAdcError>
where
    TAdcError: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Wrapped(err) => write!(f, "ADC error: {:?}", err),
            Error::InvalidArgument => write!(f, "invalid argument"),
            Error::DegenerateCalibration => fmt::Display::fmt(&DegenerateCalibration, f),
        }
    }
}

/// Linear map from sensor voltage to pH.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationModel {
    slope: f32,
    intercept: f32,
}

impl CalibrationModel {
    /// Least-squares fit over exactly three `(voltage, pH)` points.
    ///
    /// Fails if any two points share a voltage, since distinct buffers must read differently.
    pub fn fit(points: [(f32, f32); 3]) -> Result<CalibrationModel, DegenerateCalibration> {
        let [(x1, _), (x2, _), (x3, _)] = points;
        if x1 == x2 || x2 == x3 || x1 == x3 {
            return Err(DegenerateCalibration);
        }

        let n = points.len() as f32;
        let mut sum_x = 0f32;
        let mut sum_y = 0f32;
        let mut sum_x2 = 0f32;
        let mut sum_xy = 0f32;
        for &(x, y) in points.iter() {
            sum_x += x;
            sum_y += y;
            sum_x2 += x * x;
            sum_xy += x * y;
        }

        let denominator = n * sum_x2 - sum_x * sum_x;
        if denominator == 0.0 {
            return Err(DegenerateCalibration);
        }
        let slope = (n * sum_xy - sum_x * sum_y) / denominator;
        let intercept = (sum_y - slope * sum_x) / n;
        if !slope.is_finite() || !intercept.is_finite() {
            return Err(DegenerateCalibration);
        }
        Ok(CalibrationModel { slope, intercept })
    }

    /// Fits the model to the voltages read in the three reference buffers
    /// ([`BUFFER_A_PH`], [`BUFFER_B_PH`], [`BUFFER_C_PH`]).
    pub fn from_buffer_voltages(
        volts_a: f32,
        volts_b: f32,
        volts_c: f32,
    ) -> Result<CalibrationModel, DegenerateCalibration> {
        CalibrationModel::fit([
            (volts_a, BUFFER_A_PH),
            (volts_b, BUFFER_B_PH),
            (volts_c, BUFFER_C_PH),
        ])
    }

    pub fn slope(&self) -> f32 {
        self.slope
    }

    pub fn intercept(&self) -> f32 {
        self.intercept
    }

    pub fn evaluate(&self, volts: f32) -> f32 {
        volts * self.slope + self.intercept
    }
}

/// Sorts the samples ascending and averages the two in the middle, discarding the extremes.
pub fn median_of_middle_two(samples: &mut [f32; SAMPLES]) -> f32 {
    samples.sort_unstable_by(|a, b| a.total_cmp(b));
    (samples[SAMPLES / 2 - 1] + samples[SAMPLES / 2]) / 2.0
}

/// Options to modify the behavior of the pH pipeline.
#[derive(Clone, Copy, Debug)]
pub struct PhOptions {
    /// Full-scale reference voltage of the converter.
    pub reference_voltage: f32,
    /// Delay after each conversion.
    pub settle_delay_ms: u32,
}

pub const DEFAULT_PH_OPTIONS: PhOptions = PhOptions {
    reference_voltage: DEFAULT_REFERENCE_VOLTAGE,
    settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
};

/// An analog pH probe read through an [`AdcChannel`].
#[derive(Debug)]
pub struct PhSensor<A, D> {
    adc: A,
    delay: D,
    model: CalibrationModel,
    options: PhOptions,
}

impl<A, D> PhSensor<A, D>
where
    A: AdcChannel,
    D: DelayNs,
{
    /// Fits the calibration model to the voltages read in the three reference buffers.
    ///
    /// If `options` is `None`, [`DEFAULT_PH_OPTIONS`] is used.
    pub fn initialize(
        adc: A,
        delay: D,
        volts_a: f32,
        volts_b: f32,
        volts_c: f32,
        options: Option<PhOptions>,
    ) -> Result<PhSensor<A, D>, Error<A::Error>> {
        let model = CalibrationModel::from_buffer_voltages(volts_a, volts_b, volts_c)?;
        PhSensor::with_model(adc, delay, model, options)
    }

    /// Uses an already fitted model.
    pub fn with_model(
        adc: A,
        delay: D,
        model: CalibrationModel,
        options: Option<PhOptions>,
    ) -> Result<PhSensor<A, D>, Error<A::Error>> {
        let options = options.unwrap_or(DEFAULT_PH_OPTIONS);
        if !(options.reference_voltage > 0.0 && options.reference_voltage.is_finite()) {
            return Err(Error::InvalidArgument);
        }
        log::debug!(
            "ph model: slope {} intercept {}",
            model.slope(),
            model.intercept()
        );
        Ok(PhSensor {
            adc,
            delay,
            model,
            options,
        })
    }

    pub fn model(&self) -> &CalibrationModel {
        &self.model
    }

    /// Replaces the model with one fitted to new buffer voltages.
    ///
    /// The previous model is kept if the new points are degenerate.
    pub fn calibrate(
        &mut self,
        volts_a: f32,
        volts_b: f32,
        volts_c: f32,
    ) -> Result<(), DegenerateCalibration> {
        self.model = CalibrationModel::from_buffer_voltages(volts_a, volts_b, volts_c)?;
        Ok(())
    }

    /// Takes [`SAMPLES`] conversions and returns the filtered probe voltage.
    pub fn read_voltage(&mut self) -> Result<f32, Error<A::Error>> {
        let resolution_bits = self.adc.resolution_bits();
        let mut samples = [0f32; SAMPLES];
        for sample in samples.iter_mut() {
            let raw = self.adc.read_blocking().map_err(Error::Wrapped)?;
            *sample = raw_to_volts(raw, self.options.reference_voltage, resolution_bits);
            self.delay.delay_ms(self.options.settle_delay_ms);
        }
        Ok(median_of_middle_two(&mut samples))
    }

    /// Reads the calibrated pH.
    pub fn acquire(&mut self) -> Result<f32, Error<A::Error>> {
        let volts = self.read_voltage()?;
        let ph = self.model.evaluate(volts);
        log::debug!("ph: {} ({} V)", ph, volts);
        Ok(ph)
    }

    /// Returns the converter and delay.
    pub fn release(self) -> (A, D) {
        (self.adc, self.delay)
    }
}
