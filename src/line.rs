use core::ops::{Deref, DerefMut};
use embedded_hal::digital::{ErrorType, InputPin, OutputPin, PinState};

/// Whether the line is currently driven by the controller or left floating for the peripheral.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Push-pull output. The controller owns the line level.
    Driven,
    /// High-impedance input. The pull resistor or the peripheral owns the line level.
    Floating,
}

/// The bias applied to the line while it is floating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pull {
    /// No internal bias. An external pull-up is expected on single-wire buses.
    None,
    Up,
    Down,
}

/// A single GPIO line that can be switched between driving and floating at runtime.
///
/// Single-wire protocols hand the same line back and forth between the controller and the
/// peripheral many times within one transaction. Every direction change re-programs the pin's
/// hardware mode, which costs a small amount of time; the protocol timings in this crate already
/// include that cost.
///
/// [`Line::write`] is only meaningful while the line is driven and [`Line::read`] while it is
/// floating. This is not checked.
pub trait Line: InputPin + OutputPin {
    /// Configures the line as a low-speed push-pull output.
    fn set_output(&mut self) -> Result<(), Self::Error>;

    /// Configures the line as a floating input.
    fn set_input(&mut self) -> Result<(), Self::Error>;

    /// Drives the line to the given level.
    fn write(&mut self, level: PinState) -> Result<(), Self::Error> {
        self.set_state(level)
    }

    /// Samples the current line level.
    fn read(&mut self) -> Result<PinState, Self::Error> {
        Ok(PinState::from(self.is_high()?))
    }

    /// The bias applied while the line floats.
    ///
    /// Engines reject [`Pull::Down`], which keeps a single-wire bus from idling high.
    fn pull(&self) -> Pull {
        Pull::None
    }
}

/// Adapts an open-drain pin into a [`Line`].
///
/// Many HALs hand out open-drain pins that implement both [`InputPin`] and [`OutputPin`]. On such
/// a pin "floating" simply means releasing the line high and letting the pull-up (or the
/// peripheral) decide its level, so no hardware mode switch is needed.
#[derive(Debug)]
pub struct OpenDrainLine<P> {
    pin: P,
    pull: Pull,
    direction: Direction,
}

impl<P> OpenDrainLine<P>
where
    P: InputPin + OutputPin,
{
    /// Wraps the pin and releases it, so the line starts out floating.
    pub fn new(mut pin: P, pull: Pull) -> Result<OpenDrainLine<P>, P::Error> {
        pin.set_high()?;
        Ok(OpenDrainLine {
            pin,
            pull,
            direction: Direction::Floating,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the wrapped pin.
    pub fn free(self) -> P {
        self.pin
    }
}

impl<P: ErrorType> ErrorType for OpenDrainLine<P> {
    type Error = P::Error;
}

impl<P> InputPin for OpenDrainLine<P>
where
    P: InputPin + OutputPin,
{
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.pin.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.pin.is_low()
    }
}

impl<P> OutputPin for OpenDrainLine<P>
where
    P: InputPin + OutputPin,
{
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.pin.set_low()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.pin.set_high()
    }
}

impl<P> Line for OpenDrainLine<P>
where
    P: InputPin + OutputPin,
{
    fn set_output(&mut self) -> Result<(), Self::Error> {
        self.direction = Direction::Driven;
        Ok(())
    }

    fn set_input(&mut self) -> Result<(), Self::Error> {
        self.pin.set_high()?;
        self.direction = Direction::Floating;
        Ok(())
    }

    fn pull(&self) -> Pull {
        self.pull
    }
}

/// Holds a line for the duration of one protocol step and floats it again when dropped.
///
/// Engines wrap the line in this guard at the start of every operation so that the line is back
/// in input mode on every exit path, including early returns on HAL errors and timeouts.
pub(crate) struct ReleaseOnDrop<'a, L: Line> {
    line: &'a mut L,
    armed: bool,
}

impl<'a, L: Line> ReleaseOnDrop<'a, L> {
    pub(crate) fn new(line: &'a mut L) -> ReleaseOnDrop<'a, L> {
        ReleaseOnDrop { line, armed: true }
    }

    /// Floats the line now, at a protocol-defined instant, instead of when the guard drops.
    pub(crate) fn release(mut self) -> Result<(), L::Error> {
        self.armed = false;
        self.line.set_input()
    }
}

impl<'a, L: Line> Deref for ReleaseOnDrop<'a, L> {
    type Target = L;

    fn deref(&self) -> &L {
        self.line
    }
}

impl<'a, L: Line> DerefMut for ReleaseOnDrop<'a, L> {
    fn deref_mut(&mut self) -> &mut L {
        self.line
    }
}

impl<'a, L: Line> Drop for ReleaseOnDrop<'a, L> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = self.line.set_input() {
            log::warn!("failed to release line: {:?}", err);
        }
    }
}
