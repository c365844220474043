use core::fmt::{self, Write};
use core::str::FromStr;

/// Separates the topic from the value in a message.
pub const SEPARATOR: char = '*';
/// Terminates every outgoing message.
pub const TERMINATOR: &str = "\r\n";
/// Most characters of an incoming payload that are considered.
pub const MAX_PAYLOAD_LEN: usize = 3;
/// Capacity of a formatted outgoing message.
pub const MAX_MESSAGE_LEN: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageError {
    /// The message has no `*` between topic and value.
    MissingSeparator,
    /// The topic is not one of the known topics.
    UnknownTopic,
    /// The payload is not a number.
    InvalidPayload,
    /// The formatted message does not fit in [`MAX_MESSAGE_LEN`] bytes.
    Overflow,
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageError::MissingSeparator => write!(f, "missing '{}' separator", SEPARATOR),
            MessageError::UnknownTopic => write!(f, "unknown topic"),
            MessageError::InvalidPayload => write!(f, "payload is not a number"),
            MessageError::Overflow => write!(f, "message exceeds {} bytes", MAX_MESSAGE_LEN),
        }
    }
}

/// Readings published by the acquisition node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorTopic {
    WaterTemperature,
    AmbientTemperature,
    AmbientHumidity,
    WaterPh,
    WaterTds,
    WaterEc,
}

impl SensorTopic {
    pub const ALL: [SensorTopic; 6] = [
        SensorTopic::WaterTemperature,
        SensorTopic::AmbientTemperature,
        SensorTopic::AmbientHumidity,
        SensorTopic::WaterPh,
        SensorTopic::WaterTds,
        SensorTopic::WaterEc,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            SensorTopic::WaterTemperature => "rack0/sens/water/temperature",
            SensorTopic::AmbientTemperature => "rack0/sens/ambient/temperature",
            SensorTopic::AmbientHumidity => "rack0/sens/ambient/humidity",
            SensorTopic::WaterPh => "rack0/sens/water/ph",
            SensorTopic::WaterTds => "rack0/sens/water/tds",
            SensorTopic::WaterEc => "rack0/sens/water/ec",
        }
    }
}

/// Commands consumed by the actuator node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActuatorTopic {
    Watering,
    DosePump0,
    DosePump1,
    DosePump2,
    LightControl,
    FanControl0,
    FanControl1,
    Humidifier,
}

impl ActuatorTopic {
    pub const ALL: [ActuatorTopic; 8] = [
        ActuatorTopic::Watering,
        ActuatorTopic::DosePump0,
        ActuatorTopic::DosePump1,
        ActuatorTopic::DosePump2,
        ActuatorTopic::LightControl,
        ActuatorTopic::FanControl0,
        ActuatorTopic::FanControl1,
        ActuatorTopic::Humidifier,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ActuatorTopic::Watering => "rack0/actu/watering0",
            ActuatorTopic::DosePump0 => "rack0/actu/dose_pump0",
            ActuatorTopic::DosePump1 => "rack0/actu/dose_pump1",
            ActuatorTopic::DosePump2 => "rack0/actu/dose_pump2",
            ActuatorTopic::LightControl => "rack0/actu/light/control",
            ActuatorTopic::FanControl0 => "rack0/actu/fan/control0",
            ActuatorTopic::FanControl1 => "rack0/actu/fan/control1",
            ActuatorTopic::Humidifier => "rack0/actu/humidifier",
        }
    }
}

/// Any topic known to the rack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topic {
    Sensor(SensorTopic),
    Actuator(ActuatorTopic),
}

impl Topic {
    pub const fn as_str(self) -> &'static str {
        match self {
            Topic::Sensor(topic) => topic.as_str(),
            Topic::Actuator(topic) => topic.as_str(),
        }
    }
}

impl From<SensorTopic> for Topic {
    fn from(topic: SensorTopic) -> Topic {
        Topic::Sensor(topic)
    }
}

impl From<ActuatorTopic> for Topic {
    fn from(topic: ActuatorTopic) -> Topic {
        Topic::Actuator(topic)
    }
}

impl FromStr for SensorTopic {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<SensorTopic, MessageError> {
        SensorTopic::ALL
            .iter()
            .copied()
            .find(|topic| topic.as_str() == s)
            .ok_or(MessageError::UnknownTopic)
    }
}

impl FromStr for ActuatorTopic {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<ActuatorTopic, MessageError> {
        ActuatorTopic::ALL
            .iter()
            .copied()
            .find(|topic| topic.as_str() == s)
            .ok_or(MessageError::UnknownTopic)
    }
}

impl FromStr for Topic {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Topic, MessageError> {
        s.parse::<SensorTopic>()
            .map(Topic::Sensor)
            .or_else(|_| s.parse::<ActuatorTopic>().map(Topic::Actuator))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats `<topic>*<value>\r\n` with the value rounded to two decimals.
pub fn format_message(
    topic: impl Into<Topic>,
    value: f32,
) -> Result<heapless::String<MAX_MESSAGE_LEN>, MessageError> {
    let topic: Topic = topic.into();
    let mut message = heapless::String::new();
    write!(message, "{}{}{:.2}{}", topic, SEPARATOR, value, TERMINATOR)
        .map_err(|_| MessageError::Overflow)?;
    Ok(message)
}

/// Splits an incoming `<topic>*<value>` message.
///
/// Only the first [`MAX_PAYLOAD_LEN`] characters after the separator are read, so `"12.5"` reads
/// as `12.0`. Trailing whitespace inside that window is ignored.
pub fn parse_message(message: &str) -> Result<(Topic, f32), MessageError> {
    let (topic, payload) = message
        .split_once(SEPARATOR)
        .ok_or(MessageError::MissingSeparator)?;
    let topic = topic.parse::<Topic>()?;

    let end = payload
        .char_indices()
        .nth(MAX_PAYLOAD_LEN)
        .map_or(payload.len(), |(i, _)| i);
    let value = payload[..end]
        .trim_end()
        .parse::<f32>()
        .map_err(|_| MessageError::InvalidPayload)?;
    Ok((topic, value))
}
