#![cfg_attr(not(test), no_std)]

/// Analog-to-digital conversion channels.
pub mod adc;
/// Universal drivers for reading from DHT11 or DHT22 sensors.
pub mod dhtxx;
/// Driver for DS18B20 temperature sensors on a dedicated single-wire bus.
///
/// Only one device per bus is supported. Every transaction addresses it with the skip-ROM command.
pub mod ds18b20;
/// Bidirectional GPIO lines for bit-banged single-wire protocols.
pub mod line;
/// Universal utilities for reading data from MCP300x series analog-to-digital converters.
///
/// Refer to [this datasheet](https://cdn-shop.adafruit.com/datasheets/MCP3008.pdf) for more
/// information about these devices.
pub mod mcp300x;
/// Calibrated pH readings from an analog probe.
pub mod ph;
/// Topic names and the `<topic>*<value>` wire format shared with the rest of the rack.
pub mod topic;
