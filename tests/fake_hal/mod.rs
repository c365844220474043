#![allow(dead_code)]

pub mod adc;
mod concurrent;
pub mod delay;
pub mod digital;
pub mod spi;
