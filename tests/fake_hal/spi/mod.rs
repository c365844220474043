use embedded_hal::spi::{ErrorKind, ErrorType, Operation, SpiDevice};
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpiError();

impl embedded_hal::spi::Error for SpiError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// The scripted outcome of one in-place transfer.
pub enum FakeTransfer {
    Success(Vec<u8>),
    Error(),
}

/// An SPI device that answers in-place transfers from a script and records what was sent.
pub struct SPI {
    transfers: VecDeque<FakeTransfer>,
    written_data: Vec<Vec<u8>>,
}

impl SPI {
    pub fn new(transfers: Vec<FakeTransfer>) -> SPI {
        SPI {
            transfers: transfers.into(),
            written_data: Vec::new(),
        }
    }

    pub fn get_written_data(&self) -> &[Vec<u8>] {
        self.written_data.as_slice()
    }
}

impl ErrorType for SPI {
    type Error = SpiError;
}

impl SpiDevice<u8> for SPI {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), SpiError> {
        for operation in operations.iter_mut() {
            match operation {
                Operation::TransferInPlace(words) => {
                    self.written_data.push(words.to_vec());
                    match self.transfers.pop_front() {
                        Some(FakeTransfer::Success(data)) => {
                            if data.len() != words.len() {
                                panic!("Scripted transfer must match the request length.");
                            }
                            words.copy_from_slice(&data);
                        }
                        _ => return Err(SpiError()),
                    }
                }
                Operation::Write(words) => self.written_data.push(words.to_vec()),
                Operation::DelayNs(_) => {}
                _ => return Err(SpiError()),
            }
        }
        Ok(())
    }
}
