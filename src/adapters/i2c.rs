//! Linux i2c-dev bus transport
//!
//! A block command is one combined transfer: a one-byte write of the command
//! code followed by a read of the response length, addressed to the drive's
//! management endpoint. The device node is closed when the handle is dropped.

#[cfg(not(target_os = "linux"))]
use crate::domain::{BusHandle, BusTransport};
#[cfg(not(target_os = "linux"))]
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct I2cDevTransport {
    prefix: String,
    address: u16,
}

impl I2cDevTransport {
    pub fn new(prefix: impl Into<String>, address: u8) -> Self {
        Self {
            prefix: prefix.into(),
            address: u16::from(address),
        }
    }

    pub fn device_path(&self, bus: u8) -> String {
        format!("{}{}", self.prefix, bus)
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use i2cdev::core::{I2CMessage, I2CTransfer};
    use i2cdev::linux::{LinuxI2CBus, LinuxI2CMessage};

    use super::I2cDevTransport;
    use crate::domain::{BusHandle, BusTransport};
    use crate::error::{Error, Result};

    impl BusTransport for I2cDevTransport {
        fn open(&self, bus: u8) -> Result<Box<dyn BusHandle>> {
            let path = self.device_path(bus);
            let device = LinuxI2CBus::new(&path).map_err(|e| Error::Bus {
                bus,
                reason: format!("{}: {}", path, e),
            })?;

            Ok(Box::new(I2cDevHandle {
                device,
                bus,
                address: self.address,
            }))
        }
    }

    struct I2cDevHandle {
        device: LinuxI2CBus,
        bus: u8,
        address: u16,
    }

    impl BusHandle for I2cDevHandle {
        fn block_command(&mut self, command: u8, response: &mut [u8]) -> Result<()> {
            if response.len() > usize::from(u16::MAX) {
                return Err(Error::BusCommand {
                    bus: self.bus,
                    command,
                    reason: format!("response length {} too large", response.len()),
                });
            }

            let request = [command];
            let mut messages = [
                LinuxI2CMessage::write(&request).with_address(self.address),
                LinuxI2CMessage::read(response).with_address(self.address),
            ];
            self.device
                .transfer(&mut messages)
                .map(|_| ())
                .map_err(|e| Error::BusCommand {
                    bus: self.bus,
                    command,
                    reason: e.to_string(),
                })
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl BusTransport for I2cDevTransport {
    fn open(&self, bus: u8) -> Result<Box<dyn BusHandle>> {
        Err(Error::Bus {
            bus,
            reason: format!("{}: i2c-dev requires Linux", self.device_path(bus)),
        })
    }
}
