use crate::registers::{Address, RegisterType};
use std::{future::Future, io, net::SocketAddr, time::Duration};
use thiserror::Error;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("register {0} is outside the Modbus address space")]
    AddressOutOfRange(u32),

    #[error("unable to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("modbus request failed: {0}")]
    Io(#[from] io::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// Reads and writes raw 16-bit registers of one device.
pub trait RegisterTransport: Send {
    fn read(
        &mut self,
        register_type: RegisterType,
        start: Address,
        count: u32,
    ) -> impl Future<Output = Result<Vec<u16>, TransportError>> + Send;

    fn write(&mut self, address: Address, value: u16) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Forgets the connection after a request was abandoned, so a late reply cannot be taken for
    /// the answer to the next one.
    fn reset(&mut self);
}

fn modbus_word(value: u32) -> Result<u16, TransportError> {
    u16::try_from(value).map_err(|_| TransportError::AddressOutOfRange(value))
}

/// Modbus TCP client, connected on first use and reconnected after any failed request.
pub struct ModbusTransport {
    addr: SocketAddr,
    slave: Slave,
    context: Option<Context>,
}

impl ModbusTransport {
    pub fn new(addr: SocketAddr, unit_id: u8) -> Self {
        Self {
            addr,
            slave: Slave(unit_id),
            context: None,
        }
    }

    async fn context(&mut self) -> Result<&mut Context, TransportError> {
        if self.context.is_none() {
            tracing::info!(addr = %self.addr, "Connecting to inverter");

            let context = tcp::connect_slave(self.addr, self.slave)
                .await
                .map_err(|source| TransportError::Connect { addr: self.addr, source })?;

            self.context = Some(context);
        }

        self.context
            .as_mut()
            .ok_or_else(|| TransportError::Io(io::Error::from(io::ErrorKind::NotConnected)))
    }
}

impl RegisterTransport for ModbusTransport {
    async fn read(&mut self, register_type: RegisterType, start: Address, count: u32) -> Result<Vec<u16>, TransportError> {
        let start = modbus_word(start)?;
        let count = modbus_word(count)?;

        let context = self.context().await?;
        let response = match register_type {
            RegisterType::Input => context.read_input_registers(start, count).await,
            RegisterType::Holding => context.read_holding_registers(start, count).await,
        };

        response.map_err(|e| {
            self.context = None;
            TransportError::Io(e)
        })
    }

    async fn write(&mut self, address: Address, value: u16) -> Result<(), TransportError> {
        let address = modbus_word(address)?;

        let context = self.context().await?;
        let response = context.write_single_register(address, value).await;

        response.map_err(|e| {
            self.context = None;
            TransportError::Io(e)
        })
    }

    fn reset(&mut self) {
        if self.context.take().is_some() {
            tracing::debug!(addr = %self.addr, "Dropping inverter connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_addresses_beyond_u16() {
        assert_eq!(modbus_word(41000).unwrap(), 41000);
        assert!(matches!(modbus_word(70000), Err(TransportError::AddressOutOfRange(70000))));
    }
}
