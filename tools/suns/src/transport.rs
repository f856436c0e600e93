//! Modbus register transport
//!
//! Blocking TCP/RTU client over tokio-modbus' synchronous API. The timeout
//! applies to connect and to every read; expiry surfaces as an I/O error.

use std::net::{SocketAddr, ToSocketAddrs};

use anyhow::{Context as _, Result};
use common::{AppConfig, TransportKind};
use suns_model::{RegisterTransport, SunsError};
use tokio_modbus::client::sync;
use tokio_modbus::prelude::{Slave, SyncReader};
use tracing::{info, trace};

pub struct ModbusTransport {
    ctx: sync::Context,
    peer: String,
}

impl ModbusTransport {
    pub fn connect(config: &AppConfig) -> Result<Self> {
        let slave = Slave(config.slave);
        let timeout = Some(config.timeout());

        let (ctx, peer) = match config.transport {
            TransportKind::Tcp => {
                let addr = resolve(&config.host, config.port)?;
                let ctx = sync::tcp::connect_slave_with_timeout(addr, slave, timeout)
                    .with_context(|| format!("Failed to connect to {}", addr))?;
                (ctx, addr.to_string())
            },
            TransportKind::Rtu => {
                let builder =
                    tokio_serial::new(&config.serial, config.baud).timeout(config.timeout());
                let ctx = sync::rtu::connect_slave_with_timeout(&builder, slave, timeout)
                    .with_context(|| format!("Failed to open serial port {}", config.serial))?;
                (ctx, format!("{}@{}", config.serial, config.baud))
            },
        };

        info!("Connected to {} (unit {})", peer, config.slave);
        Ok(Self { ctx, peer })
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve {}:{}", host, port))?
        .next()
        .with_context(|| format!("No address for {}:{}", host, port))
}

impl RegisterTransport for ModbusTransport {
    fn read_registers(&mut self, address: u16, count: u16) -> suns_model::Result<Vec<u16>> {
        trace!("{}: read {} registers at address {}", self.peer, count, address);
        self.ctx
            .read_holding_registers(address, count)
            .map_err(|e| {
                SunsError::io(format!(
                    "{}: read of {} registers at address {} failed: {}",
                    self.peer, count, address, e
                ))
            })
    }
}
