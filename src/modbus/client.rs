use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_modbus::client::{tcp, Client, Context};
use tokio_modbus::prelude::Slave;
use tokio_modbus::Response;

use super::protocol::ModbusRequest;
use crate::config::Config;
use crate::utils::error::TransportError;

/// The four Modbus primitives the relay operations are built from.
///
/// Implementations must complete one request before starting the next.
#[async_trait]
pub trait ModbusTransport: Send + Sync {
    async fn read_coils(&self, address: u16, count: u16) -> Result<Vec<bool>, TransportError>;

    async fn write_single_coil(&self, address: u16, value: bool) -> Result<(), TransportError>;

    async fn read_holding_registers(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    async fn write_single_register(&self, address: u16, value: u16)
        -> Result<(), TransportError>;

    /// Opens a fresh session after the previous one was dropped.
    async fn reconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Modbus TCP client for a single device session.
pub struct ModbusClient {
    socket_addr: SocketAddr,
    unit_id: u8,
    timeout: Duration,
    // The lock is held for a whole request/response, so requests never overlap.
    ctx: Mutex<Option<Context>>,
}

impl ModbusClient {
    /// Resolves `host:port` and opens the TCP session.
    pub async fn connect(config: &Config) -> Result<Self, TransportError> {
        let target = config.target();
        let timeout = config.timeout();
        info!("🔌 Connecting to Modbus server at {} (unit {})", target, config.unit_id);

        let socket_addr = tokio::net::lookup_host(&target)
            .await
            .map_err(|e| TransportError::Connection(format!("Cannot resolve {}: {}", target, e)))?
            .next()
            .ok_or_else(|| TransportError::Connection(format!("No address for {}", target)))?;

        let ctx = open_session(socket_addr, config.unit_id, timeout).await?;
        Ok(Self {
            socket_addr,
            unit_id: config.unit_id,
            timeout,
            ctx: Mutex::new(Some(ctx)),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.socket_addr
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub async fn is_connected(&self) -> bool {
        self.ctx.lock().await.is_some()
    }

    /// Drops the session. Later requests fail with `NotConnected`.
    pub async fn disconnect(&self) {
        if self.ctx.lock().await.take().is_some() {
            info!("🔌 Disconnected from {}", self.socket_addr);
        }
    }

    /// Issues one request and waits for its response.
    ///
    /// A timeout or a broken stream drops the session: a late reply would
    /// otherwise be taken as the answer to the next request.
    async fn call(&self, request: &ModbusRequest) -> Result<Response, TransportError> {
        let mut guard = self.ctx.lock().await;
        let ctx = guard.as_mut().ok_or(TransportError::NotConnected)?;
        debug!("📤 {}", request);

        let outcome = tokio::time::timeout(self.timeout, ctx.call(request.to_request())).await;
        let result = match outcome {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(exception))) => Err(TransportError::from(exception)),
            Ok(Err(e)) => {
                *guard = None;
                warn!("⚠️  Session to {} dropped: {}", self.socket_addr, e);
                Err(TransportError::from(e))
            }
            Err(_) => {
                *guard = None;
                warn!("⚠️  Session to {} dropped after timeout", self.socket_addr);
                Err(TransportError::Timeout(self.timeout))
            }
        };
        if let Err(e) = &result {
            error!("❌ {} failed: {}", request, e);
        }
        result
    }
}

async fn open_session(
    socket_addr: SocketAddr,
    unit_id: u8,
    timeout: Duration,
) -> Result<Context, TransportError> {
    let ctx = tokio::time::timeout(timeout, tcp::connect_slave(socket_addr, Slave(unit_id)))
        .await
        .map_err(|_| {
            error!("❌ Connection to {} timed out", socket_addr);
            TransportError::Timeout(timeout)
        })?
        .map_err(|e| {
            error!("❌ Failed to connect to {}: {}", socket_addr, e);
            TransportError::Connection(e.to_string())
        })?;
    info!("✅ Connected to {}", socket_addr);
    Ok(ctx)
}

fn invalid(request: &ModbusRequest, detail: String) -> TransportError {
    let err = TransportError::InvalidResponse(format!("{}: {}", request, detail));
    error!("❌ {}", err);
    err
}

fn unexpected(request: &ModbusRequest, response: Response) -> TransportError {
    invalid(request, format!("unexpected response {:?}", response))
}

fn check_count<T>(
    request: &ModbusRequest,
    values: Vec<T>,
    expected: usize,
) -> Result<Vec<T>, TransportError> {
    if values.len() == expected {
        Ok(values)
    } else {
        Err(invalid(
            request,
            format!("expected {} value(s), got {}", expected, values.len()),
        ))
    }
}

#[async_trait]
impl ModbusTransport for ModbusClient {
    async fn read_coils(&self, address: u16, count: u16) -> Result<Vec<bool>, TransportError> {
        let request = ModbusRequest::ReadCoils { address, count };
        match self.call(&request).await? {
            Response::ReadCoils(coils) => {
                // Coils come back padded to a whole byte.
                let padded = (count as usize + 7) / 8 * 8;
                let mut coils = check_count(&request, coils, padded)?;
                coils.truncate(count as usize);
                Ok(coils)
            }
            other => Err(unexpected(&request, other)),
        }
    }

    async fn write_single_coil(&self, address: u16, value: bool) -> Result<(), TransportError> {
        let request = ModbusRequest::WriteSingleCoil { address, value };
        match self.call(&request).await? {
            Response::WriteSingleCoil(echo_addr, echo_value)
                if echo_addr == address && echo_value == value =>
            {
                Ok(())
            }
            other => Err(unexpected(&request, other)),
        }
    }

    async fn read_holding_registers(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let request = ModbusRequest::ReadHoldingRegisters { address, count };
        match self.call(&request).await? {
            Response::ReadHoldingRegisters(registers) => {
                check_count(&request, registers, count as usize)
            }
            other => Err(unexpected(&request, other)),
        }
    }

    async fn write_single_register(
        &self,
        address: u16,
        value: u16,
    ) -> Result<(), TransportError> {
        let request = ModbusRequest::WriteSingleRegister { address, value };
        match self.call(&request).await? {
            Response::WriteSingleRegister(echo_addr, echo_value)
                if echo_addr == address && echo_value == value =>
            {
                Ok(())
            }
            other => Err(unexpected(&request, other)),
        }
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        let mut guard = self.ctx.lock().await;
        if let Some(mut old) = guard.take() {
            let _ = old.disconnect().await;
        }
        *guard = Some(open_session(self.socket_addr, self.unit_id, self.timeout).await?);
        Ok(())
    }
}
