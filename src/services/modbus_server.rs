//! Modbus TCP server in front of a simulated relay board.

use log::{error, info, warn};
use std::future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_modbus::prelude::*;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

use crate::devices::simulator::{lock_model, RelayBoardModel, SimulatorFault};
use crate::utils::error::TransportError;

/// Answers coil and holding-register requests from the shared board model.
pub struct RelayBoardService {
    board: Arc<Mutex<RelayBoardModel>>,
}

impl RelayBoardService {
    pub fn new(board: Arc<Mutex<RelayBoardModel>>) -> Self {
        Self { board }
    }

    fn handle(&self, req: Request<'static>) -> Result<Response, ExceptionCode> {
        let mut board = lock_model(&self.board);
        let res = match req {
            Request::ReadCoils(addr, cnt) => board.read_coils(addr, cnt).map(Response::ReadCoils),
            Request::WriteSingleCoil(addr, value) => board
                .write_coil(addr, value)
                .map(|_| Response::WriteSingleCoil(addr, value)),
            Request::ReadHoldingRegisters(addr, cnt) => board
                .read_holding_registers(addr, cnt)
                .map(Response::ReadHoldingRegisters),
            Request::WriteSingleRegister(addr, value) => board
                .write_holding_register(addr, value)
                .map(|_| Response::WriteSingleRegister(addr, value)),
            _ => {
                warn!("SIMULATOR: unsupported function in request: {req:?}");
                return Err(ExceptionCode::IllegalFunction);
            }
        };
        res.map_err(|fault| match fault {
            SimulatorFault::IllegalDataAddress(addr) => {
                warn!("SIMULATOR: illegal data address {}", addr);
                ExceptionCode::IllegalDataAddress
            }
        })
    }
}

impl tokio_modbus::server::Service for RelayBoardService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        future::ready(self.handle(req))
    }
}

/// Binds `bind_addr` and serves `board` in a background task.
///
/// Returns the bound address, which differs from `bind_addr` when port 0 was requested.
pub async fn spawn_simulator(
    bind_addr: SocketAddr,
    board: Arc<Mutex<RelayBoardModel>>,
) -> Result<(SocketAddr, JoinHandle<()>), TransportError> {
    let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
        TransportError::Connection(format!("Failed to bind simulator on {}: {}", bind_addr, e))
    })?;
    let local_addr = listener.local_addr()?;
    info!("🧪 Relay board simulator listening on {}", local_addr);

    let server = Server::new(listener);
    let handle = tokio::spawn(async move {
        let new_service = move |_socket_addr: SocketAddr| -> std::io::Result<Option<RelayBoardService>> {
            Ok(Some(RelayBoardService::new(board.clone())))
        };
        let on_connected = |stream: TcpStream, socket_addr: SocketAddr| {
            info!("🔗 Simulator client connected: {}", socket_addr);
            let new_service = new_service.clone();
            async move { accept_tcp_connection(stream, socket_addr, new_service) }
        };
        let on_process_error = |err: std::io::Error| {
            error!("❌ Simulator connection error: {}", err);
        };
        if let Err(e) = server.serve(&on_connected, on_process_error).await {
            error!("❌ Simulator stopped: {}", e);
        }
    });

    Ok((local_addr, handle))
}

/// Serves until Ctrl+C.
pub async fn run_simulator(
    bind_addr: SocketAddr,
    board: Arc<Mutex<RelayBoardModel>>,
) -> Result<(), TransportError> {
    let (local_addr, handle) = spawn_simulator(bind_addr, board).await?;
    println!("🧪 Simulating relay board on {} (Ctrl+C to stop)", local_addr);

    tokio::signal::ctrl_c().await?;
    println!("\n🛑 Stopping simulator...");
    handle.abort();
    Ok(())
}
