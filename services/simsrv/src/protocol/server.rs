//! Per-device Modbus TCP server
//!
//! One accept task per running device and one task per accepted connection.
//! Requests on a connection are handled strictly in arrival order; separate
//! connections proceed concurrently. All teardown goes through the device's
//! cancellation token: in-flight requests finish their current atomic
//! operation, then the tasks exit at their next suspension point.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::frame::{self, ExceptionCode, MbapHeader, Request, MBAP_HEADER_LEN};
use crate::core::device::ModbusDevice;
use crate::core::log::LogLevel;
use crate::core::value::DataArea;
use crate::error::{Result, SimSrvError};

/// Accounting record for one connected master
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub addr: String,
    pub connected_at: i64,
    pub last_request: i64,
    pub request_count: u64,
}

/// A bound, accepting Modbus TCP listener for one device
pub struct ProtocolServer {
    local_addr: SocketAddr,
    clients: Arc<RwLock<HashMap<SocketAddr, ClientInfo>>>,
    cancel: CancellationToken,
    accept_handle: JoinHandle<()>,
}

impl ProtocolServer {
    /// Bind the device's port and start accepting connections.
    ///
    /// An already-bound port surfaces as `PortInUse`; the caller decides
    /// whether another device holds it.
    pub async fn bind(device: Arc<ModbusDevice>, cancel: CancellationToken) -> Result<Self> {
        let bind_addr = format!("0.0.0.0:{}", device.port());
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                SimSrvError::PortInUse(device.port())
            } else {
                SimSrvError::Io(e)
            }
        })?;
        let local_addr = listener.local_addr()?;

        info!(
            "Modbus server for device '{}' listening on {}",
            device.file_name(),
            local_addr
        );
        device
            .log()
            .append(LogLevel::Info, format!("listening on {local_addr}"));

        let clients = Arc::new(RwLock::new(HashMap::new()));
        let accept_handle = tokio::spawn(accept_loop(
            device,
            listener,
            clients.clone(),
            cancel.clone(),
        ));

        Ok(Self {
            local_addr,
            clients,
            cancel,
            accept_handle,
        })
    }

    /// Actual bound address (relevant when the configured port is 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn clients(&self) -> Vec<ClientInfo> {
        self.clients.read().await.values().cloned().collect()
    }

    /// Stop accepting, cancel connection tasks and wait for the accept loop
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.accept_handle.await {
            if !e.is_cancelled() {
                warn!("accept task ended abnormally: {e}");
            }
        }
    }
}

async fn accept_loop(
    device: Arc<ModbusDevice>,
    listener: TcpListener,
    clients: Arc<RwLock<HashMap<SocketAddr, ClientInfo>>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!("accepted Modbus connection from {addr}");
                    device
                        .log()
                        .append(LogLevel::Info, format!("client {addr} connected"));

                    let now = chrono::Utc::now().timestamp();
                    clients.write().await.insert(
                        addr,
                        ClientInfo {
                            addr: addr.to_string(),
                            connected_at: now,
                            last_request: now,
                            request_count: 0,
                        },
                    );

                    tokio::spawn(handle_connection(
                        device.clone(),
                        stream,
                        addr,
                        clients.clone(),
                        cancel.child_token(),
                    ));
                },
                Err(e) => {
                    error!("accept failed on device '{}': {e}", device.file_name());
                },
            },
        }
    }
    debug!(
        "accept loop stopped for device '{}'",
        device.file_name()
    );
}

async fn handle_connection(
    device: Arc<ModbusDevice>,
    mut stream: TcpStream,
    addr: SocketAddr,
    clients: Arc<RwLock<HashMap<SocketAddr, ClientInfo>>>,
    cancel: CancellationToken,
) {
    let mut header_buf = [0u8; MBAP_HEADER_LEN];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            read = stream.read_exact(&mut header_buf) => {
                if read.is_err() {
                    break; // closed or errored between requests
                }
            },
        }

        let header = MbapHeader::parse(&header_buf);
        if !header.is_valid() {
            warn!("malformed MBAP header from {addr}, closing connection");
            device
                .log()
                .append(LogLevel::Warn, format!("client {addr}: malformed frame"));
            break;
        }

        let mut pdu = vec![0u8; usize::from(header.length) - 1];
        tokio::select! {
            _ = cancel.cancelled() => break,
            read = stream.read_exact(&mut pdu) => {
                if read.is_err() {
                    break;
                }
            },
        }

        if let Some(response) = dispatch(&device, header.unit_id, &pdu) {
            let adu = frame::build_adu(header.transaction_id, header.unit_id, &response);
            if stream.write_all(&adu).await.is_err() {
                break;
            }
        }

        let mut guard = clients.write().await;
        if let Some(info) = guard.get_mut(&addr) {
            info.last_request = chrono::Utc::now().timestamp();
            info.request_count += 1;
        }
    }

    clients.write().await.remove(&addr);
    device
        .log()
        .append(LogLevel::Info, format!("client {addr} disconnected"));
    debug!("connection from {addr} closed");
}

/// Dispatch one request PDU against the addressed unit.
///
/// Returns `None` when the request must be dropped without a response
/// (unknown unit id on a non-gateway device, per Modbus convention).
fn dispatch(device: &ModbusDevice, unit_id: u8, pdu: &[u8]) -> Option<Vec<u8>> {
    let function = pdu[0];

    let Some(unit) = device.unit(unit_id) else {
        if device.gateway() {
            device.log().append(
                LogLevel::Warn,
                format!("no unit {unit_id}, answering gateway exception"),
            );
            return Some(frame::exception_pdu(
                function,
                ExceptionCode::GatewayTargetFailedToRespond,
            ));
        }
        debug!("dropping request for unknown unit {unit_id}");
        return None;
    };

    let endian = device.endianness();
    let result = frame::parse_request(function, &pdu[1..]).and_then(|request| match request {
        Request::ReadBits {
            area,
            address,
            quantity,
        } => unit
            .read_bits(area, address, quantity)
            .map(|bits| frame::bits_response(function, &bits)),
        Request::ReadRegisters {
            area,
            address,
            quantity,
        } => unit
            .read_registers(area, address, quantity, endian)
            .map(|words| frame::registers_response(function, &words)),
        Request::WriteSingleCoil { address, value } => unit
            .write_bits(DataArea::Coil, address, &[value])
            .map(|_| {
                frame::echo_response(function, address, if value { 0xFF00 } else { 0x0000 })
            }),
        Request::WriteSingleRegister { address, value } => unit
            .write_registers(DataArea::HoldingRegister, address, &[value], endian)
            .map(|_| frame::echo_response(function, address, value)),
        Request::WriteMultipleCoils { address, bits } => unit
            .write_bits(DataArea::Coil, address, &bits)
            .map(|_| frame::echo_response(function, address, bits.len() as u16)),
        Request::WriteMultipleRegisters { address, words } => unit
            .write_registers(DataArea::HoldingRegister, address, &words, endian)
            .map(|_| frame::echo_response(function, address, words.len() as u16)),
    });

    Some(match result {
        Ok(response) => response,
        Err(code) => {
            device.log().append(
                LogLevel::Warn,
                format!(
                    "unit {unit_id} function 0x{function:02X}: {}",
                    code.as_str()
                ),
            );
            frame::exception_pdu(function, code)
        },
    })
}
