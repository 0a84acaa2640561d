//! A reference [`gwcore::DeviceSession`] backed by `tokio-modbus`.
//!
//! Reads a fixed small range of input registers per tick. This is the
//! "runnable reference driver" the core depends on only through the trait;
//! a production deployment would swap in a per-vendor register map without
//! touching anything upstream of [`gwcore::DeviceSession`].

use async_trait::async_trait;
use gwcore::device::DeviceSession;
use shared::api::DeviceKind;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio_modbus::client::{rtu, tcp, Context as ModbusContext};
use tokio_modbus::prelude::*;

const SCAN_START: u16 = 0;
const SCAN_RANGE: u16 = 10;

enum Transport {
    Tcp { addr: SocketAddr, unit_id: u8 },
    Rtu { path: String, baud_rate: u32, unit_id: u8 },
}

pub struct ModbusSession {
    address: String,
    transport: Transport,
    client: Mutex<Option<ModbusContext>>,
    terminated: AtomicBool,
}

impl ModbusSession {
    pub fn tcp(host: String, port: u16, unit_id: u8) -> anyhow::Result<Self> {
        let addr: SocketAddr = format!("{host}:{port}").parse()?;
        Ok(Self {
            address: format!("{host}:{port}"),
            transport: Transport::Tcp { addr, unit_id },
            client: Mutex::new(None),
            terminated: AtomicBool::new(false),
        })
    }

    pub fn rtu(path: String, baud_rate: u32, unit_id: u8) -> Self {
        Self {
            address: path.clone(),
            transport: Transport::Rtu {
                path,
                baud_rate,
                unit_id,
            },
            client: Mutex::new(None),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn from_bootstrap(entry: &gwcore::bootstrap::BootstrapEntry) -> anyhow::Result<Self> {
        match entry.kind {
            DeviceKind::Tcp => Self::tcp(entry.address.clone(), entry.port, entry.unit_id),
            DeviceKind::Rtu => Ok(Self::rtu(entry.address.clone(), 9600, entry.unit_id)),
        }
    }
}

#[async_trait]
impl DeviceSession for ModbusSession {
    async fn open(&self) -> anyhow::Result<()> {
        if self.terminated.load(Ordering::SeqCst) {
            anyhow::bail!("session terminated");
        }
        let mut guard = self.client.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let ctx = match &self.transport {
            Transport::Tcp { addr, unit_id } => {
                let mut ctx = tcp::connect(*addr).await?;
                ctx.set_slave(Slave(*unit_id));
                ctx
            }
            Transport::Rtu {
                path,
                baud_rate,
                unit_id,
            } => {
                let builder = tokio_serial::new(path.clone(), *baud_rate);
                let port = tokio_serial::SerialStream::open(&builder)?;
                let mut ctx = rtu::attach(port);
                ctx.set_slave(Slave(*unit_id));
                ctx
            }
        };
        *guard = Some(ctx);
        Ok(())
    }

    async fn close(&self) {
        self.client.lock().await.take();
    }

    fn is_open(&self) -> bool {
        self.client.try_lock().map(|g| g.is_some()).unwrap_or(true)
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Marks this session as permanently retired; it will never reopen.
    fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    async fn read_harvest_data(&self) -> anyhow::Result<HashMap<String, i64>> {
        let mut guard = self.client.lock().await;
        let ctx = guard.as_mut().ok_or_else(|| anyhow::anyhow!("device not open"))?;
        let values = ctx.read_input_registers(SCAN_START, SCAN_RANGE).await??;
        Ok(values
            .into_iter()
            .enumerate()
            .map(|(i, v)| (format!("reg_{}", SCAN_START as usize + i), v as i64))
            .collect())
    }

    async fn write(&self, starting_address: u16, values: &[u16]) -> anyhow::Result<()> {
        let mut guard = self.client.lock().await;
        let ctx = guard.as_mut().ok_or_else(|| anyhow::anyhow!("device not open"))?;
        ctx.write_multiple_registers(starting_address, values).await??;
        Ok(())
    }

    fn address(&self) -> &str {
        &self.address
    }
}
