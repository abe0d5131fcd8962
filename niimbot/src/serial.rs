use std::{io::{ErrorKind, Read, Write}, time::Duration};
use anyhow::{Result, Context};
use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, SerialPortType, StopBits};

use crate::Backend;

const BAUD_RATE: u32 = 115_200;
const TIMEOUT: Duration = Duration::from_millis(500);

/// A USB serial backend for [`Printer`](crate::Printer).
pub struct SerialBackend {
	port: Box<dyn SerialPort>,
}

impl SerialBackend {
	/// Get a list of serial ports backed by a USB device.
	pub fn list() -> serialport::Result<Vec<SerialPortInfo>> {
		let ports = serialport::available_ports()?
			.into_iter()
			.filter(|port| matches!(port.port_type, SerialPortType::UsbPort(_)))
			.collect();
		Ok(ports)
	}

	/// Open a serial port, e.g. `/dev/ttyACM0`.
	pub fn open(path: &str) -> Result<Self> {
		let port = serialport::new(path, BAUD_RATE)
			.data_bits(DataBits::Eight)
			.parity(Parity::None)
			.stop_bits(StopBits::One)
			.flow_control(FlowControl::None)
			.timeout(TIMEOUT)
			.open()
			.with_context(|| format!("cannot open serial port {path}"))?;

		log::info!("opened serial port {path} at {BAUD_RATE} baud");
		Ok(Self {
			port,
		})
	}

	/// Open the first USB serial port.
	pub fn open_auto() -> Result<Self> {
		let ports = Self::list().context("cannot get list of serial ports")?;
		for port in &ports {
			log::debug!("found serial port: {port:?}");
		}

		let port = ports.first().context("no USB serial port found")?;
		Self::open(&port.port_name)
	}
}

impl Backend for SerialBackend {
	fn send(&mut self, buf: &[u8], timeout: Duration) -> anyhow::Result<()> {
		self.port.set_timeout(timeout)?;
		self.port.write_all(buf)?;
		self.port.flush()?;
		Ok(())
	}

	fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> anyhow::Result<usize> {
		self.port.set_timeout(timeout)?;
		match self.port.read(buf) {
			Ok(n) => Ok(n),
			Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
			Err(e) => Err(e.into()),
		}
	}
}
