use std::{fmt::{self, Debug, Display, Formatter}, str::FromStr, time::Duration};

use anyhow::{bail, Context, Result};
use thiserror::Error;

macro_rules! backends {
	[$($(# [$($m:tt)*])? $mod:ident :: $name:ident),* $(,)?] => {
		$(
			$(# [$($m)*])*
			mod $mod;
			$(# [$($m)*])*
			pub use crate::$mod::$name;
		)*
	};
}

backends! [
	#[cfg(feature = "serial")]
	serial::SerialBackend,
	#[cfg(all(feature = "bluetooth", target_os = "linux"))]
	bluetooth::BluetoothBackend,
	#[cfg(feature = "file")]
	file::FileBackend,
];

pub mod device;
pub mod bitmap;
pub mod packet;

pub use crate::{
	device::{CapabilityError, DeviceProfile, Model},
	bitmap::{Bitmap, EncodeError, EncodedImage, Reduction},
	packet::{Packet, PacketError},
};

/// Printing backend.
pub trait Backend {
	/// Send data to the printer.
	fn send(&mut self, buf: &[u8], timeout: Duration) -> Result<()>;

	/// Receive at most `buf.len()` bytes of data from the printer.
	///
	/// # Return value
	/// Returns the number of bytes received from the printer,
	/// `0` if nothing arrived before `timeout`.
	fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

/// Bluetooth MAC address, written as `XX:XX:XX:XX:XX:XX`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddr(pub [u8; 6]);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("bad MAC address: {0:?}")]
pub struct ParseMacError(String);

/// Niimbot label printer.
pub struct Printer {
	backend: Box<dyn Backend>,
}

impl Printer {
	/// Construct a new printer using `backend` as it's printing [`Backend`].
	pub fn new(backend: impl Backend + 'static) -> Self {
		Self {
			backend: Box::new(backend),
		}
	}

	/// Find any printer, connected using any backend.
	pub fn find() -> Result<Self> {
		#[cfg(feature = "serial")] {
			match SerialBackend::open_auto() {
				Ok(backend) => return Ok(Self::new(backend)),
				Err(e) => log::error!("cannot open serial printer: {e:#}"),
			}
		}

		bail!("no printer found");
	}

	fn send(&mut self, buf: &[u8], timeout: u64) -> Result<()> {
		log::trace!("send({}{buf:x?}, {timeout}s);", buf.len());
		self.backend.send(buf, Duration::from_secs(timeout))
	}
	fn recv(&mut self, buf: &mut [u8], timeout: u64) -> Result<usize> {
		let n = self.backend.recv(buf, Duration::from_secs(timeout))?;
		log::trace!("recv({}, {timeout}s): {n}{:x?}", buf.len(), &buf[0..n]);
		Ok(n)
	}
	fn recv_exact(&mut self, buf: &mut [u8], timeout: u64) -> Result<()> {
		let mut nr = 0;
		while nr < buf.len() {
			let n = self.recv(&mut buf[nr..], timeout)?;
			if n == 0 {
				bail!("timed out after {nr} of {} bytes", buf.len());
			}
			nr += n;
		}
		Ok(())
	}

	/// Send a single packet.
	pub fn send_packet(&mut self, pkt: &Packet) -> Result<()> {
		self.send(&pkt.to_bytes(), 3)
	}

	/// Receive a single packet.
	pub fn recv_packet(&mut self) -> Result<Packet> {
		let mut buf = vec![0u8; packet::HEADER_LEN];
		self.recv_exact(&mut buf, 3).context("failed to receive packet header")?;

		let len = buf[packet::HEADER_LEN - 1] as usize;
		buf.resize(packet::frame_len(len), 0);
		self.recv_exact(&mut buf[packet::HEADER_LEN..], 3)
			.context("failed to receive packet body")?;

		let pkt = Packet::from_bytes(&buf)?;
		Ok(pkt)
	}

	/// Send `pkt` and wait for a single packet in response.
	pub fn request(&mut self, pkt: &Packet) -> Result<Packet> {
		self.send_packet(pkt).context("failed to send request")?;
		self.recv_packet().context("failed to receive response")
	}

	/// Send the scan lines of an encoded image, top to bottom.
	///
	/// # Session
	/// No session commands (start/end of page, status polling) are sent,
	/// the printer has to be prepared for receiving bitmap rows.
	pub fn send_image(&mut self, img: &EncodedImage) -> Result<()> {
		log::info!(
			"sending {}x{} image, density {}",
			img.width(),
			img.height(),
			img.density(),
		);

		img
			.packets()
			.iter()
			.enumerate()
			.try_for_each(|(y, pkt)| {
				log::debug!("sending line {y}");
				self.send_packet(pkt)
					.with_context(|| format!("failed to send line {y}"))
			})
	}

	/// Validate `bitmap` against `model`, encode it and send it.
	///
	/// Nothing is sent, if the bitmap can't be printed.
	pub fn print(&mut self, model: Model, bitmap: &Bitmap<'_>, density: u8) -> Result<()> {
		model.validate(density, bitmap.width())?;
		let img = bitmap.encode(density)?;
		self.send_image(&img)
	}
}

impl Display for MacAddr {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let [x0, x1, x2, x3, x4, x5] = self.0;
		write!(f, "{x0:02x}:{x1:02x}:{x2:02x}:{x3:02x}:{x4:02x}:{x5:02x}")
	}
}

impl Debug for MacAddr {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		<Self as Display>::fmt(self, f)
	}
}

impl FromStr for MacAddr {
	type Err = ParseMacError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let err = || ParseMacError(s.to_owned());

		let mut mac = [0u8; 6];
		let mut parts = s.split(':');
		for x in &mut mac {
			let part = parts.next().ok_or_else(err)?;
			if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
				return Err(err());
			}
			*x = u8::from_str_radix(part, 16).map_err(|_| err())?;
		}
		if parts.next().is_some() {
			return Err(err());
		}

		Ok(Self(mac))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::{cell::RefCell, collections::VecDeque, rc::Rc};
	use pretty_assertions::assert_eq;

	#[derive(Default)]
	struct Wire {
		sent: Vec<Vec<u8>>,
		incoming: VecDeque<u8>,
	}

	/// Loopback backend, delivers at most 3 bytes per `recv()`.
	#[derive(Clone, Default)]
	struct MockBackend(Rc<RefCell<Wire>>);

	impl Backend for MockBackend {
		fn send(&mut self, buf: &[u8], _timeout: Duration) -> Result<()> {
			self.0.borrow_mut().sent.push(buf.to_vec());
			Ok(())
		}

		fn recv(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
			let mut wire = self.0.borrow_mut();
			let n = buf.len().min(3).min(wire.incoming.len());
			for b in &mut buf[..n] {
				*b = wire.incoming.pop_front().unwrap();
			}
			Ok(n)
		}
	}

	fn printer() -> (Printer, MockBackend) {
		let backend = MockBackend::default();
		(Printer::new(backend.clone()), backend)
	}

	#[test]
	fn print_sends_lines_in_order() {
		let (mut printer, backend) = printer();
		let bm = Bitmap::from_fn(96, 40, |x, y| x == y);
		printer.print(Model::D11, &bm, 3).unwrap();

		let expected: Vec<Vec<u8>> = bm
			.encode(3)
			.unwrap()
			.packets()
			.iter()
			.map(Packet::to_bytes)
			.collect();
		assert_eq!(backend.0.borrow().sent, expected);
	}

	#[test]
	fn print_validates_before_sending() {
		let (mut printer, backend) = printer();

		let err = printer.print(Model::D11, &Bitmap::from_fn(97, 1, |_, _| true), 3).unwrap_err();
		assert!(matches!(
			err.downcast_ref::<CapabilityError>(),
			Some(CapabilityError::WidthUnsupported { .. }),
		));

		let err = printer.print(Model::B21, &Bitmap::from_fn(8, 1, |_, _| true), 0).unwrap_err();
		assert!(matches!(
			err.downcast_ref::<CapabilityError>(),
			Some(CapabilityError::DensityUnsupported { .. }),
		));

		let err = printer.print(Model::B1, &Bitmap::from_fn(8, 0, |_, _| true), 1).unwrap_err();
		assert!(matches!(
			err.downcast_ref::<EncodeError>(),
			Some(EncodeError::InvalidImage { .. }),
		));

		assert!(backend.0.borrow().sent.is_empty());
	}

	#[test]
	fn request_response() {
		let (mut printer, backend) = printer();
		let response = Packet::new(0xdc, [0x01, 0x02, 0x03, 0x04]).unwrap();
		backend.0.borrow_mut().incoming.extend(response.to_bytes());

		let request = Packet::new(0xdc, [0x01]).unwrap();
		assert_eq!(printer.request(&request).unwrap(), response);
		assert_eq!(backend.0.borrow().sent, vec![request.to_bytes()]);
		assert!(backend.0.borrow().incoming.is_empty());
	}

	#[test]
	fn recv_back_to_back_packets() {
		let (mut printer, backend) = printer();
		let a = Packet::new(0x01, Vec::new()).unwrap();
		let b = Packet::new(0x02, vec![0xaa; 20]).unwrap();
		backend.0.borrow_mut().incoming.extend(a.to_bytes());
		backend.0.borrow_mut().incoming.extend(b.to_bytes());

		assert_eq!(printer.recv_packet().unwrap(), a);
		assert_eq!(printer.recv_packet().unwrap(), b);
	}

	#[test]
	fn recv_corrupt_packet() {
		let (mut printer, backend) = printer();
		let mut buf = Packet::new(0x01, [0x10, 0x20]).unwrap().to_bytes();
		buf[5] ^= 0x01;
		backend.0.borrow_mut().incoming.extend(buf);

		let err = printer.recv_packet().unwrap_err();
		assert!(matches!(err.downcast_ref::<PacketError>(), Some(PacketError::Checksum { .. })));
	}

	#[test]
	fn recv_timeout() {
		let (mut printer, backend) = printer();
		backend.0.borrow_mut().incoming.extend([0x55, 0x55, 0x01, 0x05, 0x00]);
		assert!(printer.recv_packet().is_err());
	}

	#[test]
	fn mac_addr() {
		let mac: MacAddr = "AA:bb:0C:1d:22:f3".parse().unwrap();
		assert_eq!(mac, MacAddr([0xaa, 0xbb, 0x0c, 0x1d, 0x22, 0xf3]));
		assert_eq!(mac.to_string(), "aa:bb:0c:1d:22:f3");

		for bad in ["", "aa:bb:cc:dd:ee", "aa:bb:cc:dd:ee:ff:00", "aa-bb-cc-dd-ee-ff", "gg:bb:cc:dd:ee:ff", "a:bb:cc:dd:ee:fff", "+a:bb:cc:dd:ee:ff"] {
			assert_eq!(bad.parse::<MacAddr>(), Err(ParseMacError(bad.into())), "{bad}");
		}
	}
}
