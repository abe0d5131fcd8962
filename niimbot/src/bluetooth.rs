use std::{
	fs::File,
	io::{self, ErrorKind, Read, Write},
	mem,
	os::fd::{AsRawFd, FromRawFd, OwnedFd},
	time::Duration,
};
use anyhow::{Result, Context};

use crate::{Backend, MacAddr};

const BTPROTO_RFCOMM: libc::c_int = 3;

/// Niimbot printers expose their serial port profile on channel 1.
const CHANNEL: u8 = 1;

/// `struct sockaddr_rc` from `<bluetooth/rfcomm.h>`.
#[repr(C)]
struct SockaddrRc {
	rc_family: libc::sa_family_t,
	rc_bdaddr: [u8; 6],
	rc_channel: u8,
}

/// A Bluetooth RFCOMM backend for [`Printer`](crate::Printer).
pub struct BluetoothBackend {
	sock: File,
}

impl BluetoothBackend {
	/// Connect to the printer with the MAC address `addr`.
	/// The printer has to be paired already.
	pub fn connect(addr: MacAddr) -> Result<Self> {
		let fd = unsafe { libc::socket(libc::AF_BLUETOOTH, libc::SOCK_STREAM, BTPROTO_RFCOMM) };
		if fd < 0 {
			return Err(io::Error::last_os_error()).context("cannot create RFCOMM socket");
		}
		let fd = unsafe { OwnedFd::from_raw_fd(fd) };

		// bdaddr_t is stored little endian
		let mut bdaddr = addr.0;
		bdaddr.reverse();

		let sa = SockaddrRc {
			rc_family: libc::AF_BLUETOOTH as libc::sa_family_t,
			rc_bdaddr: bdaddr,
			rc_channel: CHANNEL,
		};
		let ret = unsafe {
			libc::connect(
				fd.as_raw_fd(),
				&sa as *const SockaddrRc as *const libc::sockaddr,
				mem::size_of::<SockaddrRc>() as libc::socklen_t,
			)
		};
		if ret < 0 {
			return Err(io::Error::last_os_error())
				.with_context(|| format!("cannot connect to {addr} on channel {CHANNEL}"));
		}

		log::info!("connected to {addr} on RFCOMM channel {CHANNEL}");
		Ok(Self {
			sock: File::from(fd),
		})
	}

	fn set_timeout(&self, opt: libc::c_int, timeout: Duration) -> io::Result<()> {
		let tv = libc::timeval {
			tv_sec: timeout.as_secs() as libc::time_t,
			tv_usec: timeout.subsec_micros() as libc::suseconds_t,
		};
		let ret = unsafe {
			libc::setsockopt(
				self.sock.as_raw_fd(),
				libc::SOL_SOCKET,
				opt,
				&tv as *const libc::timeval as *const libc::c_void,
				mem::size_of::<libc::timeval>() as libc::socklen_t,
			)
		};
		if ret < 0 {
			return Err(io::Error::last_os_error());
		}
		Ok(())
	}
}

impl Backend for BluetoothBackend {
	fn send(&mut self, buf: &[u8], timeout: Duration) -> anyhow::Result<()> {
		self.set_timeout(libc::SO_SNDTIMEO, timeout)?;
		self.sock.write_all(buf)?;
		Ok(())
	}

	fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> anyhow::Result<usize> {
		self.set_timeout(libc::SO_RCVTIMEO, timeout)?;
		match self.sock.read(buf) {
			Ok(n) => Ok(n),
			Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(0),
			Err(e) => Err(e.into()),
		}
	}
}
