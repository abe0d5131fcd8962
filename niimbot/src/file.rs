use std::{
	fs::{File, OpenOptions},
	io::{self, Read, Write},
	path::Path,
	time::Duration,
};
use anyhow::{Result, Context};

use crate::Backend;

/// A backend writing to a device file, e.g. an already bound `/dev/rfcomm0`.
pub struct FileBackend {
	file: File,
}

impl FileBackend {
	/// Open a device file for reading and writing.
	pub fn open(path: &Path) -> Result<Self> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.open(path)
			.with_context(|| format!("cannot open {}", path.display()))?;

		log::info!("opened device file {}", path.display());
		Ok(Self {
			file,
		})
	}
}

/// Wait until `file` has data to read, `false` if `timeout` passed first.
#[cfg(unix)]
fn wait_readable(file: &File, timeout: Duration) -> io::Result<bool> {
	use std::os::fd::AsRawFd;

	let mut pfd = libc::pollfd {
		fd: file.as_raw_fd(),
		events: libc::POLLIN,
		revents: 0,
	};
	let ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
	let ret = unsafe { libc::poll(&mut pfd, 1, ms) };
	if ret < 0 {
		return Err(io::Error::last_os_error());
	}
	Ok(ret > 0)
}

// TODO: wait with a timeout on Windows, reads block there
#[cfg(not(unix))]
fn wait_readable(_file: &File, _timeout: Duration) -> io::Result<bool> {
	Ok(true)
}

impl Backend for FileBackend {
	fn send(&mut self, buf: &[u8], _timeout: Duration) -> anyhow::Result<()> {
		// TODO: honor the timeout, files block until the kernel accepts the data
		self.file.write_all(buf)?;
		self.file.flush()?;
		Ok(())
	}

	fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> anyhow::Result<usize> {
		if buf.is_empty() || !wait_readable(&self.file, timeout)? {
			return Ok(0);
		}

		let n = self.file.read(buf)?;
		Ok(n)
	}
}
