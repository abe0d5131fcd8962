use std::fmt::{self, Debug, Formatter};

use thiserror::Error;

/// Marker preceding every frame.
pub const HEAD: [u8; 2] = [0x55, 0x55];

/// Marker terminating every frame.
pub const TAIL: [u8; 2] = [0xaa, 0xaa];

/// Number of bytes in front of the payload: head marker, kind and length.
pub const HEADER_LEN: usize = 4;

/// Number of bytes after the payload: checksum and tail marker.
pub const TRAILER_LEN: usize = 3;

/// Maximum payload length, the length is transmitted in a single byte.
pub const MAX_DATA_LEN: usize = u8::MAX as usize;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
	#[error("invalid frame markers")]
	Framing,

	#[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
	Checksum { expected: u8, actual: u8 },

	#[error("truncated frame: expected {expected} bytes, got {actual}")]
	Truncated { expected: usize, actual: usize },

	#[error("payload too long: {0} bytes")]
	TooLong(usize),
}

/// A single framed command exchanged with the printer.
///
/// # Wire format
/// ```text
/// [55 55] [kind] [len] [data; len] [checksum] [AA AA]
/// ```
/// The checksum is the XOR of `kind`, `len` and every data byte.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Packet {
	kind: u8,
	data: Vec<u8>,
}

/// Total size of a frame carrying `data_len` bytes of payload.
pub const fn frame_len(data_len: usize) -> usize {
	HEADER_LEN + data_len + TRAILER_LEN
}

fn checksum(kind: u8, data: &[u8]) -> u8 {
	data
		.iter()
		.fold(kind ^ data.len() as u8, |acc, b| acc ^ b)
}

impl Packet {
	/// Create a new packet, `data` must not be longer than [`MAX_DATA_LEN`].
	pub fn new(kind: u8, data: impl Into<Vec<u8>>) -> Result<Self, PacketError> {
		let data = data.into();
		if data.len() > MAX_DATA_LEN {
			return Err(PacketError::TooLong(data.len()));
		}

		Ok(Self {
			kind,
			data,
		})
	}

	pub fn kind(&self) -> u8 {
		self.kind
	}

	pub fn data(&self) -> &[u8] {
		&self.data
	}

	pub fn into_data(self) -> Vec<u8> {
		self.data
	}

	/// Serialize into exactly `7 + data.len()` bytes.
	pub fn to_bytes(&self) -> Vec<u8> {
		let mut buf = Vec::with_capacity(frame_len(self.data.len()));
		buf.extend_from_slice(&HEAD);
		buf.push(self.kind);
		buf.push(self.data.len() as u8);
		buf.extend_from_slice(&self.data);
		buf.push(checksum(self.kind, &self.data));
		buf.extend_from_slice(&TAIL);
		buf
	}

	/// Parse one frame from the start of `buf`.
	///
	/// Anything following the frame is ignored.
	pub fn from_bytes(buf: &[u8]) -> Result<Self, PacketError> {
		if buf.len() < frame_len(0) {
			return Err(PacketError::Truncated { expected: frame_len(0), actual: buf.len() });
		}
		if buf[0..2] != HEAD {
			return Err(PacketError::Framing);
		}

		let kind = buf[2];
		let len = buf[3] as usize;
		let end = frame_len(len);
		if buf.len() < end {
			return Err(PacketError::Truncated { expected: end, actual: buf.len() });
		}
		if buf[end - 2..end] != TAIL {
			return Err(PacketError::Framing);
		}

		let data = &buf[HEADER_LEN..HEADER_LEN + len];
		let expected = checksum(kind, data);
		let actual = buf[HEADER_LEN + len];
		if expected != actual {
			return Err(PacketError::Checksum { expected, actual });
		}

		Ok(Self {
			kind,
			data: data.to_vec(),
		})
	}
}

impl Debug for Packet {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f
			.debug_struct("Packet")
			.field("kind", &format_args!("{:#04x}", self.kind))
			.field("data", &format_args!("{:02x?}", self.data))
			.finish()
	}
}
