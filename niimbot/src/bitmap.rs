use std::{borrow::Cow, fmt::{self, Formatter, Debug}};

use image::{imageops::{dither, ColorMap}, GrayImage, Luma};
use thiserror::Error;

use crate::packet::{Packet, MAX_DATA_LEN};

/// Packet kind of a bitmap scan line.
pub const KIND_BITMAP_ROW: u8 = 0x85;

/// Line header: row index (2), three reserved counters (3), marker (1).
pub const LINE_HEADER_LEN: usize = 6;

/// The widest line that still fits into a single packet.
///
/// This is the exact limit of the one byte length field:
/// `LINE_HEADER_LEN + ceil(width / 8) <= 255`, i.e. 1992px.
pub const MAX_WIDTH: u32 = ((MAX_DATA_LEN - LINE_HEADER_LEN) * 8) as u32;

/// The tallest image, whose row indices still fit into 16 bits.
pub const MAX_HEIGHT: u32 = u16::MAX as u32 + 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BitmapError {
	#[error("expected a length of {expected}, got {actual}")]
	Len { expected: usize, actual: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
	#[error("image has an invalid size: {width}x{height}")]
	InvalidImage { width: u32, height: u32 },

	#[error("image is {0}px wide, a line can hold at most {max}px", max = MAX_WIDTH)]
	LineTooLong(u32),

	#[error("image is {0}px tall, at most {max} lines are supported", max = MAX_HEIGHT)]
	TooManyLines(u32),
}

/// How grayscale pixels are reduced to ink / no ink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
	/// Pixels darker than the threshold are inked.
	Threshold(u8),

	/// Floyd-Steinberg error diffusion around the given midpoint.
	Dither(u8),
}

impl Default for Reduction {
	fn default() -> Self {
		Self::Threshold(0x80)
	}
}

struct BlackWhiteMap(u8);

impl ColorMap for BlackWhiteMap {
	type Color = Luma<u8>;

	fn index_of(&self, color: &Self::Color) -> usize {
		if color.0[0] >= self.0 {
			1
		} else {
			0
		}
	}

	fn map_color(&self, color: &mut Self::Color) {
		*color = match self.index_of(color) {
			0 => Luma([0x00]),
			_ => Luma([0xff]),
		};
	}

	fn lookup(&self, index: usize) -> Option<Self::Color> {
		match index {
			0 => Some(Luma([0x00])),
			1 => Some(Luma([0xff])),
			_ => None,
		}
	}

	fn has_lookup(&self) -> bool {
		true
	}
}

/// A bilevel image, ready to be encoded.
///
/// # Format
/// - `1` = ink, `0` = blank
/// - MSB: left, LSB: right
/// - every row is padded to a full byte, `(width + 7) / 8` bytes per row
pub struct Bitmap<'a> {
	width: u32,
	height: u32,
	pixels: Cow<'a, [u8]>,
}

impl<'a> Bitmap<'a> {
	/// Create a bitmap from packed rows.
	pub fn new(width: u32, height: u32, pixels: impl Into<Cow<'a, [u8]>>) -> Result<Self, BitmapError> {
		Self::do_new(width, height, pixels.into())
	}

	fn do_new(width: u32, height: u32, pixels: Cow<'a, [u8]>) -> Result<Self, BitmapError> {
		let expected = row_bytes(width) * height as usize;
		if expected != pixels.len() {
			return Err(BitmapError::Len { expected, actual: pixels.len() });
		}

		Ok(Self {
			width,
			height,
			pixels,
		})
	}

	/// Create a bitmap by asking `f` whether the pixel at `(x, y)` is inked.
	pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Bitmap<'static> {
		let stride = row_bytes(width);
		let mut pixels = vec![0u8; stride * height as usize];
		for y in 0..height {
			for x in 0..width {
				if f(x, y) {
					pixels[y as usize * stride + x as usize / 8] |= 0x80 >> (x % 8);
				}
			}
		}

		Bitmap {
			width,
			height,
			pixels: Cow::Owned(pixels),
		}
	}

	/// Reduce a grayscale image, dark pixels become ink.
	pub fn from_gray(img: &GrayImage, reduction: Reduction) -> Bitmap<'static> {
		match reduction {
			Reduction::Threshold(t) => {
				Self::from_fn(img.width(), img.height(), |x, y| img.get_pixel(x, y).0[0] < t)
			},
			Reduction::Dither(t) => {
				let mut img = img.clone();
				dither(&mut img, &BlackWhiteMap(t));
				Self::from_fn(img.width(), img.height(), |x, y| img.get_pixel(x, y).0[0] == 0x00)
			},
		}
	}

	pub fn width(&self) -> u32 {
		self.width
	}

	pub fn height(&self) -> u32 {
		self.height
	}

	pub fn pixels(&self) -> &[u8] {
		&self.pixels
	}

	/// Packed bytes of row `y`.
	pub fn row(&self, y: u32) -> Option<&[u8]> {
		if y >= self.height {
			return None;
		}

		let stride = row_bytes(self.width);
		let start = y as usize * stride;
		Some(&self.pixels[start..start + stride])
	}

	pub fn get(&self, x: u32, y: u32) -> Option<bool> {
		if x >= self.width {
			return None;
		}

		let b = self.row(y)?[x as usize / 8];
		Some(b & (0x80 >> (x % 8)) != 0)
	}

	/// Encode into one scan line packet per row, see [`encode`].
	pub fn encode(&self, density: u8) -> Result<EncodedImage, EncodeError> {
		encode(self, density)
	}
}

impl Debug for Bitmap<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f
			.debug_struct("Bitmap")
			.field("width", &self.width)
			.field("height", &self.height)
			.finish()
	}
}

fn row_bytes(width: u32) -> usize {
	(width as usize).div_ceil(8)
}

/// An image, encoded into scan line packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
	width: u32,
	height: u32,
	density: u8,
	packets: Vec<Packet>,
}

impl EncodedImage {
	pub fn width(&self) -> u32 {
		self.width
	}

	pub fn height(&self) -> u32 {
		self.height
	}

	pub fn density(&self) -> u8 {
		self.density
	}

	/// Scan line packets, top to bottom.
	pub fn packets(&self) -> &[Packet] {
		&self.packets
	}

	pub fn into_packets(self) -> Vec<Packet> {
		self.packets
	}
}

/// Encode `bitmap` into one packet of kind [`KIND_BITMAP_ROW`] per row.
///
/// Each packet carries the row index (big endian), three zeroed counters,
/// a `1` marker and the packed row.
/// Packet `i` always holds row `i`.
pub fn encode(bitmap: &Bitmap<'_>, density: u8) -> Result<EncodedImage, EncodeError> {
	let (width, height) = (bitmap.width(), bitmap.height());
	if width == 0 || height == 0 {
		return Err(EncodeError::InvalidImage { width, height });
	}
	if width > MAX_WIDTH {
		return Err(EncodeError::LineTooLong(width));
	}
	if height > MAX_HEIGHT {
		return Err(EncodeError::TooManyLines(height));
	}

	// bits beyond `width` in the last byte of a row
	let pad = match width % 8 {
		0 => 0xff,
		n => 0xffu8 << (8 - n),
	};

	let packets = (0..height)
		.map(|y| {
			let row = bitmap.row(y).unwrap_or_default();
			let mut data = Vec::with_capacity(LINE_HEADER_LEN + row.len());
			data.extend_from_slice(&(y as u16).to_be_bytes());
			data.extend_from_slice(&[0x00, 0x00, 0x00]);
			data.push(0x01);
			data.extend_from_slice(row);
			if let Some(last) = data.last_mut() {
				*last &= pad;
			}
			Packet::new(KIND_BITMAP_ROW, data)
				.map_err(|_| EncodeError::LineTooLong(width))
		})
		.collect::<Result<Vec<_>, _>>()?;

	Ok(EncodedImage {
		width,
		height,
		density,
		packets,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn alternating_row() {
		let bm = Bitmap::from_fn(8, 1, |x, _| x % 2 == 0);
		assert_eq!(bm.pixels(), &[0xaa]);

		let img = encode(&bm, 3).unwrap();
		assert_eq!(img.packets()[0].data(), &[0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xaa]);
	}

	#[test]
	fn two_pixel_line() {
		let bm = Bitmap::from_fn(2, 1, |_, _| true);
		let img = bm.encode(1).unwrap();
		assert_eq!(img.packets().len(), 1);

		let pkt = &img.packets()[0];
		assert_eq!(pkt.kind(), KIND_BITMAP_ROW);
		assert_eq!(pkt.data(), &[0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xc0]);

		let ck = 0x85 ^ 0x07 ^ 0x00 ^ 0x00 ^ 0x00 ^ 0x00 ^ 0x01 ^ 0xc0;
		assert_eq!(
			pkt.to_bytes(),
			vec![0x55, 0x55, 0x85, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xc0, ck, 0xaa, 0xaa],
		);
	}

	#[test]
	fn one_packet_per_line_in_order() {
		let bm = Bitmap::from_fn(20, 300, |x, y| (x + y) % 3 == 0);
		let img = bm.encode(2).unwrap();
		assert_eq!(img.width(), 20);
		assert_eq!(img.height(), 300);
		assert_eq!(img.density(), 2);
		assert_eq!(img.packets().len(), 300);

		for (i, pkt) in img.packets().iter().enumerate() {
			assert_eq!(pkt.kind(), 0x85);
			assert_eq!(pkt.data().len(), LINE_HEADER_LEN + 3);
			assert_eq!(u16::from_be_bytes([pkt.data()[0], pkt.data()[1]]) as usize, i);
			assert_eq!(&pkt.data()[2..6], &[0x00, 0x00, 0x00, 0x01]);
			assert_eq!(&pkt.data()[6..], bm.row(i as u32).unwrap());
		}
	}

	#[test]
	fn padding_is_masked() {
		// raw rows with garbage in the padding bits
		let bm = Bitmap::new(10, 2, vec![0xff, 0xff, 0x00, 0x7f]).unwrap();
		let img = bm.encode(1).unwrap();
		assert_eq!(&img.packets()[0].data()[6..], &[0xff, 0xc0]);
		assert_eq!(&img.packets()[1].data()[6..], &[0x00, 0x40]);
	}

	#[test]
	fn empty_image() {
		let bm = Bitmap::new(0, 5, Vec::new()).unwrap();
		assert_eq!(bm.encode(1), Err(EncodeError::InvalidImage { width: 0, height: 5 }));

		let bm = Bitmap::new(8, 0, Vec::new()).unwrap();
		assert_eq!(bm.encode(1), Err(EncodeError::InvalidImage { width: 8, height: 0 }));
	}

	#[test]
	fn line_too_long() {
		assert_eq!(MAX_WIDTH, 1992);

		let bm = Bitmap::from_fn(MAX_WIDTH, 1, |_, _| true);
		let img = bm.encode(1).unwrap();
		assert_eq!(img.packets()[0].data().len(), MAX_DATA_LEN);

		let bm = Bitmap::from_fn(MAX_WIDTH + 1, 1, |_, _| true);
		assert_eq!(bm.encode(1), Err(EncodeError::LineTooLong(MAX_WIDTH + 1)));
	}

	#[test]
	fn bitmap_len_mismatch() {
		assert_eq!(
			Bitmap::new(9, 3, vec![0u8; 5]).unwrap_err(),
			BitmapError::Len { expected: 6, actual: 5 },
		);
	}

	#[test]
	fn pixel_access() {
		let bm = Bitmap::from_fn(12, 2, |x, y| x == 11 && y == 1);
		assert_eq!(bm.get(11, 1), Some(true));
		assert_eq!(bm.get(10, 1), Some(false));
		assert_eq!(bm.get(12, 1), None);
		assert_eq!(bm.get(0, 2), None);
		assert_eq!(bm.row(1), Some(&[0x00, 0x10][..]));
	}

	#[test]
	fn threshold_reduction() {
		let img = GrayImage::from_raw(4, 1, vec![0x00, 0x7f, 0x80, 0xff]).unwrap();
		let bm = Bitmap::from_gray(&img, Reduction::Threshold(0x80));
		assert_eq!(bm.pixels(), &[0xc0]);
	}

	#[test]
	fn dither_keeps_solid_areas() {
		let mut img = GrayImage::from_pixel(16, 4, Luma([0xff]));
		for x in 0..8 {
			for y in 0..4 {
				img.put_pixel(x, y, Luma([0x00]));
			}
		}

		let bm = Bitmap::from_gray(&img, Reduction::Dither(0x80));
		for y in 0..4 {
			assert_eq!(bm.row(y), Some(&[0xff, 0x00][..]));
		}
	}
}
