use std::{fmt::{self, Display, Formatter}, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CapabilityError {
	#[error("{name} can't support requested density {density}, use any of 1-{max}")]
	DensityUnsupported { name: &'static str, density: u8, max: u8 },

	#[error("image is too wide for {name}, it supports only {max}px wide (got {width}px)")]
	WidthUnsupported { name: &'static str, width: u32, max: u32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown printer model: {0:?}")]
pub struct ParseModelError(String);

/// Static printing capabilities of a printer model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
	pub name: &'static str,
	pub max_density: u8,
	pub max_width: u32,
}

impl DeviceProfile {
	/// Check whether an image `width` pixels wide can be printed with `density`.
	///
	/// Valid densities are `1..=max_density`.
	/// The density is checked first, only the first failure is reported.
	pub fn validate(&self, density: u8, width: u32) -> Result<(), CapabilityError> {
		if density == 0 || density > self.max_density {
			return Err(CapabilityError::DensityUnsupported {
				name: self.name,
				density,
				max: self.max_density,
			});
		}

		if width > self.max_width {
			return Err(CapabilityError::WidthUnsupported {
				name: self.name,
				width,
				max: self.max_width,
			});
		}

		Ok(())
	}
}

/// Supported printer models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
	D11,
	D110,
	B1,
	B18,
	B21,
}

const D11: DeviceProfile = DeviceProfile { name: "D11", max_density: 3, max_width: 96 };
const D110: DeviceProfile = DeviceProfile { name: "D110", max_density: 3, max_width: 96 };
const B1: DeviceProfile = DeviceProfile { name: "B1", max_density: 5, max_width: 384 };
const B18: DeviceProfile = DeviceProfile { name: "B18", max_density: 3, max_width: 384 };
const B21: DeviceProfile = DeviceProfile { name: "B21", max_density: 5, max_width: 384 };

impl Model {
	pub const ALL: [Model; 5] = [Self::D11, Self::D110, Self::B1, Self::B18, Self::B21];

	pub const fn profile(self) -> &'static DeviceProfile {
		match self {
			Self::D11 => &D11,
			Self::D110 => &D110,
			Self::B1 => &B1,
			Self::B18 => &B18,
			Self::B21 => &B21,
		}
	}

	pub const fn name(self) -> &'static str {
		self.profile().name
	}

	/// Shorthand for [`DeviceProfile::validate()`].
	pub fn validate(self, density: u8, width: u32) -> Result<(), CapabilityError> {
		self.profile().validate(density, width)
	}
}

impl Display for Model {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for Model {
	type Err = ParseModelError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|m| m.name().eq_ignore_ascii_case(s))
			.ok_or_else(|| ParseModelError(s.to_owned()))
	}
}
