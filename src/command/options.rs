use std::str::FromStr;
use std::sync::Arc;

use crate::error::{MillError, MillResult};
use crate::sniff::ImageKind;

/// How a [`Geometry`] maps source dimensions onto the requested box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResizeMode {
    /// Largest size that fits inside the box, preserving aspect ratio.
    #[default]
    Fit,
    /// Exactly the requested dimensions, ignoring aspect ratio (`!`).
    Exact,
    /// Like `Fit`, but never enlarge the source (`>`).
    ShrinkOnly,
    /// Like `Fit`, but never shrink the source (`<`).
    EnlargeOnly,
}

/// Resize target parsed from the forms `WxH`, `WxH!`, `WxH>`, `WxH<`, `W`,
/// and `xH`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    /// Requested width in pixels; `None` derives it from the height.
    pub width: Option<u32>,
    /// Requested height in pixels; `None` derives it from the width.
    pub height: Option<u32>,
    /// Fitting behavior.
    pub mode: ResizeMode,
}

impl Geometry {
    /// Target dimensions for a `src_w x src_h` source, or `None` when this
    /// geometry leaves the source untouched.
    ///
    /// Derived dimensions round to the nearest pixel and never drop below 1.
    pub fn target_for(self, src_w: u32, src_h: u32) -> Option<(u32, u32)> {
        if src_w == 0 || src_h == 0 {
            return None;
        }
        let sw = f64::from(src_w);
        let sh = f64::from(src_h);
        let ratio = match (self.width, self.height) {
            (Some(w), Some(h)) => (f64::from(w) / sw).min(f64::from(h) / sh),
            (Some(w), None) => f64::from(w) / sw,
            (None, Some(h)) => f64::from(h) / sh,
            (None, None) => return None,
        };
        let fitted = (
            (sw * ratio).round().max(1.0) as u32,
            (sh * ratio).round().max(1.0) as u32,
        );
        match self.mode {
            ResizeMode::Fit => Some(fitted).filter(|&dims| dims != (src_w, src_h)),
            ResizeMode::Exact => {
                let dims = (self.width.unwrap_or(fitted.0), self.height.unwrap_or(fitted.1));
                Some(dims).filter(|&dims| dims != (src_w, src_h))
            }
            ResizeMode::ShrinkOnly => (ratio < 1.0).then_some(fitted),
            ResizeMode::EnlargeOnly => (ratio > 1.0).then_some(fitted),
        }
    }
}

impl FromStr for Geometry {
    type Err = MillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (body, mode) = match trimmed.as_bytes().last() {
            Some(b'!') => (&trimmed[..trimmed.len() - 1], ResizeMode::Exact),
            Some(b'>') => (&trimmed[..trimmed.len() - 1], ResizeMode::ShrinkOnly),
            Some(b'<') => (&trimmed[..trimmed.len() - 1], ResizeMode::EnlargeOnly),
            _ => (trimmed, ResizeMode::Fit),
        };
        let (w_part, h_part) = match body.split_once(['x', 'X']) {
            Some((w, h)) => (w, h),
            None => (body, ""),
        };
        let width = parse_dimension(s, w_part)?;
        let height = parse_dimension(s, h_part)?;
        if width.is_none() && height.is_none() {
            return Err(MillError::config(format!(
                "geometry '{s}' must request a width or a height"
            )));
        }
        Ok(Self { width, height, mode })
    }
}

fn parse_dimension(geometry: &str, part: &str) -> MillResult<Option<u32>> {
    if part.is_empty() {
        return Ok(None);
    }
    let value: u32 = part.parse().map_err(|_| {
        MillError::config(format!("geometry '{geometry}' has a bad dimension '{part}'"))
    })?;
    if value == 0 {
        return Err(MillError::config(format!(
            "geometry '{geometry}' requests a zero dimension"
        )));
    }
    Ok(Some(value))
}

/// Clockwise quarter-turn rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    /// 90 degrees clockwise.
    Cw90,
    /// 180 degrees.
    Cw180,
    /// 270 degrees clockwise.
    Cw270,
}

impl Rotation {
    /// Normalize a degree count to a quarter turn. Multiples of 360 are a
    /// no-op (`None`); negatives rotate counter-clockwise.
    pub fn from_degrees(degrees: i32) -> MillResult<Option<Self>> {
        match degrees.rem_euclid(360) {
            0 => Ok(None),
            90 => Ok(Some(Self::Cw90)),
            180 => Ok(Some(Self::Cw180)),
            270 => Ok(Some(Self::Cw270)),
            _ => Err(MillError::config(format!(
                "rotation must be a multiple of 90 degrees, got {degrees}"
            ))),
        }
    }
}

/// Anchor for overlay placement on the working image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Gravity {
    /// Top-left corner.
    #[default]
    NorthWest,
    /// Top edge, centered.
    North,
    /// Top-right corner.
    NorthEast,
    /// Left edge, centered.
    West,
    /// Dead center.
    Center,
    /// Right edge, centered.
    East,
    /// Bottom-left corner.
    SouthWest,
    /// Bottom edge, centered.
    South,
    /// Bottom-right corner.
    SouthEast,
}

impl Gravity {
    /// Top-left position for an `overlay` placed on a `base` canvas.
    ///
    /// Offsets measure inward from the anchored edges: an east or south
    /// anchor counts its x or y offset from the right or bottom edge, so
    /// `(+10, +10)` always pushes the overlay toward the middle.
    pub fn position(self, base: (u32, u32), overlay: (u32, u32), offset: (i64, i64)) -> (i64, i64) {
        let (bw, bh) = (i64::from(base.0), i64::from(base.1));
        let (ow, oh) = (i64::from(overlay.0), i64::from(overlay.1));
        let (dx, dy) = offset;
        let x = match self {
            Self::NorthWest | Self::West | Self::SouthWest => dx,
            Self::North | Self::Center | Self::South => (bw - ow) / 2 + dx,
            Self::NorthEast | Self::East | Self::SouthEast => bw - ow - dx,
        };
        let y = match self {
            Self::NorthWest | Self::North | Self::NorthEast => dy,
            Self::West | Self::Center | Self::East => (bh - oh) / 2 + dy,
            Self::SouthWest | Self::South | Self::SouthEast => bh - oh - dy,
        };
        (x, y)
    }
}

impl FromStr for Gravity {
    type Err = MillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "north_west" | "northwest" | "nw" => Ok(Self::NorthWest),
            "north" | "n" => Ok(Self::North),
            "north_east" | "northeast" | "ne" => Ok(Self::NorthEast),
            "west" | "w" => Ok(Self::West),
            "center" | "centre" | "c" => Ok(Self::Center),
            "east" | "e" => Ok(Self::East),
            "south_west" | "southwest" | "sw" => Ok(Self::SouthWest),
            "south" | "s" => Ok(Self::South),
            "south_east" | "southeast" | "se" => Ok(Self::SouthEast),
            other => Err(MillError::config(format!("unknown gravity '{other}'"))),
        }
    }
}

/// Parse a signed placement offset of the form `+X+Y`, e.g. `"+10+10"` or
/// `"-5+0"`.
pub fn parse_offset(s: &str) -> MillResult<(i64, i64)> {
    let trimmed = s.trim();
    let bad = || MillError::config(format!("offset '{s}' must look like '+X+Y'"));
    let bytes = trimmed.as_bytes();
    if bytes.first().is_none_or(|&b| b != b'+' && b != b'-') {
        return Err(bad());
    }
    let split = bytes
        .iter()
        .skip(1)
        .position(|&b| b == b'+' || b == b'-')
        .map(|i| i + 1)
        .ok_or_else(bad)?;
    let x = trimmed[..split].parse().map_err(|_| bad())?;
    let y = trimmed[split..].parse().map_err(|_| bad())?;
    Ok((x, y))
}

/// Options for a `convert` command: re-render the working image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Resize the image to this geometry.
    pub resize: Option<Geometry>,
    /// Rotate by a quarter turn.
    pub rotate: Option<Rotation>,
    /// Re-encode into this format instead of the detected source format.
    pub format: Option<ImageKind>,
}

/// Options for a `composite` command: overlay a secondary image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositeOptions {
    /// Encoded overlay bytes, loaded once when the configuration resolves
    /// and shared by every session.
    pub overlay: Arc<Vec<u8>>,
    /// Placement anchor.
    pub gravity: Gravity,
    /// Inward pixel offset from the anchor.
    pub offset: (i64, i64),
    /// Overlay opacity percent (0 to 100); `None` composites at full
    /// strength.
    pub dissolve: Option<u8>,
}
