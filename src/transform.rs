//! Page geometry: fit-to-viewport scaling combined with quarter-turn rotation.
//!
//! Everything here is pure. Coefficients for the four rotation cases are
//! written out explicitly so that 0° is exactly the fit scale and repeated
//! rotation never accumulates floating error.

use std::fmt;

use kurbo::{Affine, Size};

use crate::error::{AppError, AppResult};

/// Resolution tier of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quality {
    #[default]
    Normal,
    Preview,
    PreviewLow,
}

impl Quality {
    pub fn scale_factor(self) -> f64 {
        match self {
            Self::Normal => 1.0,
            Self::Preview => 0.2,
            Self::PreviewLow => 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotateDirection {
    Clockwise,
    CounterClockwise,
}

impl RotateDirection {
    fn quarter_turns(self) -> u8 {
        match self {
            Self::Clockwise => 1,
            Self::CounterClockwise => 3,
        }
    }
}

/// Clockwise rotation in degrees, always one of 0, 90, 180 or 270.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rotation {
    quarter_turns: u8,
}

impl Rotation {
    pub const NONE: Self = Self { quarter_turns: 0 };

    pub fn from_degrees(degrees: i32) -> AppResult<Self> {
        if degrees % 90 != 0 {
            return Err(AppError::invalid_argument(format!(
                "rotation must be a multiple of 90 degrees, got {degrees}"
            )));
        }
        Ok(Self {
            quarter_turns: (degrees / 90).rem_euclid(4) as u8,
        })
    }

    pub fn degrees(self) -> u16 {
        u16::from(self.quarter_turns) * 90
    }

    /// Returns the rotation reached by turning once more in `direction`.
    pub fn rotated(self, direction: RotateDirection) -> Self {
        Self {
            quarter_turns: (self.quarter_turns + direction.quarter_turns()) % 4,
        }
    }

    /// Width and height trade places at 90° and 270°.
    pub fn swaps_axes(self) -> bool {
        self.quarter_turns % 2 == 1
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageTransform {
    affine: Affine,
    output: Size,
    rotation: Rotation,
    scale: f64,
}

impl PageTransform {
    /// Maps page space (origin top-left, y down) into a bitmap that fits
    /// `viewport` after the page has been turned by `rotation`.
    pub fn compute(
        page: Size,
        viewport: Size,
        rotation: Rotation,
        quality: Quality,
    ) -> AppResult<Self> {
        validate_size(page, "page")?;
        validate_size(viewport, "viewport")?;

        let rotated = if rotation.swaps_axes() {
            Size::new(page.height, page.width)
        } else {
            page
        };
        let scale = fit_scale(rotated, viewport) * quality.scale_factor();
        let (pw, ph) = (page.width, page.height);

        let coeffs = match rotation.quarter_turns {
            0 => [scale, 0.0, 0.0, scale, 0.0, 0.0],
            1 => [0.0, scale, -scale, 0.0, scale * ph, 0.0],
            2 => [-scale, 0.0, 0.0, -scale, scale * pw, scale * ph],
            _ => [0.0, -scale, scale, 0.0, 0.0, scale * pw],
        };

        Ok(Self {
            affine: Affine::new(coeffs),
            output: Size::new(rotated.width * scale, rotated.height * scale),
            rotation,
            scale,
        })
    }

    pub fn affine(&self) -> Affine {
        self.affine
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn output_size(&self) -> Size {
        self.output
    }

    /// Pixel dimensions of the target buffer, never zero.
    pub fn bitmap_size(&self) -> (u32, u32) {
        (
            self.output.width.round().max(1.0) as u32,
            self.output.height.round().max(1.0) as u32,
        )
    }

    /// True when the rotated page is at least as tall as it is wide.
    pub fn is_portrait(&self) -> bool {
        self.output.height >= self.output.width
    }
}

pub fn fit_scale(content: Size, viewport: Size) -> f64 {
    (viewport.width / content.width).min(viewport.height / content.height)
}

/// Recovers the quarter turn and uniform scale encoded in `affine`, if it is
/// one produced by [`PageTransform::compute`].
pub fn decompose(affine: Affine) -> Option<(Rotation, f64)> {
    let [a, b, c, d, _, _] = affine.as_coeffs();
    let quarter_turns = if b == 0.0 && c == 0.0 && a == d {
        if a > 0.0 { 0 } else { 2 }
    } else if a == 0.0 && d == 0.0 && b == -c {
        if b > 0.0 { 1 } else { 3 }
    } else {
        return None;
    };
    let scale = a.hypot(b);
    (scale.is_finite() && scale > 0.0).then_some((Rotation { quarter_turns }, scale))
}

fn validate_size(size: Size, what: &str) -> AppResult<()> {
    if !size.width.is_finite() || !size.height.is_finite() || size.width <= 0.0 || size.height <= 0.0
    {
        return Err(AppError::invalid_argument(format!(
            "{what} size must be positive and finite, got {}x{}",
            size.width, size.height
        )));
    }
    Ok(())
}
