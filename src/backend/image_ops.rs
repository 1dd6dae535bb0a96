use fast_image_resize as fr;
use image::{RgbaImage, imageops};

use crate::backend::RgbaFrame;
use crate::error::{AppError, AppResult};
use crate::transform::Rotation;

pub(crate) const SIMD_RESIZE_FILTER: fr::FilterType = fr::FilterType::CatmullRom;

pub(crate) fn frame_to_image(frame: RgbaFrame) -> AppResult<RgbaImage> {
    RgbaImage::from_raw(frame.width, frame.height, frame.pixels_to_vec()).ok_or(
        AppError::invalid_argument("rgba frame pixels length does not match dimensions"),
    )
}

pub(crate) fn image_to_frame(image: RgbaImage) -> RgbaFrame {
    RgbaFrame {
        width: image.width(),
        height: image.height(),
        pixels: image.into_raw().into(),
    }
}

/// Turns `image` clockwise by `rotation`.
pub(crate) fn rotate_image(image: RgbaImage, rotation: Rotation) -> RgbaImage {
    match rotation.degrees() {
        90 => imageops::rotate90(&image),
        180 => imageops::rotate180(&image),
        270 => imageops::rotate270(&image),
        _ => image,
    }
}

pub(crate) fn rotate_frame(frame: RgbaFrame, rotation: Rotation) -> AppResult<RgbaFrame> {
    if rotation == Rotation::NONE {
        return Ok(frame);
    }
    let image = frame_to_image(frame)?;
    Ok(image_to_frame(rotate_image(image, rotation)))
}

pub(crate) fn resize_frame_simd(
    frame: RgbaFrame,
    dst_width: u32,
    dst_height: u32,
) -> AppResult<RgbaFrame> {
    if frame.width == dst_width && frame.height == dst_height {
        return Ok(frame);
    }
    if dst_width == 0 || dst_height == 0 {
        return Err(AppError::invalid_argument("resize target must have non-zero dimensions"));
    }

    let src = fr::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.pixels_to_vec(),
        fr::PixelType::U8x4,
    )
    .map_err(|_| {
        AppError::invalid_argument("rgba frame pixels length does not match dimensions")
    })?;

    let mut dst = fr::images::Image::new(dst_width, dst_height, fr::PixelType::U8x4);
    let mut resizer = fr::Resizer::new();
    let options =
        fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(SIMD_RESIZE_FILTER));

    resizer
        .resize(&src, &mut dst, &options)
        .map_err(|_| AppError::unsupported("failed to resize frame with SIMD"))?;

    Ok(RgbaFrame {
        width: dst_width,
        height: dst_height,
        pixels: dst.into_vec().into(),
    })
}
