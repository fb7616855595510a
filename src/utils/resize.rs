// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! RGB 图像缩放 (fast_image_resize 高性能库)

use anyhow::{anyhow, Result};
use fast_image_resize as fr;
use image::RgbImage;

/// 缩放 RGB 图像到指定尺寸 (双线性插值)
///
/// 尺寸相同时直接返回拷贝, 目标尺寸至少为 1x1.
pub fn resize_rgb(src: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    let (width, height) = (width.max(1), height.max(1));
    if src.dimensions() == (width, height) {
        return Ok(src.clone());
    }

    let src_image =
        fr::images::ImageRef::new(src.width(), src.height(), src.as_raw(), fr::PixelType::U8x3)?;
    let mut dst_image = fr::images::Image::new(width, height, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer.resize(
        &src_image,
        &mut dst_image,
        &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
    )?;

    RgbImage::from_raw(width, height, dst_image.into_vec())
        .ok_or_else(|| anyhow!("缩放结果尺寸不匹配 {}x{}", width, height))
}
