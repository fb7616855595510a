// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 检测框绘制 + JPEG 编码

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::Rgb;
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detection::{BoundingBox, Label};
use crate::input::Frame;

const PERSON_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const VEHICLE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 18.0;

/// 内置标签字体
static DEFAULT_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

pub fn label_color(label: Label) -> Rgb<u8> {
    match label {
        Label::Person => PERSON_COLOR,
        Label::Vehicle => VEHICLE_COLOR,
    }
}

/// 标注器: 纯函数, 不修改输入帧
#[derive(Clone)]
pub struct Annotator {
    font: Option<FontArc>,
    scale: f32,
}

impl Annotator {
    /// 使用内置字体绘制标签
    pub fn new() -> Self {
        match FontArc::try_from_slice(DEFAULT_FONT) {
            Ok(font) => Self::with_font(font, LABEL_SCALE),
            Err(e) => {
                tracing::warn!("内置字体无效, 只绘制检测框: {}", e);
                Self::boxes_only()
            }
        }
    }

    /// 不画标签, 只画框
    pub fn boxes_only() -> Self {
        Self {
            font: None,
            scale: LABEL_SCALE,
        }
    }

    pub fn with_font(font: FontArc, scale: f32) -> Self {
        Self {
            font: Some(font),
            scale,
        }
    }

    /// 加载字体文件 (ttf / otf)
    pub fn with_font_file(path: &Path, scale: f32) -> Result<Self> {
        let data = std::fs::read(path).with_context(|| format!("无法读取字体 {}", path.display()))?;
        let font = FontArc::try_from_vec(data).context("字体格式错误")?;
        Ok(Self::with_font(font, scale))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 在帧的副本上绘制检测框 (2px) 和类别名
    pub fn draw(&self, frame: &Frame, boxes: &[BoundingBox]) -> Frame {
        let mut canvas = frame.clone();
        if canvas.width() == 0 || canvas.height() == 0 {
            return canvas;
        }

        for b in boxes {
            let color = label_color(b.label);
            for t in 0..THICKNESS {
                let w = b.width as i32 - 2 * t;
                let h = b.height as i32 - 2 * t;
                if w <= 0 || h <= 0 {
                    break;
                }
                let rect = Rect::at(b.x as i32 + t, b.y as i32 + t).of_size(w as u32, h as u32);
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }

            if let Some(font) = &self.font {
                let text = b.label.as_str();
                let scale = PxScale::from(self.scale);
                let (_, th) = text_size(scale, font, text);
                let y = b.y as i32 - 5 - th as i32;
                draw_text_mut(&mut canvas, color, b.x as i32, y.max(0), scale, font, text);
            }
        }
        canvas
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

/// 编码为 JPEG
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Bytes> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(frame)
        .context("JPEG编码失败")?;
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::from_fn(80, 60, |x, y| Rgb([(x * 3) as u8, (y * 4) as u8, 50]))
    }

    #[test]
    fn test_no_boxes_identical() {
        let f = frame();
        let out = Annotator::new().draw(&f, &[]);
        assert_eq!(out, f);
    }

    #[test]
    fn test_draw_is_pure_and_deterministic() {
        let f = frame();
        let boxes = [
            BoundingBox::clamped(Label::Person, 5, 5, 20, 30, 80, 60).unwrap(),
            BoundingBox::clamped(Label::Vehicle, 40, 10, 30, 20, 80, 60).unwrap(),
        ];
        let annotator = Annotator::new();
        let a = annotator.draw(&f, &boxes);
        let b = annotator.draw(&f, &boxes);
        assert_eq!(a, b);
        assert_eq!(f, frame());
        assert_ne!(a, f);
    }

    #[test]
    fn test_colors_by_label() {
        let f = Frame::new(50, 50);
        let boxes = [
            BoundingBox::clamped(Label::Person, 2, 2, 10, 10, 50, 50).unwrap(),
            BoundingBox::clamped(Label::Vehicle, 20, 20, 10, 10, 50, 50).unwrap(),
        ];
        let out = Annotator::boxes_only().draw(&f, &boxes);
        assert_eq!(*out.get_pixel(2, 2), PERSON_COLOR);
        assert_eq!(*out.get_pixel(3, 3), PERSON_COLOR);
        assert_eq!(*out.get_pixel(20, 25), VEHICLE_COLOR);
        // 框内部不变
        assert_eq!(*out.get_pixel(7, 7), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_label_drawn_above_box() {
        let f = Frame::new(120, 100);
        let boxes = [BoundingBox::clamped(Label::Vehicle, 20, 50, 60, 40, 120, 100).unwrap()];
        let annotator = Annotator::new();
        assert!(annotator.has_font());

        let out = annotator.draw(&f, &boxes);
        // 框上方的标签区域里有文字像素, 框本身之外的其他区域不变
        let label_pixels = (20..80)
            .flat_map(|x| (20..45).map(move |y| (x, y)))
            .filter(|&(x, y)| out.get_pixel(x, y).0 != [0, 0, 0])
            .count();
        assert!(label_pixels > 0);
        assert_eq!(*out.get_pixel(100, 10), Rgb([0, 0, 0]));

        let bare = Annotator::boxes_only().draw(&f, &boxes);
        assert!((20..80).all(|x| (20..45).all(|y| *bare.get_pixel(x, y) == Rgb([0, 0, 0]))));
    }

    #[test]
    fn test_encode_jpeg() {
        let jpeg = encode_jpeg(&frame(), 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (80, 60));
    }
}
