// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 车辆检测: YOLO (darknet 导出的 ONNX), 只保留车辆类别

use std::path::Path;

use anyhow::{bail, Context, Result};
use image::RgbImage;
use ndarray::Array4;

use super::types::{Bbox, BoundingBox, Label};
use super::{Detect, ModelError};
use crate::utils::resize_rgb;
use crate::{non_max_suppression, OrtBackend};

/// 视为车辆的类别名 (`motorcycle` 为 COCO 新版命名)
pub static VEHICLE_CLASSES: phf::Set<&'static str> = phf::phf_set! {
    "car",
    "bus",
    "truck",
    "motorbike",
    "motorcycle",
};

pub const MODEL_FILE: &str = "yolov3-tiny.onnx";
pub const NAMES_FILE: &str = "coco.names";

/// 车辆检测阈值
#[derive(Debug, Clone)]
pub struct VehicleDetectorConfig {
    pub input_size: u32,
    pub conf: f32,
    pub nms_score: f32,
    pub iou: f32,
}

impl Default for VehicleDetectorConfig {
    fn default() -> Self {
        Self {
            input_size: 416,
            conf: 0.5,
            nms_score: 0.5,
            iou: 0.4,
        }
    }
}

pub struct VehicleDetector {
    engine: OrtBackend,
    names: Vec<String>,
    config: VehicleDetectorConfig,
}

impl VehicleDetector {
    /// 从模型目录加载 `yolov3-tiny.onnx` + `coco.names`
    pub fn load(model_dir: &Path, config: VehicleDetectorConfig) -> Result<Self, ModelError> {
        let model = model_dir.join(MODEL_FILE);
        let names_path = model_dir.join(NAMES_FILE);
        for p in [&model, &names_path] {
            if !p.exists() {
                return Err(ModelError::Missing(p.clone()));
            }
        }

        let names = std::fs::read_to_string(&names_path)
            .map_err(|e| ModelError::Load(format!("{}: {}", names_path.display(), e)))?;
        let names = parse_names(&names);
        if names.is_empty() {
            return Err(ModelError::Invalid(format!("{} 为空", names_path.display())));
        }

        let engine = OrtBackend::build(&model, (config.input_size, config.input_size))
            .map_err(|e| ModelError::Load(format!("{:#}", e)))?;

        Ok(Self {
            engine,
            names,
            config,
        })
    }

    /// 缩放到网络输入尺寸 (不保持比例), NCHW, 归一化到 [0, 1]
    fn preprocess(&self, frame: &RgbImage) -> Result<Array4<f32>> {
        let (w, h) = (self.engine.width(), self.engine.height());
        let img = resize_rgb(frame, w, h)?;
        let mut xs = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
        for (x, y, px) in img.enumerate_pixels() {
            for c in 0..3 {
                xs[[0, c, y as usize, x as usize]] = px[c] as f32 / 255.0;
            }
        }
        Ok(xs)
    }

    pub fn detect_vehicles(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>> {
        let xs = self.preprocess(frame)?;
        let ys = self.engine.run(xs)?;

        // darknet 导出的模型每个检测头一个输出
        let mut heads = Vec::with_capacity(ys.len());
        for y in &ys {
            let stride = match y.shape().last() {
                Some(&s) if s > 5 => s,
                _ => bail!("YOLO输出形状异常: {:?}", y.shape()),
            };
            let data = y.as_slice().context("YOLO输出内存不连续")?;
            heads.push((data, stride));
        }
        Ok(decode_predictions(
            &heads,
            &self.names,
            frame.width(),
            frame.height(),
            &self.config,
        ))
    }
}

impl Detect for VehicleDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>> {
        self.detect_vehicles(frame)
    }
}

/// 每行一个类别名, 忽略空行
pub fn parse_names(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// 解码 YOLO 输出行 `[cx, cy, w, h, obj, scores...]` (坐标相对输入归一化)
///
/// `heads` 为各检测头的 (数据, 行宽). 所有头的候选框合并后统一做一次 NMS,
/// 取最高类别分数, 过滤置信度与车辆类别, 换算为原始帧左上角坐标.
pub fn decode_predictions(
    heads: &[(&[f32], usize)],
    names: &[String],
    frame_width: u32,
    frame_height: u32,
    config: &VehicleDetectorConfig,
) -> Vec<BoundingBox> {
    let mut candidates: Vec<Bbox> = Vec::new();
    for &(data, stride) in heads {
        if stride > 5 {
            let frame = (frame_width, frame_height);
            collect_candidates(data, stride, names, frame, config, &mut candidates);
        }
    }

    non_max_suppression(&mut candidates, config.nms_score, config.iou);

    candidates
        .iter()
        .filter_map(|b| {
            BoundingBox::clamped(
                Label::Vehicle,
                b.xmin() as i64,
                b.ymin() as i64,
                b.width() as i64,
                b.height() as i64,
                frame_width,
                frame_height,
            )
        })
        .collect()
}

fn collect_candidates(
    data: &[f32],
    stride: usize,
    names: &[String],
    (frame_width, frame_height): (u32, u32),
    config: &VehicleDetectorConfig,
    candidates: &mut Vec<Bbox>,
) {
    let (fw, fh) = (frame_width as f32, frame_height as f32);
    for row in data.chunks_exact(stride) {
        let scores = &row[5..];
        let (class_id, &confidence) = match scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
        {
            Some(best) => best,
            None => continue,
        };
        if confidence <= config.conf {
            continue;
        }
        match names.get(class_id) {
            Some(name) if VEHICLE_CLASSES.contains(name.as_str()) => {}
            _ => continue,
        }

        let center_x = (row[0] * fw) as i64;
        let center_y = (row[1] * fh) as i64;
        let w = (row[2] * fw) as i64;
        let h = (row[3] * fh) as i64;
        let x = (center_x as f32 - w as f32 / 2.0) as i64;
        let y = (center_y as f32 - h as f32 / 2.0) as i64;
        candidates.push(Bbox::new(
            x as f32,
            y as f32,
            w as f32,
            h as f32,
            class_id,
            confidence,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        parse_names("person\nbicycle\ncar\nmotorbike\naeroplane\nbus\n\ntrain\ntruck\n")
    }

    /// 构造一行预测: 8 个类别
    fn row(cx: f32, cy: f32, w: f32, h: f32, class_id: usize, score: f32) -> Vec<f32> {
        let mut r = vec![cx, cy, w, h, 1.0];
        let mut scores = vec![0.0; 8];
        scores[class_id] = score;
        r.extend(scores);
        r
    }

    /// 单输出头解码
    fn decode_single(data: &[f32], frame_width: u32, frame_height: u32) -> Vec<BoundingBox> {
        let config = VehicleDetectorConfig::default();
        decode_predictions(&[(data, 13)], &names(), frame_width, frame_height, &config)
    }

    #[test]
    fn test_vehicle_classes() {
        for name in ["car", "bus", "truck", "motorbike", "motorcycle"] {
            assert!(VEHICLE_CLASSES.contains(name));
        }
        assert!(!VEHICLE_CLASSES.contains("person"));
        assert!(!VEHICLE_CLASSES.contains("bicycle"));
        assert!(!VEHICLE_CLASSES.contains("train"));
    }

    #[test]
    fn test_non_vehicle_never_returned() {
        let mut data = row(0.5, 0.5, 0.2, 0.2, 0, 0.99); // person
        data.extend(row(0.2, 0.2, 0.1, 0.1, 1, 0.95)); // bicycle
        data.extend(row(0.8, 0.8, 0.1, 0.1, 6, 0.95)); // train
        let boxes = decode_single(&data, 640, 480);
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_confidence_threshold() {
        let mut data = row(0.5, 0.5, 0.2, 0.2, 2, 0.5);
        data.extend(row(0.2, 0.2, 0.1, 0.1, 5, 0.51));
        let boxes = decode_single(&data, 640, 480);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].label, Label::Vehicle);
    }

    #[test]
    fn test_center_to_corner() {
        let data = row(0.5, 0.5, 0.25, 0.5, 2, 0.9);
        let boxes = decode_single(&data, 640, 480);
        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        // center (320, 240), size (160, 240)
        assert_eq!((b.x, b.y, b.width, b.height), (240, 120, 160, 240));
    }

    #[test]
    fn test_overlapping_vehicles_suppressed() {
        let mut data = row(0.5, 0.5, 0.3, 0.3, 2, 0.7);
        data.extend(row(0.51, 0.5, 0.3, 0.3, 7, 0.9));
        data.extend(row(0.1, 0.1, 0.1, 0.1, 3, 0.8));
        let boxes = decode_single(&data, 1000, 1000);
        assert_eq!(boxes.len(), 2);
        assert!(boxes.iter().all(|b| b.label == Label::Vehicle));
        // 高分框保留
        assert_eq!(boxes[0].x, 360);
    }

    #[test]
    fn test_boxes_clamped_to_frame() {
        let data = row(0.98, 0.02, 0.3, 0.3, 7, 0.9);
        let boxes = decode_single(&data, 200, 100);
        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        assert!(b.right() <= 200 && b.bottom() <= 100);
        assert_eq!(b.y, 0);
    }

    #[test]
    fn test_every_output_head_decoded() {
        // 13x13 头上的大车 + 26x26 头上的小车, 两个头的重复框只保留一个
        let mut coarse = row(0.3, 0.3, 0.4, 0.4, 5, 0.8);
        coarse.extend(row(0.8, 0.8, 0.05, 0.05, 2, 0.6));
        let fine = row(0.8, 0.8, 0.05, 0.05, 2, 0.9);
        let heads = [(coarse.as_slice(), 13), (fine.as_slice(), 13)];
        let boxes = decode_predictions(&heads, &names(), 1000, 1000, &Default::default());
        assert_eq!(boxes.len(), 2);
        assert_eq!((boxes[0].x, boxes[0].y), (775, 775));
        assert_eq!(boxes[1].x, 100);

        let boxes = decode_predictions(&heads[1..], &names(), 1000, 1000, &Default::default());
        assert_eq!(boxes.len(), 1);
    }

    #[test]
    fn test_missing_assets() {
        let dir = tempfile::tempdir().unwrap();
        let err = VehicleDetector::load(dir.path(), Default::default()).err().unwrap();
        assert!(matches!(err, ModelError::Missing(_)));
    }
}
