// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测系统数据结构定义
/// Data structures for the detection system
use serde::Serialize;

/// 目标类别族 (人 / 车)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Person,
    Vehicle,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Person => "person",
            Label::Vehicle => "vehicle",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 浮点检测框, 仅在检测器内部使用 (NMS / 分组)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bbox {
    xmin: f32,
    ymin: f32,
    width: f32,
    height: f32,
    id: usize,
    confidence: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, width: f32, height: f32, id: usize, confidence: f32) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
            id,
            confidence,
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.ymin + self.height
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn intersection_area(&self, another: &Bbox) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = self.xmax().min(another.xmax());
        let t = self.ymin.max(another.ymin);
        let b = self.ymax().min(another.ymax());
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn union(&self, another: &Bbox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    pub fn iou(&self, another: &Bbox) -> f32 {
        let union = self.union(another);
        if union <= 0. {
            return 0.;
        }
        self.intersection_area(another) / union
    }
}

/// 检测框 (原始帧像素坐标, 左上角 + 宽高)
///
/// 构造时裁剪到 `[0, frame_width) × [0, frame_height)`, 宽高至少为 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub label: Label,
}

impl BoundingBox {
    /// 从 (可能越界的) 整数框构造, 完全落在画面外时返回 None
    pub fn clamped(
        label: Label,
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        if frame_width == 0 || frame_height == 0 || width <= 0 || height <= 0 {
            return None;
        }
        let (fw, fh) = (frame_width as i64, frame_height as i64);
        let x0 = x.clamp(0, fw - 1);
        let y0 = y.clamp(0, fh - 1);
        let x1 = (x + width).clamp(0, fw);
        let y1 = (y + height).clamp(0, fh);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
            label,
        })
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// 每个类别族的数量, 始终与同一次调用返回的框一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DetectionCounts {
    pub person: u32,
    pub vehicle: u32,
}

impl DetectionCounts {
    pub fn from_boxes(boxes: &[BoundingBox]) -> Self {
        let mut counts = Self::default();
        for b in boxes {
            match b.label {
                Label::Person => counts.person += 1,
                Label::Vehicle => counts.vehicle += 1,
            }
        }
        counts
    }
}

/// 单帧检测结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detections {
    pub boxes: Vec<BoundingBox>,
    pub counts: DetectionCounts,
}

impl Detections {
    pub fn new(boxes: Vec<BoundingBox>) -> Self {
        let counts = DetectionCounts::from_boxes(&boxes);
        Self { boxes, counts }
    }
}
