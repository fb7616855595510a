// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测系统 (Detection System)
///
/// 由采集线程独占调用
/// - PeopleDetector:  HOG + 线性SVM 行人检测
/// - VehicleDetector: YOLO (ONNX) 车辆检测
/// - DetectionEngine: 按开关组合两个检测器
pub mod engine;
pub mod hog;
pub mod types;
pub mod vehicle;

use std::path::PathBuf;

pub use engine::DetectionEngine;
pub use hog::{HogParams, LinearSvm, PeopleDetector};
pub use types::{Bbox, BoundingBox, DetectionCounts, Detections, Label};
pub use vehicle::{VehicleDetector, VehicleDetectorConfig, VEHICLE_CLASSES};

use crate::input::Frame;

/// 单个检测器接口
pub trait Detect: Send {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Vec<BoundingBox>>;
}

/// 模型加载错误
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("模型文件不存在: {}", .0.display())]
    Missing(PathBuf),
    #[error("模型加载失败: {0}")]
    Load(String),
    #[error("模型文件格式错误: {0}")]
    Invalid(String),
}

/// 检测能力, 构造时一次性决定, 运行期间不再重试加载
pub enum Capability {
    Ready(Box<dyn Detect>),
    Unavailable(String),
}

impl Capability {
    /// 加载结果 → 能力; 失败时记录一次日志
    pub fn from_load<D, E>(name: &str, loaded: Result<D, E>) -> Self
    where
        D: Detect + 'static,
        E: std::fmt::Display,
    {
        match loaded {
            Ok(d) => {
                tracing::info!("{} 检测器已加载", name);
                Capability::Ready(Box::new(d))
            }
            Err(e) => {
                tracing::warn!("{} 检测器不可用, 已禁用: {}", name, e);
                Capability::Unavailable(e.to_string())
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Capability::Ready(_))
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Ready(_) => f.write_str("Ready"),
            Capability::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}
