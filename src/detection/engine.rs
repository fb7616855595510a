// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::Path;

use tracing::warn;

use super::hog::{HogParams, PeopleDetector};
use super::types::{BoundingBox, Detections};
use super::vehicle::{VehicleDetector, VehicleDetectorConfig};
use super::Capability;
use crate::input::Frame;

/// 检测引擎: 行人 + 车辆
///
/// 模型在构造时加载一次; 缺失的模型对应的检测器永久禁用, 调用时返回空结果.
#[derive(Debug)]
pub struct DetectionEngine {
    people: Capability,
    vehicles: Capability,
}

impl DetectionEngine {
    pub fn new(people: Capability, vehicles: Capability) -> Self {
        Self { people, vehicles }
    }

    /// 从模型目录加载 (`hog_people.svm` 或内置系数, `yolov3-tiny.onnx`, `coco.names`)
    pub fn load(model_dir: &Path, hog: HogParams, vehicle: VehicleDetectorConfig) -> Self {
        let people = Capability::from_load("行人", PeopleDetector::load(model_dir, hog));
        let vehicles = Capability::from_load("车辆", VehicleDetector::load(model_dir, vehicle));
        Self::new(people, vehicles)
    }

    pub fn people_available(&self) -> bool {
        self.people.is_ready()
    }

    pub fn vehicles_available(&self) -> bool {
        self.vehicles.is_ready()
    }

    /// 检测一帧; 未开启或不可用的检测器不会被调用
    ///
    /// 单个检测器出错只记录警告, 该类别按 0 计.
    pub fn detect(
        &mut self,
        frame: &Frame,
        detect_people: bool,
        detect_vehicles: bool,
    ) -> Detections {
        let mut boxes: Vec<BoundingBox> = Vec::new();

        if detect_people {
            if let Capability::Ready(d) = &mut self.people {
                match d.detect(frame) {
                    Ok(found) => boxes.extend(found),
                    Err(e) => warn!("行人检测失败: {:#}", e),
                }
            }
        }

        if detect_vehicles {
            if let Capability::Ready(d) = &mut self.vehicles {
                match d.detect(frame) {
                    Ok(found) => boxes.extend(found),
                    Err(e) => warn!("车辆检测失败: {:#}", e),
                }
            }
        }

        Detections::new(boxes)
    }
}
