#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod annotate; // 检测框绘制
pub mod config; // 命令行与运行参数
pub mod detection; // 人/车检测引擎
pub mod input; // 视频输入系统
pub mod ort_backend; // ONNX Runtime 推理后端
pub mod pipeline; // 采集循环 + 广播 + 状态
pub mod service; // 对外接口 (配置 / 状态 / 历史 / 视频流)
pub mod storage; // 检测记录持久化
pub mod utils; // 图像工具

pub use crate::config::{Args, MonitorConfig, SourceType};
pub use crate::detection::{BoundingBox, Bbox, DetectionCounts, DetectionEngine, Detections, Label};
pub use crate::input::{Frame, FrameSource, SourceConfig, SourceError, SourceKind};
pub use crate::ort_backend::OrtBackend;
pub use crate::pipeline::{Broadcaster, Delivery, SharedState, StateSnapshot, Subscription};
pub use crate::service::{ConfigureError, ConfigureRequest, Monitor, StatusReport};
pub use crate::storage::{DetectionStore, JsonlStore, LogEntry, MemoryStore, StoreError};

/// 非极大值抑制 (OpenCV NMSBoxes 语义)
///
/// 先丢弃 `confidence <= score_threshold` 的框, 按置信度降序保留与已保留框
/// IoU 不超过 `iou_threshold` 的框.
pub fn non_max_suppression(xs: &mut Vec<Bbox>, score_threshold: f32, iou_threshold: f32) {
    xs.retain(|b| b.confidence() > score_threshold);
    xs.sort_by(|b1, b2| b2.confidence().total_cmp(&b1.confidence()));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}
