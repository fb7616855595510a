// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::detection::{HogParams, VehicleDetectorConfig};
use crate::service::ConfigureRequest;

/// 输入源类型 (表单取值 `camera` / `video`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Camera,
    #[default]
    Video,
}

/// 实时人车监控参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "实时人车监控 - 行人/车辆计数与报警", long_about = None)]
pub struct Args {
    /// 输入源类型
    #[arg(long, value_enum, default_value_t = SourceType::Video)]
    pub source: SourceType,

    /// 视频文件路径
    #[arg(long, default_value = "people.mp4")]
    pub video_path: String,

    /// 摄像头索引
    #[arg(long, default_value = "0")]
    pub camera_index: String,

    /// 行人检测
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub people: bool,

    /// 车辆检测
    #[arg(long, action = ArgAction::Set, default_value_t = false)]
    pub vehicles: bool,

    /// 模型目录 (hog_people.svm, yolov3-tiny.onnx, coco.names)
    #[arg(long, default_value = "models")]
    pub model_dir: PathBuf,

    /// 行人检测前的最大宽度
    #[arg(long, default_value_t = 800)]
    pub hog_max_width: u32,

    /// JPEG 质量
    #[arg(long, default_value_t = 80)]
    pub jpeg_quality: u8,

    /// 标签字体 (ttf), 不指定时使用内置字体
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// 检测记录最小间隔 (秒)
    #[arg(long, default_value = "5", value_parser = parse_seconds)]
    pub log_interval: Duration,

    /// 检测记录文件 (JSON-lines)
    #[arg(long, default_value = "instance/detections.jsonl")]
    pub history: PathBuf,

    /// 读帧超时 (毫秒)
    #[arg(long, default_value_t = 5000)]
    pub read_timeout_ms: u64,

    /// 状态打印间隔 (秒)
    #[arg(long, default_value_t = 1)]
    pub status_every: u64,

    /// 运行时长 (秒), 不指定则一直运行
    #[arg(long)]
    pub duration: Option<u64>,

    /// 将 MJPEG 流写入文件
    #[arg(long)]
    pub mjpeg_out: Option<PathBuf>,
}

/// 秒数 (可带小数) → Duration; 负数、NaN 和溢出值报错
fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.trim().parse().map_err(|e| format!("{}: {}", s, e))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{}: {}", s, e))
}

/// 监控服务运行参数
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub model_dir: PathBuf,
    pub hog: HogParams,
    pub vehicle: VehicleDetectorConfig,
    pub jpeg_quality: u8,
    pub font: Option<PathBuf>,
    pub log_interval: Duration,
    pub read_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            hog: HogParams::default(),
            vehicle: VehicleDetectorConfig::default(),
            jpeg_quality: 80,
            font: None,
            log_interval: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
        }
    }
}

impl Args {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            model_dir: self.model_dir.clone(),
            hog: HogParams {
                max_width: self.hog_max_width,
                ..HogParams::default()
            },
            vehicle: VehicleDetectorConfig::default(),
            jpeg_quality: self.jpeg_quality,
            font: self.font.clone(),
            log_interval: self.log_interval,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }

    /// 启动时应用的输入源配置
    pub fn configure_request(&self) -> ConfigureRequest {
        ConfigureRequest {
            source_type: self.source,
            video_path: self.video_path.clone(),
            camera_index: self.camera_index.clone(),
            detect_people: self.people,
            detect_vehicles: self.vehicles,
        }
    }
}
