// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 对外接口: 配置输入源 / 状态查询 / 历史记录 / 视频流

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::annotate::Annotator;
use crate::config::{MonitorConfig, SourceType};
use crate::detection::DetectionEngine;
use crate::input::{SourceConfig, SourceError, SourceKind, SourceOpener};
use crate::pipeline::{
    LoopOutputs, SharedState, SourceConfigurator, Subscription, ThrottledLogger,
    STREAM_CONTENT_TYPE,
};
use crate::storage::{DetectionStore, LogEntry};

pub const NO_STREAM_MESSAGE: &str = "Stream yok. Lütfen önce bir kaynak seçin.";
pub const INACTIVE_SOURCE_ALARM: &str = "Video / kamera kaynağı aktif değil.";
pub const DEFAULT_VIDEO_PATH: &str = "people.mp4";
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// 输入源配置请求 (表单字段)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigureRequest {
    pub source_type: SourceType,
    pub video_path: String,
    pub camera_index: String,
    pub detect_people: bool,
    pub detect_vehicles: bool,
}

impl Default for ConfigureRequest {
    fn default() -> Self {
        Self {
            source_type: SourceType::Video,
            video_path: DEFAULT_VIDEO_PATH.to_string(),
            camera_index: "0".to_string(),
            detect_people: true,
            detect_vehicles: false,
        }
    }
}

impl ConfigureRequest {
    /// 解析表单: 未知类型按视频处理, 复选框取值 `on` 为开启
    pub fn from_form<'a>(fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut req = Self {
            video_path: String::new(),
            detect_people: false,
            ..Self::default()
        };
        for (key, value) in fields {
            match key {
                "source_type" => {
                    req.source_type = if value == "camera" {
                        SourceType::Camera
                    } else {
                        SourceType::Video
                    }
                }
                "video_path" => req.video_path = value.to_string(),
                "camera_index" => req.camera_index = value.to_string(),
                "detect_people" => req.detect_people = value == "on",
                "detect_vehicles" => req.detect_vehicles = value == "on",
                _ => {}
            }
        }
        req.normalized()
    }

    /// 空路径回退到默认视频
    pub fn normalized(mut self) -> Self {
        let path = self.video_path.trim();
        self.video_path = if path.is_empty() {
            DEFAULT_VIDEO_PATH.to_string()
        } else {
            path.to_string()
        };
        self
    }

    pub fn to_source_config(&self) -> Result<SourceConfig, ConfigureError> {
        let kind = match self.source_type {
            SourceType::Camera => {
                let index = self.camera_index.trim().parse::<u32>().map_err(|e| {
                    ConfigureError::SourceUnavailable {
                        cause: format!("camera index {:?}: {}", self.camera_index, e),
                    }
                })?;
                SourceKind::Device(index)
            }
            SourceType::Video => {
                let path = self.video_path.trim();
                let path = if path.is_empty() { DEFAULT_VIDEO_PATH } else { path };
                SourceKind::File(PathBuf::from(path))
            }
        };
        Ok(SourceConfig {
            kind,
            detect_people: self.detect_people,
            detect_vehicles: self.detect_vehicles,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigureError {
    #[error("Video / kamera açılamadı: {cause}")]
    SourceUnavailable { cause: String },
}

impl From<SourceError> for ConfigureError {
    fn from(e: SourceError) -> Self {
        ConfigureError::SourceUnavailable {
            cause: e.to_string(),
        }
    }
}

/// 状态查询结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub person_count: u32,
    pub vehicle_count: u32,
    pub alarm: Option<String>,
}

/// 视频流请求结果
pub enum StreamResponse {
    Stream {
        content_type: &'static str,
        subscription: Subscription,
    },
    NoStream {
        message: &'static str,
    },
}

/// 监控服务: 持有采集循环, 向外提供查询
pub struct Monitor {
    configurator: SourceConfigurator,
    store: Arc<dyn DetectionStore>,
    last_request: Mutex<ConfigureRequest>,
}

impl Monitor {
    pub fn new(
        opener: Arc<dyn SourceOpener>,
        engine: DetectionEngine,
        store: Arc<dyn DetectionStore>,
        config: &MonitorConfig,
    ) -> Self {
        let annotator = match &config.font {
            Some(path) => Annotator::with_font_file(path, 18.0).unwrap_or_else(|e| {
                warn!("字体加载失败, 使用内置字体: {:#}", e);
                Annotator::new()
            }),
            None => Annotator::new(),
        };
        let outputs = LoopOutputs {
            state: SharedState::new(),
            logger: Arc::new(ThrottledLogger::new(store.clone(), config.log_interval)),
            annotator,
            jpeg_quality: config.jpeg_quality,
        };
        Self {
            configurator: SourceConfigurator::new(opener, engine, outputs),
            store,
            last_request: Mutex::new(ConfigureRequest::default()),
        }
    }

    /// 切换输入源; 失败时没有活动的输入源
    pub fn configure(&self, request: ConfigureRequest) -> Result<(), ConfigureError> {
        let request = request.normalized();
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = request.clone();

        let config = match request.to_source_config() {
            Ok(c) => c,
            Err(e) => {
                self.configurator.shutdown();
                self.configurator.outputs().state.clear();
                warn!("{}", e);
                return Err(e);
            }
        };

        match self.configurator.configure(config) {
            Ok(()) => {
                info!("✅ 输入源配置完成: {:?}", request);
                Ok(())
            }
            Err(e) => {
                let e = ConfigureError::from(e);
                warn!("{}", e);
                Err(e)
            }
        }
    }

    /// 最近一次请求的配置 (包括失败的)
    pub fn current_request(&self) -> ConfigureRequest {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_active(&self) -> bool {
        self.configurator.is_active()
    }

    /// 只读共享快照, 不等待正在进行的输入源切换
    pub fn status(&self) -> StatusReport {
        let snapshot = self.configurator.outputs().state.read();
        if !snapshot.active {
            return StatusReport {
                person_count: 0,
                vehicle_count: 0,
                alarm: Some(INACTIVE_SOURCE_ALARM.to_string()),
            };
        }
        StatusReport {
            person_count: snapshot.person_count,
            vehicle_count: snapshot.vehicle_count,
            alarm: snapshot.alarms().message(),
        }
    }

    /// 最近的检测记录, 最新在前; 读取失败返回空列表
    pub fn history(&self, limit: Option<usize>) -> Vec<LogEntry> {
        match self.store.read_recent(limit.unwrap_or(DEFAULT_HISTORY_LIMIT)) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("读取检测记录失败: {}", e);
                Vec::new()
            }
        }
    }

    pub fn stream(&self) -> StreamResponse {
        if !self.configurator.is_active() {
            return StreamResponse::NoStream {
                message: NO_STREAM_MESSAGE,
            };
        }
        StreamResponse::Stream {
            content_type: STREAM_CONTENT_TYPE,
            subscription: self.configurator.subscribe(),
        }
    }

    pub fn shared_state(&self) -> &SharedState {
        &self.configurator.outputs().state
    }

    pub fn shutdown(&self) {
        self.configurator.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_parsing() {
        let req = ConfigureRequest::from_form([
            ("source_type", "camera"),
            ("camera_index", "1"),
            ("video_path", "  "),
            ("detect_vehicles", "on"),
        ]);
        assert_eq!(req.source_type, SourceType::Camera);
        assert_eq!(req.video_path, DEFAULT_VIDEO_PATH);
        assert!(!req.detect_people);
        assert!(req.detect_vehicles);
        assert_eq!(req.to_source_config().unwrap().kind, SourceKind::Device(1));

        let req = ConfigureRequest::from_form([("source_type", "rtsp"), ("detect_people", "on")]);
        assert_eq!(req.source_type, SourceType::Video);
        assert_eq!(
            req.to_source_config().unwrap().kind,
            SourceKind::File(PathBuf::from("people.mp4"))
        );
    }

    #[test]
    fn test_bad_camera_index() {
        let req = ConfigureRequest {
            source_type: SourceType::Camera,
            camera_index: "abc".into(),
            ..Default::default()
        };
        let err = req.to_source_config().unwrap_err();
        assert!(err.to_string().starts_with("Video / kamera açılamadı: "));
    }

    #[test]
    fn test_status_json_shape() {
        let report = StatusReport {
            person_count: 2,
            vehicle_count: 1,
            alarm: None,
        };
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"person_count": 2, "vehicle_count": 1, "alarm": null})
        );
    }

    #[test]
    fn test_request_deserialize_defaults() {
        let req: ConfigureRequest = serde_json::from_str(r#"{"source_type": "camera"}"#).unwrap();
        assert_eq!(req.camera_index, "0");
        assert!(req.detect_people);
    }
}
