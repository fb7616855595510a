// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 帧源: 打开 / 读取 / 关闭, 视频文件到结尾自动从头播放

use std::fmt;
use std::path::PathBuf;

use image::RgbImage;
use tracing::{debug, info};

/// 一帧 RGB24 图像
pub type Frame = RgbImage;

/// 输入源类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Device(u32),
    File(PathBuf),
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Device(i) => write!(f, "camera #{}", i),
            SourceKind::File(p) => write!(f, "{}", p.display()),
        }
    }
}

/// 一次采集会话的配置, 交给采集循环后不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub detect_people: bool,
    pub detect_vehicles: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("无法打开 {0}")]
    Unavailable(String),
    #[error("读取帧失败: {0}")]
    ReadFailure(String),
}

/// 解码后端
pub trait CaptureBackend: Send {
    /// 读取下一帧; `Ok(None)` 表示流结束
    fn grab(&mut self) -> Result<Option<Frame>, SourceError>;
    /// 回到开头 (仅视频文件)
    fn rewind(&mut self) -> Result<(), SourceError>;
    /// 释放底层资源
    fn release(&mut self);
}

/// 根据输入源类型创建解码后端
pub trait SourceOpener: Send + Sync {
    fn open(&self, kind: &SourceKind) -> Result<Box<dyn CaptureBackend>, SourceError>;
}

pub struct FrameSource {
    kind: SourceKind,
    backend: Option<Box<dyn CaptureBackend>>,
}

impl FrameSource {
    pub fn open(opener: &dyn SourceOpener, kind: &SourceKind) -> Result<Self, SourceError> {
        let backend = opener.open(kind)?;
        info!("📹 输入源已打开: {}", kind);
        Ok(Self {
            kind: kind.clone(),
            backend: Some(backend),
        })
    }

    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, SourceKind::File(_))
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    /// 读取一帧
    ///
    /// 视频文件读到结尾 (或读取出错) 时回到开头再读一次, 仍失败则返回 `ReadFailure`;
    /// 摄像头读取失败直接返回 `ReadFailure`.
    pub fn read(&mut self) -> Result<Frame, SourceError> {
        let is_file = self.is_file();
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| SourceError::ReadFailure("输入源已关闭".to_string()))?;

        let first = backend.grab();
        if !is_file {
            return match first {
                Ok(Some(frame)) => Ok(frame),
                Ok(None) => Err(SourceError::ReadFailure("摄像头流结束".to_string())),
                Err(e) => Err(e),
            };
        }

        match first {
            Ok(Some(frame)) => return Ok(frame),
            Ok(None) => debug!("视频结束, 从头播放"),
            Err(e) => debug!("视频读取失败, 从头重试: {}", e),
        }

        backend
            .rewind()
            .map_err(|e| SourceError::ReadFailure(e.to_string()))?;
        match backend.grab()? {
            Some(frame) => Ok(frame),
            None => Err(SourceError::ReadFailure("视频没有可读的帧".to_string())),
        }
    }

    /// 释放解码后端, 可重复调用
    pub fn close(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.release();
            info!("📹 输入源已关闭: {}", self.kind);
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.close();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::atomic::Ordering;

    fn file() -> SourceKind {
        SourceKind::File(PathBuf::from("people.mp4"))
    }

    #[test]
    fn test_file_loops_to_first_frame() {
        let opener = ScriptedOpener::new(vec![vec![Step::Frame(solid(1)), Step::Frame(solid(2))]]);
        let mut src = FrameSource::open(&opener, &file()).unwrap();
        assert_eq!(src.read().unwrap(), solid(1));
        assert_eq!(src.read().unwrap(), solid(2));
        // 结尾: 回到开头, 同一次 read 返回第一帧
        assert_eq!(src.read().unwrap(), solid(1));
        assert_eq!(opener.counters.rewound.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_file_is_read_failure() {
        let opener = ScriptedOpener::new(vec![vec![Step::Fail, Step::Fail]]);
        let mut src = FrameSource::open(&opener, &file()).unwrap();
        assert!(matches!(src.read(), Err(SourceError::ReadFailure(_))));
    }

    #[test]
    fn test_device_failure_is_terminal() {
        let opener = ScriptedOpener::new(vec![vec![
            Step::Frame(solid(3)),
            Step::Fail,
            Step::Frame(solid(4)),
        ]]);
        let mut src = FrameSource::open(&opener, &SourceKind::Device(0)).unwrap();
        assert!(src.read().is_ok());
        assert!(matches!(src.read(), Err(SourceError::ReadFailure(_))));
        assert_eq!(opener.counters.rewound.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_open_failure() {
        let opener = ScriptedOpener::new(vec![]);
        let err = FrameSource::open(&opener, &file()).err().unwrap();
        assert!(matches!(err, SourceError::Unavailable(_)));
        assert_eq!(opener.counters.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_close_releases_once() {
        let opener = ScriptedOpener::new(vec![vec![Step::Frame(solid(1))]]);
        let mut src = FrameSource::open(&opener, &file()).unwrap();
        src.close();
        src.close();
        assert!(matches!(src.read(), Err(SourceError::ReadFailure(_))));
        drop(src);
        assert_eq!(opener.counters.released.load(Ordering::SeqCst), 1);
        assert_eq!(opener.counters.live(), 0);
    }
}
