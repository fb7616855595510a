/// 视频输入系统 (Video Input System)
///
/// 由采集线程独占
/// - FrameSource:  拉取式帧读取 (视频文件循环播放 / 摄像头)
/// - FfmpegOpener: ez-ffmpeg 解码后端 (V4L2/DirectShow/AVFoundation/文件)
/// - RgbFilter:    FFmpeg帧 → RGB24 图像
pub mod ffmpeg;
pub mod source;

pub use ffmpeg::{device_input, FfmpegCapture, FfmpegOpener, RgbFilter};
pub use source::{
    CaptureBackend, Frame, FrameSource, SourceConfig, SourceError, SourceKind, SourceOpener,
};
