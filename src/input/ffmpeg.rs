//! FFmpeg 解码后端
//!
//! 处理本地摄像头 (DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux)) 与视频文件.
//! 解码在独立线程中运行, 经 `format=rgb24` 滤镜输出, 通过容量为 1 的通道交给读取方,
//! 读取方不取帧时解码线程阻塞.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use tracing::{debug, info, warn};

use super::source::{CaptureBackend, Frame, SourceError, SourceKind, SourceOpener};

/// FFmpeg 帧过滤器: 视频帧 → RGB24 图像
#[derive(Clone)]
pub struct RgbFilter {
    tx: Sender<Frame>,
    frames: usize,
}

impl RgbFilter {
    pub fn new(tx: Sender<Frame>) -> Self {
        Self { tx, frames: 0 }
    }
}

impl FrameFilter for RgbFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        debug!("解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: ez_ffmpeg::Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<ez_ffmpeg::Frame>, String> {
        let image = unsafe {
            // 空帧或损坏帧直接跳过
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                return Ok(None);
            }

            let w = (*frame.as_ptr()).width;
            let h = (*frame.as_ptr()).height;
            let data = (*frame.as_ptr()).data[0];
            let stride = (*frame.as_ptr()).linesize[0];
            if w <= 0 || h <= 0 || data.is_null() || stride < w * 3 {
                return Ok(None);
            }

            let (w, h, stride) = (w as usize, h as usize, stride as usize);
            let mut buf = vec![0u8; w * h * 3];
            for (y, row) in buf.chunks_exact_mut(w * 3).enumerate() {
                let src = std::slice::from_raw_parts(data.add(y * stride), w * 3);
                row.copy_from_slice(src);
            }
            match Frame::from_raw(w as u32, h as u32, buf) {
                Some(img) => img,
                None => return Ok(None),
            }
        };

        self.frames += 1;
        // 读取方已释放: 让 FFmpeg 停止
        self.tx
            .send(image)
            .map_err(|_| "frame receiver dropped".to_string())?;
        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        debug!("解码线程退出, 共 {} 帧", self.frames);
    }
}

/// 摄像头索引 → (FFmpeg 输入, 输入格式)
pub fn device_input(index: u32) -> Result<(String, &'static str), SourceError> {
    #[cfg(target_os = "windows")]
    {
        let devices = ez_ffmpeg::device::get_input_video_devices()
            .map_err(|e| SourceError::Unavailable(format!("camera #{}: {}", index, e)))?;
        let name = devices
            .get(index as usize)
            .ok_or_else(|| SourceError::Unavailable(format!("camera #{}", index)))?;
        Ok((format!("video={}", name), "dshow"))
    }
    #[cfg(target_os = "macos")]
    {
        Ok((format!("{}", index), "avfoundation"))
    }
    #[cfg(target_os = "linux")]
    {
        Ok((format!("/dev/video{}", index), "v4l2"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        Ok((format!("{}", index), "video4linux2"))
    }
}

/// 启动一条解码管线, 等待其启动成功或失败
fn spawn_pipeline(
    url: &str,
    format: Option<&'static str>,
    open_timeout: Duration,
) -> Result<(Receiver<Frame>, JoinHandle<()>), SourceError> {
    let (tx, rx) = bounded::<Frame>(1);
    let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);
    let abort = Arc::new(AtomicBool::new(false));
    let input_url = url.to_string();

    let thread_abort = abort.clone();
    let handle = std::thread::Builder::new()
        .name("ffmpeg-capture".into())
        .spawn(move || {
            let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
            let pipe = pipe.filter("rgb", Box::new(RgbFilter::new(tx)));
            let out = create_null_output().add_frame_pipeline(pipe);

            let mut input = Input::new(input_url.as_str());
            if let Some(format) = format {
                input = input.set_format(format);
            }

            let ctx = match FfmpegContext::builder()
                .input(input)
                .filter_desc("format=rgb24")
                .output(out)
                .build()
            {
                Ok(c) => c,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };

            let sch = match ctx.start() {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            // 打开过慢, 调用方已放弃: 立即关闭设备
            if thread_abort.load(Ordering::SeqCst) {
                sch.abort();
                return;
            }
            let _ = ready_tx.send(Ok(()));

            if let Err(e) = sch.wait() {
                debug!("解码结束: {}", e);
            }
        })
        .map_err(|e| SourceError::Unavailable(format!("{}: {}", url, e)))?;

    await_ready(&ready_rx, &abort, rx, handle, open_timeout)
        .map_err(|e| SourceError::Unavailable(format!("{}: {}", url, e)))
}

/// 等待解码线程的启动结果
///
/// 失败或超时都先丢弃帧接收端并回收线程再返回, 返回后设备一定已经释放.
fn await_ready(
    ready_rx: &Receiver<Result<(), String>>,
    abort: &AtomicBool,
    frames: Receiver<Frame>,
    handle: JoinHandle<()>,
    open_timeout: Duration,
) -> Result<(Receiver<Frame>, JoinHandle<()>), String> {
    let err = match ready_rx.recv_timeout(open_timeout) {
        Ok(Ok(())) => return Ok((frames, handle)),
        Ok(Err(e)) => e,
        Err(RecvTimeoutError::Timeout) => {
            abort.store(true, Ordering::SeqCst);
            warn!("输入源打开超时 ({:?}), 等待解码线程退出", open_timeout);
            "打开超时".to_string()
        }
        Err(RecvTimeoutError::Disconnected) => "解码线程退出".to_string(),
    };
    // 超时后才打开成功的管线: 发送失败后自行退出
    drop(frames);
    if handle.join().is_err() {
        warn!("解码线程异常退出");
    }
    Err(err)
}

/// ez-ffmpeg 解码会话
pub struct FfmpegCapture {
    url: String,
    format: Option<&'static str>,
    read_timeout: Duration,
    open_timeout: Duration,
    rx: Option<Receiver<Frame>>,
    handle: Option<JoinHandle<()>>,
}

impl FfmpegCapture {
    pub fn open(
        url: &str,
        format: Option<&'static str>,
        read_timeout: Duration,
        open_timeout: Duration,
    ) -> Result<Self, SourceError> {
        let (rx, handle) = spawn_pipeline(url, format, open_timeout)?;
        Ok(Self {
            url: url.to_string(),
            format,
            read_timeout,
            open_timeout,
            rx: Some(rx),
            handle: Some(handle),
        })
    }

    fn stop_pipeline(&mut self) {
        // 先丢弃接收端, 阻塞在发送上的解码线程随即退出
        self.rx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("解码线程异常退出: {}", self.url);
            }
        }
    }
}

impl CaptureBackend for FfmpegCapture {
    fn grab(&mut self) -> Result<Option<Frame>, SourceError> {
        let rx = match &self.rx {
            Some(rx) => rx,
            None => return Ok(None),
        };
        match rx.recv_timeout(self.read_timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
            Err(RecvTimeoutError::Timeout) => Err(SourceError::ReadFailure(format!(
                "{}: {:?} 内没有收到帧",
                self.url, self.read_timeout
            ))),
        }
    }

    fn rewind(&mut self) -> Result<(), SourceError> {
        self.stop_pipeline();
        let (rx, handle) = spawn_pipeline(&self.url, self.format, self.open_timeout)?;
        self.rx = Some(rx);
        self.handle = Some(handle);
        Ok(())
    }

    fn release(&mut self) {
        self.stop_pipeline();
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        self.stop_pipeline();
    }
}

/// 生产环境的输入源工厂
#[derive(Debug, Clone)]
pub struct FfmpegOpener {
    pub read_timeout: Duration,
    pub open_timeout: Duration,
}

impl Default for FfmpegOpener {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            open_timeout: Duration::from_secs(10),
        }
    }
}

impl SourceOpener for FfmpegOpener {
    fn open(&self, kind: &SourceKind) -> Result<Box<dyn CaptureBackend>, SourceError> {
        let capture = match kind {
            SourceKind::File(path) => {
                if !Path::new(path).is_file() {
                    return Err(SourceError::Unavailable(path.display().to_string()));
                }
                FfmpegCapture::open(
                    &path.to_string_lossy(),
                    None,
                    self.read_timeout,
                    self.open_timeout,
                )?
            }
            SourceKind::Device(index) => {
                let (url, format) = device_input(*index)?;
                info!("🔍 使用格式: {}, 输入: {}", format, url);
                FfmpegCapture::open(&url, Some(format), self.read_timeout, self.open_timeout)?
            }
        };
        Ok(Box::new(capture))
    }
}
