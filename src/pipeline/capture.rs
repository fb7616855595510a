// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 采集循环: 读帧 → 检测 → 发布计数 → 发布标注帧

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::broadcast::{Broadcaster, Subscription};
use super::state::SharedState;
use super::throttle::ThrottledLogger;
use crate::annotate::{encode_jpeg, Annotator};
use crate::detection::DetectionEngine;
use crate::input::{FrameSource, SourceConfig, SourceError, SourceOpener};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Running,
    Stopped,
}

/// 循环结束原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    ReadFailure(SourceError),
}

/// 采集循环的输出端, 在多次重新配置之间共享
#[derive(Clone)]
pub struct LoopOutputs {
    pub state: SharedState,
    pub logger: Arc<ThrottledLogger>,
    pub annotator: Annotator,
    pub jpeg_quality: u8,
}

pub struct CaptureLoop {
    config: SourceConfig,
    broadcaster: Broadcaster,
    state: SharedState,
    stop: Arc<AtomicBool>,
    status: Arc<Mutex<LoopState>>,
    handle: Option<JoinHandle<StopReason>>,
    reason: Option<StopReason>,
}

impl CaptureLoop {
    /// 打开输入源并启动采集线程; 打开失败时不启动线程
    pub fn start(
        config: SourceConfig,
        opener: &dyn SourceOpener,
        engine: Arc<Mutex<DetectionEngine>>,
        outputs: LoopOutputs,
    ) -> Result<Self, SourceError> {
        let status = Arc::new(Mutex::new(LoopState::Starting));
        let source = match FrameSource::open(opener, &config.kind) {
            Ok(s) => s,
            Err(e) => {
                warn!("❌ 输入源打开失败: {}", e);
                outputs.state.clear();
                return Err(e);
            }
        };

        outputs.state.activate();
        let state = outputs.state.clone();
        let broadcaster = Broadcaster::new();
        let stop = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            source,
            config: config.clone(),
            engine,
            outputs,
            broadcaster: broadcaster.clone(),
            stop: stop.clone(),
            status: status.clone(),
        };

        let handle = std::thread::Builder::new()
            .name("capture-loop".into())
            .spawn(move || worker.run())
            .map_err(|e| {
                state.clear();
                SourceError::Unavailable(format!("无法启动采集线程: {}", e))
            })?;

        Ok(Self {
            config,
            broadcaster,
            state,
            stop,
            status,
            handle: Some(handle),
            reason: None,
        })
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn state(&self) -> LoopState {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe()
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// 请求停止并等待线程退出, 可重复调用
    pub fn stop(&mut self) -> Option<StopReason> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            self.reason = match handle.join() {
                Ok(reason) => Some(reason),
                Err(_) => {
                    warn!("采集线程异常退出");
                    // 线程 panic 时输出端由这里收尾
                    self.broadcaster.close();
                    self.state.clear();
                    *self.status.lock().unwrap_or_else(|e| e.into_inner()) = LoopState::Stopped;
                    None
                }
            };
        }
        self.reason.clone()
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 采集线程独占的资源
struct Worker {
    source: FrameSource,
    config: SourceConfig,
    engine: Arc<Mutex<DetectionEngine>>,
    outputs: LoopOutputs,
    broadcaster: Broadcaster,
    stop: Arc<AtomicBool>,
    status: Arc<Mutex<LoopState>>,
}

impl Worker {
    fn set_state(&self, state: LoopState) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = state;
        debug!("采集循环状态: {:?}", state);
    }

    fn run(mut self) -> StopReason {
        self.set_state(LoopState::Running);
        info!(
            "🚀 采集循环启动: {} (person={}, vehicle={})",
            self.config.kind, self.config.detect_people, self.config.detect_vehicles
        );

        let mut frames = 0u64;
        let mut last = Instant::now();
        let reason = loop {
            if self.stop.load(Ordering::SeqCst) {
                break StopReason::Requested;
            }

            let frame = match self.source.read() {
                Ok(f) => f,
                Err(e) => {
                    warn!("⚠️ 读取帧失败, 停止采集: {}", e);
                    break StopReason::ReadFailure(e);
                }
            };

            let detections = {
                let mut engine = self.engine.lock().unwrap_or_else(|e| e.into_inner());
                engine.detect(&frame, self.config.detect_people, self.config.detect_vehicles)
            };

            self.outputs.state.publish(detections.counts);
            self.outputs.logger.observe(detections.counts, Instant::now());

            let annotated = self.outputs.annotator.draw(&frame, &detections.boxes);
            match encode_jpeg(&annotated, self.outputs.jpeg_quality) {
                Ok(jpeg) => {
                    self.broadcaster.publish(jpeg, annotated.width(), annotated.height());
                }
                Err(e) => warn!("帧编码失败: {:#}", e),
            }

            frames += 1;
            if frames % 60 == 0 {
                let elapsed = last.elapsed().as_secs_f64();
                info!(
                    "📊 采集 {:.1} fps | person={} vehicle={} | 订阅者 {}",
                    60.0 / elapsed.max(1e-6),
                    detections.counts.person,
                    detections.counts.vehicle,
                    self.broadcaster.subscriber_count()
                );
                last = Instant::now();
            }
        };

        self.source.close();
        self.broadcaster.close();
        self.outputs.state.clear();
        self.set_state(LoopState::Stopped);
        info!("🛑 采集循环结束: {:?}", reason);
        reason
    }
}
