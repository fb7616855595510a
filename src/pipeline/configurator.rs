// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwapOption;
use tracing::info;

use super::broadcast::{Broadcaster, Subscription};
use super::capture::{CaptureLoop, LoopOutputs};
use crate::detection::DetectionEngine;
use crate::input::{SourceConfig, SourceError, SourceOpener};

/// 切换输入源: 先停止并等待旧循环退出, 再启动新循环
///
/// 任一时刻最多一个采集循环持有输入源.
/// 切换期间只有 `configure` / `shutdown` 互斥; 订阅和活动状态查询不取锁.
pub struct SourceConfigurator {
    opener: Arc<dyn SourceOpener>,
    engine: Arc<Mutex<DetectionEngine>>,
    outputs: LoopOutputs,
    active: Mutex<Option<CaptureLoop>>,
    current: ArcSwapOption<Broadcaster>,
}

impl SourceConfigurator {
    pub fn new(
        opener: Arc<dyn SourceOpener>,
        engine: DetectionEngine,
        outputs: LoopOutputs,
    ) -> Self {
        Self {
            opener,
            engine: Arc::new(Mutex::new(engine)),
            outputs,
            active: Mutex::new(None),
            current: ArcSwapOption::empty(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<CaptureLoop>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn outputs(&self) -> &LoopOutputs {
        &self.outputs
    }

    pub fn engine(&self) -> &Arc<Mutex<DetectionEngine>> {
        &self.engine
    }

    /// 应用新配置; 失败时没有活动的输入源
    pub fn configure(&self, config: SourceConfig) -> Result<(), SourceError> {
        let mut active = self.lock();
        self.current.store(None);
        if let Some(mut old) = active.take() {
            info!("🔄 停止当前输入源: {}", old.config().kind);
            old.stop();
        }

        let cl = CaptureLoop::start(
            config,
            self.opener.as_ref(),
            self.engine.clone(),
            self.outputs.clone(),
        )?;
        self.current.store(Some(Arc::new(cl.broadcaster().clone())));
        *active = Some(cl);
        Ok(())
    }

    /// 订阅视频流; 没有运行中的循环时立即得到 `NoStream`
    pub fn subscribe(&self) -> Subscription {
        match self.current.load_full() {
            Some(b) => b.subscribe(),
            None => Broadcaster::closed().subscribe(),
        }
    }

    /// 读取共享快照, 切换输入源期间也不阻塞
    pub fn is_active(&self) -> bool {
        self.outputs.state.read().active
    }

    pub fn active_config(&self) -> Option<SourceConfig> {
        self.lock().as_ref().map(|cl| cl.config().clone())
    }

    /// 停止当前循环
    pub fn shutdown(&self) {
        let mut active = self.lock();
        self.current.store(None);
        if let Some(mut cl) = active.take() {
            cl.stop();
        }
    }
}

impl Drop for SourceConfigurator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
