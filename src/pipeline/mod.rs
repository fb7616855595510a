/// 视频处理流水线 (Video Processing Pipeline)
///
/// 单生产者架构:
/// - CaptureLoop:        采集线程 (读帧 → 检测 → 标注 → 编码)
/// - Broadcaster:        最新帧广播, 供任意数量的视频流订阅者
/// - SharedState:        最新计数快照, 供状态查询
/// - ThrottledLogger:    限频持久化
/// - SourceConfigurator: 输入源切换 (停止 → 等待 → 启动)
pub mod broadcast;
pub mod capture;
pub mod configurator;
pub mod state;
pub mod throttle;

pub use broadcast::{
    multipart_chunk, Broadcaster, Delivery, EncodedFrame, Subscription, BOUNDARY,
    STREAM_CONTENT_TYPE,
};
pub use capture::{CaptureLoop, LoopOutputs, LoopState, StopReason};
pub use configurator::SourceConfigurator;
pub use state::{Alarms, SharedState, StateSnapshot};
pub use throttle::ThrottledLogger;
