/// 实时人车监控 (Live Detection Monitor)
///
/// 系统架构:
/// 1. 采集线程: 视频解码 → 行人/车辆检测 → 标注 → JPEG编码 (单生产者)
/// 2. 视频流:   最新帧广播, 可选写入 MJPEG 文件
/// 3. 主线程:   定时打印状态 (计数 + 报警), 结束时打印历史记录
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sentinel_rs::input::FfmpegOpener;
use sentinel_rs::service::StreamResponse;
use sentinel_rs::{Args, DetectionEngine, JsonlStore, Monitor};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.monitor_config();

    info!("🚀 实时人车监控启动");
    info!("📦 模型目录: {}", config.model_dir.display());
    info!("🗂️ 检测记录: {}", args.history.display());

    let engine = DetectionEngine::load(
        &config.model_dir,
        config.hog.clone(),
        config.vehicle.clone(),
    );
    let opener = FfmpegOpener {
        read_timeout: config.read_timeout,
        ..FfmpegOpener::default()
    };
    let store = Arc::new(JsonlStore::new(args.history.clone()));
    let monitor = Arc::new(Monitor::new(Arc::new(opener), engine, store, &config));

    if let Err(e) = monitor.configure(args.configure_request()) {
        error!("{}", e);
    }

    // ========== MJPEG 输出 ==========
    let tee = match &args.mjpeg_out {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("无法创建 {}", path.display()))?;
            let monitor = monitor.clone();
            let path = path.clone();
            Some(std::thread::spawn(move || {
                let subscription = match monitor.stream() {
                    StreamResponse::Stream { subscription, .. } => subscription,
                    StreamResponse::NoStream { message } => {
                        warn!("{}", message);
                        return;
                    }
                };
                let mut out = BufWriter::new(file);
                let mut frames = 0u64;
                for frame in subscription {
                    if let Err(e) = out.write_all(&frame.chunk) {
                        error!("写入 {} 失败: {}", path.display(), e);
                        return;
                    }
                    frames += 1;
                }
                let _ = out.flush();
                info!("📼 MJPEG 输出结束: {} 帧 → {}", frames, path.display());
            }))
        }
        None => None,
    };

    // ========== 状态循环 ==========
    let start = Instant::now();
    let every = Duration::from_secs(args.status_every.max(1));
    loop {
        std::thread::sleep(every);
        let status = monitor.status();
        println!("{}", serde_json::to_string(&status)?);

        if let Some(limit) = args.duration {
            if start.elapsed() >= Duration::from_secs(limit) {
                break;
            }
        }
        if !monitor.is_active() && args.duration.is_none() {
            info!("输入源已停止");
            break;
        }
    }

    monitor.shutdown();
    if let Some(handle) = tee {
        let _ = handle.join();
    }

    let history = monitor.history(None);
    println!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}
