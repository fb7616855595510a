// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 最新帧广播: 单生产者, 任意数量订阅者, 不积压

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};

/// multipart 分隔符
pub const BOUNDARY: &str = "frame";
/// 视频流响应的 Content-Type
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`
pub fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let head = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY);
    let mut buf = BytesMut::with_capacity(head.len() + jpeg.len() + 2);
    buf.put_slice(head.as_bytes());
    buf.put_slice(jpeg);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

/// 已编码的一帧, 所有订阅者共享
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    pub jpeg: Bytes,
    pub chunk: Bytes,
}

/// 订阅者收到的内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Frame(Arc<EncodedFrame>),
    /// 终止信号: 没有活动的输入源
    NoStream,
}

#[derive(Default)]
struct Slot {
    latest: Option<Arc<EncodedFrame>>,
    seq: u64,
    closed: bool,
}

#[derive(Default)]
struct Inner {
    slot: Mutex<Slot>,
    cond: Condvar,
    subscribers: AtomicUsize,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Clone, Default)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已关闭的广播器: 订阅立即得到 `NoStream`
    pub fn closed() -> Self {
        let b = Self::new();
        b.close();
        b
    }

    /// 发布新帧, 替换旧帧; 关闭后忽略, 返回 None
    pub fn publish(&self, jpeg: Bytes, width: u32, height: u32) -> Option<u64> {
        let chunk = multipart_chunk(&jpeg);
        let mut slot = self.inner.lock();
        if slot.closed {
            return None;
        }
        slot.seq += 1;
        let seq = slot.seq;
        slot.latest = Some(Arc::new(EncodedFrame {
            seq,
            width,
            height,
            jpeg,
            chunk,
        }));
        drop(slot);
        self.inner.cond.notify_all();
        Some(seq)
    }

    /// 关闭: 所有订阅者 (包括之后的) 收到 `NoStream`
    pub fn close(&self) {
        let mut slot = self.inner.lock();
        slot.closed = true;
        slot.latest = None;
        drop(slot);
        self.inner.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.subscribers.fetch_add(1, Ordering::SeqCst);
        Subscription {
            inner: self.inner.clone(),
            last_seen: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.load(Ordering::SeqCst)
    }
}

/// 订阅句柄, Drop 时立即注销
pub struct Subscription {
    inner: Arc<Inner>,
    last_seen: u64,
}

impl Subscription {
    fn take(&mut self, slot: &Slot) -> Option<Delivery> {
        if slot.closed {
            return Some(Delivery::NoStream);
        }
        match &slot.latest {
            Some(frame) if frame.seq > self.last_seen => {
                self.last_seen = frame.seq;
                Some(Delivery::Frame(frame.clone()))
            }
            _ => None,
        }
    }

    /// 阻塞直到有比上次更新的帧, 或广播关闭
    pub fn recv(&mut self) -> Delivery {
        let inner = self.inner.clone();
        let mut slot = inner.lock();
        loop {
            if let Some(d) = self.take(&slot) {
                return d;
            }
            slot = inner.cond.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// 同 `recv`, 超时返回 None
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Delivery> {
        let deadline = Instant::now() + timeout;
        let inner = self.inner.clone();
        let mut slot = inner.lock();
        loop {
            if let Some(d) = self.take(&slot) {
                return Some(d);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            slot = inner
                .cond
                .wait_timeout(slot, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    /// 最后收到的帧序号
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}

/// 逐帧迭代, 收到 `NoStream` 时结束
impl Iterator for Subscription {
    type Item = Arc<EncodedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.recv() {
            Delivery::Frame(f) => Some(f),
            Delivery::NoStream => None,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.subscribers.fetch_sub(1, Ordering::SeqCst);
    }
}
