// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! HOG 行人检测器 (Histogram of Oriented Gradients + 线性SVM)
//!
//! 流程: 宽度超过阈值先缩小 → 图像金字塔 → 每层计算梯度 → 16x16 block 直方图
//! (高斯窗 + cell 三线性插值) 并 L2-Hys 归一化 → 64x128滑窗打分 → 相似框分组
//! → 按缩放比例还原到原始坐标.
//!
//! 描述子布局: block 按列优先 (x外层, y内层), block 内 4 个 cell 同样按列优先,
//! 每个 cell 9 个方向 bin, 共 7×15×36 = 3780 维.
//!
//! SVM 系数来源: 模型目录下的 `hog_people.svm` 优先; 否则使用构建时
//! 从 `models/hog_people.svm` 编译进来的内置系数.

use std::path::Path;

use anyhow::Result;
use image::RgbImage;

use super::types::{BoundingBox, Label};
use super::{Detect, ModelError};
use crate::utils::resize_rgb;

pub const WIN_WIDTH: usize = 64;
pub const WIN_HEIGHT: usize = 128;
pub const CELL_SIZE: usize = 8;
pub const NBINS: usize = 9;
const BLOCK_LEN: usize = 2 * 2 * NBINS;
const WIN_CELLS_X: usize = WIN_WIDTH / CELL_SIZE; // 8
const WIN_CELLS_Y: usize = WIN_HEIGHT / CELL_SIZE; // 16
const WIN_BLOCKS_X: usize = WIN_CELLS_X - 1; // 7
const WIN_BLOCKS_Y: usize = WIN_CELLS_Y - 1; // 15

/// 单个检测窗口的描述子维度
pub const DESCRIPTOR_LEN: usize = WIN_BLOCKS_X * WIN_BLOCKS_Y * BLOCK_LEN;

const L2HYS_THRESHOLD: f32 = 0.2;

pub const WEIGHTS_FILE: &str = "hog_people.svm";

// 构建脚本生成: `BUILTIN_PEOPLE_SVM: Option<&str>`
include!(concat!(env!("OUT_DIR"), "/hog_people.rs"));

/// 是否编译进了内置的行人检测系数
pub fn has_builtin_weights() -> bool {
    BUILTIN_PEOPLE_SVM.is_some()
}

/// HOG 多尺度检测参数
#[derive(Debug, Clone)]
pub struct HogParams {
    /// 超过该宽度先缩小
    pub max_width: u32,
    /// 图像四周补边
    pub padding: usize,
    /// 金字塔缩放步长
    pub scale: f64,
    pub max_levels: usize,
    /// SVM 得分阈值
    pub hit_threshold: f32,
    /// 分组最少邻居数
    pub group_threshold: usize,
    pub group_eps: f32,
}

impl Default for HogParams {
    fn default() -> Self {
        Self {
            max_width: 800,
            padding: 8,
            scale: 1.05,
            max_levels: 64,
            hit_threshold: 0.0,
            group_threshold: 2,
            group_eps: 0.2,
        }
    }
}

/// 线性SVM: `score = w · x + bias`
#[derive(Debug, Clone)]
pub struct LinearSvm {
    weights: Vec<f32>,
    bias: f32,
}

impl LinearSvm {
    pub fn new(weights: Vec<f32>, bias: f32) -> Result<Self, ModelError> {
        if weights.len() != DESCRIPTOR_LEN {
            return Err(ModelError::Invalid(format!(
                "SVM权重维度 {} != {}",
                weights.len(),
                DESCRIPTOR_LEN
            )));
        }
        Ok(Self { weights, bias })
    }

    /// 解析文本权重: 3780 个权重 + 1 个偏置, 以空白或逗号分隔
    pub fn parse(text: &str) -> Result<Self, ModelError> {
        let mut values = Vec::with_capacity(DESCRIPTOR_LEN + 1);
        for token in text
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
        {
            let v: f32 = token
                .parse()
                .map_err(|_| ModelError::Invalid(format!("无法解析SVM系数 {:?}", token)))?;
            values.push(v);
        }
        if values.len() != DESCRIPTOR_LEN + 1 {
            return Err(ModelError::Invalid(format!(
                "SVM系数数量 {} != {}",
                values.len(),
                DESCRIPTOR_LEN + 1
            )));
        }
        let bias = values.pop().unwrap_or_default();
        Self::new(values, bias)
    }

    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::Missing(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Load(format!("{}: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }

    /// 对窗口 (block 网格左上角 bx, by) 打分
    fn score(&self, blocks: &BlockGrid, bx: usize, by: usize) -> f32 {
        let mut s = self.bias;
        let mut w = self.weights.chunks_exact(BLOCK_LEN);
        for i in 0..WIN_BLOCKS_X {
            for j in 0..WIN_BLOCKS_Y {
                let block = blocks.block(bx + i, by + j);
                if let Some(ws) = w.next() {
                    s += ws.iter().zip(block).map(|(a, b)| a * b).sum::<f32>();
                }
            }
        }
        s
    }
}

/// 归一化后的 block 特征网格
struct BlockGrid {
    cols: usize,
    rows: usize,
    data: Vec<f32>,
}

impl BlockGrid {
    fn block(&self, bx: usize, by: usize) -> &[f32] {
        let offset = (bx * self.rows + by) * BLOCK_LEN;
        &self.data[offset..offset + BLOCK_LEN]
    }
}

/// 整数矩形 (金字塔命中框)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HitRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// 行人检测器
pub struct PeopleDetector {
    svm: LinearSvm,
    params: HogParams,
}

impl PeopleDetector {
    pub fn new(svm: LinearSvm, params: HogParams) -> Self {
        Self { svm, params }
    }

    /// 模型目录下的 `hog_people.svm` 优先, 其次是内置系数
    pub fn load(model_dir: &Path, params: HogParams) -> Result<Self, ModelError> {
        let path = model_dir.join(WEIGHTS_FILE);
        let svm = match BUILTIN_PEOPLE_SVM {
            Some(text) if !path.exists() => {
                tracing::debug!("使用内置行人检测系数");
                LinearSvm::parse(text)?
            }
            _ => LinearSvm::from_file(&path)?,
        };
        Ok(Self::new(svm, params))
    }

    pub fn params(&self) -> &HogParams {
        &self.params
    }

    /// 检测行人, 返回原始帧坐标下的框
    pub fn detect_people(&self, frame: &RgbImage) -> Result<Vec<BoundingBox>> {
        let (w, h) = frame.dimensions();
        let scale = downscale_factor(w, self.params.max_width);
        let resized;
        let working = if scale < 1.0 {
            resized = resize_rgb(
                frame,
                (w as f64 * scale) as u32,
                (h as f64 * scale) as u32,
            )?;
            &resized
        } else {
            frame
        };

        let rects = self.detect_multiscale(working)?;
        Ok(rects
            .into_iter()
            .filter_map(|r| scale_back(r, scale, w, h))
            .collect())
    }

    /// 多尺度滑窗 + 分组 (输入图像坐标)
    pub(crate) fn detect_multiscale(&self, img: &RgbImage) -> Result<Vec<HitRect>> {
        let (w, h) = img.dimensions();
        let mut hits = Vec::new();
        let mut level_scale = 1.0f64;

        for _ in 0..self.params.max_levels {
            let lw = (w as f64 / level_scale).round() as u32;
            let lh = (h as f64 / level_scale).round() as u32;
            if (lw as usize) < WIN_WIDTH || (lh as usize) < WIN_HEIGHT {
                break;
            }
            let level = resize_rgb(img, lw, lh)?;
            for (cx, cy) in self.scan_level(&level) {
                let x = (cx * CELL_SIZE) as f64 - self.params.padding as f64;
                let y = (cy * CELL_SIZE) as f64 - self.params.padding as f64;
                hits.push(HitRect {
                    x: (x * level_scale).round() as i32,
                    y: (y * level_scale).round() as i32,
                    w: (WIN_WIDTH as f64 * level_scale).round() as i32,
                    h: (WIN_HEIGHT as f64 * level_scale).round() as i32,
                });
            }
            level_scale *= self.params.scale;
        }

        Ok(group_rectangles(
            &hits,
            self.params.group_threshold,
            self.params.group_eps,
        ))
    }

    /// 单层滑窗, 返回命中窗口的 cell 坐标 (含补边)
    fn scan_level(&self, level: &RgbImage) -> Vec<(usize, usize)> {
        let grad = compute_gradients(level, self.params.padding);
        if grad.width / CELL_SIZE < WIN_CELLS_X || grad.height / CELL_SIZE < WIN_CELLS_Y {
            return Vec::new();
        }
        let blocks = block_histograms(&grad);

        let mut found = Vec::new();
        for bx in 0..=blocks.cols - WIN_BLOCKS_X {
            for by in 0..=blocks.rows - WIN_BLOCKS_Y {
                if self.svm.score(&blocks, bx, by) > self.params.hit_threshold {
                    found.push((bx, by));
                }
            }
        }
        found
    }
}

impl Detect for PeopleDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>> {
        self.detect_people(frame)
    }
}

/// 宽度超过 `max_width` 时的缩小比例, 否则为 1
pub fn downscale_factor(width: u32, max_width: u32) -> f64 {
    if max_width > 0 && width > max_width {
        max_width as f64 / width as f64
    } else {
        1.0
    }
}

/// 缩小图坐标 → 原始帧坐标 (精确的逆缩放), 并裁剪到画面内
pub(crate) fn scale_back(
    r: HitRect,
    scale: f64,
    frame_w: u32,
    frame_h: u32,
) -> Option<BoundingBox> {
    BoundingBox::clamped(
        Label::Person,
        (r.x as f64 / scale) as i64,
        (r.y as f64 / scale) as i64,
        (r.w as f64 / scale) as i64,
        (r.h as f64 / scale) as i64,
        frame_w,
        frame_h,
    )
}

/// 逐像素梯度: 幅值 + 两个相邻方向 bin 及插值权重
struct Gradients {
    width: usize,
    height: usize,
    mag: Vec<f32>,
    bins: Vec<[u8; 2]>,
    frac: Vec<f32>,
}

/// 反射补边 (`gfedcb|abcdefgh|gfedcba`)
fn reflect101(i: i64, n: i64) -> i64 {
    if n == 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= n {
        i = if i < 0 { -i } else { 2 * n - 2 - i };
    }
    i
}

/// 计算补边图像的梯度 (gamma校正 + 多通道取最大梯度 + 方向线性插值)
///
/// 图像四周反射补 `pad` 像素, 宽高截到 cell 的整数倍.
fn compute_gradients(img: &RgbImage, pad: usize) -> Gradients {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let width = (w as usize + 2 * pad) / CELL_SIZE * CELL_SIZE;
    let height = (h as usize + 2 * pad) / CELL_SIZE * CELL_SIZE;
    let mut grad = Gradients {
        width,
        height,
        mag: vec![0f32; width * height],
        bins: vec![[0u8; 2]; width * height],
        frac: vec![0f32; width * height],
    };
    if w == 0 || h == 0 {
        return grad;
    }

    let mut lut = [0f32; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = (i as f32).sqrt();
    }
    let raw = img.as_raw();
    let px = |x: i64, y: i64, c: usize| -> f32 {
        let x = reflect101(x, w);
        let y = reflect101(y, h);
        lut[raw[((y * w + x) * 3) as usize + c] as usize]
    };

    let angle_scale = NBINS as f32 / std::f32::consts::PI;
    for py in 0..height {
        let iy = py as i64 - pad as i64;
        for pxl in 0..width {
            let ix = pxl as i64 - pad as i64;

            // 三个通道中取梯度幅值最大者
            let (mut best_dx, mut best_dy, mut best_mag2) = (0f32, 0f32, -1f32);
            for c in 0..3 {
                let dx = px(ix + 1, iy, c) - px(ix - 1, iy, c);
                let dy = px(ix, iy + 1, c) - px(ix, iy - 1, c);
                let mag2 = dx * dx + dy * dy;
                if mag2 > best_mag2 {
                    best_dx = dx;
                    best_dy = dy;
                    best_mag2 = mag2;
                }
            }
            let mag = best_mag2.sqrt();
            if mag == 0.0 {
                continue;
            }

            let mut angle = best_dy.atan2(best_dx);
            if angle < 0.0 {
                angle += std::f32::consts::PI;
            }
            if angle >= std::f32::consts::PI {
                angle -= std::f32::consts::PI;
            }

            let a = angle * angle_scale - 0.5;
            let lo = a.floor();
            let bin0 = (lo as i64).rem_euclid(NBINS as i64) as usize;
            let i = py * width + pxl;
            grad.mag[i] = mag;
            grad.bins[i] = [bin0 as u8, ((bin0 + 1) % NBINS) as u8];
            grad.frac[i] = a - lo;
        }
    }
    grad
}

/// block 内每个像素对 4 个 cell 的权重 (高斯窗 σ=4 × cell 中心双线性插值)
///
/// cell 顺序与描述子一致: 列优先, `k = cx * 2 + cy`.
fn block_weights() -> Vec<[f32; 4]> {
    let block = 2 * CELL_SIZE;
    let sigma = (block + block) as f32 / 8.0;
    let scale = 1.0 / (2.0 * sigma * sigma);
    let half = block as f32 * 0.5;

    // 一个方向上对 cell 0 / cell 1 的权重, 超出 block 的一侧丢弃
    let axis = |p: usize| -> [f32; 2] {
        let c = (p as f32 + 0.5) / CELL_SIZE as f32 - 0.5;
        let c0 = c.floor();
        let f = c - c0;
        match c0 as i32 {
            -1 => [f, 0.0],
            0 => [1.0 - f, f],
            _ => [0.0, 1.0 - f],
        }
    };

    let mut table = vec![[0f32; 4]; block * block];
    for y in 0..block {
        for x in 0..block {
            let (dx, dy) = (x as f32 - half, y as f32 - half);
            let g = (-(dx * dx + dy * dy) * scale).exp();
            let (wx, wy) = (axis(x), axis(y));
            let t = &mut table[y * block + x];
            for cx in 0..2 {
                for cy in 0..2 {
                    t[cx * 2 + cy] = g * wx[cx] * wy[cy];
                }
            }
        }
    }
    table
}

/// 16x16 block 直方图 (步长 8), L2-Hys 归一化
fn block_histograms(grad: &Gradients) -> BlockGrid {
    let block = 2 * CELL_SIZE;
    let bcols = (grad.width / CELL_SIZE).saturating_sub(1);
    let brows = (grad.height / CELL_SIZE).saturating_sub(1);
    let weights = block_weights();
    let mut data = vec![0f32; bcols * brows * BLOCK_LEN];

    for bx in 0..bcols {
        for by in 0..brows {
            let offset = (bx * brows + by) * BLOCK_LEN;
            let hist = &mut data[offset..offset + BLOCK_LEN];
            for y in 0..block {
                let row = (by * CELL_SIZE + y) * grad.width + bx * CELL_SIZE;
                for x in 0..block {
                    let i = row + x;
                    let mag = grad.mag[i];
                    if mag == 0.0 {
                        continue;
                    }
                    let [b0, b1] = grad.bins[i];
                    let (m0, m1) = (mag * (1.0 - grad.frac[i]), mag * grad.frac[i]);
                    for (k, &w) in weights[y * block + x].iter().enumerate() {
                        if w != 0.0 {
                            hist[k * NBINS + b0 as usize] += m0 * w;
                            hist[k * NBINS + b1 as usize] += m1 * w;
                        }
                    }
                }
            }
            normalize_block(hist);
        }
    }

    BlockGrid {
        cols: bcols,
        rows: brows,
        data,
    }
}

/// L2 归一化 → 截断 → 再归一化
fn normalize_block(hist: &mut [f32]) {
    let sum: f32 = hist.iter().map(|v| v * v).sum();
    let scale = 1.0 / (sum.sqrt() + BLOCK_LEN as f32 * 0.1);
    let mut sum = 0.0;
    for v in hist.iter_mut() {
        *v = (*v * scale).min(L2HYS_THRESHOLD);
        sum += *v * *v;
    }
    let scale = 1.0 / (sum.sqrt() + 1e-3);
    for v in hist.iter_mut() {
        *v *= scale;
    }
}

/// 相似框分组 (groupRectangles 语义)
///
/// 相似: 四条边的偏差都不超过 `eps * (min_w + min_h) / 2`.
/// 成员数不超过 `threshold` 的簇被丢弃; 被更强簇包含的簇也被丢弃.
pub(crate) fn group_rectangles(rects: &[HitRect], threshold: usize, eps: f32) -> Vec<HitRect> {
    if threshold == 0 || rects.is_empty() {
        return rects.to_vec();
    }

    // 并查集划分
    let n = rects.len();
    let mut parent: Vec<usize> = (0..n).collect();
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }
    let similar = |a: &HitRect, b: &HitRect| -> bool {
        let delta = eps * (a.w.min(b.w) + a.h.min(b.h)) as f32 * 0.5;
        (a.x - b.x).abs() as f32 <= delta
            && (a.y - b.y).abs() as f32 <= delta
            && ((a.x + a.w) - (b.x + b.w)).abs() as f32 <= delta
            && ((a.y + a.h) - (b.y + b.h)).abs() as f32 <= delta
    };
    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&rects[i], &rects[j]) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    // 簇求和
    let mut class_of = vec![usize::MAX; n];
    let mut sums: Vec<([i64; 4], usize)> = Vec::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        if class_of[root] == usize::MAX {
            class_of[root] = sums.len();
            sums.push(([0; 4], 0));
        }
        let entry = &mut sums[class_of[root]];
        let r = rects[i];
        entry.0[0] += r.x as i64;
        entry.0[1] += r.y as i64;
        entry.0[2] += r.w as i64;
        entry.0[3] += r.h as i64;
        entry.1 += 1;
    }

    let averaged: Vec<(HitRect, usize)> = sums
        .iter()
        .map(|(s, count)| {
            let k = *count as f64;
            (
                HitRect {
                    x: (s[0] as f64 / k).round() as i32,
                    y: (s[1] as f64 / k).round() as i32,
                    w: (s[2] as f64 / k).round() as i32,
                    h: (s[3] as f64 / k).round() as i32,
                },
                *count,
            )
        })
        .collect();

    let mut out = Vec::new();
    for (i, &(r1, n1)) in averaged.iter().enumerate() {
        if n1 <= threshold {
            continue;
        }
        let nested = averaged.iter().enumerate().any(|(j, &(r2, n2))| {
            if j == i || n2 <= threshold {
                return false;
            }
            let dx = (r2.w as f32 * eps).round() as i32;
            let dy = (r2.h as f32 * eps).round() as i32;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.x + r1.w <= r2.x + r2.w + dx
                && r1.y + r1.h <= r2.y + r2.h + dy
                && (n2 > n1.max(3) || n1 < 3)
        });
        if !nested {
            out.push(r1);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn constant_svm(bias: f32) -> LinearSvm {
        LinearSvm::new(vec![0.0; DESCRIPTOR_LEN], bias).unwrap()
    }

    #[test]
    fn test_descriptor_len() {
        assert_eq!(DESCRIPTOR_LEN, 3780);
    }

    #[test]
    fn test_parse_svm() {
        let mut text = "0.5 ".repeat(DESCRIPTOR_LEN);
        text.push_str("-1.25\n");
        let svm = LinearSvm::parse(&text).unwrap();
        assert_eq!(svm.bias(), -1.25);

        assert!(LinearSvm::parse("1 2 3").is_err());
        assert!(LinearSvm::parse("abc").is_err());
    }

    #[test]
    fn test_missing_weights_file() {
        let err = LinearSvm::from_file(Path::new("/nonexistent/hog_people.svm")).unwrap_err();
        assert!(matches!(err, ModelError::Missing(_)));
    }

    #[test]
    fn test_load_prefers_model_dir_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut text = "0 ".repeat(DESCRIPTOR_LEN);
        text.push_str("-0.5");
        std::fs::write(dir.path().join(WEIGHTS_FILE), text).unwrap();
        let detector = PeopleDetector::load(dir.path(), HogParams::default()).unwrap();
        assert_eq!(detector.svm.bias(), -0.5);

        // 文件损坏时报错, 不回退到内置系数
        std::fs::write(dir.path().join(WEIGHTS_FILE), "1 2 3").unwrap();
        assert!(matches!(
            PeopleDetector::load(dir.path(), HogParams::default()),
            Err(ModelError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_without_file_uses_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = PeopleDetector::load(dir.path(), HogParams::default());
        assert_eq!(loaded.is_ok(), has_builtin_weights());
        if let Err(e) = loaded {
            assert!(matches!(e, ModelError::Missing(_)));
        }
    }

    #[test]
    fn test_blank_frame_no_people() {
        let detector = PeopleDetector::new(constant_svm(-1.0), HogParams::default());
        let frame = RgbImage::from_pixel(160, 200, Rgb([90, 90, 90]));
        assert!(detector.detect_people(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_boxes_within_frame_after_downscale() {
        // 全部窗口命中, 检查逆缩放后的框都在画面内
        let detector = PeopleDetector::new(constant_svm(1.0), HogParams::default());
        for &(w, h) in &[(900u32, 200u32), (1030, 180), (640, 160)] {
            let frame = RgbImage::from_fn(w, h, |x, y| Rgb([(x % 255) as u8, (y % 255) as u8, 7]));
            let boxes = detector.detect_people(&frame).unwrap();
            assert!(!boxes.is_empty());
            for b in &boxes {
                assert_eq!(b.label, Label::Person);
                assert!(b.x < w && b.y < h);
                assert!(b.right() <= w && b.bottom() <= h);
            }
        }
    }

    #[test]
    fn test_downscale_factor() {
        assert_eq!(downscale_factor(640, 800), 1.0);
        assert_eq!(downscale_factor(800, 800), 1.0);
        assert!((downscale_factor(1600, 800) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_scale_back_inverts_downscale() {
        let r = HitRect { x: 100, y: 40, w: 64, h: 128 };
        let b = scale_back(r, 0.5, 1600, 900).unwrap();
        assert_eq!((b.x, b.y, b.width, b.height), (200, 80, 128, 256));
    }

    #[test]
    fn test_group_rectangles() {
        let cluster = [
            HitRect { x: 10, y: 10, w: 64, h: 128 },
            HitRect { x: 12, y: 11, w: 64, h: 128 },
            HitRect { x: 11, y: 9, w: 64, h: 128 },
        ];
        let grouped = group_rectangles(&cluster, 2, 0.2);
        assert_eq!(grouped, vec![HitRect { x: 11, y: 10, w: 64, h: 128 }]);

        // 只有两个成员的簇被丢弃
        assert!(group_rectangles(&cluster[..2], 2, 0.2).is_empty());
    }

    #[test]
    fn test_reflect101() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(2, 5), 2);
        assert_eq!(reflect101(-3, 1), 0);
    }

    #[test]
    fn test_block_weights_gaussian_trilinear() {
        let t = block_weights();
        // 高斯中心 (8, 8) 落在 4 个 cell 之间, 权重之和为 1
        let center = t[8 * 16 + 8];
        assert!(center.iter().all(|&w| w > 0.0));
        assert!((center.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        // 角上像素只属于所在 cell, 且高斯衰减
        let corner = t[0];
        assert!(corner[0] > 0.0 && corner[0] < center[0]);
        assert_eq!(&corner[1..], &[0.0, 0.0, 0.0]);
        // 右上角 (x=15, y=0) 属于 cell (1, 0)
        let top_right = t[15];
        assert!(top_right[2] > 0.0);
        assert_eq!([top_right[0], top_right[1], top_right[3]], [0.0, 0.0, 0.0]);
        // 每个像素的 cell 权重之和等于高斯权重 (双线性权重之和为 1, 边缘除外)
        let inner = t[5 * 16 + 6];
        let g = (-((6.0f32 - 8.0).powi(2) + (5.0f32 - 8.0).powi(2)) / 32.0).exp();
        assert!((inner.iter().sum::<f32>() - g).abs() < 1e-5);
    }

    #[test]
    fn test_block_histogram_vertical_edge() {
        // 左黑右白的竖直边缘: 梯度方向水平, 能量集中在 0°/180° 附近的 bin
        let img = RgbImage::from_fn(64, 128, |x, _| {
            if x < 32 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let grad = compute_gradients(&img, 0);
        assert_eq!((grad.width, grad.height), (64, 128));
        let blocks = block_histograms(&grad);
        assert_eq!((blocks.cols, blocks.rows), (WIN_BLOCKS_X, WIN_BLOCKS_Y));

        // 第 4 个 block (x = 24..40) 覆盖边缘
        let hist = blocks.block(3, 5);
        let total: f32 = hist.iter().sum();
        assert!(total > 0.0);
        let horizontal: f32 = (0..4).map(|k| hist[k * NBINS] + hist[k * NBINS + NBINS - 1]).sum();
        assert!(horizontal > 0.99 * total);
        // 远离边缘的 block 没有梯度
        assert!(blocks.block(0, 5).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_normalized_block_bounded() {
        let img = RgbImage::from_fn(64, 128, |x, y| {
            Rgb([(x * 7 % 255) as u8, (y * 3 % 255) as u8, 90])
        });
        let blocks = block_histograms(&compute_gradients(&img, 8));
        for bx in 0..blocks.cols {
            for by in 0..blocks.rows {
                let hist = blocks.block(bx, by);
                let norm = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
                assert!(norm <= 1.0 + 1e-4);
            }
        }
    }
}
