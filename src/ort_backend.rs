// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array, Array4, IxDyn};
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};

/// ONNX Runtime 推理后端 (CPU, 单输入, 可多输出)
pub struct OrtBackend {
    session: Session,
    input_name: String,
    width: u32,
    height: u32,
}

impl OrtBackend {
    /// 加载模型, `image_size` 为网络输入尺寸 (宽, 高)
    pub fn build(path: &Path, image_size: (u32, u32)) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("无法加载ONNX模型 {}", path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .context("模型没有输入")?;

        Ok(Self {
            session,
            input_name,
            width: image_size.0,
            height: image_size.1,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// 运行推理, 按模型声明顺序返回全部输出
    pub fn run(&mut self, xs: Array4<f32>) -> Result<Vec<Array<f32, IxDyn>>> {
        let shape = xs.shape().to_vec();
        let (data, _offset) = xs.into_raw_vec_and_offset();
        let tensor = Tensor::from_array(([shape[0], shape[1], shape[2], shape[3]], data))?;
        let outputs = self
            .session
            .run(inputs![self.input_name.as_str() => tensor])?;

        let mut ys = Vec::with_capacity(outputs.len());
        for i in 0..outputs.len() {
            let (out_shape, out_data) = outputs[i].try_extract_tensor::<f32>()?;
            let dims: Vec<usize> = out_shape.iter().map(|&d| d.max(0) as usize).collect();
            ys.push(Array::from_shape_vec(IxDyn(&dims), out_data.to_vec())?);
        }
        Ok(ys)
    }
}
