// 该文件是 Mengban （蒙版） 项目的一部分。
// src/model/tensor.rs - 推理引擎输出张量
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use crate::{frame::ScorePlane, model::ModelError};

/// 具名浮点张量，维度按 `[n, c, h, w]` 排列
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
  name: String,
  dims: [usize; 4],
  data: Vec<f32>,
}

impl Tensor {
  pub fn new(name: impl Into<String>, dims: [usize; 4], data: Vec<f32>) -> Result<Self, ModelError> {
    let name = name.into();
    let expected: usize = dims.iter().product();
    if expected != data.len() {
      return Err(ModelError::invalid(format!(
        "张量 {} 的维度 {:?} 需要 {} 个元素, 实际为 {}",
        name,
        dims,
        expected,
        data.len()
      )));
    }
    Ok(Self { name, dims, data })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn dims(&self) -> [usize; 4] {
    self.dims
  }

  pub fn batch(&self) -> usize {
    self.dims[0]
  }

  pub fn channels(&self) -> usize {
    self.dims[1]
  }

  pub fn height(&self) -> usize {
    self.dims[2]
  }

  pub fn width(&self) -> usize {
    self.dims[3]
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }

  /// 第 `batch` 个样本第 `channel` 个通道的 `h x w` 平面
  pub fn plane(&self, batch: usize, channel: usize) -> Result<ScorePlane<'_>, ModelError> {
    if batch >= self.batch() || channel >= self.channels() {
      return Err(ModelError::invalid(format!(
        "张量 {} 的维度为 {:?}, 无法取 ({}, {}) 平面",
        self.name, self.dims, batch, channel
      )));
    }
    let (h, w) = (self.height(), self.width());
    let start = (batch * self.channels() + channel) * h * w;
    Ok(ScorePlane::new(&self.data[start..start + h * w], w, h)?)
  }
}

/// 一次前向推理的全部输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tensors {
  tensors: Vec<Tensor>,
}

impl Tensors {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, tensor: Tensor) -> Self {
    self.push(tensor);
    self
  }

  pub fn push(&mut self, tensor: Tensor) {
    self.tensors.push(tensor);
  }

  pub fn len(&self) -> usize {
    self.tensors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tensors.is_empty()
  }

  pub fn get(&self, name: &str) -> Result<&Tensor, ModelError> {
    self
      .tensors
      .iter()
      .find(|t| t.name == name)
      .ok_or_else(|| ModelError::invalid(format!("缺少输出张量 {}", name)))
  }
}

impl FromIterator<Tensor> for Tensors {
  fn from_iter<T: IntoIterator<Item = Tensor>>(iter: T) -> Self {
    Self {
      tensors: iter.into_iter().collect(),
    }
  }
}
