// 该文件是 Mengban （蒙版） 项目的一部分。
// src/frame.rs - 分数平面、掩码与合成缓冲区定义
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

use image::{GrayImage, RgbaImage};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

fn check_len(expected: usize, actual: usize) -> Result<(), FrameError> {
  if expected != actual {
    return Err(FrameError::LengthMismatch { expected, actual });
  }
  Ok(())
}

/// 单个类别的逐像素置信度，行优先，原点在左上角
#[derive(Debug, Clone, Copy)]
pub struct ScorePlane<'a> {
  data: &'a [f32],
  width: usize,
  height: usize,
}

impl<'a> ScorePlane<'a> {
  pub fn new(data: &'a [f32], width: usize, height: usize) -> Result<Self, FrameError> {
    check_len(width * height, data.len())?;
    Ok(Self {
      data,
      width,
      height,
    })
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn as_slice(&self) -> &'a [f32] {
    self.data
  }
}

/// 单通道掩码，每像素一个字节
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayMask {
  data: Box<[u8]>,
  width: usize,
  height: usize,
}

impl GrayMask {
  pub fn with_shape(width: usize, height: usize) -> Self {
    Self {
      data: vec![0u8; width * height].into_boxed_slice(),
      width,
      height,
    }
  }

  pub fn from_vec(data: Vec<u8>, width: usize, height: usize) -> Result<Self, FrameError> {
    check_len(width * height, data.len())?;
    Ok(Self {
      data: data.into_boxed_slice(),
      width,
      height,
    })
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn as_slice(&self) -> &[u8] {
    &self.data
  }

  pub fn to_gray_image(&self) -> Option<GrayImage> {
    GrayImage::from_raw(self.width as u32, self.height as u32, self.data.to_vec())
  }
}

impl AsMut<[u8]> for GrayMask {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl From<GrayImage> for GrayMask {
  fn from(image: GrayImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      data: image.into_raw().into_boxed_slice(),
      width: width as usize,
      height: height as usize,
    }
  }
}

/// 合成输出缓冲区，每像素一个 `0xAARRGGBB`，尺寸与原始帧一致
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompositeBuffer {
  data: Box<[u32]>,
  width: usize,
  height: usize,
}

impl CompositeBuffer {
  pub fn with_shape(width: usize, height: usize) -> Self {
    Self {
      data: vec![0u32; width * height].into_boxed_slice(),
      width,
      height,
    }
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn as_slice(&self) -> &[u32] {
    &self.data
  }

  pub fn fill(&mut self, value: u32) {
    self.data.fill(value);
  }

  /// 尺寸不同则重新分配并清零，返回是否发生了重新分配
  pub fn ensure_shape(&mut self, width: usize, height: usize) -> bool {
    if self.width == width && self.height == height {
      return false;
    }
    *self = Self::with_shape(width, height);
    true
  }

  /// 按 `0xAARRGGBB` 拆分为 RGBA 图像
  pub fn to_rgba_image(&self) -> Option<RgbaImage> {
    let mut raw = Vec::with_capacity(self.data.len() * 4);
    for &pixel in self.data.iter() {
      let [a, r, g, b] = pixel.to_be_bytes();
      raw.extend_from_slice(&[r, g, b, a]);
    }
    RgbaImage::from_raw(self.width as u32, self.height as u32, raw)
  }
}

impl AsMut<[u32]> for CompositeBuffer {
  fn as_mut(&mut self) -> &mut [u32] {
    &mut self.data
  }
}
