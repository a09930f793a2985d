// 该文件是 Mengban （蒙版） 项目的一部分。
// src/mask.rs - 逐像素分类与二值化
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

use thiserror::Error;

use crate::frame::ScorePlane;

/// 服饰分割的类别颜色：背景、帽子、上衣、下装
pub const ACCESSORY_PALETTE: [u8; 4] = [0x00, 0xFF, 0xAF, 0x5F];

pub const MASK_ON: u8 = 0xFF;
pub const MASK_OFF: u8 = 0x00;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MaskError {
  #[error("没有提供分数平面")]
  NoPlanes,
  #[error("分数平面数量 {planes} 与调色板长度 {palette} 不一致")]
  PaletteMismatch { planes: usize, palette: usize },
  #[error("分数平面尺寸不一致: 期望 {expected:?}, 实际 {actual:?}")]
  ShapeMismatch {
    expected: (usize, usize),
    actual: (usize, usize),
  },
  #[error("输出缓冲区长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  OutputMismatch { expected: usize, actual: usize },
}

impl MaskError {
  fn check_output(expected: usize, actual: usize) -> Result<(), Self> {
    if expected != actual {
      return Err(Self::OutputMismatch { expected, actual });
    }
    Ok(())
  }
}

/// 各类别的像素计数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassStats {
  counts: Vec<usize>,
}

impl ClassStats {
  pub fn counts(&self) -> &[usize] {
    &self.counts
  }

  pub fn total(&self) -> usize {
    self.counts.iter().sum()
  }

  pub fn ratio(&self, class: usize) -> f32 {
    let total = self.total();
    match self.counts.get(class) {
      Some(&count) if total > 0 => count as f32 / total as f32,
      _ => 0.0,
    }
  }
}

fn rank(score: f32) -> f32 {
  if score.is_nan() { f32::NEG_INFINITY } else { score }
}

/// 逐像素取分数最大的类别，写入对应的调色板字节。
///
/// 分数相同时先声明的类别胜出；NaN 视为最低分。
pub fn classify(
  planes: &[ScorePlane<'_>],
  palette: &[u8],
  out: &mut [u8],
) -> Result<ClassStats, MaskError> {
  let first = planes.first().ok_or(MaskError::NoPlanes)?;
  if planes.len() != palette.len() {
    return Err(MaskError::PaletteMismatch {
      planes: planes.len(),
      palette: palette.len(),
    });
  }

  let shape = (first.width(), first.height());
  if let Some(plane) = planes.iter().find(|p| (p.width(), p.height()) != shape) {
    return Err(MaskError::ShapeMismatch {
      expected: shape,
      actual: (plane.width(), plane.height()),
    });
  }
  MaskError::check_output(shape.0 * shape.1, out.len())?;

  let mut counts = vec![0usize; planes.len()];
  for (pixel, byte) in out.iter_mut().enumerate() {
    let mut best = 0;
    let mut best_score = rank(first.as_slice()[pixel]);
    for (class, plane) in planes.iter().enumerate().skip(1) {
      let score = rank(plane.as_slice()[pixel]);
      if score > best_score {
        best = class;
        best_score = score;
      }
    }
    counts[best] += 1;
    *byte = palette[best];
  }

  Ok(ClassStats { counts })
}

fn threshold_with(
  plane: &ScorePlane<'_>,
  out: &mut [u8],
  on: impl Fn(f32) -> bool,
) -> Result<bool, MaskError> {
  MaskError::check_output(plane.as_slice().len(), out.len())?;

  let mut found = false;
  for (&score, byte) in plane.as_slice().iter().zip(out.iter_mut()) {
    if on(score) {
      *byte = MASK_ON;
      found = true;
    } else {
      *byte = MASK_OFF;
    }
  }
  Ok(found)
}

/// 分数低于阈值的像素置为 `0xFF`，返回是否有像素被置位
pub fn threshold_below(
  plane: &ScorePlane<'_>,
  threshold: f32,
  out: &mut [u8],
) -> Result<bool, MaskError> {
  threshold_with(plane, out, |score| score < threshold)
}

/// 分数高于阈值的像素置为 `0xFF`，返回是否有像素被置位
pub fn threshold_above(
  plane: &ScorePlane<'_>,
  threshold: f32,
  out: &mut [u8],
) -> Result<bool, MaskError> {
  threshold_with(plane, out, |score| score > threshold)
}

/// 概率 → logit
pub fn logit(probability: f32) -> f32 {
  (probability / (1.0 - probability)).ln()
}
