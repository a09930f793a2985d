// 该文件是 Mengban （蒙版） 项目的一部分。
// src/decode.rs - 回归偏移解码
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

use tracing::debug;

use crate::prior::Prior;

pub const CENTER_VARIANCE: f32 = 0.1;
pub const SIZE_VARIANCE: f32 = 0.2;

/// 候选框，坐标为模型输入尺寸下的像素
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
  pub score: f32,
}

impl Candidate {
  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  /// 排序用的分数，NaN 视为最低
  pub(crate) fn rank(&self) -> f32 {
    if self.score.is_nan() {
      f32::NEG_INFINITY
    } else {
      self.score
    }
  }
}

/// 将 `(dx, dy, dw, dh)` 解码为 `[x1, y1, x2, y2]`。
///
/// 先在归一化空间裁剪到 `[0, 1]`，再乘以输入尺寸。
pub fn decode_box(regression: [f32; 4], prior: &Prior, width: f32, height: f32) -> [f32; 4] {
  let [dx, dy, dw, dh] = regression;
  let cx = dx * CENTER_VARIANCE * prior.width + prior.center_x;
  let cy = dy * CENTER_VARIANCE * prior.height + prior.center_y;
  let w = (dw * SIZE_VARIANCE).exp() * prior.width;
  let h = (dh * SIZE_VARIANCE).exp() * prior.height;

  [
    (cx - w / 2.0).clamp(0.0, 1.0) * width,
    (cy - h / 2.0).clamp(0.0, 1.0) * height,
    (cx + w / 2.0).clamp(0.0, 1.0) * width,
    (cy + h / 2.0).clamp(0.0, 1.0) * height,
  ]
}

/// 对所有锚框解码并按分数阈值筛选。
///
/// `boxes` 每行 4 个值，`scores` 每行 2 个值（背景、人脸），
/// 行数与 `priors` 一致，由调用方保证。
pub fn decode_candidates(
  boxes: &[f32],
  scores: &[f32],
  priors: &[Prior],
  width: f32,
  height: f32,
  threshold: f32,
) -> Vec<Candidate> {
  let mut candidates = Vec::new();

  for (i, prior) in priors.iter().enumerate() {
    let score = scores[i * 2 + 1];
    // NaN 比较恒为 false，这里显式拒绝
    if score.is_nan() || score <= threshold {
      continue;
    }

    let regression = [
      boxes[i * 4],
      boxes[i * 4 + 1],
      boxes[i * 4 + 2],
      boxes[i * 4 + 3],
    ];
    let [x1, y1, x2, y2] = decode_box(regression, prior, width, height);
    candidates.push(Candidate {
      x1,
      y1,
      x2,
      y2,
      score: score.clamp(0.0, 1.0),
    });
  }

  debug!("解码得到 {} 个候选框", candidates.len());
  candidates
}
