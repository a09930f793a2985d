// 该文件是 Mengban （蒙版） 项目的一部分。
// src/prior.rs - 先验框（锚框）生成
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

/// 特征图步长
pub const PRIOR_STRIDES: [f32; 4] = [8.0, 16.0, 32.0, 64.0];

/// 每个步长对应的最小框尺寸（像素）
pub const PRIOR_MIN_BOXES: [&[f32]; 4] = [
  &[10.0, 16.0, 24.0],
  &[32.0, 48.0],
  &[64.0, 96.0],
  &[128.0, 192.0, 256.0],
];

/// 先验框，中心点与宽高均归一化到 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prior {
  pub center_x: f32,
  pub center_y: f32,
  pub width: f32,
  pub height: f32,
}

/// 按默认步长与最小框表生成先验框
pub fn generate_priors(width: u32, height: u32) -> Vec<Prior> {
  generate_priors_with(width, height, &PRIOR_STRIDES, &PRIOR_MIN_BOXES)
}

/// 生成先验框。
///
/// 输出顺序为：步长 → 行 `j` → 列 `i` → 最小框序号。
/// 该顺序与模型输出的行一一对应，不可调整。
pub fn generate_priors_with(
  width: u32,
  height: u32,
  strides: &[f32],
  min_boxes: &[&[f32]],
) -> Vec<Prior> {
  let (w, h) = (width as f32, height as f32);
  let mut priors = Vec::new();

  for (&stride, boxes) in strides.iter().zip(min_boxes) {
    let feature_w = (w / stride).ceil() as usize;
    let feature_h = (h / stride).ceil() as usize;
    let scale_w = w / stride;
    let scale_h = h / stride;

    for j in 0..feature_h {
      for i in 0..feature_w {
        let center_x = (i as f32 + 0.5) / scale_w;
        let center_y = (j as f32 + 0.5) / scale_h;

        for &k in boxes.iter() {
          priors.push(Prior {
            center_x: center_x.clamp(0.0, 1.0),
            center_y: center_y.clamp(0.0, 1.0),
            width: (k / w).clamp(0.0, 1.0),
            height: (k / h).clamp(0.0, 1.0),
          });
        }
      }
    }
  }

  priors
}

/// 按输入分辨率缓存的先验框，分辨率变化时才重新生成
#[derive(Debug, Default)]
pub struct PriorCache {
  size: Option<(u32, u32)>,
  priors: Vec<Prior>,
}

impl PriorCache {
  pub fn get(&mut self, width: u32, height: u32) -> &[Prior] {
    if self.size != Some((width, height)) {
      self.priors = generate_priors(width, height);
      self.size = Some((width, height));
      debug!(
        "重新生成先验框: {}x{}, 共 {} 个",
        width,
        height,
        self.priors.len()
      );
    }
    &self.priors
  }

  pub fn size(&self) -> Option<(u32, u32)> {
    self.size
  }
}
