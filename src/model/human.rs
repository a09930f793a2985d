// 该文件是 Mengban （蒙版） 项目的一部分。
// src/model/human.rs - 人体粗定位
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

use image::RgbImage;
use tracing::debug;

use crate::{
  geometry::{Geometry, Rect},
  model::{
    HumanConfig, ModelError, Outcome, OutputContext, ProcessInputGeometry, ProcessOutputTensors,
    Tensor, Tensors,
  },
};

/// 中心热力图
const HUMAN_CENTER: &str = "739";
/// 中心偏移 (x, y)
const HUMAN_OFFSET: &str = "743";
/// 框尺寸 (w, h)
const HUMAN_SIZE: &str = "747";

/// 基于中心点热力图的人体定位，输出用于人体分割的裁剪框
#[derive(Debug)]
pub struct HumanDetector {
  config: HumanConfig,
  width: u32,
  height: u32,
  frame_size: (u32, u32),
}

fn check_grid(tensor: &Tensor, width: usize, height: usize) -> Result<(), ModelError> {
  if tensor.channels() < 2 || tensor.width() != width || tensor.height() != height {
    return Err(ModelError::invalid(format!(
      "张量 {} 的维度 {:?} 与 {}x{} 网格不一致",
      tensor.name(),
      tensor.dims(),
      width,
      height
    )));
  }
  Ok(())
}

impl HumanDetector {
  pub fn new(config: HumanConfig, width: u32, height: u32) -> Self {
    Self {
      config,
      width,
      height,
      frame_size: (width, height),
    }
  }

  pub fn config(&self) -> HumanConfig {
    self.config
  }

  pub fn input_size(&self) -> (u32, u32) {
    (self.width, self.height)
  }
}

impl ProcessInputGeometry for HumanDetector {
  fn process_input(
    &mut self,
    frame: &RgbImage,
    geometry: &dyn Geometry,
  ) -> Result<RgbImage, ModelError> {
    self.frame_size = frame.dimensions();
    Ok(geometry.resize_rgb(frame, self.width, self.height)?)
  }
}

impl ProcessOutputTensors for HumanDetector {
  fn process_output(
    &mut self,
    tensors: &Tensors,
    _ctx: &mut OutputContext<'_>,
  ) -> Result<Outcome, ModelError> {
    let center = tensors.get(HUMAN_CENTER)?;
    let offset = tensors.get(HUMAN_OFFSET)?;
    let size = tensors.get(HUMAN_SIZE)?;

    let (grid_w, grid_h) = (center.width(), center.height());
    check_grid(center, grid_w, grid_h)?;
    check_grid(offset, grid_w, grid_h)?;
    check_grid(size, grid_w, grid_h)?;

    // 两个通道中分数最高的网格点
    let mut best: Option<(f32, usize)> = None;
    for channel in 0..2 {
      let plane = center.plane(0, channel)?;
      for (idx, &score) in plane.as_slice().iter().enumerate() {
        if score > self.config.score_threshold && best.is_none_or(|(s, _)| score > s) {
          best = Some((score, idx));
        }
      }
    }
    let Some((score, idx)) = best else {
      debug!("未找到人体");
      return Ok(Outcome::NotFound);
    };

    let (x, y) = ((idx % grid_w) as f32, (idx / grid_w) as f32);
    let w = size.plane(0, 0)?.as_slice()[idx];
    let h = size.plane(0, 1)?.as_slice()[idx];
    let mut left = x + offset.plane(0, 0)?.as_slice()[idx] - w / 2.0;
    let mut top = y + offset.plane(0, 1)?.as_slice()[idx] - h / 2.0;
    let side = w.max(h) * self.config.expand;
    let (mut crop_w, mut crop_h) = (side, side);

    // 先在网格坐标内裁剪
    let (gw, gh) = (grid_w as f32, grid_h as f32);
    if left < 0.0 {
      crop_w += left;
      left = 0.0;
    }
    if top < 0.0 {
      crop_h += top;
      top = 0.0;
    }
    crop_w = crop_w.min(gw - left);
    crop_h = crop_h.min(gh - top);

    let (frame_w, frame_h) = self.frame_size;
    let sx = frame_w as f32 / gw;
    let sy = frame_h as f32 / gh;
    let rect_left = ((left * sx) as u32).min(frame_w);
    let rect_top = ((top * sy) as u32).min(frame_h);
    let rect = Rect::new(
      rect_left,
      rect_top,
      ((crop_w * sx).max(0.0) as u32).min(frame_w - rect_left),
      ((crop_h * sy).max(0.0) as u32).min(frame_h - rect_top),
    );

    debug!("人体分数 {:.3}, 位置 {:?}", score, rect);
    if rect.is_empty() {
      return Ok(Outcome::NotFound);
    }
    Ok(Outcome::Human(rect))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{frame::CompositeBuffer, geometry::LinearGeometry};

  fn grid(name: &str, a: &[f32; 16], b: &[f32; 16]) -> Tensor {
    let mut data = a.to_vec();
    data.extend_from_slice(b);
    Tensor::new(name, [1, 2, 4, 4], data).unwrap()
  }

  fn run(tensors: &Tensors, frame: (u32, u32)) -> Outcome {
    let geometry = LinearGeometry;
    let mut detector = HumanDetector::new(HumanConfig::default(), 16, 16);
    detector
      .process_input(&RgbImage::new(frame.0, frame.1), &geometry)
      .unwrap();
    let mut composite = CompositeBuffer::default();
    let mut ctx = OutputContext {
      geometry: &geometry,
      composite: &mut composite,
      overlay: false,
    };
    detector.process_output(tensors, &mut ctx).unwrap()
  }

  #[test]
  fn strongest_centre_defines_the_box() {
    let mut c0 = [0.0; 16];
    let mut c1 = [0.0; 16];
    c0[5] = 0.6;
    c1[10] = 0.9; // (x=2, y=2)
    let mut w = [0.0; 16];
    let mut h = [0.0; 16];
    w[10] = 1.0;
    h[10] = 2.0;
    let tensors = Tensors::new()
      .with(grid(HUMAN_CENTER, &c0, &c1))
      .with(grid(HUMAN_OFFSET, &[0.0; 16], &[0.0; 16]))
      .with(grid(HUMAN_SIZE, &w, &h));

    // 左上 (1.5, 1.0)，边长 2.2
    let Outcome::Human(rect) = run(&tensors, (400, 400)) else {
      panic!("expected a human box");
    };
    assert_eq!(rect.left, 150);
    assert_eq!(rect.top, 100);
    assert_eq!(rect.width, 220);
    assert_eq!(rect.height, 220);
  }

  #[test]
  fn weak_centres_are_not_found() {
    let weak = [0.5; 16];
    let tensors = Tensors::new()
      .with(grid(HUMAN_CENTER, &weak, &weak))
      .with(grid(HUMAN_OFFSET, &[0.0; 16], &[0.0; 16]))
      .with(grid(HUMAN_SIZE, &[1.0; 16], &[1.0; 16]));
    assert_eq!(run(&tensors, (64, 64)), Outcome::NotFound);
  }
}
