// 该文件是 Mengban （蒙版） 项目的一部分。
// src/model/head.rs - 头部分割
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

use std::borrow::Cow;

use image::RgbImage;
use tracing::debug;

use crate::{
  composite::{HEAD_RGB, Paint, composite},
  geometry::{Geometry, Rect},
  mask::{logit, threshold_above},
  model::{
    HeadConfig, ModelError, Outcome, OutputContext, ProcessInputGeometry, ProcessOutputTensors,
    Tensors,
  },
};

const HEAD_OUTPUT: &str = "output";

/// 在人脸扩展区域内分割头部，输出为 logit
#[derive(Debug)]
pub struct HeadDetector {
  config: HeadConfig,
  width: u32,
  height: u32,
  threshold: f32,
  region: Option<Rect>,
  crop: Rect,
  mask: Vec<u8>,
}

impl HeadDetector {
  pub fn new(config: HeadConfig, width: u32, height: u32) -> Self {
    Self {
      config,
      width,
      height,
      threshold: logit(config.probability),
      region: None,
      crop: Rect::full(width, height),
      mask: vec![0; (width * height) as usize],
    }
  }

  pub fn config(&self) -> HeadConfig {
    self.config
  }

  pub fn input_size(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  pub fn region(&self) -> Option<Rect> {
    self.region
  }

  /// 人脸扩展区域；未设置时使用整帧
  pub fn set_region(&mut self, region: Option<Rect>) {
    self.region = region;
  }
}

impl ProcessInputGeometry for HeadDetector {
  fn process_input(
    &mut self,
    frame: &RgbImage,
    geometry: &dyn Geometry,
  ) -> Result<RgbImage, ModelError> {
    let (frame_width, frame_height) = frame.dimensions();
    let full = Rect::full(frame_width, frame_height);
    self.crop = self.region.unwrap_or(full);

    let input = if self.crop == full {
      Cow::Borrowed(frame)
    } else {
      Cow::Owned(geometry.crop_rgb(frame, self.crop)?)
    };
    Ok(geometry.resize_rgb(&input, self.width, self.height)?)
  }
}

impl ProcessOutputTensors for HeadDetector {
  fn process_output(
    &mut self,
    tensors: &Tensors,
    ctx: &mut OutputContext<'_>,
  ) -> Result<Outcome, ModelError> {
    let output = tensors.get(HEAD_OUTPUT)?;
    let plane = output.plane(0, 0)?;
    let (grid_w, grid_h) = (plane.width(), plane.height());
    self.mask.resize(grid_w * grid_h, 0);

    let found = threshold_above(&plane, self.threshold, &mut self.mask)?;
    debug!("头部分割 {:?}: found = {}", self.crop, found);
    if !found {
      return Ok(Outcome::NotFound);
    }

    let crop = self.crop;
    let alpha = ctx.geometry.resize_gray(
      &self.mask,
      grid_w as u32,
      grid_h as u32,
      crop.width,
      crop.height,
    )?;
    if !ctx.overlay {
      // 区域外为透明绿色
      ctx.composite.fill(HEAD_RGB);
    }
    composite(
      alpha.as_raw(),
      crop.width as usize,
      crop.height as usize,
      ctx.composite,
      crop.left as usize,
      crop.top as usize,
      Paint::HalfAlpha {
        rgb: HEAD_RGB,
        overlay: ctx.overlay,
      },
    )?;
    Ok(Outcome::Painted)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{frame::CompositeBuffer, geometry::LinearGeometry, model::Tensor};

  fn logits(values: Vec<f32>) -> Tensors {
    Tensors::new().with(Tensor::new(HEAD_OUTPUT, [1, 1, 2, 2], values).unwrap())
  }

  fn run(overlay: bool, initial: u32) -> CompositeBuffer {
    let geometry = LinearGeometry;
    let mut detector = HeadDetector::new(HeadConfig::default(), 2, 2);
    detector.set_region(Some(Rect::new(1, 1, 2, 2)));
    detector
      .process_input(&RgbImage::new(4, 4), &geometry)
      .unwrap();

    let mut composite = CompositeBuffer::with_shape(4, 4);
    composite.fill(initial);
    let mut ctx = OutputContext {
      geometry: &geometry,
      composite: &mut composite,
      overlay,
    };
    let outcome = detector
      .process_output(&logits(vec![3.0, -3.0, 0.0, 1.0]), &mut ctx)
      .unwrap();
    assert_eq!(outcome, Outcome::Painted);
    composite
  }

  #[test]
  fn replace_mode_resets_outside_region() {
    let composite = run(false, 0xffff_ffff);
    let data = composite.as_slice();
    assert_eq!(data[0], HEAD_RGB);
    assert_eq!(data[4 + 1], 0x7f00_ff00);
    assert_eq!(data[4 + 2], HEAD_RGB);
    assert_eq!(data[2 * 4 + 1], HEAD_RGB);
    assert_eq!(data[2 * 4 + 2], 0x7f00_ff00);
  }

  #[test]
  fn overlay_mode_keeps_body() {
    let composite = run(true, 0xff00_0000);
    let data = composite.as_slice();
    assert_eq!(data[0], 0xff00_0000);
    assert_eq!(data[4 + 1], 0xff00_ff00);
    assert_eq!(data[4 + 2], 0xff00_0000);
  }

  #[test]
  fn logit_threshold_is_strict() {
    let geometry = LinearGeometry;
    let mut detector = HeadDetector::new(HeadConfig::default(), 2, 2);
    detector
      .process_input(&RgbImage::new(2, 2), &geometry)
      .unwrap();
    let mut composite = CompositeBuffer::with_shape(2, 2);
    let mut ctx = OutputContext {
      geometry: &geometry,
      composite: &mut composite,
      overlay: false,
    };
    let outcome = detector
      .process_output(&logits(vec![0.0; 4]), &mut ctx)
      .unwrap();
    assert_eq!(outcome, Outcome::NotFound);
  }
}
