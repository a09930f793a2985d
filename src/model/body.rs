// 该文件是 Mengban （蒙版） 项目的一部分。
// src/model/body.rs - 人体二值分割
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
use tracing::{debug, warn};

use crate::{
  composite::{BODY_RGB, Paint, composite},
  geometry::{Geometry, Rect},
  mask::threshold_below,
  model::{
    BodyConfig, ModelError, Outcome, OutputContext, ProcessInputGeometry, ProcessOutputTensors,
    Tensors,
  },
  ofd::Stabilizer,
};

const BODY_OUTPUT: &str = "human";

/// 与整帧相差不超过该像素数时不裁剪
const CROP_TOLERANCE: u32 = 5;

#[derive(Debug)]
pub struct BodyDetector {
  config: BodyConfig,
  width: u32,
  height: u32,
  stabilizer: Stabilizer,
  region: Option<Rect>,
  crop: Rect,
}

impl BodyDetector {
  pub fn new(config: BodyConfig, width: u32, height: u32) -> Self {
    Self {
      config,
      width,
      height,
      stabilizer: Stabilizer::new((width * height) as usize, config.ofd),
      region: None,
      crop: Rect::full(width, height),
    }
  }

  pub fn config(&self) -> BodyConfig {
    self.config
  }

  pub fn input_size(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  pub fn region(&self) -> Option<Rect> {
    self.region
  }

  /// 人体粗定位框，下一帧按其裁剪
  pub fn set_region(&mut self, region: Option<Rect>) {
    self.region = region;
  }

  pub fn stabilizer(&self) -> &Stabilizer {
    &self.stabilizer
  }

  pub fn set_ofd(&mut self, enabled: bool) {
    self.config.ofd = enabled;
    self.stabilizer.set_enabled(enabled);
  }

  fn crop_for(&self, frame_width: u32, frame_height: u32) -> Rect {
    let full = Rect::full(frame_width, frame_height);
    let Some(region) = self.region else {
      return full;
    };
    if region.is_empty() || !region.fits_in(frame_width, frame_height) {
      warn!("人体区域 {:?} 超出帧范围, 使用整帧", region);
      return full;
    }
    if frame_width.abs_diff(region.width) > CROP_TOLERANCE
      || frame_height.abs_diff(region.height) > CROP_TOLERANCE
    {
      region
    } else {
      full
    }
  }
}

impl ProcessInputGeometry for BodyDetector {
  fn process_input(
    &mut self,
    frame: &RgbImage,
    geometry: &dyn Geometry,
  ) -> Result<RgbImage, ModelError> {
    let (frame_width, frame_height) = frame.dimensions();
    self.crop = self.crop_for(frame_width, frame_height);

    let input = if self.crop == Rect::full(frame_width, frame_height) {
      Cow::Borrowed(frame)
    } else {
      debug!("裁剪人体区域: {:?}", self.crop);
      Cow::Owned(geometry.crop_rgb(frame, self.crop)?)
    };
    Ok(geometry.resize_rgb(&input, self.width, self.height)?)
  }
}

impl ProcessOutputTensors for BodyDetector {
  fn process_output(
    &mut self,
    tensors: &Tensors,
    ctx: &mut OutputContext<'_>,
  ) -> Result<Outcome, ModelError> {
    let output = tensors.get(BODY_OUTPUT)?;
    let plane = output.plane(0, 0)?;
    let (grid_w, grid_h) = (plane.width(), plane.height());
    self.stabilizer.reallocate(grid_w * grid_h);

    // 未检出时也送入防闪烁，保持帧序连续
    let found = threshold_below(&plane, self.config.threshold, self.stabilizer.next_mut())?;
    let mask = self.stabilizer.stabilize();
    debug!("人体分割: found = {}", found);
    if !found {
      return Ok(Outcome::NotFound);
    }

    let crop = self.crop;
    let alpha = ctx
      .geometry
      .resize_gray(mask, grid_w as u32, grid_h as u32, crop.width, crop.height)?;
    ctx.composite.fill(0);
    composite(
      alpha.as_raw(),
      crop.width as usize,
      crop.height as usize,
      ctx.composite,
      crop.left as usize,
      crop.top as usize,
      Paint::Alpha { rgb: BODY_RGB },
    )?;
    Ok(Outcome::Painted)
  }
}
