// 该文件是 Mengban （蒙版） 项目的一部分。
// src/model/accessory.rs - 服饰分割
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
  composite::{Paint, composite},
  frame::ScorePlane,
  geometry::Geometry,
  mask::{ACCESSORY_PALETTE, classify},
  model::{
    AccessoryConfig, ModelError, Outcome, OutputContext, ProcessInputGeometry,
    ProcessOutputTensors, Tensors,
  },
  ofd::Stabilizer,
};

/// 类别声明顺序即平局时的优先顺序
const ACCESSORY_CLASSES: [&str; 4] = ["background", "hats", "upper_clothes", "lower_clothes"];

#[derive(Debug)]
pub struct AccessoryDetector {
  config: AccessoryConfig,
  width: u32,
  height: u32,
  stabilizer: Stabilizer,
  frame_size: (u32, u32),
}

impl AccessoryDetector {
  pub fn new(config: AccessoryConfig, width: u32, height: u32) -> Self {
    Self {
      config,
      width,
      height,
      stabilizer: Stabilizer::new((width * height) as usize, config.ofd),
      frame_size: (width, height),
    }
  }

  pub fn config(&self) -> AccessoryConfig {
    self.config
  }

  pub fn input_size(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  pub fn set_ofd(&mut self, enabled: bool) {
    self.config.ofd = enabled;
    self.stabilizer.set_enabled(enabled);
  }
}

impl ProcessInputGeometry for AccessoryDetector {
  fn process_input(
    &mut self,
    frame: &RgbImage,
    geometry: &dyn Geometry,
  ) -> Result<RgbImage, ModelError> {
    self.frame_size = frame.dimensions();
    Ok(geometry.resize_rgb(frame, self.width, self.height)?)
  }
}

impl ProcessOutputTensors for AccessoryDetector {
  fn process_output(
    &mut self,
    tensors: &Tensors,
    ctx: &mut OutputContext<'_>,
  ) -> Result<Outcome, ModelError> {
    let mut planes: Vec<ScorePlane<'_>> = Vec::with_capacity(ACCESSORY_CLASSES.len());
    for name in ACCESSORY_CLASSES {
      planes.push(tensors.get(name)?.plane(0, 0)?);
    }
    let (grid_w, grid_h) = (planes[0].width(), planes[0].height());
    self.stabilizer.reallocate(grid_w * grid_h);

    let stats = classify(&planes, &ACCESSORY_PALETTE, self.stabilizer.next_mut())?;
    debug!(
      "服饰占比: 背景 {:.3}, 帽子 {:.3}, 上衣 {:.3}, 下装 {:.3}",
      stats.ratio(0),
      stats.ratio(1),
      stats.ratio(2),
      stats.ratio(3)
    );
    let mask = self.stabilizer.stabilize();
    if stats.counts()[0] == stats.total() {
      return Ok(Outcome::NotFound);
    }

    let (frame_w, frame_h) = self.frame_size;
    let resized = ctx
      .geometry
      .resize_gray(mask, grid_w as u32, grid_h as u32, frame_w, frame_h)?;
    ctx.composite.fill(0);
    composite(
      resized.as_raw(),
      frame_w as usize,
      frame_h as usize,
      ctx.composite,
      0,
      0,
      Paint::Palette,
    )?;
    Ok(Outcome::Painted)
  }
}
