// 该文件是 Mengban （蒙版） 项目的一部分。
// src/model/replay.rs - 离线掩码回放
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

use tracing::info;

use crate::{
  composite::{BODY_RGB, Paint, composite},
  frame::{CompositeBuffer, GrayMask},
  model::{Model, ModelError},
  ofd::Stabilizer,
};

/// 把预先计算好的原始掩码依次送入防闪烁与合成，便于离线检查效果
#[derive(Debug)]
pub struct MaskReplay {
  stabilizer: Stabilizer,
  composite: CompositeBuffer,
  rgb: u32,
}

impl MaskReplay {
  pub fn new(ofd: bool) -> Self {
    Self {
      stabilizer: Stabilizer::new(0, ofd),
      composite: CompositeBuffer::default(),
      rgb: BODY_RGB,
    }
  }

  pub fn with_rgb(mut self, rgb: u32) -> Self {
    self.rgb = rgb & 0x00ff_ffff;
    self
  }

  pub fn stabilizer(&self) -> &Stabilizer {
    &self.stabilizer
  }
}

impl Model for MaskReplay {
  type Input = GrayMask;
  type Output = CompositeBuffer;
  type Error = ModelError;

  fn infer<'a>(&'a mut self, mask: &GrayMask) -> Result<&'a CompositeBuffer, ModelError> {
    let (width, height) = (mask.width(), mask.height());
    if self.composite.ensure_shape(width, height) {
      info!("掩码尺寸变化: {}x{}", width, height);
    }
    self.stabilizer.reallocate(width * height);

    let stable = self.stabilizer.push(mask.as_slice())?;
    composite(
      stable,
      width,
      height,
      &mut self.composite,
      0,
      0,
      Paint::Alpha { rgb: self.rgb },
    )?;
    Ok(&self.composite)
  }
}
