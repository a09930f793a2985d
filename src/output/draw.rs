// 该文件是 Mengban （蒙版） 项目的一部分。
// src/output/draw.rs - 合成结果可视化
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

use image::{Rgba, RgbaImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::{pipeline::AsComposite, topk::FaceRegion};

const OUTLINE_COLOR: [u8; 4] = [0, 0, 255, 255]; // 蓝色
const OUTLINE_THICKNESS: u32 = 2;

pub struct Draw {
  color: Rgba<u8>,
  thickness: u32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      color: Rgba(OUTLINE_COLOR),
      thickness: OUTLINE_THICKNESS,
    }
  }
}

impl Draw {
  // 边框向区域内侧加粗
  fn draw_region(&self, image: &mut RgbaImage, region: &FaceRegion) {
    for t in 0..self.thickness {
      let (width, height) = (
        region.width.saturating_sub(2 * t),
        region.height.saturating_sub(2 * t),
      );
      if width == 0 || height == 0 {
        break;
      }
      let rect = Rect::at((region.left + t) as i32, (region.top + t) as i32).of_size(width, height);
      draw_hollow_rect_mut(image, rect, self.color);
    }
  }

  /// 合成缓冲区转为 RGBA 图像，`outline` 时叠加人脸区域边框
  pub fn render<D: AsComposite>(&self, result: &D, outline: bool) -> Option<RgbaImage> {
    let mut image = result.composite().to_rgba_image()?;
    if outline {
      for region in result.regions() {
        self.draw_region(&mut image, region);
      }
    }
    Some(image)
  }
}

/// 合成结果全空且没有人脸区域
pub fn is_blank<D: AsComposite>(result: &D) -> bool {
  result.regions().is_empty() && result.composite().as_slice().iter().all(|&p| p == 0)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{frame::CompositeBuffer, pipeline::PortraitFrame};

  fn region(left: u32, top: u32, width: u32, height: u32) -> FaceRegion {
    FaceRegion {
      x1: left as f32,
      y1: top as f32,
      x2: (left + width) as f32,
      y2: (top + height) as f32,
      score: 0.9,
      left,
      top,
      width,
      height,
    }
  }

  #[test]
  fn outline_is_drawn_inside_region() {
    let frame = PortraitFrame {
      regions: vec![region(2, 2, 6, 6)],
      composite: CompositeBuffer::with_shape(10, 10),
      ..PortraitFrame::default()
    };
    let image = Draw::default().render(&frame, true).unwrap();
    assert_eq!(image.get_pixel(2, 2), &Rgba(OUTLINE_COLOR));
    assert_eq!(image.get_pixel(3, 3), &Rgba(OUTLINE_COLOR));
    assert_eq!(image.get_pixel(7, 7), &Rgba(OUTLINE_COLOR));
    assert_eq!(image.get_pixel(5, 5), &Rgba([0, 0, 0, 0]));
    assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));

    let plain = Draw::default().render(&frame, false).unwrap();
    assert_eq!(plain.get_pixel(2, 2), &Rgba([0, 0, 0, 0]));
  }

  #[test]
  fn composite_pixels_are_split_into_rgba() {
    let mut composite = CompositeBuffer::with_shape(1, 1);
    composite.fill(0x80ff_0010);
    let image = Draw::default().render(&composite, true).unwrap();
    assert_eq!(image.get_pixel(0, 0), &Rgba([0xff, 0x00, 0x10, 0x80]));
    assert!(!is_blank(&composite));
    assert!(is_blank(&CompositeBuffer::with_shape(2, 2)));
  }
}
