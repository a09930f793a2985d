// 该文件是 Mengban （蒙版） 项目的一部分。
// src/composite.rs - 掩码合成到 ARGB 缓冲区
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

use crate::frame::CompositeBuffer;

/// 服饰分档颜色，均为半透明
pub const REGION_HIGH: u32 = 0x7f7f_0000;
pub const REGION_MID: u32 = 0x7f00_7f00;
pub const REGION_LOW: u32 = 0x7f00_007f;

pub const BODY_RGB: u32 = 0x00ff_ffff;
pub const HEAD_RGB: u32 = 0x0000_ff00;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CompositeError {
  #[error("掩码长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  MaskMismatch { expected: usize, actual: usize },
  #[error(
    "合成区域 ({left}, {top}) {width}x{height} 超出目标范围 {dest_width}x{dest_height}"
  )]
  OutOfBounds {
    left: usize,
    top: usize,
    width: usize,
    height: usize,
    dest_width: usize,
    dest_height: usize,
  },
}

/// 掩码字节到 `0xAARRGGBB` 的映射方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paint {
  /// `(a << 24) | rgb`
  Alpha { rgb: u32 },
  /// 分档：`> 0xAF`、`> 0x5F`、`> 0` 三种颜色，0 值像素不写
  Palette,
  /// 半透明 `(a >> 1) << 24`。
  ///
  /// 叠加模式与已有内容按位或，颜色随 `a` 缩放；否则直接覆盖为 `rgb`
  HalfAlpha { rgb: u32, overlay: bool },
}

/// 按通道把 `rgb` 缩放到 `a / 255`
fn tint(rgb: u32, a: u8) -> u32 {
  let scale = |shift: u32| (((rgb >> shift) & 0xff) * a as u32 / 0xff) << shift;
  scale(16) | scale(8) | scale(0)
}

impl Paint {
  #[inline]
  fn apply(self, a: u8, dst: &mut u32) {
    match self {
      Paint::Alpha { rgb } => *dst = ((a as u32) << 24) | rgb,
      Paint::Palette => {
        if a > 0xAF {
          *dst = REGION_HIGH;
        } else if a > 0x5F {
          *dst = REGION_MID;
        } else if a > 0 {
          *dst = REGION_LOW;
        }
      }
      Paint::HalfAlpha { rgb, overlay } => {
        let alpha = ((a as u32) >> 1) << 24;
        if overlay {
          *dst |= alpha | tint(rgb, a);
        } else {
          *dst = alpha | rgb;
        }
      }
    }
  }
}

/// 将 `width x height` 的掩码写入 `dest` 的 `(left, top)` 处。
///
/// 目标下标为 `(row + top) * dest.width() + (col + left)`，区域外的像素不变。
pub fn composite(
  mask: &[u8],
  width: usize,
  height: usize,
  dest: &mut CompositeBuffer,
  left: usize,
  top: usize,
  paint: Paint,
) -> Result<(), CompositeError> {
  if mask.len() != width * height {
    return Err(CompositeError::MaskMismatch {
      expected: width * height,
      actual: mask.len(),
    });
  }

  let (dest_width, dest_height) = (dest.width(), dest.height());
  if left + width > dest_width || top + height > dest_height {
    return Err(CompositeError::OutOfBounds {
      left,
      top,
      width,
      height,
      dest_width,
      dest_height,
    });
  }
  if width == 0 {
    return Ok(());
  }

  let data = dest.as_mut();
  for (row, line) in mask.chunks_exact(width).enumerate() {
    let start = (row + top) * dest_width + left;
    for (&a, dst) in line.iter().zip(&mut data[start..start + width]) {
      paint.apply(a, dst);
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn writes_only_inside_offset_region() {
    let mut dest = CompositeBuffer::with_shape(10, 10);
    dest.fill(0x1234_5678);
    composite(
      &[0xFF; 4],
      2,
      2,
      &mut dest,
      3,
      4,
      Paint::Alpha { rgb: BODY_RGB },
    )
    .unwrap();

    for (i, &v) in dest.as_slice().iter().enumerate() {
      if [43, 44, 53, 54].contains(&i) {
        assert_eq!(v, 0xffff_ffff, "index {i}");
      } else {
        assert_eq!(v, 0x1234_5678, "index {i}");
      }
    }
  }

  #[test]
  fn region_palette_skips_zero() {
    let mut dest = CompositeBuffer::with_shape(4, 1);
    dest.fill(1);
    composite(&[0x00, 0xFF, 0xAF, 0x5F], 4, 1, &mut dest, 0, 0, Paint::Palette).unwrap();
    assert_eq!(dest.as_slice(), &[1, REGION_HIGH, REGION_MID, REGION_LOW]);
  }

  #[test]
  fn half_alpha_modes() {
    let mut dest = CompositeBuffer::with_shape(2, 1);
    dest.fill(0xff00_0000);
    let paint = Paint::HalfAlpha {
      rgb: HEAD_RGB,
      overlay: true,
    };
    composite(&[0xFF, 0x00], 2, 1, &mut dest, 0, 0, paint).unwrap();
    assert_eq!(dest.as_slice(), &[0xff00_ff00, 0xff00_0000]);

    let paint = Paint::HalfAlpha {
      rgb: HEAD_RGB,
      overlay: false,
    };
    composite(&[0xFF, 0x00], 2, 1, &mut dest, 0, 0, paint).unwrap();
    assert_eq!(dest.as_slice(), &[0x7f00_ff00, 0x0000_ff00]);
  }

  #[test]
  fn region_must_fit() {
    let mut dest = CompositeBuffer::with_shape(4, 4);
    assert!(matches!(
      composite(&[0; 4], 2, 2, &mut dest, 3, 0, Paint::Palette),
      Err(CompositeError::OutOfBounds { .. })
    ));
    assert!(matches!(
      composite(&[0; 3], 2, 2, &mut dest, 0, 0, Paint::Palette),
      Err(CompositeError::MaskMismatch { .. })
    ));
  }
}
