// 该文件是 Mengban （蒙版） 项目的一部分。
// src/geometry.rs - 图像几何变换（缩放、裁剪、加边）
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

//! # 几何变换
//!
//! 后处理只依赖 [`Geometry`] 约定的三个操作：
//! - 缩放：输出尺寸严格等于目标尺寸，双线性插值
//! - 裁剪：区域必须完全落在源图内
//! - 等比缩放加边（letterbox）：居中放置，边框填 0
//!
//! 任何目标尺寸为 0 的调用都返回 [`GeometryError::InvalidSize`]。
//! [`LinearGeometry`] 是基于 `image` 的 CPU 实现，其他后端（GPU、NPU 自带的
//! 预处理单元）实现同一 trait 即可替换。

use image::{
  GrayImage, ImageBuffer, Luma, RgbImage,
  imageops::{self, FilterType},
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
  #[error("尺寸无效: {width}x{height}")]
  InvalidSize { width: u32, height: u32 },
  #[error("源数据长度不匹配: {width}x{height}, 实际长度 {actual}")]
  SourceMismatch { width: u32, height: u32, actual: usize },
  #[error("区域 {rect:?} 超出图像范围 {width}x{height}")]
  OutOfBounds { rect: Rect, width: u32, height: u32 },
}

fn check_size(width: u32, height: u32) -> Result<(), GeometryError> {
  if width == 0 || height == 0 {
    return Err(GeometryError::InvalidSize { width, height });
  }
  Ok(())
}

/// 像素矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
  pub left: u32,
  pub top: u32,
  pub width: u32,
  pub height: u32,
}

impl Rect {
  pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
    Self {
      left,
      top,
      width,
      height,
    }
  }

  pub fn full(width: u32, height: u32) -> Self {
    Self::new(0, 0, width, height)
  }

  pub fn right(&self) -> u32 {
    self.left + self.width
  }

  pub fn bottom(&self) -> u32 {
    self.top + self.height
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  pub fn fits_in(&self, width: u32, height: u32) -> bool {
    self.right() <= width && self.bottom() <= height
  }
}

/// 等比缩放加边的参数，用于把模型坐标映射回原图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub dx: i32,
  pub dy: i32,
  pub inner_width: u32,
  pub inner_height: u32,
}

impl Letterbox {
  pub fn identity(width: u32, height: u32) -> Self {
    Self {
      scale: 1.0,
      dx: 0,
      dy: 0,
      inner_width: width,
      inner_height: height,
    }
  }

  /// 计算把 `src` 等比放入 `dst` 的缩放与偏移
  pub fn fit(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> Self {
    let (iw, ih) = (src_width as i64, src_height as i64);
    let (ow, oh) = (dst_width as i64, dst_height as i64);

    let mut nw = ow;
    let mut nh = nw * ih / iw;
    let mut scale = ow as f32 / iw as f32;
    if nh > oh {
      nh = oh;
      nw = nh * iw / ih;
      scale = oh as f32 / ih as f32;
    }

    Self {
      scale,
      dx: ((ow - nw) / 2) as i32,
      dy: ((oh - nh) / 2) as i32,
      inner_width: nw as u32,
      inner_height: nh as u32,
    }
  }

  /// 模型坐标 → 原图坐标
  pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
    (
      (x - self.dx as f32) / self.scale,
      (y - self.dy as f32) / self.scale,
    )
  }
}

pub trait Geometry {
  fn resize_rgb(&self, src: &RgbImage, width: u32, height: u32) -> Result<RgbImage, GeometryError>;

  /// 缩放行优先的单通道数据
  fn resize_gray(
    &self,
    src: &[u8],
    src_width: u32,
    src_height: u32,
    width: u32,
    height: u32,
  ) -> Result<GrayImage, GeometryError>;

  fn crop_rgb(&self, src: &RgbImage, rect: Rect) -> Result<RgbImage, GeometryError>;

  fn letterbox_rgb(
    &self,
    src: &RgbImage,
    width: u32,
    height: u32,
  ) -> Result<(RgbImage, Letterbox), GeometryError> {
    check_size(width, height)?;
    check_size(src.width(), src.height())?;

    let letterbox = Letterbox::fit(src.width(), src.height(), width, height);
    let resized = self.resize_rgb(src, letterbox.inner_width, letterbox.inner_height)?;
    let mut canvas = RgbImage::new(width, height);
    imageops::replace(
      &mut canvas,
      &resized,
      letterbox.dx as i64,
      letterbox.dy as i64,
    );
    Ok((canvas, letterbox))
  }
}

/// 基于 `image` 的 CPU 实现，双线性（Triangle）插值
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearGeometry;

impl Geometry for LinearGeometry {
  fn resize_rgb(&self, src: &RgbImage, width: u32, height: u32) -> Result<RgbImage, GeometryError> {
    check_size(width, height)?;
    check_size(src.width(), src.height())?;
    if src.dimensions() == (width, height) {
      return Ok(src.clone());
    }
    Ok(imageops::resize(src, width, height, FilterType::Triangle))
  }

  fn resize_gray(
    &self,
    src: &[u8],
    src_width: u32,
    src_height: u32,
    width: u32,
    height: u32,
  ) -> Result<GrayImage, GeometryError> {
    check_size(width, height)?;
    check_size(src_width, src_height)?;
    let mismatch = GeometryError::SourceMismatch {
      width: src_width,
      height: src_height,
      actual: src.len(),
    };
    // from_raw 只拒绝过短的缓冲区，长度必须严格相等
    if src.len() as u64 != src_width as u64 * src_height as u64 {
      return Err(mismatch);
    }
    if (src_width, src_height) == (width, height) {
      return GrayImage::from_raw(width, height, src.to_vec()).ok_or(mismatch);
    }
    let view = ImageBuffer::<Luma<u8>, &[u8]>::from_raw(src_width, src_height, src).ok_or(mismatch)?;
    Ok(imageops::resize(&view, width, height, FilterType::Triangle))
  }

  fn crop_rgb(&self, src: &RgbImage, rect: Rect) -> Result<RgbImage, GeometryError> {
    check_size(rect.width, rect.height)?;
    if !rect.fits_in(src.width(), src.height()) {
      return Err(GeometryError::OutOfBounds {
        rect,
        width: src.width(),
        height: src.height(),
      });
    }
    Ok(imageops::crop_imm(src, rect.left, rect.top, rect.width, rect.height).to_image())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn letterbox_fits_wide_source() {
    let lb = Letterbox::fit(640, 480, 320, 320);
    assert_eq!(lb.inner_width, 320);
    assert_eq!(lb.inner_height, 240);
    assert_eq!((lb.dx, lb.dy), (0, 40));
    assert_eq!(lb.scale, 0.5);
    assert_eq!(lb.unmap(160.0, 40.0), (320.0, 0.0));
  }

  #[test]
  fn letterbox_fits_tall_source() {
    let lb = Letterbox::fit(480, 640, 320, 320);
    assert_eq!((lb.inner_width, lb.inner_height), (240, 320));
    assert_eq!((lb.dx, lb.dy), (40, 0));
  }

  #[test]
  fn letterbox_image_has_black_border() {
    let src = RgbImage::from_pixel(64, 32, image::Rgb([200, 200, 200]));
    let (out, lb) = LinearGeometry.letterbox_rgb(&src, 32, 32).unwrap();
    assert_eq!(out.dimensions(), (32, 32));
    assert_eq!(lb.dy, 8);
    assert_eq!(out.get_pixel(16, 0).0, [0, 0, 0]);
    assert_eq!(out.get_pixel(16, 16).0, [200, 200, 200]);
  }

  #[test]
  fn zero_target_is_rejected() {
    let src = RgbImage::new(4, 4);
    assert_eq!(
      LinearGeometry.resize_rgb(&src, 0, 4).unwrap_err(),
      GeometryError::InvalidSize {
        width: 0,
        height: 4
      }
    );
  }

  #[test]
  fn crop_checks_bounds() {
    let src = RgbImage::new(10, 10);
    assert!(LinearGeometry.crop_rgb(&src, Rect::new(5, 5, 5, 5)).is_ok());
    assert!(matches!(
      LinearGeometry.crop_rgb(&src, Rect::new(6, 5, 5, 5)),
      Err(GeometryError::OutOfBounds { .. })
    ));
  }

  #[test]
  fn gray_resize_keeps_uniform_values() {
    let src = [0xffu8; 16];
    let out = LinearGeometry.resize_gray(&src, 4, 4, 8, 6).unwrap();
    assert_eq!(out.dimensions(), (8, 6));
    assert!(out.pixels().all(|p| p.0[0] == 0xff));

    let same = LinearGeometry.resize_gray(&[1, 2, 3, 4], 2, 2, 2, 2).unwrap();
    assert_eq!(same.into_raw(), vec![1, 2, 3, 4]);
    assert!(matches!(
      LinearGeometry.resize_gray(&[1, 2, 3], 2, 2, 4, 4),
      Err(GeometryError::SourceMismatch { .. })
    ));
  }

  #[test]
  fn gray_resize_rejects_oversized_source() {
    let src = [0u8; 10];
    for (w, h) in [(4, 4), (2, 2)] {
      assert_eq!(
        LinearGeometry.resize_gray(&src, 2, 2, w, h).unwrap_err(),
        GeometryError::SourceMismatch {
          width: 2,
          height: 2,
          actual: 10
        }
      );
    }
  }
}
