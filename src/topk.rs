// 该文件是 Mengban （蒙版） 项目的一部分。
// src/topk.rs - 最高分候选选择与裁剪区域扩展
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

use crate::{decode::Candidate, geometry::Rect};

pub const DEFAULT_TOP_K: usize = 3;
/// 逐槽插入只适合很小的 K
pub const MAX_TOP_K: usize = 16;
pub const DEFAULT_AMPLIFIER: f32 = 2.5;
pub const DEFAULT_TOP_SHIFT: f32 = 0.0;

/// 保留分数最高的 K 个候选。
///
/// 槽位按分数升序排列，新候选线性插入；分数相同时后到者替换先到者。
#[derive(Debug)]
pub struct TopK {
  slots: Vec<Option<Candidate>>,
}

impl TopK {
  pub fn new(k: usize) -> Self {
    Self {
      slots: vec![None; k],
    }
  }

  pub fn k(&self) -> usize {
    self.slots.len()
  }

  fn insert(&mut self, item: Candidate) {
    // 找到最高的、新候选不低于其分数的槽位
    let Some(pos) = self
      .slots
      .iter()
      .rposition(|slot| slot.is_none_or(|s| item.rank() >= s.rank()))
    else {
      return;
    };

    self.slots[..=pos].rotate_left(1);
    self.slots[pos] = Some(item);
  }

  /// 返回 `min(K, items.len())` 个候选，分数升序
  pub fn select(&mut self, items: &[Candidate]) -> Vec<Candidate> {
    self.slots.fill(None);
    for &item in items {
      self.insert(item);
    }
    self.slots.iter().flatten().copied().collect()
  }
}

/// 扩展后的人脸区域，供下一级模型裁剪使用
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRegion {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
  pub score: f32,
  pub left: u32,
  pub top: u32,
  pub width: u32,
  pub height: u32,
}

impl FaceRegion {
  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  pub fn rect(&self) -> Rect {
    Rect::new(self.left, self.top, self.width, self.height)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionExpansion {
  pub amplifier: f32,
  pub top_shift: f32,
}

impl Default for RegionExpansion {
  fn default() -> Self {
    Self {
      amplifier: DEFAULT_AMPLIFIER,
      top_shift: DEFAULT_TOP_SHIFT,
    }
  }
}

impl RegionExpansion {
  /// 将原图坐标下的人脸框扩展为正方形裁剪区域，并收缩到帧内
  pub fn expand(&self, face: &Candidate, frame_width: u32, frame_height: u32) -> FaceRegion {
    let (x1, y1) = (face.x1 as i32, face.y1 as i32);
    let (x2, y2) = (face.x2 as i32, face.y2 as i32);
    let w = x2 - x1;
    let h = y2 - y1;

    let cx = (x1 + x2) / 2;
    let cy = y1 + ((h / 2) as f32 * (1.0 + self.top_shift)) as i32;
    let side = (w.max(h) as f32 * self.amplifier) as i32;

    let left = (cx - side / 2).max(0);
    let top = (cy - side / 2).max(0);
    let width = side.min(frame_width as i32 - left).max(0);
    let height = side.min(frame_height as i32 - top).max(0);

    FaceRegion {
      x1: left as f32,
      y1: top as f32,
      x2: (left + width) as f32,
      y2: (top + height) as f32,
      score: face.score,
      left: left as u32,
      top: top as u32,
      width: width as u32,
      height: height as u32,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scored(score: f32) -> Candidate {
    Candidate {
      x1: score * 100.0,
      y1: 0.0,
      x2: score * 100.0 + 10.0,
      y2: 10.0,
      score,
    }
  }

  fn scores(items: &[Candidate]) -> Vec<f32> {
    items.iter().map(|c| c.score).collect()
  }

  #[test]
  fn keeps_k_largest_ascending() {
    let items: Vec<_> = [0.5, 0.9, 0.1, 0.7, 0.95, 0.3].into_iter().map(scored).collect();
    let out = TopK::new(3).select(&items);
    assert_eq!(scores(&out), vec![0.7, 0.9, 0.95]);
  }

  #[test]
  fn small_inputs_are_kept_whole() {
    let items: Vec<_> = [0.9, 0.8].into_iter().map(scored).collect();
    let out = TopK::new(3).select(&items);
    assert_eq!(scores(&out), vec![0.8, 0.9]);
    assert!(TopK::new(3).select(&[]).is_empty());
  }

  #[test]
  fn maximum_always_survives() {
    let items: Vec<_> = [0.2, 0.99, 0.4, 0.4, 0.4, 0.4].into_iter().map(scored).collect();
    let out = TopK::new(3).select(&items);
    assert_eq!(out.len(), 3);
    assert_eq!(out.last().map(|c| c.score), Some(0.99));
    assert!(out.windows(2).all(|w| w[0].score <= w[1].score));
  }

  #[test]
  fn later_equal_score_displaces_earlier() {
    let mut first = scored(0.5);
    first.x1 = 1.0;
    let mut later = scored(0.5);
    later.x1 = 2.0;
    let items = vec![scored(0.9), scored(0.8), first, scored(0.7), later];
    let out = TopK::new(3).select(&items);
    assert_eq!(scores(&out), vec![0.7, 0.8, 0.9]);

    let items = vec![scored(0.9), first, scored(0.8), later];
    let out = TopK::new(3).select(&items);
    assert_eq!(out[0].x1, 2.0);
  }

  #[test]
  fn expansion_squares_and_amplifies() {
    let face = Candidate {
      x1: 100.0,
      y1: 100.0,
      x2: 140.0,
      y2: 160.0,
      score: 0.9,
    };
    let region = RegionExpansion::default().expand(&face, 1000, 1000);
    // side = 60 * 2.5 = 150，中心 (120, 130)
    assert_eq!(region.width, 150);
    assert_eq!(region.height, 150);
    assert_eq!(region.left, 45);
    assert_eq!(region.top, 55);
    assert_eq!(region.x2, 195.0);
    assert_eq!(region.y2, 205.0);
  }

  #[test]
  fn expansion_is_clamped_to_frame() {
    let face = Candidate {
      x1: 5.0,
      y1: 180.0,
      x2: 45.0,
      y2: 220.0,
      score: 0.8,
    };
    let region = RegionExpansion::default().expand(&face, 200, 240);
    assert_eq!(region.left, 0);
    assert_eq!(region.top, 150);
    assert_eq!(region.width, 100);
    assert_eq!(region.height, 90);
    assert!(!region.is_empty());
    assert_eq!(region.rect(), Rect::new(0, 150, 100, 90));
  }
}
