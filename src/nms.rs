// 该文件是 Mengban （蒙版） 项目的一部分。
// src/nms.rs - 非极大值抑制
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

//! 非极大值抑制（NMS）
//!
//! 两种合并策略：
//! - [`NmsMode::Hard`]：每个簇只保留分数最高的框
//! - [`NmsMode::Blend`]：以 `exp(score)` 为权重对簇内框坐标与分数加权平均，
//!   用于减小相邻帧之间的抖动

use tracing::debug;

use crate::decode::Candidate;

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NmsMode {
  Hard,
  #[default]
  Blend,
}

/// 交并比，面积按像素闭区间 `(x2 - x1 + 1) * (y2 - y1 + 1)` 计算
pub fn iou(a: &Candidate, b: &Candidate) -> f32 {
  let inner_w = a.x2.min(b.x2) - a.x1.max(b.x1) + 1.0;
  let inner_h = a.y2.min(b.y2) - a.y1.max(b.y1) + 1.0;
  if inner_w <= 0.0 || inner_h <= 0.0 {
    return 0.0;
  }

  let inner = inner_w * inner_h;
  let area_a = (a.x2 - a.x1 + 1.0) * (a.y2 - a.y1 + 1.0);
  let area_b = (b.x2 - b.x1 + 1.0) * (b.y2 - b.y1 + 1.0);
  inner / (area_a + area_b - inner)
}

/// NMS 执行器，内部缓冲在多帧间复用
#[derive(Debug, Default)]
pub struct Suppressor {
  iou_threshold: f32,
  mode: NmsMode,
  order: Vec<usize>,
  merged: Vec<bool>,
}

impl Suppressor {
  pub fn new(iou_threshold: f32, mode: NmsMode) -> Self {
    Self {
      iou_threshold,
      mode,
      order: Vec::new(),
      merged: Vec::new(),
    }
  }

  pub fn iou_threshold(&self) -> f32 {
    self.iou_threshold
  }

  pub fn mode(&self) -> NmsMode {
    self.mode
  }

  /// 聚类，返回每个簇内的输入下标。
  ///
  /// 簇按种子分数降序给出，分数相同时保持输入顺序；
  /// 簇内第一个下标即种子。
  pub fn clusters(&mut self, input: &[Candidate]) -> Vec<Vec<usize>> {
    self.order.clear();
    self.order.extend(0..input.len());
    // sort_by 是稳定排序
    self
      .order
      .sort_by(|&a, &b| input[b].rank().total_cmp(&input[a].rank()));

    self.merged.clear();
    self.merged.resize(input.len(), false);

    let mut clusters = Vec::new();
    for (pos, &seed) in self.order.iter().enumerate() {
      if self.merged[seed] {
        continue;
      }
      self.merged[seed] = true;

      let mut cluster = vec![seed];
      for &other in &self.order[pos + 1..] {
        if self.merged[other] {
          continue;
        }
        if iou(&input[seed], &input[other]) > self.iou_threshold {
          self.merged[other] = true;
          cluster.push(other);
        }
      }
      clusters.push(cluster);
    }

    clusters
  }

  /// 每个簇输出一个框，顺序与簇的发现顺序一致
  pub fn suppress(&mut self, input: &[Candidate]) -> Vec<Candidate> {
    let clusters = self.clusters(input);
    let output: Vec<Candidate> = clusters
      .iter()
      .map(|cluster| match self.mode {
        NmsMode::Hard => input[cluster[0]],
        NmsMode::Blend => blend(input, cluster),
      })
      .collect();

    debug!(
      "NMS({:?}): {} 个候选框合并为 {} 个",
      self.mode,
      input.len(),
      output.len()
    );
    output
  }
}

fn blend(input: &[Candidate], cluster: &[usize]) -> Candidate {
  let total: f32 = cluster.iter().map(|&i| input[i].score.exp()).sum();

  let mut merged = Candidate {
    x1: 0.0,
    y1: 0.0,
    x2: 0.0,
    y2: 0.0,
    score: 0.0,
  };
  for &i in cluster {
    let c = &input[i];
    let rate = c.score.exp() / total;
    merged.x1 += c.x1 * rate;
    merged.y1 += c.y1 * rate;
    merged.x2 += c.x2 * rate;
    merged.y2 += c.y2 * rate;
    merged.score += c.score * rate;
  }
  merged
}

#[cfg(test)]
mod tests {
  use super::*;

  fn boxed(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Candidate {
    Candidate {
      x1,
      y1,
      x2,
      y2,
      score,
    }
  }

  fn sample() -> Vec<Candidate> {
    vec![
      boxed(10.0, 10.0, 50.0, 50.0, 0.80),
      boxed(12.0, 11.0, 52.0, 49.0, 0.95),
      boxed(100.0, 100.0, 140.0, 150.0, 0.75),
      boxed(11.0, 9.0, 49.0, 51.0, 0.85),
      boxed(102.0, 98.0, 141.0, 149.0, 0.90),
      boxed(300.0, 10.0, 310.0, 20.0, 0.71),
    ]
  }

  #[test]
  fn iou_uses_inclusive_area() {
    let a = boxed(0.0, 0.0, 9.0, 9.0, 1.0);
    assert_eq!(iou(&a, &a), 1.0);

    let b = boxed(5.0, 0.0, 14.0, 9.0, 1.0);
    // 交集 5x10，并集 100 + 100 - 50
    assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);

    let far = boxed(20.0, 20.0, 30.0, 30.0, 1.0);
    assert_eq!(iou(&a, &far), 0.0);
  }

  #[test]
  fn every_box_lands_in_exactly_one_cluster() {
    let input = sample();
    let clusters = Suppressor::new(DEFAULT_IOU_THRESHOLD, NmsMode::Hard).clusters(&input);

    let mut seen: Vec<usize> = clusters.iter().flatten().copied().collect();
    assert_eq!(seen.len(), input.len());
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), input.len());
    assert!(clusters.iter().all(|c| !c.is_empty()));
    assert_eq!(clusters.len(), 3);
  }

  #[test]
  fn hard_mode_keeps_seeds_in_discovery_order() {
    let out = Suppressor::new(DEFAULT_IOU_THRESHOLD, NmsMode::Hard).suppress(&sample());
    let scores: Vec<f32> = out.iter().map(|c| c.score).collect();
    assert_eq!(scores, vec![0.95, 0.90, 0.71]);
  }

  #[test]
  fn hard_mode_is_idempotent() {
    let mut nms = Suppressor::new(DEFAULT_IOU_THRESHOLD, NmsMode::Hard);
    let once = nms.suppress(&sample());
    let twice = nms.suppress(&once);
    assert_eq!(once, twice);
  }

  #[test]
  fn blend_mode_averages_with_exp_weights() {
    let input = vec![
      boxed(0.0, 0.0, 10.0, 10.0, 0.9),
      boxed(2.0, 2.0, 12.0, 12.0, 0.8),
    ];
    let out = Suppressor::new(DEFAULT_IOU_THRESHOLD, NmsMode::Blend).suppress(&input);
    assert_eq!(out.len(), 1);

    let (w0, w1) = (0.9f32.exp(), 0.8f32.exp());
    let expected_x1 = 2.0 * w1 / (w0 + w1);
    let expected_score = (0.9 * w0 + 0.8 * w1) / (w0 + w1);
    assert!((out[0].x1 - expected_x1).abs() < 1e-5);
    assert!((out[0].score - expected_score).abs() < 1e-5);
    assert!(out[0].x2 > 10.0 && out[0].x2 < 12.0);
  }

  #[test]
  fn equal_scores_keep_input_order() {
    let input = vec![
      boxed(0.0, 0.0, 10.0, 10.0, 0.8),
      boxed(100.0, 0.0, 110.0, 10.0, 0.8),
      boxed(1.0, 0.0, 11.0, 10.0, 0.8),
    ];
    let clusters = Suppressor::new(DEFAULT_IOU_THRESHOLD, NmsMode::Hard).clusters(&input);
    assert_eq!(clusters, vec![vec![0, 2], vec![1]]);
  }

  #[test]
  fn nan_scores_sort_last() {
    let input = vec![
      boxed(0.0, 0.0, 10.0, 10.0, f32::NAN),
      boxed(100.0, 0.0, 110.0, 10.0, 0.5),
    ];
    let clusters = Suppressor::new(DEFAULT_IOU_THRESHOLD, NmsMode::Hard).clusters(&input);
    assert_eq!(clusters, vec![vec![1], vec![0]]);
  }
}
