// 该文件是 Mengban （蒙版） 项目的一部分。
// src/model/face.rs - 人脸检测后处理
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
  decode::{Candidate, decode_candidates},
  geometry::{Geometry, Letterbox},
  model::{
    FaceConfig, ModelError, Outcome, OutputContext, ProcessInputGeometry, ProcessOutputTensors,
    Tensors,
  },
  nms::Suppressor,
  prior::PriorCache,
  topk::{FaceRegion, TopK},
};

const FACE_BOXES: &str = "boxes";
const FACE_SCORES: &str = "scores";

/// 锚框式人脸检测：letterbox 输入，`boxes` `[1, N, 4, 1]` 与 `scores` `[1, N, 2, 1]` 输出
#[derive(Debug)]
pub struct FaceDetector {
  config: FaceConfig,
  width: u32,
  height: u32,
  priors: PriorCache,
  suppressor: Suppressor,
  top_k: TopK,
  letterbox: Letterbox,
  frame_size: (u32, u32),
}

impl FaceDetector {
  pub fn new(config: FaceConfig, width: u32, height: u32) -> Self {
    Self {
      config,
      width,
      height,
      priors: PriorCache::default(),
      suppressor: Suppressor::new(config.iou_threshold, config.nms),
      top_k: TopK::new(config.top_k),
      letterbox: Letterbox::identity(width, height),
      frame_size: (width, height),
    }
  }

  pub fn config(&self) -> FaceConfig {
    self.config
  }

  pub fn input_size(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  /// 模型坐标 → 原图坐标
  fn unmap(&self, c: &Candidate) -> Candidate {
    let (x1, y1) = self.letterbox.unmap(c.x1, c.y1);
    let (x2, y2) = self.letterbox.unmap(c.x2, c.y2);
    Candidate {
      x1,
      y1,
      x2,
      y2,
      score: c.score,
    }
  }
}

impl ProcessInputGeometry for FaceDetector {
  fn process_input(
    &mut self,
    frame: &RgbImage,
    geometry: &dyn Geometry,
  ) -> Result<RgbImage, ModelError> {
    self.frame_size = frame.dimensions();
    let (image, letterbox) = geometry.letterbox_rgb(frame, self.width, self.height)?;
    debug!("人脸检测 letterbox: {:?}", letterbox);
    self.letterbox = letterbox;
    Ok(image)
  }
}

impl ProcessOutputTensors for FaceDetector {
  fn process_output(
    &mut self,
    tensors: &Tensors,
    _ctx: &mut OutputContext<'_>,
  ) -> Result<Outcome, ModelError> {
    let boxes = tensors.get(FACE_BOXES)?;
    let scores = tensors.get(FACE_SCORES)?;

    let priors = self.priors.get(self.width, self.height);
    if boxes.data().len() != priors.len() * 4 || scores.data().len() != priors.len() * 2 {
      return Err(ModelError::invalid(format!(
        "锚框数量 {} 与输出张量不匹配: boxes {:?}, scores {:?}",
        priors.len(),
        boxes.dims(),
        scores.dims()
      )));
    }

    let candidates = decode_candidates(
      boxes.data(),
      scores.data(),
      priors,
      self.width as f32,
      self.height as f32,
      self.config.score_threshold,
    );
    if candidates.is_empty() {
      return Ok(Outcome::NotFound);
    }

    let merged = if candidates.len() > 1 {
      self.suppressor.suppress(&candidates)
    } else {
      candidates
    };
    let kept = self.top_k.select(&merged);

    let (frame_width, frame_height) = self.frame_size;
    let regions: Vec<FaceRegion> = kept
      .iter()
      .rev()
      .map(|c| {
        self
          .config
          .expansion
          .expand(&self.unmap(c), frame_width, frame_height)
      })
      .filter(|r| !r.is_empty())
      .collect();

    debug!("人脸区域: {:?}", regions);
    if regions.is_empty() {
      return Ok(Outcome::NotFound);
    }
    Ok(Outcome::Regions(regions))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    frame::CompositeBuffer,
    geometry::LinearGeometry,
    model::Tensor,
    prior::generate_priors,
  };

  /// 在指定锚框上放置一个分数
  fn tensors_with(width: u32, height: u32, hits: &[(usize, f32)]) -> Tensors {
    let n = generate_priors(width, height).len();
    let mut scores = vec![0.0f32; n * 2];
    for &(i, s) in hits {
      scores[i * 2 + 1] = s;
    }
    Tensors::new()
      .with(Tensor::new(FACE_BOXES, [1, n, 4, 1], vec![0.0; n * 4]).unwrap())
      .with(Tensor::new(FACE_SCORES, [1, n, 2, 1], scores).unwrap())
  }

  fn run(detector: &mut FaceDetector, frame: &RgbImage, tensors: &Tensors) -> Outcome {
    let geometry = LinearGeometry;
    detector.process_input(frame, &geometry).unwrap();
    let mut composite = CompositeBuffer::with_shape(frame.width() as usize, frame.height() as usize);
    let mut ctx = OutputContext {
      geometry: &geometry,
      composite: &mut composite,
      overlay: false,
    };
    detector.process_output(tensors, &mut ctx).unwrap()
  }

  #[test]
  fn regions_come_back_highest_first_in_frame_pixels() {
    let mut detector = FaceDetector::new(FaceConfig::default(), 64, 64);
    let frame = RgbImage::new(128, 128);
    // 步长 8 的 8x8 网格上相距较远的两个锚框
    let tensors = tensors_with(64, 64, &[(0, 0.8), (3 * 8 * 3 + 3 * 3, 0.95)]);

    let Outcome::Regions(regions) = run(&mut detector, &frame, &tensors) else {
      panic!("expected regions");
    };
    assert_eq!(regions.len(), 2);
    assert!(regions[0].score > regions[1].score);
    assert!(regions.iter().all(|r| r.left + r.width <= 128 && r.top + r.height <= 128));
  }

  #[test]
  fn below_threshold_is_not_found() {
    let mut detector = FaceDetector::new(FaceConfig::default(), 64, 64);
    let frame = RgbImage::new(64, 64);
    let tensors = tensors_with(64, 64, &[(0, 0.7), (5, 0.2)]);
    assert_eq!(run(&mut detector, &frame, &tensors), Outcome::NotFound);
  }

  #[test]
  fn prior_count_must_match() {
    let mut detector = FaceDetector::new(FaceConfig::default(), 64, 64);
    let tensors = tensors_with(32, 32, &[]);
    let geometry = LinearGeometry;
    let mut composite = CompositeBuffer::default();
    let mut ctx = OutputContext {
      geometry: &geometry,
      composite: &mut composite,
      overlay: false,
    };
    assert!(matches!(
      detector.process_output(&tensors, &mut ctx),
      Err(ModelError::InvalidConfiguration(_))
    ));
  }
}
