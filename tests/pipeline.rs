// 该文件是 Mengban （蒙版） 项目的一部分。
// tests/pipeline.rs - 流水线集成测试
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

use std::collections::VecDeque;

use image::RgbImage;
use mengban::{
  geometry::Rect,
  model::{
    BodyConfig, DetectorConfig, Engine, FaceConfig, HeadConfig, HumanConfig, MissPolicy, Model,
    ModelError, Outcome, Tensor, Tensors,
  },
  pipeline::{AsComposite, Detection, PortraitPipeline, Stage},
  prior::generate_priors,
  topk::RegionExpansion,
};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("脚本错误: {0}")]
struct ScriptError(String);

/// 按顺序返回预先准备好的张量
struct ScriptedEngine {
  shape: [usize; 4],
  script: VecDeque<Result<Tensors, ScriptError>>,
  inputs: Vec<(u32, u32)>,
}

impl ScriptedEngine {
  fn new(shape: [usize; 4]) -> Self {
    Self {
      shape,
      script: VecDeque::new(),
      inputs: Vec::new(),
    }
  }

  fn then(mut self, tensors: Tensors) -> Self {
    self.script.push_back(Ok(tensors));
    self
  }

  fn then_fail(mut self, msg: &str) -> Self {
    self.script.push_back(Err(ScriptError(msg.to_string())));
    self
  }
}

impl Engine for ScriptedEngine {
  type Error = ScriptError;

  fn input_shape(&self) -> [usize; 4] {
    self.shape
  }

  fn forward(&mut self, input: &RgbImage) -> Result<Tensors, ScriptError> {
    self.inputs.push(input.dimensions());
    self
      .script
      .pop_front()
      .unwrap_or_else(|| Err(ScriptError("脚本耗尽".to_string())))
  }
}

fn plane(name: &str, channels: usize, h: usize, w: usize, value: f32) -> Tensor {
  Tensor::new(name, [1, channels, h, w], vec![value; channels * h * w]).unwrap()
}

fn body_scores(value: f32) -> Tensors {
  Tensors::new().with(plane("human", 1, 2, 2, value))
}

fn body_config(miss: MissPolicy) -> DetectorConfig {
  DetectorConfig::Body(BodyConfig {
    ofd: false,
    miss,
    ..BodyConfig::default()
  })
}

fn frame(width: u32, height: u32) -> RgbImage {
  RgbImage::new(width, height)
}

#[test]
fn body_detection_paints_whole_frame() {
  let engine = ScriptedEngine::new([1, 3, 2, 2]).then(body_scores(0.0));
  let mut detection = Detection::new(engine, body_config(MissPolicy::Keep)).unwrap();

  let result = detection.infer(&frame(4, 4)).unwrap();
  assert_eq!(result.outcome, Outcome::Painted);
  assert_eq!(result.composite.width(), 4);
  assert_eq!(result.composite.height(), 4);
  assert!(result.composite.as_slice().iter().all(|&p| p == 0xffff_ffff));
  assert!(result.regions().is_empty());
}

#[test]
fn miss_keeps_previous_composite() {
  let engine = ScriptedEngine::new([1, 3, 2, 2])
    .then(body_scores(0.0))
    .then(body_scores(1.0));
  let mut detection = Detection::new(engine, body_config(MissPolicy::Keep)).unwrap();

  detection.infer(&frame(4, 4)).unwrap();
  let result = detection.infer(&frame(4, 4)).unwrap();
  assert_eq!(result.outcome, Outcome::NotFound);
  assert!(result.composite.as_slice().iter().all(|&p| p == 0xffff_ffff));
}

#[test]
fn miss_clears_composite_when_configured() {
  let engine = ScriptedEngine::new([1, 3, 2, 2])
    .then(body_scores(0.0))
    .then(body_scores(1.0));
  let mut detection = Detection::new(engine, body_config(MissPolicy::Clear)).unwrap();

  detection.infer(&frame(4, 4)).unwrap();
  let result = detection.infer(&frame(4, 4)).unwrap();
  assert_eq!(result.outcome, Outcome::NotFound);
  assert!(result.composite.as_slice().iter().all(|&p| p == 0));
}

#[test]
fn frame_size_change_reallocates_composite() {
  let engine = ScriptedEngine::new([1, 3, 2, 2])
    .then(body_scores(0.0))
    .then(body_scores(0.0));
  let mut detection = Detection::new(engine, body_config(MissPolicy::Keep)).unwrap();

  detection.infer(&frame(4, 4)).unwrap();
  let result = detection.infer(&frame(6, 3)).unwrap();
  assert_eq!(result.composite.width(), 6);
  assert_eq!(result.composite.height(), 3);
  assert_eq!(result.composite.as_slice().len(), 18);
}

#[test]
fn missing_tensor_is_invalid_configuration() {
  let engine = ScriptedEngine::new([1, 3, 2, 2]).then(Tensors::new());
  let mut detection = Detection::new(engine, body_config(MissPolicy::Keep)).unwrap();

  assert!(matches!(
    detection.infer(&frame(4, 4)),
    Err(ModelError::InvalidConfiguration(_))
  ));
}

#[test]
fn engine_failure_is_propagated() {
  let engine = ScriptedEngine::new([1, 3, 2, 2]).then_fail("设备离线");
  let mut detection = Detection::new(engine, body_config(MissPolicy::Keep)).unwrap();

  let err = detection.infer(&frame(4, 4)).unwrap_err();
  assert!(matches!(err, ModelError::Engine(_)));
  assert!(err.to_string().contains("设备离线"));
}

#[test]
fn invalid_engine_shape_fails_at_construction() {
  let engine = ScriptedEngine::new([1, 3, 0, 2]);
  assert!(matches!(
    Detection::new(engine, body_config(MissPolicy::Keep)),
    Err(ModelError::InvalidConfiguration(_))
  ));
}

const FACE_SIZE: usize = 32;
// 步长 8 网格 (1, 1) 处边长 16 的锚框，对应 [4, 4, 20, 20]
const FACE_PRIOR: usize = 16;

fn face_tensors(hit: bool) -> Tensors {
  let n = generate_priors(FACE_SIZE as u32, FACE_SIZE as u32).len();
  let mut scores = vec![0.0f32; n * 2];
  if hit {
    scores[FACE_PRIOR * 2 + 1] = 0.95;
  }
  Tensors::new()
    .with(Tensor::new("boxes", [1, n, 4, 1], vec![0.0; n * 4]).unwrap())
    .with(Tensor::new("scores", [1, n, 2, 1], scores).unwrap())
}

fn human_tensors(center: Option<usize>) -> Tensors {
  let mut heatmap = vec![0.0f32; 2 * 16];
  if let Some(idx) = center {
    heatmap[idx] = 0.9;
  }
  Tensors::new()
    .with(Tensor::new("739", [1, 2, 4, 4], heatmap).unwrap())
    .with(plane("743", 2, 4, 4, 0.0))
    .with(plane("747", 2, 4, 4, 2.0))
}

fn portrait(
  human: ScriptedEngine,
  body: ScriptedEngine,
  face: ScriptedEngine,
  head: ScriptedEngine,
) -> PortraitPipeline<ScriptedEngine> {
  let face_config = FaceConfig {
    expansion: RegionExpansion {
      amplifier: 1.0,
      top_shift: 0.0,
    },
    ..FaceConfig::default()
  };
  PortraitPipeline::new(
    Stage::new(human, DetectorConfig::Human(HumanConfig::default())).unwrap(),
    Stage::new(body, body_config(MissPolicy::Keep)).unwrap(),
    Stage::new(face, DetectorConfig::Face(face_config)).unwrap(),
    Stage::new(head, DetectorConfig::Head(HeadConfig::default())).unwrap(),
  )
  .unwrap()
}

#[test]
fn portrait_pipeline_checks_stage_kinds() {
  let stage = |config| Stage::new(ScriptedEngine::new([1, 3, 2, 2]), config).unwrap();
  let result = PortraitPipeline::new(
    stage(body_config(MissPolicy::Keep)),
    stage(body_config(MissPolicy::Keep)),
    stage(DetectorConfig::Face(FaceConfig::default())),
    stage(DetectorConfig::Head(HeadConfig::default())),
  );
  assert!(matches!(result, Err(ModelError::InvalidConfiguration(_))));
}

#[test]
fn portrait_pipeline_paints_head_over_cleared_background() {
  let mut pipeline = portrait(
    ScriptedEngine::new([1, 3, 4, 4]).then(human_tensors(None)),
    ScriptedEngine::new([1, 3, 2, 2]).then(body_scores(1.0)),
    ScriptedEngine::new([1, 3, FACE_SIZE, FACE_SIZE]).then(face_tensors(true)),
    ScriptedEngine::new([1, 3, 2, 2]).then(Tensors::new().with(plane("output", 1, 2, 2, 5.0))),
  );

  let result = pipeline.infer(&frame(32, 32)).unwrap();
  assert_eq!(result.human, None);
  assert!(result.painted);
  assert_eq!(result.regions.len(), 1);
  assert_eq!(result.regions[0].rect(), Rect::new(4, 4, 16, 16));

  let composite = result.composite();
  let at = |x: usize, y: usize| composite.as_slice()[y * composite.width() + x];
  assert_eq!(at(0, 0), 0x0000_ff00);
  assert_eq!(at(31, 31), 0x0000_ff00);
  assert_eq!(at(10, 10), 0x7f00_ff00);
}

#[test]
fn portrait_pipeline_crops_body_to_human() {
  let mut pipeline = portrait(
    // 网格 (1, 1) 第一通道
    ScriptedEngine::new([1, 3, 4, 4]).then(human_tensors(Some(5))),
    ScriptedEngine::new([1, 3, 2, 2]).then(body_scores(0.0)),
    ScriptedEngine::new([1, 3, FACE_SIZE, FACE_SIZE]).then(face_tensors(false)),
    ScriptedEngine::new([1, 3, 2, 2]),
  );

  let result = pipeline.infer(&frame(32, 32)).unwrap();
  let human = result.human.unwrap();
  assert_eq!((human.left, human.top), (0, 0));
  assert!(human.width < 27 && human.height < 27);
  assert!(result.painted);
  assert!(result.regions.is_empty());

  let composite = result.composite();
  let at = |x: usize, y: usize| composite.as_slice()[y * composite.width() + x];
  assert_eq!(at(0, 0), 0xffff_ffff);
  assert_eq!(at(31, 31), 0);
}
