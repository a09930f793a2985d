// 该文件是 Mengban （蒙版） 项目的一部分。
// src/pipeline.rs - 检测流水线
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

//! # 流水线
//!
//! 每帧同步执行：几何预处理 → 推理 → 后处理 → 合成。
//! 每个检测器独占自己的防闪烁缓冲区与计数器，多线程调用时需由调用方
//! 对整个流水线加锁。

use image::RgbImage;
use tracing::{debug, info};

use crate::{
  frame::CompositeBuffer,
  geometry::{Geometry, LinearGeometry, Rect},
  model::{
    Detector, DetectorConfig, Engine, MissPolicy, Model, ModelError, Outcome, OutputContext,
    ProcessInputGeometry, ProcessOutputTensors,
  },
  topk::FaceRegion,
};

/// 可交给渲染端的合成结果
pub trait AsComposite {
  fn composite(&self) -> &CompositeBuffer;

  /// 人脸区域，分数从高到低
  fn regions(&self) -> &[FaceRegion] {
    &[]
  }
}

impl AsComposite for CompositeBuffer {
  fn composite(&self) -> &CompositeBuffer {
    self
  }
}

/// 一个推理引擎与一个检测器
#[derive(Debug)]
pub struct Stage<E> {
  engine: E,
  detector: Detector,
}

impl<E: Engine> Stage<E> {
  pub fn new(engine: E, config: DetectorConfig) -> Result<Self, ModelError> {
    let detector = Detector::build(config, engine.input_shape())?;
    Ok(Self { engine, detector })
  }

  pub fn detector(&self) -> &Detector {
    &self.detector
  }

  pub fn detector_mut(&mut self) -> &mut Detector {
    &mut self.detector
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }

  fn run(
    &mut self,
    frame: &RgbImage,
    geometry: &dyn Geometry,
    composite: &mut CompositeBuffer,
    overlay: bool,
  ) -> Result<Outcome, ModelError> {
    self.detector.reshape(self.engine.input_shape())?;

    let input = self.detector.process_input(frame, geometry)?;
    let tensors = self.engine.forward(&input).map_err(ModelError::engine)?;
    let mut ctx = OutputContext {
      geometry,
      composite,
      overlay,
    };
    self.detector.process_output(&tensors, &mut ctx)
  }
}

fn apply_miss(policy: MissPolicy, composite: &mut CompositeBuffer) {
  if policy == MissPolicy::Clear {
    debug!("未检出, 清空合成缓冲区");
    composite.fill(0);
  }
}

fn ensure_frame_shape(composite: &mut CompositeBuffer, frame: &RgbImage) {
  let (width, height) = frame.dimensions();
  if composite.ensure_shape(width as usize, height as usize) {
    info!("合成缓冲区重新分配: {}x{}", width, height);
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionFrame {
  pub outcome: Outcome,
  pub composite: CompositeBuffer,
}

impl AsComposite for DetectionFrame {
  fn composite(&self) -> &CompositeBuffer {
    &self.composite
  }

  fn regions(&self) -> &[FaceRegion] {
    match &self.outcome {
      Outcome::Regions(regions) => regions,
      _ => &[],
    }
  }
}

/// 单个检测器的流水线
pub struct Detection<E, G = LinearGeometry> {
  stage: Stage<E>,
  geometry: G,
  frame: DetectionFrame,
}

impl<E: Engine> Detection<E> {
  pub fn new(engine: E, config: DetectorConfig) -> Result<Self, ModelError> {
    Self::with_geometry(engine, config, LinearGeometry)
  }
}

impl<E: Engine, G: Geometry> Detection<E, G> {
  pub fn with_geometry(engine: E, config: DetectorConfig, geometry: G) -> Result<Self, ModelError> {
    Ok(Self {
      stage: Stage::new(engine, config)?,
      geometry,
      frame: DetectionFrame::default(),
    })
  }

  pub fn detector_mut(&mut self) -> &mut Detector {
    self.stage.detector_mut()
  }

  pub fn last(&self) -> &DetectionFrame {
    &self.frame
  }
}

impl<E: Engine, G: Geometry> Model for Detection<E, G> {
  type Input = RgbImage;
  type Output = DetectionFrame;
  type Error = ModelError;

  fn infer<'a>(&'a mut self, frame: &RgbImage) -> Result<&'a DetectionFrame, ModelError> {
    ensure_frame_shape(&mut self.frame.composite, frame);

    let outcome = self
      .stage
      .run(frame, &self.geometry, &mut self.frame.composite, false)?;
    if !outcome.is_found() {
      apply_miss(self.stage.detector().config().miss_policy(), &mut self.frame.composite);
    }
    self.frame.outcome = outcome;
    Ok(&self.frame)
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortraitFrame {
  pub human: Option<Rect>,
  pub regions: Vec<FaceRegion>,
  /// 本帧是否有任何阶段写入了合成缓冲区
  pub painted: bool,
  pub composite: CompositeBuffer,
}

impl AsComposite for PortraitFrame {
  fn composite(&self) -> &CompositeBuffer {
    &self.composite
  }

  fn regions(&self) -> &[FaceRegion] {
    &self.regions
  }
}

/// 人像流水线：人体定位 → 人体分割，人脸检测 → 逐个区域头部分割
pub struct PortraitPipeline<E, G = LinearGeometry> {
  human: Stage<E>,
  body: Stage<E>,
  face: Stage<E>,
  head: Stage<E>,
  geometry: G,
  miss: MissPolicy,
  frame: PortraitFrame,
}

fn expect_kind<E>(stage: &Stage<E>, kind: &str) -> Result<(), ModelError> {
  if stage.detector.kind() != kind {
    return Err(ModelError::invalid(format!(
      "流水线需要 {} 检测器, 实际为 {}",
      kind,
      stage.detector.kind()
    )));
  }
  Ok(())
}

impl<E: Engine> PortraitPipeline<E> {
  pub fn new(human: Stage<E>, body: Stage<E>, face: Stage<E>, head: Stage<E>) -> Result<Self, ModelError> {
    Self::with_geometry(human, body, face, head, LinearGeometry)
  }
}

impl<E: Engine, G: Geometry> PortraitPipeline<E, G> {
  pub fn with_geometry(
    human: Stage<E>,
    body: Stage<E>,
    face: Stage<E>,
    head: Stage<E>,
    geometry: G,
  ) -> Result<Self, ModelError> {
    expect_kind(&human, "human")?;
    expect_kind(&body, "body")?;
    expect_kind(&face, "face")?;
    expect_kind(&head, "head")?;
    let miss = body.detector.config().miss_policy();

    Ok(Self {
      human,
      body,
      face,
      head,
      geometry,
      miss,
      frame: PortraitFrame::default(),
    })
  }

  pub fn set_ofd(&mut self, enabled: bool) {
    self.body.detector.set_ofd(enabled);
  }
}

impl<E: Engine, G: Geometry> Model for PortraitPipeline<E, G> {
  type Input = RgbImage;
  type Output = PortraitFrame;
  type Error = ModelError;

  fn infer<'a>(&'a mut self, frame: &RgbImage) -> Result<&'a PortraitFrame, ModelError> {
    ensure_frame_shape(&mut self.frame.composite, frame);
    let composite = &mut self.frame.composite;

    let human = match self.human.run(frame, &self.geometry, composite, false)? {
      Outcome::Human(rect) => Some(rect),
      _ => None,
    };
    self.body.detector.set_region(human);

    let mut painted = self.body.run(frame, &self.geometry, composite, false)?.is_found();
    if !painted {
      apply_miss(self.miss, composite);
    }

    let regions = match self.face.run(frame, &self.geometry, composite, false)? {
      Outcome::Regions(regions) => regions,
      _ => Vec::new(),
    };
    for region in &regions {
      self.head.detector.set_region(Some(region.rect()));
      if self.head.run(frame, &self.geometry, composite, painted)?.is_found() {
        painted = true;
      }
    }

    debug!(
      "人像帧: human = {:?}, {} 个人脸, painted = {}",
      human,
      regions.len(),
      painted
    );
    self.frame.human = human;
    self.frame.regions = regions;
    self.frame.painted = painted;
    Ok(&self.frame)
  }
}
