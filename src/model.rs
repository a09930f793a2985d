// 该文件是 Mengban （蒙版） 项目的一部分。
// src/model.rs - 模型与检测器
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
use thiserror::Error;
use tracing::info;

use crate::{
  composite::CompositeError,
  frame::{CompositeBuffer, FrameError},
  geometry::{Geometry, GeometryError, Rect},
  mask::MaskError,
  ofd::StabilizerError,
  topk::FaceRegion,
};

/// 有状态的推理模型，输出借用自模型内部缓冲区
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer<'a>(&'a mut self, input: &Self::Input) -> Result<&'a Self::Output, Self::Error>;
}

/// 外部推理引擎：接收模型尺寸的 RGB 图像，返回具名张量
pub trait Engine {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 输入形状 `[n, c, h, w]`
  fn input_shape(&self) -> [usize; 4];
  fn forward(&mut self, input: &RgbImage) -> Result<Tensors, Self::Error>;
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("配置无效: {0}")]
  InvalidConfiguration(String),
  /// 单帧数据的长度或尺寸不一致，丢弃该帧即可，检测器仍可继续使用
  #[error("帧数据不一致: {0}")]
  Shape(String),
  #[error("几何变换失败: {0}")]
  Geometry(#[from] GeometryError),
  #[error("推理引擎错误: {0}")]
  Engine(Box<dyn std::error::Error + Send + Sync>),
}

impl ModelError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    ModelError::InvalidConfiguration(msg.into())
  }

  pub fn engine<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
    ModelError::Engine(Box::new(err))
  }
}

impl From<FrameError> for ModelError {
  fn from(err: FrameError) -> Self {
    ModelError::Shape(err.to_string())
  }
}

impl From<MaskError> for ModelError {
  fn from(err: MaskError) -> Self {
    ModelError::Shape(err.to_string())
  }
}

impl From<StabilizerError> for ModelError {
  fn from(err: StabilizerError) -> Self {
    ModelError::Shape(err.to_string())
  }
}

impl From<CompositeError> for ModelError {
  fn from(err: CompositeError) -> Self {
    ModelError::Shape(err.to_string())
  }
}

/// 单帧处理结果。未检测到目标是正常结果，不是错误。
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Outcome {
  /// 人脸扩展区域，分数从高到低
  Regions(Vec<FaceRegion>),
  /// 人体粗定位框，原图像素
  Human(Rect),
  /// 合成缓冲区已更新
  Painted,
  #[default]
  NotFound,
}

impl Outcome {
  pub fn is_found(&self) -> bool {
    !matches!(self, Outcome::NotFound)
  }
}

/// 输出处理所需的外部资源
pub struct OutputContext<'a> {
  pub geometry: &'a dyn Geometry,
  /// 与原始帧同尺寸
  pub composite: &'a mut CompositeBuffer,
  /// 为真时与已有合成结果叠加，否则覆盖
  pub overlay: bool,
}

pub trait ProcessInputGeometry {
  /// 原始帧 → 模型输入尺寸的图像，同时记录反向映射
  fn process_input(
    &mut self,
    frame: &RgbImage,
    geometry: &dyn Geometry,
  ) -> Result<RgbImage, ModelError>;
}

pub trait ProcessOutputTensors {
  fn process_output(
    &mut self,
    tensors: &Tensors,
    ctx: &mut OutputContext<'_>,
  ) -> Result<Outcome, ModelError>;
}

/// 从 `[n, c, h, w]` 取模型输入的宽高
fn input_size(shape: [usize; 4]) -> Result<(u32, u32), ModelError> {
  let [n, c, h, w] = shape;
  if n == 0 || h == 0 || w == 0 {
    return Err(ModelError::invalid(format!("模型输入形状无效: {:?}", shape)));
  }
  if c != 3 {
    return Err(ModelError::invalid(format!(
      "模型输入必须为 3 通道, 实际形状 {:?}",
      shape
    )));
  }
  let width = u32::try_from(w).map_err(|_| ModelError::invalid(format!("输入宽度过大: {}", w)))?;
  let height = u32::try_from(h).map_err(|_| ModelError::invalid(format!("输入高度过大: {}", h)))?;
  Ok((width, height))
}

/// 全部检测器种类，构造时完成配置校验
#[derive(Debug)]
pub enum Detector {
  Face(FaceDetector),
  Human(HumanDetector),
  Body(BodyDetector),
  Head(HeadDetector),
  Accessory(AccessoryDetector),
}

impl Detector {
  pub fn build(config: DetectorConfig, input_shape: [usize; 4]) -> Result<Self, ModelError> {
    config.validate()?;
    let (width, height) = input_size(input_shape)?;
    info!(
      "创建 {} 检测器, 模型输入 {}x{}",
      config.kind(),
      width,
      height
    );

    let detector = match config {
      DetectorConfig::Face(config) => Detector::Face(FaceDetector::new(config, width, height)),
      DetectorConfig::Human(config) => Detector::Human(HumanDetector::new(config, width, height)),
      DetectorConfig::Body(config) => Detector::Body(BodyDetector::new(config, width, height)),
      DetectorConfig::Head(config) => Detector::Head(HeadDetector::new(config, width, height)),
      DetectorConfig::Accessory(config) => {
        Detector::Accessory(AccessoryDetector::new(config, width, height))
      }
    };
    Ok(detector)
  }

  pub fn config(&self) -> DetectorConfig {
    match self {
      Detector::Face(d) => DetectorConfig::Face(d.config()),
      Detector::Human(d) => DetectorConfig::Human(d.config()),
      Detector::Body(d) => DetectorConfig::Body(d.config()),
      Detector::Head(d) => DetectorConfig::Head(d.config()),
      Detector::Accessory(d) => DetectorConfig::Accessory(d.config()),
    }
  }

  pub fn kind(&self) -> &'static str {
    self.config().kind()
  }

  /// 模型输入宽高
  pub fn input_size(&self) -> (u32, u32) {
    match self {
      Detector::Face(d) => d.input_size(),
      Detector::Human(d) => d.input_size(),
      Detector::Body(d) => d.input_size(),
      Detector::Head(d) => d.input_size(),
      Detector::Accessory(d) => d.input_size(),
    }
  }

  /// 模型输入尺寸变化时重建全部有状态缓冲区
  pub fn reshape(&mut self, input_shape: [usize; 4]) -> Result<(), ModelError> {
    if input_size(input_shape)? == self.input_size() {
      return Ok(());
    }
    info!("{} 检测器输入尺寸变化: {:?}", self.kind(), input_shape);
    let region = self.region();
    *self = Detector::build(self.config(), input_shape)?;
    self.set_region(region);
    Ok(())
  }

  /// 设置下一帧的裁剪区域，仅 body 与 head 使用
  pub fn set_region(&mut self, region: Option<Rect>) {
    match self {
      Detector::Body(d) => d.set_region(region),
      Detector::Head(d) => d.set_region(region),
      _ => {}
    }
  }

  /// 开关防闪烁，仅 body 与 accessory 使用；重新开启后重新预热
  pub fn set_ofd(&mut self, enabled: bool) {
    match self {
      Detector::Body(d) => d.set_ofd(enabled),
      Detector::Accessory(d) => d.set_ofd(enabled),
      _ => {}
    }
  }

  fn region(&self) -> Option<Rect> {
    match self {
      Detector::Body(d) => d.region(),
      Detector::Head(d) => d.region(),
      _ => None,
    }
  }
}

impl ProcessInputGeometry for Detector {
  fn process_input(
    &mut self,
    frame: &RgbImage,
    geometry: &dyn Geometry,
  ) -> Result<RgbImage, ModelError> {
    match self {
      Detector::Face(d) => d.process_input(frame, geometry),
      Detector::Human(d) => d.process_input(frame, geometry),
      Detector::Body(d) => d.process_input(frame, geometry),
      Detector::Head(d) => d.process_input(frame, geometry),
      Detector::Accessory(d) => d.process_input(frame, geometry),
    }
  }
}

impl ProcessOutputTensors for Detector {
  fn process_output(
    &mut self,
    tensors: &Tensors,
    ctx: &mut OutputContext<'_>,
  ) -> Result<Outcome, ModelError> {
    match self {
      Detector::Face(d) => d.process_output(tensors, ctx),
      Detector::Human(d) => d.process_output(tensors, ctx),
      Detector::Body(d) => d.process_output(tensors, ctx),
      Detector::Head(d) => d.process_output(tensors, ctx),
      Detector::Accessory(d) => d.process_output(tensors, ctx),
    }
  }
}

mod accessory;
mod body;
mod config;
mod face;
mod head;
mod human;
mod replay;
mod tensor;

pub use self::accessory::AccessoryDetector;
pub use self::body::BodyDetector;
pub use self::config::{
  AccessoryConfig, BodyConfig, DetectorConfig, FaceConfig, HeadConfig, HumanConfig, MissPolicy,
};
pub use self::face::FaceDetector;
pub use self::head::HeadDetector;
pub use self::human::HumanDetector;
pub use self::replay::MaskReplay;
pub use self::tensor::{Tensor, Tensors};
