// 该文件是 Mengban （蒙版） 项目的一部分。
// src/model/config.rs - 检测器配置
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

//! 检测器配置以 URL 表示，方案决定检测器种类，查询参数覆盖默认值：
//!
//! ```text
//! face://?score=0.7&iou=0.3&nms=blend&top_k=3&amplifier=2.5&top_shift=0
//! human://?score=0.5&expand=1.1
//! body://?threshold=0.9&ofd=true&miss=keep
//! head://?probability=0.5
//! accessory://?ofd=true&miss=clear
//! ```

use std::str::FromStr;

use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::ModelError,
  nms::{DEFAULT_IOU_THRESHOLD, NmsMode},
  topk::{DEFAULT_TOP_K, MAX_TOP_K, RegionExpansion},
};

pub const DEFAULT_FACE_SCORE: f32 = 0.7;
pub const DEFAULT_HUMAN_SCORE: f32 = 0.5;
pub const DEFAULT_HUMAN_EXPAND: f32 = 1.1;
pub const DEFAULT_BODY_THRESHOLD: f32 = 0.9;
pub const DEFAULT_HEAD_PROBABILITY: f32 = 0.5;

/// 检测为空时合成缓冲区的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissPolicy {
  /// 保留上一次的合成结果
  #[default]
  Keep,
  /// 清空为全透明
  Clear,
}

impl FromStr for MissPolicy {
  type Err = ModelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "keep" => Ok(MissPolicy::Keep),
      "clear" => Ok(MissPolicy::Clear),
      _ => Err(ModelError::invalid(format!("未知的 miss 策略: {}", s))),
    }
  }
}

fn parse_nms(s: &str) -> Result<NmsMode, ModelError> {
  match s {
    "blend" => Ok(NmsMode::Blend),
    "hard" => Ok(NmsMode::Hard),
    _ => Err(ModelError::invalid(format!("未知的 NMS 模式: {}", s))),
  }
}

/// 读取查询参数，缺省时返回 `default`
fn query<T>(url: &Url, key: &str, default: T) -> Result<T, ModelError>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match url.query_pairs().find(|(k, _)| k == key) {
    Some((_, v)) => v
      .parse()
      .map_err(|e| ModelError::invalid(format!("参数 {}={} 无效: {}", key, v, e))),
    None => Ok(default),
  }
}

fn check_scheme(url: &Url, scheme: &str) -> Result<(), ModelError> {
  if url.scheme() != scheme {
    return Err(ModelError::invalid(format!(
      "期望配置方案 '{}', 实际方案 '{}'",
      scheme,
      url.scheme()
    )));
  }
  Ok(())
}

fn check_unit(name: &str, value: f32) -> Result<(), ModelError> {
  if !(0.0..=1.0).contains(&value) {
    return Err(ModelError::invalid(format!(
      "{} 必须位于 [0, 1], 实际为 {}",
      name, value
    )));
  }
  Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceConfig {
  pub score_threshold: f32,
  pub iou_threshold: f32,
  pub nms: NmsMode,
  pub top_k: usize,
  pub expansion: RegionExpansion,
}

impl Default for FaceConfig {
  fn default() -> Self {
    Self {
      score_threshold: DEFAULT_FACE_SCORE,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      nms: NmsMode::default(),
      top_k: DEFAULT_TOP_K,
      expansion: RegionExpansion::default(),
    }
  }
}

impl FaceConfig {
  pub fn validate(&self) -> Result<(), ModelError> {
    check_unit("score", self.score_threshold)?;
    check_unit("iou", self.iou_threshold)?;
    if self.top_k == 0 || self.top_k > MAX_TOP_K {
      return Err(ModelError::invalid(format!(
        "top_k 必须在 1..={} 之间, 实际为 {}",
        MAX_TOP_K, self.top_k
      )));
    }
    if !(self.expansion.amplifier > 0.0) {
      return Err(ModelError::invalid(format!(
        "amplifier 必须大于 0, 实际为 {}",
        self.expansion.amplifier
      )));
    }
    if !self.expansion.top_shift.is_finite() {
      return Err(ModelError::invalid("top_shift 必须为有限值"));
    }
    Ok(())
  }
}

impl FromUrlWithScheme for FaceConfig {
  const SCHEME: &'static str = "face";
}

impl FromUrl for FaceConfig {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;
    let default = Self::default();
    let nms = match url.query_pairs().find(|(k, _)| k == "nms") {
      Some((_, v)) => parse_nms(&v)?,
      None => default.nms,
    };
    Ok(Self {
      score_threshold: query(url, "score", default.score_threshold)?,
      iou_threshold: query(url, "iou", default.iou_threshold)?,
      nms,
      top_k: query(url, "top_k", default.top_k)?,
      expansion: RegionExpansion {
        amplifier: query(url, "amplifier", default.expansion.amplifier)?,
        top_shift: query(url, "top_shift", default.expansion.top_shift)?,
      },
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HumanConfig {
  pub score_threshold: f32,
  pub expand: f32,
}

impl Default for HumanConfig {
  fn default() -> Self {
    Self {
      score_threshold: DEFAULT_HUMAN_SCORE,
      expand: DEFAULT_HUMAN_EXPAND,
    }
  }
}

impl HumanConfig {
  pub fn validate(&self) -> Result<(), ModelError> {
    check_unit("score", self.score_threshold)?;
    if !(self.expand > 0.0) {
      return Err(ModelError::invalid(format!(
        "expand 必须大于 0, 实际为 {}",
        self.expand
      )));
    }
    Ok(())
  }
}

impl FromUrlWithScheme for HumanConfig {
  const SCHEME: &'static str = "human";
}

impl FromUrl for HumanConfig {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;
    let default = Self::default();
    Ok(Self {
      score_threshold: query(url, "score", default.score_threshold)?,
      expand: query(url, "expand", default.expand)?,
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyConfig {
  pub threshold: f32,
  pub ofd: bool,
  pub miss: MissPolicy,
}

impl Default for BodyConfig {
  fn default() -> Self {
    Self {
      threshold: DEFAULT_BODY_THRESHOLD,
      ofd: true,
      miss: MissPolicy::default(),
    }
  }
}

impl BodyConfig {
  pub fn validate(&self) -> Result<(), ModelError> {
    check_unit("threshold", self.threshold)
  }
}

impl FromUrlWithScheme for BodyConfig {
  const SCHEME: &'static str = "body";
}

impl FromUrl for BodyConfig {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;
    let default = Self::default();
    Ok(Self {
      threshold: query(url, "threshold", default.threshold)?,
      ofd: query(url, "ofd", default.ofd)?,
      miss: query(url, "miss", default.miss)?,
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadConfig {
  pub probability: f32,
}

impl Default for HeadConfig {
  fn default() -> Self {
    Self {
      probability: DEFAULT_HEAD_PROBABILITY,
    }
  }
}

impl HeadConfig {
  pub fn validate(&self) -> Result<(), ModelError> {
    if !(self.probability > 0.0 && self.probability < 1.0) {
      return Err(ModelError::invalid(format!(
        "probability 必须位于 (0, 1), 实际为 {}",
        self.probability
      )));
    }
    Ok(())
  }
}

impl FromUrlWithScheme for HeadConfig {
  const SCHEME: &'static str = "head";
}

impl FromUrl for HeadConfig {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;
    Ok(Self {
      probability: query(url, "probability", DEFAULT_HEAD_PROBABILITY)?,
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccessoryConfig {
  pub ofd: bool,
  pub miss: MissPolicy,
}

impl Default for AccessoryConfig {
  fn default() -> Self {
    Self {
      ofd: true,
      miss: MissPolicy::default(),
    }
  }
}

impl FromUrlWithScheme for AccessoryConfig {
  const SCHEME: &'static str = "accessory";
}

impl FromUrl for AccessoryConfig {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;
    let default = Self::default();
    Ok(Self {
      ofd: query(url, "ofd", default.ofd)?,
      miss: query(url, "miss", default.miss)?,
    })
  }
}

/// 检测器种类及其参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectorConfig {
  Face(FaceConfig),
  Human(HumanConfig),
  Body(BodyConfig),
  Head(HeadConfig),
  Accessory(AccessoryConfig),
}

impl DetectorConfig {
  pub fn validate(&self) -> Result<(), ModelError> {
    match self {
      DetectorConfig::Face(config) => config.validate(),
      DetectorConfig::Human(config) => config.validate(),
      DetectorConfig::Body(config) => config.validate(),
      DetectorConfig::Head(config) => config.validate(),
      DetectorConfig::Accessory(_) => Ok(()),
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      DetectorConfig::Face(_) => FaceConfig::SCHEME,
      DetectorConfig::Human(_) => HumanConfig::SCHEME,
      DetectorConfig::Body(_) => BodyConfig::SCHEME,
      DetectorConfig::Head(_) => HeadConfig::SCHEME,
      DetectorConfig::Accessory(_) => AccessoryConfig::SCHEME,
    }
  }

  pub fn miss_policy(&self) -> MissPolicy {
    match self {
      DetectorConfig::Body(config) => config.miss,
      DetectorConfig::Accessory(config) => config.miss,
      _ => MissPolicy::Keep,
    }
  }
}

impl FromUrl for DetectorConfig {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let config = match url.scheme() {
      FaceConfig::SCHEME => DetectorConfig::Face(FaceConfig::from_url(url)?),
      HumanConfig::SCHEME => DetectorConfig::Human(HumanConfig::from_url(url)?),
      BodyConfig::SCHEME => DetectorConfig::Body(BodyConfig::from_url(url)?),
      HeadConfig::SCHEME => DetectorConfig::Head(HeadConfig::from_url(url)?),
      AccessoryConfig::SCHEME => DetectorConfig::Accessory(AccessoryConfig::from_url(url)?),
      other => {
        return Err(ModelError::invalid(format!(
          "未知的检测器方案: {}",
          other
        )));
      }
    };
    debug!("检测器配置: {:?}", config);
    Ok(config)
  }
}
