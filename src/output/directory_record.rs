// 该文件是 Mengban （蒙版） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{Datelike, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{
    Render,
    draw::{Draw, is_blank},
  },
  pipeline::AsComposite,
  topk::FaceRegion,
  url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("路径解码失败: {0}")]
  PathDecode(#[from] std::string::FromUtf8Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("合成缓冲区尺寸无效")]
  InvalidComposite,
}

/// 人脸区域写入与 PNG 同名的 `.json` 文件
pub struct Record;

impl Record {
  pub fn record(&self, regions: &[FaceRegion], path: &Path) -> Result<(), DirectoryRecordOutputError> {
    let records: Vec<_> = regions
      .iter()
      .map(|r| {
        json!({
          "score": r.score,
          "box": [r.x1, r.y1, r.x2, r.y2],
          "region": [r.left, r.top, r.width, r.height],
        })
      })
      .collect();
    let text = serde_json::to_string_pretty(&records)?;
    std::fs::write(path.with_extension("json"), text)?;
    Ok(())
  }
}

/// 按日期分目录逐帧保存合成结果
///
/// 查询参数：`record` 额外写入人脸区域，`outline` 绘制区域边框，
/// `always` 连空白帧也保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  record: Option<Record>,
  outline: bool,
  frame_counter: AtomicU32,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let has = |key: &str| uri.query_pairs().any(|(k, _)| k == key);

    Ok(DirectoryRecordOutput {
      directory: url_path(uri)?,
      draw: Draw::default(),
      record: has("record").then_some(Record),
      outline: has("outline"),
      frame_counter: AtomicU32::new(0),
      always: has("always"),
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u32 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl<F, D: AsComposite> Render<F, D> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, _frame: &F, result: &D) -> Result<(), Self::Error> {
    if !self.always && is_blank(result) {
      return Ok(());
    }

    let path = self.frame_path()?;
    let image = self
      .draw
      .render(result, self.outline)
      .ok_or(DirectoryRecordOutputError::InvalidComposite)?;
    image.save(&path)?;
    if let Some(record) = &self.record {
      record.record(result.regions(), &path)?;
    }
    debug!("记录帧: {}", path.display());
    Ok(())
  }
}
