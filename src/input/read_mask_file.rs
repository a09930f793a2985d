// 该文件是 Mengban （蒙版） 项目的一部分。
// src/input/read_mask_file.rs - 掩码目录输入
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

use std::{collections::VecDeque, path::PathBuf};

use image::ImageReader;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::GrayMask, url_path};

#[derive(Error, Debug)]
pub enum MaskFolderInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("路径解码失败: {0}")]
  PathDecode(#[from] std::string::FromUtf8Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按文件名顺序读取目录下的 `*.png`，每个文件作为一帧原始掩码
#[derive(Debug)]
pub struct MaskFolderInput {
  files: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for MaskFolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for MaskFolderInput {
  type Error = MaskFolderInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(MaskFolderInputError::SchemeMismatch(url.scheme().to_string()));
    }

    let input = Self::open(url_path(url)?)?;
    info!("掩码目录共 {} 帧", input.remaining());
    Ok(input)
  }
}

impl MaskFolderInput {
  pub fn open(directory: impl Into<PathBuf>) -> Result<Self, MaskFolderInputError> {
    let directory = directory.into();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
      let path = entry?.path();
      let is_png = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
      if path.is_file() && is_png {
        files.push(path);
      }
    }
    files.sort();

    Ok(Self {
      files: files.into(),
    })
  }

  pub fn remaining(&self) -> usize {
    self.files.len()
  }
}

impl Iterator for MaskFolderInput {
  type Item = GrayMask;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.files.pop_front() {
      let image = ImageReader::open(&path)
        .map_err(image::ImageError::from)
        .and_then(|reader| reader.decode());
      match image {
        Ok(image) => return Some(GrayMask::from(image.into_luma8())),
        Err(err) => error!("读取掩码 {} 失败, 跳过: {}", path.display(), err),
      }
    }
    None
  }
}
