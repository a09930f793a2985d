// 该文件是 Mengban （蒙版） 项目的一部分。
// src/ofd.rs - 三帧掩码防闪烁
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

//! # 三帧防闪烁（OFD）
//!
//! 维护 prev / cur / next 三个等长缓冲区。新的原始掩码写入 next 后：
//!
//! - 未启用：计数清零，直接返回 next
//! - 第 1、2 帧：只轮转，输出比输入滞后一帧（第 1 帧原样输出）
//! - 第 3 帧起：若 `prev[i] == next[i]`，则 `cur[i] = next[i]`，再轮转并输出
//!   刚定稿的那一帧
//!
//! 轮转只交换下标，不复制也不分配。

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StabilizerError {
  #[error("掩码长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  SizeMismatch { expected: usize, actual: usize },
}

#[derive(Debug)]
pub struct Stabilizer {
  buffers: [Box<[u8]>; 3],
  prev: usize,
  cur: usize,
  next: usize,
  count: u64,
  enabled: bool,
}

impl Stabilizer {
  pub fn new(len: usize, enabled: bool) -> Self {
    Self {
      buffers: std::array::from_fn(|_| vec![0u8; len].into_boxed_slice()),
      prev: 0,
      cur: 1,
      next: 2,
      count: 0,
      enabled,
    }
  }

  pub fn len(&self) -> usize {
    self.buffers[0].len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  /// 启用状态变化时重新预热
  pub fn set_enabled(&mut self, enabled: bool) {
    if self.enabled != enabled {
      self.count = 0;
    }
    self.enabled = enabled;
  }

  pub fn frame_count(&self) -> u64 {
    self.count
  }

  /// 尺寸变化时重新分配全部缓冲区并重新预热
  pub fn reallocate(&mut self, len: usize) {
    if self.len() == len {
      return;
    }
    info!("防闪烁缓冲区重新分配: {} -> {}", self.len(), len);
    *self = Self::new(len, self.enabled);
  }

  /// 下一帧原始掩码的写入位置
  pub fn next_mut(&mut self) -> &mut [u8] {
    &mut self.buffers[self.next]
  }

  /// 处理已写入 [`Self::next_mut`] 的原始掩码，返回本帧输出
  pub fn stabilize(&mut self) -> &[u8] {
    if !self.enabled {
      self.count = 0;
      return &self.buffers[self.next];
    }

    self.count += 1;
    if self.count >= 3 {
      self.gate();
    }

    (self.prev, self.cur, self.next) = (self.cur, self.next, self.prev);
    debug!("防闪烁第 {} 帧", self.count);

    if self.count == 1 {
      &self.buffers[self.cur]
    } else {
      &self.buffers[self.prev]
    }
  }

  /// 复制原始掩码到 next 后处理
  pub fn push(&mut self, raw: &[u8]) -> Result<&[u8], StabilizerError> {
    if raw.len() != self.len() {
      return Err(StabilizerError::SizeMismatch {
        expected: self.len(),
        actual: raw.len(),
      });
    }
    self.next_mut().copy_from_slice(raw);
    Ok(self.stabilize())
  }

  fn gate(&mut self) {
    // 空 Box<[u8]> 不分配
    let mut cur = std::mem::take(&mut self.buffers[self.cur]);
    let prev = &self.buffers[self.prev];
    let next = &self.buffers[self.next];
    for ((c, &p), &n) in cur.iter_mut().zip(prev.iter()).zip(next.iter()) {
      if p == n {
        *c = n;
      }
    }
    self.buffers[self.cur] = cur;
  }
}
