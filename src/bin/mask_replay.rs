// 该文件是 Mengban （蒙版） 项目的一部分。
// src/bin/mask_replay.rs - 离线掩码回放
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use mengban::{
  FromUrl,
  model::MaskReplay,
  task::{ContinuousTask, OneShotTask, Task},
};
use tracing::info;

/// 把原始掩码序列送入防闪烁与合成，输出 ARGB 结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 掩码目录，例如 folder:///data/masks
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，image:// 或 folder://
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,

  /// 关闭三帧防闪烁
  #[arg(long)]
  pub no_ofd: bool,

  /// 合成颜色，RGB 十六进制
  #[arg(long, value_name = "RGB", default_value = "ffffff", value_parser = parse_rgb)]
  pub color: u32,

  /// 只处理第一帧
  #[arg(long)]
  pub oneshot: bool,
}

fn parse_rgb(s: &str) -> Result<u32, String> {
  let s = s.trim_start_matches('#').trim_start_matches("0x");
  u32::from_str_radix(s, 16)
    .ok()
    .filter(|v| *v <= 0x00ff_ffff)
    .ok_or_else(|| format!("无效的 RGB 颜色: {}", s))
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("防闪烁: {}", !args.no_ofd);

  let input = mengban::input::InputWrapper::from_url(&args.input)?;
  let model = MaskReplay::new(!args.no_ofd).with_rgb(args.color);
  let output = mengban::output::OutputWrapper::from_url(&args.output)?;

  if args.oneshot {
    OneShotTask.run_task(input, model, output)?;
  } else {
    ContinuousTask::default()
      .with_frame_number(args.frame_number)
      .run_task(input, model, output)?;
  }

  Ok(())
}
