// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/args.rs - 命令行参数
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use url::Url;

use sentinel::{
  DeploymentMode, FromUrl, PipelineConfig,
  config::DEFAULT_MAX_WIDTH,
  guard::DEFAULT_FRAME_CEILING,
  output::OutputBuilder,
  scheduler::DEFAULT_SAMPLING_INTERVAL,
};

/// Sentinel 视频检测标注工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型 URL，例如 yolo26:///models/best.rknn?labels=accident
  #[arg(long, value_name = "URL")]
  pub model: String,

  /// 输入 URL
  /// 支持格式:
  /// - 视频文件: gst://file/path/to/video.mp4
  /// - 图片目录: images:///path/to/dir?fps=25
  #[arg(long, value_name = "URL")]
  pub input: String,

  /// 输出 URL，可重复指定；结果记录引用第一个输出
  /// 支持格式:
  /// - 视频文件: gst:///path/to/output.mp4
  /// - 图片目录: folder:///path/to/dir
  /// 未指定时写入 processed_<时间>_<输入名>.mp4
  #[arg(long, value_name = "URL")]
  pub output: Vec<String>,

  /// 同时在窗口中预览
  #[arg(long)]
  pub display: bool,

  /// 部署模式，决定默认置信度阈值
  #[arg(long, value_enum, default_value_t = DeploymentMode::Interactive)]
  pub mode: DeploymentMode,

  /// 置信度阈值 (0.0 - 1.0)，默认取决于部署模式
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,

  /// 输出最大宽度
  #[arg(long, default_value_t = DEFAULT_MAX_WIDTH, value_name = "PIXELS")]
  pub max_width: u32,

  /// 采样间隔（每 N 帧检测一次）
  #[arg(long, default_value_t = DEFAULT_SAMPLING_INTERVAL.get(), value_name = "N")]
  pub sampling_interval: u64,

  /// 最大处理帧数
  #[arg(long, default_value_t = DEFAULT_FRAME_CEILING, value_name = "COUNT")]
  pub frame_ceiling: u64,

  /// 类别标签，逗号分隔，覆盖模型 URL 中的 labels
  #[arg(long, value_name = "LABELS", value_delimiter = ',')]
  pub labels: Vec<String>,

  /// 标签字体文件（TTF/OTF），未指定时只画边框
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 以 JSON 格式输出结果记录
  #[arg(long)]
  pub json: bool,
}

impl Args {
  pub fn pipeline_config(&self) -> PipelineConfig {
    let config = PipelineConfig::for_mode(self.mode)
      .with_max_width(self.max_width)
      .with_sampling_interval(self.sampling_interval)
      .with_frame_ceiling(self.frame_ceiling);
    match self.confidence {
      Some(threshold) => config.with_confidence_threshold(threshold),
      None => config,
    }
  }

  #[cfg_attr(not(feature = "gstreamer_output"), allow(unused_variables, unused_mut))]
  pub fn output_builders(&self, input: &Url) -> Result<Vec<OutputBuilder>> {
    let mut builders = self
      .output
      .iter()
      .map(|output| Ok(OutputBuilder::from_url(&Url::parse(output)?)?))
      .collect::<Result<Vec<_>>>()?;

    if builders.is_empty() {
      #[cfg(feature = "gstreamer_output")]
      builders.push(OutputBuilder::GStreamerVideoOutput(
        sentinel::output::GStreamerVideoOutputBuilder::file(default_output_name(input)),
      ));
    }

    if self.display {
      builders.push(OutputBuilder::from_url(&Url::parse("display://")?)?);
    }

    Ok(builders)
  }
}

/// processed_<年月日-时分秒>_<输入名>.mp4
pub fn default_output_name(input: &Url) -> String {
  let decoded = urlencoding::decode(input.path())
    .map(|p| p.into_owned())
    .unwrap_or_else(|_| input.path().to_string());
  let stem = Path::new(&decoded)
    .file_stem()
    .and_then(|s| s.to_str())
    .filter(|s| !s.is_empty())
    .unwrap_or("input");
  format!(
    "processed_{}_{}.mp4",
    chrono::Local::now().format("%Y%m%d-%H%M%S"),
    stem
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_output_uses_input_stem() {
    let url = Url::parse("gst://file/data/crash%20cam.mp4").unwrap();
    let name = default_output_name(&url);
    assert!(name.starts_with("processed_"));
    assert!(name.ends_with("_crash cam.mp4"), "{}", name);
  }

  #[test]
  fn confidence_defaults_to_mode() {
    let args = Args::parse_from([
      "sentinel",
      "--model",
      "yolo26:///m.rknn",
      "--input",
      "images:///frames",
      "--mode",
      "headless",
    ]);
    assert_eq!(args.pipeline_config().confidence_threshold, 0.6);

    let args = Args::parse_from([
      "sentinel",
      "--model",
      "yolo26:///m.rknn",
      "--input",
      "images:///frames",
      "--confidence",
      "0.25",
    ]);
    assert_eq!(args.pipeline_config().confidence_threshold, 0.25);
  }
}
