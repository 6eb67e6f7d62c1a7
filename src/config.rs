// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/config.rs - 运行配置
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

use std::num::NonZeroU64;

use thiserror::Error;

use crate::{guard::DEFAULT_FRAME_CEILING, scheduler::DEFAULT_SAMPLING_INTERVAL};

pub const DEFAULT_MAX_WIDTH: u32 = 640;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("最大输出宽度必须大于 0")]
  ZeroMaxWidth,
  #[error("采样间隔必须大于 0")]
  ZeroSamplingInterval,
  #[error("置信度阈值必须在 [0, 1] 之间: {0}")]
  ConfidenceOutOfRange(f32),
  #[error("帧数上限必须大于 0")]
  ZeroFrameCeiling,
}

/// 部署模式，决定默认的置信度阈值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DeploymentMode {
  /// 交互式运行（带预览窗口）
  #[default]
  Interactive,
  /// 无界面运行（服务端）
  Headless,
}

impl DeploymentMode {
  pub fn default_confidence(&self) -> f32 {
    match self {
      DeploymentMode::Interactive => 0.5,
      DeploymentMode::Headless => 0.6,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
  pub max_width: u32,
  pub sampling_interval: u64,
  pub confidence_threshold: f32,
  pub frame_ceiling: u64,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self::for_mode(DeploymentMode::default())
  }
}

impl PipelineConfig {
  pub fn for_mode(mode: DeploymentMode) -> Self {
    Self {
      max_width: DEFAULT_MAX_WIDTH,
      sampling_interval: DEFAULT_SAMPLING_INTERVAL.get(),
      confidence_threshold: mode.default_confidence(),
      frame_ceiling: DEFAULT_FRAME_CEILING,
    }
  }

  pub fn with_max_width(mut self, max_width: u32) -> Self {
    self.max_width = max_width;
    self
  }

  pub fn with_sampling_interval(mut self, interval: u64) -> Self {
    self.sampling_interval = interval;
    self
  }

  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_frame_ceiling(mut self, ceiling: u64) -> Self {
    self.frame_ceiling = ceiling;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.max_width == 0 {
      return Err(ConfigError::ZeroMaxWidth);
    }
    if self.sampling_interval == 0 {
      return Err(ConfigError::ZeroSamplingInterval);
    }
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(ConfigError::ConfidenceOutOfRange(self.confidence_threshold));
    }
    if self.frame_ceiling == 0 {
      return Err(ConfigError::ZeroFrameCeiling);
    }
    Ok(())
  }

  pub(crate) fn sampling_interval(&self) -> Result<NonZeroU64, ConfigError> {
    NonZeroU64::new(self.sampling_interval).ok_or(ConfigError::ZeroSamplingInterval)
  }
}
