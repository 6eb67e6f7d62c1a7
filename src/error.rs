// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/error.rs - 流水线错误定义
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

use thiserror::Error;

use crate::config::ConfigError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 流水线运行错误，均为致命错误，不做自动重试
#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("配置无效: {0}")]
  InvalidConfig(#[from] ConfigError),
  #[error("无法打开输入源: {0}")]
  SourceUnavailable(#[source] BoxError),
  #[error("无法初始化输出: {0}")]
  SinkInitFailed(#[source] BoxError),
  #[error("检测器在第 {tick} 帧出错: {source}")]
  DetectorFault {
    tick: u64,
    #[source]
    source: BoxError,
  },
  #[error("写入第 {tick} 帧失败: {source}")]
  SinkWriteFailed {
    tick: u64,
    #[source]
    source: BoxError,
  },
}

impl PipelineError {
  pub fn cause(&self) -> AbortCause {
    match self {
      PipelineError::InvalidConfig(_) => AbortCause::InvalidConfig,
      PipelineError::SourceUnavailable(_) => AbortCause::SourceUnavailable,
      PipelineError::SinkInitFailed(_) => AbortCause::SinkInitFailed,
      PipelineError::DetectorFault { .. } => AbortCause::DetectorFault,
      PipelineError::SinkWriteFailed { .. } => AbortCause::SinkWriteFailed,
    }
  }
}

/// 终止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortCause {
  InvalidConfig,
  SourceUnavailable,
  SinkInitFailed,
  DetectorFault,
  SinkWriteFailed,
}
