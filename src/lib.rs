// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/lib.rs - 库主文件
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

//! 按采样间隔运行目标检测的视频标注流水线。
//!
//! 输入源逐帧解码，缩放到受限分辨率后，每 N 帧调用一次检测器，
//! 其余帧沿用最近一次的检测结果进行标注，最后把采样帧上的统计
//! 归约为一个分类结果与平均置信度。

pub mod aggregate;
pub mod config;
pub mod error;
pub mod frame;
pub mod guard;
pub mod input;
pub mod model;
pub mod output;
pub mod resolution;
pub mod scheduler;
pub mod task;

pub use aggregate::{Classification, ResultRecord};
pub use config::{DeploymentMode, PipelineConfig};
pub use error::{AbortCause, PipelineError};
pub use task::{PipelineState, RunOutput, SampledDetectionTask, StopSignal};

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}
