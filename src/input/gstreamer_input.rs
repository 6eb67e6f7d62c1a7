// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # GStreamer 视频输入模块
//!
//! 使用 GStreamer 解码视频文件，逐帧输出 RGB 图像。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! ## URL 格式
//!
//! - `gst://file/path/to/video.mp4`
//!
//! 打开时管道先进入 PAUSED 状态完成预卷，从预卷样本中读取宽高与帧率，
//! 之后再切换到 PLAYING。文件输入不丢帧，appsink 以背压方式限制缓冲。

use std::path::Path;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, VideoMeta},
  input::{FrameSource, SourceBuilder, decode_path},
};

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://"）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// 输入文件不存在
  #[error("Input file not found: {0}")]
  FileNotFound(String),
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format")]
  UnsupportedFormat,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

pub enum GStreamerInputBuilderItem {
  FileSource(String),
  TargetFormat { format: String },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location=\"{}\" ! decodebin", path)
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  path: String,
  items: Vec<GStreamerInputBuilderItem>,
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    match url.host_str() {
      Some("file") => Ok(Self::file(decode_path(url))),
      _ => Err(GStreamerInputError::SchemeMismatch),
    }
  }
}

impl GStreamerInputPipelineBuilder {
  pub fn file(path: impl Into<String>) -> Self {
    let path = path.into();
    let items = vec![
      GStreamerInputBuilderItem::FileSource(path.clone()),
      GStreamerInputBuilderItem::TargetFormat {
        format: "RGB".to_string(),
      },
    ];
    Self { path, items }
  }

  fn bus_error(pipeline: &gst::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
    match msg.view() {
      gst::MessageView::Error(err) => Some(err.error().to_string()),
      _ => None,
    }
  }

  /// 预卷以获取视频参数，然后进入 PLAYING
  fn start(
    pipeline: &gst::Pipeline,
    appsink: &gst_app::AppSink,
  ) -> Result<VideoMeta, GStreamerInputError> {
    pipeline.set_state(gst::State::Paused)?;
    let preroll = appsink.pull_preroll().map_err(|e| {
      GStreamerInputError::PipelineError(Self::bus_error(pipeline).unwrap_or_else(|| e.to_string()))
    })?;

    let caps = preroll
      .caps()
      .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;
    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

    let fps = video_info.fps();
    let fps = if fps.denom() != 0 {
      fps.numer() as f64 / fps.denom() as f64
    } else {
      0.0
    };

    let frame_count_hint = pipeline
      .query_duration::<gst::ClockTime>()
      .filter(|_| fps > 0.0)
      .map(|d| (d.nseconds() as f64 / 1_000_000_000.0 * fps).round() as u64);

    let meta = VideoMeta::new(video_info.width(), video_info.height(), fps)
      .with_frame_count_hint(frame_count_hint);
    debug!("输入视频参数: {:?}", meta);

    pipeline.set_state(gst::State::Playing)?;
    Ok(meta)
  }
}

impl SourceBuilder for GStreamerInputPipelineBuilder {
  type Source = GStreamerInput;
  type Error = GStreamerInputError;

  fn build(self) -> Result<Self::Source, Self::Error> {
    if !Path::new(&self.path).exists() {
      error!("输入文件不存在: {}", self.path);
      return Err(GStreamerInputError::FileNotFound(self.path));
    }

    gst::init()?;

    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    let full_pipeline = format!(
      "{} ! appsink name=sink sync=false max-buffers=4",
      basic_pipeline
    );

    info!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    // 启动失败时管道可能已处于 PAUSED，需要复位
    let meta = match Self::start(&pipeline, &appsink) {
      Ok(meta) => meta,
      Err(e) => {
        let _ = pipeline.set_state(gst::State::Null);
        return Err(e);
      }
    };

    Ok(GStreamerInput {
      pipeline,
      appsink,
      meta,
      frame_index: 0,
      finished: false,
    })
  }
}

/// GStreamer 视频输入
///
/// 管理 GStreamer 管道和 appsink，提供视频帧迭代功能。
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  meta: VideoMeta,
  frame_index: u64,
  finished: bool,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl GStreamerInput {
  fn pull_sample(&mut self) -> Option<gst::Sample> {
    match self.appsink.pull_sample() {
      Ok(sample) => Some(sample),
      Err(e) => {
        if self.appsink.is_eos() {
          info!("输入流结束");
        } else {
          error!("Failed to pull sample: {}", e);
        }
        self.finished = true;
        None
      }
    }
  }
}

impl Iterator for GStreamerInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    let sample = self.pull_sample()?;
    match convert_sample_to_rgb(sample) {
      Ok(image) => {
        let frame = Frame::new(image, self.frame_index);
        self.frame_index += 1;
        Some(frame)
      }
      Err(e) => {
        error!("Failed to fetch sample: {}", e);
        self.finished = true;
        None
      }
    }
  }
}

impl FrameSource for GStreamerInput {
  fn metadata(&self) -> VideoMeta {
    self.meta
  }
}

fn convert_sample_to_rgb(sample: gst::Sample) -> Result<RgbImage, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  // 每行按 stride 对齐，最后一行可能没有填充
  let expected_size = stride * (height.saturating_sub(1)) + width * 3;
  if data.len() < expected_size {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected: expected_size,
      actual: data.len(),
    });
  }

  let swap = match video_info.format() {
    gst_video::VideoFormat::Rgb => false,
    gst_video::VideoFormat::Bgr => true,
    _ => return Err(GStreamerInputError::UnsupportedFormat),
  };

  let mut pixels = Vec::with_capacity(width * height * 3);
  for row in 0..height {
    let line = &data[row * stride..row * stride + width * 3];
    if swap {
      for px in line.chunks_exact(3) {
        pixels.extend_from_slice(&[px[2], px[1], px[0]]);
      }
    } else {
      pixels.extend_from_slice(line);
    }
  }

  RgbImage::from_raw(width as u32, height as u32, pixels)
    .ok_or_else(|| GStreamerInputError::PipelineError("无法创建 RGB 图像".to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn missing_file_is_rejected_before_launch() {
    let result = GStreamerInputPipelineBuilder::file("/no/such/video.mp4").build();
    assert!(matches!(result, Err(GStreamerInputError::FileNotFound(_))));
  }

  #[test]
  fn undecodable_file_fails_to_open() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"not a video").unwrap();
    let path = file.path().to_string_lossy().into_owned();

    assert!(GStreamerInputPipelineBuilder::file(path).build().is_err());
  }
}
