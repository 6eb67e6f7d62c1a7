// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 视频文件输出与预览窗口
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # GStreamer 视频输出模块
//!
//! 将处理后的视频帧编码保存为视频文件，或显示在预览窗口中。
//!
//! ## 支持的格式
//!
//! - **MP4** (H.264) - 默认格式
//! - **MKV** (Matroska)
//! - **AVI**
//! - **WebM** (VP8)
//!
//! ## URL 格式
//!
//! - `gst:///path/to/output.mp4` - 视频文件
//! - `display://` - 预览窗口
//!
//! 编码器插件缺失或输出文件无法创建时，打开输出即失败，不会读取任何输入帧。

use std::path::Path;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl,
  frame::Frame,
  input::decode_path,
  output::{FrameSink, SinkBuilder},
};

/// GStreamer 视频输出错误类型
#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  /// URI scheme 不匹配
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsrc 元素
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  /// 无法转换元素为 appsrc
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 输出目录创建失败
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

const GSTREAMER_VIDEO_OUTPUT_SCHEME: &str = "gst";
const GSTREAMER_DISPLAY_OUTPUT_SCHEME: &str = "display";

/// 等待编码器写完文件尾的最长时间
const EOS_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GStreamerOutputKind {
  /// 编码写入视频文件
  File(String),
  /// 预览窗口
  Display,
}

impl GStreamerOutputKind {
  fn pipeline_desc(&self) -> String {
    match self {
      GStreamerOutputKind::File(path) => {
        let encode = if path.ends_with(".mkv") {
          "video/x-raw,format=I420 ! x264enc speed-preset=fast ! h264parse ! matroskamux"
        } else if path.ends_with(".avi") {
          "video/x-raw,format=I420 ! x264enc ! avimux"
        } else if path.ends_with(".webm") {
          "vp8enc ! webmmux"
        } else {
          // 默认 MP4
          "video/x-raw,format=I420 ! x264enc speed-preset=fast tune=zerolatency ! h264parse ! mp4mux"
        };
        format!(
          "appsrc name=src ! videoconvert ! {} ! filesink location=\"{}\"",
          encode, path
        )
      }
      GStreamerOutputKind::Display => {
        "appsrc name=src ! videoconvert ! autovideosink sync=false".to_string()
      }
    }
  }
}

pub struct GStreamerVideoOutputBuilder {
  kind: GStreamerOutputKind,
}

impl GStreamerVideoOutputBuilder {
  pub fn file(path: impl Into<String>) -> Self {
    Self {
      kind: GStreamerOutputKind::File(path.into()),
    }
  }

  pub fn display() -> Self {
    Self {
      kind: GStreamerOutputKind::Display,
    }
  }

  pub fn accepts(url: &Url) -> bool {
    matches!(
      url.scheme(),
      GSTREAMER_VIDEO_OUTPUT_SCHEME | GSTREAMER_DISPLAY_OUTPUT_SCHEME
    )
  }
  /// 设置 appsrc 的 caps 并启动管道，返回 appsrc 与行 stride
  fn start(
    pipeline: &gst::Pipeline,
    width: u32,
    height: u32,
    fps: f64,
  ) -> Result<(gst_app::AppSrc, usize), GStreamerVideoOutputError> {
    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcConversionFailed)?;

    // 帧率按千分之一精度表示
    let fps_millis = (fps * 1000.0).round().max(1.0) as i32;
    let video_info = gst_video::VideoInfo::builder(gst_video::VideoFormat::Rgb, width, height)
      .fps(gst::Fraction::new(fps_millis, 1000))
      .build()?;

    appsrc.set_caps(Some(&video_info.to_caps()?));
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;
    Ok((appsrc, video_info.stride()[0] as usize))
  }
}

impl FromUrl for GStreamerVideoOutputBuilder {
  type Error = GStreamerVideoOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      GSTREAMER_VIDEO_OUTPUT_SCHEME => Ok(Self::file(decode_path(url))),
      GSTREAMER_DISPLAY_OUTPUT_SCHEME => Ok(Self::display()),
      other => {
        error!(
          "URI scheme mismatch: expected '{}' or '{}', found '{}'",
          GSTREAMER_VIDEO_OUTPUT_SCHEME, GSTREAMER_DISPLAY_OUTPUT_SCHEME, other
        );
        Err(GStreamerVideoOutputError::SchemeMismatch)
      }
    }
  }
}

impl SinkBuilder for GStreamerVideoOutputBuilder {
  type Sink = GStreamerVideoOutput;
  type Error = GStreamerVideoOutputError;

  fn build(self, width: u32, height: u32, fps: f64) -> Result<Self::Sink, Self::Error> {
    if let GStreamerOutputKind::File(path) = &self.kind {
      if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
      }
    }

    // 多次调用 init 是安全的
    gst::init()?;

    let pipeline_desc = self.kind.pipeline_desc();
    info!("Creating video output pipeline: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    // 配置失败时复位管道
    let (appsrc, stride) = match Self::start(&pipeline, width, height, fps) {
      Ok(started) => started,
      Err(e) => {
        let _ = pipeline.set_state(gst::State::Null);
        return Err(e);
      }
    };

    info!(
      "Video output initialized: {}x{} @ {:.2} fps -> {:?}",
      width, height, fps, self.kind
    );

    Ok(GStreamerVideoOutput {
      pipeline,
      appsrc,
      kind: self.kind,
      stride,
      width,
      height,
      fps,
      frame_count: 0,
      closed: false,
    })
  }
}

/// GStreamer 视频输出
///
/// 管理 GStreamer 编码管道，将视频帧保存为文件或显示。
pub struct GStreamerVideoOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  kind: GStreamerOutputKind,
  stride: usize,
  width: u32,
  height: u32,
  fps: f64,
  frame_count: u64,
  closed: bool,
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    if let Err(e) = self.finish() {
      warn!("Failed to stop GStreamer video output pipeline: {}", e);
    }
  }
}

impl GStreamerVideoOutput {
  fn timestamp_ns(&self, index: u64) -> u64 {
    (index as f64 * 1_000_000_000.0 / self.fps) as u64
  }

  fn push_frame(&mut self, data: &[u8]) -> Result<(), GStreamerVideoOutputError> {
    let row = self.width as usize * 3;
    let height = self.height as usize;

    // 按 stride 补齐每行
    let mut padded = vec![0u8; self.stride * height];
    for (dst, src) in padded.chunks_exact_mut(self.stride).zip(data.chunks_exact(row)) {
      dst[..row].copy_from_slice(src);
    }

    let pts = self.timestamp_ns(self.frame_count);
    let duration = self.timestamp_ns(self.frame_count + 1) - pts;

    let mut buffer = gst::Buffer::from_mut_slice(padded);
    {
      let buffer_ref = buffer.get_mut().ok_or_else(|| {
        GStreamerVideoOutputError::PipelineError("Buffer is not writable".to_string())
      })?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(pts));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(duration));
    }

    self.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;
    self.frame_count += 1;

    Ok(())
  }

  /// 发送 EOS 并等待管道写完
  fn finish(&mut self) -> Result<(), GStreamerVideoOutputError> {
    if self.closed {
      return Ok(());
    }
    self.closed = true;

    let result = self
      .appsrc
      .end_of_stream()
      .map_err(|e| {
        GStreamerVideoOutputError::PipelineError(format!("Failed to send EOS: {:?}", e))
      })
      .and_then(|_| match self.pipeline.bus() {
        Some(bus) => wait_for_eos(&bus, gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS)),
        None => Err(GStreamerVideoOutputError::PipelineError(
          "Pipeline has no bus".to_string(),
        )),
      });

    self.pipeline.set_state(gst::State::Null)?;
    info!(
      "Video output closed. Total frames written: {}",
      self.frame_count
    );
    result
  }
}

/// 等待 EOS 到达管道末端；超时说明编码器尚未写完文件尾
fn wait_for_eos(bus: &gst::Bus, timeout: gst::ClockTime) -> Result<(), GStreamerVideoOutputError> {
  let msg = bus.timed_pop_filtered(timeout, &[gst::MessageType::Eos, gst::MessageType::Error]);
  match msg.as_ref().map(|m| m.view()) {
    Some(gst::MessageView::Error(err)) => Err(GStreamerVideoOutputError::PipelineError(
      err.error().to_string(),
    )),
    Some(_) => Ok(()),
    None => {
      error!("等待输出管道结束超时");
      Err(GStreamerVideoOutputError::PipelineError(
        "Timed out waiting for EOS".to_string(),
      ))
    }
  }
}

impl FrameSink for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn write(&mut self, frame: &Frame) -> Result<(), Self::Error> {
    self.push_frame(frame.image.as_raw())
  }

  fn close(mut self) -> Result<(), Self::Error> {
    self.finish()
  }

  fn artifact(&self) -> Option<String> {
    match &self.kind {
      GStreamerOutputKind::File(path) => Some(path.clone()),
      GStreamerOutputKind::Display => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_file_and_display_urls() {
    let file = GStreamerVideoOutputBuilder::from_url(&Url::parse("gst:///tmp/out%20dir/a.mp4").unwrap())
      .unwrap();
    assert_eq!(file.kind, GStreamerOutputKind::File("/tmp/out dir/a.mp4".to_string()));

    let display = GStreamerVideoOutputBuilder::from_url(&Url::parse("display://").unwrap()).unwrap();
    assert_eq!(display.kind, GStreamerOutputKind::Display);
  }

  #[test]
  fn eos_wait_times_out_without_message() {
    gst::init().unwrap();
    let bus = gst::Bus::new();
    assert!(matches!(
      wait_for_eos(&bus, gst::ClockTime::ZERO),
      Err(GStreamerVideoOutputError::PipelineError(_))
    ));
  }

  #[test]
  fn eos_wait_returns_on_eos() {
    gst::init().unwrap();
    let bus = gst::Bus::new();
    bus.post(gst::message::Eos::new()).unwrap();
    assert!(wait_for_eos(&bus, gst::ClockTime::from_seconds(1)).is_ok());
  }

  #[test]
  fn container_selects_encoder() {
    let mkv = GStreamerOutputKind::File("a.mkv".to_string()).pipeline_desc();
    assert!(mkv.contains("matroskamux"));
    let mp4 = GStreamerOutputKind::File("a.mp4".to_string()).pipeline_desc();
    assert!(mp4.contains("mp4mux"));
    assert!(GStreamerOutputKind::Display.pipeline_desc().contains("autovideosink"));
  }
}
