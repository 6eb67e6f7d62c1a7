// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/output.rs - 输出定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use url::Url;

use crate::{FromUrl, frame::Frame};

/// 输出（编码）端
///
/// 按帧顺序接收帧；写入的帧尺寸必须与打开时声明的尺寸一致。
pub trait FrameSink {
  type Error: std::error::Error + Send + Sync + 'static;

  fn write(&mut self, frame: &Frame) -> Result<(), Self::Error>;

  /// 完成输出并释放资源
  fn close(self) -> Result<(), Self::Error>;

  /// 输出产物的引用（例如视频文件路径），没有产物时为 `None`
  fn artifact(&self) -> Option<String>;
}

/// 输出构建器，在已知输出尺寸与帧率后打开输出
pub trait SinkBuilder {
  type Sink: FrameSink;
  type Error: std::error::Error + Send + Sync + 'static;

  fn build(self, width: u32, height: u32, fps: f64) -> Result<Self::Sink, Self::Error>;
}

pub mod draw;

#[cfg(feature = "gstreamer_output")]
mod gstreamer_video_output;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_video_output::{
  GStreamerOutputKind, GStreamerVideoOutput, GStreamerVideoOutputBuilder, GStreamerVideoOutputError,
};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{
  DirectoryRecordOutput, DirectoryRecordOutputBuilder, DirectoryRecordOutputError,
};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 视频输出错误: {0}")]
  GStreamerVideoOutputError(#[from] GStreamerVideoOutputError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("未指定任何输出")]
  NoOutput,
}

pub enum OutputBuilder {
  #[cfg(feature = "gstreamer_output")]
  GStreamerVideoOutput(GStreamerVideoOutputBuilder),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutputBuilder),
}

impl FromUrl for OutputBuilder {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "gstreamer_output")]
    {
      if GStreamerVideoOutputBuilder::accepts(url) {
        let builder = GStreamerVideoOutputBuilder::from_url(url)?;
        return Ok(OutputBuilder::GStreamerVideoOutput(builder));
      }
    }
    #[cfg(feature = "directory_record")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == DirectoryRecordOutputBuilder::SCHEME {
        let builder = DirectoryRecordOutputBuilder::from_url(url)?;
        return Ok(OutputBuilder::DirectoryRecordOutput(builder));
      }
    }
    Err(OutputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl SinkBuilder for OutputBuilder {
  type Sink = OutputWrapper;
  type Error = OutputError;

  fn build(self, width: u32, height: u32, fps: f64) -> Result<Self::Sink, Self::Error> {
    match self {
      #[cfg(feature = "gstreamer_output")]
      OutputBuilder::GStreamerVideoOutput(builder) => Ok(OutputWrapper::GStreamerVideoOutput(
        builder.build(width, height, fps)?,
      )),
      #[cfg(feature = "directory_record")]
      OutputBuilder::DirectoryRecordOutput(builder) => Ok(OutputWrapper::DirectoryRecordOutput(
        builder.build(width, height, fps)?,
      )),
    }
  }
}

pub enum OutputWrapper {
  #[cfg(feature = "gstreamer_output")]
  GStreamerVideoOutput(GStreamerVideoOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FrameSink for OutputWrapper {
  type Error = OutputError;

  fn write(&mut self, frame: &Frame) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => output.write(frame).map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.write(frame).map_err(OutputError::from),
    }
  }

  fn close(self) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => output.close().map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.close().map_err(OutputError::from),
    }
  }

  fn artifact(&self) -> Option<String> {
    match self {
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => output.artifact(),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.artifact(),
    }
  }
}

/// 多个输出的组合，例如同时写文件并显示预览
pub struct OutputSet<B> {
  builders: Vec<B>,
}

impl<B> OutputSet<B> {
  pub fn new(builders: Vec<B>) -> Self {
    Self { builders }
  }
}

impl<B> FromIterator<B> for OutputSet<B> {
  fn from_iter<I: IntoIterator<Item = B>>(iter: I) -> Self {
    Self::new(iter.into_iter().collect())
  }
}

impl<B: SinkBuilder> SinkBuilder for OutputSet<B>
where
  B::Error: From<OutputError>,
{
  type Sink = Outputs<B::Sink>;
  type Error = B::Error;

  fn build(self, width: u32, height: u32, fps: f64) -> Result<Self::Sink, Self::Error> {
    if self.builders.is_empty() {
      return Err(OutputError::NoOutput.into());
    }

    let sinks = self
      .builders
      .into_iter()
      .map(|builder| builder.build(width, height, fps))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Outputs { sinks })
  }
}

pub struct Outputs<S> {
  sinks: Vec<S>,
}

impl<S: FrameSink> FrameSink for Outputs<S> {
  type Error = S::Error;

  fn write(&mut self, frame: &Frame) -> Result<(), Self::Error> {
    self.sinks.iter_mut().try_for_each(|sink| sink.write(frame))
  }

  fn close(self) -> Result<(), Self::Error> {
    // 全部关闭后再返回第一个错误
    let mut first_error = None;
    for sink in self.sinks {
      if let Err(e) = sink.close() {
        first_error.get_or_insert(e);
      }
    }
    first_error.map_or(Ok(()), Err)
  }

  fn artifact(&self) -> Option<String> {
    self.sinks.iter().find_map(FrameSink::artifact)
  }
}
