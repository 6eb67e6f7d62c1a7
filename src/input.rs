// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/input.rs - 视频/图像输入
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
use url::Url;

use crate::{
  FromUrl,
  frame::{Frame, VideoMeta},
};

/// 帧输入源
///
/// 按源顺序逐帧产出，流结束或读取失败时返回 `None`。
pub trait FrameSource: Iterator<Item = Frame> {
  fn metadata(&self) -> VideoMeta;
}

/// 输入源构建器，`build` 时才真正打开输入
pub trait SourceBuilder {
  type Source: FrameSource;
  type Error: std::error::Error + Send + Sync + 'static;

  fn build(self) -> Result<Self::Source, Self::Error>;
}

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputBuilder, ImageFileInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 将 URL 路径解码为文件系统路径
pub(crate) fn decode_path(url: &Url) -> String {
  urlencoding::decode(url.path())
    .map(|p| p.into_owned())
    .unwrap_or_else(|_| url.path().to_string())
}

pub enum InputBuilder {
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInputPipelineBuilder),
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInputBuilder),
}

impl FromUrl for InputBuilder {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "gstreamer_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == GStreamerInputPipelineBuilder::SCHEME {
        let builder = GStreamerInputPipelineBuilder::from_url(url)?;
        return Ok(InputBuilder::GStreamerInput(builder));
      }
    }
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInputBuilder::SCHEME {
        let builder = ImageFileInputBuilder::from_url(url)?;
        return Ok(InputBuilder::ReadImageFile(builder));
      }
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl SourceBuilder for InputBuilder {
  type Source = InputWrapper;
  type Error = InputError;

  fn build(self) -> Result<Self::Source, Self::Error> {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputBuilder::GStreamerInput(builder) => Ok(InputWrapper::GStreamerInput(builder.build()?)),
      #[cfg(feature = "read_image_file")]
      InputBuilder::ReadImageFile(builder) => Ok(InputWrapper::ReadImageFile(builder.build()?)),
    }
  }
}

pub enum InputWrapper {
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInput),
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
}

impl Iterator for InputWrapper {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.next(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.next(),
    }
  }
}

impl FrameSource for InputWrapper {
  fn metadata(&self) -> VideoMeta {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.metadata(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.metadata(),
    }
  }
}
