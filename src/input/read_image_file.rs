// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/input/read_image_file.rs - 图像文件序列输入
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

//! 将单张图片或一个目录中的图片（按文件名排序）作为视频流回放。
//!
//! - `images:///path/to/frame.png`
//! - `images:///path/to/frames?fps=25`

use std::{
  collections::VecDeque,
  path::{Path, PathBuf},
};

use image::ImageReader;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, VideoMeta},
  input::{FrameSource, SourceBuilder, decode_path},
};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
const DEFAULT_FPS: f64 = 25.0;

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("No image found in {0}")]
  Empty(PathBuf),
}

pub struct ImageFileInputBuilder {
  path: PathBuf,
  fps: f64,
}

impl FromUrlWithScheme for ImageFileInputBuilder {
  const SCHEME: &'static str = "images";
}

impl FromUrl for ImageFileInputBuilder {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let fps = url
      .query_pairs()
      .find(|(k, _)| k == "fps")
      .and_then(|(_, v)| v.parse::<f64>().ok())
      .unwrap_or(DEFAULT_FPS);

    Ok(ImageFileInputBuilder {
      path: PathBuf::from(decode_path(url)),
      fps,
    })
  }
}

impl ImageFileInputBuilder {
  pub fn new(path: impl Into<PathBuf>, fps: f64) -> Self {
    Self {
      path: path.into(),
      fps,
    }
  }

  fn collect_files(&self) -> Result<VecDeque<PathBuf>, ImageFileInputError> {
    if self.path.is_file() {
      return Ok(VecDeque::from([self.path.clone()]));
    }

    let mut files = std::fs::read_dir(&self.path)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| path.is_file() && is_image(path))
      .collect::<Vec<_>>();
    files.sort();

    Ok(files.into())
  }
}

impl SourceBuilder for ImageFileInputBuilder {
  type Source = ImageFileInput;
  type Error = ImageFileInputError;

  fn build(self) -> Result<Self::Source, Self::Error> {
    let files = self.collect_files()?;
    let first = files
      .front()
      .ok_or_else(|| ImageFileInputError::Empty(self.path.clone()))?;
    let (width, height) = image::image_dimensions(first)?;

    info!(
      "图像序列输入: {} ({} 张, {}x{} @ {} fps)",
      self.path.display(),
      files.len(),
      width,
      height,
      self.fps
    );

    let meta = VideoMeta::new(width, height, self.fps).with_frame_count_hint(Some(files.len() as u64));
    Ok(ImageFileInput {
      files,
      meta,
      frame_index: 0,
    })
  }
}

pub struct ImageFileInput {
  files: VecDeque<PathBuf>,
  meta: VideoMeta,
  frame_index: u64,
}

impl Iterator for ImageFileInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.files.pop_front()?;
    let image = match ImageReader::open(&path).map_err(ImageFileInputError::from).and_then(|r| {
      r.decode().map_err(ImageFileInputError::from)
    }) {
      Ok(image) => image.into_rgb8(),
      Err(e) => {
        error!("读取图像 {} 失败: {}", path.display(), e);
        self.files.clear();
        return None;
      }
    };

    let frame = Frame::new(image, self.frame_index);
    self.frame_index += 1;
    Some(frame)
  }
}

impl FrameSource for ImageFileInput {
  fn metadata(&self) -> VideoMeta {
    self.meta
  }
}

fn is_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}
