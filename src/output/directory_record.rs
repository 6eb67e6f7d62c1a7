// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! 将每一帧保存为 PNG 图片，写入按日期组织的运行目录：
//! `<dir>/<年>/<月>/<日>/<时-分-秒>/000000.png`

use std::path::PathBuf;

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  input::decode_path,
  output::{FrameSink, SinkBuilder},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

pub struct DirectoryRecordOutputBuilder {
  directory: PathBuf,
}

impl FromUrlWithScheme for DirectoryRecordOutputBuilder {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutputBuilder {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    Ok(Self::new(decode_path(uri)))
  }
}

impl DirectoryRecordOutputBuilder {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }

  fn run_directory(&self) -> PathBuf {
    let now = Utc::now();
    self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()))
      .join(now.format("%H-%M-%S%.3f").to_string())
  }
}

impl SinkBuilder for DirectoryRecordOutputBuilder {
  type Sink = DirectoryRecordOutput;
  type Error = DirectoryRecordOutputError;

  fn build(self, width: u32, height: u32, _fps: f64) -> Result<Self::Sink, Self::Error> {
    let directory = self.run_directory();
    std::fs::create_dir_all(&directory)?;
    info!(
      "目录记录输出: {} ({}x{})",
      directory.display(),
      width,
      height
    );

    Ok(DirectoryRecordOutput {
      directory,
      frame_counter: 0,
    })
  }
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: u64,
}

impl DirectoryRecordOutput {
  fn frame_path(&self) -> PathBuf {
    self.directory.join(format!("{:06}.png", self.frame_counter))
  }
}

impl FrameSink for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn write(&mut self, frame: &Frame) -> Result<(), Self::Error> {
    frame.image.save(self.frame_path())?;
    self.frame_counter += 1;
    Ok(())
  }

  fn close(self) -> Result<(), Self::Error> {
    info!(
      "目录记录完成，共 {} 帧: {}",
      self.frame_counter,
      self.directory.display()
    );
    Ok(())
  }

  fn artifact(&self) -> Option<String> {
    Some(self.directory.display().to_string())
  }
}
