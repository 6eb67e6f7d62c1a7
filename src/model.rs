// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/model.rs - 检测器接口
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

use std::sync::{Arc, Mutex};

use crate::frame::Frame;

/// 目标检测器
///
/// `infer` 是流水线中唯一的重计算操作，同步阻塞。
/// `render` 返回标注后的新帧，不修改输入帧。
pub trait Detector {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, frame: &Frame, confidence_threshold: f32) -> Result<DetectResult, Self::Error>;
  fn render(&self, frame: &Frame, result: &DetectResult) -> Frame;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub label: String,
  pub score: f32,
  pub bbox: [f32; 4], // 归一化坐标 [x_min, y_min, x_max, y_max]
}

impl DetectItem {
  pub fn new(label: impl Into<String>, score: f32, bbox: [f32; 4]) -> Self {
    Self {
      label: label.into(),
      score,
      bbox,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &DetectItem> {
    self.items.iter()
  }

  pub fn confidence_sum(&self) -> f64 {
    self.items.iter().map(|item| item.score as f64).sum()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 可在多次运行间只读共享的检测器
///
/// 仅当检测器本身可以并发调用时使用。
impl<D: Detector + ?Sized> Detector for Arc<D> {
  type Error = D::Error;

  fn infer(&self, frame: &Frame, confidence_threshold: f32) -> Result<DetectResult, Self::Error> {
    (**self).infer(frame, confidence_threshold)
  }

  fn render(&self, frame: &Frame, result: &DetectResult) -> Frame {
    (**self).render(frame, result)
  }
}

impl<D: Detector + ?Sized> Detector for &D {
  type Error = D::Error;

  fn infer(&self, frame: &Frame, confidence_threshold: f32) -> Result<DetectResult, Self::Error> {
    (**self).infer(frame, confidence_threshold)
  }

  fn render(&self, frame: &Frame, result: &DetectResult) -> Frame {
    (**self).render(frame, result)
  }
}

/// 串行化访问的共享检测器
///
/// 检测器不支持并发调用时，多个运行通过互斥锁依次访问同一实例。
pub struct SerializedDetector<D> {
  inner: Arc<Mutex<D>>,
}

impl<D> Clone for SerializedDetector<D> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<D> SerializedDetector<D> {
  pub fn new(detector: D) -> Self {
    Self {
      inner: Arc::new(Mutex::new(detector)),
    }
  }
}

impl<D: Detector> Detector for SerializedDetector<D> {
  type Error = D::Error;

  fn infer(&self, frame: &Frame, confidence_threshold: f32) -> Result<DetectResult, Self::Error> {
    // 中毒的锁仍然持有有效的检测器，继续使用
    let detector = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    detector.infer(frame, confidence_threshold)
  }

  fn render(&self, frame: &Frame, result: &DetectResult) -> Frame {
    let detector = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    detector.render(frame, result)
  }
}

#[cfg(feature = "model_yolo26")]
mod yolo26;
#[cfg(feature = "model_yolo26")]
pub use self::yolo26::{Yolo26, Yolo26Builder, Yolo26Error};
