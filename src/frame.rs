// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/frame.rs - 帧与视频元数据定义
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

use image::RgbImage;

/// 帧率缺失或无效时使用的回退帧率
pub const FALLBACK_FPS: f64 = 30.0;

/// 一帧 RGB 图像，携带其在源中的顺序索引
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据（HWC 排列）
  pub image: RgbImage,
  /// 帧索引，从 0 开始单调递增
  pub index: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64) -> Self {
    Self { image, index }
  }

  pub fn dimensions(&self) -> (u32, u32) {
    self.image.dimensions()
  }
}

/// 输入源的视频元数据
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMeta {
  pub width: u32,
  pub height: u32,
  /// 帧率，部分输入源可能给出 0 或 NaN
  pub fps: f64,
  /// 估计的总帧数（仅用于进度日志）
  pub frame_count_hint: Option<u64>,
}

impl VideoMeta {
  pub fn new(width: u32, height: u32, fps: f64) -> Self {
    Self {
      width,
      height,
      fps,
      frame_count_hint: None,
    }
  }

  pub fn with_frame_count_hint(mut self, hint: Option<u64>) -> Self {
    self.frame_count_hint = hint;
    self
  }

  /// 用于打开输出的帧率，无效值回退到 [`FALLBACK_FPS`]
  pub fn effective_fps(&self) -> f64 {
    if self.fps.is_finite() && self.fps > 0.0 {
      self.fps
    } else {
      FALLBACK_FPS
    }
  }
}
