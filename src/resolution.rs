// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/resolution.rs - 输出分辨率策略
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

use image::imageops::{self, FilterType};

use crate::frame::Frame;

/// 在最大宽度约束下计算目标尺寸，保持宽高比
///
/// 宽度不超过 `max_width` 时原样返回，否则宽度取 `max_width`，
/// 高度按比例四舍五入。
pub fn target_size(width: u32, height: u32, max_width: u32) -> (u32, u32) {
  if width <= max_width {
    return (width, height);
  }

  let scaled = (height as f64 * max_width as f64 / width as f64).round() as u32;
  (max_width, scaled.max(1))
}

/// 按分辨率策略缩放帧
#[derive(Debug, Clone, Copy)]
pub struct Resizer {
  target: (u32, u32),
}

impl Resizer {
  pub fn new(width: u32, height: u32, max_width: u32) -> Self {
    Self {
      target: target_size(width, height, max_width),
    }
  }

  pub fn target(&self) -> (u32, u32) {
    self.target
  }

  pub fn apply(&self, frame: Frame) -> Frame {
    if frame.dimensions() == self.target {
      return frame;
    }

    let (w, h) = self.target;
    let image = imageops::resize(&frame.image, w, h, FilterType::Triangle);
    Frame::new(image, frame.index)
  }
}
