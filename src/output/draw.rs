// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;

use crate::{
  frame::Frame,
  model::{DetectItem, DetectResult},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const TEXT_COLOR: [u8; 3] = [255, 255, 255]; // 白色
const BOX_THICKNESS: i32 = 2;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("无法读取字体文件: {0}")]
  Io(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 检测框绘制工具
///
/// 未提供字体时只画边框，不画标签文字。
pub struct Draw {
  font: Option<FontVec>,
  font_size: f32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
    }
  }
}

impl Draw {
  pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data)?;
    Ok(Self {
      font: Some(font),
      ..Default::default()
    })
  }

  /// 返回绘制了检测结果的新帧
  pub fn annotate(&self, frame: &Frame, result: &DetectResult) -> Frame {
    let mut image = frame.image.clone();
    self.draw_detections(&mut image, result);
    Frame::new(image, frame.index)
  }

  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult) {
    for item in result.iter() {
      if let Some(rect) = self.draw_bbox(image, item) {
        self.draw_label(image, item, rect);
      }
    }
  }

  // bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox(&self, image: &mut RgbImage, item: &DetectItem) -> Option<Rect> {
    let (w, h) = (image.width() as f32, image.height() as f32);
    if w < 1.0 || h < 1.0 {
      return None;
    }

    let x_min = ((item.bbox[0] * w).floor() as i32).clamp(0, w as i32 - 1);
    let y_min = ((item.bbox[1] * h).floor() as i32).clamp(0, h as i32 - 1);
    let x_max = ((item.bbox[2] * w).ceil() as i32).clamp(0, w as i32 - 1);
    let y_max = ((item.bbox[3] * h).ceil() as i32).clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return None;
    }

    let rect = Rect::at(x_min, y_min).of_size((x_max - x_min) as u32, (y_max - y_min) as u32);
    for t in 0..BOX_THICKNESS {
      let width = rect.width().saturating_sub(2 * t as u32);
      let height = rect.height().saturating_sub(2 * t as u32);
      if width == 0 || height == 0 {
        break;
      }
      let inner = Rect::at(x_min + t, y_min + t).of_size(width, height);
      draw_hollow_rect_mut(image, inner, Rgb(BOX_COLOR));
    }

    Some(rect)
  }

  fn draw_label(&self, image: &mut RgbImage, item: &DetectItem, rect: Rect) {
    let Some(font) = self.font.as_ref() else {
      return;
    };

    let label = format!("{} {:.2}", item.label, item.score);
    let scale = PxScale::from(self.font_size);
    let (text_w, text_h) = text_size(scale, font, &label);
    let label_h = text_h as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;

    // 标签放在边框上方，空间不足时贴着图像顶部
    let label_x = rect.left();
    let label_y = (rect.top() - label_h).max(0);
    let max_width = (image.width() as i32 - label_x).max(0) as u32;
    let label_w = text_w.min(max_width);

    if label_w == 0 {
      return;
    }

    let background = Rect::at(label_x, label_y).of_size(label_w, label_h as u32);
    draw_filled_rect_mut(image, background, Rgb(BOX_COLOR));
    draw_text_mut(
      image,
      Rgb(TEXT_COLOR),
      label_x,
      label_y + LABEL_TEXT_VERTICAL_PADDING,
      scale,
      font,
      &label,
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn annotate_returns_copy_with_box() {
    let frame = Frame::new(RgbImage::new(100, 100), 3);
    let result = DetectResult::from(vec![DetectItem::new("accident", 0.9, [0.1, 0.1, 0.5, 0.5])]);

    let annotated = Draw::default().annotate(&frame, &result);

    assert_eq!(annotated.index, 3);
    assert_eq!(*annotated.image.get_pixel(10, 10), Rgb(BOX_COLOR));
    assert_eq!(*annotated.image.get_pixel(30, 30), Rgb([0, 0, 0]));
    // 原始帧不被修改
    assert_eq!(*frame.image.get_pixel(10, 10), Rgb([0, 0, 0]));
  }

  #[test]
  fn degenerate_box_is_skipped() {
    let frame = Frame::new(RgbImage::new(20, 20), 0);
    let result = DetectResult::from(vec![DetectItem::new("accident", 0.9, [0.5, 0.5, 0.5, 0.9])]);
    let annotated = Draw::default().annotate(&frame, &result);
    assert!(annotated.image.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn missing_font_file_is_an_error() {
    assert!(matches!(
      Draw::with_font_file("/no/such/font.ttf"),
      Err(DrawError::Io(_))
    ));
  }
}
