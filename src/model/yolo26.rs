// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/model/yolo26.rs - YOLO26 RKNN 检测器
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! YOLO26 检测器（RKNN NPU 推理）
//!
//! URL 格式：`yolo26:///path/to/model.rknn?labels=accident,fire`
//!
//! 类别数由标签列表长度决定，未指定时只有一个类别 `accident`。

use image::imageops::{self, FilterType};
use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  input::decode_path,
  model::{DetectItem, DetectResult, Detector},
  output::draw::Draw,
};

const YOLO26_NUM_INPUTS: u32 = 1;
const YOLO26_NUM_OUTPUTS: u32 = 6;
const YOLO26_INPUT_SIZE: u32 = 640;
const YOLO26_INPUT_W: f32 = YOLO26_INPUT_SIZE as f32;
const YOLO26_INPUT_H: f32 = YOLO26_INPUT_SIZE as f32;
const YOLO26_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO26_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];
const YOLO26_DEFAULT_LABEL: &str = "accident";

#[derive(Error, Debug)]
pub enum Yolo26Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型输出与 {0} 个类别不匹配")]
  OutputMismatch(usize),
}

impl Yolo26Error {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    Yolo26Error::ModelInvalid(msg.to_string(), e)
  }
}

pub struct Yolo26 {
  context: Context,
  labels: Vec<String>,
  draw: Draw,
}

pub struct Yolo26Builder {
  model_path: String,
  flags: InitFlags,
  labels: Vec<String>,
  draw: Draw,
}

impl FromUrlWithScheme for Yolo26Builder {
  const SCHEME: &'static str = "yolo26";
}

impl FromUrl for Yolo26Builder {
  type Error = Yolo26Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolo26Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = Yolo26Builder::new(decode_path(url));
    if let Some((_, labels)) = url.query_pairs().find(|(key, _)| key == "labels") {
      builder = builder.with_labels(labels.split(',').map(str::trim).filter(|l| !l.is_empty()));
    }
    Ok(builder)
  }
}

impl Yolo26Builder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
      flags: InitFlags::default(),
      labels: vec![YOLO26_DEFAULT_LABEL.to_string()],
      draw: Draw::default(),
    }
  }

  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  /// 空列表会被忽略
  pub fn with_labels<S: Into<String>>(mut self, labels: impl IntoIterator<Item = S>) -> Self {
    let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
    if !labels.is_empty() {
      self.labels = labels;
    }
    self
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  pub fn build(self) -> Result<Yolo26, Yolo26Error> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags)?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(Yolo26Error::invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输出数量", e))?;

    if num_inputs != YOLO26_NUM_INPUTS || num_outputs != YOLO26_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(Yolo26Error::invalid(&msg, rknpu::Error::InvalidModel));
    }

    info!("模型加载完成，类别: {:?}", self.labels);
    Ok(Yolo26 {
      context,
      labels: self.labels,
      draw: self.draw,
    })
  }
}

/// 根据张量大小区分回归与分类输出，返回 (reg, cls)
fn match_reg_cls_tensors<'a>(
  tensor1: &'a [f32],
  tensor2: &'a [f32],
  reg_expected: usize,
  cls_expected: usize,
) -> Option<(&'a [f32], &'a [f32])> {
  if tensor1.len() == reg_expected && tensor2.len() == cls_expected {
    Some((tensor1, tensor2))
  } else if tensor1.len() == cls_expected && tensor2.len() == reg_expected {
    Some((tensor2, tensor1))
  } else {
    None
  }
}

impl Yolo26 {
  pub fn labels(&self) -> &[String] {
    &self.labels
  }

  fn postprocess(
    &self,
    output: rknpu::Output,
    confidence_threshold: f32,
  ) -> Result<DetectResult, Yolo26Error> {
    let class_num = self.labels.len();
    let mut items = Vec::new();

    for (head_idx, (&(map_h, map_w), stride)) in
      YOLO26_HEAD_SIZES.iter().zip(YOLO26_STRIDES).enumerate()
    {
      let spatial = map_h * map_w;
      let tensor1 = output.get_f32(head_idx * 2)?;
      let tensor2 = output.get_f32(head_idx * 2 + 1)?;

      // RKNN 输出顺序不固定，按大小匹配
      let Some((reg, cls)) =
        match_reg_cls_tensors(tensor1, tensor2, 4 * spatial, class_num * spatial)
      else {
        error!(
          "检测头 {}: 输出大小不匹配 - 张量1: {}, 张量2: {}",
          head_idx,
          tensor1.len(),
          tensor2.len()
        );
        return Err(Yolo26Error::OutputMismatch(class_num));
      };

      for h in 0..map_h {
        for w in 0..map_w {
          let idx = h * map_w + w;

          let (max_logit, class_id) = (0..class_num)
            .map(|c| (cls[c * spatial + idx], c))
            .fold((f32::MIN, 0), |best, cur| if cur.0 > best.0 { cur } else { best });
          let score = sigmoid(max_logit);

          if score < confidence_threshold {
            continue;
          }

          let grid_x = (w as f32) + 0.5;
          let grid_y = (h as f32) + 0.5;

          let xmin = ((grid_x - reg[idx]) * stride).clamp(0.0, YOLO26_INPUT_W);
          let ymin = ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_H);
          let xmax = ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_W);
          let ymax = ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_H);

          items.push(DetectItem::new(
            self.labels[class_id].clone(),
            score,
            [
              xmin / YOLO26_INPUT_W,
              ymin / YOLO26_INPUT_H,
              xmax / YOLO26_INPUT_W,
              ymax / YOLO26_INPUT_H,
            ],
          ));
        }
      }
    }

    debug!("检测到 {} 个物体", items.len());
    Ok(DetectResult::from(items))
  }
}

impl Detector for Yolo26 {
  type Error = Yolo26Error;

  fn infer(&self, frame: &Frame, confidence_threshold: f32) -> Result<DetectResult, Self::Error> {
    // 拉伸到模型输入尺寸，归一化坐标不受影响
    let input = imageops::resize(
      &frame.image,
      YOLO26_INPUT_SIZE,
      YOLO26_INPUT_SIZE,
      FilterType::Triangle,
    );

    self.context.set_input(
      0,
      input.as_raw(),
      rknpu::TensorFormat::NHWC,
      TensorType::UInt8,
    )?;
    self.context.run()?;
    let output = self.context.get_outputs()?;

    self.postprocess(output, confidence_threshold)
  }

  fn render(&self, frame: &Frame, result: &DetectResult) -> Frame {
    self.draw.annotate(frame, result)
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
