// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/aggregate.rs - 检测统计聚合
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

//! 检测统计聚合
//!
//! 只在采样帧上累计，复用帧不计入，避免同一检测框被重复计数。
//! 平均置信度按检测框总数平均，而不是按“有检测的采样帧”数平均。

use std::fmt;

use serde_json::json;

use crate::model::DetectResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
  Positive,
  Negative,
}

impl Classification {
  pub fn as_str(&self) -> &'static str {
    match self {
      Classification::Positive => "positive",
      Classification::Negative => "negative",
    }
  }
}

impl fmt::Display for Classification {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 运行过程中的累计统计
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
  pub confidence_sum: f64,
  pub detection_count: u64,
  /// 至少有一个检测结果的采样帧数量
  pub frames_with_detection: u64,
}

/// 聚合得到的判定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
  pub classification: Classification,
  pub average_confidence: f64,
}

#[derive(Debug, Default)]
pub struct DetectionAggregator {
  stats: RunningStats,
}

impl DetectionAggregator {
  pub fn new() -> Self {
    Self::default()
  }

  /// 记录一个采样帧的检测结果，空结果不改变任何计数
  pub fn record(&mut self, result: &DetectResult) {
    if result.is_empty() {
      return;
    }

    self.stats.frames_with_detection += 1;
    self.stats.detection_count += result.len() as u64;
    self.stats.confidence_sum += result.confidence_sum();
  }

  pub fn stats(&self) -> &RunningStats {
    &self.stats
  }

  pub fn finalize(&self) -> Verdict {
    let average_confidence = if self.stats.detection_count > 0 {
      self.stats.confidence_sum / self.stats.detection_count as f64
    } else {
      0.0
    };

    let classification = if self.stats.frames_with_detection > 0 {
      Classification::Positive
    } else {
      Classification::Negative
    };

    Verdict {
      classification,
      average_confidence,
    }
  }
}

/// 运行结束时返回给调用方的结果记录，创建后不可变
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
  classification: Classification,
  average_confidence: f64,
  artifact: String,
}

impl ResultRecord {
  pub fn new(verdict: Verdict, artifact: impl Into<String>) -> Self {
    Self {
      classification: verdict.classification,
      average_confidence: round2(verdict.average_confidence),
      artifact: artifact.into(),
    }
  }

  pub fn classification(&self) -> Classification {
    self.classification
  }

  /// 保留两位小数的平均置信度
  pub fn average_confidence(&self) -> f64 {
    self.average_confidence
  }

  pub fn artifact(&self) -> &str {
    &self.artifact
  }

  pub fn to_json(&self) -> serde_json::Value {
    json!({
      "classification": self.classification.as_str(),
      "averageConfidence": self.average_confidence,
      "artifactReference": self.artifact,
    })
  }
}

fn round2(value: f64) -> f64 {
  (value * 100.0).round() / 100.0
}
