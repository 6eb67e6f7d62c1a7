// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/scheduler.rs - 采样调度器
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

//! 采样调度器
//!
//! 每 N 帧调用一次检测器，其余帧复用最近一次的检测结果（carry-forward）。
//! 最近结果只有一个槽位，只会被更新的结果覆盖，从不清空。

use std::num::NonZeroU64;

use crate::model::DetectResult;

/// 默认采样间隔：每 5 帧检测一次
pub const DEFAULT_SAMPLING_INTERVAL: NonZeroU64 = NonZeroU64::new(5).unwrap();

/// 某一帧的调度决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
  /// 在本帧上运行检测器
  Detect,
  /// 复用已保存的结果进行渲染
  Reuse,
  /// 尚无任何检测结果，原样输出
  PassThrough,
}

#[derive(Debug)]
pub struct SamplingScheduler {
  interval: NonZeroU64,
  carried: Option<DetectResult>,
}

impl Default for SamplingScheduler {
  fn default() -> Self {
    Self::new(DEFAULT_SAMPLING_INTERVAL)
  }
}

impl SamplingScheduler {
  pub fn new(interval: NonZeroU64) -> Self {
    Self {
      interval,
      carried: None,
    }
  }

  pub fn interval(&self) -> NonZeroU64 {
    self.interval
  }

  pub fn is_sampling_tick(&self, tick: u64) -> bool {
    tick % self.interval.get() == 0
  }

  pub fn decide(&self, tick: u64) -> Decision {
    if self.is_sampling_tick(tick) {
      Decision::Detect
    } else if self.carried.is_some() {
      Decision::Reuse
    } else {
      Decision::PassThrough
    }
  }

  /// 保存新的检测结果，替换之前的结果，并返回其引用
  pub fn store(&mut self, result: DetectResult) -> &DetectResult {
    self.carried.insert(result)
  }

  pub fn carried(&self) -> Option<&DetectResult> {
    self.carried.as_ref()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;

  fn result_with(score: f32) -> DetectResult {
    DetectResult::from(vec![DetectItem::new("accident", score, [0.1, 0.1, 0.5, 0.5])])
  }

  #[test]
  fn default_interval_samples_every_fifth_tick() {
    let scheduler = SamplingScheduler::default();
    let sampled: Vec<u64> = (0..12).filter(|t| scheduler.is_sampling_tick(*t)).collect();
    assert_eq!(sampled, vec![0, 5, 10]);
  }

  #[test]
  fn pass_through_before_first_detection() {
    let scheduler = SamplingScheduler::new(NonZeroU64::new(3).unwrap());
    assert_eq!(scheduler.decide(1), Decision::PassThrough);
    assert_eq!(scheduler.decide(3), Decision::Detect);
  }

  #[test]
  fn reuse_after_detection_and_overwrite_on_update() {
    let mut scheduler = SamplingScheduler::new(NonZeroU64::new(2).unwrap());
    assert_eq!(scheduler.decide(0), Decision::Detect);
    scheduler.store(result_with(0.7));
    assert_eq!(scheduler.decide(1), Decision::Reuse);
    assert_eq!(scheduler.carried().unwrap().items[0].score, 0.7);

    scheduler.store(result_with(0.9));
    assert_eq!(scheduler.carried().unwrap().items[0].score, 0.9);
  }

  #[test]
  fn empty_result_still_replaces_carried_slot() {
    let mut scheduler = SamplingScheduler::new(NonZeroU64::new(2).unwrap());
    scheduler.store(result_with(0.7));
    scheduler.store(DetectResult::default());
    assert!(scheduler.carried().unwrap().is_empty());
    assert_eq!(scheduler.decide(1), Decision::Reuse);
  }

  #[test]
  fn interval_of_one_detects_every_tick() {
    let scheduler = SamplingScheduler::new(NonZeroU64::MIN);
    assert!((0..10).all(|t| scheduler.decide(t) == Decision::Detect));
  }
}
