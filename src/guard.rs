// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/guard.rs - 处理时长上限
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

/// 默认帧数上限，约为 30fps 下的 60 秒
pub const DEFAULT_FRAME_CEILING: u64 = 1800;

/// 已处理帧数的硬上限
///
/// 达到上限后流水线不再读取新帧，直接进入结算。这是正常的截断，不是错误。
#[derive(Debug, Clone, Copy)]
pub struct DurationGuard {
  ceiling: u64,
  processed: u64,
}

impl Default for DurationGuard {
  fn default() -> Self {
    Self::new(DEFAULT_FRAME_CEILING)
  }
}

impl DurationGuard {
  pub fn new(ceiling: u64) -> Self {
    Self {
      ceiling,
      processed: 0,
    }
  }

  pub fn ceiling(&self) -> u64 {
    self.ceiling
  }

  pub fn processed(&self) -> u64 {
    self.processed
  }

  /// 是否已到达上限，到达后不应再读取新帧
  pub fn tripped(&self) -> bool {
    self.processed >= self.ceiling
  }

  pub fn tick(&mut self) {
    self.processed += 1;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn trips_exactly_at_ceiling() {
    let mut guard = DurationGuard::new(3);
    for _ in 0..3 {
      assert!(!guard.tripped());
      guard.tick();
    }
    assert!(guard.tripped());
    assert_eq!(guard.processed(), 3);
  }

  #[test]
  fn default_ceiling() {
    assert_eq!(DurationGuard::default().ceiling(), 1800);
  }
}
