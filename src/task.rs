// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/task.rs - 采样检测任务
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

use std::{
  fmt,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
  aggregate::{DetectionAggregator, ResultRecord, RunningStats},
  config::PipelineConfig,
  error::{AbortCause, PipelineError},
  frame::Frame,
  guard::DurationGuard,
  input::{FrameSource, SourceBuilder},
  model::Detector,
  output::{FrameSink, SinkBuilder},
  resolution::Resizer,
  scheduler::{Decision, SamplingScheduler},
};

/// 进度日志间隔（帧）
const PROGRESS_LOG_INTERVAL: u64 = 50;

pub trait Task<I, M, O> {
  type Output;
  type Error;
  fn run_task(&mut self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 流水线状态
///
/// `Idle → Opening → Streaming → Finalizing → Done`，
/// 在 `Opening` 或 `Streaming` 阶段出错时进入 `Aborted`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
  Idle,
  Opening,
  Streaming,
  Finalizing,
  Done,
  Aborted(AbortCause),
}

/// 停止读取输入的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
  /// 输入源结束
  EndOfStream,
  /// 达到帧数上限被截断
  Truncated,
  /// 收到外部停止信号
  Cancelled,
}

impl fmt::Display for StopReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let text = match self {
      StopReason::EndOfStream => "输入结束",
      StopReason::Truncated => "达到帧数上限",
      StopReason::Cancelled => "外部停止",
    };
    f.write_str(text)
  }
}

/// 协作式停止信号，只在两帧之间检查
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
  flag: Arc<AtomicBool>,
}

impl StopSignal {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn stop(&self) {
    self.flag.store(true, Ordering::SeqCst);
  }

  pub fn is_stopped(&self) -> bool {
    self.flag.load(Ordering::SeqCst)
  }

  /// 收到 Ctrl-C 时触发停止；30 秒内未退出则强制结束进程
  pub fn on_ctrl_c(self) -> Result<Self, ctrlc::Error> {
    let signal = self.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      signal.stop();
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;
    Ok(self)
  }
}

/// 运行诊断信息，不属于结果记录
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
  /// 已处理（写入输出）的帧数
  pub ticks: u64,
  /// 检测器调用次数
  pub detector_invocations: u64,
  pub stats: RunningStats,
  pub stop: StopReason,
  /// 输出尺寸
  pub output_size: (u32, u32),
  pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct RunOutput {
  pub record: ResultRecord,
  pub report: RunReport,
}

/// 按采样间隔运行检测的视频任务
///
/// 每个任务实例拥有自己的调度器、统计与输出句柄，多个任务之间不共享可变状态。
#[derive(Debug)]
pub struct SampledDetectionTask {
  config: PipelineConfig,
  stop: StopSignal,
  state: PipelineState,
}

impl Default for SampledDetectionTask {
  fn default() -> Self {
    Self::new(PipelineConfig::default())
  }
}

impl SampledDetectionTask {
  pub fn new(config: PipelineConfig) -> Self {
    Self {
      config,
      stop: StopSignal::new(),
      state: PipelineState::Idle,
    }
  }

  pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
    self.stop = stop;
    self
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn state(&self) -> PipelineState {
    self.state
  }

  fn transition(&mut self, next: PipelineState) {
    debug!("流水线状态: {:?} -> {:?}", self.state, next);
    self.state = next;
  }

  fn stream<I, M, O>(&mut self, input: I, model: M, output: O) -> Result<RunOutput, PipelineError>
  where
    I: SourceBuilder,
    M: Detector,
    O: SinkBuilder,
  {
    let started = Instant::now();
    self.config.validate()?;
    let interval = self.config.sampling_interval()?;

    let source = input
      .build()
      .map_err(|e| PipelineError::SourceUnavailable(Box::new(e)))?;
    let meta = source.metadata();
    if meta.width == 0 || meta.height == 0 {
      return Err(PipelineError::SourceUnavailable(
        format!("输入尺寸无效: {}x{}", meta.width, meta.height).into(),
      ));
    }

    let resizer = Resizer::new(meta.width, meta.height, self.config.max_width);
    let (width, height) = resizer.target();
    let fps = meta.effective_fps();
    if fps != meta.fps {
      warn!("输入帧率无效 ({}), 使用 {} fps", meta.fps, fps);
    }
    info!(
      "输入 {}x{} @ {:.2} fps, 输出 {}x{}",
      meta.width, meta.height, fps, width, height
    );

    // 输出必须在读取任何帧之前打开
    let mut sink = output
      .build(width, height, fps)
      .map_err(|e| PipelineError::SinkInitFailed(Box::new(e)))?;

    self.transition(PipelineState::Streaming);

    // 达到帧数上限时预读一帧（不处理），区分截断与恰好结束
    let mut frames = source.peekable();

    let mut scheduler = SamplingScheduler::new(interval);
    let mut aggregator = DetectionAggregator::new();
    let mut guard = DurationGuard::new(self.config.frame_ceiling);
    let mut detector_invocations = 0u64;

    let stop = loop {
      if guard.tripped() {
        break match frames.peek() {
          Some(_) => StopReason::Truncated,
          None => StopReason::EndOfStream,
        };
      }
      if self.stop.is_stopped() {
        break StopReason::Cancelled;
      }
      let Some(frame) = frames.next() else {
        break StopReason::EndOfStream;
      };

      let tick = guard.processed();
      let frame = resizer.apply(Frame::new(frame.image, tick));

      let rendered = match scheduler.decide(tick) {
        Decision::Detect => {
          let now = Instant::now();
          let result = model
            .infer(&frame, self.config.confidence_threshold)
            .map_err(|e| PipelineError::DetectorFault {
              tick,
              source: Box::new(e),
            })?;
          detector_invocations += 1;
          debug!(
            "第 {} 帧推理完成，检测到 {} 个目标，耗时: {:.2?}",
            tick,
            result.len(),
            now.elapsed()
          );
          aggregator.record(&result);
          let carried = scheduler.store(result);
          model.render(&frame, carried)
        }
        Decision::Reuse | Decision::PassThrough => match scheduler.carried() {
          Some(carried) => model.render(&frame, carried),
          None => frame,
        },
      };

      assert_eq!(
        rendered.dimensions(),
        (width, height),
        "渲染帧尺寸与输出尺寸不一致"
      );

      sink
        .write(&rendered)
        .map_err(|e| PipelineError::SinkWriteFailed {
          tick,
          source: Box::new(e),
        })?;
      guard.tick();

      if guard.processed() % PROGRESS_LOG_INTERVAL == 0 {
        match meta.frame_count_hint {
          Some(total) => info!("已处理 {}/{} 帧...", guard.processed(), total),
          None => info!("已处理 {} 帧...", guard.processed()),
        }
      }
    };

    match stop {
      StopReason::EndOfStream => info!("输入结束，共处理 {} 帧", guard.processed()),
      StopReason::Truncated => warn!(
        "视频过长，已在 {} 帧处截断",
        guard.ceiling()
      ),
      StopReason::Cancelled => warn!("收到停止信号，已处理 {} 帧", guard.processed()),
    }

    self.transition(PipelineState::Finalizing);
    drop(frames);

    let artifact = sink.artifact().unwrap_or_default();
    sink
      .close()
      .map_err(|e| PipelineError::SinkWriteFailed {
        tick: guard.processed(),
        source: Box::new(e),
      })?;

    let verdict = aggregator.finalize();
    let record = ResultRecord::new(verdict, artifact);
    let report = RunReport {
      ticks: guard.processed(),
      detector_invocations,
      stats: *aggregator.stats(),
      stop,
      output_size: (width, height),
      elapsed: started.elapsed(),
    };

    Ok(RunOutput { record, report })
  }
}

impl<I, M, O> Task<I, M, O> for SampledDetectionTask
where
  I: SourceBuilder,
  M: Detector,
  O: SinkBuilder,
{
  type Output = RunOutput;
  type Error = PipelineError;

  fn run_task(&mut self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    self.transition(PipelineState::Opening);

    match self.stream(input, model, output) {
      Ok(output) => {
        self.transition(PipelineState::Done);
        info!(
          "任务完成: {} (平均置信度 {:.2}), 耗时 {:.2?}",
          output.record.classification(),
          output.record.average_confidence(),
          output.report.elapsed
        );
        Ok(output)
      }
      Err(e) => {
        self.transition(PipelineState::Aborted(e.cause()));
        tracing::error!("任务终止: {}", e);
        Err(e)
      }
    }
  }
}
