// 该文件是 Sentinel （哨兵） 项目的一部分。
// tests/pipeline.rs - 采样检测流水线集成测试
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

use std::sync::{
  Arc, Mutex,
  atomic::{AtomicU64, Ordering},
};

use image::RgbImage;
use thiserror::Error;

use sentinel::{
  AbortCause, Classification, PipelineConfig, PipelineError, PipelineState, SampledDetectionTask,
  StopSignal,
  frame::{Frame, VideoMeta},
  input::{FrameSource, SourceBuilder},
  model::{DetectItem, DetectResult, Detector},
  output::{FrameSink, SinkBuilder},
  task::{StopReason, Task},
};

#[derive(Error, Debug)]
#[error("模拟故障")]
struct FakeError;

#[derive(Default)]
struct Probe {
  opened: AtomicU64,
  reads: AtomicU64,
}

struct FakeSourceBuilder {
  meta: VideoMeta,
  len: u64,
  fail: bool,
  probe: Arc<Probe>,
  stop_after: Option<(u64, StopSignal)>,
}

impl FakeSourceBuilder {
  fn new(len: u64) -> Self {
    Self {
      meta: VideoMeta::new(64, 48, 25.0).with_frame_count_hint(Some(len)),
      len,
      fail: false,
      probe: Arc::default(),
      stop_after: None,
    }
  }
}

struct FakeSource {
  meta: VideoMeta,
  remaining: u64,
  next_index: u64,
  probe: Arc<Probe>,
  stop_after: Option<(u64, StopSignal)>,
}

impl SourceBuilder for FakeSourceBuilder {
  type Source = FakeSource;
  type Error = FakeError;

  fn build(self) -> Result<Self::Source, Self::Error> {
    if self.fail {
      return Err(FakeError);
    }
    self.probe.opened.fetch_add(1, Ordering::SeqCst);
    Ok(FakeSource {
      meta: self.meta,
      remaining: self.len,
      next_index: 0,
      probe: self.probe,
      stop_after: self.stop_after,
    })
  }
}

impl Iterator for FakeSource {
  type Item = Frame;

  fn next(&mut self) -> Option<Frame> {
    if self.remaining == 0 {
      return None;
    }
    self.remaining -= 1;
    let reads = self.probe.reads.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some((after, signal)) = &self.stop_after {
      if reads >= *after {
        signal.stop();
      }
    }
    let frame = Frame::new(RgbImage::new(self.meta.width, self.meta.height), self.next_index);
    self.next_index += 1;
    Some(frame)
  }
}

impl FrameSource for FakeSource {
  fn metadata(&self) -> VideoMeta {
    self.meta
  }
}

/// 按调用次序返回预设结果的检测器，脚本用尽后返回空结果
#[derive(Default)]
struct ScriptedDetector {
  script: Vec<Vec<f32>>,
  fail_on_call: Option<usize>,
  inferred: Mutex<Vec<u64>>,
  rendered: Mutex<Vec<(u64, DetectResult)>>,
  shrink_render: bool,
}

impl ScriptedDetector {
  fn with_script(script: Vec<Vec<f32>>) -> Self {
    Self {
      script,
      ..Default::default()
    }
  }

  fn inferred(&self) -> Vec<u64> {
    self.inferred.lock().unwrap().clone()
  }

  fn rendered(&self) -> Vec<(u64, DetectResult)> {
    self.rendered.lock().unwrap().clone()
  }
}

impl Detector for ScriptedDetector {
  type Error = FakeError;

  fn infer(&self, frame: &Frame, _confidence_threshold: f32) -> Result<DetectResult, Self::Error> {
    let mut inferred = self.inferred.lock().unwrap();
    let call = inferred.len();
    if self.fail_on_call == Some(call) {
      return Err(FakeError);
    }
    inferred.push(frame.index);

    let scores = self.script.get(call).cloned().unwrap_or_default();
    Ok(
      scores
        .into_iter()
        .map(|score| DetectItem::new("accident", score, [0.1, 0.1, 0.5, 0.5]))
        .collect::<Vec<_>>()
        .into(),
    )
  }

  fn render(&self, frame: &Frame, result: &DetectResult) -> Frame {
    self.rendered.lock().unwrap().push((frame.index, result.clone()));
    if self.shrink_render {
      return Frame::new(RgbImage::new(1, 1), frame.index);
    }
    frame.clone()
  }
}

#[derive(Default)]
struct SinkLog {
  opened: Option<(u32, u32, f64)>,
  frames: Vec<(u64, (u32, u32))>,
  closed: bool,
}

struct RecordingSinkBuilder {
  fail: bool,
  fail_write_at: Option<u64>,
  fail_close: bool,
  log: Arc<Mutex<SinkLog>>,
}

impl RecordingSinkBuilder {
  fn new() -> Self {
    Self {
      fail: false,
      fail_write_at: None,
      fail_close: false,
      log: Arc::default(),
    }
  }
}

struct RecordingSink {
  fail_write_at: Option<u64>,
  fail_close: bool,
  log: Arc<Mutex<SinkLog>>,
}

impl SinkBuilder for RecordingSinkBuilder {
  type Sink = RecordingSink;
  type Error = FakeError;

  fn build(self, width: u32, height: u32, fps: f64) -> Result<Self::Sink, Self::Error> {
    if self.fail {
      return Err(FakeError);
    }
    self.log.lock().unwrap().opened = Some((width, height, fps));
    Ok(RecordingSink {
      fail_write_at: self.fail_write_at,
      fail_close: self.fail_close,
      log: self.log,
    })
  }
}

impl FrameSink for RecordingSink {
  type Error = FakeError;

  fn write(&mut self, frame: &Frame) -> Result<(), Self::Error> {
    if self.fail_write_at == Some(frame.index) {
      return Err(FakeError);
    }
    self
      .log
      .lock()
      .unwrap()
      .frames
      .push((frame.index, frame.dimensions()));
    Ok(())
  }

  fn close(self) -> Result<(), Self::Error> {
    if self.fail_close {
      return Err(FakeError);
    }
    self.log.lock().unwrap().closed = true;
    Ok(())
  }

  fn artifact(&self) -> Option<String> {
    Some("memory://annotated.mp4".to_string())
  }
}

fn task(interval: u64) -> SampledDetectionTask {
  SampledDetectionTask::new(PipelineConfig::default().with_sampling_interval(interval))
}

#[test]
fn detector_runs_on_every_nth_tick() {
  let detector = ScriptedDetector::default();
  let sink = RecordingSinkBuilder::new();
  let log = sink.log.clone();

  let output = task(5)
    .run_task(FakeSourceBuilder::new(23), &detector, sink)
    .unwrap();

  assert_eq!(detector.inferred(), vec![0, 5, 10, 15, 20]);
  assert_eq!(output.report.detector_invocations, 5);
  assert_eq!(output.report.ticks, 23);
  assert_eq!(output.report.stop, StopReason::EndOfStream);

  let log = log.lock().unwrap();
  assert_eq!(log.frames.len(), 23);
  assert!(log.frames.iter().enumerate().all(|(i, (index, _))| *index == i as u64));
  assert!(log.closed);
}

#[test]
fn interval_of_one_detects_every_frame() {
  let detector = ScriptedDetector::default();
  let output = task(1)
    .run_task(FakeSourceBuilder::new(7), &detector, RecordingSinkBuilder::new())
    .unwrap();
  assert_eq!(output.report.detector_invocations, 7);
}

fn scored(scores: &[f32]) -> DetectResult {
  scores
    .iter()
    .map(|score| DetectItem::new("accident", *score, [0.1, 0.1, 0.5, 0.5]))
    .collect::<Vec<_>>()
    .into()
}

#[test]
fn intermediate_ticks_reuse_the_latest_result() {
  let detector = ScriptedDetector::with_script(vec![vec![0.7], vec![], vec![0.9, 0.8]]);
  task(3)
    .run_task(FakeSourceBuilder::new(8), &detector, RecordingSinkBuilder::new())
    .unwrap();

  let expected = [
    scored(&[0.7]),
    scored(&[0.7]),
    scored(&[0.7]),
    scored(&[]),
    scored(&[]),
    scored(&[]),
    scored(&[0.9, 0.8]),
    scored(&[0.9, 0.8]),
  ];
  let rendered = detector.rendered();
  assert_eq!(rendered.len(), expected.len());
  for ((tick, result), (expected_tick, expected)) in rendered.iter().zip(expected.iter().enumerate()) {
    assert_eq!(*tick, expected_tick as u64);
    assert_eq!(result, expected, "tick {}", tick);
  }
}

#[test]
fn carried_result_is_not_counted_again() {
  let detector = ScriptedDetector::with_script(vec![vec![0.9]]);
  let output = task(5)
    .run_task(FakeSourceBuilder::new(10), &detector, RecordingSinkBuilder::new())
    .unwrap();

  assert_eq!(output.report.stats.detection_count, 1);
  assert_eq!(output.report.stats.frames_with_detection, 1);
  assert_eq!(output.record.average_confidence(), 0.9);
}

#[test]
fn long_input_is_truncated_at_ceiling() {
  let source = FakeSourceBuilder::new(5000);
  let probe = source.probe.clone();
  let sink = RecordingSinkBuilder::new();
  let log = sink.log.clone();

  let mut task = task(5);
  let output = task
    .run_task(source, ScriptedDetector::default(), sink)
    .unwrap();

  assert_eq!(output.report.ticks, 1800);
  assert_eq!(output.report.stop, StopReason::Truncated);
  // 多读的一帧只用于判断是否截断，不会写入输出
  assert_eq!(probe.reads.load(Ordering::SeqCst), 1801);
  assert_eq!(log.lock().unwrap().frames.len(), 1800);
  assert_eq!(output.record.classification(), Classification::Negative);
  assert_eq!(task.state(), PipelineState::Done);
}

#[test]
fn input_of_exactly_ceiling_length_ends_normally() {
  let sink = RecordingSinkBuilder::new();
  let log = sink.log.clone();

  let output = task(5)
    .run_task(FakeSourceBuilder::new(1800), ScriptedDetector::default(), sink)
    .unwrap();

  assert_eq!(output.report.ticks, 1800);
  assert_eq!(output.report.stop, StopReason::EndOfStream);
  assert_eq!(log.lock().unwrap().frames.len(), 1800);
}

#[test]
fn no_detections_is_negative() {
  let output = task(5)
    .run_task(
      FakeSourceBuilder::new(10),
      ScriptedDetector::default(),
      RecordingSinkBuilder::new(),
    )
    .unwrap();

  assert_eq!(output.record.classification(), Classification::Negative);
  assert_eq!(output.record.average_confidence(), 0.0);
  assert_eq!(output.record.artifact(), "memory://annotated.mp4");
}

#[test]
fn average_is_taken_over_boxes() {
  let detector = ScriptedDetector::with_script(vec![vec![0.7, 0.9], vec![]]);
  let output = task(5)
    .run_task(FakeSourceBuilder::new(10), &detector, RecordingSinkBuilder::new())
    .unwrap();

  assert_eq!(output.record.classification(), Classification::Positive);
  assert_eq!(output.record.average_confidence(), 0.8);
  assert_eq!(output.report.stats.frames_with_detection, 1);

  let json = output.record.to_json();
  assert_eq!(json["classification"], "positive");
  assert_eq!(json["averageConfidence"], 0.8);
  assert_eq!(json["artifactReference"], "memory://annotated.mp4");
}

#[test]
fn sink_failure_happens_before_any_read() {
  let source = FakeSourceBuilder::new(10);
  let probe = source.probe.clone();
  let detector = ScriptedDetector::default();
  let mut sink = RecordingSinkBuilder::new();
  sink.fail = true;

  let mut task = task(5);
  let err = task.run_task(source, &detector, sink).unwrap_err();

  assert!(matches!(err, PipelineError::SinkInitFailed(_)));
  assert_eq!(task.state(), PipelineState::Aborted(AbortCause::SinkInitFailed));
  assert_eq!(probe.reads.load(Ordering::SeqCst), 0);
  assert!(detector.inferred().is_empty());
}

#[test]
fn failed_write_aborts_without_record() {
  let mut sink = RecordingSinkBuilder::new();
  sink.fail_write_at = Some(2);
  let log = sink.log.clone();

  let mut task = task(5);
  let err = task
    .run_task(FakeSourceBuilder::new(10), ScriptedDetector::default(), sink)
    .unwrap_err();

  assert!(matches!(err, PipelineError::SinkWriteFailed { tick: 2, .. }));
  assert_eq!(task.state(), PipelineState::Aborted(AbortCause::SinkWriteFailed));
  let log = log.lock().unwrap();
  assert_eq!(log.frames.len(), 2);
  assert!(!log.closed);
}

#[test]
fn failed_close_aborts_without_record() {
  let mut sink = RecordingSinkBuilder::new();
  sink.fail_close = true;
  let log = sink.log.clone();

  let mut task = task(5);
  let err = task
    .run_task(FakeSourceBuilder::new(10), ScriptedDetector::default(), sink)
    .unwrap_err();

  assert!(matches!(err, PipelineError::SinkWriteFailed { tick: 10, .. }));
  assert_eq!(task.state(), PipelineState::Aborted(AbortCause::SinkWriteFailed));
  assert_eq!(log.lock().unwrap().frames.len(), 10);
}

#[test]
fn unavailable_source_aborts() {
  let mut source = FakeSourceBuilder::new(10);
  source.fail = true;
  let sink = RecordingSinkBuilder::new();
  let log = sink.log.clone();

  let mut task = task(5);
  let err = task
    .run_task(source, ScriptedDetector::default(), sink)
    .unwrap_err();

  assert_eq!(err.cause(), AbortCause::SourceUnavailable);
  assert_eq!(task.state(), PipelineState::Aborted(AbortCause::SourceUnavailable));
  assert!(log.lock().unwrap().opened.is_none());
}

#[test]
fn invalid_config_opens_nothing() {
  let source = FakeSourceBuilder::new(10);
  let probe = source.probe.clone();

  let mut task = SampledDetectionTask::new(PipelineConfig::default().with_confidence_threshold(1.5));
  let err = task
    .run_task(source, ScriptedDetector::default(), RecordingSinkBuilder::new())
    .unwrap_err();

  assert!(matches!(err, PipelineError::InvalidConfig(_)));
  assert_eq!(probe.opened.load(Ordering::SeqCst), 0);
}

#[test]
fn detector_fault_produces_no_record() {
  let detector = ScriptedDetector {
    fail_on_call: Some(1),
    ..ScriptedDetector::with_script(vec![vec![0.9]])
  };
  let sink = RecordingSinkBuilder::new();
  let log = sink.log.clone();

  let mut task = task(5);
  let err = task
    .run_task(FakeSourceBuilder::new(20), &detector, sink)
    .unwrap_err();

  assert!(matches!(err, PipelineError::DetectorFault { tick: 5, .. }));
  assert_eq!(task.state(), PipelineState::Aborted(AbortCause::DetectorFault));
  let log = log.lock().unwrap();
  assert_eq!(log.frames.len(), 5);
  assert!(!log.closed);
}

#[test]
fn stop_signal_ends_run_between_frames() {
  let stop = StopSignal::new();
  let mut source = FakeSourceBuilder::new(100);
  source.stop_after = Some((12, stop.clone()));

  let mut task = task(5).with_stop_signal(stop);
  let output = task
    .run_task(source, ScriptedDetector::default(), RecordingSinkBuilder::new())
    .unwrap();

  assert_eq!(output.report.stop, StopReason::Cancelled);
  assert_eq!(output.report.ticks, 12);
  assert_eq!(task.state(), PipelineState::Done);
}

#[test]
fn frames_are_scaled_to_max_width() {
  let mut source = FakeSourceBuilder::new(3);
  source.meta = VideoMeta::new(1920, 1080, 0.0);
  let sink = RecordingSinkBuilder::new();
  let log = sink.log.clone();

  let output = task(5)
    .run_task(source, ScriptedDetector::default(), sink)
    .unwrap();

  assert_eq!(output.report.output_size, (640, 360));
  let log = log.lock().unwrap();
  assert_eq!(log.opened, Some((640, 360, 30.0)));
  assert!(log.frames.iter().all(|(_, dims)| *dims == (640, 360)));
}

#[test]
#[should_panic(expected = "渲染帧尺寸与输出尺寸不一致")]
fn render_size_mismatch_is_a_bug() {
  let detector = ScriptedDetector {
    shrink_render: true,
    ..Default::default()
  };
  let _ = task(5).run_task(FakeSourceBuilder::new(3), &detector, RecordingSinkBuilder::new());
}

#[test]
fn shared_detector_serves_independent_runs() {
  let detector = Arc::new(ScriptedDetector::with_script(vec![vec![0.6]]));

  let handles: Vec<_> = (0..2)
    .map(|_| {
      let detector = Arc::clone(&detector);
      std::thread::spawn(move || {
        task(5)
          .run_task(FakeSourceBuilder::new(10), detector, RecordingSinkBuilder::new())
          .map(|output| output.report.ticks)
      })
    })
    .collect();

  for handle in handles {
    assert_eq!(handle.join().unwrap().unwrap(), 10);
  }
  assert_eq!(detector.inferred().len(), 4);
}
