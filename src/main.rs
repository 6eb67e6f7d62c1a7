// 该文件是 Sentinel （哨兵） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use sentinel::{
  FromUrl, SampledDetectionTask, StopSignal,
  input::InputBuilder,
  model::Yolo26Builder,
  output::{OutputSet, draw::Draw},
  task::Task,
};

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = args::Args::parse();
  let config = args.pipeline_config();

  println!("Sentinel 视频检测标注");
  println!("=====================");
  println!("模型: {}", args.model);
  println!("输入: {}", args.input);
  println!("部署模式: {:?}", args.mode);
  println!("置信度阈值: {}", config.confidence_threshold);
  println!("采样间隔: {}", config.sampling_interval);
  println!("最大宽度: {}", config.max_width);
  println!("最大帧数: {}", config.frame_ceiling);
  println!();

  let model_url = Url::parse(&args.model).context("模型 URL 无效")?;
  let mut model = Yolo26Builder::from_url(&model_url)?.with_labels(args.labels.iter().cloned());
  if let Some(font) = &args.font {
    let draw = Draw::with_font_file(font)
      .with_context(|| format!("无法加载字体: {}", font.display()))?;
    model = model.with_draw(draw);
  }
  println!("正在加载模型...");
  let detector = model.build().context("模型加载失败")?;
  println!("模型加载完成");

  let input_url = Url::parse(&args.input).context("输入 URL 无效")?;
  let input = InputBuilder::from_url(&input_url)?;
  let outputs: OutputSet<_> = args.output_builders(&input_url)?.into_iter().collect();

  let stop = StopSignal::new()
    .on_ctrl_c()
    .context("无法注册中断信号处理")?;
  let mut task = SampledDetectionTask::new(config).with_stop_signal(stop);
  let output = task.run_task(input, &detector, outputs)?;

  info!("运行结束: {:?}", output.report.stop);

  if args.json {
    println!("{}", output.record.to_json());
    return Ok(());
  }

  let report = &output.report;
  println!();
  println!("处理完成 ({})", report.stop);
  println!("处理帧数: {}", report.ticks);
  println!("检测次数: {}", report.detector_invocations);
  println!("有目标的采样帧: {}", report.stats.frames_with_detection);
  println!("检测框总数: {}", report.stats.detection_count);
  println!("输出尺寸: {}x{}", report.output_size.0, report.output_size.1);
  println!("耗时: {:.2?}", report.elapsed);
  println!();
  println!("分类结果: {}", output.record.classification());
  println!("平均置信度: {:.2}", output.record.average_confidence());
  println!("输出: {}", output.record.artifact());

  Ok(())
}
