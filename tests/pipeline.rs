use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::Result;
use sentinel_pipeline::detection::filter_target;
use sentinel_pipeline::source::synthetic::frame_index;
use sentinel_pipeline::{
    HeadlessSink, Pipeline, PipelineConfig, RenderLoop, SimulatedDetector, SyntheticConfig, SyntheticSource, Tick,
};

fn synthetic(fps: f64) -> SyntheticSource {
    SyntheticSource::new(SyntheticConfig {
        width: 64,
        height: 48,
        fps,
        ..SyntheticConfig::default()
    })
}

fn config() -> PipelineConfig {
    PipelineConfig {
        rate_report_interval: Duration::from_millis(500),
        detection_wait_timeout: Duration::from_millis(50),
        ..PipelineConfig::default()
    }
}

/// 驱动渲染循环 `duration`, 每收到一个新结果调用一次 `on_result`
fn drive(render: &mut RenderLoop, duration: Duration, mut on_result: impl FnMut(&RenderLoop)) -> HeadlessSink {
    let mut sink = HeadlessSink::new().with_duration(duration);
    let mut seen = 0;
    while render.tick(&mut sink) == Tick::Continue {
        if render.stats().results != seen {
            seen = render.stats().results;
            on_result(render);
        }
    }
    sink
}

#[test]
fn results_pair_detections_with_their_frame() -> Result<()> {
    let config = config();
    let mut pipeline = Pipeline::start(
        Box::new(synthetic(120.0)),
        SimulatedDetector::new(Duration::from_millis(20)),
        config.clone(),
    )?;
    let mut render = pipeline.render_loop()?;

    let mut checked = 0;
    drive(&mut render, Duration::from_millis(800), |render| {
        let latest = render.latest().unwrap();
        let expected = filter_target(
            SimulatedDetector::locate(&latest.frame, config.target_class_id),
            config.target_class_id,
            config.confidence_threshold,
        );
        assert_eq!(latest.detections, expected);
        assert_eq!(latest.count(), 1);

        // 合成画面来自同一帧
        let composed = render.composed().unwrap();
        assert_eq!(frame_index(composed), frame_index(&latest.frame));
        checked += 1;
    });

    assert!(checked >= 5, "only {} results checked", checked);
    pipeline.stop();
    Ok(())
}

#[test]
fn detection_works_on_the_freshest_frame() -> Result<()> {
    let mut pipeline = Pipeline::start(
        Box::new(synthetic(200.0)),
        SimulatedDetector::new(Duration::from_millis(50)),
        config(),
    )?;
    let monitor = pipeline.monitor();
    let mut render = pipeline.render_loop()?;

    let mut last_seq = 0;
    let mut last_index = 0;
    let mut skipped = 0;
    drive(&mut render, Duration::from_millis(1000), |render| {
        let latest = render.latest().unwrap();
        let index = frame_index(&latest.frame).unwrap();
        assert!(latest.seq > last_seq);
        assert!(index > last_index);
        if last_index > 0 && index > last_index + 1 {
            skipped += 1;
        }
        // 结果对应的帧落后于最新采集不超过一个推理周期 (加余量)
        let behind = monitor.total_captured().saturating_sub(index);
        assert!(behind <= 40, "result frame {} is {} frames behind", index, behind);
        last_seq = latest.seq;
        last_index = index;
    });

    // 推理期间产生的旧帧被丢弃而不是排队
    assert!(skipped >= 5);
    pipeline.stop();
    Ok(())
}

#[test]
fn slow_detector_does_not_slow_capture() -> Result<()> {
    let mut pipeline = Pipeline::start(
        Box::new(synthetic(100.0)),
        SimulatedDetector::new(Duration::from_millis(400)),
        config(),
    )?;
    let mut sink = HeadlessSink::new().with_duration(Duration::from_millis(1000));
    let summary = pipeline.run(&mut sink)?;

    assert!(
        (80..=110).contains(&summary.total_captured),
        "captured {}",
        summary.total_captured
    );
    assert!(summary.total_detected <= 3);
    let capture = summary.shutdown.capture.unwrap();
    // 未被取走的帧都被覆盖了
    assert!(capture.overwritten + summary.total_detected + 2 >= capture.captured);
    Ok(())
}

#[test]
fn source_recovers_after_disconnect() -> Result<()> {
    let source = SyntheticSource::new(SyntheticConfig {
        width: 64,
        height: 48,
        fps: 200.0,
        failures: vec![10..30],
        ..SyntheticConfig::default()
    });
    let config = PipelineConfig {
        max_consecutive_failures: Some(5),
        ..config()
    };
    let mut pipeline = Pipeline::start(Box::new(source), SimulatedDetector::new(Duration::from_millis(5)), config)?;
    let mut render = pipeline.render_loop()?;

    let mut after_recovery = 0;
    drive(&mut render, Duration::from_millis(600), |render| {
        if frame_index(&render.latest().unwrap().frame).unwrap() > 10 {
            after_recovery += 1;
        }
    });

    let report = pipeline.stop();
    let capture = report.capture.unwrap();
    assert_eq!(capture.failed_reads, 20);
    assert_eq!(capture.degraded_events, 1);
    assert!(after_recovery > 0);
    assert!(report.source_released);
    Ok(())
}

#[test]
fn detector_errors_do_not_stop_the_pipeline() -> Result<()> {
    let detector = SimulatedDetector::new(Duration::from_millis(5)).fail_every(3).panic_every(7);
    let mut pipeline = Pipeline::start(Box::new(synthetic(200.0)), detector, config())?;
    let mut sink = HeadlessSink::new().with_duration(Duration::from_millis(500));
    let summary = pipeline.run(&mut sink)?;

    let detection = summary.shutdown.detection.unwrap();
    assert!(detection.processed >= 10);
    assert!(detection.failures >= 3);
    assert!(detection.panics >= 1);
    assert_eq!(summary.total_detected, detection.processed);
    assert!(summary.shutdown.detection_joined);
    Ok(())
}

#[test]
fn rates_follow_source_and_detector() -> Result<()> {
    let mut pipeline = Pipeline::start(
        Box::new(synthetic(100.0)),
        SimulatedDetector::new(Duration::from_millis(50)),
        config(),
    )?;
    let mut render = pipeline.render_loop()?;
    drive(&mut render, Duration::from_millis(1300), |_| {});

    // 采集速率与源帧率相差不超过 5%
    let rates = render.rates();
    assert!(
        (95.0..=105.0).contains(&rates.capture_fps),
        "capture {:.1}",
        rates.capture_fps
    );
    // 每次检测 50ms 推理, 取帧几乎不等待
    assert!(
        (17.0..=21.0).contains(&rates.detection_fps),
        "detection {:.1}",
        rates.detection_fps
    );
    pipeline.stop();
    Ok(())
}

#[test]
fn stop_is_idempotent_and_releases_source_once() -> Result<()> {
    let source = synthetic(60.0);
    let releases = source.release_counter();
    let mut pipeline = Pipeline::start(Box::new(source), SimulatedDetector::new(Duration::from_millis(100)), config())?;

    let start = Instant::now();
    let first = pipeline.stop();
    // 取消后检测线程在当前推理结束即退出
    assert!(start.elapsed() < Duration::from_millis(600));
    assert!(first.capture_joined && first.detection_joined && first.source_released);

    assert!(pipeline.stop().already_stopped);
    assert!(!pipeline.is_running());
    drop(pipeline);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn reference_run_thirty_fps_source_with_hundred_ms_detector() -> Result<()> {
    let config = config();
    let mut pipeline = Pipeline::start(
        Box::new(synthetic(30.0)),
        SimulatedDetector::new(Duration::from_millis(100)),
        config.clone(),
    )?;
    let monitor = pipeline.monitor();
    let mut render = pipeline.render_loop()?;
    let mut sink = drive(&mut render, Duration::from_secs(10), |_| {});

    // 10 秒内约 300 帧采集 (±5%), 约 100 次检测 (±10%)
    let captured = monitor.total_captured();
    let detected = monitor.total_detected();
    assert!((285..=315).contains(&captured), "captured {}", captured);
    assert!((90..=110).contains(&detected), "detected {}", detected);

    let report = pipeline.stop();
    assert!(report.source_released);
    let published = report.detection.unwrap().processed;

    // 取走关闭前发布的最后一个结果, 画面与它配对
    render.tick(&mut sink);
    let latest = render.latest().unwrap();
    assert_eq!(latest.seq, published);
    let expected = filter_target(
        SimulatedDetector::locate(&latest.frame, config.target_class_id),
        config.target_class_id,
        config.confidence_threshold,
    );
    assert_eq!(latest.detections, expected);
    assert_eq!(frame_index(render.composed().unwrap()), frame_index(&latest.frame));
    assert!(sink.distinct_frames() >= render.stats().results);
    Ok(())
}
