/// 数字卫兵 - 无界面模式
///
/// 运行完整流水线, 叠加画面只在内存中合成, 定期输出统计日志。
/// Ctrl-C、标准输入 `q` 或 `--duration` 到期时退出。
use std::io::BufRead;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use sentinel_pipeline::cli::Args;
use sentinel_pipeline::{CancelToken, HeadlessSink, Pipeline};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = args.pipeline_config();
    let source = args.open_source()?;
    let detector = args.build_detector(&config)?;
    let mut pipeline = Pipeline::start(source, detector, config)?;

    let quit = CancelToken::new();
    let on_signal = quit.clone();
    ctrlc::set_handler(move || {
        on_signal.cancel();
    })
    .context("设置 Ctrl-C 处理失败")?;
    watch_stdin(quit.clone());

    let mut sink = HeadlessSink::new().with_quit_signal(quit);
    if let Some(secs) = args.duration {
        sink = sink.with_duration(Duration::from_secs_f64(secs.max(0.0)));
    }

    log::info!("⌨️  输入 q 回车或按 Ctrl-C 退出");
    let summary = pipeline.run(&mut sink)?;

    let secs = summary.elapsed.as_secs_f64().max(f64::EPSILON);
    log::info!(
        "📊 运行 {:.1}s | 采集 {} 帧 ({:.1} fps) | 检测 {} 帧 ({:.1} fps) | 渲染结果 {} 个",
        secs,
        summary.total_captured,
        summary.total_captured as f64 / secs,
        summary.total_detected,
        summary.total_detected as f64 / secs,
        summary.render.results
    );
    if !(summary.shutdown.capture_joined && summary.shutdown.detection_joined) {
        log::warn!("⚠️  有后台线程未在超时内退出");
    }
    Ok(())
}

/// 后台读取标准输入, 收到 `q` 时请求退出
fn watch_stdin(quit: CancelToken) {
    let spawned = thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                        quit.cancel();
                        break;
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });
    if let Err(e) = spawned {
        log::warn!("⚠️  无法监听标准输入: {}", e);
    }
}
