/// 数字卫兵 (Digital Sentinel)
///
/// 实时目标检测
///
/// 系统架构:
/// 1. 采集线程: 读帧, 只保留最新一帧 (独立工作线程)
/// 2. 检测线程: 目标检测, 结果与被检测的帧配对 (独立工作线程)
/// 3. 主线程:   渲染循环 (macroquad 每帧一个节拍)
use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use macroquad::prelude::*;
use macroquad::window::Conf;
use sentinel_pipeline::cli::Args;
use sentinel_pipeline::{DisplaySink, Pipeline, Tick};

mod window;
use window::WindowSink;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn window_conf() -> Conf {
    Conf {
        window_title: "Digital Sentinel".to_owned(),
        window_width: 1280,
        window_height: 720,
        high_dpi: false,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if let Err(e) = run(args).await {
        log::error!("❌ {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.pipeline_config();
    let source = args.open_source()?;
    let detector = args.build_detector(&config)?;
    let mut pipeline = Pipeline::start(source, detector, config)?;
    let mut render = pipeline.render_loop()?;
    let mut sink = WindowSink::new();

    // 关闭窗口时先走正常关闭流程
    prevent_quit();
    log::info!("⌨️  Q / Esc 退出");

    loop {
        if render.latest().is_none() {
            clear_background(BLACK);
            draw_text("waiting for first detection...", 20.0, 40.0, 30.0, GRAY);
        }
        if render.tick(&mut sink) == Tick::Quit {
            break;
        }
        next_frame().await;
    }

    let report = pipeline.stop();
    sink.close();
    log::info!(
        "📊 采集 {} 帧 | 检测 {} 帧 | 渲染结果 {} 个 | 视频源已释放: {}",
        pipeline.monitor().total_captured(),
        pipeline.monitor().total_detected(),
        render.stats().results,
        report.source_released
    );
    Ok(())
}
