//! FFmpeg 视频源 (需要 `ffmpeg` feature)
//!
//! 后台解码线程: RTSP/摄像头 → YUV420P → RGB 帧 → 单槽邮箱。
//! `read_frame` 从邮箱取最新解码帧, 超时返回 `false`。

use std::sync::mpsc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};

use super::yuv::yuv420p_to_rgb;
use super::VideoSource;
use crate::activity::{Activity, Joined};
use crate::cancel::CancelToken;
use crate::frame::Frame;
use crate::mailbox::{Mailbox, MailboxReader, MailboxWriter};

/// 输入源类型
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    Rtsp(String),
    Camera { index: usize, name: String },
}

impl InputSource {
    fn url(&self) -> String {
        match self {
            InputSource::Rtsp(url) => url.clone(),
            InputSource::Camera { index, name } => format_camera_url(*index, name),
        }
    }

    fn build_input(&self) -> Input {
        match self {
            InputSource::Rtsp(url) => Input::new(url.as_str()).set_input_opts(
                [
                    ("rtsp_transport", "tcp"),
                    ("buffer_size", "67108864"),
                    ("rtsp_flags", "prefer_tcp"),
                ]
                .into(),
            ),
            InputSource::Camera { .. } => Input::new(self.url()).set_format(camera_format()),
        }
    }
}

/// 格式化摄像头URL - 根据平台选择
#[allow(unused_variables)]
fn format_camera_url(index: usize, name: &str) -> String {
    #[cfg(target_os = "windows")]
    {
        format!("video={}", name)
    }
    #[cfg(target_os = "macos")]
    {
        format!("{}", index)
    }
    #[cfg(target_os = "linux")]
    {
        format!("/dev/video{}", index)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        format!("{}", index)
    }
}

fn camera_format() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "dshow"
    }
    #[cfg(target_os = "macos")]
    {
        "avfoundation"
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        "v4l2"
    }
}

/// 解码过滤器: YUV420P → RGB 帧, 写入邮箱
struct FrameSink {
    frames: MailboxWriter<Frame>,
    working: Frame,
    stop: CancelToken,
    total_frames: u64,
    dropped_frames: u64,
}

impl FrameFilter for FrameSink {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        log::info!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: ez_ffmpeg::Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<ez_ffmpeg::Frame>, String> {
        if self.stop.is_cancelled() {
            return Err("video source released".to_string());
        }
        self.total_frames += 1;

        if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
            self.dropped_frames += 1;
            return Ok(None);
        }

        // SAFETY: 指针非空, 平面尺寸由 stride × 行数给出, 只在本次回调内借用
        let converted = unsafe {
            let av = &*frame.as_ptr();
            let w = av.width.max(0) as usize;
            let h = av.height.max(0) as usize;
            let y_stride = av.linesize[0].max(0) as usize;
            let uv_stride = av.linesize[1].max(0) as usize;
            if w == 0 || h == 0 || av.data[0].is_null() || av.data[1].is_null() || av.data[2].is_null() {
                None
            } else {
                let chroma_rows = h.div_ceil(2);
                let y_plane = std::slice::from_raw_parts(av.data[0], y_stride * h);
                let u_plane = std::slice::from_raw_parts(av.data[1], uv_stride * chroma_rows);
                let v_plane = std::slice::from_raw_parts(av.data[2], uv_stride * chroma_rows);
                self.working.reshape(w as u32, h as u32, 3);
                Some(yuv420p_to_rgb(
                    y_plane,
                    u_plane,
                    v_plane,
                    y_stride,
                    uv_stride,
                    self.working.pixels_mut(),
                    w,
                    h,
                ))
            }
        };

        if converted != Some(true) {
            self.dropped_frames += 1;
            if self.dropped_frames <= 10 {
                log::warn!("⚠️  丢弃帧 #{}: 帧数据无效", self.total_frames);
            }
            return Ok(None);
        }

        self.frames.publish(self.working.clone());
        Ok(Some(frame))
    }
}

pub struct FfmpegSource {
    input: InputSource,
    frames: MailboxReader<Frame>,
    read_timeout: Duration,
    stop: CancelToken,
    decoder: Option<Activity<()>>,
}

/// 释放时等待解码线程退出的上限
const DECODER_STOP_TIMEOUT: Duration = Duration::from_millis(500);

impl FfmpegSource {
    /// 打开输入并启动解码线程。FFmpeg 上下文构建或启动失败时返回错误。
    pub fn open(input: InputSource, read_timeout: Duration) -> Result<Self> {
        let url = input.url();
        log::info!("🔗 打开视频源: {}", url);

        let (writer, reader) = Mailbox::new().split();
        let stop = CancelToken::new();
        let sink = FrameSink {
            frames: writer,
            working: Frame::empty(),
            stop: stop.clone(),
            total_frames: 0,
            dropped_frames: 0,
        };

        let (started_tx, started_rx) = mpsc::channel::<Result<(), String>>();
        let ffmpeg_input = input.build_input();
        let decoder = Activity::spawn("ffmpeg-decode", move || {
            let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
            let pipe = pipe.filter("decode", Box::new(sink));
            let out = create_null_output().add_frame_pipeline(pipe);

            let ctx = match FfmpegContext::builder()
                .input(ffmpeg_input)
                .filter_desc("format=yuv420p")
                .output(out)
                .build()
            {
                Ok(ctx) => ctx,
                Err(e) => {
                    let _ = started_tx.send(Err(format!("构建失败: {}", e)));
                    return;
                }
            };
            let sch = match ctx.start() {
                Ok(sch) => sch,
                Err(e) => {
                    let _ = started_tx.send(Err(format!("启动失败: {}", e)));
                    return;
                }
            };
            let _ = started_tx.send(Ok(()));
            let _ = sch.wait();
            log::info!("📹 解码循环结束");
        })?;

        match started_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => bail!("打开视频源 {} 失败: {}", url, e),
            Err(_) => return Err(anyhow!("解码线程意外退出: {}", url)),
        }
        log::info!("✅ 视频源已连接: {}", url);

        Ok(Self {
            input,
            frames: reader,
            read_timeout,
            stop,
            decoder: Some(decoder),
        })
    }
}

impl VideoSource for FfmpegSource {
    fn describe(&self) -> String {
        self.input.url()
    }

    fn is_opened(&self) -> bool {
        self.decoder.is_some()
    }

    fn read_frame(&mut self, frame: &mut Frame) -> bool {
        match self.frames.try_take(self.read_timeout) {
            Ok(Some(decoded)) => {
                *frame = decoded;
                true
            }
            Ok(None) | Err(_) => false,
        }
    }

    fn release(&mut self) {
        self.stop.cancel();
        let Some(decoder) = self.decoder.take() else {
            return;
        };
        // 解码线程在下一帧回调时退出; 流已停滞时不再等待
        match decoder.join_timeout(DECODER_STOP_TIMEOUT) {
            Joined::Finished(()) => log::info!("📴 视频源已释放: {}", self.input.url()),
            Joined::Panicked => log::warn!("⚠️  解码线程异常退出: {}", self.input.url()),
            Joined::TimedOut(_) => log::warn!("⚠️  解码线程未及时退出, 已分离: {}", self.input.url()),
        }
    }
}
