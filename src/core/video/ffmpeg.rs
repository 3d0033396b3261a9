//! ffmpeg 解码源 - ffprobe 探测元数据，ffmpeg 以 rgb24 原始流输出帧

use super::frame::{PixelLayout, RawFrame};
use super::sampler::FrameSource;
use crate::core::error::{DetectorError, Result};
use log::{debug, info};
use serde::Deserialize;
use std::ffi::OsString;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

/// 视频流元数据
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: Option<f64>,
}

/// Parses ffprobe rates such as `30000/1001`, `25/1` or `0/0`.
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let rate = rate.trim();
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

pub fn probe(path: &Path) -> Result<VideoInfo> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate",
            "-of",
            "json",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| DetectorError::Decode(format!("ffprobe not available: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DetectorError::Decode(format!(
            "{}: {}",
            path.display(),
            stderr.trim()
        )));
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| DetectorError::Decode(format!("unreadable ffprobe output: {}", e)))?;
    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| DetectorError::Decode(format!("{}: no video stream", path.display())))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(DetectorError::Decode(format!(
                "{}: video stream has no dimensions",
                path.display()
            )))
        }
    };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate));

    Ok(VideoInfo { width, height, fps })
}

/// Decodes the probed stream (`v:0`) at its native frame cadence to rgb24 on stdout.
pub fn decode_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-noautorotate", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_os_string());
    // 与 ffprobe 同一路流；不补帧也不丢帧
    args.extend(
        ["-map", "0:v:0", "-fps_mode", "passthrough", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"]
            .into_iter()
            .map(OsString::from),
    );
    args
}

/// 持有 ffmpeg 子进程；Drop 时终止并回收，保证任何退出路径都释放解码器
pub struct FfmpegSource {
    info: VideoInfo,
    child: Child,
    stdout: BufReader<ChildStdout>,
    frame_index: u64,
    finished: bool,
}

impl FfmpegSource {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DetectorError::Decode(path.display().to_string()));
        }

        let info = probe(path)?;
        debug!(
            "🎞️ Probed {}: {}x{} @ {:?} fps",
            path.display(),
            info.width,
            info.height,
            info.fps
        );

        let mut child = Command::new("ffmpeg")
            .args(decode_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| DetectorError::Decode(format!("ffmpeg not available: {}", e)))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DetectorError::Decode("ffmpeg stdout unavailable".into()));
            }
        };

        info!("🎬 FfmpegSource: opened {}", path.display());
        Ok(Self {
            info,
            child,
            stdout: BufReader::new(stdout),
            frame_index: 0,
            finished: false,
        })
    }
}

impl FrameSource for FfmpegSource {
    fn native_fps(&self) -> Option<f64> {
        self.info.fps
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        if self.finished {
            return Ok(None);
        }

        let frame_len = self.info.width as usize * self.info.height as usize * 3;
        let mut buf = vec![0u8; frame_len];
        match self.stdout.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.finished = true;
                return Ok(None);
            }
            Err(e) => {
                self.finished = true;
                return Err(DetectorError::Decode(format!("ffmpeg stream read failed: {}", e)));
            }
        }

        let fps = self.info.fps.unwrap_or(super::sampler::FALLBACK_FPS);
        let timestamp_ms = (self.frame_index as f64 * 1000.0 / fps) as u64;
        let frame = RawFrame::new(
            self.info.width,
            self.info.height,
            PixelLayout::Rgb8,
            buf,
            timestamp_ms,
            self.frame_index,
        );
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!("🗑️ FfmpegSource: released decoder after {} frames", self.frame_index);
    }
}
