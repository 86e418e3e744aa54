//! Daemon configuration.
//!
//! Configuration is resolved in three phases, in the same shape as the rest
//! of our daemons: a JSON file (named by `GESTURED_CONFIG` or `--config`),
//! then environment overrides, then validation. Option names follow the
//! recognized surface: `hand_detection_confidence`, `gesture_actions`,
//! `use_rtsp`, `video_loop_enabled`, and so on.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::classify::GestureMap;
use crate::source::{RtspTransport, SourceMode, VideoSourceConfig};
use crate::track::TrackerConfig;

const DEFAULT_HAND_DETECTION_CONFIDENCE: f32 = 0.7;
const DEFAULT_MAX_NUM_HANDS: usize = 1;
const DEFAULT_FRAME_WIDTH: u32 = 640;
const DEFAULT_FRAME_HEIGHT: u32 = 480;
const DEFAULT_VOLUME_STEP: f32 = 0.05;
const DEFAULT_GESTURE_COOLDOWN_SECONDS: f64 = 2.0;
const DEFAULT_CAMERA_INDEX: u32 = 0;
const DEFAULT_DEVICE_TEMPLATE: &str = "/dev/video{index}";
const DEFAULT_RTSP_URL: &str = "rtsp://127.0.0.1:554/stream";
const DEFAULT_VIDEO_FORMATS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    hand_detection_confidence: Option<f32>,
    max_num_hands: Option<usize>,
    gesture_actions: Option<BTreeMap<u8, String>>,
    frame_width: Option<u32>,
    frame_height: Option<u32>,
    volume_step: Option<f32>,
    gesture_cooldown_seconds: Option<f64>,
    camera_index: Option<u32>,
    camera_auto_detect: Option<bool>,
    device_template: Option<String>,
    use_rtsp: Option<bool>,
    rtsp_url: Option<String>,
    rtsp_transport: Option<String>,
    video_loop_enabled: Option<bool>,
    supported_video_formats: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub hand_detection_confidence: f32,
    pub max_num_hands: usize,
    pub gesture_actions: GestureMap,
    pub frame_width: u32,
    pub frame_height: u32,
    pub volume_step: f32,
    pub gesture_cooldown: Duration,
    pub camera_index: u32,
    pub camera_auto_detect: bool,
    pub device_template: String,
    pub use_rtsp: bool,
    pub rtsp_url: String,
    pub rtsp_transport: RtspTransport,
    pub video_loop_enabled: bool,
    pub supported_video_formats: Vec<String>,
}

impl AppConfig {
    /// Load from the file named by `GESTURED_CONFIG` (if any), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GESTURED_CONFIG").ok();
        Self::load_with(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file path (or defaults when `None`).
    pub fn load_with(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => AppConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let gesture_actions = match file.gesture_actions {
            Some(labels) => GestureMap::from_labels(&labels)?,
            None => GestureMap::default(),
        };
        let rtsp_transport = match file.rtsp_transport {
            Some(value) => value.parse()?,
            None => RtspTransport::Tcp,
        };
        Ok(Self {
            hand_detection_confidence: file
                .hand_detection_confidence
                .unwrap_or(DEFAULT_HAND_DETECTION_CONFIDENCE),
            max_num_hands: file.max_num_hands.unwrap_or(DEFAULT_MAX_NUM_HANDS),
            gesture_actions,
            frame_width: file.frame_width.unwrap_or(DEFAULT_FRAME_WIDTH),
            frame_height: file.frame_height.unwrap_or(DEFAULT_FRAME_HEIGHT),
            volume_step: file.volume_step.unwrap_or(DEFAULT_VOLUME_STEP),
            gesture_cooldown: duration_from_secs(
                file.gesture_cooldown_seconds
                    .unwrap_or(DEFAULT_GESTURE_COOLDOWN_SECONDS),
            )?,
            camera_index: file.camera_index.unwrap_or(DEFAULT_CAMERA_INDEX),
            camera_auto_detect: file.camera_auto_detect.unwrap_or(true),
            device_template: file
                .device_template
                .unwrap_or_else(|| DEFAULT_DEVICE_TEMPLATE.to_string()),
            use_rtsp: file.use_rtsp.unwrap_or(false),
            rtsp_url: file
                .rtsp_url
                .unwrap_or_else(|| DEFAULT_RTSP_URL.to_string()),
            rtsp_transport,
            video_loop_enabled: file.video_loop_enabled.unwrap_or(true),
            supported_video_formats: file.supported_video_formats.unwrap_or_else(|| {
                DEFAULT_VIDEO_FORMATS
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect()
            }),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("GESTURED_RTSP_URL") {
            if !url.trim().is_empty() {
                self.rtsp_url = url;
                self.use_rtsp = true;
            }
        }
        if let Ok(transport) = std::env::var("GESTURED_RTSP_TRANSPORT") {
            if !transport.trim().is_empty() {
                self.rtsp_transport = transport.parse()?;
            }
        }
        if let Ok(index) = std::env::var("GESTURED_CAMERA_INDEX") {
            self.camera_index = index
                .parse()
                .map_err(|_| anyhow!("GESTURED_CAMERA_INDEX must be an integer"))?;
        }
        if let Ok(cooldown) = std::env::var("GESTURED_COOLDOWN_SECONDS") {
            let seconds: f64 = cooldown
                .parse()
                .map_err(|_| anyhow!("GESTURED_COOLDOWN_SECONDS must be a number of seconds"))?;
            self.gesture_cooldown = duration_from_secs(seconds)?;
        }
        if let Ok(step) = std::env::var("GESTURED_VOLUME_STEP") {
            self.volume_step = step
                .parse()
                .map_err(|_| anyhow!("GESTURED_VOLUME_STEP must be a number"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.hand_detection_confidence) {
            return Err(anyhow!("hand_detection_confidence must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.volume_step) {
            return Err(anyhow!("volume_step must be in [0, 1]"));
        }
        if self.max_num_hands == 0 {
            return Err(anyhow!("max_num_hands must be at least 1"));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(anyhow!("frame_width and frame_height must be non-zero"));
        }
        for ext in self.supported_video_formats.iter_mut() {
            *ext = ext.trim_start_matches('.').to_lowercase();
        }
        Ok(())
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            max_hands: self.max_num_hands,
            min_detection_confidence: self.hand_detection_confidence,
        }
    }

    /// Build the source selection for one run: an explicit video path wins,
    /// then RTSP when enabled, else the camera.
    pub fn video_source_config(&self, video_path: Option<&Path>) -> Result<VideoSourceConfig> {
        let base = VideoSourceConfig {
            camera_index: self.camera_index,
            camera_auto_detect: self.camera_auto_detect,
            device_template: self.device_template.clone(),
            rtsp_url: self.rtsp_url.clone(),
            rtsp_transport: self.rtsp_transport,
            frame_width: self.frame_width,
            frame_height: self.frame_height,
            loop_on_eof: self.video_loop_enabled,
            ..VideoSourceConfig::default()
        };

        if let Some(path) = video_path {
            self.ensure_supported_format(path)?;
            return Ok(VideoSourceConfig {
                mode: SourceMode::File,
                file_path: Some(path.to_path_buf()),
                ..base
            });
        }
        if self.use_rtsp {
            return Ok(VideoSourceConfig {
                mode: SourceMode::Rtsp,
                ..base
            });
        }
        Ok(VideoSourceConfig {
            mode: SourceMode::Camera,
            ..base
        })
    }

    fn ensure_supported_format(&self, path: &Path) -> Result<()> {
        // Synthetic clips bypass the extension check.
        if path.to_string_lossy().starts_with("stub://") {
            return Ok(());
        }
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .ok_or_else(|| anyhow!("video file {} has no extension", path.display()))?;
        if !self
            .supported_video_formats
            .iter()
            .any(|supported| supported == &extension)
        {
            return Err(anyhow!(
                "unsupported video format '{}' (supported: {})",
                extension,
                self.supported_video_formats.join(", ")
            ));
        }
        Ok(())
    }
}

fn duration_from_secs(seconds: f64) -> Result<Duration> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(anyhow!("gesture_cooldown_seconds must be >= 0"));
    }
    Ok(Duration::from_secs_f64(seconds))
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
