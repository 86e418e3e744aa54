use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use gesturectl::config::AppConfig;
use gesturectl::source::RtspTransport;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "GESTURED_CONFIG",
        "GESTURED_RTSP_URL",
        "GESTURED_RTSP_TRANSPORT",
        "GESTURED_CAMERA_INDEX",
        "GESTURED_COOLDOWN_SECONDS",
        "GESTURED_VOLUME_STEP",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "hand_detection_confidence": 0.6,
        "max_num_hands": 2,
        "gesture_actions": {
            "0": "play",
            "1": "volume_down",
            "5": "pause"
        },
        "frame_width": 800,
        "frame_height": 600,
        "volume_step": 0.1,
        "gesture_cooldown_seconds": 1.5,
        "camera_index": 3,
        "camera_auto_detect": false,
        "use_rtsp": true,
        "rtsp_url": "rtsp://camera-1/stream",
        "rtsp_transport": "udp",
        "video_loop_enabled": false,
        "supported_video_formats": ["mp4", "mkv"]
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("GESTURED_CONFIG", file.path());
    std::env::set_var("GESTURED_CAMERA_INDEX", "7");
    std::env::set_var("GESTURED_COOLDOWN_SECONDS", "0.5");

    let cfg = AppConfig::load().expect("load config");

    // File values survive where no env override applies.
    assert_eq!(cfg.hand_detection_confidence, 0.6);
    assert_eq!(cfg.max_num_hands, 2);
    assert_eq!(cfg.gesture_actions.len(), 3);
    assert_eq!(cfg.frame_width, 800);
    assert_eq!(cfg.frame_height, 600);
    assert_eq!(cfg.volume_step, 0.1);
    assert!(cfg.use_rtsp);
    assert_eq!(cfg.rtsp_url, "rtsp://camera-1/stream");
    assert_eq!(cfg.rtsp_transport, RtspTransport::Udp);
    assert!(!cfg.camera_auto_detect);
    assert!(!cfg.video_loop_enabled);
    assert_eq!(cfg.supported_video_formats, vec!["mp4", "mkv"]);

    // Env overrides win.
    assert_eq!(cfg.camera_index, 7);
    assert_eq!(cfg.gesture_cooldown, Duration::from_millis(500));

    clear_env();
}

#[test]
fn rtsp_url_env_override_enables_rtsp() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("GESTURED_RTSP_URL", "rtsp://10.0.0.2/live");
    let cfg = AppConfig::load().expect("load config");
    assert!(cfg.use_rtsp);
    assert_eq!(cfg.rtsp_url, "rtsp://10.0.0.2/live");

    clear_env();
}

#[test]
fn invalid_transport_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("GESTURED_RTSP_TRANSPORT", "sctp");
    assert!(AppConfig::load().is_err());

    clear_env();
}

#[test]
fn bad_gesture_table_in_file_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{ "gesture_actions": { "9": "play" } }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    let err = AppConfig::load_with(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("out of range"));

    clear_env();
}

#[test]
fn defaults_apply_without_a_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AppConfig::load().expect("defaults load");
    assert_eq!(cfg.gesture_actions.len(), 6);
    assert_eq!(cfg.gesture_cooldown, Duration::from_secs(2));
    assert_eq!(cfg.camera_index, 0);
    assert!(cfg.camera_auto_detect);
    assert!(!cfg.use_rtsp);

    clear_env();
}
