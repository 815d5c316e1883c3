// Round trips through the real ffmpeg/ffprobe binaries. Every test returns early when the tools
// (or the mp3 and eac3 encoders) are not installed.

mod common;

use std::path::Path;
use std::process::Command;

use mux_drive_core::audio::{AudioBuffer, CombinePolicy};
use mux_drive_core::codec::FfmpegAudioCodec;
use mux_drive_core::combine::AudioCombiner;
use mux_drive_core::contract::{AudioCodec, MockUploader, Multiplexer, UploadedFile};
use mux_drive_core::download::HttpDownloader;
use mux_drive_core::mux::FfmpegMultiplexer;
use mux_drive_core::pipeline::{run_pipeline, PipelineConfig, Stages, DEFAULT_COMBINED_AUDIO_NAME};
use tempfile::tempdir;

fn tools_available() -> bool {
    let ffprobe = Command::new("ffprobe").arg("-version").output();
    let encoders = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output();
    match (ffprobe, encoders) {
        (Ok(p), Ok(e)) if p.status.success() && e.status.success() => {
            let encoders = String::from_utf8_lossy(&e.stdout);
            encoders.contains("libmp3lame") && encoders.contains(" eac3 ")
        }
        _ => false,
    }
}

fn tone(secs: f64, rate: u32, channels: u16, freq: f32) -> AudioBuffer {
    let frames = (secs * rate as f64) as usize;
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for i in 0..frames {
        let v = 0.3 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin();
        for _ in 0..channels {
            samples.push(v);
        }
    }
    AudioBuffer::new(samples, rate, channels)
}

fn stream_codecs(path: &Path) -> Vec<(String, String)> {
    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "stream=codec_type,codec_name",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .output()
        .expect("ffprobe runs");
    String::from_utf8_lossy(&out.stdout)
        .lines()
        .filter_map(|l| {
            let mut parts = l.split(',');
            Some((parts.next()?.to_string(), parts.next()?.to_string()))
        })
        .collect()
}

/// Per-packet hash of stream 0 of `kind` ("v" or "a") in `path`.
fn stream_hash(path: &Path, kind: &str) -> String {
    let map = format!("0:{kind}:0");
    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args(["-map", map.as_str(), "-c", "copy"])
        .args(["-f", "streamhash", "-hash", "sha256", "-"])
        .output()
        .expect("ffmpeg runs");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let hash = String::from_utf8_lossy(&out.stdout).trim().to_string();
    assert!(!hash.is_empty());
    hash
}

fn generate(args: &[&str], dest: &Path) {
    let made = Command::new("ffmpeg")
        .args(["-v", "error"])
        .args(args)
        .arg("-y")
        .arg(dest)
        .status()
        .expect("ffmpeg runs");
    assert!(made.success(), "generating {}", dest.display());
}

fn eac3_tone(secs: u32, dest: &Path) {
    let source = format!("sine=frequency=440:sample_rate=48000:duration={secs}");
    generate(
        &["-f", "lavfi", "-i", &source, "-ac", "2", "-c:a", "eac3", "-f", "eac3"],
        dest,
    );
}

#[tokio::test]
async fn encode_then_decode_keeps_duration_and_shape() {
    if !tools_available() {
        eprintln!("ffmpeg/ffprobe with libmp3lame not installed; skipping");
        return;
    }
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("tone.mp3");
    let codec = FfmpegAudioCodec::default();

    codec
        .encode(&tone(2.0, 44_100, 2, 440.0), &path)
        .await
        .expect("encode");
    let decoded = codec.decode(&path).await.expect("decode");

    assert_eq!(decoded.sample_rate, 44_100);
    assert_eq!(decoded.channels, 2);
    // mp3 pads with encoder delay, never by more than a few frames of 1152 samples.
    assert!(
        (decoded.duration_secs() - 2.0).abs() < 0.1,
        "duration {}",
        decoded.duration_secs()
    );
}

#[tokio::test]
async fn combiner_concatenates_real_files() {
    if !tools_available() {
        eprintln!("ffmpeg/ffprobe with libmp3lame not installed; skipping");
        return;
    }
    let tmp = tempdir().unwrap();
    let codec = FfmpegAudioCodec::default();
    let b = tmp.path().join("b.mp3");
    let c = tmp.path().join("c.mp3");
    codec.encode(&tone(1.0, 48_000, 2, 220.0), &b).await.unwrap();
    codec.encode(&tone(1.5, 44_100, 1, 330.0), &c).await.unwrap();

    let out = tmp.path().join("combined_audio.mp3");
    let combined = AudioCombiner::new(&codec, CombinePolicy::Concatenate)
        .combine(&[b, c], &out)
        .await
        .expect("combine");

    assert!((combined.duration_secs - 2.5).abs() < 0.2);
    let decoded = codec.decode(&out).await.unwrap();
    assert_eq!(decoded.channels, 2);
    assert_eq!(decoded.sample_rate, 48_000);
}

#[tokio::test]
async fn multiplexer_stream_copies_video_and_audio() {
    if !tools_available() {
        eprintln!("ffmpeg/ffprobe with libmp3lame not installed; skipping");
        return;
    }
    let tmp = tempdir().unwrap();
    let video = tmp.path().join("a.mkv");
    let made = Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-f",
            "lavfi",
            "-i",
            "testsrc=duration=1:size=160x120:rate=10",
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=1000:duration=1",
            "-c:v",
            "ffv1",
            "-c:a",
            "flac",
            "-y",
        ])
        .arg(&video)
        .status()
        .expect("ffmpeg runs");
    assert!(made.success());

    let audio = tmp.path().join("combined_audio.mp3");
    FfmpegAudioCodec::default()
        .encode(&tone(1.0, 44_100, 2, 440.0), &audio)
        .await
        .unwrap();

    let out_dir = tmp.path().join("downloads");
    std::fs::create_dir(&out_dir).unwrap();
    let output = out_dir.join("merged.mkv");
    FfmpegMultiplexer::default()
        .multiplex(&video, &audio, &output)
        .await
        .expect("multiplex");

    let streams = stream_codecs(&output);
    assert_eq!(
        streams,
        vec![
            ("ffv1".to_string(), "video".to_string()),
            ("mp3".to_string(), "audio".to_string()),
        ]
    );
    assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 1);
    assert_eq!(stream_hash(&output, "v"), stream_hash(&video, "v"));
    assert_eq!(stream_hash(&output, "a"), stream_hash(&audio, "a"));
}

#[tokio::test]
async fn full_run_with_real_tools_concatenates_and_cleans_up() {
    if !tools_available() {
        eprintln!("ffmpeg/ffprobe with libmp3lame and eac3 not installed; skipping");
        return;
    }
    let fixtures = tempdir().unwrap();
    let a = fixtures.path().join("a.mkv");
    generate(
        &[
            "-f",
            "lavfi",
            "-i",
            "testsrc=duration=5:size=160x120:rate=10",
            "-c:v",
            "ffv1",
        ],
        &a,
    );
    let b = fixtures.path().join("b.eac3");
    let c = fixtures.path().join("c.eac3");
    eac3_tone(2, &b);
    eac3_tone(3, &c);
    let base = common::serve(vec![
        ("/media/a.mkv", std::fs::read(&a).unwrap(), true),
        ("/media/b.eac3", std::fs::read(&b).unwrap(), true),
        ("/media/c.eac3", std::fs::read(&c).unwrap(), false),
    ])
    .await;

    let tmp = tempdir().unwrap();
    let work_dir = tmp.path().join("work");
    let output_dir = tmp.path().join("downloads");
    let config = PipelineConfig {
        video_url: format!("{base}/media/a.mkv"),
        audio_urls: vec![format!("{base}/media/b.eac3"), format!("{base}/media/c.eac3")],
        work_dir: work_dir.clone(),
        output_dir: output_dir.clone(),
        output_file_name: "merged.mkv".to_string(),
        folder_id: "folder-123".to_string(),
        policy: CombinePolicy::Concatenate,
        combined_audio_name: DEFAULT_COMBINED_AUDIO_NAME.to_string(),
    };
    let downloader = HttpDownloader::new(64 * 1024);
    let codec = FfmpegAudioCodec::default();
    let multiplexer = FfmpegMultiplexer::default();
    let mut uploader = MockUploader::new();
    uploader.expect_authenticate().times(1).returning(|| Ok(()));
    uploader
        .expect_upload_file()
        .times(1)
        .returning(|_, name: &str, _| {
            Ok(UploadedFile {
                id: "file-1".to_string(),
                name: name.to_string(),
            })
        });
    let stages = Stages {
        downloader: &downloader,
        codec: &codec,
        multiplexer: &multiplexer,
        uploader: &uploader,
    };

    let report = run_pipeline(&config, &stages).await.expect("run succeeds");

    let output = output_dir.join("merged.mkv");
    assert_eq!(report.output_path, output);
    assert!((report.combined_duration_secs - 5.0).abs() < 0.1);
    let muxed_audio = codec.decode(&output).await.expect("output has audio");
    assert!(
        (muxed_audio.duration_secs() - 5.0).abs() < 0.15,
        "muxed audio lasts {}",
        muxed_audio.duration_secs()
    );
    assert_eq!(stream_hash(&output, "v"), stream_hash(&a, "v"));
    for name in ["video_a.mkv", "audio_0_b.eac3", "audio_1_c.eac3", DEFAULT_COMBINED_AUDIO_NAME] {
        assert!(!work_dir.join(name).exists(), "{name} left behind");
    }
    assert_eq!(std::fs::read_dir(&work_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn multiplexer_reports_exit_code_for_bad_input() {
    if !tools_available() {
        eprintln!("ffmpeg/ffprobe with libmp3lame not installed; skipping");
        return;
    }
    let tmp = tempdir().unwrap();
    let video = tmp.path().join("a.mkv");
    let audio = tmp.path().join("b.mp3");
    std::fs::write(&video, b"not a video").unwrap();
    std::fs::write(&audio, b"not audio").unwrap();
    let output = tmp.path().join("merged.mkv");

    let err = FfmpegMultiplexer::default()
        .multiplex(&video, &audio, &output)
        .await
        .unwrap_err();

    assert!(matches!(err.exit_code, Some(code) if code != 0));
    assert!(!output.exists());
}
