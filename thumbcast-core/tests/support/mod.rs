//! Scripted stand-in for `ffmpeg` used by the execution tests.
//!
//! The script ignores the video content and reads a scenario name from the
//! first line of the "video" file instead. It honours the output pattern (the
//! last argument) exactly like the real tool, so the engine's naming logic is
//! exercised end to end.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use tempfile::TempDir;
use thumbcast_core::{ExecutionEvent, Thumbnail, ThumbnailerExecution};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(20);

const FAKE_FFMPEG: &str = r#"#!/bin/sh
video="$2"
for arg in "$@"; do pattern="$arg"; done
scenario=$(head -n 1 "$video")

frame_line() {
    printf '[Parsed_showinfo_1 @ 0x55d0c8a1e2c0] n:%4d pts:%7d pts_time:%d.5 pos:%8d fmt:yuvj420p sar:1/1 s:320x180 i:P iskey:1 type:I\n' \
        "$1" $(($1 * 10240)) $(($1 * 10)) $(($1 * 4096)) >&2
}

write_direct() {
    printf 'jpg' > "$(printf "$pattern" "$1")"
}

write_renamed() {
    out=$(printf "$pattern" "$1")
    printf 'jpg' > "$out.part"
    mv "$out.part" "$out"
}

echo "ffmpeg version fake-6.1 Copyright (c) the thumbcast tests" >&2
echo "  Stream #0:0: Video: h264 (High), yuv420p, 1280x720, 25 fps" >&2

case "$scenario" in
success)
    n=0
    while [ "$n" -lt 7 ]; do
        case $((n % 3)) in
        0) frame_line "$n"; write_direct "$n" ;;
        1) write_renamed "$n"; frame_line "$n" ;;
        2) write_direct "$n"; frame_line "$n" ;;
        esac
        n=$((n + 1))
    done
    echo "progress=end"
    printf 'frame=    7 fps=0.0 q=-0.0 Lsize=N/A time=00:01:00.00 bitrate=N/A speed= 800x' >&2
    exit 0
    ;;
failure)
    frame_line 0
    write_direct 0
    echo "Error while filtering: Invalid data found when processing input" >&2
    echo "Conversion failed!" >&2
    exit 2
    ;;
late-file)
    frame_line 0
    write_direct 0
    frame_line 1
    out=$(printf "$pattern" 1)
    (sleep 1; printf 'jpg' > "$out") > /dev/null 2>&1 < /dev/null &
    exit 0
    ;;
missing-file)
    frame_line 0
    write_direct 0
    frame_line 1
    exit 0
    ;;
hang)
    frame_line 0
    write_direct 0
    exec sleep 30
    ;;
*)
    echo "$video: unknown scenario" >&2
    exit 1
    ;;
esac
"#;

static FAKE_FFMPEG_DIR: Lazy<TempDir> = Lazy::new(|| {
    let dir = tempfile::tempdir().expect("tempdir for fake ffmpeg");
    let path = dir.path().join("ffmpeg");
    fs::write(&path, FAKE_FFMPEG).expect("write fake ffmpeg");
    let mut permissions = fs::metadata(&path).expect("stat fake ffmpeg").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).expect("chmod fake ffmpeg");
    dir
});

/// Path to the scripted executable. Created once per test binary so no test
/// ever executes the file while another one is still writing it.
pub fn fake_ffmpeg() -> PathBuf {
    FAKE_FFMPEG_DIR.path().join("ffmpeg")
}

/// Scratch layout for one execution: a scenario "video" and an empty
/// destination directory.
pub struct Scratch {
    pub root: TempDir,
    pub video: PathBuf,
    pub dest: PathBuf,
}

impl Scratch {
    pub fn new(scenario: &str) -> Self {
        let root = tempfile::tempdir().expect("scratch tempdir");
        let video = root.path().join("input.mp4");
        fs::write(&video, format!("{scenario}\n")).expect("write scenario");
        let dest = root.path().join("thumbs");
        fs::create_dir(&dest).expect("create dest");
        Self { root, video, dest }
    }
}

/// Everything an execution pushed before its stream ended.
#[derive(Debug, Default)]
pub struct Collected {
    pub thumbnails: Vec<Thumbnail>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

pub async fn collect(execution: &mut ThumbnailerExecution) -> Collected {
    let mut collected = Collected::default();
    while let Some(event) = execution.next_event().await {
        match event {
            ExecutionEvent::Thumbnail(thumbnail) => collected.thumbnails.push(thumbnail),
            ExecutionEvent::Stdout(line) => collected.stdout.push(line),
            ExecutionEvent::Stderr(line) => collected.stderr.push(line),
        }
    }
    collected
}

pub fn sorted_indices(thumbnails: &[Thumbnail]) -> Vec<u64> {
    let mut indices: Vec<u64> = thumbnails.iter().map(|thumbnail| thumbnail.n).collect();
    indices.sort_unstable();
    indices
}

pub fn files_in(dir: &Path, ext: &str) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read dest")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(&format!(".{ext}")))
        .collect();
    names.sort();
    names
}
