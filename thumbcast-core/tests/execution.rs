#![cfg(unix)]

mod support;

use std::time::Duration;

use futures::StreamExt;
use support::{Scratch, TEST_TIMEOUT, collect, fake_ffmpeg, files_in, sorted_indices};
use thumbcast_core::{
    ExecutionRequest, ExecutionState, ImageFormat, ThumbnailError, Thumbnailer,
    ThumbnailerOptions,
};
use tokio::time::timeout;

#[tokio::test]
async fn streams_every_thumbnail_then_succeeds() {
    let scratch = Scratch::new("success");
    let thumbnailer = Thumbnailer::with_ffmpeg_path(fake_ffmpeg());
    let request = ExecutionRequest::new(&scratch.video, 10_000, &scratch.dest);

    let mut execution = thumbnailer.exec(request).expect("exec");
    let collected = timeout(TEST_TIMEOUT, collect(&mut execution))
        .await
        .expect("stream ended");

    assert_eq!(sorted_indices(&collected.thumbnails), (0..7).collect::<Vec<_>>());
    for thumbnail in &collected.thumbnails {
        assert!(thumbnail.file.is_file(), "{}", thumbnail.file.display());
        assert_eq!(thumbnail.file.parent(), Some(scratch.dest.as_path()));
        assert_eq!(thumbnail.size, "320x180");
        assert_eq!(thumbnail.pts, Some(thumbnail.n as i64 * 10240));
        assert_eq!(thumbnail.pts_time, Some(thumbnail.n as i64 * 10));
        assert_eq!(thumbnail.pos, Some(thumbnail.n as i64 * 4096));
    }
    assert_eq!(files_in(&scratch.dest, "jpg").len(), 7);

    // Trailing text without a newline still reaches the caller.
    assert!(
        collected
            .stderr
            .last()
            .is_some_and(|line| line.starts_with("frame=    7"))
    );
    assert_eq!(collected.stdout, vec!["progress=end"]);

    assert!(execution.pid().is_some());
    assert_eq!(execution.state(), ExecutionState::Done);
    timeout(TEST_TIMEOUT, execution.wait())
        .await
        .expect("completion")
        .expect("successful run");
}

#[tokio::test]
async fn prefix_and_extension_shape_file_names() {
    let scratch = Scratch::new("success");
    let request = ExecutionRequest::new(&scratch.video, 10_000, &scratch.dest)
        .with_prefix("clip-")
        .with_ext(ImageFormat::Png)
        .with_width(160);

    let execution = Thumbnailer::with_ffmpeg_path(fake_ffmpeg())
        .exec(request)
        .expect("exec");
    let (events, completion) = execution.into_parts();

    let names: Vec<String> = timeout(
        TEST_TIMEOUT,
        events
            .thumbnails()
            .filter_map(|thumbnail| async move { thumbnail.file_name() })
            .collect(),
    )
    .await
    .expect("stream ended");

    let mut names = names;
    names.sort();
    let expected: Vec<String> = (0..7).map(|n| format!("clip-{n:06}.png")).collect();
    assert_eq!(names, expected);
    assert_eq!(files_in(&scratch.dest, "png"), expected);

    completion.await.expect("successful run");
}

#[tokio::test]
async fn non_zero_exit_fails_with_exit_code() {
    let scratch = Scratch::new("failure");
    let mut execution = Thumbnailer::with_ffmpeg_path(fake_ffmpeg())
        .exec(ExecutionRequest::new(&scratch.video, 1000, &scratch.dest))
        .expect("exec");

    let collected = timeout(TEST_TIMEOUT, collect(&mut execution))
        .await
        .expect("stream ended");
    assert!(collected.stderr.iter().any(|line| line == "Conversion failed!"));

    let err = execution.wait().await.unwrap_err();
    assert!(matches!(err, ThumbnailError::NonZeroExit { code: Some(2) }));
    assert_eq!(err.exit_code(), Some(2));
}

#[tokio::test]
async fn missing_executable_fails_completion_and_ends_stream() {
    let scratch = Scratch::new("success");
    let thumbnailer = Thumbnailer::with_ffmpeg_path(scratch.root.path().join("no-such-ffmpeg"));

    let mut execution = thumbnailer
        .exec(ExecutionRequest::new(&scratch.video, 1000, &scratch.dest))
        .expect("exec returns a handle even when spawning will fail");
    let states = execution.state_changes();

    let collected = timeout(TEST_TIMEOUT, collect(&mut execution))
        .await
        .expect("stream ended");
    assert!(collected.thumbnails.is_empty());
    assert!(execution.pid().is_none());

    let (_events, completion) = execution.into_parts();
    let err = completion.await.unwrap_err();
    assert!(err.is_spawn_error(), "{err}");
    assert_eq!(*states.borrow(), ExecutionState::Done);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn completion_resolves_only_after_teardown() {
    let scratch = Scratch::new("success");
    let thumbnailer = Thumbnailer::with_ffmpeg_path(scratch.root.path().join("no-such-ffmpeg"));

    for _ in 0..50 {
        let execution = thumbnailer
            .exec(ExecutionRequest::new(&scratch.video, 1000, &scratch.dest))
            .expect("exec");
        let states = execution.state_changes();
        let (_events, completion) = execution.into_parts();

        let result = timeout(TEST_TIMEOUT, completion).await.expect("completion");
        assert!(result.is_err());
        assert_eq!(*states.borrow(), ExecutionState::Done);
    }

    let execution = Thumbnailer::with_ffmpeg_path(fake_ffmpeg())
        .exec(ExecutionRequest::new(&scratch.video, 1000, &scratch.dest))
        .expect("exec");
    let states = execution.state_changes();
    let (_events, completion) = execution.into_parts();
    timeout(TEST_TIMEOUT, completion)
        .await
        .expect("completion")
        .expect("successful run");
    assert_eq!(*states.borrow(), ExecutionState::Done);
}

#[tokio::test]
async fn waits_for_files_written_after_exit() {
    let scratch = Scratch::new("late-file");
    let mut execution = Thumbnailer::with_ffmpeg_path(fake_ffmpeg())
        .exec(ExecutionRequest::new(&scratch.video, 1000, &scratch.dest))
        .expect("exec");

    let collected = timeout(TEST_TIMEOUT, collect(&mut execution))
        .await
        .expect("stream ended");
    assert_eq!(sorted_indices(&collected.thumbnails), vec![0, 1]);
    execution.wait().await.expect("successful run");
}

#[tokio::test]
async fn drain_timeout_reports_missing_files() {
    let scratch = Scratch::new("missing-file");
    let thumbnailer = Thumbnailer::new(ThumbnailerOptions {
        ffmpeg_path: fake_ffmpeg(),
        drain_timeout: Some(Duration::from_millis(300)),
    });
    let mut execution = thumbnailer
        .exec(ExecutionRequest::new(&scratch.video, 1000, &scratch.dest))
        .expect("exec");

    let collected = timeout(TEST_TIMEOUT, collect(&mut execution))
        .await
        .expect("stream ended");
    assert_eq!(sorted_indices(&collected.thumbnails), vec![0]);

    let err = execution.wait().await.unwrap_err();
    assert!(matches!(err, ThumbnailError::DrainTimeout { pending: 1 }));
}

#[tokio::test]
async fn cancel_kills_the_process() {
    let scratch = Scratch::new("hang");
    let mut execution = Thumbnailer::with_ffmpeg_path(fake_ffmpeg())
        .exec(ExecutionRequest::new(&scratch.video, 1000, &scratch.dest))
        .expect("exec");

    let first = timeout(TEST_TIMEOUT, execution.next_thumbnail())
        .await
        .expect("first thumbnail")
        .expect("stream still open");
    assert_eq!(first.n, 0);

    execution.cancel();
    let rest = timeout(TEST_TIMEOUT, collect(&mut execution))
        .await
        .expect("stream ended after cancel");
    assert!(rest.thumbnails.is_empty());

    let err = execution.wait().await.unwrap_err();
    assert!(matches!(err, ThumbnailError::Cancelled));
}

#[tokio::test]
async fn concurrent_executions_are_independent() {
    let first = Scratch::new("success");
    let second = Scratch::new("failure");
    let thumbnailer = Thumbnailer::with_ffmpeg_path(fake_ffmpeg());

    let ok = thumbnailer
        .exec(ExecutionRequest::new(&first.video, 1000, &first.dest))
        .expect("exec");
    let failing = thumbnailer
        .exec(ExecutionRequest::new(&second.video, 1000, &second.dest))
        .expect("exec");

    let (ok_result, failing_result) =
        timeout(TEST_TIMEOUT, async { tokio::join!(ok.wait(), failing.wait()) })
            .await
            .expect("both settled");

    ok_result.expect("first run succeeds");
    assert_eq!(failing_result.unwrap_err().exit_code(), Some(2));
}
