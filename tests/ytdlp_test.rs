//! yt-dlp process integration tests
//!
//! Runs the resolver against small shell scripts standing in for yt-dlp.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use ytgrab::models::{DownloadProgress, QualityPreference};
use ytgrab::resolver::{FetchError, FetchJob, MediaFetcher, MediaResolver, YtDlp, YtDlpError};

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

const DUMP: &str = r#"{"id": "abc", "title": "Test Clip", "duration": 12.5, "url": "https://cdn.example/abc.mp4", "ext": "mp4", "formats": [{"format_id": "18", "ext": "mp4", "width": 640, "height": 360}, {"format_id": "140", "ext": "m4a", "vcodec": "none"}]}"#;

#[tokio::test]
async fn test_probe_reads_dump_json() {
    let dir = tempfile::tempdir().unwrap();
    let bin = script(dir.path(), "yt-dlp", &format!("cat <<'EOF'\n{}\nEOF", DUMP));
    let ytdlp = YtDlp::with_binary(&bin);

    assert!(ytdlp.is_available().await);

    let probe = ytdlp.probe("https://youtu.be/abc").await.unwrap();
    assert_eq!(probe.metadata.id, "abc");
    assert_eq!(probe.metadata.title, "Test Clip");
    assert_eq!(probe.formats.len(), 2);
    assert_eq!(probe.listable_formats().len(), 1);

    let media = ytdlp.resolve("https://youtu.be/abc", "18").await.unwrap();
    assert_eq!(media.url, "https://cdn.example/abc.mp4");
    assert_eq!(media.title.as_deref(), Some("Test Clip"));
}

#[tokio::test]
async fn test_failed_run_keeps_error_line() {
    let dir = tempfile::tempdir().unwrap();
    let bin = script(
        dir.path(),
        "yt-dlp",
        "echo '[youtube] abc: Downloading webpage' >&2\necho 'ERROR: [youtube] abc: Video unavailable' >&2\nexit 1",
    );

    let err = YtDlp::with_binary(&bin)
        .probe("https://youtu.be/abc")
        .await
        .unwrap_err();

    match err {
        YtDlpError::Failed { stderr, .. } => {
            assert_eq!(stderr, "ERROR: [youtube] abc: Video unavailable")
        }
        other => panic!("Expected Failed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_binary() {
    let err = YtDlp::with_binary("/nonexistent/yt-dlp")
        .probe("https://youtu.be/abc")
        .await
        .unwrap_err();
    assert!(matches!(err, YtDlpError::NotFound(_)));
    assert!(!YtDlp::with_binary("/nonexistent/yt-dlp").is_available().await);
}

#[tokio::test]
async fn test_fetch_relays_progress_and_writes_output() {
    let dir = tempfile::tempdir().unwrap();
    let bin = script(
        dir.path(),
        "yt-dlp",
        r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
echo "[youtube] abc: Downloading webpage"
echo "[download]  25.0% of 1.00MiB at 1.00MiB/s ETA 00:01"
echo "[download]  75.0% of 1.00MiB at 1.00MiB/s ETA 00:00"
echo "[download] 100% of 1.00MiB in 00:01"
printf 'merged' > "$out""#,
    );

    let output = dir.path().join("clip.mkv");
    let job = FetchJob::new("https://youtu.be/abc", QualityPreference::MaxHeight(480), &output);

    let mut percents = Vec::new();
    YtDlp::with_binary(&bin)
        .fetch(&job, &mut |p: &DownloadProgress| {
            percents.push(p.percentage().unwrap())
        })
        .await
        .unwrap();

    assert_eq!(percents, vec![25.0, 75.0, 100.0]);
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "merged");
}

#[tokio::test]
async fn test_fetch_failure_maps_to_resolve_error() {
    let dir = tempfile::tempdir().unwrap();
    let bin = script(dir.path(), "yt-dlp", "echo 'ERROR: Requested format is not available' >&2\nexit 1");
    let job = FetchJob::new(
        "https://youtu.be/abc",
        QualityPreference::Best,
        dir.path().join("x.mp4"),
    );

    let err = YtDlp::with_binary(&bin)
        .fetch(&job, &mut |_: &DownloadProgress| {})
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Resolve(YtDlpError::Failed { .. })));
    assert!(err.to_string().contains("Requested format is not available"));
}

#[tokio::test]
async fn test_merged_download_progress_only_rises() {
    use ytgrab::models::JobStatus;
    use ytgrab::server::JobTable;

    let dir = tempfile::tempdir().unwrap();
    let bin = script(
        dir.path(),
        "yt-dlp",
        r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
echo "[info] abc: Downloading 1 format(s): 137+140"
echo "[download] Destination: $out.f137.mp4"
echo "[download]  50.0% of 10.00MiB at 1.00MiB/s ETA 00:05"
echo "[download] 100% of 10.00MiB in 00:10"
echo "[download] Destination: $out.f140.m4a"
echo "[download]  10.0% of 1.00MiB at 1.00MiB/s ETA 00:01"
echo "[download] 100% of 1.00MiB in 00:01"
echo "[Merger] Merging formats into \"$out\""
printf 'merged' > "$out""#,
    );

    let output = dir.path().join("clip.mp4");
    let job = FetchJob::new("https://youtu.be/abc", QualityPreference::Best, &output);
    let ytdlp = YtDlp::with_binary(&bin);

    let mut percents = Vec::new();
    ytdlp
        .fetch(&job, &mut |p: &DownloadProgress| {
            percents.push(p.percentage().unwrap())
        })
        .await
        .unwrap();

    assert_eq!(percents.len(), 4);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
    assert_eq!(percents.last().copied(), Some(100.0));

    // The same run seen through a web job's status
    let jobs = JobTable::new();
    let id = jobs.insert(JobStatus::queued("clip.mp4"));
    let mut observer = jobs.observer(id);
    let mut seen = Vec::new();
    let mut record = |p: &DownloadProgress| {
        ytgrab::fetch::ProgressObserver::on_progress(&mut observer, p);
        seen.push(jobs.get(&id).unwrap().percent.unwrap());
    };
    ytdlp.fetch(&job, &mut record).await.unwrap();

    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
    assert_eq!(seen.last().copied(), Some(100.0));
}
