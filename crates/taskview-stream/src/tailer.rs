//! Polling log tailer: waits for the output file, drains it from offset
//! zero, then follows appends until cancellation.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::frame::{Frame, OutputStream};
use crate::sink::FrameSink;

const FILE_WAIT_ATTEMPTS: u32 = 60;
const FILE_WAIT_INTERVAL: Duration = Duration::from_secs(1);
const FOLLOW_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Tails one output file onto the sink until the token is cancelled or the
/// peer goes away.
///
/// Lines are emitted whole, in on-disk byte order, each with its trailing
/// newline. A partial trailing line is deferred until a newline
/// materializes. A file that vanishes mid-follow is tolerated; the tailer
/// never creates the file itself.
pub async fn tail_file(
    cancel: CancellationToken,
    sink: Arc<dyn FrameSink>,
    path: PathBuf,
    stream: OutputStream,
) {
    trace!(path = %path.display(), %stream, "tail starting");
    let path = path.as_path();

    let mut found = false;
    for _ in 0..FILE_WAIT_ATTEMPTS {
        if tokio::fs::metadata(path).await.is_ok() {
            found = true;
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(FILE_WAIT_INTERVAL) => {}
        }
    }

    if !found {
        debug!(path = %path.display(), "output file never appeared");
        let _ = sink
            .send(&Frame::output(stream, "Waiting for output file..."))
            .await;
        return;
    }

    // Drain existing content from offset zero, then follow appends.
    let mut last_pos = 0u64;
    match emit_new_lines(path, last_pos, sink.as_ref(), stream, &cancel).await {
        Ok(Some(pos)) => last_pos = pos,
        Ok(None) => return,
        Err(error) => {
            warn!(path = %path.display(), error = %error, "failed to drain output file");
        }
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(FOLLOW_POLL_INTERVAL) => {}
        }

        let size = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            // Absence during follow is benign; keep polling.
            Err(_) => continue,
        };
        if size <= last_pos {
            continue;
        }

        match emit_new_lines(path, last_pos, sink.as_ref(), stream, &cancel).await {
            Ok(Some(pos)) => last_pos = pos,
            Ok(None) => return,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "transient tail read failure");
            }
        }
    }
}

/// Reads complete lines starting at `from` and emits each onto the sink.
/// Returns the new offset, or `None` when the tail must stop (cancellation
/// or a dead peer). Partial trailing lines are left unconsumed.
async fn emit_new_lines(
    path: &Path,
    from: u64,
    sink: &dyn FrameSink,
    stream: OutputStream,
    cancel: &CancellationToken,
) -> std::io::Result<Option<u64>> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(from)).await?;
    let mut reader = BufReader::new(file);

    let mut pos = from;
    let mut line = String::new();
    loop {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        line.clear();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            break;
        }
        if !line.ends_with('\n') {
            // Incomplete trailing line; pick it up on a later poll.
            break;
        }
        pos += read as u64;

        let text = line.trim_end_matches('\n').trim_end_matches('\r');
        if sink
            .send(&Frame::output(stream, format!("{text}\n")))
            .await
            .is_err()
        {
            return Ok(None);
        }
    }
    Ok(Some(pos))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::sink::SinkClosed;

    #[derive(Default)]
    struct CollectingSink {
        frames: Mutex<Vec<Frame>>,
        closed: Mutex<bool>,
    }

    impl CollectingSink {
        fn frames(&self) -> Vec<Frame> {
            self.frames.lock().expect("frames lock").clone()
        }
    }

    #[async_trait]
    impl FrameSink for CollectingSink {
        async fn send(&self, frame: &Frame) -> Result<(), SinkClosed> {
            if *self.closed.lock().expect("closed lock") {
                return Err(SinkClosed);
            }
            self.frames.lock().expect("frames lock").push(frame.clone());
            Ok(())
        }

        async fn send_ping(&self) -> Result<(), SinkClosed> {
            Ok(())
        }

        async fn close(&self) {
            *self.closed.lock().expect("closed lock") = true;
        }
    }

    async fn wait_for_frames(sink: &CollectingSink, count: usize) {
        for _ in 0..100 {
            if sink.frames().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!(
            "expected {count} frames, saw {:?} after waiting",
            sink.frames()
        );
    }

    #[tokio::test]
    async fn functional_tail_drains_existing_then_follows_appends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stdout");
        std::fs::write(&path, "first\nsecond\n").expect("seed file");

        let sink = Arc::new(CollectingSink::default());
        let cancel = CancellationToken::new();
        let tail = tokio::spawn({
            let sink = sink.clone();
            let cancel = cancel.clone();
            let path = path.clone();
            async move { tail_file(cancel, sink, path, OutputStream::Stdout).await }
        });

        wait_for_frames(&sink, 2).await;
        assert_eq!(
            sink.frames(),
            vec![
                Frame::output(OutputStream::Stdout, "first\n"),
                Frame::output(OutputStream::Stdout, "second\n"),
            ]
        );

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("append");
        writeln!(file, "third").expect("append line");
        drop(file);

        wait_for_frames(&sink, 3).await;
        assert_eq!(
            sink.frames()[2],
            Frame::output(OutputStream::Stdout, "third\n")
        );

        cancel.cancel();
        tail.await.expect("tail task");
    }

    #[tokio::test]
    async fn functional_tail_defers_partial_trailing_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stdout");
        std::fs::write(&path, "complete\npart").expect("seed file");

        let sink = Arc::new(CollectingSink::default());
        let cancel = CancellationToken::new();
        let tail = tokio::spawn({
            let sink = sink.clone();
            let cancel = cancel.clone();
            let path = path.clone();
            async move { tail_file(cancel, sink, path, OutputStream::Stdout).await }
        });

        wait_for_frames(&sink, 1).await;
        assert_eq!(
            sink.frames(),
            vec![Frame::output(OutputStream::Stdout, "complete\n")]
        );

        // Finish the partial line; only now may it be emitted.
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("append");
        writeln!(file, "ial").expect("complete line");
        drop(file);

        wait_for_frames(&sink, 2).await;
        assert_eq!(
            sink.frames()[1],
            Frame::output(OutputStream::Stdout, "partial\n")
        );

        cancel.cancel();
        tail.await.expect("tail task");
    }

    #[tokio::test]
    async fn unit_tail_stops_quietly_on_cancellation_while_waiting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("never-created");

        let sink = Arc::new(CollectingSink::default());
        let cancel = CancellationToken::new();
        let tail = tokio::spawn({
            let sink = sink.clone();
            let cancel = cancel.clone();
            let path = path.clone();
            async move { tail_file(cancel, sink, path, OutputStream::Stderr).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        tail.await.expect("tail task");
        assert!(sink.frames().is_empty());
    }

    #[tokio::test]
    async fn unit_tail_stops_after_sink_goes_away() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stdout");
        std::fs::write(&path, "line\n").expect("seed file");

        let sink = Arc::new(CollectingSink::default());
        let cancel = CancellationToken::new();
        let tail = tokio::spawn({
            let sink = sink.clone();
            let cancel = cancel.clone();
            let path = path.clone();
            async move { tail_file(cancel, sink, path, OutputStream::Stdout).await }
        });

        wait_for_frames(&sink, 1).await;
        sink.close().await;

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("append");
        writeln!(file, "unseen").expect("append line");
        drop(file);

        // The next failed write must end the tail without cancellation.
        tokio::time::timeout(Duration::from_secs(5), tail)
            .await
            .expect("tail ends on dead sink")
            .expect("tail task");
    }

    #[tokio::test]
    async fn functional_tail_tolerates_vanished_file_during_follow() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stdout");
        std::fs::write(&path, "before\n").expect("seed file");

        let sink = Arc::new(CollectingSink::default());
        let cancel = CancellationToken::new();
        let tail = tokio::spawn({
            let sink = sink.clone();
            let cancel = cancel.clone();
            let path = path.clone();
            async move { tail_file(cancel, sink, path, OutputStream::Stdout).await }
        });

        wait_for_frames(&sink, 1).await;
        std::fs::remove_file(&path).expect("remove file");
        tokio::time::sleep(Duration::from_millis(500)).await;

        // Still only the pre-removal line, and the tailer is still alive.
        assert_eq!(sink.frames().len(), 1);
        assert!(!tail.is_finished());

        cancel.cancel();
        tail.await.expect("tail task");
    }
}
