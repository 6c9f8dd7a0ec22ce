/// Progress reporting for the import and export pipelines
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Detect,
    Extract,
    Normalize,
    Validate,
    Serialize,
    Store,
    Assemble,
    FetchIcons,
    Build,
    Done,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub stage: Stage,
    /// 0..=100
    pub percent: u8,
    pub message: String,
}

impl Progress {
    pub fn new(stage: Stage, percent: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent: percent.min(100),
            message: message.into(),
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: &Progress);
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _progress: &Progress) {}
}

/// Writes updates to the `log` facade at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, progress: &Progress) {
        log::info!("[{:>3}%] {:?}: {}", progress.percent, progress.stage, progress.message);
    }
}

/// Forwards updates to an async observer. Updates are dropped rather than
/// awaited when the observer falls behind.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::Sender<Progress>,
}

impl ChannelProgress {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Progress>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ProgressReporter for ChannelProgress {
    fn report(&self, progress: &Progress) {
        if let Err(err) = self.tx.try_send(progress.clone()) {
            log::debug!("progress update dropped: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_delivers_in_order() {
        let (reporter, mut rx) = ChannelProgress::channel(4);
        reporter.report(&Progress::new(Stage::Detect, 10, "detecting"));
        reporter.report(&Progress::new(Stage::Done, 250, "done"));
        drop(reporter);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.stage, Stage::Detect);
        let last = rx.recv().await.unwrap();
        assert_eq!(last.percent, 100);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn full_channel_drops_updates() {
        let (reporter, mut rx) = ChannelProgress::channel(1);
        reporter.report(&Progress::new(Stage::Detect, 1, "a"));
        reporter.report(&Progress::new(Stage::Detect, 2, "b"));
        assert_eq!(rx.try_recv().unwrap().message, "a");
        assert!(rx.try_recv().is_err());
    }
}
