use std::sync::{mpsc, Arc};
use std::thread;

use url::Url;

use crate::fetch::{ChannelProgressSink, FetchSettings, Fetcher, ReqwestFetcher};
use crate::{CrawlEvent, FetchError, FetchOutput, FetchProgress, RequestId, Stage};

enum EngineCommand {
    Enqueue { request_id: RequestId, url: Url },
}

/// Minimal dispatch loop around a [`Fetcher`]: planned requests go in,
/// fetch events come out for the caller to feed back into its
/// [`SourceHandler`](crate::SourceHandler). Priority scheduling, retries
/// and concurrency limits belong to the surrounding application.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<CrawlEvent>,
}

impl EngineHandle {
    pub fn new(settings: FetchSettings) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let fetcher = Arc::new(ReqwestFetcher::new(settings));

        thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
            while let Ok(command) = cmd_rx.recv() {
                let fetcher = fetcher.clone();
                let event_tx = event_tx.clone();
                runtime.spawn(async move {
                    handle_command(fetcher.as_ref(), command, event_tx).await;
                });
            }
        });

        Self { cmd_tx, event_rx }
    }

    pub fn enqueue(&self, request_id: RequestId, url: Url) {
        let _ = self.cmd_tx.send(EngineCommand::Enqueue { request_id, url });
    }

    pub fn try_recv(&self) -> Option<CrawlEvent> {
        self.event_rx.try_recv().ok()
    }
}

async fn handle_command(
    fetcher: &dyn Fetcher,
    command: EngineCommand,
    event_tx: mpsc::Sender<CrawlEvent>,
) {
    match command {
        EngineCommand::Enqueue { request_id, url } => {
            let _ = event_tx.send(CrawlEvent::Progress(FetchProgress {
                request_id,
                stage: Stage::Queued,
                bytes: None,
            }));
            let sink = ChannelProgressSink::new(event_tx.clone());
            let result: Result<FetchOutput, FetchError> =
                fetcher.fetch(request_id, url.as_str(), &sink).await;
            let _ = event_tx.send(CrawlEvent::FetchCompleted { request_id, result });
        }
    }
}
