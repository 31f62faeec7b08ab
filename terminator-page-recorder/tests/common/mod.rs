#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use terminator_page_recorder::{
    ElementId, InteractionRecord, Page, PageChannel, PageMessage, PageRecorder, PageRecorderConfig,
};
use tokio::task::JoinHandle;

pub fn init_tracing() {
    terminator_page_recorder::logging::init_tracing("terminator_page_recorder=debug");
}

/// How the fake capture pipeline answers requests.
#[derive(Debug, Clone)]
pub enum Reply {
    Succeed,
    Fail(&'static str),
    Silent,
    /// Answers both phases with a correlation id nobody is waiting for.
    WrongCorrelation,
    /// Answers the save immediately and the screenshot after a delay.
    DelayScreenshot(Duration),
}

/// Stands in for the extension side: takes the "screenshot", stores the
/// record and posts completion messages back on the page channel.
pub struct FakePipeline {
    pub screenshots: Arc<Mutex<Vec<String>>>,
    pub saved: Arc<Mutex<Vec<InteractionRecord>>>,
    _task: JoinHandle<()>,
}

impl FakePipeline {
    pub fn spawn(channel: &PageChannel, reply: Reply) -> Self {
        let screenshots = Arc::new(Mutex::new(Vec::new()));
        let saved = Arc::new(Mutex::new(Vec::new()));
        let mut rx = channel.subscribe();
        let tx = channel.clone();
        let (shots, records) = (screenshots.clone(), saved.clone());

        let task = tokio::spawn(async move {
            while let Ok(message) = rx.recv().await {
                match message {
                    PageMessage::CaptureScreenshot { timestamp } => {
                        shots.lock().unwrap().push(timestamp.clone());
                        let answer = |timestamp: String, success: bool, error: Option<String>| {
                            PageMessage::ScreenshotComplete {
                                timestamp,
                                success,
                                error,
                            }
                        };
                        match &reply {
                            Reply::Succeed => {
                                tx.post_message(answer(timestamp, true, None));
                            }
                            Reply::Fail(msg) => {
                                tx.post_message(answer(timestamp, false, Some(msg.to_string())));
                            }
                            Reply::Silent => {}
                            Reply::WrongCorrelation => {
                                tx.post_message(answer(format!("{timestamp}-other"), true, None));
                            }
                            Reply::DelayScreenshot(delay) => {
                                let tx = tx.clone();
                                let delay = *delay;
                                tokio::spawn(async move {
                                    tokio::time::sleep(delay).await;
                                    tx.post_message(answer(timestamp, true, None));
                                });
                            }
                        }
                    }
                    PageMessage::SaveInteractionData { data } => {
                        let timestamp = data.timestamp.clone();
                        records.lock().unwrap().push(data);
                        let answer = |timestamp: String, success: bool, error: Option<String>| {
                            PageMessage::InteractionComplete {
                                timestamp,
                                success,
                                error,
                            }
                        };
                        match &reply {
                            Reply::Succeed | Reply::DelayScreenshot(_) => {
                                tx.post_message(answer(timestamp, true, None));
                            }
                            Reply::Fail(msg) => {
                                tx.post_message(answer(timestamp, false, Some(msg.to_string())));
                            }
                            Reply::Silent => {}
                            Reply::WrongCorrelation => {
                                tx.post_message(answer(format!("{timestamp}-other"), true, None));
                            }
                        }
                    }
                    _ => {}
                }
            }
        });

        Self {
            screenshots,
            saved,
            _task: task,
        }
    }

    pub fn saved(&self) -> Vec<InteractionRecord> {
        self.saved.lock().unwrap().clone()
    }

    pub fn screenshots(&self) -> Vec<String> {
        self.screenshots.lock().unwrap().clone()
    }
}

pub fn install(config: PageRecorderConfig) -> (Arc<Page>, PageRecorder) {
    init_tracing();
    let page = Page::new("https://example.com/start");
    let recorder = PageRecorder::install(&page, config).expect("install recorder");
    (page, recorder)
}

pub fn append(
    page: &Page,
    parent: Option<ElementId>,
    tag: &str,
    attributes: &[(&str, &str)],
) -> ElementId {
    let mut doc = page.document_mut();
    let parent = parent.unwrap_or_else(|| doc.body());
    doc.append_element(parent, tag, attributes)
        .expect("append element")
}
