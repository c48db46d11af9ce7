use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Upload,
    Download,
}

/// Normalized transfer progress. One stream per kind: a second concurrent
/// upload shares the same indicator as the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessStatus {
    #[serde(rename = "type")]
    pub kind: TransferKind,
    /// Percentage, 0..=100
    pub progress: u8,
    pub finished: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NavigationTarget {
    SessionList,
    Directory { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum AppEvent {
    ProcessStatus(ProcessStatus),
    DirectoryChanged { path: String },
    Navigate { target: NavigationTarget },
}

pub type EventSender = mpsc::UnboundedSender<AppEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<AppEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Publish an event, ignoring a closed receiver.
pub(crate) fn emit(tx: &EventSender, event: AppEvent) {
    if tx.send(event).is_err() {
        tracing::debug!("Event receiver dropped");
    }
}
