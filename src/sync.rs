//! Polling chat sync for the selected conversation
//!
//! Each fetch is a full snapshot from the backend and replaces the list
//! wholesale. Results are tagged with the selection generation they were
//! issued under; anything that lands after the selection moved on is
//! dropped.

use crate::api::SharedBackend;
use crate::config::MAX_MESSAGE_CHARS;
use crate::error::{Error, Result};
use crate::model::{Id, Message};
use crate::timer::{self, TaskHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What the chat panel shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadView {
    pub conversation: Option<Id>,
    /// Backend order, assumed oldest first; never re-sorted here
    pub messages: Vec<Message>,
    /// A fetch has landed for this conversation (even an empty one)
    pub synced: bool,
    generation: u64,
}

/// Keeps one conversation's messages in step with the backend
pub struct MessageSync {
    backend: SharedBackend,
    interval: Duration,
    view: Arc<watch::Sender<ThreadView>>,
    poller: Option<TaskHandle>,
    generation: u64,
}

impl MessageSync {
    pub fn new(backend: SharedBackend, interval: Duration) -> Self {
        let (view, _) = watch::channel(ThreadView::default());
        Self {
            backend,
            interval,
            view: Arc::new(view),
            poller: None,
            generation: 0,
        }
    }

    /// Receive every change to the displayed thread
    pub fn subscribe(&self) -> watch::Receiver<ThreadView> {
        self.view.subscribe()
    }

    pub fn selected(&self) -> Option<Id> {
        self.view.borrow().conversation.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.view.borrow().messages.clone()
    }

    /// 1 while a conversation is selected, otherwise 0
    pub fn active_timers(&self) -> usize {
        usize::from(self.poller.as_ref().is_some_and(TaskHandle::is_active))
    }

    /// On-select hook: stop the old poller, then fetch and poll `conversation`
    pub fn select(&mut self, conversation: Id) {
        self.stop_polling();
        let generation = self.next_generation();

        info!(%conversation, "selected conversation");
        self.view.send_replace(ThreadView {
            conversation: Some(conversation.clone()),
            messages: Vec::new(),
            synced: false,
            generation,
        });

        let backend = self.backend.clone();
        let view = self.view.clone();
        self.poller = Some(timer::every(self.interval, move || {
            let backend = backend.clone();
            let view = view.clone();
            let conversation = conversation.clone();
            async move {
                if let Err(e) = fetch_into(&backend, &view, &conversation, generation).await {
                    // The next tick corrects a missed one
                    warn!(%conversation, "message poll failed: {}", e);
                }
            }
        }));
    }

    /// On-deselect hook: cancel polling and clear the thread
    pub fn deselect(&mut self) {
        self.stop_polling();
        let generation = self.next_generation();
        self.view.send_replace(ThreadView {
            generation,
            ..ThreadView::default()
        });
    }

    /// Fetch the selected conversation now, outside the timer
    pub async fn refresh(&self) -> Result<()> {
        let (conversation, generation) = self.selection()?;
        fetch_into(&self.backend, &self.view, &conversation, generation).await
    }

    /// Post to the selected conversation, then refresh immediately
    ///
    /// Nothing is sent for blank or overlong content. On failure the caller
    /// still owns `content` and can retry.
    pub async fn send(&self, content: &str) -> Result<()> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::Validation("message is empty".to_string()));
        }
        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(Error::Validation(format!(
                "message exceeds {} characters",
                MAX_MESSAGE_CHARS
            )));
        }
        let (conversation, generation) = self.selection()?;

        self.backend.send_message(&conversation, content).await?;

        if let Err(e) = fetch_into(&self.backend, &self.view, &conversation, generation).await {
            warn!(%conversation, "refresh after send failed: {}", e);
        }
        Ok(())
    }

    fn selection(&self) -> Result<(Id, u64)> {
        let view = self.view.borrow();
        let conversation = view
            .conversation
            .clone()
            .ok_or_else(|| Error::Validation("no conversation selected".to_string()))?;
        Ok((conversation, view.generation))
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn stop_polling(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.cancel();
            debug!("stopped message poller");
        }
    }
}

async fn fetch_into(
    backend: &SharedBackend,
    view: &watch::Sender<ThreadView>,
    conversation: &Id,
    generation: u64,
) -> Result<()> {
    let messages = backend.list_messages(conversation).await?;
    let count = messages.len();

    let applied = view.send_if_modified(|current| {
        if current.generation != generation {
            return false;
        }
        if current.synced && current.messages == messages {
            return false;
        }
        current.messages = messages;
        current.synced = true;
        true
    });

    debug!(%conversation, count, applied, "message fetch");
    Ok(())
}
