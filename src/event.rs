use std::time::Duration;

use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::refresh::RefreshOutcome;
use crate::runtime::lifecycle::LifecycleResult;

#[derive(Debug)]
pub enum Event {
    Key(KeyEvent),
    Tick,
    Resize,
    /// A refresh cycle finished (or failed) on a background task.
    Refresh(RefreshOutcome),
    /// A lifecycle action finished on a background task.
    Lifecycle(LifecycleResult),
}

/// The UI loop's inbox. Background tasks hand results to the UI through
/// [`Dispatcher::queue_update`]; the loop applies them one at a time between
/// input events, so render state is only ever touched from the loop.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Event>,
}

impl Dispatcher {
    /// A dispatcher and the receiving end of its queue, without any terminal
    /// input attached.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns `false` once the UI loop has gone away.
    pub fn queue_update(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }
}

pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
    dispatcher: Dispatcher,
    _task: tokio::task::JoinHandle<()>,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        let (dispatcher, rx) = Dispatcher::channel();
        let tx = dispatcher.clone();

        let task = tokio::spawn(async move {
            let mut reader = event::EventStream::new();
            let mut tick_interval = tokio::time::interval(tick_rate);

            loop {
                tokio::select! {
                    maybe_event = reader.next() => {
                        match maybe_event {
                            Some(Ok(evt)) => {
                                let mapped = match evt {
                                    CrosstermEvent::Key(key) if key.kind == KeyEventKind::Press => {
                                        Some(Event::Key(key))
                                    }
                                    CrosstermEvent::Resize(_, _) => Some(Event::Resize),
                                    _ => None,
                                };
                                if let Some(e) = mapped
                                    && !tx.queue_update(e)
                                {
                                    break;
                                }
                            }
                            Some(Err(_)) => break,
                            None => break,
                        }
                    }
                    _ = tick_interval.tick() => {
                        if !tx.queue_update(Event::Tick) {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            rx,
            dispatcher,
            _task: task,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
