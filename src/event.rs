use crossterm::event::{Event as CrosstermEvent, EventStream, KeyEvent};
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;

/// Bounded queue; big enough for bursty input, small enough to bound
/// memory.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug)]
pub enum Event {
    Key(KeyEvent),
    /// Status-refresh tick (500 ms cadence).
    Tick,
    Resize,
}

/// Terminal event pump: merges crossterm input with the scheduler tick
/// into one channel consumed by the main loop.
pub struct EventHandler {
    rx: mpsc::Receiver<Event>,
    _task: tokio::task::JoinHandle<()>,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        Self::from_stream(EventStream::new(), tick_rate)
    }

    /// Build from any crossterm-compatible stream; tests inject fakes.
    pub fn from_stream<S>(stream: S, tick_rate: Duration) -> Self
    where
        S: Stream<Item = Result<CrosstermEvent, std::io::Error>> + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            let mut reader = stream;
            let mut tick = tokio::time::interval(tick_rate);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        // Drop the tick when the queue is full; the next
                        // one carries the same information.
                        match tx.try_send(Event::Tick) {
                            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                    event = reader.next() => {
                        match event {
                            Some(Ok(CrosstermEvent::Key(key))) => {
                                if tx.send(Event::Key(key)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(CrosstermEvent::Resize(_, _))) => {
                                if tx.send(Event::Resize).await.is_err() {
                                    break;
                                }
                            }
                            Some(Err(_)) | None => break,
                            _ => {}
                        }
                    }
                }
            }
        });

        Self { rx, _task: task }
    }

    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
