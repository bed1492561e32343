//! Unbounded buffer handing a stream of updates to a single consumer.

use std::collections::VecDeque;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use log::trace;
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Unbounded buffer that never blocks the producer.
///
/// Values flow through a channel of capacity one; anything that does not fit waits in a
/// backlog. The consumer receives from [`Unbounded::get`] and must call
/// [`Unbounded::load`] after every successful receive to move the next backlog entry
/// onto the channel.
///
/// After [`Unbounded::close`], the channel disconnects once the backlog is drained and
/// `load` has been called for the final time.
pub struct Unbounded<T> {
    rx: Receiver<T>,
    state: Mutex<State<T>>,
}

struct State<T> {
    tx: Option<Sender<T>>, // dropped to disconnect the consumer
    backlog: VecDeque<T>,
    closing: bool,
}

impl<T> Unbounded<T> {
    /// Create an empty, open buffer.
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(1);
        Self {
            rx,
            state: Mutex::new(State {
                tx: Some(tx),
                backlog: VecDeque::new(),
                closing: false,
            }),
        }
    }

    /// Adds `value` to the buffer.
    pub fn put(&self, value: T) -> Result<()> {
        let mut state = self.state.lock();
        if state.closing {
            return Err(Error::BufferClosed);
        }
        if state.backlog.is_empty() {
            if let Some(tx) = state.tx.as_ref() {
                match tx.try_send(value) {
                    Ok(()) => return Ok(()),
                    Err(TrySendError::Full(value)) | Err(TrySendError::Disconnected(value)) => {
                        state.backlog.push_back(value);
                        return Ok(());
                    }
                }
            }
        }
        state.backlog.push_back(value);
        Ok(())
    }

    /// Sends the oldest buffered value, if any, onto the channel returned by
    /// [`Unbounded::get`].
    pub fn load(&self) {
        let mut state = self.state.lock();
        if let Some(value) = state.backlog.pop_front() {
            let Some(tx) = state.tx.as_ref() else {
                return;
            };
            if let Err(TrySendError::Full(value)) | Err(TrySendError::Disconnected(value)) =
                tx.try_send(value)
            {
                state.backlog.push_front(value);
            }
        } else if state.closing && state.tx.take().is_some() {
            trace!("unbounded buffer drained, disconnecting consumer");
        }
    }

    /// Channel on which buffered values are delivered.
    pub fn get(&self) -> &Receiver<T> {
        &self.rx
    }

    /// Closes the buffer. Later `put` calls fail; the channel disconnects once all
    /// buffered values have been received.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closing {
            return;
        }
        state.closing = true;
        if state.backlog.is_empty() {
            state.tx = None;
        }
        trace!(
            "unbounded buffer closing with {} values in backlog",
            state.backlog.len()
        );
    }
}

impl<T> Default for Unbounded<T> {
    fn default() -> Self {
        Self::new()
    }
}
