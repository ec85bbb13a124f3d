//! Observable value cells.
//!
//! A [`Cell`] is the reactive boundary of this crate: a shared value with a
//! `current value` / `subscribe to change` contract. Resources read their
//! request descriptor from a cell (or from a fixed value, see [`Input`]) and
//! expose their own state through the same mechanism.
//!
//! # Example
//!
//! ```
//! use larder::cell::Cell;
//!
//! let count = Cell::new(0);
//! assert_eq!(count.get(), 0);
//!
//! count.set(1);
//! count.update(|n| *n += 1);
//! assert_eq!(count.get(), 2);
//! ```

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// A shared, observable value.
///
/// Cloning a `Cell` clones the handle, not the value: all clones read and
/// write the same slot. Writers never block on readers, and every write
/// notifies all subscribers.
#[derive(Debug, Clone)]
pub struct Cell<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T: Clone + Send + Sync + 'static> Cell<T> {
    /// Creates a new cell holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        let (tx, _rx) = watch::channel(value);
        Self { tx: Arc::new(tx) }
    }

    /// Returns a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Replaces the current value, notifying subscribers.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Mutates the current value in place, notifying subscribers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    /// Subscribes to changes of this cell.
    ///
    /// The receiver observes the value at subscription time plus every
    /// subsequent write.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Returns a stream that yields the value after each write.
    ///
    /// The current value is not yielded; only changes after the call are.
    #[must_use]
    pub fn changes(&self) -> BoxStream<'static, T> {
        WatchStream::from_changes(self.tx.subscribe()).boxed()
    }
}

impl<T: Clone + Send + Sync + Default + 'static> Default for Cell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Either a fixed value or a live [`Cell`].
///
/// Orchestrators accept their inputs as `impl Into<Input<T>>`, so callers can
/// pass a plain value when the input never changes and a cell when it does.
#[derive(Debug, Clone)]
pub enum Input<T> {
    /// A value that never changes.
    Fixed(T),
    /// A live cell; the orchestrator re-derives on every write.
    Live(Cell<T>),
}

impl<T: Clone + Send + Sync + 'static> Input<T> {
    /// Returns a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        match self {
            Self::Fixed(value) => value.clone(),
            Self::Live(cell) => cell.get(),
        }
    }

    /// Returns a stream of subsequent values. Fixed inputs never yield.
    #[must_use]
    pub fn changes(&self) -> BoxStream<'static, T> {
        match self {
            Self::Fixed(_) => stream::pending().boxed(),
            Self::Live(cell) => cell.changes(),
        }
    }
}

impl<T> From<T> for Input<T> {
    fn from(value: T) -> Self {
        Self::Fixed(value)
    }
}

impl<T> From<Cell<T>> for Input<T> {
    fn from(cell: Cell<T>) -> Self {
        Self::Live(cell)
    }
}
