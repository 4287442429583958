//! Structured observability events.
//!
//! Components never wrap each other to trace calls. Instead each one holds an
//! [`EventSink`] handed to it at construction and emits [`TileEvent`]s at the
//! points worth observing. Whoever owns the receiving end decides what to do
//! with them (metrics, tracing spans, test assertions).
//!
//! ```ignore
//! let (events, mut rx) = EventSink::channel();
//! let manager = TileSourceManager::new(config, collaborators, events.clone());
//!
//! while let Some(event) = rx.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

mod event;
mod sink;

pub use event::TileEvent;
pub use sink::EventSink;
