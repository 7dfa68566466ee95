//! Actor-based request orchestration
//!
//! A single [`ScopeActor`] owns every piece of state shared between the editor
//! and the worker. The editor talks to it through a cloneable [`ScopeHandle`];
//! instead of `Arc<Mutex<...>>`, everything is funneled through its event loop.
//!
//! # Pieces
//!
//! - [`correlator`]: pending requests keyed by `(file, offset, kind)`, with coalescing
//! - [`changes`]: line range touched since the last sync
//! - [`sync`]: builds the full / partial / empty file payload for a request
//! - [`session`]: host-side state of one worker session
//! - [`seeding`]: bounded background walk feeding files to the worker
//! - [`resolver`]: answers the worker's requests for file contents
//! - [`exclusion`]: files excluded after inference timeouts
//!
//! # Message flow
//!
//! ```text
//! ScopeHandle ──ScopeMessage──▶ ScopeActor ──WorkerRequest──▶ worker
//!                                  ▲   ▲
//!        spawned tasks ──ScopeEvent┘   └──WorkerEvent── worker
//! ```

pub mod changes;
pub mod correlator;
mod coordinator;
pub mod exclusion;
pub mod handle;
pub mod message;
pub mod resolver;
pub mod seeding;
pub mod session;
pub mod sync;

#[cfg(test)]
mod __tests__;

pub use coordinator::{ScopeActor, ScopeOptions};
pub use correlator::RequestError;
pub use exclusion::ScopeNotice;
pub use handle::{ScopeError, ScopeHandle};
pub use message::{HintRequest, ScopeStatus, SessionStatus};
pub use session::{SessionId, SessionState};
