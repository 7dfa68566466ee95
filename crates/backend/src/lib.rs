mod actor;
mod domain;

pub use domain::{config, document};

pub mod dirs;
pub mod fs;
pub mod ipc;
pub mod worker;

pub use actor::exclusion::{exclusions_path, load_exclusions, save_exclusions};
pub use actor::{
  HintRequest, RequestError, ScopeActor, ScopeError, ScopeHandle, ScopeNotice, ScopeOptions, ScopeStatus,
  SessionId, SessionState, SessionStatus,
};
