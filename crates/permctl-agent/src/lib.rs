//! permctl Agent Library
//!
//! Core functionality for the permission agent:
//! - Authorization probing against the OS privacy subsystem
//! - TTL status cache with single-flight refresh
//! - Per-kind consent requests with timeouts and settings deep-links
//! - Orchestration and `permissions.*` notifications
//! - First-run markers and the post-grant restart cascade

pub mod cache;
pub mod events;
pub mod first_run;
pub mod grant;
pub mod monitor;
pub mod orchestrator;
pub mod platform;
pub mod probe;
pub mod restart;
pub mod startup;

pub use cache::{Snapshot, StatusCache};
pub use events::PermissionEvent;
pub use first_run::{FirstRunState, MarkerSnapshot};
pub use grant::{ConsentPrimitive, ConsentReply, GrantRequester, SettingsOpener};
pub use orchestrator::{EnsureReport, Evaluation, PermissionOrchestrator, evaluate};
pub use platform::Platform;
pub use probe::{AuthorizationBackend, AuthorizationProbe, ProbeBatch};
pub use restart::{RestartCoordinator, RestartDecision, RestartOutcome, RestartState};
pub use startup::{Agent, LaunchContext, Startup};
