//! The offline cache router and the host that drives it.
//!
//! - [`OfflineWorker`]: install, activate and fetch handlers of one version
//! - [`Host`]: lifecycle ordering and client control
//! - [`EventQueue`]: ordered dispatch of host events
//! - [`UrlMarkers`]: the default routing predicate

pub mod background;
pub mod host;
pub mod offline;
pub mod queue;
pub mod route;
pub mod worker;

pub use host::{ClientId, ClientInfo, FetchTarget, Host, HostStatus, WorkerInfo, WorkerState};
pub use offline::{offline_body, offline_response};
pub use queue::{EventQueue, Registration};
pub use route::{RoutePredicate, Strategy, UrlMarkers};
pub use worker::{ActivateReport, InstallReport, OfflineWorker, Served, Source};
