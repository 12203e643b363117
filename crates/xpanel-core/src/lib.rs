//! Simulator binding engine between a hardware cockpit panel and X-Plane.
//!
//! The engine turns raw input samples into simulator writes and
//! simulator pushes into hardware actuations:
//!
//! - **[`EdgeDetector`]** diffs fixed-size bitmask samples into press and
//!   release edges, at most one pending edge per input.
//!
//! - **[`MappingTable`]** is the immutable description of the panel:
//!   controls with their [`Behavior`] and [`Target`], outputs with their
//!   [`Transform`], combined-switch groups and backlights.
//!
//! - **[`IdentityCache`]** holds the numeric dataref and command IDs of
//!   one simulator session, resolved through the [`EndpointResolver`].
//!
//! - **[`BindingEngine`]** is the single owner of mutable engine state.
//!   It dispatches edges to [`WriteRequest`]s and routes pushes to
//!   [`Actuation`]s with per-output deduplication.
//!
//! - **[`SessionSupervisor`]** drives the simulator session lifecycle:
//!   resolve, subscribe, push loop, backoff, reconnect.
//!
//! - **[`Bridge`]** wires all of the above to an [`InputDevice`] and an
//!   [`OutputDevice`], e.g. the serial [`hardware::aux_board`].

pub mod bridge;
pub mod combined;
pub mod config;
pub mod dispatch;
pub mod edge;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod identity;
pub mod model;
pub mod resolver;
pub mod router;
pub mod session;
pub mod transform;
pub mod writer;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::Bridge;
pub use config::{BridgeConfig, CommandTiming, ReconnectConfig};
pub use dispatch::{Dispatcher, SimValues, WriteRequest};
pub use edge::{Edge, EdgeDetector, EdgeKind};
pub use engine::{BindingEngine, EngineEvent, EngineOutput};
pub use error::CoreError;
pub use hardware::{InputDevice, OutputDevice};
pub use identity::{IdentityCache, Owners};
pub use model::{
    Backlight, Behavior, BehaviorKind, CombinedGroup, Control, LedMode, MappingBuilder,
    MappingTable, Output, OutputKind, Target, TruthTable,
};
pub use resolver::{EndpointResolver, Resolution, SimulatorLink};
pub use router::{Actuation, InboundRouter};
pub use session::{ConnectionState, SessionControl, SessionSupervisor, calculate_backoff};
pub use transform::{Comparison, Transform, TransformError};
