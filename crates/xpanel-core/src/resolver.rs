// ── Endpoint resolution ──
//
// Name → session ID lookups, memoized for the life of one simulator
// session. A name the simulator does not know is remembered as
// unresolved and never asked for again in that session; a transport
// failure is not remembered and ends the session instead.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};
use xpanel_api::{CommandId, DatarefId, SimClient};

use crate::error::CoreError;

// ── SimulatorLink ────────────────────────────────────────────────────

/// The simulator operations the engine depends on.
///
/// Implemented by [`SimClient`]; tests substitute an in-memory fake.
pub trait SimulatorLink: Send + Sync + 'static {
    fn lookup_dataref(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<DatarefId, xpanel_api::Error>> + Send;

    fn lookup_command(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<CommandId, xpanel_api::Error>> + Send;

    fn set_dataref(
        &self,
        id: DatarefId,
        value: f64,
        index: Option<u32>,
    ) -> impl Future<Output = Result<(), xpanel_api::Error>> + Send;

    fn activate_command(
        &self,
        id: CommandId,
        duration: Duration,
    ) -> impl Future<Output = Result<(), xpanel_api::Error>> + Send;
}

impl SimulatorLink for SimClient {
    async fn lookup_dataref(&self, name: &str) -> Result<DatarefId, xpanel_api::Error> {
        SimClient::lookup_dataref(self, name).await
    }

    async fn lookup_command(&self, name: &str) -> Result<CommandId, xpanel_api::Error> {
        SimClient::lookup_command(self, name).await
    }

    async fn set_dataref(
        &self,
        id: DatarefId,
        value: f64,
        index: Option<u32>,
    ) -> Result<(), xpanel_api::Error> {
        SimClient::set_dataref(self, id, value, index).await
    }

    async fn activate_command(
        &self,
        id: CommandId,
        duration: Duration,
    ) -> Result<(), xpanel_api::Error> {
        SimClient::activate_command(self, id, duration).await
    }
}

// ── EndpointResolver ─────────────────────────────────────────────────

/// Outcome of a lookup, memoized either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<T> {
    Resolved(T),
    Unresolved,
}

impl<T: Copy> Resolution<T> {
    pub fn id(&self) -> Option<T> {
        match self {
            Self::Resolved(id) => Some(*id),
            Self::Unresolved => None,
        }
    }
}

/// Memoizing resolver for one session.
pub struct EndpointResolver<'a, L> {
    link: &'a L,
    datarefs: HashMap<String, Resolution<DatarefId>>,
    commands: HashMap<String, Resolution<CommandId>>,
    dataref_names: HashMap<DatarefId, String>,
    command_names: HashMap<CommandId, String>,
}

impl<'a, L: SimulatorLink> EndpointResolver<'a, L> {
    pub fn new(link: &'a L) -> Self {
        Self {
            link,
            datarefs: HashMap::new(),
            commands: HashMap::new(),
            dataref_names: HashMap::new(),
            command_names: HashMap::new(),
        }
    }

    /// Resolve a dataref name. `Ok(None)` means the simulator does not
    /// know it; writes through it are no-ops.
    pub async fn resolve_dataref(&mut self, name: &str) -> Result<Option<DatarefId>, CoreError> {
        if let Some(cached) = self.datarefs.get(name) {
            return Ok(cached.id());
        }
        let resolution = classify("dataref", name, self.link.lookup_dataref(name).await)?;
        if let Resolution::Resolved(id) = resolution {
            debug!(name, %id, "dataref resolved");
            self.dataref_names.insert(id, name.to_owned());
        }
        self.datarefs.insert(name.to_owned(), resolution);
        Ok(resolution.id())
    }

    /// Resolve a command name. See [`resolve_dataref`](Self::resolve_dataref).
    pub async fn resolve_command(&mut self, name: &str) -> Result<Option<CommandId>, CoreError> {
        if let Some(cached) = self.commands.get(name) {
            return Ok(cached.id());
        }
        let resolution = classify("command", name, self.link.lookup_command(name).await)?;
        if let Resolution::Resolved(id) = resolution {
            debug!(name, %id, "command resolved");
            self.command_names.insert(id, name.to_owned());
        }
        self.commands.insert(name.to_owned(), resolution);
        Ok(resolution.id())
    }

    /// Cached dataref resolution, without touching the network.
    pub fn cached_dataref(&self, name: &str) -> Option<Resolution<DatarefId>> {
        self.datarefs.get(name).copied()
    }

    pub fn dataref_name(&self, id: DatarefId) -> Option<&str> {
        self.dataref_names.get(&id).map(String::as_str)
    }

    pub fn command_name(&self, id: CommandId) -> Option<&str> {
        self.command_names.get(&id).map(String::as_str)
    }

    /// Resolved `(name, id)` pairs for datarefs.
    pub fn resolved_datarefs(&self) -> impl Iterator<Item = (&str, DatarefId)> {
        self.datarefs
            .iter()
            .filter_map(|(name, r)| r.id().map(|id| (name.as_str(), id)))
    }

    /// Resolved `(name, id)` pairs for commands.
    pub fn resolved_commands(&self) -> impl Iterator<Item = (&str, CommandId)> {
        self.commands
            .iter()
            .filter_map(|(name, r)| r.id().map(|id| (name.as_str(), id)))
    }

    /// Names that failed to resolve, for the startup summary.
    pub fn unresolved(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .datarefs
            .iter()
            .filter(|(_, r)| r.id().is_none())
            .map(|(n, _)| n.as_str())
            .chain(
                self.commands
                    .iter()
                    .filter(|(_, r)| r.id().is_none())
                    .map(|(n, _)| n.as_str()),
            )
            .collect();
        names.sort_unstable();
        names
    }
}

fn classify<T>(
    kind: &'static str,
    name: &str,
    result: Result<T, xpanel_api::Error>,
) -> Result<Resolution<T>, CoreError> {
    match result {
        Ok(id) => Ok(Resolution::Resolved(id)),
        Err(e) if e.is_transient() => Err(e.into()),
        Err(e) => {
            warn!(kind, name, status = ?e.status(), error = %e, "cannot resolve, writes will be dropped");
            Ok(Resolution::Unresolved)
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
