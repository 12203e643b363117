// ── Session identity cache ──
//
// Everything one simulator session knows about IDs: which name got
// which ID, and which outputs own each pushed dataref ID. Built in one
// pass at session start and dropped whole when the session ends.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info};
use xpanel_api::{CommandId, DatarefId};

use crate::error::CoreError;
use crate::model::MappingTable;
use crate::resolver::{EndpointResolver, SimulatorLink};

/// Outputs that follow one dataref ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owners {
    /// Exactly one output, following the whole (scalar) value.
    Single(usize),
    /// Array slots, or several outputs sharing one plain dataref.
    Many(Vec<usize>),
}

impl Owners {
    pub fn as_slice(&self) -> &[usize] {
        match self {
            Self::Single(idx) => std::slice::from_ref(idx),
            Self::Many(list) => list,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdentityCache {
    datarefs: HashMap<String, DatarefId>,
    commands: HashMap<String, CommandId>,
    owners: HashMap<DatarefId, Owners>,
    subscribed: BTreeSet<DatarefId>,
}

impl IdentityCache {
    /// Resolve every name in `table` and index outputs by ID.
    ///
    /// Only a lost connection fails the build; unknown names are left
    /// out and their writes become no-ops.
    pub async fn build<L: SimulatorLink>(
        table: &MappingTable,
        resolver: &mut EndpointResolver<'_, L>,
    ) -> Result<Self, CoreError> {
        for name in table.dataref_names() {
            resolver.resolve_dataref(name).await?;
        }
        for name in table.command_names() {
            resolver.resolve_command(name).await?;
        }

        let datarefs: HashMap<String, DatarefId> = resolver
            .resolved_datarefs()
            .map(|(name, id)| (name.to_owned(), id))
            .collect();
        let commands = resolver
            .resolved_commands()
            .map(|(name, id)| (name.to_owned(), id))
            .collect();

        let cache = Self::from_ids(table, datarefs, commands);
        info!(
            datarefs = cache.datarefs.len(),
            commands = cache.commands.len(),
            subscribed = cache.subscribed.len(),
            unresolved = resolver.unresolved().len(),
            "identity cache built"
        );
        Ok(cache)
    }

    /// Assemble from already-resolved IDs.
    pub fn from_ids(
        table: &MappingTable,
        datarefs: HashMap<String, DatarefId>,
        commands: HashMap<String, CommandId>,
    ) -> Self {
        let mut grouped: HashMap<DatarefId, Vec<usize>> = HashMap::new();
        for (idx, output) in table.outputs().enumerate() {
            match datarefs.get(&output.dataref) {
                Some(&id) => grouped.entry(id).or_default().push(idx),
                None => debug!(output = %output.label, dataref = %output.dataref, "output has no ID this session"),
            }
        }

        let owners: HashMap<DatarefId, Owners> = grouped
            .into_iter()
            .map(|(id, list)| {
                let single = match list.as_slice() {
                    &[only] if table.output(only).is_some_and(|o| o.index.is_none()) => Some(only),
                    _ => None,
                };
                let owners = single.map_or(Owners::Many(list), Owners::Single);
                (id, owners)
            })
            .collect();

        let subscribed = owners
            .keys()
            .copied()
            .chain(
                table
                    .toggle_datarefs()
                    .into_iter()
                    .filter_map(|name| datarefs.get(name).copied()),
            )
            .collect();

        Self {
            datarefs,
            commands,
            owners,
            subscribed,
        }
    }

    pub fn dataref(&self, name: &str) -> Option<DatarefId> {
        self.datarefs.get(name).copied()
    }

    pub fn command(&self, name: &str) -> Option<CommandId> {
        self.commands.get(name).copied()
    }

    pub fn owners(&self, id: DatarefId) -> Option<&Owners> {
        self.owners.get(&id)
    }

    pub fn is_subscribed(&self, id: DatarefId) -> bool {
        self.subscribed.contains(&id)
    }

    /// IDs to subscribe to, ascending.
    pub fn subscription(&self) -> Vec<DatarefId> {
        self.subscribed.iter().copied().collect()
    }
}
