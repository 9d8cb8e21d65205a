//! The compilation session: cache, cycle guard, and the public `build`
//! entry point with key/time-range post-filters.

use std::collections::{HashMap, HashSet};

use tracing::debug;
use uuid::Uuid;

use featplan_core::prelude::*;
use featplan_engine::{Registry, TableEngine};

use crate::config::BuilderConfig;

/// Optional key filter for `build`: either literal key rows or another
/// descriptor whose compiled output supplies the keys.
#[derive(Debug, Clone)]
pub enum KeySet {
    Rows(Table),
    Descriptor(TableDescriptor),
}

/// One compilation session over an engine and a registry.
///
/// A builder is logically single-threaded: `get_table` mutates the
/// session cache, so the `&mut self` receivers confine a session to one
/// thread. Descriptors themselves are immutable and freely shareable
/// across sessions.
pub struct TableBuilder<'a> {
    pub(crate) engine: &'a dyn TableEngine,
    pub(crate) registry: &'a dyn Registry,
    config: BuilderConfig,
    session_id: Uuid,
    built: HashMap<String, (TableDescriptor, Table)>,
    in_progress: HashSet<String>,
}

impl<'a> TableBuilder<'a> {
    pub fn new(engine: &'a dyn TableEngine, registry: &'a dyn Registry) -> Self {
        Self::with_config(engine, registry, BuilderConfig::default())
    }

    pub fn with_config(
        engine: &'a dyn TableEngine,
        registry: &'a dyn Registry,
        config: BuilderConfig,
    ) -> Self {
        Self {
            engine,
            registry,
            config,
            session_id: Uuid::new_v4(),
            built: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Compile `descriptor` into a table, optionally semi-filtered by
    /// `keys` and bounded to `start <= event_time < end`. The internal
    /// event-time column is stripped from the returned table.
    ///
    /// Fails with `Definition` for unresolved views, `Schema` for missing
    /// key/timestamp fields, `Conflict` for a name collision with a
    /// different definition, and `Cycle` for looping descriptor graphs.
    /// No partial plan is ever returned.
    pub fn build(
        &mut self,
        descriptor: &TableDescriptor,
        keys: Option<&KeySet>,
        start: Option<EventTime>,
        end: Option<EventTime>,
    ) -> Result<Table> {
        if descriptor.is_unresolved() {
            return Err(Error::Definition(format!(
                "cannot build unresolved feature view '{}'",
                descriptor.name()
            )));
        }

        debug!(
            session = %self.session_id,
            table = descriptor.name(),
            "building table"
        );

        let mut table = self.get_table(descriptor)?;

        if let Some(keys) = keys {
            table = self.filter_table_by_keys(&table, keys)?;
        }

        if start.is_some() || end.is_some() {
            if descriptor.timestamp_field().is_none() {
                return Err(Error::Schema(format!(
                    "table '{}' has no timestamp field; it cannot be ranged by time",
                    descriptor.name()
                )));
            }
            table = range_table_by_time(&table, start, end)?;
        }

        if !self.config.keep_event_time && table.has_field(EVENT_TIME_COLUMN) {
            table = table.drop_column(EVENT_TIME_COLUMN);
        }
        Ok(table)
    }

    /// Resolve a descriptor through the session cache, compiling it on
    /// first use. Repeat requests must carry a structurally equal
    /// definition; a revisit of an in-progress name means the descriptor
    /// graph loops.
    pub fn get_table(&mut self, descriptor: &TableDescriptor) -> Result<Table> {
        let name = descriptor.name().to_string();

        if let Some((cached_descriptor, cached_table)) = self.built.get(&name) {
            if cached_descriptor != descriptor {
                return Err(Error::Conflict(format!(
                    "table name '{}' maps to two different descriptors in one session",
                    name
                )));
            }
            return Ok(cached_table.clone());
        }

        if !self.in_progress.insert(name.clone()) {
            return Err(Error::Cycle(format!(
                "descriptor '{}' references itself through named lookups",
                name
            )));
        }
        let result = match descriptor {
            TableDescriptor::Source(source) => self.engine.scan_source(source),
            TableDescriptor::Derived(view) => self.build_derived_view(view),
            TableDescriptor::Sliding(view) => self.build_sliding_view(view),
        };
        self.in_progress.remove(&name);

        let table = result?;
        self.built
            .insert(name, (descriptor.clone(), table.clone()));
        Ok(table)
    }

    /// Equality semi-join against a key set. Every key column must already
    /// exist on the target table.
    fn filter_table_by_keys(&mut self, table: &Table, keys: &KeySet) -> Result<Table> {
        let key_table = match keys {
            KeySet::Rows(rows) => rows.clone(),
            KeySet::Descriptor(descriptor) => self.get_table(descriptor)?,
        };
        for field_name in key_table.field_names() {
            if !table.has_field(&field_name) {
                return Err(Error::Schema(format!(
                    "given key '{}' not in the table fields {:?}",
                    field_name,
                    table.field_names()
                )));
            }
        }
        self.engine
            .equality_join(&key_table, table, &key_table.field_names())
    }
}

/// Resolve declared features, failing on any still-unresolved name.
pub(crate) fn resolve_decls(decls: &[FeatureDecl], view_name: &str) -> Result<Vec<Feature>> {
    decls
        .iter()
        .map(|decl| match decl {
            FeatureDecl::Feature(feature) => Ok(feature.clone()),
            FeatureDecl::Name(name) => Err(Error::Definition(format!(
                "feature '{}' of view '{}' is unresolved",
                name, view_name
            ))),
        })
        .collect()
}

/// Half-open filter on the internal event-time column; an omitted bound
/// imposes no filter on that side.
fn range_table_by_time(
    table: &Table,
    start: Option<EventTime>,
    end: Option<EventTime>,
) -> Result<Table> {
    let times = table.require_column(EVENT_TIME_COLUMN)?;
    let keep = times
        .values
        .iter()
        .map(|v| {
            let t = v.as_i64().ok_or_else(|| {
                Error::Schema(format!("event-time value {:?} is not an instant", v))
            })?;
            Ok(start.map(|s| t >= s).unwrap_or(true) && end.map(|e| t < e).unwrap_or(true))
        })
        .collect::<Result<Vec<bool>>>()?;
    Ok(table.filter_rows(&keep))
}
