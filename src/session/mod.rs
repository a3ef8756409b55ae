//! Unit of work over a [`StatementExecutor`].
//!
//! A [`Session`] queues inserts, updates and removals and writes them on
//! [`Session::flush`]. Every statement is built before the first one is
//! executed, so a validation failure never leaves a partial write. Loaded
//! instances are kept as snapshots in an identity map; persisting a managed
//! instance again turns into an UPDATE of the members that changed.
//!
//! # Example
//!
//! ```
//! use keystone::test_helpers::{tenant_schema, MemoryExecutor};
//! use keystone::{reference, Assignments, Filter, Session};
//!
//! let graph = tenant_schema();
//! let mut session = Session::new(&graph, MemoryExecutor::new(&graph));
//!
//! session
//!     .create("Organisation", Assignments::new().with("id", 1).with("name", "acme"))
//!     .unwrap();
//! session
//!     .create(
//!         "Form",
//!         Assignments::new()
//!             .with_relation("org", reference("Organisation", 1))
//!             .with("id", 10)
//!             .with("name", "intake"),
//!     )
//!     .unwrap();
//! session.flush().unwrap();
//!
//! let form = session
//!     .find_one("Form", &Filter::eq("name", "intake"), "org")
//!     .unwrap()
//!     .unwrap();
//! assert!(form.related("org").is_some());
//! ```

pub mod populate;

pub use populate::Populate;

use crate::config::OrmConfig;
use crate::error::OrmError;
use crate::executor::{Row, StatementExecutor};
use crate::instance::{Assignment, Assignments, EntityInstance};
use crate::propagate::diff_with;
use crate::query::builder::QueryBuilder;
use crate::query::filter::Filter;
use crate::query::statement::{FindPlan, Statement};
use crate::reference::normalize::{entity_key, normalize_for};
use crate::reference::{Reference, RelationValue};
use crate::schema::def::{EntityDef, RelationDef, RelationKind};
use crate::schema::SchemaGraph;
use crate::value::KeyTuple;
use indexmap::IndexMap;
use populate::PopulateTree;
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// Rows affected by one [`Session::flush`], per statement kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

impl FlushSummary {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Insert,
    Update,
    Remove,
}

#[derive(Debug, Clone)]
struct Pending {
    operation: Operation,
    key: KeyTuple,
    instance: EntityInstance,
}

/// Unit of work bound to one schema and one executor
pub struct Session<'g, E> {
    builder: QueryBuilder<'g>,
    executor: E,
    pending: Vec<Pending>,
    /// Snapshots by [`identity_key`]
    identity: IndexMap<String, EntityInstance>,
}

impl<'g, E: StatementExecutor> Session<'g, E> {
    pub fn new(graph: &'g SchemaGraph, executor: E) -> Self {
        Self::from_builder(QueryBuilder::new(graph), executor)
    }

    pub fn with_config(graph: &'g SchemaGraph, executor: E, config: &OrmConfig) -> Self {
        Self::from_builder(QueryBuilder::with_config(graph, config), executor)
    }

    fn from_builder(builder: QueryBuilder<'g>, executor: E) -> Self {
        Self {
            builder,
            executor,
            pending: Vec::new(),
            identity: IndexMap::new(),
        }
    }

    pub fn graph(&self) -> &'g SchemaGraph {
        self.builder.graph()
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Number of queued operations
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Whether an instance with this key was loaded or flushed by this session
    pub fn is_managed(&self, entity: &str, key: &KeyTuple) -> bool {
        self.canonical_key(entity, key)
            .is_ok_and(|key| self.managed(entity, &key).is_some())
    }

    /// Drop queued operations and forget every managed instance
    pub fn clear(&mut self) {
        self.pending.clear();
        self.identity.clear();
    }

    /// Build a new instance and queue its INSERT
    pub fn create(
        &mut self,
        entity: &str,
        assignments: Assignments,
    ) -> Result<EntityInstance, OrmError> {
        let def = self.graph().entity(entity)?;
        let instance = EntityInstance::from_assignments(def.name.clone(), assignments);
        self.persist(&instance)?;
        Ok(instance)
    }

    /// Queue an INSERT, or an UPDATE when the instance is already managed
    pub fn persist(&mut self, instance: &EntityInstance) -> Result<(), OrmError> {
        let graph = self.graph();
        let def = graph.entity(instance.entity())?;
        let key = entity_key(graph, instance)?;

        let operation = match self.managed(&def.name, &key) {
            Some(snapshot) => {
                diff_with(&self.builder, snapshot, instance)?;
                Operation::Update
            }
            None => {
                self.builder.build_insert(&def.name, instance.values())?;
                Operation::Insert
            }
        };

        let queued = Pending {
            operation,
            key,
            instance: instance.clone(),
        };
        match self.position(&def.name, &queued.key) {
            Some(index) if self.pending[index].operation == Operation::Insert => {
                // still unflushed: the insert picks up the new values
                self.pending[index].instance = queued.instance;
            }
            Some(index) => self.pending[index] = queued,
            None => self.pending.push(queued),
        }
        Ok(())
    }

    /// Queue a DELETE of `instance`
    ///
    /// Removing an instance whose INSERT has not been flushed yet just drops
    /// the insert.
    pub fn remove(&mut self, instance: &EntityInstance) -> Result<(), OrmError> {
        let graph = self.graph();
        let def = graph.entity(instance.entity())?;
        let key = entity_key(graph, instance)?;
        self.builder.build_delete(&def.name, &key)?;

        match self.position(&def.name, &key) {
            Some(index) if self.pending[index].operation == Operation::Insert => {
                self.pending.remove(index);
            }
            Some(index) => {
                self.pending[index].operation = Operation::Remove;
            }
            None => self.pending.push(Pending {
                operation: Operation::Remove,
                key,
                instance: instance.clone(),
            }),
        }
        Ok(())
    }

    /// Write every queued operation
    ///
    /// Inserts run first in dependency order, then updates, then deletes in
    /// reverse dependency order. A storage failure stops the flush; operations
    /// that already ran are dropped from the queue, the rest stay queued.
    pub fn flush(&mut self) -> Result<FlushSummary, OrmError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::flush_span(self.pending.len()).entered();

        let graph = self.graph();
        let rank: HashMap<&str, usize> = graph
            .dependency_order()
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name, i))
            .collect();
        let rank_of = |p: &Pending| rank.get(p.instance.entity()).copied().unwrap_or(usize::MAX);

        let mut order: Vec<usize> = (0..self.pending.len()).collect();
        order.sort_by_key(|&i| {
            let p = &self.pending[i];
            match p.operation {
                Operation::Insert => (0, rank_of(p)),
                Operation::Update => (1, 0),
                Operation::Remove => (2, usize::MAX - rank_of(p)),
            }
        });

        let mut plan: Vec<(usize, Statement)> = Vec::with_capacity(order.len());
        for index in order {
            if let Some(statement) = self.statement_for(&self.pending[index])? {
                plan.push((index, statement));
            }
        }

        let mut summary = FlushSummary::default();
        let mut done: Vec<usize> = Vec::with_capacity(plan.len());
        let mut failure = None;
        for (index, statement) in &plan {
            log::debug!("Flushing {} {}", statement.kind(), statement.table());
            match self.run(statement) {
                Ok(affected) => {
                    match statement {
                        Statement::Insert { .. } => summary.inserted += affected,
                        Statement::Update { .. } => summary.updated += affected,
                        Statement::Delete { .. } => summary.deleted += affected,
                    }
                    done.push(*index);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        // updates whose diff came out empty need no statement
        let planned: Vec<usize> = plan.iter().map(|(i, _)| *i).collect();
        let pending = std::mem::take(&mut self.pending);
        for (index, queued) in pending.into_iter().enumerate() {
            if done.contains(&index) || !planned.contains(&index) {
                self.settle(queued);
            } else {
                self.pending.push(queued);
            }
        }

        if let Some(e) = failure {
            log::warn!("Flush stopped after {} statement(s): {e}", done.len());
            return Err(e);
        }
        log::info!(
            "Flushed {} statement(s): {} inserted, {} updated, {} deleted",
            plan.len(),
            summary.inserted,
            summary.updated,
            summary.deleted
        );
        Ok(summary)
    }

    /// Execute an INSERT immediately
    pub fn insert(&mut self, entity: &str, assignments: &Assignments) -> Result<u64, OrmError> {
        let statement = self.builder.insert_statement(entity, assignments)?;
        self.run(&statement)
    }

    /// Execute an UPDATE of the row identified by `key` immediately
    pub fn update(
        &mut self,
        entity: &str,
        key: impl Into<KeyTuple>,
        assignments: &Assignments,
    ) -> Result<u64, OrmError> {
        let key = self.canonical_key(entity, &key.into())?;
        let statement = self.builder.update_statement(entity, &key, assignments)?;
        let affected = self.run(&statement)?;
        let name = statement.entity().to_string();
        if let Some(snapshot) = self.managed_mut(&name, &key) {
            merge(snapshot, assignments);
        }
        Ok(affected)
    }

    /// Execute a DELETE of the row identified by `key` immediately
    pub fn delete(&mut self, entity: &str, key: impl Into<KeyTuple>) -> Result<u64, OrmError> {
        let key = self.canonical_key(entity, &key.into())?;
        let statement = self.builder.build_delete(entity, &key)?;
        let affected = self.run(&statement)?;
        let name = statement.entity().to_string();
        self.forget(&name, &key);
        Ok(affected)
    }

    /// Load every instance of `entity` matching `filter`
    pub fn find(
        &mut self,
        entity: &str,
        filter: &Filter,
        populate: impl Into<Populate>,
    ) -> Result<Vec<EntityInstance>, OrmError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::find_span(entity).entered();

        let plan = self.builder.build_find(entity, filter)?;
        self.load(plan, &populate.into())
    }

    /// First instance matching `filter`
    pub fn find_one(
        &mut self,
        entity: &str,
        filter: &Filter,
        populate: impl Into<Populate>,
    ) -> Result<Option<EntityInstance>, OrmError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::find_span(entity).entered();

        let mut plan = self.builder.build_find(entity, filter)?;
        plan.limit = Some(1);
        Ok(self.load(plan, &populate.into())?.into_iter().next())
    }

    /// Instance identified by a full primary key tuple
    pub fn find_by_key(
        &mut self,
        entity: &str,
        key: impl Into<KeyTuple>,
        populate: impl Into<Populate>,
    ) -> Result<Option<EntityInstance>, OrmError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::find_span(entity).entered();

        let filter = self.builder.build_key_filter(entity, &key.into())?;
        let (columns, values) = filter.into_parts();
        let mut plan = self
            .builder
            .build_find_in(entity, &columns, &[KeyTuple::new(values)])?;
        plan.limit = Some(1);
        Ok(self.load(plan, &populate.into())?.into_iter().next())
    }

    fn load(&mut self, plan: FindPlan, populate: &Populate) -> Result<Vec<EntityInstance>, OrmError> {
        let graph = self.graph();
        let def = graph.entity(&plan.entity)?;
        let tree = populate::expand(graph, def, populate)?;

        let mut instances = self.fetch(def, &plan)?;
        self.populate(def, &mut instances, &tree)?;
        log::debug!("Loaded {} {} instance(s)", instances.len(), def.name);
        Ok(instances)
    }

    /// Run a plan, hydrate the rows and register them as managed
    fn fetch(&mut self, def: &EntityDef, plan: &FindPlan) -> Result<Vec<EntityInstance>, OrmError> {
        let rows = self.executor.query(plan)?;
        let mut instances = Vec::with_capacity(rows.len());
        for row in &rows {
            let instance = hydrate(self.graph(), def, row)?;
            let key = entity_key(self.graph(), &instance)?;
            self.track(&def.name, key, instance.clone());
            instances.push(instance);
        }
        Ok(instances)
    }

    fn populate(
        &mut self,
        def: &EntityDef,
        instances: &mut [EntityInstance],
        tree: &PopulateTree,
    ) -> Result<(), OrmError> {
        if instances.is_empty() || tree.is_empty() {
            return Ok(());
        }
        let graph = self.graph();
        for (name, children) in tree.iter() {
            let relation = def
                .relation(name)
                .ok_or_else(|| OrmError::unknown_member(&def.name, name))?;
            let target = graph.entity(&relation.target)?;

            #[cfg(feature = "tracing")]
            let _span = tracing_helpers::populate_span(&def.name, name).entered();

            if relation.owner {
                self.populate_owning(def, relation, target, instances, children)?;
            } else {
                self.populate_inverse(def, relation, target, instances, children)?;
            }
        }
        Ok(())
    }

    /// Select-in load of to-one targets through the local foreign key
    fn populate_owning(
        &mut self,
        def: &EntityDef,
        relation: &RelationDef,
        target: &EntityDef,
        instances: &mut [EntityInstance],
        children: &PopulateTree,
    ) -> Result<(), OrmError> {
        let graph = self.graph();
        let mut keys: Vec<Option<KeyTuple>> = Vec::with_capacity(instances.len());
        let mut distinct: Vec<KeyTuple> = Vec::new();
        for instance in instances.iter() {
            let value = instance
                .relation_value(&relation.name)
                .unwrap_or(RelationValue::Unset);
            let key = normalize_for(graph, def, relation, &value)?;
            if key.is_null() {
                keys.push(None);
                continue;
            }
            if !distinct.contains(&key) {
                distinct.push(key.clone());
            }
            keys.push(Some(key));
        }
        if distinct.is_empty() {
            return Ok(());
        }

        let plan = self
            .builder
            .build_find_in(&target.name, target.key_columns().as_slice(), &distinct)?;
        let mut loaded = self.fetch(target, &plan)?;
        self.populate(target, &mut loaded, children)?;
        log::debug!(
            "Populated {}.{} with {} {} instance(s)",
            def.name,
            relation.name,
            loaded.len(),
            target.name
        );

        let loaded: Vec<(KeyTuple, EntityInstance)> = loaded
            .into_iter()
            .map(|t| entity_key(graph, &t).map(|k| (k, t)))
            .collect::<Result<_, _>>()?;
        for (instance, key) in instances.iter_mut().zip(keys) {
            let Some(key) = key else { continue };
            if let Some((_, found)) = loaded.iter().find(|(k, _)| *k == key) {
                instance.relate(relation.name.clone(), found.clone());
            }
        }
        Ok(())
    }

    /// Select-in load of inverse sides through the target's back reference
    fn populate_inverse(
        &mut self,
        def: &EntityDef,
        relation: &RelationDef,
        target: &EntityDef,
        instances: &mut [EntityInstance],
        children: &PopulateTree,
    ) -> Result<(), OrmError> {
        let graph = self.graph();
        let back = relation
            .mapped_by
            .as_deref()
            .and_then(|name| target.relation(name))
            .ok_or_else(|| OrmError::InvalidAssignment {
                entity: def.name.clone(),
                member: relation.name.clone(),
                reason: "inverse relation has no back reference".to_string(),
            })?;

        let keys: Vec<KeyTuple> = instances
            .iter()
            .map(|i| entity_key(graph, i))
            .collect::<Result<_, _>>()?;
        let columns: Vec<String> = back.columns.iter().map(str::to_string).collect();
        let plan = self.builder.build_find_in(&target.name, &columns, &keys)?;
        let mut loaded = self.fetch(target, &plan)?;
        self.populate(target, &mut loaded, children)?;
        log::debug!(
            "Populated {}.{} with {} {} instance(s)",
            def.name,
            relation.name,
            loaded.len(),
            target.name
        );

        let mut owners: Vec<KeyTuple> = Vec::with_capacity(loaded.len());
        for child in &loaded {
            let value = child
                .relation_value(&back.name)
                .unwrap_or(RelationValue::Unset);
            owners.push(normalize_for(graph, target, back, &value)?);
        }
        for (instance, key) in instances.iter_mut().zip(&keys) {
            let matched = loaded
                .iter()
                .zip(&owners)
                .filter(|(_, owner)| *owner == key)
                .map(|(child, _)| child.clone());
            if relation.kind == RelationKind::ToMany {
                let collection = instance.collection_mut(&relation.name);
                collection.clear();
                collection.extend(matched);
            } else {
                let value = matched
                    .into_iter()
                    .next()
                    .map_or(RelationValue::Null, RelationValue::from);
                instance.relate(relation.name.clone(), value);
            }
        }
        Ok(())
    }

    fn statement_for(&self, pending: &Pending) -> Result<Option<Statement>, OrmError> {
        let entity = pending.instance.entity();
        match pending.operation {
            Operation::Insert => self
                .builder
                .insert_statement(entity, pending.instance.values())
                .map(Some),
            Operation::Update => {
                let Some(snapshot) = self.managed(entity, &pending.key) else {
                    return self
                        .builder
                        .insert_statement(entity, pending.instance.values())
                        .map(Some);
                };
                let values = diff_with(&self.builder, snapshot, &pending.instance)?;
                if values.is_empty() {
                    return Ok(None);
                }
                let def = self.graph().entity(entity)?;
                Ok(Some(Statement::Update {
                    entity: def.name.clone(),
                    table: def.table.clone(),
                    values,
                    filter: self.builder.build_key_filter(entity, &pending.key)?,
                }))
            }
            Operation::Remove => self.builder.build_delete(entity, &pending.key).map(Some),
        }
    }

    fn run(&self, statement: &Statement) -> Result<u64, OrmError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_span(statement.kind(), statement.table()).entered();

        let affected = self.executor.execute(statement)?;
        log::debug!(
            "{} {} affected {affected} row(s)",
            statement.kind(),
            statement.table()
        );
        Ok(affected)
    }

    /// Apply a written operation to the identity map
    fn settle(&mut self, pending: Pending) {
        let entity = pending.instance.entity().to_string();
        match pending.operation {
            Operation::Insert => self.track(&entity, pending.key, pending.instance),
            Operation::Update => match self.managed_mut(&entity, &pending.key) {
                Some(snapshot) => merge(snapshot, pending.instance.values()),
                None => self.track(&entity, pending.key, pending.instance),
            },
            Operation::Remove => self.forget(&entity, &pending.key),
        }
    }

    /// Key values coerced to the key column types, as the identity map stores them
    fn canonical_key(&self, entity: &str, key: &KeyTuple) -> Result<KeyTuple, OrmError> {
        let (_, values) = self.builder.build_key_filter(entity, key)?.into_parts();
        Ok(KeyTuple::new(values))
    }

    fn track(&mut self, entity: &str, key: KeyTuple, snapshot: EntityInstance) {
        self.identity.insert(identity_key(entity, &key), snapshot);
    }

    fn forget(&mut self, entity: &str, key: &KeyTuple) {
        self.identity.shift_remove(&identity_key(entity, key));
    }

    fn managed(&self, entity: &str, key: &KeyTuple) -> Option<&EntityInstance> {
        self.identity.get(&identity_key(entity, key))
    }

    fn managed_mut(&mut self, entity: &str, key: &KeyTuple) -> Option<&mut EntityInstance> {
        self.identity.get_mut(&identity_key(entity, key))
    }

    fn position(&self, entity: &str, key: &KeyTuple) -> Option<usize> {
        self.pending
            .iter()
            .position(|p| p.instance.entity() == entity && &p.key == key)
    }
}

/// Identity map slot of an entity and its coerced key
fn identity_key(entity: &str, key: &KeyTuple) -> String {
    format!("{entity}{:?}", key.values())
}

/// Overlay `values` onto `snapshot`
fn merge(snapshot: &mut EntityInstance, values: &Assignments) {
    for (name, assignment) in values.iter() {
        match assignment {
            Assignment::Scalar(value) => snapshot.set(name, value.clone()),
            Assignment::Relation(value) => snapshot.relate(name, value.clone()),
        };
    }
}

/// Turn a stored row into an instance
///
/// Foreign key columns become a [`Reference`] to the target, or `Null` when
/// every column is null. A partially null foreign key fails with
/// [`OrmError::MalformedKey`].
fn hydrate(graph: &SchemaGraph, def: &EntityDef, row: &Row) -> Result<EntityInstance, OrmError> {
    let mut instance = EntityInstance::new(def.name.clone());
    for field in &def.fields {
        let value = row
            .get(&field.column)
            .cloned()
            .unwrap_or_else(|| field.scalar.null_value());
        instance.set(field.name.clone(), field.scalar.coerce(&field.column, value)?);
    }
    for relation in def.owning_relations() {
        let target = graph.entity(&relation.target)?;
        let mut values = Vec::with_capacity(relation.columns.arity());
        for (column, key_column) in relation.columns.iter().zip(&target.primary_key) {
            let value = row
                .get(column)
                .cloned()
                .unwrap_or_else(|| key_column.scalar.null_value());
            values.push(key_column.scalar.coerce(column, value)?);
        }
        let key = KeyTuple::new(values);
        let value = if key.is_null() {
            RelationValue::Null
        } else if key.is_partial() {
            return Err(OrmError::MalformedKey {
                entity: def.name.clone(),
                relation: relation.name.clone(),
            });
        } else {
            RelationValue::Reference(Reference::new(target.name.clone(), key))
        };
        instance.relate(relation.name.clone(), value);
    }
    Ok(instance)
}
