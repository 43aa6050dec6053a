//! Constraint Resolution Engine.
//!
//! Entities carry named [`Constraint`]s. Each name maps to a [`Resolver`] in
//! a [`ConstraintRegistry`] owned by the engine. [`ConstraintEngine::resolve_all`]
//! walks the page depth-first, runs every constraint of every entity, and
//! repeats the walk while anything changed, up to `max_iterations` passes.
//!
//! Resolvers emit follow-on mutations into the same live transaction, so
//! their effects are undone and replicated together with the edit that
//! triggered them. A failing resolver is logged and skipped. Running out of
//! iterations is logged and the graph is left as computed.

use crate::entity::Constraint;
use crate::error::GraphError;
use crate::id::EntityId;
use crate::transaction::Txn;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors a resolver can report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("Constraint '{name}' failed on {entity}: {message}")]
    Failed {
        name: String,
        entity: EntityId,
        message: String,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Re-derives an entity's dependent state for one constraint.
///
/// Returns whether it changed anything. `C` is the caller's render context
/// (measurement, geometry lookups, ...).
pub trait Resolver<C: ?Sized>: Send + Sync {
    fn resolve(
        &self,
        txn: &mut Txn<'_>,
        page: &EntityId,
        entity: &EntityId,
        context: &C,
        constraint: &Constraint,
    ) -> Result<bool, ResolveError>;
}

impl<C: ?Sized, F> Resolver<C> for F
where
    F: Fn(&mut Txn<'_>, &EntityId, &EntityId, &C, &Constraint) -> Result<bool, ResolveError>
        + Send
        + Sync,
{
    fn resolve(
        &self,
        txn: &mut Txn<'_>,
        page: &EntityId,
        entity: &EntityId,
        context: &C,
        constraint: &Constraint,
    ) -> Result<bool, ResolveError> {
        self(txn, page, entity, context, constraint)
    }
}

/// Name to resolver mapping.
pub struct ConstraintRegistry<C: ?Sized = ()> {
    resolvers: HashMap<String, Box<dyn Resolver<C>>>,
}

impl<C: ?Sized> ConstraintRegistry<C> {
    pub fn new() -> Self {
        Self {
            resolvers: HashMap::new(),
        }
    }

    /// Register a resolver under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, resolver: impl Resolver<C> + 'static) {
        self.resolvers.insert(name.into(), Box::new(resolver));
    }

    /// Register a closure resolver.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, resolver: F)
    where
        F: Fn(&mut Txn<'_>, &EntityId, &EntityId, &C, &Constraint) -> Result<bool, ResolveError>
            + Send
            + Sync
            + 'static,
    {
        self.resolvers.insert(name.into(), Box::new(resolver));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Resolver<C>> {
        self.resolvers.get(name).map(|r| r.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl<C: ?Sized> Default for ConstraintRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of [`ConstraintEngine::resolve_all`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// Passes performed.
    pub iterations: usize,
    /// Whether any pass changed anything.
    pub changed: bool,
    /// Whether the last pass was quiet.
    pub converged: bool,
}

/// Default cap on full passes.
pub const DEFAULT_MAX_ITERATIONS: usize = 3;

/// Bounded fixpoint iteration over a page's constraints.
pub struct ConstraintEngine<C: ?Sized = ()> {
    registry: ConstraintRegistry<C>,
    max_iterations: usize,
}

impl<C: ?Sized> ConstraintEngine<C> {
    pub fn new(registry: ConstraintRegistry<C>) -> Self {
        Self {
            registry,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn registry(&self) -> &ConstraintRegistry<C> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ConstraintRegistry<C> {
        &mut self.registry
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Run every constraint under `page` until a pass changes nothing or
    /// `max_iterations` passes have run.
    pub fn resolve_all(&self, txn: &mut Txn<'_>, page: &EntityId, context: &C) -> Resolution {
        let mut changed = false;

        for iteration in 1..=self.max_iterations {
            if !self.resolve_pass(txn, page, context) {
                return Resolution {
                    iterations: iteration,
                    changed,
                    converged: true,
                };
            }
            changed = true;
        }

        warn!(
            page = %page,
            iterations = self.max_iterations,
            "constraints did not reach a fixpoint"
        );
        Resolution {
            iterations: self.max_iterations,
            changed,
            converged: false,
        }
    }

    /// One full depth-first pass. Returns whether anything changed.
    fn resolve_pass(&self, txn: &mut Txn<'_>, page: &EntityId, context: &C) -> bool {
        let targets: Vec<(EntityId, Vec<Constraint>)> = txn
            .store()
            .traverse(page)
            .filter(|e| !e.constraints().is_empty())
            .map(|e| (e.id().clone(), e.constraints().to_vec()))
            .collect();

        let mut changed = false;
        for (entity, constraints) in targets {
            for constraint in &constraints {
                // An earlier resolver may have deleted it
                if !txn.store().contains(&entity) {
                    break;
                }
                let Some(resolver) = self.registry.get(&constraint.name) else {
                    debug!(entity = %entity, constraint = %constraint.name, "no resolver registered");
                    continue;
                };
                match resolver.resolve(txn, page, &entity, context, constraint) {
                    Ok(true) => changed = true,
                    Ok(false) => {}
                    Err(err) => {
                        warn!(
                            entity = %entity,
                            constraint = %constraint.name,
                            error = %err,
                            "constraint resolver failed"
                        );
                    }
                }
            }
        }
        changed
    }
}
