//! The Controller (`spec.md §4.4`): the public entry point that ties manifest
//! validation, topology construction, and run dispatch together.

use recipe_checkpoint::Snapshot;
use serde_json::Value;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::{RecipeError, Result};
use crate::event::EventStream;
use crate::model::Recipe;
use crate::runner::Runner;
use crate::topology::Topology;

/// Stateless orchestration facade. Holds nothing across calls; every
/// `execute_recipe` is independent, mirroring the teacher's compiled-graph
/// `invoke`/`stream` entry points that take all per-call state as arguments.
#[derive(Debug, Default, Clone, Copy)]
pub struct Controller;

impl Controller {
    pub fn new() -> Self {
        Self
    }

    /// Parses `manifest` via `context`'s [`crate::context::ManifestValidator`] into a
    /// [`Recipe`], builds and checks its [`Topology`], then hands off to a fresh
    /// [`Runner`] (`spec.md §4.4`).
    ///
    /// Returns an error synchronously if parsing or topology construction fails
    /// (`spec.md §7`: these never surface as stream events). Once the returned
    /// stream exists, every further failure is reported as a terminal `ERROR` event
    /// rather than a `Result::Err`.
    pub async fn execute_recipe(
        &self,
        manifest: Value,
        inputs: Value,
        context: ExecutionContext,
        snapshot: Option<Snapshot>,
    ) -> Result<EventStream> {
        let recipe = context
            .manifest_validator
            .parse(&manifest)
            .await
            .map_err(|e| RecipeError::ManifestInvalid(e.to_string()))?;

        let topology = Arc::new(Topology::build(&recipe)?);
        let runner = Runner::new();

        Ok(runner.run(topology, context, inputs, snapshot))
    }
}
