//! Saga definitions: an ordered list of steps plus a retry policy.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SagaError};
use crate::step::SagaStep;

/// Default per-attempt timeout for retryable steps.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An immutable, named saga blueprint.
///
/// Steps are sorted by [`SagaStep::order`] once at build time (stable, so
/// equal keys keep registration order). `timeout` and `max_retries` only
/// apply to steps that opt into retries via [`SagaStep::retryable`].
#[derive(Clone)]
pub struct SagaDefinition {
    name: String,
    steps: Vec<Arc<dyn SagaStep>>,
    timeout: Duration,
    max_retries: u32,
}

impl SagaDefinition {
    /// Starts building a definition with the given name.
    pub fn builder(name: impl Into<String>) -> SagaDefinitionBuilder {
        SagaDefinitionBuilder {
            name: name.into(),
            steps: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: 0,
        }
    }

    /// Returns the saga name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the steps in execution order.
    pub fn steps(&self) -> &[Arc<dyn SagaStep>] {
        &self.steps
    }

    /// Returns the step at `index`.
    pub fn step(&self, index: usize) -> Option<&Arc<dyn SagaStep>> {
        self.steps.get(index)
    }

    /// Returns the number of steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Returns the step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Returns the per-attempt timeout for retryable steps.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the number of extra attempts allowed for retryable steps.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl std::fmt::Debug for SagaDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaDefinition")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Builder for [`SagaDefinition`].
pub struct SagaDefinitionBuilder {
    name: String,
    steps: Vec<Arc<dyn SagaStep>>,
    timeout: Duration,
    max_retries: u32,
}

impl SagaDefinitionBuilder {
    /// Appends a step.
    pub fn step(mut self, step: impl SagaStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Appends an already shared step.
    pub fn shared_step(mut self, step: Arc<dyn SagaStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Sets the per-attempt timeout for retryable steps.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the number of extra attempts for retryable steps.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Validates and builds the definition.
    pub fn build(mut self) -> Result<SagaDefinition> {
        if self.name.trim().is_empty() {
            return Err(SagaError::InvalidDefinition(
                "saga name must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name().is_empty() {
                return Err(SagaError::InvalidDefinition(format!(
                    "saga '{}' has a step with an empty name",
                    self.name
                )));
            }
            if !seen.insert(step.name().to_string()) {
                return Err(SagaError::InvalidDefinition(format!(
                    "saga '{}' has duplicate step '{}'",
                    self.name,
                    step.name()
                )));
            }
        }

        // sort_by_key is stable
        self.steps.sort_by_key(|s| s.order());

        Ok(SagaDefinition {
            name: self.name,
            steps: self.steps,
            timeout: self.timeout,
            max_retries: self.max_retries,
        })
    }
}
