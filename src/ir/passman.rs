//! # Pass Manager
//!
//! Optimization passes run per operation, once IR construction of the whole
//! unit has finished. The manager owns every registered pass together with
//! the tunable parameters the passes read, drives a pass over all operations
//! of a unit until it stops changing them, and exposes passes and parameters
//! as command line flags.

use std::str::FromStr;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, trace};

use super::construct::{CompilationUnit, Operation};

#[derive(Debug, Error)]
pub enum PassErrorKind {
    /// The pass could not transform an operation.
    #[error("pass failed")]
    Failed,

    #[error("unknown pass")]
    UnknownPass,
}

#[derive(Debug, Error)]
#[error("{kind} `{pass_name}`{location}: {err}")]
pub struct PassError {
    kind: PassErrorKind,
    pass_name: String,
    /// The operation being transformed, if the failure is tied to one.
    operation: Option<String>,
    /// The rendered operation suffix of the message.
    location: String,
    err: Box<dyn std::error::Error + Send + Sync>,
}

pub type PassResult<T> = Result<T, PassError>;

impl PassError {
    pub fn failed(pass_name: impl Into<String>, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            kind: PassErrorKind::Failed,
            pass_name: pass_name.into(),
            operation: None,
            location: String::new(),
            err: err.into(),
        }
    }

    pub fn unknown_pass(pass_name: impl Into<String>) -> Self {
        let pass_name = pass_name.into();
        Self {
            kind: PassErrorKind::UnknownPass,
            err: "not registered".into(),
            operation: None,
            location: String::new(),
            pass_name,
        }
    }

    /// Attach the operation that failed.
    pub fn on_operation(mut self, operation: impl Into<String>) -> Self {
        let operation = operation.into();
        self.location = format!(" on `{}`", operation);
        self.operation = Some(operation);
        self
    }

    pub fn kind(&self) -> &PassErrorKind { &self.kind }

    pub fn pass_name(&self) -> &str { &self.pass_name }

    pub fn operation(&self) -> Option<&str> { self.operation.as_deref() }
}

/// A transformation of a single operation.
///
/// Passes keep no state between operations beyond their configuration, so
/// one instance is reused across the whole unit.
pub trait OperationPass: Send {
    /// Read the pass's parameters before a run over a unit.
    fn configure(&mut self, _params: &PassParams) {}

    /// Transform `operation`, returning whether anything changed.
    fn transform(&mut self, operation: &mut Operation) -> PassResult<bool>;
}

/// A named parameter, kept as text the way it arrives from the command line.
#[derive(Debug, Clone)]
struct PassParam {
    default: String,
    value: String,
}

#[derive(Debug, Default)]
pub struct PassParams {
    params: FxHashMap<String, PassParam>,
}

impl PassParams {
    fn declare(&mut self, name: String, default: String) {
        self.params.insert(
            name,
            PassParam {
                value: default.clone(),
                default,
            },
        );
    }

    /// Unknown names are ignored.
    fn assign(&mut self, name: &str, value: String) {
        if let Some(param) = self.params.get_mut(name) {
            param.value = value;
        }
    }

    /// The current value of `name`, or `None` if it is unknown or does not
    /// parse as `T`.
    pub fn get<T: FromStr>(&self, name: &str) -> Option<T> {
        self.params
            .get(name)
            .and_then(|param| param.value.parse().ok())
    }

    /// Parameter names with their defaults, sorted by name.
    fn defaults(&self) -> Vec<(&str, &str)> {
        let mut defaults: Vec<_> = self
            .params
            .iter()
            .map(|(name, param)| (name.as_str(), param.default.as_str()))
            .collect();
        defaults.sort();
        defaults
    }
}

struct Registration {
    pass: Box<dyn OperationPass>,
    /// Passes run before this one in every iteration.
    requires: Vec<String>,
}

/// An ordered list of passes to run.
#[derive(Debug, Default, Clone)]
pub struct Pipeline {
    passes: Vec<String>,
}

impl Pipeline {
    pub fn add_pass(&mut self, name: impl Into<String>) { self.passes.push(name.into()); }

    pub fn passes(&self) -> &[String] { &self.passes }

    pub fn is_empty(&self) -> bool { self.passes.is_empty() }
}

#[derive(Default)]
pub struct PassManager {
    params: PassParams,
    passes: FxHashMap<String, Registration>,
}

impl PassManager {
    pub fn new() -> Self { Self::default() }

    pub fn add_parameter(&mut self, name: impl Into<String>, default: impl ToString) {
        self.params.declare(name.into(), default.to_string());
    }

    pub fn set_parameter<T: ToString>(&mut self, name: impl AsRef<str>, value: T) {
        self.params.assign(name.as_ref(), value.to_string());
    }

    pub fn parameters(&self) -> &PassParams { &self.params }

    /// Register `pass` under `name`. The passes named in `requires` run
    /// before it in every iteration and must be registered too.
    pub fn register<P: OperationPass + 'static>(&mut self, name: impl Into<String>, pass: P, requires: &[&str]) {
        self.passes.insert(
            name.into(),
            Registration {
                pass: Box::new(pass),
                requires: requires.iter().map(|name| name.to_string()).collect(),
            },
        );
    }

    fn pass_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.passes.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// Run the single pass `name` over every operation of `unit`.
    fn run_once(&mut self, name: &str, unit: &mut CompilationUnit) -> PassResult<bool> {
        let registration = self
            .passes
            .get_mut(name)
            .ok_or_else(|| PassError::unknown_pass(name))?;
        let pass = registration.pass.as_mut();
        pass.configure(&self.params);

        let mut changed = false;
        for construct in unit.constructs_mut() {
            for operation in construct.operations_mut() {
                let operation_changed = pass
                    .transform(operation)
                    .map_err(|err| err.on_operation(operation.name()))?;
                if operation_changed {
                    trace!(pass = name, operation = operation.name(), "changed");
                }
                changed |= operation_changed;
            }
        }
        Ok(changed)
    }

    /// Run the pass `name`, preceded by the passes it requires, until an
    /// iteration changes nothing or `max_iter` iterations have run.
    ///
    /// # Returns
    ///
    /// The number of iterations run, so `1` means the unit was already
    /// stable.
    pub fn run_transform(&mut self, name: impl AsRef<str>, unit: &mut CompilationUnit, max_iter: usize) -> PassResult<usize> {
        let name = name.as_ref();
        let requires = self
            .passes
            .get(name)
            .map(|registration| registration.requires.clone())
            .ok_or_else(|| PassError::unknown_pass(name))?;

        let mut iterations = 0;
        while iterations < max_iter {
            iterations += 1;
            let mut changed = false;
            for required in &requires {
                changed |= self.run_once(required, unit)?;
            }
            changed |= self.run_once(name, unit)?;
            if !changed {
                break;
            }
        }
        Ok(iterations)
    }

    /// Command line flags: one valued flag per parameter, then one counted
    /// flag per pass.
    pub fn get_cli_args(&self) -> Vec<clap::Arg> {
        let params = self.params.defaults().into_iter().map(|(name, default)| {
            clap::Arg::new(name.to_string())
                .long(name.to_string())
                .default_value(default.to_string())
        });
        let passes = self.pass_names().into_iter().map(|name| {
            clap::Arg::new(name.to_string())
                .long(name.to_string())
                .action(clap::ArgAction::Count)
        });
        params.chain(passes).collect()
    }

    /// Take parameter values from parsed flags and build the pipeline of
    /// the passes that were asked for, in name order.
    pub fn pipeline_from(&mut self, matches: &clap::ArgMatches) -> Pipeline {
        let values: Vec<(String, String)> = self
            .params
            .defaults()
            .into_iter()
            .filter_map(|(name, _)| {
                matches
                    .get_one::<String>(name)
                    .map(|value| (name.to_string(), value.clone()))
            })
            .collect();
        for (name, value) in values {
            self.params.assign(&name, value);
        }

        let mut pipeline = Pipeline::default();
        for name in self.pass_names() {
            if matches.get_count(name) > 0 {
                pipeline.add_pass(name);
            }
        }
        pipeline
    }

    /// Run the passes of `pipeline` in rounds, each pass up to
    /// `local_max_iter` iterations, until a round where no pass needed a
    /// second iteration or `max_rounds` rounds have run.
    pub fn run_pipeline(
        &mut self,
        unit: &mut CompilationUnit,
        pipeline: &Pipeline,
        local_max_iter: usize,
        max_rounds: usize,
    ) -> PassResult<usize> {
        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut unstable = false;
            for name in pipeline.passes() {
                let iterations = self.run_transform(name, unit, local_max_iter)?;
                debug!(pass = %name, iterations, round = rounds, "pipeline");
                unstable |= iterations > 1;
            }
            if !unstable || rounds >= max_rounds {
                break;
            }
        }
        Ok(rounds)
    }
}
