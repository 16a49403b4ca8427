//! # partitioned/scheduler
//!
//! executes a [`TaskGraph`] and returns the values of the requested keys.
//!
//! A task only starts once all of its dependencies are done; nothing else about the order is
//! guaranteed. The first failing task aborts the run and is reported as
//! [`SparsityError::Task`].

use std::{collections::HashMap, sync::Arc};

use rayon::prelude::*;

use super::graph::{Key, Task, TaskArg, TaskGraph, TaskValue};
use crate::{
    config::SparsityConfig,
    df::frame::SparseFrame,
    error::{Result, SparsityError},
    toolkit::array::AFloat,
};

pub trait Scheduler {
    fn get<T: AFloat>(&self, graph: &TaskGraph<T>, keys: &[Key]) -> Result<Vec<TaskValue<T>>>;
}

fn lookup<T: AFloat>(done: &HashMap<Key, TaskValue<T>>, key: &Key) -> Result<TaskValue<T>> {
    done.get(key)
        .cloned()
        .ok_or_else(|| SparsityError::key(format!("{} was not computed", key)))
}

fn execute<T: AFloat>(
    graph: &TaskGraph<T>,
    done: &HashMap<Key, TaskValue<T>>,
    key: &Key,
) -> Result<TaskValue<T>> {
    let task = graph
        .get(key)
        .ok_or_else(|| SparsityError::key(format!("{} is not in the graph", key)))?;
    let result = match task {
        Task::Literal(value) => Ok(Arc::clone(value)),
        Task::Alias(target) => lookup(done, target),
        Task::Call { op, args } => {
            tracing::trace!(%key, op = op.name(), "running task");
            args.iter()
                .map(|arg| match arg {
                    TaskArg::Key(dep) => lookup(done, dep),
                    TaskArg::Value(value) => Ok(Arc::clone(value)),
                })
                .collect::<Result<Vec<_>>>()
                .and_then(|inputs| {
                    let refs: Vec<&SparseFrame<T>> = inputs.iter().map(|v| v.as_ref()).collect();
                    op.call(&refs)
                })
                .map(Arc::new)
        }
    };
    result.map_err(|source| SparsityError::Task {
        key: key.clone(),
        source: Box::new(source),
    })
}

fn collect_outputs<T: AFloat>(
    done: &HashMap<Key, TaskValue<T>>,
    keys: &[Key],
) -> Result<Vec<TaskValue<T>>> {
    keys.iter().map(|key| lookup(done, key)).collect()
}

/// Runs every task on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncScheduler;

impl Scheduler for SyncScheduler {
    fn get<T: AFloat>(&self, graph: &TaskGraph<T>, keys: &[Key]) -> Result<Vec<TaskValue<T>>> {
        let graph = graph.cull(keys)?;
        let mut done = HashMap::with_capacity(graph.len());
        for key in graph.waves()?.into_iter().flatten() {
            let value = execute(&graph, &done, &key)?;
            done.insert(key, value);
        }
        collect_outputs(&done, keys)
    }
}

/// Runs the tasks of each dependency wave in parallel on a rayon pool.
#[derive(Debug, Clone, Copy)]
pub struct ThreadedScheduler {
    num_threads: usize,
}

impl Default for ThreadedScheduler {
    fn default() -> Self {
        Self::new(SparsityConfig::global().num_threads)
    }
}

impl ThreadedScheduler {
    /// `num_threads == 0` lets rayon decide.
    pub fn new(num_threads: usize) -> Self {
        Self { num_threads }
    }
}

impl Scheduler for ThreadedScheduler {
    fn get<T: AFloat>(&self, graph: &TaskGraph<T>, keys: &[Key]) -> Result<Vec<TaskValue<T>>> {
        let graph = graph.cull(keys)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .map_err(anyhow::Error::from)?;
        let mut done: HashMap<Key, TaskValue<T>> = HashMap::with_capacity(graph.len());
        for (i, wave) in graph.waves()?.into_iter().enumerate() {
            let _span = tracing::debug_span!("wave", i, ntasks = wave.len()).entered();
            let values = pool.install(|| {
                wave.par_iter()
                    .map(|key| execute(&graph, &done, key))
                    .collect::<Result<Vec<_>>>()
            })?;
            done.extend(wave.into_iter().zip(values));
        }
        collect_outputs(&done, keys)
    }
}
