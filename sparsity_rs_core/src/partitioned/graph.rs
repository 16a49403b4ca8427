//! # partitioned/graph
//!
//! a persistent task graph: named layers, each mapping a partition index to a [`Task`].
//!
//! Layers are shared behind [`Arc`]s, so `merge` and `cull` never copy (or mutate) the layers
//! of the graphs they start from. Layer names are content addressed (see [`layer_name`]), which
//! makes two layers with the same name interchangeable.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    fmt,
    sync::Arc,
};

use crate::{
    df::frame::SparseFrame,
    error::{Result, SparsityError},
    toolkit::{
        array::AFloat,
        hash::{tokenize, Tokenize},
    },
};

/// Address of one partition of one layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub name: String,
    pub index: usize,
}

impl Key {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "('{}', {})", self.name, self.index)
    }
}

/// `"{op}-{fingerprint}"` of an operation applied to `parts`.
pub fn layer_name(op: &str, parts: &[&dyn Tokenize]) -> String {
    let mut all: Vec<&dyn Tokenize> = Vec::with_capacity(parts.len() + 1);
    let op_token: &dyn Tokenize = &op;
    all.push(op_token);
    all.extend_from_slice(parts);
    format!("{}-{}", op, tokenize(&all))
}

pub type TaskValue<T> = Arc<SparseFrame<T>>;

type PartitionFn<T> = dyn Fn(&[&SparseFrame<T>]) -> Result<SparseFrame<T>> + Send + Sync;

/// A named function over the frames a task depends on.
#[derive(Clone)]
pub struct PartitionOp<T: AFloat> {
    name: String,
    func: Arc<PartitionFn<T>>,
}

impl<T: AFloat> PartitionOp<T> {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[&SparseFrame<T>]) -> Result<SparseFrame<T>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[&SparseFrame<T>]) -> Result<SparseFrame<T>> {
        (self.func)(args)
    }
}

impl<T: AFloat> fmt::Debug for PartitionOp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PartitionOp").field(&self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub enum TaskArg<T: AFloat> {
    Key(Key),
    Value(TaskValue<T>),
}

#[derive(Debug, Clone)]
pub enum Task<T: AFloat> {
    Literal(TaskValue<T>),
    Alias(Key),
    Call {
        op: PartitionOp<T>,
        args: Vec<TaskArg<T>>,
    },
}

impl<T: AFloat> Task<T> {
    pub fn literal(frame: SparseFrame<T>) -> Self {
        Task::Literal(Arc::new(frame))
    }

    /// A call whose arguments are all graph keys.
    pub fn call(op: PartitionOp<T>, keys: impl IntoIterator<Item = Key>) -> Self {
        Task::Call {
            op,
            args: keys.into_iter().map(TaskArg::Key).collect(),
        }
    }

    pub fn dependencies(&self) -> Vec<&Key> {
        match self {
            Task::Literal(_) => Vec::new(),
            Task::Alias(key) => vec![key],
            Task::Call { args, .. } => args
                .iter()
                .filter_map(|arg| match arg {
                    TaskArg::Key(key) => Some(key),
                    TaskArg::Value(_) => None,
                })
                .collect(),
        }
    }
}

pub type Layer<T> = BTreeMap<usize, Task<T>>;

#[derive(Debug, Clone)]
pub struct TaskGraph<T: AFloat> {
    layers: BTreeMap<String, Arc<Layer<T>>>,
}

impl<T: AFloat> Default for TaskGraph<T> {
    fn default() -> Self {
        Self {
            layers: BTreeMap::new(),
        }
    }
}

impl<T: AFloat> TaskGraph<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new graph holding every layer of `self` plus `layer` under `name`.
    pub fn with_layer(&self, name: impl Into<String>, layer: Layer<T>) -> Self {
        let mut layers = self.layers.clone();
        layers.insert(name.into(), Arc::new(layer));
        Self { layers }
    }

    /// Union of the layers of `graphs`.
    pub fn merge<'a>(graphs: impl IntoIterator<Item = &'a TaskGraph<T>>) -> Self {
        let mut layers = BTreeMap::new();
        for graph in graphs {
            for (name, layer) in graph.layers.iter() {
                layers
                    .entry(name.clone())
                    .or_insert_with(|| Arc::clone(layer));
            }
        }
        Self { layers }
    }

    pub fn get(&self, key: &Key) -> Option<&Task<T>> {
        self.layers.get(&key.name)?.get(&key.index)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.get(key).is_some()
    }

    pub fn layer(&self, name: &str) -> Option<&Layer<T>> {
        self.layers.get(name).map(|layer| layer.as_ref())
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.layers.values().map(|layer| layer.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<Key> {
        self.layers
            .iter()
            .flat_map(|(name, layer)| layer.keys().map(|&i| Key::new(name.clone(), i)))
            .collect()
    }

    /// The sub-graph needed to produce `keys`.
    ///
    /// Layers that survive untouched are shared with `self`.
    pub fn cull(&self, keys: &[Key]) -> Result<Self> {
        let mut seen: BTreeSet<Key> = BTreeSet::new();
        let mut stack: Vec<Key> = keys.to_vec();
        while let Some(key) = stack.pop() {
            if seen.contains(&key) {
                continue;
            }
            let task = self
                .get(&key)
                .ok_or_else(|| SparsityError::key(format!("{} is not in the graph", key)))?;
            stack.extend(task.dependencies().into_iter().cloned());
            seen.insert(key);
        }
        let mut layers = BTreeMap::new();
        for (name, layer) in self.layers.iter() {
            let kept: Layer<T> = layer
                .iter()
                .filter(|&(&i, _)| seen.contains(&Key::new(name.clone(), i)))
                .map(|(&i, task)| (i, task.clone()))
                .collect();
            if kept.is_empty() {
                continue;
            }
            let shared = if kept.len() == layer.len() {
                Arc::clone(layer)
            } else {
                Arc::new(kept)
            };
            layers.insert(name.clone(), shared);
        }
        let culled = Self { layers };
        tracing::debug!(
            kept = culled.len(),
            dropped = self.len() - culled.len(),
            "culled task graph"
        );
        Ok(culled)
    }

    /// Keys grouped into waves: every task only depends on tasks of earlier waves.
    pub fn waves(&self) -> Result<Vec<Vec<Key>>> {
        let keys = self.keys();
        let mut pending: HashMap<&Key, usize> = HashMap::with_capacity(keys.len());
        let mut dependents: HashMap<&Key, Vec<&Key>> = HashMap::new();
        for key in keys.iter() {
            let Some(task) = self.get(key) else {
                continue;
            };
            let deps = task.dependencies();
            for dep in deps.iter() {
                if !self.contains(dep) {
                    return Err(SparsityError::key(format!(
                        "{} depends on {}, which is not in the graph",
                        key, dep
                    )));
                }
                dependents.entry(*dep).or_default().push(key);
            }
            pending.insert(key, deps.len());
        }
        let mut queue: VecDeque<&Key> = keys.iter().filter(|k| pending[k] == 0).collect();
        let mut waves = Vec::new();
        let mut visited = 0;
        while !queue.is_empty() {
            let wave: Vec<&Key> = queue.drain(..).collect();
            visited += wave.len();
            for key in wave.iter() {
                for dependent in dependents.get(key).into_iter().flatten() {
                    if let Some(count) = pending.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            queue.push_back(*dependent);
                        }
                    }
                }
            }
            waves.push(wave.into_iter().cloned().collect());
        }
        if visited != keys.len() {
            return Err(SparsityError::value("task graph contains a cycle"));
        }
        Ok(waves)
    }
}
