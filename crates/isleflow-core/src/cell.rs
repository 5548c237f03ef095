//! Reactive cell graph: dependency-tracked derived values with lazy,
//! pull-based recomputation.
//!
//! A **source cell** holds a value written from outside. A **derived cell**
//! holds a [`Formula`] over other cells. Writing a source marks every
//! transitive dependent dirty but recomputes nothing; a dirty derived cell
//! re-evaluates on its next read, records the cells it read as its new
//! dependencies, and caches the result.
//!
//! Writes made through [`CellGraph::write_deferred_rate`] inside a
//! [`begin_batch`](CellGraph::begin_batch) / [`end_batch`](CellGraph::end_batch)
//! region are coalesced: only the last value per cell is applied, once,
//! when the outermost batch ends.
//!
//! Formulas only receive a [`Reader`], so a derived cell can never write.
//! A cell that is read while it is itself being evaluated is a
//! [`CellError::Reentrancy`]: the read yields the cached value, and every
//! evaluation on the path back to that cell is discarded. Those cells keep
//! their previous cached value and stay dirty.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use slotmap::SlotMap;
use tracing::{error, trace};

use crate::fixed::Fixed64;
use crate::id::CellId;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors surfaced by checked cell reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CellError {
    #[error("cycle detected: cell {0:?} was read while being evaluated")]
    Reentrancy(CellId),
    #[error("cell not found: {0:?}")]
    Missing(CellId),
    #[error("cell {0:?} is derived and cannot be written")]
    NotSource(CellId),
}

// ---------------------------------------------------------------------------
// Values and typed handles
// ---------------------------------------------------------------------------

/// The value stored in a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Rate(Fixed64),
    Flag(bool),
}

impl Value {
    /// The rate held by this value, zero for flags.
    pub fn as_rate(self) -> Fixed64 {
        match self {
            Value::Rate(v) => v,
            Value::Flag(_) => Fixed64::ZERO,
        }
    }

    /// The flag held by this value, false for rates.
    pub fn as_flag(self) -> bool {
        match self {
            Value::Flag(b) => b,
            Value::Rate(_) => false,
        }
    }
}

/// Handle to a cell holding a [`Fixed64`] rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RateCell(CellId);

impl RateCell {
    pub fn id(self) -> CellId {
        self.0
    }
}

/// Handle to a cell holding a boolean flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlagCell(CellId);

impl FlagCell {
    pub fn id(self) -> CellId {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Formulas
// ---------------------------------------------------------------------------

/// Closure evaluated by a derived cell.
pub type ComputeFn = Rc<dyn Fn(&mut Reader<'_>) -> Value>;

/// How a cell obtains its value.
#[derive(Clone)]
pub enum Formula {
    /// Externally written.
    Source,
    /// Arbitrary read-only computation over other cells.
    Compute(ComputeFn),
    /// Sum of a mutable list of rate cells. Terms are added and removed
    /// structurally without rebuilding a closure.
    Sum(Vec<CellId>),
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Source => write!(f, "Source"),
            Formula::Compute(_) => write!(f, "Compute(..)"),
            Formula::Sum(terms) => write!(f, "Sum({} terms)", terms.len()),
        }
    }
}

#[derive(Debug)]
struct CellNode {
    label: &'static str,
    value: Value,
    formula: Formula,
    dirty: bool,
    evaluating: bool,
    /// Left dirty by an aborted evaluation while dependents may still hold
    /// values read from it.
    stale: bool,
    dependencies: Vec<CellId>,
    dependents: BTreeSet<CellId>,
    pending: Option<Value>,
}

impl CellNode {
    fn new(label: &'static str, value: Value, formula: Formula) -> Self {
        let dirty = !matches!(formula, Formula::Source);
        Self {
            label,
            value,
            formula,
            dirty,
            evaluating: false,
            stale: false,
            dependencies: Vec::new(),
            dependents: BTreeSet::new(),
            pending: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Read access handed to formulas. Every read is recorded as a dependency
/// of the cell being evaluated.
pub struct Reader<'g> {
    graph: &'g mut CellGraph,
    reads: Vec<CellId>,
}

impl Reader<'_> {
    pub fn rate(&mut self, cell: RateCell) -> Fixed64 {
        self.read(cell.0).as_rate()
    }

    pub fn flag(&mut self, cell: FlagCell) -> bool {
        self.read(cell.0).as_flag()
    }

    fn read(&mut self, id: CellId) -> Value {
        if !self.reads.contains(&id) {
            self.reads.push(id);
        }
        self.graph.read_value(id)
    }
}

// ---------------------------------------------------------------------------
// CellGraph
// ---------------------------------------------------------------------------

/// Arena of cells with dependency edges, dirty flags and batching.
#[derive(Debug, Default)]
pub struct CellGraph {
    cells: SlotMap<CellId, CellNode>,
    batch_depth: u32,
    deferred: Vec<CellId>,
    /// Cells currently being evaluated, outermost first.
    evaluating: Vec<CellId>,
    /// Evaluations in progress that read a stale value through a reentrant
    /// read and must be discarded.
    aborted: BTreeSet<CellId>,
    evaluations: u64,
    writes: u64,
}

impl CellGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -- construction -------------------------------------------------------

    pub fn source_rate(&mut self, label: &'static str, value: Fixed64) -> RateCell {
        RateCell(self.insert(label, Value::Rate(value), Formula::Source))
    }

    pub fn source_flag(&mut self, label: &'static str, value: bool) -> FlagCell {
        FlagCell(self.insert(label, Value::Flag(value), Formula::Source))
    }

    pub fn derived_rate<F>(&mut self, label: &'static str, f: F) -> RateCell
    where
        F: Fn(&mut Reader<'_>) -> Fixed64 + 'static,
    {
        let compute: ComputeFn = Rc::new(move |r: &mut Reader<'_>| Value::Rate(f(r)));
        RateCell(self.insert(label, Value::Rate(Fixed64::ZERO), Formula::Compute(compute)))
    }

    pub fn derived_flag<F>(&mut self, label: &'static str, f: F) -> FlagCell
    where
        F: Fn(&mut Reader<'_>) -> bool + 'static,
    {
        let compute: ComputeFn = Rc::new(move |r: &mut Reader<'_>| Value::Flag(f(r)));
        FlagCell(self.insert(label, Value::Flag(false), Formula::Compute(compute)))
    }

    /// A derived cell holding the sum of `terms`.
    pub fn sum(&mut self, label: &'static str, terms: Vec<RateCell>) -> RateCell {
        let terms = terms.into_iter().map(RateCell::id).collect();
        RateCell(self.insert(label, Value::Rate(Fixed64::ZERO), Formula::Sum(terms)))
    }

    fn insert(&mut self, label: &'static str, value: Value, formula: Formula) -> CellId {
        self.cells.insert(CellNode::new(label, value, formula))
    }

    /// Add a term to a sum cell. No-op for non-sum cells or duplicate terms.
    pub fn add_term(&mut self, sum: RateCell, term: RateCell) {
        let Some(node) = self.cells.get_mut(sum.0) else {
            return;
        };
        if let Formula::Sum(terms) = &mut node.formula
            && !terms.contains(&term.0)
        {
            terms.push(term.0);
            self.invalidate(sum.0);
        }
    }

    /// Remove a term from a sum cell.
    pub fn remove_term(&mut self, sum: RateCell, term: RateCell) {
        let Some(node) = self.cells.get_mut(sum.0) else {
            return;
        };
        if let Formula::Sum(terms) = &mut node.formula {
            let before = terms.len();
            terms.retain(|t| *t != term.0);
            if terms.len() != before {
                self.invalidate(sum.0);
            }
        }
    }

    /// Remove a cell. Its dependents are marked dirty and will read zero
    /// for it from now on.
    pub fn remove(&mut self, id: CellId) {
        let Some(node) = self.cells.remove(id) else {
            return;
        };
        for dep in node.dependencies {
            if let Some(d) = self.cells.get_mut(dep) {
                d.dependents.remove(&id);
            }
        }
        for dependent in node.dependents {
            self.invalidate(dependent);
        }
        self.deferred.retain(|d| *d != id);
    }

    // -- reads --------------------------------------------------------------

    /// Read a rate, recomputing if dirty. Reentrancy is logged and the
    /// cached value returned.
    pub fn rate(&mut self, cell: RateCell) -> Fixed64 {
        self.read_value(cell.0).as_rate()
    }

    /// Read a flag, recomputing if dirty.
    pub fn flag(&mut self, cell: FlagCell) -> bool {
        self.read_value(cell.0).as_flag()
    }

    /// Read a rate, surfacing reentrancy and missing cells as errors.
    pub fn try_rate(&mut self, cell: RateCell) -> Result<Fixed64, CellError> {
        self.try_value(cell.0).map(Value::as_rate)
    }

    /// Read a flag, surfacing reentrancy and missing cells as errors.
    pub fn try_flag(&mut self, cell: FlagCell) -> Result<bool, CellError> {
        self.try_value(cell.0).map(Value::as_flag)
    }

    fn try_value(&mut self, id: CellId) -> Result<Value, CellError> {
        let node = self.cells.get(id).ok_or(CellError::Missing(id))?;
        if !node.dirty {
            return Ok(node.value);
        }
        if node.evaluating {
            return Err(CellError::Reentrancy(id));
        }
        self.evaluate(id)
    }

    fn read_value(&mut self, id: CellId) -> Value {
        let Some(node) = self.cells.get(id) else {
            trace!(cell = ?id, "read of removed cell yields zero");
            return Value::Rate(Fixed64::ZERO);
        };
        if !node.dirty {
            return node.value;
        }
        if node.evaluating {
            error!(cell = ?id, label = node.label, "cycle detected: cell read during its own evaluation");
            let cached = node.value;
            if let Some(pos) = self.evaluating.iter().position(|c| *c == id) {
                self.aborted.extend(self.evaluating[pos..].iter().copied());
            }
            return cached;
        }
        match self.evaluate(id) {
            Ok(v) => v,
            Err(e) => {
                error!(cell = ?id, error = %e, "evaluation aborted, keeping cached value");
                self.cells.get(id).map(|n| n.value).unwrap_or(Value::Rate(Fixed64::ZERO))
            }
        }
    }

    fn evaluate(&mut self, id: CellId) -> Result<Value, CellError> {
        let node = self.cells.get_mut(id).ok_or(CellError::Missing(id))?;
        let formula = node.formula.clone();
        if matches!(formula, Formula::Source) {
            node.dirty = false;
            return Ok(node.value);
        }
        node.evaluating = true;
        self.evaluating.push(id);
        let old_deps = std::mem::take(&mut node.dependencies);
        for dep in old_deps {
            if let Some(d) = self.cells.get_mut(dep) {
                d.dependents.remove(&id);
            }
        }

        let mut reader = Reader {
            graph: self,
            reads: Vec::new(),
        };
        let value = match &formula {
            Formula::Compute(f) => f(&mut reader),
            Formula::Sum(terms) => {
                let mut total = Fixed64::ZERO;
                for term in terms {
                    total = total.saturating_add(reader.read(*term).as_rate());
                }
                Value::Rate(total)
            }
            Formula::Source => unreachable!("sources return before evaluation"),
        };
        let reads = reader.reads;
        self.evaluations += 1;
        self.evaluating.pop();

        for dep in &reads {
            if let Some(d) = self.cells.get_mut(*dep) {
                d.dependents.insert(id);
            }
        }
        let node = self.cells.get_mut(id).ok_or(CellError::Missing(id))?;
        node.dependencies = reads;
        node.evaluating = false;
        if self.aborted.remove(&id) {
            node.stale = true;
            return Err(CellError::Reentrancy(id));
        }
        node.dirty = false;
        node.stale = false;
        node.value = value;
        Ok(value)
    }

    // -- writes -------------------------------------------------------------

    /// Write a source rate. Returns `true` if the stored value changed.
    pub fn set_rate(&mut self, cell: RateCell, value: Fixed64) -> bool {
        self.write(cell.0, Value::Rate(value)).unwrap_or(false)
    }

    /// Write a source flag. Returns `true` if the stored value changed.
    pub fn set_flag(&mut self, cell: FlagCell, value: bool) -> bool {
        self.write(cell.0, Value::Flag(value)).unwrap_or(false)
    }

    /// Write a source value, reporting non-source or missing cells.
    pub fn write(&mut self, id: CellId, value: Value) -> Result<bool, CellError> {
        let node = self.cells.get_mut(id).ok_or(CellError::Missing(id))?;
        if !matches!(node.formula, Formula::Source) {
            return Err(CellError::NotSource(id));
        }
        if node.value == value {
            return Ok(false);
        }
        node.value = value;
        self.writes += 1;
        let dependents: Vec<CellId> = node.dependents.iter().copied().collect();
        for d in dependents {
            self.invalidate(d);
        }
        Ok(true)
    }

    /// Write a source rate through the batch queue. Outside a batch this is
    /// a plain write.
    pub fn write_deferred_rate(&mut self, cell: RateCell, value: Fixed64) -> bool {
        if self.batch_depth == 0 {
            return self.set_rate(cell, value);
        }
        let Some(node) = self.cells.get_mut(cell.0) else {
            return false;
        };
        node.pending = Some(Value::Rate(value));
        if !self.deferred.contains(&cell.0) {
            self.deferred.push(cell.0);
        }
        true
    }

    /// Mark a cell and all transitive dependents dirty. A dirty cell's
    /// dependents are already dirty unless the cell is stale.
    fn invalidate(&mut self, id: CellId) {
        let mut stack = vec![id];
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            let Some(node) = self.cells.get_mut(current) else {
                continue;
            };
            if matches!(node.formula, Formula::Source) {
                // Sources only forward invalidation.
                stack.extend(node.dependents.iter().copied());
                continue;
            }
            if node.dirty && !node.stale && current != id {
                continue;
            }
            node.dirty = true;
            stack.extend(node.dependents.iter().copied());
        }
    }

    // -- batching -----------------------------------------------------------

    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    /// End a batch. When the outermost batch ends every deferred cell is
    /// written once with its last pending value. Returns the number of
    /// cells whose value changed.
    pub fn end_batch(&mut self) -> usize {
        self.batch_depth = self.batch_depth.saturating_sub(1);
        if self.batch_depth > 0 {
            return 0;
        }
        let mut changed = 0;
        for id in std::mem::take(&mut self.deferred) {
            let pending = self.cells.get_mut(id).and_then(|n| n.pending.take());
            if let Some(value) = pending
                && self.write(id, value).unwrap_or(false)
            {
                changed += 1;
            }
        }
        changed
    }

    pub fn in_batch(&self) -> bool {
        self.batch_depth > 0
    }

    // -- introspection ------------------------------------------------------

    pub fn is_dirty(&self, id: CellId) -> bool {
        self.cells.get(id).is_some_and(|n| n.dirty)
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.cells.contains_key(id)
    }

    pub fn label(&self, id: CellId) -> Option<&'static str> {
        self.cells.get(id).map(|n| n.label)
    }

    /// Cells the given cell read during its last evaluation.
    pub fn dependencies(&self, id: CellId) -> &[CellId] {
        self.cells
            .get(id)
            .map(|n| n.dependencies.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Total number of derived-cell evaluations so far.
    pub fn evaluation_count(&self) -> u64 {
        self.evaluations
    }

    /// Total number of source writes that changed a value.
    pub fn write_count(&self) -> u64 {
        self.writes
    }
}
