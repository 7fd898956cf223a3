//! Synchronization counting.
//!
//! Instructions are arranged into a loop tree following kernel order and
//! their sequential axes. The tree is simulated once, tracking the accesses
//! made since the last barrier; a barrier is placed wherever a new access
//! would race with one of them, and loop back edges are checked the same way.

use std::collections::{BTreeMap, BTreeSet};

use tally_ir::{Expr, Instruction, Kernel, MemScope};
use tally_poly::PwQPoly;

use crate::count_map::CountMap;
use crate::domain::DomainCounter;
use crate::error::*;
use crate::key::SyncKind;

// ============================================================================
// SCHEDULE TREE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Insn(usize),
    Loop { axis: String, body: Vec<Node> },
}

/// Loop axes around `insn`: its own and reduction axes that are sequential or
/// unrolled, in declaration order.
fn loop_axes<'k>(kernel: &'k Kernel, insn: &Instruction) -> Vec<&'k str> {
    let reductions = insn.expression().reduction_axes();
    kernel
        .axes()
        .iter()
        .filter(|axis| insn.is_within(axis) || reductions.contains(*axis))
        .filter(|axis| kernel.role(axis).is_loop())
        .map(String::as_str)
        .collect()
}

/// Nests instructions under their loops, sharing loops between neighbours
/// whose loop prefixes agree.
pub fn schedule(kernel: &Kernel) -> Vec<Node> {
    // open loops, innermost last, each with the body gathered so far
    let mut stack: Vec<(String, Vec<Node>)> = Vec::new();
    let mut root = Vec::new();

    fn close(stack: &mut Vec<(String, Vec<Node>)>, root: &mut Vec<Node>) {
        if let Some((axis, body)) = stack.pop() {
            let node = Node::Loop { axis, body };
            match stack.last_mut() {
                Some((_, parent)) => parent.push(node),
                None => root.push(node),
            }
        }
    }

    for (position, insn) in kernel.instructions().iter().enumerate() {
        let loops = loop_axes(kernel, insn);
        let shared = stack.iter().zip(&loops).take_while(|((open, _), axis)| open == *axis).count();
        while stack.len() > shared {
            close(&mut stack, &mut root);
        }
        for axis in &loops[shared..] {
            stack.push((axis.to_string(), Vec::new()));
        }
        match stack.last_mut() {
            Some((_, body)) => body.push(Node::Insn(position)),
            None => root.push(Node::Insn(position)),
        }
    }
    while !stack.is_empty() {
        close(&mut stack, &mut root);
    }
    root
}

// ============================================================================
// ACCESSES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Access {
    insn: usize,
    variable: String,
    write: bool,
    index: Vec<Expr>,
}

fn accesses_of(insn_index: usize, insn: &Instruction) -> Vec<Access> {
    let mut out = Vec::new();
    let mut reads = |expr: &Expr| {
        expr.walk(&mut |e| {
            if let Expr::Subscript { array, index } = e {
                out.push(Access { insn: insn_index, variable: array.clone(), write: false, index: index.clone() });
            }
        })
    };
    reads(insn.expression());
    insn.predicates().iter().for_each(&mut reads);
    if let Expr::Subscript { index, .. } = insn.assignee() {
        index.iter().for_each(&mut reads);
    }
    if let Expr::Subscript { array, index } = insn.assignee() {
        out.push(Access { insn: insn_index, variable: array.clone(), write: true, index: index.clone() });
    }
    out
}

struct Simulator<'k> {
    kernel: &'k Kernel,
    domain: DomainCounter<'k>,
    accesses: Vec<Vec<Access>>,
    related: Vec<BTreeSet<usize>>,
    pending: Vec<Access>,
    counts: BTreeMap<SyncKind, PwQPoly>,
}

impl<'k> Simulator<'k> {
    fn new(kernel: &'k Kernel, domain: DomainCounter<'k>) -> Self {
        let instructions = kernel.instructions();
        let position: BTreeMap<&str, usize> = instructions.iter().enumerate().map(|(i, insn)| (insn.id(), i)).collect();
        let accesses = instructions.iter().enumerate().map(|(i, insn)| accesses_of(i, insn)).collect();
        let mut related: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); instructions.len()];
        for (i, insn) in instructions.iter().enumerate() {
            for dependency in kernel.transitive_dependencies(insn.id()) {
                if let Some(&j) = position.get(dependency.as_str()) {
                    related[i].insert(j);
                    related[j].insert(i);
                }
            }
        }
        Self { kernel, domain, accesses, related, pending: Vec::new(), counts: BTreeMap::new() }
    }

    fn subtree_accesses(&self, node: &Node) -> Vec<Access> {
        match node {
            Node::Insn(i) => self.accesses[*i].clone(),
            Node::Loop { body, .. } => body.iter().flat_map(|n| self.subtree_accesses(n)).collect(),
        }
    }

    /// Hardware axes an instruction runs along: local ones, or all of them for
    /// global temporaries.
    fn parallel_axes(&self, insn: usize, global: bool) -> BTreeSet<&'k str> {
        let insn = &self.kernel.instructions()[insn];
        self.kernel
            .axes()
            .iter()
            .filter(|axis| insn.is_within(axis))
            .filter(|axis| {
                let role = self.kernel.role(axis);
                if global { role.is_hardware_parallel() } else { role.is_local() }
            })
            .map(String::as_str)
            .collect()
    }

    /// Barrier needed between an earlier access and a later one, if any.
    fn conflict(&self, before: &Access, after: &Access) -> Option<SyncKind> {
        if before.variable != after.variable || !(before.write || after.write) {
            return None;
        }
        if before.insn == after.insn || !self.related[after.insn].contains(&before.insn) {
            return None;
        }
        let array = self.kernel.array(&before.variable)?;
        let (kind, global) = match array.scope() {
            MemScope::Local => (SyncKind::BarrierLocal, false),
            MemScope::Global if array.is_temporary() => (SyncKind::BarrierGlobal, true),
            _ => return None,
        };
        let cross_item = before.index != after.index
            || self.parallel_axes(before.insn, global) != self.parallel_axes(after.insn, global);
        cross_item.then_some(kind)
    }

    /// Strongest barrier needed before `incoming`; global barriers also order
    /// local memory.
    fn first_conflict(&self, incoming: &[Access]) -> Option<SyncKind> {
        let mut needed = None;
        for before in &self.pending {
            for after in incoming {
                match self.conflict(before, after) {
                    Some(SyncKind::BarrierGlobal) => return Some(SyncKind::BarrierGlobal),
                    Some(kind) => needed = Some(kind),
                    None => {}
                }
            }
        }
        needed
    }

    fn place(&mut self, kind: SyncKind, enclosing: &[String]) -> Result<()> {
        let count = self.domain.card_onto(enclosing)?;
        tracing::debug!(%kind, loops = ?enclosing, %count, "barrier placed");
        *self.counts.entry(kind).or_default() += &count;
        if kind == SyncKind::BarrierGlobal && enclosing.is_empty() {
            // a top-level global barrier splits the kernel
            *self.counts.entry(SyncKind::KernelLaunch).or_default() += &PwQPoly::one();
        }
        self.pending.clear();
        Ok(())
    }

    /// Simulates `nodes`. Returns the accesses made before the first barrier
    /// and whether any barrier was placed.
    fn visit(&mut self, nodes: &[Node], enclosing: &mut Vec<String>) -> Result<(Vec<Access>, bool)> {
        let mut head = Vec::new();
        let mut barrier = false;
        for node in nodes {
            let incoming = self.subtree_accesses(node);
            if let Some(kind) = self.first_conflict(&incoming) {
                self.place(kind, enclosing)?;
                barrier = true;
            }
            match node {
                Node::Insn(_) => {
                    if !barrier {
                        head.extend(incoming.iter().cloned());
                    }
                    self.pending.extend(incoming);
                }
                Node::Loop { axis, body } => {
                    enclosing.push(axis.clone());
                    let (body_head, mut body_barrier) = self.visit(body, enclosing)?;
                    // next iteration against the end of this one
                    if let Some(kind) = self.first_conflict(&body_head) {
                        self.place(kind, enclosing)?;
                        body_barrier = true;
                    }
                    enclosing.pop();
                    if !barrier {
                        head.extend(body_head);
                        barrier = body_barrier;
                    }
                }
            }
        }
        Ok((head, barrier))
    }
}

/// Kernel launches and barriers of one kernel invocation.
pub fn count_sync(kernel: &Kernel, domain: DomainCounter<'_>) -> Result<CountMap<SyncKind>> {
    let tree = schedule(kernel);
    let mut simulator = Simulator::new(kernel, domain);
    simulator.counts.insert(SyncKind::KernelLaunch, PwQPoly::one());
    simulator.visit(&tree, &mut Vec::new())?;
    Ok(simulator.counts.into_iter().collect())
}
