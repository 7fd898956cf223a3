//! Per-hardware-dimension strides of array accesses.

use std::collections::BTreeMap;

use tally_ir::{ArrayDecl, Expr, Instruction, Kernel};
use tally_poly::{QPoly, Rational};

use crate::key::StrideMap;

/// Element strides of one access along the local and group dimensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessStrides {
    pub lid: StrideMap,
    pub gid: StrideMap,
    /// Some index position depends on a local axis in a non-affine way.
    pub non_affine_local: bool,
}

impl AccessStrides {
    /// Uniform across the work-items of a group.
    pub fn is_uniform(&self) -> bool {
        !self.non_affine_local && self.lid.is_empty()
    }

    /// Unit stride along local dimension 0 and nothing else.
    pub fn is_consecutive(&self) -> bool {
        !self.non_affine_local
            && self.lid.len() == 1
            && self.lid.get(&0).and_then(QPoly::as_constant).is_some_and(|s| s == Rational::ONE)
    }
}

/// Axis standing for each hardware dimension, preferring axes `insn` runs in.
fn representatives(insn: &Instruction, bound: &[(&str, u8)]) -> BTreeMap<u8, String> {
    let mut out: BTreeMap<u8, String> = BTreeMap::new();
    for (axis, dim) in bound {
        let better = insn.is_within(axis) && !out.get(dim).is_some_and(|current| insn.is_within(current));
        if !out.contains_key(dim) || better {
            out.insert(*dim, axis.to_string());
        }
    }
    out
}

/// Strides of `array[index]` as executed by `insn`.
pub fn access_strides(kernel: &Kernel, insn: &Instruction, array: &ArrayDecl, index: &[Expr]) -> AccessStrides {
    let local = kernel.local_axes();
    let group = kernel.group_axes();
    let local_names: Vec<&str> = local.iter().map(|(axis, _)| *axis).collect();
    let hardware: Vec<&str> = local.iter().chain(&group).map(|(axis, _)| *axis).collect();
    let strides = array.row_major_strides();

    // flattened coefficient of every hardware axis, in elements
    let mut flat: BTreeMap<&str, QPoly> = BTreeMap::new();
    let mut non_affine_local = false;
    for (position, expr) in index.iter().enumerate() {
        let form = expr
            .linear_in(&hardware)
            .filter(|form| form.coefficients.values().all(|c| kernel.axes().iter().all(|a| !c.mentions(a))));
        let Some(form) = form else {
            let mut mentions_local = false;
            expr.walk(&mut |e| {
                if let Expr::Var(name) = e {
                    mentions_local |= local_names.contains(&name.as_str());
                }
            });
            non_affine_local |= mentions_local;
            continue;
        };
        let Some(stride) = strides.get(position) else { continue };
        for axis in &hardware {
            let coefficient = form.coefficient(axis);
            if !coefficient.is_zero() {
                let entry = flat.entry(*axis).or_default();
                *entry += &coefficient * stride;
            }
        }
    }

    let collect = |bound: &[(&str, u8)]| -> StrideMap {
        representatives(insn, bound)
            .into_iter()
            .filter_map(|(dim, axis)| {
                let stride = flat.get(axis.as_str())?;
                (!stride.is_zero()).then(|| (dim, stride.clone()))
            })
            .collect()
    };
    AccessStrides { lid: collect(&local), gid: collect(&group), non_affine_local }
}
