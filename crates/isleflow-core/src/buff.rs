//! Buff/boost aggregation.
//!
//! Every buff a factory can receive is bound to it as an [`AppliedBuff`]
//! with a scaling source cell in `[0, 1]` (0 = inactive, 1 = fully active).
//! The aggregator turns the set of applied buffs into derived cells:
//!
//! - **boost**: `max(floor, 1 + Σ scaling × productivity / 100)`
//! - **fuel factor**: `max(floor, 1 + Σ scaling × fuel_duration / 100)`
//! - **byproduct multiplier**: `Π (1 + scaling × pct / 100)`, multiplicative
//! - **replacement weights**: the share of a required input that ends up on
//!   each substitute product.

use std::collections::BTreeMap;

use crate::catalog::{BuffDef, Replacement};
use crate::cell::{CellGraph, RateCell};
use crate::fixed::{Fixed64, mul_sat, percent};
use crate::id::{BuffId, FactoryId, ProductId};

/// A buff bound to one factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedBuff {
    pub buff: BuffId,
    pub factory: FactoryId,
    pub scaling: RateCell,
}

/// Clamp a scaling factor into `[0, 1]`.
pub fn clamp_scaling(value: Fixed64) -> Fixed64 {
    value.clamp(Fixed64::ZERO, Fixed64::ONE)
}

/// Additive percentage aggregate: `max(floor, 1 + Σ s_i × p_i / 100)`.
pub fn additive_cell(
    graph: &mut CellGraph,
    label: &'static str,
    terms: Vec<(RateCell, Fixed64)>,
    floor: Fixed64,
) -> RateCell {
    graph.derived_rate(label, move |r| {
        let mut total = Fixed64::ONE;
        for (scaling, pct) in &terms {
            total = total.saturating_add(mul_sat(r.rate(*scaling), percent(*pct)));
        }
        total.max(floor)
    })
}

/// Productivity boost of a factory from its applied buffs.
pub fn boost_cell(
    graph: &mut CellGraph,
    applied: &[(AppliedBuff, &BuffDef)],
    floor: Fixed64,
) -> RateCell {
    let terms = applied
        .iter()
        .filter(|(_, def)| def.productivity_upgrade != Fixed64::ZERO)
        .map(|(a, def)| (a.scaling, def.productivity_upgrade))
        .collect();
    additive_cell(graph, "boost", terms, floor)
}

/// Fuel consumption divisor from fuel-duration buffs.
pub fn fuel_factor_cell(
    graph: &mut CellGraph,
    applied: &[(AppliedBuff, &BuffDef)],
    floor: Fixed64,
) -> RateCell {
    let terms = applied
        .iter()
        .filter(|(_, def)| def.fuel_duration_percent != Fixed64::ZERO)
        .map(|(a, def)| (a.scaling, def.fuel_duration_percent))
        .collect();
    additive_cell(graph, "fuel_factor", terms, floor)
}

/// Multiplier applied to self-effecting byproducts.
pub fn byproduct_multiplier_cell(
    graph: &mut CellGraph,
    applied: &[(AppliedBuff, &BuffDef)],
) -> RateCell {
    let terms: Vec<(RateCell, Fixed64)> = applied
        .iter()
        .filter(|(_, def)| def.byproduct_multiplier_percent != Fixed64::ZERO)
        .map(|(a, def)| (a.scaling, def.byproduct_multiplier_percent))
        .collect();
    graph.derived_rate("byproduct_multiplier", move |r| {
        let mut factor = Fixed64::ONE;
        for (scaling, pct) in &terms {
            let step = Fixed64::ONE.saturating_add(mul_sat(r.rate(*scaling), percent(*pct)));
            factor = mul_sat(factor, step.max(Fixed64::ZERO));
        }
        factor
    })
}

// ---------------------------------------------------------------------------
// Replacement chains
// ---------------------------------------------------------------------------

/// Ordered replacement steps for one required product. Steps are sorted by
/// buff id, and by declaration order within a buff.
#[derive(Debug, Clone, Default)]
pub struct ReplacementChain {
    steps: Vec<(RateCell, Replacement)>,
}

impl ReplacementChain {
    /// Collect input replacements from applied buffs.
    pub fn inputs(applied: &[(AppliedBuff, &BuffDef)]) -> Self {
        let mut sorted: Vec<&(AppliedBuff, &BuffDef)> = applied.iter().collect();
        sorted.sort_by_key(|(a, _)| a.buff);
        let steps = sorted
            .into_iter()
            .flat_map(|(a, def)| def.input_replacements.iter().map(move |r| (a.scaling, *r)))
            .collect();
        Self { steps }
    }

    /// Collect workforce replacements from applied buffs.
    pub fn workforce(applied: &[(AppliedBuff, &BuffDef)]) -> Self {
        let mut sorted: Vec<&(AppliedBuff, &BuffDef)> = applied.iter().collect();
        sorted.sort_by_key(|(a, _)| a.buff);
        let steps = sorted
            .into_iter()
            .filter_map(|(a, def)| def.workforce_replacement.map(|r| (a.scaling, r)))
            .collect();
        Self { steps }
    }

    /// Every product a requirement starting at `start` can end up on,
    /// including `start` itself, in first-reached order.
    pub fn reachable(&self, start: ProductId) -> Vec<ProductId> {
        let mut reached = vec![start];
        for (_, step) in &self.steps {
            if reached.contains(&step.from)
                && let Some(to) = step.to
                && !reached.contains(&to)
            {
                reached.push(to);
            }
        }
        reached
    }

    /// Derived cell holding the share of a requirement on `start` that is
    /// resolved onto `target`.
    pub fn weight_cell(&self, graph: &mut CellGraph, start: ProductId, target: ProductId) -> RateCell {
        let steps = self.steps.clone();
        graph.derived_rate("replacement_weight", move |r| {
            let scalings: Vec<Fixed64> = steps.iter().map(|(s, _)| r.rate(*s)).collect();
            let replacements: Vec<Replacement> = steps.iter().map(|(_, rep)| *rep).collect();
            resolve_weights(start, &replacements, &scalings)
                .get(&target)
                .copied()
                .unwrap_or(Fixed64::ZERO)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Distribute a unit requirement on `start` across substitutes.
///
/// Each step moves `scaling × weight[from]` onto `to` (or drops it when `to`
/// is `None`), so the total weight never grows and a full substitution keeps
/// the original required rate.
pub fn resolve_weights(
    start: ProductId,
    steps: &[Replacement],
    scalings: &[Fixed64],
) -> BTreeMap<ProductId, Fixed64> {
    let mut weights = BTreeMap::new();
    weights.insert(start, Fixed64::ONE);
    for (step, scaling) in steps.iter().zip(scalings) {
        let scaling = clamp_scaling(*scaling);
        let Some(current) = weights.get(&step.from).copied() else {
            continue;
        };
        let moved = mul_sat(current, scaling);
        if moved == Fixed64::ZERO {
            continue;
        }
        weights.insert(step.from, current - moved);
        if let Some(to) = step.to {
            *weights.entry(to).or_insert(Fixed64::ZERO) += moved;
        }
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fx(v: f64) -> Fixed64 {
        Fixed64::from_num(v)
    }

    fn applied(graph: &mut CellGraph, buff: u32, scaling: f64) -> AppliedBuff {
        AppliedBuff {
            buff: BuffId(buff),
            factory: FactoryId(1),
            scaling: graph.source_rate("scaling", fx(scaling)),
        }
    }

    #[test]
    fn productivity_buff_adds_percent() {
        let mut g = CellGraph::new();
        let def = BuffDef::new(BuffId(1), "fertiliser").productivity(fx(50.0));
        let a = applied(&mut g, 1, 1.0);
        let boost = boost_cell(&mut g, &[(a, &def)], fx(0.01));
        assert_eq!(g.rate(boost), fx(1.5));

        g.set_rate(a.scaling, fx(0.5));
        assert_eq!(g.rate(boost), fx(1.25));
    }

    #[test]
    fn productivity_buffs_stack_additively() {
        let mut g = CellGraph::new();
        let first = BuffDef::new(BuffId(1), "a").productivity(fx(50.0));
        let second = BuffDef::new(BuffId(2), "b").productivity(fx(25.0));
        let a = applied(&mut g, 1, 1.0);
        let b = applied(&mut g, 2, 1.0);
        let boost = boost_cell(&mut g, &[(a, &first), (b, &second)], fx(0.01));
        assert_eq!(g.rate(boost), fx(1.75));
    }

    #[test]
    fn boost_never_below_floor() {
        let mut g = CellGraph::new();
        let def = BuffDef::new(BuffId(1), "strike").productivity(fx(-150.0));
        let a = applied(&mut g, 1, 1.0);
        let boost = boost_cell(&mut g, &[(a, &def)], fx(0.01));
        assert_eq!(g.rate(boost), fx(0.01));
    }

    #[test]
    fn byproduct_multipliers_compose_multiplicatively() {
        let mut g = CellGraph::new();
        let first = BuffDef::new(BuffId(1), "a").byproduct_multiplier(fx(100.0));
        let second = BuffDef::new(BuffId(2), "b").byproduct_multiplier(fx(50.0));
        let a = applied(&mut g, 1, 1.0);
        let b = applied(&mut g, 2, 1.0);
        let m = byproduct_multiplier_cell(&mut g, &[(a, &first), (b, &second)]);
        assert_eq!(g.rate(m), fx(3.0));
    }

    #[test]
    fn full_replacement_moves_whole_requirement() {
        let weights = resolve_weights(
            ProductId(1),
            &[Replacement {
                from: ProductId(1),
                to: Some(ProductId(2)),
            }],
            &[fx(1.0)],
        );
        assert_eq!(weights[&ProductId(1)], fx(0.0));
        assert_eq!(weights[&ProductId(2)], fx(1.0));
    }

    #[test]
    fn partial_replacement_splits_requirement() {
        let weights = resolve_weights(
            ProductId(1),
            &[Replacement {
                from: ProductId(1),
                to: Some(ProductId(2)),
            }],
            &[fx(0.25)],
        );
        assert_eq!(weights[&ProductId(1)], fx(0.75));
        assert_eq!(weights[&ProductId(2)], fx(0.25));
    }

    #[test]
    fn removal_drops_requirement() {
        let weights = resolve_weights(
            ProductId(1),
            &[Replacement {
                from: ProductId(1),
                to: None,
            }],
            &[fx(1.0)],
        );
        assert_eq!(weights.len(), 1);
        assert_eq!(weights[&ProductId(1)], fx(0.0));
    }

    #[test]
    fn replacements_apply_in_buff_id_order() {
        // Buff 7 maps 1 -> 2, buff 3 maps 2 -> 3. Ascending id order applies
        // buff 3 first (nothing on 2 yet), then buff 7, so the requirement
        // ends on product 2, not 3.
        let mut g = CellGraph::new();
        let late = BuffDef::new(BuffId(7), "late").replace_input(ProductId(1), Some(ProductId(2)));
        let early = BuffDef::new(BuffId(3), "early").replace_input(ProductId(2), Some(ProductId(3)));
        let a = applied(&mut g, 7, 1.0);
        let b = applied(&mut g, 3, 1.0);
        let chain = ReplacementChain::inputs(&[(a, &late), (b, &early)]);

        assert_eq!(chain.reachable(ProductId(1)), vec![ProductId(1), ProductId(2)]);
        let on_two = chain.weight_cell(&mut g, ProductId(1), ProductId(2));
        let on_one = chain.weight_cell(&mut g, ProductId(1), ProductId(1));
        assert_eq!(g.rate(on_two), fx(1.0));
        assert_eq!(g.rate(on_one), fx(0.0));

        g.set_rate(a.scaling, fx(0.0));
        assert_eq!(g.rate(on_two), fx(0.0));
        assert_eq!(g.rate(on_one), fx(1.0));
    }

    #[test]
    fn workforce_chain_uses_workforce_replacement_only() {
        let mut g = CellGraph::new();
        let def = BuffDef::new(BuffId(1), "robots")
            .replace_input(ProductId(9), Some(ProductId(8)))
            .replace_workforce(ProductId(5), Some(ProductId(6)));
        let a = applied(&mut g, 1, 1.0);
        let chain = ReplacementChain::workforce(&[(a, &def)]);
        assert_eq!(chain.reachable(ProductId(5)), vec![ProductId(5), ProductId(6)]);
        assert_eq!(chain.reachable(ProductId(9)), vec![ProductId(9)]);
    }

    #[test]
    fn clamp_scaling_bounds() {
        assert_eq!(clamp_scaling(fx(2.0)), fx(1.0));
        assert_eq!(clamp_scaling(fx(-1.0)), fx(0.0));
        assert_eq!(clamp_scaling(fx(0.3)), fx(0.3));
    }
}
