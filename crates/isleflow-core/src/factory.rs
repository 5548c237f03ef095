//! Factories placed on an island.
//!
//! A [`Factory`] is the per-island instance of a [`FactoryDef`]: building
//! counts, applied buffs, and the derived cells computing its output,
//! throughput, required buildings and input demands.

use std::collections::BTreeMap;

use crate::buff::{
    AppliedBuff, ReplacementChain, boost_cell, byproduct_multiplier_cell, fuel_factor_cell,
};
use crate::catalog::{Catalog, CatalogError, FactoryDef};
use crate::cell::{CellGraph, FlagCell, RateCell};
use crate::damping::DampingFilter;
use crate::demand::{Demand, DemandOwner};
use crate::fixed::{Fixed64, SECONDS_PER_MINUTE, div_or_zero, mul_sat};
use crate::id::{BuffId, FactoryId, ProductId, RegionId};
use crate::supplier::SupplierCells;

/// Extra output produced by one applied buff, damped before it is
/// published as supply.
#[derive(Debug, Clone)]
pub struct ByproductEntry {
    pub buff: BuffId,
    pub product: ProductId,
    /// Undamped rate computed from the factory's throughput.
    pub candidate: RateCell,
    /// Damped rate; the only cell other products read.
    pub rate: RateCell,
    pub filter: DampingFilter,
}

/// A factory instance on one island.
#[derive(Debug, Clone)]
pub struct Factory {
    pub id: FactoryId,
    pub output: ProductId,
    pub output_amount: Fixed64,
    pub cycle_time: Fixed64,
    regions: Vec<RegionId>,
    pub constructed: RateCell,
    pub fully_utilize: FlagCell,
    /// User-entered plan; persisted, never read by formulas.
    pub planned: Fixed64,
    pub boost: RateCell,
    pub fuel_factor: RateCell,
    pub byproduct_multiplier: RateCell,
    pub rate_per_building: RateCell,
    pub cells: SupplierCells,
    /// Cycles per minute.
    pub throughput: RateCell,
    pub required: RateCell,
    pub buffs: BTreeMap<BuffId, AppliedBuff>,
    /// Input and workforce demands, one per reachable substitute.
    pub demands: Vec<Demand>,
    pub byproducts: Vec<ByproductEntry>,
}

impl Factory {
    /// Instantiate `def` with every buff it can receive applied at scaling
    /// zero. The demands on its inputs and workforce are created but not
    /// yet registered with any product.
    pub fn build(
        graph: &mut CellGraph,
        catalog: &Catalog,
        def: &FactoryDef,
        boost_floor: Fixed64,
    ) -> Result<Self, CatalogError> {
        let mut buffs = BTreeMap::new();
        for buff in &def.buffs {
            let scaling = graph.source_rate("buff_scaling", Fixed64::ZERO);
            buffs.insert(
                *buff,
                AppliedBuff {
                    buff: *buff,
                    factory: def.id,
                    scaling,
                },
            );
        }
        let mut applied = Vec::with_capacity(buffs.len());
        for a in buffs.values() {
            applied.push((*a, catalog.buff(a.buff)?));
        }

        let boost = boost_cell(graph, &applied, boost_floor);
        let fuel_factor = fuel_factor_cell(graph, &applied, boost_floor);
        let byproduct_multiplier = byproduct_multiplier_cell(graph, &applied);

        let output_amount = def.output.amount;
        let cycle_time = def.cycle_time;
        let per_minute = div_or_zero(
            mul_sat(output_amount, Fixed64::from_num(SECONDS_PER_MINUTE)),
            cycle_time,
        );

        let constructed = graph.source_rate("constructed", Fixed64::ZERO);
        let fully_utilize = graph.source_flag("fully_utilize", false);
        let rate_per_building = graph.derived_rate("rate_per_building", move |r| {
            mul_sat(per_minute, r.rate(boost))
        });
        let baseline = graph.derived_rate("factory_baseline", move |r| {
            if r.flag(fully_utilize) {
                mul_sat(r.rate(constructed), r.rate(rate_per_building))
            } else {
                Fixed64::ZERO
            }
        });
        let cells = SupplierCells::adjustable(graph, baseline);
        let production = cells.production;
        let throughput = graph.derived_rate("throughput", move |r| {
            div_or_zero(r.rate(production), output_amount)
        });
        let minute = Fixed64::from_num(SECONDS_PER_MINUTE);
        let required = graph.derived_rate("required", move |r| {
            let per_building = mul_sat(minute, r.rate(boost));
            div_or_zero(mul_sat(r.rate(throughput), cycle_time), per_building)
        });

        let mut demands = Vec::new();
        let owner = DemandOwner::Factory(def.id);
        let inputs = ReplacementChain::inputs(&applied);
        for input in &def.inputs {
            let amount = input.amount;
            let base = if input.fuel {
                graph.derived_rate("input_base", move |r| {
                    div_or_zero(mul_sat(r.rate(throughput), amount), r.rate(fuel_factor))
                })
            } else {
                graph.derived_rate("input_base", move |r| mul_sat(r.rate(throughput), amount))
            };
            for product in inputs.reachable(input.product) {
                let weight = inputs.weight_cell(graph, input.product, product);
                demands.push(Demand::new(graph, owner, product, base, weight));
            }
        }
        if let Some(workforce) = def.workforce {
            let amount = workforce.amount;
            let base = graph.derived_rate("workforce_base", move |r| {
                mul_sat(r.rate(constructed).max(r.rate(required)), amount)
            });
            let chain = ReplacementChain::workforce(&applied);
            for product in chain.reachable(workforce.product) {
                let weight = chain.weight_cell(graph, workforce.product, product);
                demands.push(Demand::new(graph, owner, product, base, weight));
            }
        }

        let mut byproducts = Vec::new();
        for (a, buff) in &applied {
            for extra in &buff.extra_outputs {
                let scaling = a.scaling;
                let amount = extra.amount;
                let every = Fixed64::from_num(extra.cycle.max(1));
                let self_effect = extra.product == def.output.product;
                let candidate = graph.derived_rate("byproduct_candidate", move |r| {
                    let per_minute = div_or_zero(
                        mul_sat(mul_sat(r.rate(scaling), amount), r.rate(throughput)),
                        every,
                    );
                    if self_effect {
                        mul_sat(per_minute, r.rate(byproduct_multiplier))
                    } else {
                        per_minute
                    }
                });
                let rate = graph.source_rate("byproduct_rate", Fixed64::ZERO);
                byproducts.push(ByproductEntry {
                    buff: a.buff,
                    product: extra.product,
                    candidate,
                    rate,
                    filter: DampingFilter::new(),
                });
            }
        }

        let factory = Self {
            id: def.id,
            output: def.output.product,
            output_amount,
            cycle_time,
            regions: def.regions.clone(),
            constructed,
            fully_utilize,
            planned: Fixed64::ZERO,
            boost,
            fuel_factor,
            byproduct_multiplier,
            rate_per_building,
            cells,
            throughput,
            required,
            buffs,
            demands,
            byproducts,
        };
        Ok(factory)
    }

    /// Whether this factory can be built on an island in `region`.
    pub fn available_in(&self, region: RegionId) -> bool {
        self.regions.is_empty() || self.regions.contains(&region)
    }

    /// Damped extra output of `product`, summed over entries.
    pub fn extra_output(&self, graph: &mut CellGraph, product: ProductId) -> Fixed64 {
        self.byproducts
            .iter()
            .filter(|e| e.product == product)
            .fold(Fixed64::ZERO, |acc, e| acc.saturating_add(graph.rate(e.rate)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BuffDef, CatalogBuilder, OutputDef, ProductDef};

    fn fx(v: f64) -> Fixed64 {
        Fixed64::from_num(v)
    }

    const ORE: ProductId = ProductId(1);
    const COAL: ProductId = ProductId(2);
    const STEEL: ProductId = ProductId(3);
    const WORKERS: ProductId = ProductId(4);
    const SCRAP: ProductId = ProductId(5);

    fn catalog() -> Catalog {
        let mut b = CatalogBuilder::new();
        for (id, name) in [(ORE, "ore"), (COAL, "coal"), (STEEL, "steel"), (SCRAP, "scrap")] {
            b.add_product(ProductDef::new(id, name)).expect("product");
        }
        b.add_product(ProductDef::new(WORKERS, "workers").abstract_product())
            .expect("workers");
        b.add_buff(BuffDef::new(BuffId(1), "drill").productivity(fx(50.0)))
            .expect("buff");
        b.add_buff(BuffDef::new(BuffId(2), "smelter").replace_input(COAL, None))
            .expect("buff");
        b.add_buff(BuffDef::new(BuffId(3), "scrap").extra_output(SCRAP, fx(1.0), 2))
            .expect("buff");
        b.add_factory(
            FactoryDef::new(
                FactoryId(10),
                "steelworks",
                fx(30.0),
                OutputDef {
                    product: STEEL,
                    amount: fx(2.0),
                },
            )
            .with_input(ORE, fx(2.0))
            .with_fuel(COAL, fx(1.0))
            .with_workforce(WORKERS, fx(50.0))
            .with_buff(BuffId(1))
            .with_buff(BuffId(2))
            .with_buff(BuffId(3)),
        )
        .expect("factory");
        b.build().expect("catalog")
    }

    fn steelworks(g: &mut CellGraph) -> Factory {
        let cat = catalog();
        let def = cat.factory(FactoryId(10)).expect("def").clone();
        Factory::build(g, &cat, &def, fx(0.01)).expect("build")
    }

    #[test]
    fn rate_per_building_from_cycle_time() {
        let mut g = CellGraph::new();
        let f = steelworks(&mut g);
        // 2 per 30 s = 4 per minute.
        assert_eq!(g.rate(f.rate_per_building), fx(4.0));
    }

    #[test]
    fn baseline_only_when_fully_utilized() {
        let mut g = CellGraph::new();
        let f = steelworks(&mut g);
        g.set_rate(f.constructed, fx(3.0));
        assert_eq!(g.rate(f.cells.baseline), fx(0.0));
        g.set_flag(f.fully_utilize, true);
        assert_eq!(g.rate(f.cells.baseline), fx(12.0));
    }

    #[test]
    fn required_and_input_demands_follow_target() {
        let mut g = CellGraph::new();
        let f = steelworks(&mut g);
        f.cells.mark_default(&mut g);
        f.cells.set_demand_target(&mut g, fx(8.0));
        assert_eq!(g.rate(f.throughput), fx(4.0));
        assert_eq!(g.rate(f.required), fx(2.0));

        let ore = f.demands.iter().find(|d| d.product == ORE).expect("ore demand");
        let coal = f.demands.iter().find(|d| d.product == COAL).expect("coal demand");
        let workers = f.demands.iter().find(|d| d.product == WORKERS).expect("workers");
        assert_eq!(g.rate(ore.amount), fx(8.0));
        assert_eq!(g.rate(coal.amount), fx(4.0));
        assert_eq!(g.rate(workers.amount), fx(100.0));
    }

    #[test]
    fn boost_lowers_required_buildings() {
        let mut g = CellGraph::new();
        let f = steelworks(&mut g);
        f.cells.mark_default(&mut g);
        f.cells.set_demand_target(&mut g, fx(6.0));
        g.set_rate(f.buffs[&BuffId(1)].scaling, fx(1.0));
        assert_eq!(g.rate(f.boost), fx(1.5));
        assert_eq!(g.rate(f.required), fx(1.0));
    }

    #[test]
    fn replacement_removes_fuel_demand() {
        let mut g = CellGraph::new();
        let f = steelworks(&mut g);
        f.cells.mark_default(&mut g);
        f.cells.set_demand_target(&mut g, fx(8.0));
        g.set_rate(f.buffs[&BuffId(2)].scaling, fx(1.0));
        let coal = f.demands.iter().find(|d| d.product == COAL).expect("coal demand");
        assert_eq!(g.rate(coal.amount), fx(0.0));
    }

    #[test]
    fn byproduct_candidate_scales_with_throughput() {
        let mut g = CellGraph::new();
        let f = steelworks(&mut g);
        f.cells.mark_default(&mut g);
        f.cells.set_demand_target(&mut g, fx(8.0));
        let entry = &f.byproducts[0];
        assert_eq!(entry.product, SCRAP);
        assert_eq!(g.rate(entry.candidate), fx(0.0));
        g.set_rate(f.buffs[&BuffId(3)].scaling, fx(1.0));
        // 4 cycles/min, 1 scrap every 2 cycles.
        assert_eq!(g.rate(entry.candidate), fx(2.0));
        // Not published until damped.
        assert_eq!(f.extra_output(&mut g, SCRAP), fx(0.0));
    }

    #[test]
    fn regions_limit_availability() {
        let mut g = CellGraph::new();
        let mut f = steelworks(&mut g);
        assert!(f.available_in(RegionId(7)));
        f.regions = vec![RegionId(1)];
        assert!(f.available_in(RegionId(1)));
        assert!(!f.available_in(RegionId(7)));
    }
}
