//! Per-island registry of products, factories and external demands.
//!
//! Cross references between them are id lookups through this registry,
//! never owning pointers.

use std::collections::BTreeMap;

use slotmap::SlotMap;

use crate::catalog::{Catalog, CatalogError};
use crate::cell::CellGraph;
use crate::demand::Demand;
use crate::factory::Factory;
use crate::fixed::Fixed64;
use crate::id::{DemandId, FactoryId, IslandId, ProductId, RegionId};
use crate::product::Product;

/// One island: every catalog product and factory, instantiated.
#[derive(Debug, Clone)]
pub struct Island {
    pub id: IslandId,
    pub region: RegionId,
    pub products: BTreeMap<ProductId, Product>,
    pub factories: BTreeMap<FactoryId, Factory>,
    /// Demands added from outside (residences, construction plans).
    pub demands: SlotMap<DemandId, Demand>,
}

impl Island {
    /// Instantiate the whole catalog on a new island and wire factory
    /// supply, demands and byproducts into the product aggregates. Factories
    /// that cannot be built in `region` are instantiated but left unwired:
    /// they neither supply nor consume.
    pub fn build(
        graph: &mut CellGraph,
        catalog: &Catalog,
        id: IslandId,
        region: RegionId,
        boost_floor: Fixed64,
    ) -> Result<Self, CatalogError> {
        let mut products = BTreeMap::new();
        for def in catalog.products() {
            products.insert(
                def.id,
                Product::new(graph, def.id, def.is_abstract, def.is_construction_material),
            );
        }

        let mut factories = BTreeMap::new();
        for def in catalog.factories() {
            let factory = Factory::build(graph, catalog, def, boost_floor)?;
            if !factory.available_in(region) {
                factories.insert(factory.id, factory);
                continue;
            }
            let output = products
                .get_mut(&factory.output)
                .ok_or(CatalogError::UnknownProduct(factory.output))?;
            output.add_factory(graph, factory.id, &factory.cells);

            for demand in &factory.demands {
                let product = products
                    .get(&demand.product)
                    .ok_or(CatalogError::UnknownProduct(demand.product))?;
                demand.register(graph, product.total_demand);
            }
            for (index, entry) in factory.byproducts.iter().enumerate() {
                let product = products
                    .get_mut(&entry.product)
                    .ok_or(CatalogError::UnknownProduct(entry.product))?;
                product.byproduct.attach(graph, factory.id, index, entry.rate);
            }
            factories.insert(factory.id, factory);
        }

        Ok(Self {
            id,
            region,
            products,
            factories,
            demands: SlotMap::with_key(),
        })
    }

    pub fn product(&self, id: ProductId) -> Option<&Product> {
        self.products.get(&id)
    }

    pub fn factory(&self, id: FactoryId) -> Option<&Factory> {
        self.factories.get(&id)
    }

    /// Whether a factory on this island produces `product` and may be
    /// built in the island's region.
    pub fn factory_can_supply(&self, id: FactoryId, product: ProductId) -> bool {
        self.factories
            .get(&id)
            .is_some_and(|f| f.output == product && f.available_in(self.region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn instantiates_whole_catalog() {
        let cat = island_catalog();
        let mut g = CellGraph::new();
        let island = Island::build(&mut g, &cat, IslandId(1), OLD_WORLD, fixed(0.01)).expect("island");
        assert_eq!(island.products.len(), cat.product_count());
        assert_eq!(island.factories.len(), cat.factory_count());
        let timber = island.product(TIMBER).expect("timber");
        assert_eq!(timber.factories, vec![SAWMILL]);
    }

    #[test]
    fn factory_demand_reaches_input_product() {
        let cat = island_catalog();
        let mut g = CellGraph::new();
        let island = Island::build(&mut g, &cat, IslandId(1), OLD_WORLD, fixed(0.01)).expect("island");
        let sawmill = island.factory(SAWMILL).expect("sawmill");
        sawmill.cells.mark_default(&mut g);
        sawmill.cells.set_demand_target(&mut g, fixed(4.0));
        let wood = island.product(WOOD).expect("wood");
        assert_rate_eq(g.rate(wood.total_demand), fixed(4.0));
    }

    #[test]
    fn unavailable_factory_neither_supplies_nor_consumes() {
        let cat = island_catalog();
        let mut g = CellGraph::new();
        let island = Island::build(&mut g, &cat, IslandId(1), NEW_WORLD, fixed(0.01)).expect("island");
        let distillery = island.factory(SCHNAPPS_DISTILLERY).expect("distillery");
        g.set_rate(distillery.constructed, fixed(2.0));
        g.set_flag(distillery.fully_utilize, true);

        let schnapps = island.product(SCHNAPPS).expect("schnapps");
        assert!(schnapps.factories.is_empty());
        assert_rate_eq(g.rate(schnapps.baseline_sum), fixed(0.0));
        assert_rate_eq(g.rate(schnapps.production_sum), fixed(0.0));
        let potato = island.product(POTATO).expect("potato");
        assert_rate_eq(g.rate(potato.total_demand), fixed(0.0));
    }

    #[test]
    fn region_restricts_factories() {
        let cat = island_catalog();
        let mut g = CellGraph::new();
        let island = Island::build(&mut g, &cat, IslandId(1), NEW_WORLD, fixed(0.01)).expect("island");
        assert!(!island.factory_can_supply(SCHNAPPS_DISTILLERY, SCHNAPPS));
        assert!(island.factory_can_supply(SAWMILL, TIMBER));
        assert!(!island.factory_can_supply(SAWMILL, WOOD));
    }
}
