use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a cell (source or derived value) in the cell graph.
    pub struct CellId;

    /// Identifies a demand registered against a product.
    pub struct DemandId;

    /// Identifies a trade route in the trade manager.
    pub struct TradeRouteId;
}

/// Identifies a product in the catalog. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductId(pub u32);

/// Identifies a factory template in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FactoryId(pub u32);

/// Identifies a buff (productivity item, ship item, policy) in the catalog.
/// Input replacements are applied in ascending `BuffId` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuffId(pub u32);

/// Identifies a region (climate zone). Factories may be restricted to regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub u32);

/// Identifies an island within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IslandId(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_id_equality() {
        let a = ProductId(1010);
        let b = ProductId(1010);
        let c = ProductId(1011);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn buff_ids_order_by_guid() {
        let mut ids = vec![BuffId(30), BuffId(2), BuffId(17)];
        ids.sort();
        assert_eq!(ids, vec![BuffId(2), BuffId(17), BuffId(30)]);
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(FactoryId(100), "lumberjack");
        map.insert(FactoryId(101), "sawmill");
        assert_eq!(map[&FactoryId(100)], "lumberjack");
    }
}
