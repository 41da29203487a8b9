pub mod hourly_queries;

pub use hourly_queries::{
    community_production_at, energy_price_at, supply_consumption_final_at, supply_surplus_at,
    KWH_PER_MWH,
};
