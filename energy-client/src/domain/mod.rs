mod community_supply;
mod energy_price;
mod meter_consumption;
mod partner;
mod point;
mod production;
mod supply_consumption;

pub use community_supply::CommunitySupply;
pub use energy_price::EnergyPrice;
pub use meter_consumption::MeterConsumption;
pub use partner::{Partner, SupplyPoint};
pub use point::{Point, ToPoint};
pub use production::{ProductionDay, ProductionHour, RealtimeProduction};
pub use supply_consumption::SupplyConsumption;
