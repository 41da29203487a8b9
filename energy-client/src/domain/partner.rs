use serde::Deserialize;

/// A supply point owned by a community partner.
///
/// `beta` is the fraction of total community production allocated to this
/// supply point.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SupplyPoint {
    pub cups: String,
    pub beta: f64,
}

/// A community partner as listed in the partner registry file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Partner {
    #[serde(alias = "dni")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub supplies: Vec<SupplyPoint>,
}
