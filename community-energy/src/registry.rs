//! Partner registry: who belongs to the community and which share of the
//! production each supply point receives.

use std::{collections::HashSet, fs, path::Path};

use energy_client::domain::Partner;

use crate::pipeline::PipelineError;

fn registry_error(msg: impl Into<String>) -> PipelineError {
    PipelineError::Registry(msg.into())
}

/// Reads and validates the partner registry file.
pub fn load_partners(path: &Path) -> Result<Vec<Partner>, PipelineError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| registry_error(format!("failed to read {}: {e}", path.display())))?;
    let partners = parse_partners(&contents)
        .map_err(|e| registry_error(format!("{}: {e}", path.display())))?;

    tracing::info!(
        path = %path.display(),
        partners = partners.len(),
        supplies = partners.iter().map(|p| p.supplies.len()).sum::<usize>(),
        "partner registry loaded"
    );
    Ok(partners)
}

/// Parses a registry document and checks it can drive a monthly run.
///
/// Fails on an empty list, an empty cups, a beta outside `[0, 1]` and on a
/// cups listed twice. Betas adding up to more than one only warn.
pub fn parse_partners(contents: &str) -> Result<Vec<Partner>, String> {
    let partners: Vec<Partner> =
        serde_json::from_str(contents).map_err(|e| format!("malformed registry: {e}"))?;

    if partners.is_empty() {
        return Err("registry lists no partners".to_string());
    }

    let mut seen = HashSet::new();
    let mut beta_sum = 0.0;

    for partner in &partners {
        if partner.id.trim().is_empty() {
            return Err(format!("partner '{}' has an empty id", partner.name));
        }
        if partner.supplies.is_empty() {
            tracing::warn!(partner = %partner.id, "partner has no supply points");
        }

        for supply in &partner.supplies {
            if supply.cups.trim().is_empty() {
                return Err(format!("partner {} has a supply point with an empty cups", partner.id));
            }
            if !supply.beta.is_finite() || !(0.0..=1.0).contains(&supply.beta) {
                return Err(format!(
                    "beta {} of {} is not between 0 and 1",
                    supply.beta, supply.cups
                ));
            }
            if !seen.insert(supply.cups.as_str()) {
                return Err(format!("cups {} is listed more than once", supply.cups));
            }
            beta_sum += supply.beta;
        }
    }

    if beta_sum > 1.0 + 1e-9 {
        tracing::warn!(beta_sum, "betas add up to more than 1");
    }

    Ok(partners)
}
