use anyhow::{Context, Result};
use carbon_core::{Category, MiningControl, ProjectRecord, SharedChain};
use tracing::info;

/// Example restoration projects registered on a fresh chain.
pub(crate) fn sample_projects() -> Vec<ProjectRecord> {
    vec![
        ProjectRecord::new("P1", "Mangrove Restoration", Category::Mangrove, 50, "NGO_1")
            .with_location("Goa")
            .with_area_ha(5)
            .with_species("Rhizophora"),
        ProjectRecord::new("P2", "Seagrass Planting", Category::Seagrass, 30, "Community_1")
            .with_location("Kerala")
            .with_area_ha(3)
            .with_species("Halodule"),
        ProjectRecord::new("P3", "Coral Reef Restoration", Category::Coral, 20, "NGO_1")
            .with_location("Andaman")
            .with_area_ha(2)
            .with_species("Acropora"),
    ]
}

/// Registers the sample projects when the chain holds only genesis.
/// Returns how many were added.
pub(crate) fn seed(chain: &SharedChain, control: &MiningControl) -> Result<usize> {
    if chain.view(|c| c.height()) > 0 {
        info!("chain already has blocks, skipping seed");
        return Ok(0);
    }
    let projects = sample_projects();
    for record in &projects {
        let project_id = record.project_id.clone();
        let (block, issue) = chain
            .register_and_submit(record.clone(), control)
            .with_context(|| format!("seeding project {project_id}"))?;
        info!(%project_id, index = block.index, amount = issue.amount(), "seeded project");
    }
    Ok(projects.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbon_core::ChainConfig;

    #[test]
    fn seeds_once() {
        let chain = SharedChain::new(ChainConfig::default().with_fixed_difficulty(1));
        assert_eq!(seed(&chain, &MiningControl::new()).unwrap(), 3);
        assert_eq!(seed(&chain, &MiningControl::new()).unwrap(), 0);

        assert_eq!(chain.view(|c| c.height()), 3);
        assert_eq!(chain.balance_of("NGO_1").unwrap(), 70);
        assert_eq!(chain.balance_of("Community_1").unwrap(), 30);
        assert_eq!(chain.total_supply().unwrap(), 100);
        assert!(chain.validate_full().is_ok());
    }
}
