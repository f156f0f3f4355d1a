//! Per site/domain aggregation over a registry snapshot

use std::collections::BTreeMap;

use serde::Serialize;

use meshpulse_core::GlobalStats;

use crate::registry::NodesView;

/// Aggregate of one configured site/domain pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteGlobals {
    pub site: String,
    pub domain: String,
    #[serde(flatten)]
    pub stats: GlobalStats,
}

/// Statistics over the online nodes that belong to `site` and `domain`
pub fn compute_for(view: &NodesView<'_>, site: &str, domain: &str) -> GlobalStats {
    let mut stats = GlobalStats::default();
    for (_, node) in view.iter() {
        if node.online && node.site_domain() == Some((site, domain)) {
            stats.add(node);
        }
    }
    stats
}

/// One aggregate per configured (site, domain) pair, all from the same snapshot
pub fn compute(
    view: &NodesView<'_>,
    sites_domains: &BTreeMap<String, Vec<String>>,
) -> Vec<SiteGlobals> {
    sites_domains
        .iter()
        .flat_map(|(site, domains)| {
            domains.iter().map(move |domain| SiteGlobals {
                site: site.clone(),
                domain: domain.clone(),
                stats: compute_for(view, site, domain),
            })
        })
        .collect()
}
