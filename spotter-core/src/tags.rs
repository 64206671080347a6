use std::collections::{BTreeMap, HashMap};

pub const MANAGED_BY_KEY: &str = "ManagedBy";
pub const MANAGED_BY_VALUE: &str = "Spotter";
pub const NAME_KEY: &str = "Name";

pub fn cluster_membership_key(cluster: &str) -> String {
    format!("kubernetes.io/cluster/{cluster}")
}

/// Tags that make a replacement instance join `cluster` and identify it as ours.
pub fn cluster_tags(cluster: &str) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert(NAME_KEY.to_string(), format!("Spotter-Node-{cluster}"));
    tags.insert(cluster_membership_key(cluster), "owned".to_string());
    tags.insert(MANAGED_BY_KEY.to_string(), MANAGED_BY_VALUE.to_string());
    tags
}

pub fn is_spotter_managed(tags: &HashMap<String, String>, cluster: &str) -> bool {
    tags.get(MANAGED_BY_KEY).map(String::as_str) == Some(MANAGED_BY_VALUE)
        && tags.get(&cluster_membership_key(cluster)).map(String::as_str) == Some("owned")
}
