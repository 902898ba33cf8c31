//! C9 — the Virtual Resource Reconciler: matches pre-declared "virtual"
//! schema objects against freshly discovered ones (§4.8).

use anchor_types::AnchorResult;
use async_trait::async_trait;
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerKey {
    pub object_type: String,
    pub object_name: String,
}

#[derive(Debug, Clone)]
pub struct VirtualItem {
    pub item_name: String,
    pub declared_type: String,
    pub uri: String,
}

#[derive(Debug, Clone)]
pub struct VirtualContainer {
    pub key: ContainerKey,
    pub items: Vec<VirtualItem>,
}

#[derive(Debug, Clone)]
pub struct DiscoveredItem {
    pub item_name: String,
    pub discovered_type: String,
}

#[derive(Debug, Clone)]
pub struct DiscoveredContainer {
    pub key: ContainerKey,
    pub items: Vec<DiscoveredItem>,
}

/// Suggestion attached to a successful (non-conflicting) item match (§4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationSuggestion {
    /// Exact type match; nothing to do.
    None,
    WidenType,
    WidenVarchar,
    TextCompatible,
    /// Incompatible types; a human has to decide.
    UserResolve,
}

#[derive(Debug, Clone)]
pub struct ItemMatch {
    pub item_name: String,
    pub declared_type: String,
    pub discovered_type: String,
    pub suggestion: ReconciliationSuggestion,
    pub uri: String,
}

#[derive(Debug, Clone)]
pub struct OrphanedItem {
    pub container: ContainerKey,
    pub item_name: String,
    pub uri: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationReport {
    pub matched: Vec<ItemMatch>,
    pub orphaned: Vec<OrphanedItem>,
}

const NUMERIC_WIDENING: &[&[&str]] = &[&["int16", "int32", "int64"], &["float32", "float64"]];
const STRING_FAMILY: &[&str] = &["text", "string", "clob", "longtext"];

fn is_varchar_like(t: &str) -> bool {
    t.starts_with("varchar") || t.starts_with("char")
}

fn numeric_widens_to(from: &str, to: &str) -> bool {
    NUMERIC_WIDENING.iter().any(|family| {
        let (Some(from_idx), Some(to_idx)) = (family.iter().position(|t| *t == from), family.iter().position(|t| *t == to)) else {
            return false;
        };
        from_idx < to_idx
    })
}

/// Implements the compatibility table from §4.8, in priority order: exact
/// match, then numeric widening, then varchar compatibility, then the
/// broader string family, else conflict.
fn check_compatibility(declared: &str, discovered: &str) -> ReconciliationSuggestion {
    if declared == discovered {
        return ReconciliationSuggestion::None;
    }
    if numeric_widens_to(declared, discovered) {
        return ReconciliationSuggestion::WidenType;
    }
    if is_varchar_like(declared) && is_varchar_like(discovered) {
        return ReconciliationSuggestion::WidenVarchar;
    }
    if STRING_FAMILY.contains(&declared) && STRING_FAMILY.contains(&discovered) {
        return ReconciliationSuggestion::TextCompatible;
    }
    ReconciliationSuggestion::UserResolve
}

/// Reconciles every virtual container against the discovered containers
/// (§4.8). Containers match on `(object_type, object_name)`; items within
/// matched containers match on `item_name`.
pub fn reconcile(virtuals: &[VirtualContainer], discovered: &[DiscoveredContainer]) -> ReconciliationReport {
    let discovered_by_key: IndexMap<&ContainerKey, &DiscoveredContainer> = discovered.iter().map(|c| (&c.key, c)).collect();

    let mut report = ReconciliationReport::default();
    for container in virtuals {
        let Some(discovered_container) = discovered_by_key.get(&container.key) else {
            for item in &container.items {
                report.orphaned.push(OrphanedItem {
                    container: container.key.clone(),
                    item_name: item.item_name.clone(),
                    uri: item.uri.clone(),
                });
            }
            continue;
        };
        let discovered_items: IndexMap<&str, &DiscoveredItem> = discovered_container.items.iter().map(|i| (i.item_name.as_str(), i)).collect();

        for item in &container.items {
            match discovered_items.get(item.item_name.as_str()) {
                Some(discovered_item) => {
                    let suggestion = check_compatibility(&item.declared_type, &discovered_item.discovered_type);
                    report.matched.push(ItemMatch {
                        item_name: item.item_name.clone(),
                        declared_type: item.declared_type.clone(),
                        discovered_type: discovered_item.discovered_type.clone(),
                        suggestion,
                        uri: item.uri.clone(),
                    });
                }
                None => report.orphaned.push(OrphanedItem {
                    container: container.key.clone(),
                    item_name: item.item_name.clone(),
                    uri: item.uri.clone(),
                }),
            }
        }
    }
    report
}

/// Resolves downstream mapping rules referencing a reconciled URI, as
/// described in §4.8 ("resolved via an external mapping service"); the
/// service itself is an external collaborator out of scope for this core.
#[async_trait]
pub trait MappingService: Send + Sync {
    async fn resolve_mapping(&self, uri: &str) -> AnchorResult<()>;
}

pub async fn resolve_matches(report: &ReconciliationReport, service: &dyn MappingService) -> Vec<(String, AnchorResult<()>)> {
    let mut results = Vec::new();
    for item_match in &report.matched {
        if item_match.suggestion == ReconciliationSuggestion::UserResolve {
            continue;
        }
        let result = service.resolve_mapping(&item_match.uri).await;
        results.push((item_match.uri.clone(), result));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(object_type: &str, object_name: &str, items: Vec<VirtualItem>) -> VirtualContainer {
        VirtualContainer {
            key: ContainerKey {
                object_type: object_type.to_string(),
                object_name: object_name.to_string(),
            },
            items,
        }
    }

    fn discovered(object_type: &str, object_name: &str, items: Vec<DiscoveredItem>) -> DiscoveredContainer {
        DiscoveredContainer {
            key: ContainerKey {
                object_type: object_type.to_string(),
                object_name: object_name.to_string(),
            },
            items,
        }
    }

    #[test]
    fn exact_type_match_needs_no_widening() {
        let virtuals = vec![container(
            "table",
            "users",
            vec![VirtualItem {
                item_name: "id".into(),
                declared_type: "int64".into(),
                uri: "virtual://users/id".into(),
            }],
        )];
        let discovered = vec![discovered(
            "table",
            "users",
            vec![DiscoveredItem {
                item_name: "id".into(),
                discovered_type: "int64".into(),
            }],
        )];
        let report = reconcile(&virtuals, &discovered);
        assert_eq!(report.matched.len(), 1);
        assert_eq!(report.matched[0].suggestion, ReconciliationSuggestion::None);
        assert!(report.orphaned.is_empty());
    }

    #[test]
    fn numeric_widening_is_suggested_not_a_conflict() {
        let virtuals = vec![container(
            "table",
            "users",
            vec![VirtualItem {
                item_name: "age".into(),
                declared_type: "int16".into(),
                uri: "virtual://users/age".into(),
            }],
        )];
        let discovered = vec![discovered(
            "table",
            "users",
            vec![DiscoveredItem {
                item_name: "age".into(),
                discovered_type: "int32".into(),
            }],
        )];
        let report = reconcile(&virtuals, &discovered);
        assert_eq!(report.matched[0].suggestion, ReconciliationSuggestion::WidenType);
    }

    #[test]
    fn incompatible_types_require_user_resolution() {
        let virtuals = vec![container(
            "table",
            "users",
            vec![VirtualItem {
                item_name: "id".into(),
                declared_type: "int64".into(),
                uri: "virtual://users/id".into(),
            }],
        )];
        let discovered = vec![discovered(
            "table",
            "users",
            vec![DiscoveredItem {
                item_name: "id".into(),
                discovered_type: "bytes".into(),
            }],
        )];
        let report = reconcile(&virtuals, &discovered);
        assert_eq!(report.matched[0].suggestion, ReconciliationSuggestion::UserResolve);
    }

    #[test]
    fn virtual_with_no_matching_container_is_orphaned() {
        let virtuals = vec![container(
            "table",
            "ghost",
            vec![VirtualItem {
                item_name: "id".into(),
                declared_type: "int64".into(),
                uri: "virtual://ghost/id".into(),
            }],
        )];
        let report = reconcile(&virtuals, &[]);
        assert_eq!(report.orphaned.len(), 1);
        assert!(report.matched.is_empty());
    }
}
