//! C8 — the Transformation Bridge: declarative row-level rewriting applied
//! to CDC row payloads en route to a handler (§4.7).

use anchor_types::{PortableValue, Row};
use async_trait::async_trait;
use tracing::warn;

/// `type` in the spec vocabulary; `Other` covers any `name` not recognized
/// here, which falls through to the source value per §4.7 ("Unknown type
/// falls through to source value").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformKind {
    Direct,
    Uppercase,
    Lowercase,
    Cast,
    Default,
    Other(String),
}

impl TransformKind {
    pub fn parse(value: &str) -> Self {
        match value {
            "direct" => TransformKind::Direct,
            "uppercase" => TransformKind::Uppercase,
            "lowercase" => TransformKind::Lowercase,
            "cast" => TransformKind::Cast,
            "default" => TransformKind::Default,
            other => TransformKind::Other(other.to_string()),
        }
    }
}

/// One declarative rewrite rule (§4.7).
#[derive(Debug, Clone)]
pub struct TransformRule {
    pub source_column: String,
    pub target_column: String,
    pub kind: TransformKind,
    /// When set and not `"direct_mapping"`, the bridge delegates to an
    /// external `TransformationService` instead of applying `kind` locally.
    pub name: Option<String>,
    pub parameters: Vec<(String, String)>,
}

const DIRECT_MAPPING: &str = "direct_mapping";

/// The external transformation RPC collaborator named in §4.7; endpoint
/// wiring is out of scope for this core (§1 "downstream consumers").
#[async_trait]
pub trait TransformationService: Send + Sync {
    async fn transform(&self, rule_name: &str, parameters: &[(String, String)], value: &str) -> anyhow_like::Result<String>;
}

/// A tiny local stand-in for `anyhow::Result` so this trait's error type
/// does not force every caller onto `AnchorError` for an external RPC
/// collaborator it does not own the failure semantics of.
pub mod anyhow_like {
    pub type Result<T> = std::result::Result<T, String>;
}

fn apply_local(kind: &TransformKind, value: &PortableValue) -> PortableValue {
    match kind {
        TransformKind::Direct | TransformKind::Other(_) => value.clone(),
        TransformKind::Uppercase => match value {
            PortableValue::String(s) => PortableValue::String(s.to_uppercase()),
            other => other.clone(),
        },
        TransformKind::Lowercase => match value {
            PortableValue::String(s) => PortableValue::String(s.to_lowercase()),
            other => other.clone(),
        },
        TransformKind::Cast => value.clone(),
        TransformKind::Default => value.clone(),
    }
}

fn value_to_string(value: &PortableValue) -> String {
    match value {
        PortableValue::String(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

pub struct TransformationBridge {
    rules: Vec<TransformRule>,
    service: Option<Box<dyn TransformationService>>,
}

impl TransformationBridge {
    pub fn new(rules: Vec<TransformRule>) -> Self {
        TransformationBridge { rules, service: None }
    }

    pub fn with_service(mut self, service: Box<dyn TransformationService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Applies every rule to `row`, producing a new row. Rules with no
    /// matching source column are silently skipped (§4.7).
    pub async fn apply(&self, row: &Row) -> Row {
        let mut out = row.clone();
        for rule in &self.rules {
            let Some(source_value) = row.get(&rule.source_column) else {
                continue;
            };

            let delegate = rule.name.as_deref().filter(|name| *name != DIRECT_MAPPING);
            let new_value = match (delegate, &self.service) {
                (Some(name), Some(service)) => {
                    let input = value_to_string(source_value);
                    match service.transform(name, &rule.parameters, &input).await {
                        Ok(result) => PortableValue::String(result),
                        Err(err) => {
                            warn!(rule = %name, error = %err, "transformation bridge: external service failed, falling back to original value");
                            source_value.clone()
                        }
                    }
                }
                _ => apply_local(&rule.kind, source_value),
            };
            out.insert(rule.target_column.clone(), new_value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        let mut r = Row::new();
        r.insert("name".into(), PortableValue::String("ada".into()));
        r
    }

    #[tokio::test]
    async fn direct_rule_copies_value_unchanged() {
        let bridge = TransformationBridge::new(vec![TransformRule {
            source_column: "name".into(),
            target_column: "name_out".into(),
            kind: TransformKind::Direct,
            name: None,
            parameters: vec![],
        }]);
        let out = bridge.apply(&row()).await;
        assert_eq!(out.get("name_out"), Some(&PortableValue::String("ada".into())));
    }

    #[tokio::test]
    async fn uppercase_rule_transforms_string_values() {
        let bridge = TransformationBridge::new(vec![TransformRule {
            source_column: "name".into(),
            target_column: "name_upper".into(),
            kind: TransformKind::Uppercase,
            name: None,
            parameters: vec![],
        }]);
        let out = bridge.apply(&row()).await;
        assert_eq!(out.get("name_upper"), Some(&PortableValue::String("ADA".into())));
    }

    #[tokio::test]
    async fn rule_with_no_matching_source_column_is_skipped() {
        let bridge = TransformationBridge::new(vec![TransformRule {
            source_column: "missing".into(),
            target_column: "out".into(),
            kind: TransformKind::Direct,
            name: None,
            parameters: vec![],
        }]);
        let out = bridge.apply(&row()).await;
        assert!(out.get("out").is_none());
    }

    struct FailingService;

    #[async_trait]
    impl TransformationService for FailingService {
        async fn transform(&self, _rule_name: &str, _parameters: &[(String, String)], _value: &str) -> anyhow_like::Result<String> {
            Err("unreachable endpoint".to_string())
        }
    }

    #[tokio::test]
    async fn failed_external_transform_falls_back_to_original_value() {
        let bridge = TransformationBridge::new(vec![TransformRule {
            source_column: "name".into(),
            target_column: "name_out".into(),
            kind: TransformKind::Direct,
            name: Some("title_case".into()),
            parameters: vec![],
        }])
        .with_service(Box::new(FailingService));
        let out = bridge.apply(&row()).await;
        assert_eq!(out.get("name_out"), Some(&PortableValue::String("ada".into())));
    }

    #[tokio::test]
    async fn name_equal_to_direct_mapping_is_treated_as_local() {
        let bridge = TransformationBridge::new(vec![TransformRule {
            source_column: "name".into(),
            target_column: "name_out".into(),
            kind: TransformKind::Uppercase,
            name: Some(DIRECT_MAPPING.to_string()),
            parameters: vec![],
        }])
        .with_service(Box::new(FailingService));
        let out = bridge.apply(&row()).await;
        assert_eq!(out.get("name_out"), Some(&PortableValue::String("ADA".into())));
    }
}
