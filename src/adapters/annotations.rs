//! Module annotations to protocol vocabularies

use crate::mcp::ToolAnnotations;
use crate::registry::ModuleAnnotations;
use serde_json::{Map, Value};

/// Maps [`ModuleAnnotations`] onto each output protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotationMapper;

impl AnnotationMapper {
    pub fn new() -> Self {
        Self
    }

    /// Typed hints for the tool-calling surface.
    ///
    /// A module without annotations gets every hint set explicitly, with
    /// `openWorldHint` true: unknown reach is reported as open.
    pub fn to_mcp(&self, annotations: Option<&ModuleAnnotations>) -> ToolAnnotations {
        let annotations = annotations.copied().unwrap_or_default();
        ToolAnnotations::new()
            .read_only(annotations.readonly)
            .destructive(annotations.destructive)
            .idempotent(annotations.idempotent)
            .open_world(annotations.open_world)
    }

    /// Deterministic text summary appended to function-calling descriptions.
    ///
    /// Keys are alphabetical; the suffix is empty when the module carries no
    /// annotations at all.
    pub fn to_description_suffix(&self, annotations: Option<&ModuleAnnotations>) -> String {
        let Some(a) = annotations else {
            return String::new();
        };

        let parts = [
            ("destructive", a.destructive),
            ("idempotent", a.idempotent),
            ("open_world", a.open_world),
            ("readonly", a.readonly),
            ("requires_approval", a.requires_approval),
        ]
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>();

        format!("\n\n[Annotations: {}]", parts.join(", "))
    }

    /// Tool `_meta` entries for hints the typed record cannot express
    pub fn to_meta(&self, annotations: Option<&ModuleAnnotations>) -> Option<Map<String, Value>> {
        let annotations = annotations?;
        let mut meta = Map::new();
        if annotations.requires_approval {
            meta.insert("requiresApproval".to_string(), Value::Bool(true));
        }
        if annotations.streaming {
            meta.insert("streaming".to_string(), Value::Bool(true));
        }
        (!meta.is_empty()).then_some(meta)
    }

    pub fn has_requires_approval(&self, annotations: Option<&ModuleAnnotations>) -> bool {
        annotations.map_or(false, |a| a.requires_approval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_annotations_default_to_open_world() {
        let hints = AnnotationMapper::new().to_mcp(None);
        assert_eq!(hints.read_only_hint, Some(false));
        assert_eq!(hints.destructive_hint, Some(false));
        assert_eq!(hints.idempotent_hint, Some(false));
        assert_eq!(hints.open_world_hint, Some(true));
        assert!(hints.title.is_none());
    }

    #[test]
    fn test_flags_map_one_to_one() {
        let annotations = ModuleAnnotations::default()
            .readonly(true)
            .idempotent(true)
            .open_world(false);
        let hints = AnnotationMapper::new().to_mcp(Some(&annotations));
        assert_eq!(hints.read_only_hint, Some(true));
        assert_eq!(hints.destructive_hint, Some(false));
        assert_eq!(hints.idempotent_hint, Some(true));
        assert_eq!(hints.open_world_hint, Some(false));
    }

    #[test]
    fn test_suffix_is_alphabetical_and_stable() {
        let mapper = AnnotationMapper::new();
        let annotations = ModuleAnnotations::default().destructive(true).requires_approval(true);
        let suffix = mapper.to_description_suffix(Some(&annotations));
        assert_eq!(
            suffix,
            "\n\n[Annotations: destructive=true, idempotent=false, open_world=true, readonly=false, requires_approval=true]"
        );
        assert_eq!(suffix, mapper.to_description_suffix(Some(&annotations)));
    }

    #[test]
    fn test_suffix_empty_without_annotations() {
        assert_eq!(AnnotationMapper::new().to_description_suffix(None), "");
    }

    #[test]
    fn test_meta_only_for_extra_hints() {
        let mapper = AnnotationMapper::new();
        assert!(mapper.to_meta(None).is_none());
        assert!(mapper.to_meta(Some(&ModuleAnnotations::default().readonly(true))).is_none());

        let meta = mapper
            .to_meta(Some(&ModuleAnnotations::default().requires_approval(true).streaming(true)))
            .unwrap();
        assert_eq!(meta.get("requiresApproval"), Some(&Value::Bool(true)));
        assert_eq!(meta.get("streaming"), Some(&Value::Bool(true)));
    }
}
