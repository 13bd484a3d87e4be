//! Bijective mapping between dot-segmented module ids and flat tool names.
//!
//! Function-calling APIs only accept names matching `^[a-zA-Z0-9_-]+$`, so the
//! dot separating id segments has to become a dash. Module ids may themselves
//! contain dashes inside a segment, which would make plain substitution lossy.
//! Literal dashes are therefore doubled before dots are substituted:
//!
//! | module id      | tool name        |
//! |----------------|------------------|
//! | `image.resize` | `image-resize`   |
//! | `a-b.c`        | `a--b-c`         |
//! | `a.b-c`        | `a-b--c`         |
//!
//! A segment never starts or ends with a dash, so a dash is never adjacent to a
//! dot. Every maximal run of dashes in a tool name is then either a single
//! separator (length 1) or `k` literal dashes (length `2k`), which is what
//! makes [`ModuleIdNormalizer::denormalize`] an exact inverse.

use crate::error::{BridgeError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// One id segment: word characters with optional interior dash runs.
const SEGMENT: &str = r"[A-Za-z0-9_]+(?:-+[A-Za-z0-9_]+)*";

/// Pattern every module id must match
pub static MODULE_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^{SEGMENT}(?:\.{SEGMENT})*$")).expect("module id pattern is valid")
});

/// Pattern every normalized tool name matches
pub static TOOL_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("tool name pattern is valid"));

/// Converts module ids to function-calling names and back
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleIdNormalizer;

impl ModuleIdNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Check a module id against [`MODULE_ID_PATTERN`], naming the first problem found
    pub fn validate(&self, module_id: &str) -> Result<()> {
        if MODULE_ID_PATTERN.is_match(module_id) {
            return Ok(());
        }

        let reason = if module_id.is_empty() {
            "module id cannot be empty"
        } else if module_id.starts_with('.') || module_id.ends_with('.') {
            "module id cannot start or end with '.'"
        } else if module_id.contains("..") {
            "module id cannot contain an empty segment"
        } else if module_id
            .split('.')
            .any(|segment| segment.starts_with('-') || segment.ends_with('-'))
        {
            "segments cannot start or end with '-'"
        } else {
            "segments may only contain letters, digits, '_' and interior '-'"
        };

        Err(BridgeError::invalid_id(module_id, reason))
    }

    /// Convert a module id to a function-calling tool name
    pub fn normalize(&self, module_id: &str) -> Result<String> {
        self.validate(module_id)?;

        let mut name = String::with_capacity(module_id.len() + 4);
        for ch in module_id.chars() {
            match ch {
                '-' => name.push_str("--"),
                '.' => name.push('-'),
                other => name.push(other),
            }
        }
        Ok(name)
    }

    /// Convert a tool name produced by [`normalize`](Self::normalize) back to its module id
    pub fn denormalize(&self, tool_name: &str) -> Result<String> {
        if !TOOL_NAME_PATTERN.is_match(tool_name) {
            return Err(BridgeError::invalid_id(
                tool_name,
                "tool name may only contain letters, digits, '_' and '-'",
            ));
        }

        let mut module_id = String::with_capacity(tool_name.len());
        let mut chars = tool_name.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch != '-' {
                module_id.push(ch);
                continue;
            }

            let mut run = 1;
            while chars.peek() == Some(&'-') {
                chars.next();
                run += 1;
            }

            match run {
                1 => module_id.push('.'),
                n if n % 2 == 0 => module_id.extend(std::iter::repeat('-').take(n / 2)),
                n => {
                    return Err(BridgeError::invalid_id(
                        tool_name,
                        format!("a run of {} dashes is not produced by normalization", n),
                    ))
                }
            }
        }

        // Leading/trailing separators and similar shapes decode to invalid ids
        self.validate(&module_id).map_err(|_| {
            BridgeError::invalid_id(tool_name, "tool name does not decode to a valid module id")
        })?;
        Ok(module_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_dotted_ids() {
        let normalizer = ModuleIdNormalizer::new();
        assert_eq!(normalizer.normalize("image.resize").unwrap(), "image-resize");
        assert_eq!(
            normalizer.normalize("comfyui.image.resize.v2").unwrap(),
            "comfyui-image-resize-v2"
        );
        assert_eq!(normalizer.normalize("ping").unwrap(), "ping");
        assert_eq!(
            normalizer.normalize("my_module.sub_module").unwrap(),
            "my_module-sub_module"
        );
    }

    #[test]
    fn test_literal_dashes_do_not_collide_with_dots() {
        let normalizer = ModuleIdNormalizer::new();
        let left = normalizer.normalize("a-b.c").unwrap();
        let right = normalizer.normalize("a.b-c").unwrap();
        assert_eq!(left, "a--b-c");
        assert_eq!(right, "a-b--c");
        assert_ne!(left, right);
        assert_eq!(normalizer.denormalize(&left).unwrap(), "a-b.c");
        assert_eq!(normalizer.denormalize(&right).unwrap(), "a.b-c");
    }

    #[test]
    fn test_dash_runs_roundtrip() {
        let normalizer = ModuleIdNormalizer::new();
        let name = normalizer.normalize("x--y.z").unwrap();
        assert_eq!(name, "x----y-z");
        assert_eq!(normalizer.denormalize(&name).unwrap(), "x--y.z");
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let normalizer = ModuleIdNormalizer::new();
        for id in ["", ".a", "a.", "a..b", "-a", "a-", "a.-b", "a b", "a/b", "é"] {
            let err = normalizer.normalize(id).unwrap_err();
            assert!(
                matches!(err, BridgeError::InvalidId { .. }),
                "expected InvalidId for {:?}",
                id
            );
        }
    }

    #[test]
    fn test_denormalize_rejects_foreign_names() {
        let normalizer = ModuleIdNormalizer::new();
        assert!(normalizer.denormalize("a---b").is_err());
        assert!(normalizer.denormalize("-a").is_err());
        assert!(normalizer.denormalize("a.b").is_err());
        assert!(normalizer.denormalize("").is_err());
    }

    #[test]
    fn test_normalized_names_match_tool_pattern() {
        let normalizer = ModuleIdNormalizer::new();
        for id in ["image.resize", "a-b.c", "Tool_1.sub-part.v2"] {
            assert!(TOOL_NAME_PATTERN.is_match(&normalizer.normalize(id).unwrap()));
        }
    }

    fn module_id_strategy() -> impl Strategy<Value = String> {
        let segment = "[A-Za-z0-9_]{1,4}(-{1,2}[A-Za-z0-9_]{1,3}){0,2}";
        proptest::collection::vec(segment, 1..5).prop_map(|segments| segments.join("."))
    }

    proptest! {
        #[test]
        fn prop_roundtrip(id in module_id_strategy()) {
            let normalizer = ModuleIdNormalizer::new();
            let name = normalizer.normalize(&id).unwrap();
            prop_assert!(TOOL_NAME_PATTERN.is_match(&name));
            prop_assert_eq!(normalizer.denormalize(&name).unwrap(), id);
        }

        #[test]
        fn prop_injective(a in module_id_strategy(), b in module_id_strategy()) {
            prop_assume!(a != b);
            let normalizer = ModuleIdNormalizer::new();
            prop_assert_ne!(normalizer.normalize(&a).unwrap(), normalizer.normalize(&b).unwrap());
        }
    }
}
