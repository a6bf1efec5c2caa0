//! Object selection predicates.

use super::SourceObject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which objects of a bucket take part in a batch.
///
/// `max_size` of zero means unbounded. Exclude patterns win over include
/// patterns; an empty include list admits everything not excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferFilter {
    #[serde(default, alias = "Prefix")]
    pub prefix: String,
    #[serde(default, alias = "Include", alias = "includeGlobs")]
    pub include: Vec<String>,
    #[serde(default, alias = "Exclude", alias = "excludeGlobs")]
    pub exclude: Vec<String>,
    #[serde(default, alias = "MinSize")]
    pub min_size: u64,
    #[serde(default, alias = "MaxSize")]
    pub max_size: u64,
    #[serde(default, alias = "ModifiedAfter", skip_serializing_if = "Option::is_none")]
    pub modified_after: Option<DateTime<Utc>>,
    #[serde(default, alias = "ModifiedBefore", skip_serializing_if = "Option::is_none")]
    pub modified_before: Option<DateTime<Utc>>,
}

impl TransferFilter {
    /// Filter that selects every object under `prefix`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn should_include(&self, obj: &SourceObject) -> bool {
        should_include(obj, self)
    }
}

/// Decide whether `obj` passes `filter`.
///
/// Checks run in a fixed order: key prefix, size bounds, modification window,
/// exclude patterns, then include patterns.
pub fn should_include(obj: &SourceObject, filter: &TransferFilter) -> bool {
    if !obj.key.starts_with(&filter.prefix) {
        return false;
    }

    if filter.min_size > 0 && obj.size < filter.min_size {
        return false;
    }
    if filter.max_size > 0 && obj.size > filter.max_size {
        return false;
    }

    if let Some(after) = filter.modified_after {
        if obj.last_modified < after {
            return false;
        }
    }
    if let Some(before) = filter.modified_before {
        if obj.last_modified > before {
            return false;
        }
    }

    if filter.exclude.iter().any(|p| match_pattern(&obj.key, p)) {
        return false;
    }

    filter.include.is_empty() || filter.include.iter().any(|p| match_pattern(&obj.key, p))
}

/// Simplified glob match where `*` stands for any run of characters.
///
/// A pattern without `*` must equal the text. With exactly one `*` it is a
/// prefix + suffix test. With several, each literal segment is located in turn
/// without backtracking, the first segment anchored at the start and the last
/// at the end. Overlapping segments are not supported: `ab*b` matches `ab`
/// because prefix and suffix are allowed to share characters.
pub fn match_pattern(text: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    match parts.as_slice() {
        [literal] => text == *literal,
        [prefix, suffix] => text.starts_with(prefix) && text.ends_with(suffix),
        _ => {
            let mut cursor = 0;
            for (i, part) in parts.iter().enumerate() {
                if part.is_empty() {
                    continue;
                }
                match text[cursor..].find(part) {
                    Some(found) => {
                        if i == 0 && found != 0 {
                            return false;
                        }
                        cursor += found + part.len();
                    }
                    None => return false,
                }
            }

            match parts.last() {
                Some(last) if !last.is_empty() => text.ends_with(last),
                _ => true,
            }
        }
    }
}
