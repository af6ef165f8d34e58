// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Record filters attached to a processing rule.
//!
//! Filters run against the content of every record of an object, in the
//! order they are declared:
//! 1. `exclude_at_match` drops the record when the pattern matches
//! 2. `include_at_match` drops the record when the pattern does not match
//! 3. `mask_sequences` replaces every match with `replace_placeholder`
//!
//! ```yaml
//! filters:
//!   - type: exclude_at_match
//!     name: health_checks
//!     pattern: "GET /health"
//!   - type: mask_sequences
//!     name: mask_cards
//!     pattern: '\d{4}-\d{4}-\d{4}-\d{4}'
//!     replace_placeholder: "[CARD]"
//! ```

use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    ExcludeAtMatch,
    IncludeAtMatch,
    MaskSequences,
}

/// Filter as written in a rules file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FilterConfig {
    #[serde(rename = "type")]
    pub kind: Kind,
    pub name: String,
    pub pattern: String,
    pub replace_placeholder: Option<String>,
}

/// Filter with its pattern compiled.
#[derive(Clone, Debug)]
pub struct Filter {
    pub kind: Kind,
    pub name: String,
    pub regex: regex::Regex,
    pub placeholder: String,
}

impl Filter {
    pub fn compile(config: &FilterConfig) -> Result<Filter, regex::Error> {
        Ok(Filter {
            kind: config.kind,
            name: config.name.clone(),
            regex: regex::Regex::new(&config.pattern)?,
            placeholder: config.replace_placeholder.clone().unwrap_or_default(),
        })
    }
}

/// Runs `filters` over `message`, masking it in place.
///
/// Returns `false` when the record must be dropped.
pub fn apply_filters(filters: &[Filter], message: &mut String) -> bool {
    for filter in filters {
        match filter.kind {
            Kind::ExcludeAtMatch => {
                if filter.regex.is_match(message) {
                    return false;
                }
            }
            Kind::IncludeAtMatch => {
                if !filter.regex.is_match(message) {
                    return false;
                }
            }
            Kind::MaskSequences => {
                if filter.regex.is_match(message) {
                    *message = filter
                        .regex
                        .replace_all(message, filter.placeholder.as_str())
                        .into_owned();
                }
            }
        }
    }
    true
}
