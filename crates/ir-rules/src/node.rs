// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! IR node placeholders
//!
//! Single source of truth for the named node patterns rule authors can use
//! instead of writing raw regular expressions against the compiler dump.
//!
//! Plain placeholders expand to a fixed regex. Composite placeholders
//! (`ALLOC_OF`, `STORE_OF_FIELD`, ...) are followed in the declaration list by
//! a literal (type, field or method name) which is spliced into the template:
//!
//! ```text
//! fail_on = [ALLOC_OF, "MyBox", CALL]
//!            ^^^^^^^^^^^^^^^^^  ^^^^
//!            one pattern        another pattern
//! ```
//!
//! Any string that is not a placeholder is used verbatim as a regex. Every
//! template matches a single dump line (`.` does not cross newlines) so the
//! matched text doubles as diagnostic evidence.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::error::FormatErrorKind;

/// Marker replaced by the composite literal in templates
const LITERAL: &str = "{}";

pub const ALLOC: &str = "ALLOC";
pub const ALLOC_OF: &str = "ALLOC_OF";
pub const ALLOC_ARRAY: &str = "ALLOC_ARRAY";
pub const STORE: &str = "STORE";
pub const STORE_OF_FIELD: &str = "STORE_OF_FIELD";
pub const STORE_OF_CLASS: &str = "STORE_OF_CLASS";
pub const LOAD: &str = "LOAD";
pub const LOAD_OF_FIELD: &str = "LOAD_OF_FIELD";
pub const LOAD_OF_CLASS: &str = "LOAD_OF_CLASS";
pub const CALL: &str = "CALL";
pub const STATIC_CALL: &str = "STATIC_CALL";
pub const STATIC_CALL_OF_METHOD: &str = "STATIC_CALL_OF_METHOD";
pub const DYNAMIC_CALL: &str = "DYNAMIC_CALL";
pub const TRAP: &str = "TRAP";
pub const NULL_CHECK_TRAP: &str = "NULL_CHECK_TRAP";
pub const LOOP: &str = "LOOP";
pub const COUNTED_LOOP: &str = "COUNTED_LOOP";
pub const SAFEPOINT: &str = "SAFEPOINT";
pub const MEMBAR: &str = "MEMBAR";
pub const CHECKCAST_ARRAY: &str = "CHECKCAST_ARRAY";
pub const CHECKCAST_ARRAY_OF: &str = "CHECKCAST_ARRAY_OF";

/// A named node pattern
pub struct IrNode {
    /// Placeholder name used in declarations
    pub name: &'static str,
    /// Regex template; composite templates contain `{}`
    pub template: &'static str,
    /// Whether the placeholder consumes the following literal
    pub composite: bool,
}

impl IrNode {
    const fn plain(name: &'static str, template: &'static str) -> Self {
        Self {
            name,
            template,
            composite: false,
        }
    }

    const fn composite(name: &'static str, template: &'static str) -> Self {
        Self {
            name,
            template,
            composite: true,
        }
    }

    pub fn lookup(name: &str) -> Option<&'static IrNode> {
        BY_NAME.get(name).copied()
    }

    /// Build the concrete regex. The literal is spliced in verbatim so authors
    /// may use regex syntax in it.
    pub fn expand(&self, literal: Option<&str>) -> String {
        match literal {
            Some(literal) if self.composite => self.template.replace(LITERAL, literal),
            _ => self.template.to_string(),
        }
    }
}

const NODE_TABLE: &[IrNode] = &[
    IrNode::plain(ALLOC, r".*\bAllocate\b.*"),
    IrNode::composite(ALLOC_OF, r".*\bAllocate\b.*precise klass {}:.*"),
    IrNode::plain(ALLOC_ARRAY, r".*\bAllocateArray\b.*"),
    IrNode::plain(STORE, r".*\bStore[BCSILFDPN]\b.*"),
    IrNode::composite(STORE_OF_FIELD, r".*\bStore[BCSILFDPN]\b.*name={}\b.*"),
    IrNode::composite(STORE_OF_CLASS, r".*\bStore[BCSILFDPN]\b.*@\S*\b{}\+.*"),
    IrNode::plain(LOAD, r".*\bLoad(B|UB|S|US|I|L|F|D|P|N)\b.*"),
    IrNode::composite(LOAD_OF_FIELD, r".*\bLoad(B|UB|S|US|I|L|F|D|P|N)\b.*name={}\b.*"),
    IrNode::composite(LOAD_OF_CLASS, r".*\bLoad(B|UB|S|US|I|L|F|D|P|N)\b.*@\S*\b{}\+.*"),
    IrNode::plain(CALL, r".*\bCall(StaticJava|DynamicJava|Leaf|LeafNoFP|Runtime)?\b.*"),
    IrNode::plain(STATIC_CALL, r".*\bCallStaticJava\b.*"),
    IrNode::composite(STATIC_CALL_OF_METHOD, r".*\bCallStaticJava\b.*\b{}\b.*"),
    IrNode::plain(DYNAMIC_CALL, r".*\bCallDynamicJava\b.*"),
    IrNode::plain(TRAP, r".*\bCallStaticJava\b.*\buncommon_trap\b.*"),
    IrNode::plain(NULL_CHECK_TRAP, r".*\buncommon_trap\b.*reason='?null_check.*"),
    IrNode::plain(LOOP, r".*\bLoop\b.*"),
    IrNode::plain(COUNTED_LOOP, r".*\bCountedLoop\b.*"),
    IrNode::plain(SAFEPOINT, r".*\bSafePoint\b.*"),
    IrNode::plain(MEMBAR, r".*\bMemBar\w*\b.*"),
    IrNode::plain(CHECKCAST_ARRAY, r".*\bCheckCastPP\b.*:\S*\[.*"),
    IrNode::composite(CHECKCAST_ARRAY_OF, r".*\bCheckCastPP\b.*:\S*\b{}\[.*"),
];

lazy_static! {
    /// Map from placeholder name to node pattern
    pub static ref BY_NAME: HashMap<&'static str, &'static IrNode> = {
        NODE_TABLE.iter().map(|node| (node.name, node)).collect()
    };
}

/// One concrete pattern ready for compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePattern {
    /// What the author wrote, e.g. `ALLOC_OF "MyBox"` or `Store`
    pub description: String,
    /// Regex source after placeholder expansion
    pub regex: String,
}

/// Expand the token starting at `tokens[at]`.
///
/// Returns the pattern and the number of tokens consumed (2 for a composite
/// placeholder with its literal, 1 otherwise).
pub fn expand_at(tokens: &[String], at: usize) -> Result<(NodePattern, usize), FormatErrorKind> {
    let token = tokens[at].as_str();
    match IrNode::lookup(token) {
        Some(node) if node.composite => {
            let literal = tokens.get(at + 1).ok_or_else(|| {
                FormatErrorKind::MissingCompositeLiteral {
                    placeholder: token.to_string(),
                }
            })?;
            Ok((
                NodePattern {
                    description: format!("{token} \"{literal}\""),
                    regex: node.expand(Some(literal)),
                },
                2,
            ))
        }
        Some(node) => Ok((
            NodePattern {
                description: token.to_string(),
                regex: node.expand(None),
            },
            1,
        )),
        None => Ok((
            NodePattern {
                description: token.to_string(),
                regex: token.to_string(),
            },
            1,
        )),
    }
}

/// Expand a whole list of patterns (as in `fail_on`).
///
/// Stops at the first composite placeholder with no literal since the rest of
/// the list can no longer be paired up reliably.
pub fn expand_patterns(tokens: &[String]) -> (Vec<NodePattern>, Vec<FormatErrorKind>) {
    let mut patterns = Vec::new();
    let mut errors = Vec::new();
    let mut at = 0;

    while at < tokens.len() {
        match expand_at(tokens, at) {
            Ok((pattern, consumed)) => {
                patterns.push(pattern);
                at += consumed;
            }
            Err(error) => {
                errors.push(error);
                break;
            }
        }
    }

    (patterns, errors)
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_all_templates_compile() {
        for node in NODE_TABLE {
            let regex = node.expand(Some("Literal"));
            assert!(Regex::new(&regex).is_ok(), "{} does not compile", node.name);
        }
    }

    #[test]
    fn test_table_names_are_unique() {
        assert_eq!(BY_NAME.len(), NODE_TABLE.len());
    }

    #[test]
    fn test_raw_strings_pass_through() {
        let (patterns, errors) = expand_patterns(&strings(&["Store", r"Add[IL]"]));
        assert!(errors.is_empty());
        assert_eq!(patterns[0].regex, "Store");
        assert_eq!(patterns[1].regex, r"Add[IL]");
    }

    #[test]
    fn test_composite_consumes_literal() {
        let (patterns, errors) = expand_patterns(&strings(&[ALLOC_OF, "MyBox", CALL]));
        assert!(errors.is_empty());
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].description, "ALLOC_OF \"MyBox\"");
        assert!(patterns[0].regex.contains("precise klass MyBox:"));
        assert_eq!(patterns[1].description, CALL);
    }

    #[test]
    fn test_composite_in_last_position_is_format_error() {
        let (patterns, errors) = expand_patterns(&strings(&[CALL, STORE_OF_FIELD]));
        assert_eq!(patterns.len(), 1);
        assert_eq!(
            errors,
            vec![FormatErrorKind::MissingCompositeLiteral {
                placeholder: STORE_OF_FIELD.to_string()
            }]
        );
    }

    #[test]
    fn test_store_of_field_matches_dump_line() {
        let regex = Regex::new(&IrNode::lookup(STORE_OF_FIELD).unwrap().expand(Some("count"))).unwrap();
        assert!(regex.is_match(" 42  StoreI  === 5 7 40 12  [[ 17 ]]  @Counter+12 *, name=count, idx=4;"));
        assert!(!regex.is_match(" 42  StoreI  === 5 7 40 12  [[ 17 ]]  @Counter+16 *, name=limit, idx=5;"));
    }
}
