#![forbid(unsafe_code)]

//! Ordered transform-rule registry and the pipeline it feeds.
//!
//! Rules convert raw terminal text into enriched output (clickable links,
//! highlighted paths, and so on). A rule is either a pattern/replacement
//! pair or an opaque function; both are applied in registration order, each
//! rule's output feeding the next rule's input.
//!
//! Pattern rules cross execution-context boundaries as **source text**
//! ([`RuleSpec`]: pattern + flags + replacement) because compiled pattern
//! objects cannot be shared across isolated contexts. The receiving side
//! re-materializes them, and a malformed source is an expected failure mode:
//! the rule is skipped, described in the batch diagnostics, and the rest of
//! the pipeline still runs.

use std::sync::{Arc, OnceLock};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Serialized source form of a pattern rule.
///
/// `flags` uses the conventional single-letter set: `i` (case-insensitive),
/// `m` (multi-line), `s` (dot matches newline), `x` (ignore whitespace).
/// `g` is accepted and ignored — replacement is always global. Any other
/// flag is rejected at materialization time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub flags: String,
    pub replacement: String,
}

impl RuleSpec {
    /// Compile the pattern source into a usable regex.
    pub fn compile(&self) -> Result<Regex, RuleError> {
        let mut builder = RegexBuilder::new(&self.pattern);
        for flag in self.flags.chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'x' => {
                    builder.ignore_whitespace(true);
                }
                // Replacement is always global; tolerate sources that say so.
                'g' => {}
                other => {
                    return Err(RuleError::UnknownFlag {
                        name: self.name.clone(),
                        flag: other,
                    });
                }
            }
        }
        builder.build().map_err(|e| RuleError::BadPattern {
            name: self.name.clone(),
            detail: e.to_string(),
        })
    }
}

/// Errors from materializing a rule's pattern source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// The pattern source failed to compile.
    BadPattern { name: String, detail: String },
    /// The flags string contains an unsupported flag character.
    UnknownFlag { name: String, flag: char },
}

impl core::fmt::Display for RuleError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadPattern { name, detail } => {
                write!(f, "rule {name:?}: pattern failed to compile: {detail}")
            }
            Self::UnknownFlag { name, flag } => {
                write!(f, "rule {name:?}: unknown flag {flag:?}")
            }
        }
    }
}

impl std::error::Error for RuleError {}

/// Transform applied by a function rule.
pub type TransformFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// A registered rule: pattern/replacement or function, dispatched uniformly
/// by the pipeline.
pub struct TransformRule {
    name: String,
    body: RuleBody,
}

enum RuleBody {
    Pattern {
        spec: RuleSpec,
        // Compiled once per registration; failure is remembered so each
        // batch can report it without recompiling.
        compiled: OnceLock<Result<Regex, RuleError>>,
    },
    Function {
        transform: TransformFn,
    },
}

impl TransformRule {
    /// Rule name as registered.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is a pattern rule (as opposed to a function rule).
    #[must_use]
    pub fn is_pattern(&self) -> bool {
        matches!(self.body, RuleBody::Pattern { .. })
    }
}

impl core::fmt::Debug for TransformRule {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.body {
            RuleBody::Pattern { spec, .. } => f
                .debug_struct("TransformRule")
                .field("name", &self.name)
                .field("pattern", &spec.pattern)
                .finish(),
            RuleBody::Function { .. } => f
                .debug_struct("TransformRule")
                .field("name", &self.name)
                .field("function", &"..")
                .finish(),
        }
    }
}

/// Ordered collection of named transform rules.
///
/// Registration order is significant and preserved; registering an existing
/// name replaces the rule in place (last-writer-wins, position kept).
#[derive(Debug, Default)]
pub struct TransformRegistry {
    rules: Vec<TransformRule>,
}

impl TransformRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pattern rule from its serialized source form.
    ///
    /// The pattern compiles lazily on first use; a malformed source is not
    /// an error here — it surfaces in batch diagnostics when the pipeline
    /// runs.
    pub fn register(&mut self, spec: RuleSpec) {
        let rule = TransformRule {
            name: spec.name.clone(),
            body: RuleBody::Pattern {
                spec,
                compiled: OnceLock::new(),
            },
        };
        self.insert(rule);
    }

    /// Register an in-process function rule.
    pub fn register_function(&mut self, name: impl Into<String>, transform: TransformFn) {
        let name = name.into();
        let rule = TransformRule {
            name,
            body: RuleBody::Function { transform },
        };
        self.insert(rule);
    }

    // Last writer wins: a rule re-registered under an existing name replaces
    // the old one in place, keeping its position in the pipeline.
    fn insert(&mut self, rule: TransformRule) {
        match self.rules.iter_mut().find(|r| r.name == rule.name) {
            Some(slot) => *slot = rule,
            None => self.rules.push(rule),
        }
    }

    /// Remove a rule by name. Returns whether a rule was removed.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.name != name);
        before != self.rules.len()
    }

    /// The active rules, in registration order.
    #[must_use]
    pub fn active_rules(&self) -> &[TransformRule] {
        &self.rules
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Build the usable pipeline for one batch.
    ///
    /// Rules that fail to materialize are skipped; each failure contributes
    /// exactly one diagnostic string for the batch.
    pub fn pipeline(&self) -> (Pipeline<'_>, Vec<String>) {
        let mut steps = Vec::with_capacity(self.rules.len());
        let mut diagnostics = Vec::new();
        for rule in &self.rules {
            match &rule.body {
                RuleBody::Pattern { spec, compiled } => {
                    let result = compiled.get_or_init(|| {
                        let built = spec.compile();
                        if let Err(e) = &built {
                            warn!(rule = %rule.name, error = %e, "transform rule skipped");
                        }
                        built
                    });
                    match result {
                        Ok(regex) => steps.push(Step::Pattern {
                            regex,
                            replacement: &spec.replacement,
                        }),
                        Err(e) => diagnostics.push(e.to_string()),
                    }
                }
                RuleBody::Function { transform } => {
                    steps.push(Step::Function {
                        transform: transform.as_ref(),
                    });
                }
            }
        }
        (Pipeline { steps }, diagnostics)
    }
}

enum Step<'a> {
    Pattern {
        regex: &'a Regex,
        replacement: &'a str,
    },
    Function {
        transform: &'a (dyn Fn(&str) -> String + Send + Sync),
    },
}

/// The materialized pipeline for one batch: every usable rule, in order.
pub struct Pipeline<'a> {
    steps: Vec<Step<'a>>,
}

impl Pipeline<'_> {
    /// Run the full pipeline over one line of text.
    #[must_use]
    pub fn apply(&self, text: &str) -> String {
        let mut current = text.to_string();
        for step in &self.steps {
            current = match step {
                Step::Pattern { regex, replacement } => {
                    regex.replace_all(&current, *replacement).into_owned()
                }
                Step::Function { transform } => transform(&current),
            };
        }
        current
    }

    /// Number of usable steps in this pipeline.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the pipeline has no usable steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
