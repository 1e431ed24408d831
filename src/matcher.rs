//! Identity matching: recognising anchor paths and capturing their identity.
//!
//! Each [`PatternRule`] is compiled to `^<root>(?:<pattern>)$`, so a rule can
//! only ever match content below its own root. Rules are tried in
//! configuration order and the first match wins.

use crate::Role;
use crate::config::Params;
use crate::error::{ConfigError, ConfigErrorKind};
use crate::regex::{Regex, RegexBuilder, escape};
use crate::template::Template;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for recognising one family of anchor paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Regular expression, relative to `root`, with named capture groups.
    pub pattern: String,
    /// Template over the configuration parameters naming the parent root.
    #[serde(default)]
    pub root: Template,
    /// Role of the anchor file inside its aggregate.
    pub anchor_role: Role,
    /// Match the root and pattern case-insensitively.
    #[serde(default = "default_case_insensitive")]
    pub case_insensitive: bool,
}

fn default_case_insensitive() -> bool {
    true
}

impl PatternRule {
    /// A case-insensitive rule.
    pub fn new(root: Template, pattern: impl Into<String>, anchor_role: Role) -> Self {
        Self {
            pattern: pattern.into(),
            root,
            anchor_role,
            case_insensitive: true,
        }
    }
}

/// Named capture groups of an anchor match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Captures(BTreeMap<CompactString, CompactString>);

impl Captures {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(CompactString::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.0.insert(CompactString::from(name), CompactString::from(value));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Captures {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        let mut captures = Captures::default();
        for (k, v) in iter {
            captures.insert(k, v);
        }
        captures
    }
}

/// Values available to templates: captures first, then `root`, then parameters.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    pub captures: &'a Captures,
    pub root: &'a str,
    pub params: &'a Params,
}

impl<'a> Bindings<'a> {
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.captures
            .get(name)
            .or_else(|| (name == "root").then_some(self.root))
            .or_else(|| self.params.get(name).map(String::as_str))
    }

    /// Render a template against these bindings.
    ///
    /// An empty capture leaves its placeholder unresolved; an empty root or
    /// parameter is substituted as is.
    pub fn render(&self, template: &Template) -> Option<String> {
        let out = template.render_params(|name| match self.captures.get(name) {
            Some(value) => (!value.is_empty()).then_some(value),
            None => self.get(name),
        })?;
        (!out.trim().is_empty()).then_some(out)
    }
}

/// A path recognised as an anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorMatch {
    /// Index of the matching rule in configuration order.
    pub rule_index: usize,
    /// Role assigned to the anchor path.
    pub role: Role,
    /// The rendered root of the matching rule.
    pub root: String,
    /// Named capture groups that participated in the match.
    pub captures: Captures,
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    root: String,
    regex: Regex,
    role: Role,
}

/// Compiled, ordered set of [`PatternRule`]s.
#[derive(Debug, Clone)]
pub struct IdentityMatcher {
    rules: Vec<CompiledPattern>,
}

impl IdentityMatcher {
    /// Compile the rules, rendering each root with `params`.
    ///
    /// A root that references an unknown parameter or a pattern that does not
    /// compile is a configuration error.
    pub fn new(rules: &[PatternRule], params: &Params) -> Result<Self, ConfigError> {
        if rules.is_empty() {
            return Err(ConfigError::new(
                "patterns",
                "",
                ConfigErrorKind::Empty("at least one pattern rule is required"),
            ));
        }

        let compiled = rules
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                let location = format!("patterns[{i}]");
                // An empty root (or a parameter bound to "") matches relative paths.
                let root = rule
                    .root
                    .render_params(|name| params.get(name).map(String::as_str))
                    .ok_or_else(|| {
                        ConfigError::new(
                            &location,
                            rule.root.as_str(),
                            ConfigErrorKind::Template(
                                "root references an undefined parameter".to_string(),
                            ),
                        )
                    })?;

                let anchored = format!("^{}(?:{})$", escape(&root), rule.pattern);
                let regex = RegexBuilder::new(&anchored)
                    .case_insensitive(rule.case_insensitive)
                    .build()
                    .map_err(|e| {
                        ConfigError::new(
                            &location,
                            rule.pattern.as_str(),
                            ConfigErrorKind::Pattern(e.to_string()),
                        )
                    })?;

                Ok(CompiledPattern {
                    root,
                    regex,
                    role: rule.anchor_role,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { rules: compiled })
    }

    /// Try every rule in order; the first that matches wins.
    ///
    /// A path that matches no rule is simply not an anchor.
    pub fn match_path(&self, path: &str) -> Option<AnchorMatch> {
        self.rules.iter().enumerate().find_map(|(rule_index, rule)| {
            let caps = rule.regex.captures(path)?;
            let captures = rule
                .regex
                .capture_names()
                .flatten()
                .filter_map(|name| caps.name(name).map(|m| (name, m.as_str())))
                .collect();
            Some(AnchorMatch {
                rule_index,
                role: rule.role,
                root: rule.root.clone(),
                captures,
            })
        })
    }

    /// Distinct roots to enumerate, in rule order.
    ///
    /// A root that is a prefix of an earlier root's enumeration is still
    /// listed; callers deduplicate paths.
    pub fn roots(&self) -> Vec<&str> {
        let mut roots: Vec<&str> = Vec::new();
        for rule in &self.rules {
            if !roots.contains(&rule.root.as_str()) {
                roots.push(&rule.root);
            }
        }
        roots
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
