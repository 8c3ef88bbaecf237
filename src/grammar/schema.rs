use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Artifact ABI understood by this engine.
pub const SUPPORTED_ABI: u32 = 1;

fn default_abi() -> u32 {
    SUPPORTED_ABI
}

fn default_tab_width() -> usize {
    8
}

/// One grammar as written in an artifact.
#[derive(Debug, Deserialize, Clone)]
pub struct GrammarDef {
    pub name: String,
    pub version: String,
    #[serde(default = "default_abi")]
    pub abi: u32,
    #[serde(default)]
    pub extras: Vec<String>,
    #[serde(default)]
    pub externals: Vec<String>,
    #[serde(default)]
    pub sync: Vec<String>,
    #[serde(default)]
    pub layout: Option<LayoutDef>,
    #[serde(default)]
    pub rules: RuleTable,
}

/// Several grammars shipped in one artifact.
#[derive(Debug, Deserialize, Clone)]
pub struct BundleDef {
    pub grammars: Vec<GrammarDef>,
}

/// Binds three externals to the offside-rule scanner.
#[derive(Debug, Deserialize, Clone)]
pub struct LayoutDef {
    pub newline: String,
    pub indent: String,
    pub dedent: String,
    /// Open/close pairs inside which line breaks are insignificant.
    #[serde(default)]
    pub brackets: Vec<[String; 2]>,
    #[serde(default = "default_tab_width")]
    pub tab_width: usize,
}

/// Rules in declaration order. The first entry is the start rule.
///
/// Duplicate names are kept so that validation can report them.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    pub entries: Vec<(String, RuleSource)>,
}

impl<'de> Deserialize<'de> for RuleTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RuleTableVisitor;

        impl<'de> Visitor<'de> for RuleTableVisitor {
            type Value = RuleTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of rule definitions")
            }

            fn visit_map<A>(self, mut map: A) -> Result<RuleTable, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some((name, source)) = map.next_entry::<String, RuleSource>()? {
                    entries.push((name, source));
                }
                Ok(RuleTable { entries })
            }
        }

        deserializer.deserialize_map(RuleTableVisitor)
    }
}

/// A rule body: compact notation text or a `grammar.json`-style tree.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum RuleSource {
    Notation(String),
    Tree(RuleDef),
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleDef {
    Blank,
    String {
        value: String,
    },
    Pattern {
        value: String,
    },
    Symbol {
        name: String,
    },
    Seq {
        members: Vec<RuleDef>,
    },
    Choice {
        members: Vec<RuleDef>,
    },
    Repeat {
        content: Box<RuleDef>,
    },
    Repeat1 {
        content: Box<RuleDef>,
    },
    Optional {
        content: Box<RuleDef>,
    },
    Field {
        name: String,
        content: Box<RuleDef>,
    },
    #[serde(alias = "IMMEDIATE_TOKEN")]
    Token {
        content: Box<RuleDef>,
    },
    /// Precedence wrappers are accepted for compatibility; ordered choice
    /// already decides between alternatives.
    #[serde(alias = "PREC_LEFT", alias = "PREC_RIGHT", alias = "PREC_DYNAMIC")]
    Prec {
        content: Box<RuleDef>,
    },
}

impl RuleDef {
    /// Strips precedence wrappers.
    pub(crate) fn unwrap_prec(&self) -> &RuleDef {
        let mut rule = self;
        while let RuleDef::Prec { content } = rule {
            rule = content;
        }
        rule
    }

    /// True when the rule produces a single token.
    pub(crate) fn is_lexical(&self) -> bool {
        matches!(
            self.unwrap_prec(),
            RuleDef::String { .. } | RuleDef::Pattern { .. } | RuleDef::Token { .. }
        )
    }
}

/// Shape of an artifact, decided before full deserialization.
#[derive(Deserialize)]
pub(crate) struct Probe {
    #[serde(default)]
    pub grammars: Option<IgnoredAny>,
}

impl Probe {
    pub(crate) fn is_bundle(&self) -> bool {
        self.grammars.is_some()
    }
}
