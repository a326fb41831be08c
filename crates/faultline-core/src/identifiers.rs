//! Heuristic component oracle based on identifier neighbourhoods.
//!
//! Without a parser, the component of a change is approximated by the
//! identifiers on changed lines, widened `hops` times through identifiers
//! that share a line with them. Two components are compared with the
//! Jaccard index.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;

use crate::component::{Component, ComponentOracle};
use crate::error::OracleError;

const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "int", "long", "register", "return", "short",
    "signed", "sizeof", "static", "struct", "switch", "typedef", "union", "unsigned", "void",
    "volatile", "while", "include", "define", "ifdef", "ifndef", "endif", "NULL", "bool", "true",
    "false", "class", "public", "private", "protected", "namespace", "template", "typename",
    "new", "delete", "this", "virtual", "nullptr",
];

const JAVA_KEYWORDS: &[&str] = &[
    "abstract", "boolean", "break", "byte", "case", "catch", "char", "class", "continue",
    "default", "do", "double", "else", "enum", "extends", "final", "finally", "float", "for",
    "if", "implements", "import", "instanceof", "int", "interface", "long", "new", "null",
    "package", "private", "protected", "public", "return", "short", "static", "super", "switch",
    "this", "throw", "throws", "try", "void", "while", "true", "false", "var", "String",
];

const PYTHON_KEYWORDS: &[&str] = &[
    "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif",
    "else", "except", "False", "finally", "for", "from", "global", "if", "import", "in", "is",
    "lambda", "None", "nonlocal", "not", "or", "pass", "raise", "return", "self", "True", "try",
    "while", "with", "yield",
];

const JS_KEYWORDS: &[&str] = &[
    "async", "await", "break", "case", "catch", "class", "const", "continue", "default",
    "delete", "do", "else", "export", "extends", "false", "finally", "for", "from", "function",
    "if", "import", "in", "instanceof", "let", "new", "null", "return", "super", "switch",
    "this", "throw", "true", "try", "typeof", "undefined", "var", "void", "while", "yield",
    "interface", "type", "implements",
];

const GO_KEYWORDS: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough",
    "for", "func", "go", "goto", "if", "import", "interface", "map", "package", "range",
    "return", "select", "struct", "switch", "type", "var", "nil", "true", "false", "err",
];

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while", "Some", "None", "Ok", "Err",
];

const RUBY_KEYWORDS: &[&str] = &[
    "alias", "and", "begin", "break", "case", "class", "def", "defined", "do", "else", "elsif",
    "end", "ensure", "false", "for", "if", "in", "module", "next", "nil", "not", "or", "redo",
    "rescue", "retry", "return", "self", "super", "then", "true", "undef", "unless", "until",
    "when", "while", "yield", "require",
];

fn keywords_for(language: &str) -> BTreeSet<&'static str> {
    let lists: &[&[&str]] = match language.to_ascii_lowercase().as_str() {
        "c" | "h" | "cpp" | "c++" | "cxx" | "cc" => &[C_KEYWORDS],
        "java" | "kotlin" => &[JAVA_KEYWORDS],
        "python" | "py" => &[PYTHON_KEYWORDS],
        "javascript" | "js" | "typescript" | "ts" => &[JS_KEYWORDS],
        "go" | "golang" => &[GO_KEYWORDS],
        "rust" | "rs" => &[RUST_KEYWORDS],
        "ruby" | "rb" => &[RUBY_KEYWORDS],
        _ => &[
            C_KEYWORDS,
            JAVA_KEYWORDS,
            PYTHON_KEYWORDS,
            JS_KEYWORDS,
            GO_KEYWORDS,
            RUST_KEYWORDS,
            RUBY_KEYWORDS,
        ],
    };
    lists.iter().flat_map(|l| l.iter().copied()).collect()
}

/// A set of identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierComponent {
    identifiers: BTreeSet<String>,
}

impl IdentifierComponent {
    pub fn identifiers(&self) -> &BTreeSet<String> {
        &self.identifiers
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

impl Component for IdentifierComponent {
    fn overlap_ratio(&self, other: &Self) -> f64 {
        let union = self.identifiers.union(&other.identifiers).count();
        if union == 0 {
            return 0.0;
        }
        let shared = self.identifiers.intersection(&other.identifiers).count();
        shared as f64 / union as f64
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("static identifier pattern"))
}

/// Regex-driven identifier neighbourhood oracle.
#[derive(Debug, Clone)]
pub struct IdentifierOracle {
    min_len: usize,
}

impl Default for IdentifierOracle {
    fn default() -> Self {
        Self { min_len: 2 }
    }
}

impl IdentifierOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore identifiers shorter than `min_len` characters.
    pub fn with_min_len(mut self, min_len: usize) -> Self {
        self.min_len = min_len.max(1);
        self
    }

    fn identifiers<'t>(&self, line: &'t str, keywords: &BTreeSet<&str>) -> Vec<&'t str> {
        identifier_pattern()
            .find_iter(line)
            .map(|m| m.as_str())
            .filter(|id| id.len() >= self.min_len && !keywords.contains(*id))
            .collect()
    }
}

/// Lines present in `a` more times than in `b`.
fn surplus_lines<'t>(a: &'t str, b: &'t str) -> Vec<&'t str> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for line in b.lines() {
        *counts.entry(line.trim()).or_default() += 1;
    }
    let mut surplus = Vec::new();
    for line in a.lines() {
        let line = line.trim();
        let count = counts.entry(line).or_default();
        if *count > 0 {
            *count -= 1;
        } else if !line.is_empty() {
            surplus.push(line);
        }
    }
    surplus
}

impl ComponentOracle for IdentifierOracle {
    type Component = IdentifierComponent;

    fn extract_component(
        &self,
        before: &str,
        after: &str,
        language: &str,
        hops: u32,
    ) -> Result<Self::Component, OracleError> {
        if before.trim().is_empty() && after.trim().is_empty() {
            return Err(OracleError::Empty);
        }
        let keywords = keywords_for(language);

        let mut component: BTreeSet<String> = surplus_lines(after, before)
            .into_iter()
            .chain(surplus_lines(before, after))
            .flat_map(|line| self.identifiers(line, &keywords))
            .map(str::to_string)
            .collect();

        let context = if after.trim().is_empty() { before } else { after };
        let line_sets: Vec<BTreeSet<&str>> = context
            .lines()
            .map(|line| self.identifiers(line, &keywords).into_iter().collect::<BTreeSet<_>>())
            .filter(|set| !set.is_empty())
            .collect();

        for _ in 0..hops {
            let mut grown = component.clone();
            for set in &line_sets {
                if set.iter().any(|id| component.contains(*id)) {
                    grown.extend(set.iter().map(|id| id.to_string()));
                }
            }
            if grown.len() == component.len() {
                break;
            }
            component = grown;
        }

        Ok(IdentifierComponent {
            identifiers: component,
        })
    }
}
