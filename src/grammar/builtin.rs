//! Demonstration grammars embedded in the crate.

use crate::grammar::errors::GrammarLoadError;
use crate::grammar::loader::load_artifact;
use crate::grammar::Grammar;
use std::sync::OnceLock;
use tracing::error;

/// Embedded artifacts as `(file name, contents)`.
pub const BUILTIN_ARTIFACTS: &[(&str, &str)] = &[
    (
        "toy-arith.toml",
        include_str!("../../grammars/toy-arith.toml"),
    ),
    (
        "languages.toml",
        include_str!("../../grammars/languages.toml"),
    ),
];

/// Compile every embedded grammar.
pub(crate) fn compile_builtins() -> Result<Vec<Grammar>, GrammarLoadError> {
    let mut grammars = Vec::new();
    for (file, data) in BUILTIN_ARTIFACTS {
        let compiled = load_artifact(data.as_bytes())
            .map_err(|err| err.with_path(std::path::Path::new(file)))?;
        grammars.extend(compiled);
    }
    Ok(grammars)
}

/// One of the embedded grammars (`toy-arith`, `python`, `javascript`),
/// compiled once per process.
pub fn builtin_grammar(name: &str) -> Option<Grammar> {
    static BUILTINS: OnceLock<Vec<Grammar>> = OnceLock::new();
    BUILTINS
        .get_or_init(|| match compile_builtins() {
            Ok(grammars) => grammars,
            Err(err) => {
                error!(error = %err, "embedded grammar failed to compile");
                Vec::new()
            }
        })
        .iter()
        .find(|g| g.name() == name)
        .cloned()
}
