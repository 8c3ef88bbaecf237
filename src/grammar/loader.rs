use crate::grammar::compile::compile;
use crate::grammar::errors::GrammarLoadError;
use crate::grammar::schema::{BundleDef, GrammarDef, Probe};
use crate::grammar::Grammar;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing::debug;
use xxhash_rust::xxh3::Xxh3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Json,
}

fn detect(text: &str) -> Format {
    if text.trim_start().starts_with('{') {
        Format::Json
    } else {
        Format::Toml
    }
}

fn decode<T: DeserializeOwned>(text: &str, format: Format) -> Result<T, GrammarLoadError> {
    match format {
        Format::Toml => toml_edit::de::from_str(text)
            .map_err(|source| GrammarLoadError::Toml { path: None, source }),
        Format::Json => serde_json::from_str(text)
            .map_err(|source| GrammarLoadError::Json { path: None, source }),
    }
}

fn fingerprint(name: &str, data: &[u8]) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(name.as_bytes());
    hasher.update(&[0]);
    hasher.update(data);
    hasher.digest()
}

/// Compile every grammar in an artifact.
///
/// An artifact is TOML or JSON (detected from its first non-blank byte) and
/// holds either one grammar or a `grammars` list. Either every grammar
/// compiles or none is returned.
pub fn load_artifact(data: &[u8]) -> Result<Vec<Grammar>, GrammarLoadError> {
    let text = std::str::from_utf8(data).map_err(|err| GrammarLoadError::Format {
        path: None,
        message: format!("artifact is not valid UTF-8: {err}"),
    })?;
    let format = detect(text);
    let probe: Probe = decode(text, format)?;

    let defs: Vec<GrammarDef> = if probe.is_bundle() {
        let bundle: BundleDef = decode(text, format)?;
        if bundle.grammars.is_empty() {
            return Err(GrammarLoadError::Format {
                path: None,
                message: "bundle contains no grammars".to_string(),
            });
        }
        bundle.grammars
    } else {
        vec![decode(text, format)?]
    };

    let grammars = defs
        .into_iter()
        .map(|def| {
            let fp = fingerprint(&def.name, data);
            compile(def, fp)
        })
        .collect::<Result<Vec<_>, _>>()?;
    debug!(
        count = grammars.len(),
        format = ?format,
        "compiled grammar artifact"
    );
    Ok(grammars)
}

/// Compile an artifact that must hold exactly one grammar.
pub fn load_grammar(data: &[u8]) -> Result<Grammar, GrammarLoadError> {
    let mut grammars = load_artifact(data)?;
    if grammars.len() != 1 {
        return Err(GrammarLoadError::Format {
            path: None,
            message: format!("expected one grammar, artifact holds {}", grammars.len()),
        });
    }
    Ok(grammars.remove(0))
}

/// Read and compile an artifact file.
pub fn load_path(path: impl AsRef<Path>) -> Result<Vec<Grammar>, GrammarLoadError> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|source| GrammarLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_artifact(&data).map_err(|error| error.with_path(path))
}
