//! Parse a Python snippet and print its tree and the names of the functions
//! it defines.
//!
//! Grammars come from `ARBOR_GRAMMAR_DIR` when set, otherwise from the
//! embedded demonstration grammars. Log output is controlled by `RUST_LOG`.
//!
//! ```text
//! cargo run --example fibonacci
//! RUST_LOG=arbor=debug cargo run --example fibonacci
//! ```

use anyhow::{Context, Result};
use arbor::{registry, Parser, Query};
use tracing_subscriber::EnvFilter;

const SOURCE: &str = "\
def fibonacci(n):
    if n < 2:
        return n
    return fibonacci(n - 1) + fibonacci(n - 2)
";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let registry = registry::init();
    match std::env::var_os("ARBOR_GRAMMAR_DIR") {
        Some(dir) => {
            registry
                .load_dir(&dir)
                .with_context(|| format!("loading grammars from {}", dir.to_string_lossy()))?;
        }
        None => {
            registry.register_builtins()?;
        }
    }

    let python = registry.lookup("python")?;
    let tree = Parser::new(python.clone())
        .parse(SOURCE.as_bytes())
        .context("parsing snippet")?;

    println!("{}", tree.to_sexp());
    if tree.has_error() {
        for location in arbor::collect_errors(&tree, SOURCE) {
            eprintln!(
                "syntax error at {}:{}: {}",
                location.line, location.column, location.context
            );
        }
    }

    let query = Query::new(
        &python,
        "(function_definition name: (identifier) @function-name)",
    )?;
    for capture in query.captures(&tree, SOURCE.as_bytes()) {
        println!("{}: {}", capture.name(&query), capture.node.text(SOURCE));
    }

    registry::shutdown();
    Ok(())
}
