//! Terraform `module` block extraction.

use super::{ensure_text, line_number, source_attribute, ModuleParser};
use super::source::{classify_source, extract_version};
use crate::types::{IacFile, IacKind, Module};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// `module "<name>" { ... }` with at most one level of nested braces.
static MODULE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bmodule\s+"([^"]+)"\s*\{([^{}]*(?:\{[^{}]*\}[^{}]*)*)\}"#)
        .expect("Invalid regex")
});

static VERSION_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bversion\s*=\s*"([^"]*)""#).expect("Invalid regex"));

/// Parser for `.tf` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerraformParser;

impl ModuleParser for TerraformParser {
    fn kind(&self) -> IacKind {
        IacKind::Terraform
    }

    fn parse_content(&self, file: &IacFile) -> crate::Result<Vec<Module>> {
        ensure_text(file)?;
        let mut modules = Vec::new();

        for caps in MODULE_BLOCK.captures_iter(&file.content) {
            let name = &caps[1];
            let body = &caps[2];
            let line = line_number(&file.content, &caps);

            let Some(source) = source_attribute(body) else {
                debug!(file = %file.path, module = name, line, "Skipping module without source");
                continue;
            };
            let explicit = VERSION_ATTR
                .captures(body)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str());

            modules.push(Module {
                name: name.to_string(),
                source: source.to_string(),
                source_type: classify_source(source),
                version: extract_version(source, explicit),
                repository: file.repository.clone(),
                file_path: file.path.clone(),
                file_url: file.url.clone(),
                line_number: line,
                kind: IacKind::Terraform,
            });
        }

        Ok(modules)
    }
}
