//! Terragrunt `terraform { source = ... }` block extraction.
//!
//! Terragrunt blocks carry no name, so one is derived from the file location
//! or the source (see [`derive_terragrunt_name`]). There is no `version`
//! attribute; versions come only from the source's query string.

use super::source::{classify_source, derive_terragrunt_name, extract_version};
use super::{ensure_text, line_number, source_attribute, ModuleParser};
use crate::types::{IacFile, IacKind, Module};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static TERRAFORM_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bterraform\s*\{([^{}]*(?:\{[^{}]*\}[^{}]*)*)\}").expect("Invalid regex")
});

/// Parser for `terragrunt.hcl` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerragruntParser;

impl ModuleParser for TerragruntParser {
    fn kind(&self) -> IacKind {
        IacKind::Terragrunt
    }

    fn parse_content(&self, file: &IacFile) -> crate::Result<Vec<Module>> {
        ensure_text(file)?;
        let mut modules = Vec::new();

        for caps in TERRAFORM_BLOCK.captures_iter(&file.content) {
            let line = line_number(&file.content, &caps);
            let Some(source) = source_attribute(&caps[1]) else {
                debug!(file = %file.path, line, "Skipping terraform block without source");
                continue;
            };

            modules.push(Module {
                name: derive_terragrunt_name(&file.path, source),
                source: source.to_string(),
                source_type: classify_source(source),
                version: extract_version(source, None),
                repository: file.repository.clone(),
                file_path: file.path.clone(),
                file_url: file.url.clone(),
                line_number: line,
                kind: IacKind::Terragrunt,
            });
        }

        Ok(modules)
    }
}
