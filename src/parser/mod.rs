//! Module extraction from Terraform and Terragrunt files.
//!
//! Extraction is deliberately text-level: a regular expression finds each
//! `module "name" { ... }` (Terraform) or `terraform { ... }` (Terragrunt)
//! block and pulls the `source` / `version` attributes out of its body. This
//! tolerates files that are not valid HCL and never evaluates expressions.
//!
//! # Limitations
//!
//! - Block bodies may nest braces one level deep; deeper nesting ends the
//!   match early and the block is skipped.
//! - Commented-out blocks are still matched.
//! - Only double-quoted literal `source` values are recognized.
//!
//! # Example
//!
//! ```rust
//! use modscout::parser::ModuleExtractor;
//! use modscout::types::{IacFile, IacKind, SourceType};
//!
//! let file = IacFile {
//!     kind: IacKind::Terraform,
//!     repository: "acme/infra".to_string(),
//!     path: "main.tf".to_string(),
//!     content: "module \"vpc\" {\n  source = \"./modules/vpc\"\n}\n".to_string(),
//!     url: "https://example.com/acme/infra/main.tf".to_string(),
//!     sha: None,
//!     size: None,
//! };
//!
//! let modules = ModuleExtractor::new().extract(&[file]);
//! assert_eq!(modules.len(), 1);
//! assert_eq!(modules[0].source_type, SourceType::Local);
//! ```

mod source;
mod terraform;
mod terragrunt;

pub use source::{classify_source, derive_terragrunt_name, extract_version, is_local_path};
pub use terraform::TerraformParser;
pub use terragrunt::TerragruntParser;

use crate::types::{IacFile, IacKind, Module};
use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// `source = "..."` inside a block body.
static SOURCE_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bsource\s*=\s*"([^"]*)""#).expect("Invalid regex"));

/// Extracts modules from files of one [`IacKind`].
pub trait ModuleParser: Send + Sync {
    /// The kind of file this parser understands.
    fn kind(&self) -> IacKind;

    /// Parse the file content into modules.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be scanned at all (for
    /// example binary content).
    fn parse_content(&self, file: &IacFile) -> crate::Result<Vec<Module>>;

    /// Parse a file, skipping files of another kind and logging failures.
    fn parse(&self, file: &IacFile) -> Vec<Module> {
        if file.kind != self.kind() {
            return Vec::new();
        }
        match self.parse_content(file) {
            Ok(modules) => modules,
            Err(e) => {
                warn!(
                    repository = %file.repository,
                    file = %file.path,
                    error = %e,
                    "Skipping file that could not be parsed"
                );
                Vec::new()
            }
        }
    }
}

/// Runs every registered parser over a set of files.
pub struct ModuleExtractor {
    parsers: Vec<Box<dyn ModuleParser>>,
}

impl Default for ModuleExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleExtractor {
    /// Extractor with the Terraform and Terragrunt parsers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parsers: vec![Box::new(TerraformParser), Box::new(TerragruntParser)],
        }
    }

    /// Extractor with a custom parser set.
    #[must_use]
    pub fn with_parsers(parsers: Vec<Box<dyn ModuleParser>>) -> Self {
        Self { parsers }
    }

    /// Extract modules from every file, in file order then block order.
    #[must_use]
    pub fn extract(&self, files: &[IacFile]) -> Vec<Module> {
        let modules: Vec<Module> = files.iter().flat_map(|f| self.extract_file(f)).collect();
        debug!(files = files.len(), modules = modules.len(), "Extracted modules");
        modules
    }

    /// Extract modules from a single file.
    #[must_use]
    pub fn extract_file(&self, file: &IacFile) -> Vec<Module> {
        self.parsers.iter().flat_map(|p| p.parse(file)).collect()
    }
}

/// Refuse content that is clearly not text.
fn ensure_text(file: &IacFile) -> crate::Result<()> {
    if file.content.contains('\0') {
        return Err(crate::err!(Parse {
            file: file.path.clone(),
            message: "content contains NUL bytes".to_string(),
        }));
    }
    Ok(())
}

/// 1-based line of the match start.
fn line_number(content: &str, caps: &Captures<'_>) -> usize {
    let start = caps.get(0).map_or(0, |m| m.start());
    content[..start].matches('\n').count() + 1
}

/// The non-blank `source` value of a block body.
fn source_attribute(body: &str) -> Option<&str> {
    SOURCE_ATTR
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}
