//! Command-line interface module.
//!
//! This module defines the CLI structure using Clap, including
//! all commands, arguments, and options.
//!
//! # Commands
//!
//! - `scan`: Audit a GitHub owner, a GitLab group or a local directory
//! - `init`: Create an example configuration file
//! - `validate`: Validate a configuration file
//!
//! # Example Usage
//!
//! ```bash
//! # Audit every repository of a GitHub organization
//! modscout scan --github acme
//!
//! # Audit a GitLab group, Terragrunt only, into a file
//! modscout scan --gitlab platform/infra --kind terragrunt --output report.json
//!
//! # Audit a local checkout
//! modscout scan --path ./terraform
//!
//! # Initialize configuration
//! modscout init
//!
//! # Validate configuration
//! modscout validate modscout.yaml
//! ```

use crate::config::Config;
use crate::types::{IacKind, Platform, Visibility};
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;

/// ModScout - Infrastructure-as-Code module usage auditor.
#[derive(Parser, Debug)]
#[command(
    name = "modscout",
    author,
    version,
    about = "Infrastructure-as-Code module usage auditor",
    long_about = "ModScout lists the repositories of a GitHub owner, a GitLab group or a local \
                  directory, extracts every Terraform and Terragrunt module declaration and \
                  summarizes which sources and versions are in use."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "MODSCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Audit module usage of an owner, group or directory
    #[command(visible_alias = "s")]
    Scan(ScanArgs),

    /// Create an example configuration file
    Init,

    /// Validate a configuration file
    Validate(ValidateArgs),
}

/// Arguments for the scan command.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["github", "gitlab", "path"])))]
pub struct ScanArgs {
    /// GitHub organization or user to audit
    #[arg(long, value_name = "OWNER")]
    pub github: Option<String>,

    /// GitLab group (subgroups included) or user to audit
    #[arg(long, value_name = "GROUP")]
    pub gitlab: Option<String>,

    /// Local directory to audit as a single repository
    #[arg(long, value_name = "DIR")]
    pub path: Option<PathBuf>,

    /// Stop after this many repositories
    #[arg(long, value_name = "N")]
    pub max_repositories: Option<usize>,

    /// Skip archived repositories
    #[arg(long)]
    pub skip_archived: bool,

    /// Only repositories whose name matches this regular expression
    #[arg(long, value_name = "REGEX")]
    pub name_pattern: Option<String>,

    /// Only repositories with this visibility (public, private, internal)
    #[arg(long, value_name = "VISIBILITY")]
    pub visibility: Option<Visibility>,

    /// IaC dialects to scan (terraform, terragrunt)
    #[arg(short, long = "kind", value_name = "KIND", value_delimiter = ',')]
    pub kinds: Vec<IacKind>,

    /// Maximum number of files read per repository
    #[arg(long, value_name = "N")]
    pub max_files: Option<usize>,

    /// Only files matching these glob patterns
    #[arg(short, long = "include", value_name = "PATTERN")]
    pub include_patterns: Vec<String>,

    /// Skip files matching these glob patterns (evaluated before --include)
    #[arg(short, long = "exclude", value_name = "PATTERN")]
    pub exclude_patterns: Vec<String>,

    /// Repositories processed at once
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// File reads in flight per repository
    #[arg(long, value_name = "N")]
    pub file_concurrency: Option<usize>,

    /// Maximum depth for local directory walks
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Disable the repository lookup cache
    #[arg(long)]
    pub no_cache: bool,

    /// Output file path (stdout if not specified)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Write compact instead of pretty-printed JSON
    #[arg(long)]
    pub compact: bool,

    /// Exit with code 2 when some repositories could not be scanned
    #[arg(long)]
    pub strict: bool,
}

impl ScanArgs {
    /// The platform and owner selected on the command line.
    #[must_use]
    pub fn target(&self) -> (Platform, String) {
        if let Some(owner) = &self.github {
            (Platform::GitHub, owner.clone())
        } else if let Some(group) = &self.gitlab {
            (Platform::GitLab, group.clone())
        } else {
            let path = self.path.clone().unwrap_or_else(|| PathBuf::from("."));
            (Platform::Local, path.display().to_string())
        }
    }
}

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(value_name = "FILE", default_value = "modscout.yaml")]
    pub config: PathBuf,
}

impl Config {
    /// Merge CLI arguments into the configuration. Flags override file values.
    pub fn merge_cli_args(&mut self, args: &ScanArgs) {
        let repositories = &mut self.discovery.repositories;
        if args.max_repositories.is_some() {
            repositories.max_repositories = args.max_repositories;
        }
        if args.skip_archived {
            repositories.skip_archived = true;
        }
        if let Some(pattern) = &args.name_pattern {
            repositories.name_pattern = Some(pattern.clone());
        }
        if args.visibility.is_some() {
            repositories.visibility = args.visibility;
        }

        let files = &mut self.discovery.files;
        if !args.kinds.is_empty() {
            files.kinds.clone_from(&args.kinds);
        }
        if args.max_files.is_some() {
            files.max_files = args.max_files;
        }
        files.include_patterns.extend(args.include_patterns.iter().cloned());
        files.exclude_patterns.extend(args.exclude_patterns.iter().cloned());

        if args.concurrency.is_some() {
            self.discovery.repository_concurrency = args.concurrency;
        }
        if let Some(n) = args.file_concurrency {
            self.discovery.file_concurrency = n;
        }
        if let Some(depth) = args.max_depth {
            self.discovery.max_depth = depth;
        }
        if args.no_cache {
            self.cache.enabled = false;
        }
    }
}
