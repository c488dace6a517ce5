//! Weave configuration (weave.toml)
//!
//! [`WeaveOptions`] carries the build-task inputs; [`WeavePolicy`] carries the
//! name-based exclusion rules. Both can be seeded from a `weave.toml`:
//!
//! ```toml
//! [options]
//! allow_override = true
//! debug_type = "portable"
//! references = ["lib/Zoo.Common.hwm"]
//!
//! [policy]
//! delegate_suffix = "Delegate"
//! export_attributes = ["ExportAttribute", "RegisterAttribute"]
//! ```

use hotweave_bytecode::{corlib, MethodDef, TypeDef};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Contents of a `weave.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WeaveConfig {
    /// Build-task defaults
    #[serde(default)]
    pub options: ConfigOptions,

    /// Exclusion rules
    #[serde(default)]
    pub policy: WeavePolicy,
}

/// Build-task settings that may come from the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigOptions {
    /// Synthesize overrides for inherited virtual methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_override: Option<bool>,

    /// Write debug symbols
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_symbols: Option<bool>,

    /// Debug symbol flavor; anything but empty/"none" enables symbols
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_type: Option<String>,

    /// Referenced module paths
    #[serde(default)]
    pub references: Vec<String>,
}

/// Name-based exclusion rules
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeavePolicy {
    /// Types whose simple name ends with this are never woven
    #[serde(default = "default_delegate_suffix")]
    pub delegate_suffix: String,

    /// Interfaces whose simple name ends with this mark protocol methods
    #[serde(default = "default_protocol_suffix")]
    pub protocol_interface_suffix: String,

    /// Attributes marking compiler-synthesized methods
    #[serde(default = "default_generated_attributes")]
    pub compiler_generated_attributes: Vec<String>,

    /// Attributes marking methods exported to a foreign runtime
    #[serde(default = "default_export_attributes")]
    pub export_attributes: Vec<String>,

    /// Base types that make a type a delegate
    #[serde(default = "default_delegate_bases")]
    pub delegate_base_types: Vec<String>,

    /// Base types that make a type a value type
    #[serde(default = "default_value_bases")]
    pub value_type_bases: Vec<String>,

    /// Virtual methods never overridden
    #[serde(default = "default_excluded_overrides")]
    pub excluded_overrides: Vec<String>,
}

fn default_delegate_suffix() -> String {
    "Delegate".to_string()
}

fn default_protocol_suffix() -> String {
    "Delegate".to_string()
}

fn default_generated_attributes() -> Vec<String> {
    vec![
        "CompilerGeneratedAttribute".to_string(),
        "GeneratedCodeAttribute".to_string(),
    ]
}

fn default_export_attributes() -> Vec<String> {
    vec!["ExportAttribute".to_string()]
}

fn default_delegate_bases() -> Vec<String> {
    vec![
        corlib::MULTICAST_DELEGATE.to_string(),
        corlib::DELEGATE.to_string(),
    ]
}

fn default_value_bases() -> Vec<String> {
    vec![corlib::VALUE_TYPE.to_string()]
}

fn default_excluded_overrides() -> Vec<String> {
    vec![corlib::FINALIZE.to_string()]
}

impl Default for WeavePolicy {
    fn default() -> Self {
        Self {
            delegate_suffix: default_delegate_suffix(),
            protocol_interface_suffix: default_protocol_suffix(),
            compiler_generated_attributes: default_generated_attributes(),
            export_attributes: default_export_attributes(),
            delegate_base_types: default_delegate_bases(),
            value_type_bases: default_value_bases(),
            excluded_overrides: default_excluded_overrides(),
        }
    }
}

impl WeavePolicy {
    /// Type name ends with the delegate suffix
    pub fn has_delegate_name(&self, ty: &TypeDef) -> bool {
        ty.simple_name().ends_with(&self.delegate_suffix)
    }

    /// Type derives directly from a delegate base
    pub fn is_delegate(&self, ty: &TypeDef) -> bool {
        ty.base
            .as_ref()
            .is_some_and(|b| self.delegate_base_types.contains(&b.full_name))
    }

    /// Type is a value type or enum
    pub fn is_value_type(&self, ty: &TypeDef) -> bool {
        ty.is_value_type()
            || ty
                .base
                .as_ref()
                .is_some_and(|b| self.value_type_bases.contains(&b.full_name))
    }

    /// Type is an enum
    pub fn is_enum(&self, ty: &TypeDef) -> bool {
        ty.is_enum()
            || ty
                .base
                .as_ref()
                .is_some_and(|b| b.full_name == corlib::ENUM)
    }

    /// Method was synthesized by a compiler
    pub fn is_compiler_generated(&self, method: &MethodDef) -> bool {
        self.compiler_generated_attributes
            .iter()
            .any(|a| method.has_attribute(a))
    }

    /// Method is exported to a foreign runtime
    pub fn is_exported(&self, method: &MethodDef) -> bool {
        self.export_attributes.iter().any(|a| method.has_attribute(a))
    }

    /// Interface name marks protocol methods
    pub fn is_protocol_interface(&self, simple_name: &str) -> bool {
        simple_name.ends_with(&self.protocol_interface_suffix)
    }

    /// Virtual method name is never overridden
    pub fn is_excluded_override(&self, name: &str) -> bool {
        self.excluded_overrides.iter().any(|n| n == name)
    }
}

impl WeaveConfig {
    /// Parse config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse config from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: WeaveConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.policy.delegate_suffix.is_empty() {
            return Err(ConfigError::ValidationError(
                "policy.delegate_suffix cannot be empty".to_string(),
            ));
        }
        if self.policy.protocol_interface_suffix.is_empty() {
            return Err(ConfigError::ValidationError(
                "policy.protocol_interface_suffix cannot be empty".to_string(),
            ));
        }
        if self.options.references.iter().any(|r| r.contains(';')) {
            return Err(ConfigError::ValidationError(
                "options.references entries must be single paths".to_string(),
            ));
        }
        Ok(())
    }
}

/// Build-task inputs
#[derive(Debug, Clone, Default)]
pub struct WeaveOptions {
    /// Module to weave, relative to `project_dir` when set
    pub assembly: PathBuf,
    /// Project directory
    pub project_dir: Option<PathBuf>,
    /// Output path; `None` weaves in place
    pub output: Option<PathBuf>,
    /// Semicolon-delimited referenced module paths
    pub references: String,
    /// Synthesize overrides for inherited virtual methods
    pub allow_override: bool,
    /// Write debug symbols
    pub debug_symbols: bool,
    /// Debug symbol flavor
    pub debug_type: Option<String>,
}

impl WeaveOptions {
    /// Options for weaving `assembly` in place
    pub fn new(assembly: impl Into<PathBuf>) -> Self {
        Self {
            assembly: assembly.into(),
            ..Self::default()
        }
    }

    /// Fill unset options from a config file section
    pub fn apply_config(&mut self, config: &ConfigOptions) {
        if let Some(allow) = config.allow_override {
            self.allow_override |= allow;
        }
        if let Some(debug) = config.debug_symbols {
            self.debug_symbols |= debug;
        }
        if self.debug_type.is_none() {
            self.debug_type = config.debug_type.clone();
        }
        for reference in &config.references {
            if !self.references.is_empty() {
                self.references.push(';');
            }
            self.references.push_str(reference);
        }
    }

    /// Resolved input path
    pub fn input_path(&self) -> PathBuf {
        match &self.project_dir {
            Some(dir) => dir.join(&self.assembly),
            None => self.assembly.clone(),
        }
    }

    /// Resolved output path (the input path when weaving in place)
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| self.input_path())
    }

    /// Whether debug symbols are requested
    pub fn write_symbols(&self) -> bool {
        self.debug_symbols
            || self
                .debug_type
                .as_deref()
                .is_some_and(|t| !t.is_empty() && !t.eq_ignore_ascii_case("none"))
    }
}
