//! Error types for nimbus-core

use thiserror::Error;

/// Result type alias using nimbus-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal, pre-flight error taxonomy for Nimbus
///
/// Everything in this enum aborts the whole invocation before any remote
/// mutation. Per-unit runtime failures are values (`UnitReport`), not
/// variants here.
#[derive(Error, Debug)]
pub enum Error {
    /// No manifest file found at or above the given path
    #[error("Manifest not found: {path} (looked for nimbus.yml, nimbus.yaml, nimbus.json, nimbus.lua)")]
    ManifestNotFound { path: String },

    /// A manifest file exists but is not a valid unit declaration
    #[error("Invalid manifest at {path}: {message}")]
    InvalidManifest { path: String, message: String },

    /// Units in one resolution pass disagree on org/app/stage
    #[error("Instance '{unit}' does not share {field} with '{other}': all instances in one template must agree on org, app and stage")]
    BaseInfoMismatch {
        unit: String,
        other: String,
        field: String,
    },

    /// Dependency cycle between units
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// A declared hook names a handler that was never registered
    #[error("Hook '{key}' refers to unknown handler '{handler}'")]
    UnknownHook { key: String, handler: String },

    /// Package exceeds the upload budget
    #[error("Package for '{unit}' is {size} which exceeds the {limit} limit")]
    PackageTooLarge {
        unit: String,
        size: String,
        limit: String,
    },

    /// Resolution produced no deployable units
    #[error("No deployable instances found under {path}")]
    NoUnits { path: String },

    /// dev/logs require at least one function-kind unit
    #[error("'{action}' requires at least one function instance in the template")]
    NoFunctionUnits { action: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Lua manifest evaluation error
    #[error("Lua manifest error: {0}")]
    LuaEval(#[from] mlua::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a manifest not found error
    pub fn manifest_not_found(path: impl Into<String>) -> Self {
        Self::ManifestNotFound { path: path.into() }
    }

    /// Create an invalid manifest error
    pub fn invalid_manifest(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidManifest {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a base-info mismatch error
    pub fn base_info_mismatch(
        unit: impl Into<String>,
        other: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::BaseInfoMismatch {
            unit: unit.into(),
            other: other.into(),
            field: field.into(),
        }
    }

    /// Create a circular dependency error from the cycle path
    pub fn circular_dependency(cycle: impl Into<String>) -> Self {
        Self::CircularDependency {
            cycle: cycle.into(),
        }
    }

    /// Create an unknown hook error
    pub fn unknown_hook(key: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::UnknownHook {
            key: key.into(),
            handler: handler.into(),
        }
    }

    /// Create a package size error with human-readable sizes
    pub fn package_too_large(unit: impl Into<String>, size_bytes: u64, limit_bytes: u64) -> Self {
        Self::PackageTooLarge {
            unit: unit.into(),
            size: human_bytes(size_bytes),
            limit: human_bytes(limit_bytes),
        }
    }

    /// Create a no-units error
    pub fn no_units(path: impl Into<String>) -> Self {
        Self::NoUnits { path: path.into() }
    }

    /// Create a no-function-units error
    pub fn no_function_units(action: impl Into<String>) -> Self {
        Self::NoFunctionUnits {
            action: action.into(),
        }
    }
}

/// Formats bytes as a human-readable string.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}
