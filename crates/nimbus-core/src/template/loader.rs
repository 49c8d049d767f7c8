//! Template resolution
//!
//! Determines which of the three manifest shapes is present by structural
//! validation, expands it into an ordered unit list, records dependency
//! edges, and enforces the cross-unit base-info invariant.

use crate::error::{Error, Result};
use crate::template::formats::{parse_manifest_file, MANIFEST_FILE_NAMES};
use crate::types::{Template, Unit, UnitIdentity};
use crate::variables::{resolve_inputs, OutputStore, ResolveMode};
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Find the first manifest candidate present in a directory
pub fn find_manifest_file(dir: &Utf8Path) -> Option<Utf8PathBuf> {
    MANIFEST_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Resolve the template at `root` (a manifest file or a directory).
///
/// Shape detection is structural: a parsed root qualifies as a single unit
/// or a multi-unit manifest based on its fields, and anything else falls
/// through to the directory scan. All units of one pass must agree on
/// org/app/stage.
pub fn resolve_template(root: &Utf8Path) -> Result<Template> {
    if root.is_file() {
        let value = parse_manifest_file(root)?;
        let dir = root
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from("."));
        let template = template_from_root_value(&value, root, &dir).ok_or_else(|| {
            Error::invalid_manifest(root.as_str(), "not an instance or template declaration")
        })??;
        return finish_template(template);
    }

    if !root.is_dir() {
        return Err(Error::manifest_not_found(root.as_str()));
    }

    // Root-level candidates are tried in priority order; a candidate that
    // fails to parse or does not match a known shape is skipped in favor
    // of the next one, and finally of the directory scan.
    for name in MANIFEST_FILE_NAMES {
        let candidate = root.join(name);
        if !candidate.is_file() {
            continue;
        }
        match parse_manifest_file(&candidate) {
            Ok(value) => {
                if let Some(template) = template_from_root_value(&value, &candidate, root) {
                    return finish_template(template?);
                }
                debug!("{candidate} is not a root manifest, continuing");
            }
            Err(err) => {
                debug!("Skipping unparsable candidate {candidate}: {err}");
            }
        }
    }

    finish_template(scan_directory(root)?)
}

/// Classify a parsed root value. `None` means the value matches neither
/// root shape and the caller should fall back to the directory scan.
fn template_from_root_value(
    value: &Value,
    path: &Utf8Path,
    dir: &Utf8Path,
) -> Option<Result<Template>> {
    if is_single_unit(value) {
        return Some(single_unit_template(value, path, dir));
    }
    if is_multi_unit(value) {
        return Some(multi_unit_template(value, path, dir));
    }
    None
}

/// A candidate object qualifies as a single unit only with string app,
/// stage, name and component.
fn is_single_unit(value: &Value) -> bool {
    ["app", "stage", "name", "component"]
        .iter()
        .all(|field| value.get(field).map(Value::is_string).unwrap_or(false))
}

/// Multi-unit: string app and stage plus an `instances` mapping.
fn is_multi_unit(value: &Value) -> bool {
    ["app", "stage"]
        .iter()
        .all(|field| value.get(field).map(Value::is_string).unwrap_or(false))
        && value.get("instances").map(Value::is_object).unwrap_or(false)
}

fn single_unit_template(value: &Value, path: &Utf8Path, dir: &Utf8Path) -> Result<Template> {
    let unit = unit_from_value(value, path, dir)?;
    Ok(Template {
        units: vec![unit],
        hooks: hooks_from_value(value, path)?,
    })
}

fn multi_unit_template(value: &Value, path: &Utf8Path, dir: &Utf8Path) -> Result<Template> {
    let org = optional_string(value, "org");
    let app = require_string(value, "app", path)?;
    let stage = require_string(value, "stage", path)?;

    let instances = value
        .get("instances")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::invalid_manifest(path.as_str(), "instances must be a mapping"))?;

    let mut units = Vec::new();
    // serde_json object iteration is name-ordered, keeping the pass
    // deterministic
    for (key, entry) in instances {
        let component = entry
            .get("component")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::invalid_manifest(
                    path.as_str(),
                    format!("instance '{key}' is missing a component"),
                )
            })?;

        let identity = UnitIdentity {
            org: org.clone(),
            app: app.clone(),
            stage: stage.clone(),
            name: entry
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(key)
                .to_string(),
            component: component.to_string(),
        };
        units.push(build_unit(
            identity,
            entry.get("inputs").cloned().unwrap_or(Value::Null),
            dir,
        ));
    }

    Ok(Template {
        units,
        hooks: hooks_from_value(value, path)?,
    })
}

/// Directory scan: one candidate unit per child directory holding a
/// manifest file. A present-but-invalid manifest is fatal here; explicit
/// misconfiguration must not be silently dropped.
fn scan_directory(root: &Utf8Path) -> Result<Template> {
    let mut children: Vec<Utf8PathBuf> = root
        .read_dir_utf8()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| path.is_dir())
        .collect();
    children.sort();

    let mut units = Vec::new();
    for child in children {
        let Some(manifest) = find_manifest_file(&child) else {
            debug!("No manifest in {child}, skipping");
            continue;
        };

        let value = parse_manifest_file(&manifest)
            .map_err(|err| Error::invalid_manifest(manifest.as_str(), err.to_string()))?;

        if !is_single_unit(&value) {
            return Err(Error::invalid_manifest(
                manifest.as_str(),
                "not a valid instance declaration (app, stage, name, component required)",
            ));
        }
        units.push(unit_from_value(&value, &manifest, &child)?);
    }

    Ok(Template {
        units,
        hooks: BTreeMap::new(),
    })
}

fn unit_from_value(value: &Value, path: &Utf8Path, dir: &Utf8Path) -> Result<Unit> {
    let identity = UnitIdentity {
        org: optional_string(value, "org"),
        app: require_string(value, "app", path)?,
        stage: require_string(value, "stage", path)?,
        name: require_string(value, "name", path)?,
        component: require_string(value, "component", path)?,
    };
    Ok(build_unit(
        identity,
        value.get("inputs").cloned().unwrap_or(Value::Null),
        dir,
    ))
}

/// Resolve variables in env-only mode, populating the dependency set.
fn build_unit(identity: UnitIdentity, inputs: Value, dir: &Utf8Path) -> Unit {
    let resolution = resolve_inputs(
        &inputs,
        &identity,
        ResolveMode::EnvOnly,
        &OutputStore::new(),
    );
    Unit {
        identity,
        inputs: resolution.inputs,
        deps: resolution.deps,
        root: dir.to_path_buf(),
    }
}

fn hooks_from_value(value: &Value, path: &Utf8Path) -> Result<BTreeMap<String, String>> {
    let Some(hooks) = value.get("hooks") else {
        return Ok(BTreeMap::new());
    };
    let map = hooks
        .as_object()
        .ok_or_else(|| Error::invalid_manifest(path.as_str(), "hooks must be a mapping"))?;

    let mut out = BTreeMap::new();
    for (key, handler) in map {
        let handler = handler.as_str().ok_or_else(|| {
            Error::invalid_manifest(path.as_str(), format!("hook '{key}' must name a handler"))
        })?;
        out.insert(key.clone(), handler.to_string());
    }
    Ok(out)
}

fn require_string(value: &Value, field: &str, path: &Utf8Path) -> Result<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            Error::invalid_manifest(path.as_str(), format!("missing required field '{field}'"))
        })
}

fn optional_string(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Cross-unit invariant plus the no-units check; every resolution path
/// funnels through here.
fn finish_template(template: Template) -> Result<Template> {
    let Some(first) = template.units.first() else {
        return Err(Error::no_units("the resolved template"));
    };

    for unit in &template.units[1..] {
        for (field, a, b) in [
            ("org", &unit.identity.org, &first.identity.org),
            (
                "app",
                &Some(unit.identity.app.clone()),
                &Some(first.identity.app.clone()),
            ),
            (
                "stage",
                &Some(unit.identity.stage.clone()),
                &Some(first.identity.stage.clone()),
            ),
        ] {
            if a != b {
                return Err(Error::base_info_mismatch(
                    unit.identity.name.clone(),
                    first.identity.name.clone(),
                    field,
                ));
            }
        }
    }

    let mut names = std::collections::BTreeSet::new();
    for unit in &template.units {
        if !names.insert(unit.identity.name.as_str()) {
            return Err(Error::invalid_manifest(
                unit.root.as_str(),
                format!("duplicate instance name '{}'", unit.identity.name),
            ));
        }
    }

    Ok(template)
}
