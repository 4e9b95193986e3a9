//! `${name}` parameters in suite files.

use crate::{Error, Result};
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Values supplied at run time (settings seed, `-P key=value`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: BTreeMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Layer `other` on top; its values win.
    pub fn merge(mut self, other: Params) -> Self {
        self.values.extend(other.values);
        self
    }

    /// Parse CLI arguments of the form `key=value`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut params = Self::new();
        for arg in args {
            let (key, value) = arg
                .split_once('=')
                .filter(|(k, _)| !k.trim().is_empty())
                .ok_or_else(|| {
                    Error::Config(format!("invalid param '{}', expected key=value", arg))
                })?;
            params.values.insert(key.trim().to_string(), value.to_string());
        }
        Ok(params)
    }
}

/// A parameter a suite declares under `params:`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParamDef {
    #[serde(default)]
    pub required: bool,
    pub default: Option<String>,
    pub description: Option<String>,
}

/// Replace every `${name}` in `template`.
///
/// Supplied values win over declared defaults. A declared parameter with
/// neither becomes empty unless it is required. Undeclared, unsupplied
/// placeholders are left as written.
pub fn substitute(
    template: &str,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<String> {
    let mut missing = None;
    let out = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        if let Some(v) = params.get(name) {
            return v.to_string();
        }
        match defs.get(name) {
            Some(ParamDef {
                default: Some(d), ..
            }) => d.clone(),
            Some(def) if def.required => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
            Some(_) => String::new(),
            None => caps[0].to_string(),
        }
    });
    match missing {
        Some(name) => Err(Error::Config(format!(
            "missing required parameter: {}",
            name
        ))),
        None => Ok(out.into_owned()),
    }
}

/// Substitute parameters in every string of a YAML tree.
pub fn substitute_value(
    value: &mut serde_yaml::Value,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<()> {
    match value {
        serde_yaml::Value::String(s) => *s = substitute(s, params, defs)?,
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute_value(v, params, defs)?;
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for v in seq.iter_mut() {
                substitute_value(v, params, defs)?;
            }
        }
        serde_yaml::Value::Tagged(tagged) => substitute_value(&mut tagged.value, params, defs)?,
        _ => {}
    }
    Ok(())
}
