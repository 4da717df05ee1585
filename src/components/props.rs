//! Custom property bag and its tagged-union value type.
//!
//! Entity properties, behavior config, and every value crossing the
//! script boundary are [`PropValue`]s: number, string, boolean, nil,
//! ordered sequence, or nested mapping. The sandbox conversion layer
//! translates between this type and Lua tables using a whitelist; unknown
//! host types never cross.

use bevy_ecs::prelude::Component;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Mapping of property keys to values.
pub type PropMap = FxHashMap<String, PropValue>;

/// Tagged-union value for entity properties and script data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
    Seq(Vec<PropValue>),
    Map(PropMap),
}

impl Default for PropValue {
    fn default() -> Self {
        PropValue::Nil
    }
}

impl PropValue {
    /// Lua-style truthiness: only nil and false are falsy.
    pub fn truthy(&self) -> bool {
        !matches!(self, PropValue::Nil | PropValue::Bool(false))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropValue::Number(n) => Some(*n),
            PropValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in conversion error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropValue::Nil => "nil",
            PropValue::Bool(_) => "boolean",
            PropValue::Number(_) => "number",
            PropValue::Str(_) => "string",
            PropValue::Seq(_) => "sequence",
            PropValue::Map(_) => "mapping",
        }
    }

    /// Convert a parsed YAML value. Non-string mapping keys are
    /// stringified; YAML tags are stripped to their inner value.
    pub fn from_yaml(value: &serde_yaml::Value) -> PropValue {
        match value {
            serde_yaml::Value::Null => PropValue::Nil,
            serde_yaml::Value::Bool(b) => PropValue::Bool(*b),
            serde_yaml::Value::Number(n) => PropValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_yaml::Value::String(s) => PropValue::Str(s.clone()),
            serde_yaml::Value::Sequence(seq) => {
                PropValue::Seq(seq.iter().map(PropValue::from_yaml).collect())
            }
            serde_yaml::Value::Mapping(map) => {
                let mut out = PropMap::default();
                for (k, v) in map {
                    let key = match k {
                        serde_yaml::Value::String(s) => s.clone(),
                        other => serde_yaml::to_string(other)
                            .unwrap_or_default()
                            .trim()
                            .to_string(),
                    };
                    out.insert(key, PropValue::from_yaml(v));
                }
                PropValue::Map(out)
            }
            serde_yaml::Value::Tagged(tagged) => PropValue::from_yaml(&tagged.value),
        }
    }
}

impl From<f64> for PropValue {
    fn from(n: f64) -> Self {
        PropValue::Number(n)
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Bool(b)
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::Str(s.to_string())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::Str(s)
    }
}

/// Writable per-entity property bag.
#[derive(Debug, Clone, Default, Component, Serialize, Deserialize)]
pub struct Props {
    pub map: PropMap,
}

impl Props {
    pub fn new(map: PropMap) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.map.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: PropValue) {
        self.map.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<PropValue> {
        self.map.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_lua() {
        assert!(!PropValue::Nil.truthy());
        assert!(!PropValue::Bool(false).truthy());
        assert!(PropValue::Bool(true).truthy());
        assert!(PropValue::Number(0.0).truthy());
        assert!(PropValue::Str(String::new()).truthy());
    }

    #[test]
    fn from_yaml_covers_scalars_and_nesting() {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str("{a: 1, b: [true, null], c: {d: x}}").unwrap();
        let v = PropValue::from_yaml(&yaml);
        let PropValue::Map(map) = v else {
            panic!("expected mapping");
        };
        assert_eq!(map["a"], PropValue::Number(1.0));
        assert_eq!(
            map["b"],
            PropValue::Seq(vec![PropValue::Bool(true), PropValue::Nil])
        );
        let PropValue::Map(inner) = &map["c"] else {
            panic!("expected nested mapping");
        };
        assert_eq!(inner["d"], PropValue::Str("x".into()));
    }
}
