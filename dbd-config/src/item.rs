use serde::Deserialize;
use serde_json::Value;

use dbd_core::error::{DbdError, Result};

use crate::value::{TypedValue, ValueType};

/// Post-startup mutation policy for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifyLimit {
    #[default]
    None,
    /// The value must never change after startup.
    #[serde(alias = "forbid-change")]
    Modify,
    /// The value must never grow after startup.
    #[serde(alias = "forbid-increase")]
    Increase,
    /// The value must never shrink after startup.
    #[serde(alias = "forbid-decrease")]
    Decrease,
}

/// One raw item declaration as it appears in `parameter.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(default, rename = "type")]
    pub value_type: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub min_value: Option<Value>,
    #[serde(default)]
    pub max_value: Option<Value>,
    #[serde(default)]
    pub require: bool,
    #[serde(default)]
    pub essential: bool,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub need_reload: bool,
    #[serde(default)]
    pub need_restart: bool,
    #[serde(default)]
    pub need_redeploy: bool,
    #[serde(default)]
    pub modify_limit: ModifyLimit,
    #[serde(default)]
    pub description_en: Option<String>,
}

/// A validated parameter declaration. Bounds are parsed into the typed
/// domain eagerly, so a descriptor with malformed bounds is rejected at
/// construction rather than at first check.
#[derive(Debug, Clone)]
pub struct ConfigItem {
    pub name: String,
    pub value_type: ValueType,
    pub default: Option<Value>,
    pub min_value: Option<TypedValue>,
    pub max_value: Option<TypedValue>,
    pub require: bool,
    pub essential: bool,
    pub section: String,
    pub need_reload: bool,
    pub need_restart: bool,
    pub need_redeploy: bool,
    pub modify_limit: ModifyLimit,
    pub description: Option<String>,
}

impl ConfigItem {
    pub fn from_spec(spec: ParamSpec) -> Result<Self> {
        let value_type = spec
            .value_type
            .as_deref()
            .map(ValueType::from_decl)
            .unwrap_or(ValueType::String);
        let min_value = spec
            .min_value
            .as_ref()
            .map(|raw| value_type.parse(raw))
            .transpose()
            .map_err(|e| DbdError::Config(format!("{}: {}", spec.name, e)))?;
        let max_value = spec
            .max_value
            .as_ref()
            .map(|raw| value_type.parse(raw))
            .transpose()
            .map_err(|e| DbdError::Config(format!("{}: {}", spec.name, e)))?;
        Ok(ConfigItem {
            name: spec.name,
            value_type,
            default: spec.default,
            min_value,
            max_value,
            require: spec.require,
            essential: spec.essential,
            section: spec.section,
            need_reload: spec.need_reload,
            need_restart: spec.need_restart,
            need_redeploy: spec.need_redeploy,
            modify_limit: spec.modify_limit,
            description: spec.description_en,
        })
    }

    pub fn has_modify_limit(&self) -> bool {
        self.modify_limit != ModifyLimit::None
    }

    /// Normalizes a raw value; failures carry the item name.
    pub fn parse_value(&self, raw: &Value) -> Result<TypedValue> {
        self.value_type
            .parse(raw)
            .map_err(|e| DbdError::Config(format!("{}: {}", self.name, e)))
    }

    /// Normalizes and checks declared bounds in the typed domain.
    pub fn check_value(&self, raw: &Value) -> Result<TypedValue> {
        let value = self.parse_value(raw)?;
        if let Some(min) = &self.min_value {
            if value < *min {
                return Err(DbdError::Validation(format!(
                    "{} less than {:?}",
                    self.name, min
                )));
            }
        }
        if let Some(max) = &self.max_value {
            if value > *max {
                return Err(DbdError::Validation(format!(
                    "{} more than {:?}",
                    self.name, max
                )));
            }
        }
        Ok(value)
    }

    /// Enforces the modify-limit policy between a running value and a
    /// proposed one. Comparisons happen on the normalized representation.
    pub fn check_modify(&self, old: &Value, new: &Value) -> Result<()> {
        match self.modify_limit {
            ModifyLimit::None => Ok(()),
            ModifyLimit::Modify => {
                if self.parse_value(old)? == self.parse_value(new)? {
                    Ok(())
                } else {
                    Err(DbdError::Validation(format!(
                        "DO NOT modify {} after startup",
                        self.name
                    )))
                }
            }
            ModifyLimit::Increase => {
                if self.parse_value(new)? > self.parse_value(old)? {
                    Err(DbdError::Validation(format!(
                        "DO NOT increase {} after startup",
                        self.name
                    )))
                } else {
                    Ok(())
                }
            }
            ModifyLimit::Decrease => {
                if self.parse_value(new)? < self.parse_value(old)? {
                    Err(DbdError::Validation(format!(
                        "DO NOT decrease {} after startup",
                        self.name
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(yaml: &str) -> ConfigItem {
        let spec: ParamSpec = serde_yaml_ng::from_str(yaml).expect("should parse spec");
        ConfigItem::from_spec(spec).expect("should build item")
    }

    #[test]
    fn test_bounds_checked_in_typed_domain() {
        let memory = item(
            r#"
name: memory_limit
type: CAPACITY
default: 8G
min_value: 1G
max_value: 64G
need_restart: true
"#,
        );

        assert!(memory.check_value(&json!("8G")).is_ok());
        // 2048M == 2G sits inside [1G, 64G] even though the raw string
        // compares differently.
        assert!(memory.check_value(&json!("2048M")).is_ok());
        assert!(memory.check_value(&json!("512M")).is_err());
        assert!(memory.check_value(&json!("128G")).is_err());
        assert!(memory.need_restart);
    }

    #[test]
    fn test_parse_failure_carries_item_name() {
        let memory = item("name: memory_limit\ntype: CAPACITY\n");
        let err = memory.check_value(&json!("lots")).unwrap_err();
        assert!(err.to_string().contains("memory_limit"));
    }

    #[test]
    fn test_malformed_bound_rejected_eagerly() {
        let spec: ParamSpec =
            serde_yaml_ng::from_str("name: t\ntype: TIME\nmin_value: sometimes\n")
                .expect("should parse spec");
        assert!(ConfigItem::from_spec(spec).is_err());
    }

    #[test]
    fn test_forbid_increase() {
        let cap = item("name: datafile_size\ntype: INT\nmodify_limit: increase\n");
        assert!(cap.check_modify(&json!(10), &json!(5)).is_ok());
        assert!(cap.check_modify(&json!(10), &json!(10)).is_ok());
        assert!(cap.check_modify(&json!(10), &json!(20)).is_err());
    }

    #[test]
    fn test_forbid_decrease() {
        let cap = item("name: datafile_size\ntype: CAPACITY\nmodify_limit: decrease\n");
        assert!(cap.check_modify(&json!("10G"), &json!("20G")).is_ok());
        assert!(cap.check_modify(&json!("10G"), &json!("5G")).is_err());
    }

    #[test]
    fn test_forbid_change() {
        let home = item("name: home_path\nmodify_limit: modify\n");
        assert!(home.check_modify(&json!("/data"), &json!("/data")).is_ok());
        assert!(home.check_modify(&json!("/data"), &json!("/tmp")).is_err());
    }

    #[test]
    fn test_modify_limit_aliases() {
        let a = item("name: x\nmodify_limit: forbid-increase\n");
        assert_eq!(a.modify_limit, ModifyLimit::Increase);
        let b = item("name: x\n");
        assert_eq!(b.modify_limit, ModifyLimit::None);
        assert!(!b.has_modify_limit());
        assert!(a.has_modify_limit());
    }

    #[test]
    fn test_modify_compare_uses_normalized_values() {
        let t = item("name: timeout\ntype: TIME\nmodify_limit: increase\n");
        // "2h" > "3600s" in the typed domain.
        assert!(t.check_modify(&json!("3600s"), &json!("2h")).is_err());
        assert!(t.check_modify(&json!("2h"), &json!("3600s")).is_ok());
        // "1h" == "60m": no change.
        assert!(t.check_modify(&json!("1h"), &json!("60m")).is_ok());
    }
}
