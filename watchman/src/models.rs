//! Argument and result types of the typed commands.

use serde::ser::{Serialize, Serializer};
use serde_derive::{Deserialize, Serialize};

use crate::expr::Expr;

/// Per-root configuration as reported by `get-config`.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WatchmanConfig {
    pub settle: Option<u64>,
    pub root_restrict_files: Vec<String>,
    pub root_files: Vec<String>,
    pub enforce_root_files: bool,
    pub illegal_fstypes: Vec<String>,
    pub illegal_fstypes_advice: Option<String>,
    pub ignore_vcs: Vec<String>,
    pub ignore_dirs: Vec<String>,
    pub gc_age_seconds: Option<u64>,
    pub gc_interval_seconds: Option<u64>,
    pub fsevents_latency: Option<f64>,
    pub idle_reap_age_seconds: Option<u64>,
}

/// One file in a query result.
///
/// Which fields are present depends on the `fields` requested; everything
/// but the name is optional.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct File {
    pub name: String,
    pub exists: Option<bool>,
    pub cclock: Option<String>,
    pub oclock: Option<String>,
    pub mtime: Option<i64>,
    pub mtime_ms: Option<i64>,
    pub mtime_us: Option<i64>,
    pub mtime_ns: Option<i64>,
    pub mtime_f: Option<f64>,
    pub ctime: Option<i64>,
    pub ctime_ms: Option<i64>,
    pub ctime_us: Option<i64>,
    pub ctime_ns: Option<i64>,
    pub ctime_f: Option<f64>,
    pub size: Option<u64>,
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub ino: Option<u64>,
    pub dev: Option<u64>,
    pub nlink: Option<u64>,
    pub new: Option<bool>,
    #[serde(rename = "type")]
    pub file_type: Option<String>,
}

/// A path generator for `query`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Path {
    pub path: String,
    pub depth: i64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct QueryOptions {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suffix: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<Expr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Path>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub glob: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_timeout: Option<u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub empty_on_fresh_instance: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_root: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueryResult {
    pub clock: String,
    pub files: Vec<File>,
    pub is_fresh_instance: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SubscriptionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<Expr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub defer_vcs_keys: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub defer_vcs: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_root: Option<String>,
}

/// One subscription notification.
///
/// `files` holds raw JSON because its shape follows the subscription's
/// `fields`: plain names for a single field, objects otherwise.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SubscriptionEvent {
    pub version: Option<String>,
    pub clock: String,
    pub files: Vec<serde_json::Value>,
    pub root: String,
    pub subscription: String,
    pub is_fresh_instance: bool,
    pub unilateral: bool,
}

impl SubscriptionEvent {
    /// Names of the changed files, for either shape of `files`.
    pub fn file_names(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter_map(|f| match f {
                serde_json::Value::String(s) => Some(s.as_str()),
                serde_json::Value::Object(o) => o.get("name").and_then(|n| n.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// What a trigger's command receives on its standard input.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Stdin {
    #[default]
    DevNull,
    /// One changed file name per line
    NamePerLine,
    /// A JSON array of file objects with these fields
    Array(Vec<String>),
}

impl Serialize for Stdin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Stdin::DevNull => serializer.serialize_str("/dev/null"),
            Stdin::NamePerLine => serializer.serialize_str("NAME_PER_LINE"),
            Stdin::Array(fields) => fields.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerOptions {
    pub name: String,
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub append_files: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<Expr>,
    pub stdin: Stdin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_files_stdin: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chdir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_root: Option<String>,
}

impl TriggerOptions {
    pub fn new<S: Into<String>>(name: S, command: Vec<String>) -> Self {
        TriggerOptions {
            name: name.into(),
            command,
            append_files: false,
            expression: None,
            stdin: Stdin::default(),
            stdout: None,
            stderr: None,
            max_files_stdin: None,
            chdir: None,
            relative_root: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WatchProject {
    pub watch: String,
    #[serde(default)]
    pub relative_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr;
    use serde_json::json;

    #[test]
    fn test_stdin_variants() {
        assert_eq!(serde_json::to_value(Stdin::DevNull).unwrap(), json!("/dev/null"));
        assert_eq!(
            serde_json::to_value(Stdin::NamePerLine).unwrap(),
            json!("NAME_PER_LINE")
        );
        assert_eq!(
            serde_json::to_value(Stdin::Array(vec!["name".into(), "size".into()])).unwrap(),
            json!(["name", "size"])
        );
    }

    #[test]
    fn test_trigger_options_skip_unset() {
        let mut opts = TriggerOptions::new("build", vec!["make".into()]);
        opts.expression = Some(expr::suffix("c"));
        opts.stdin = Stdin::NamePerLine;
        assert_eq!(
            serde_json::to_value(&opts).unwrap(),
            json!({
                "name": "build",
                "command": ["make"],
                "expression": ["suffix", "c"],
                "stdin": "NAME_PER_LINE"
            })
        );
    }

    #[test]
    fn test_query_options_serialize_only_set_fields() {
        let opts = QueryOptions {
            suffix: vec!["rs".into()],
            fields: vec!["name".into(), "size".into()],
            empty_on_fresh_instance: true,
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&opts).unwrap(),
            json!({
                "suffix": ["rs"],
                "fields": ["name", "size"],
                "empty_on_fresh_instance": true
            })
        );
    }

    #[test]
    fn test_subscription_event_file_names() {
        let names: SubscriptionEvent = serde_json::from_value(json!({
            "subscription": "s", "root": "/r", "clock": "c:1:1",
            "files": ["a.rs", "b.rs"]
        }))
        .unwrap();
        assert_eq!(names.file_names(), vec!["a.rs", "b.rs"]);

        let objects: SubscriptionEvent = serde_json::from_value(json!({
            "subscription": "s", "root": "/r", "clock": "c:1:2",
            "files": [{"name": "a.rs", "exists": true}]
        }))
        .unwrap();
        assert_eq!(objects.file_names(), vec!["a.rs"]);
    }

    #[test]
    fn test_file_partial_fields() {
        let f: File = serde_json::from_value(json!({"name": "x", "size": 3, "type": "f"})).unwrap();
        assert_eq!(f.name, "x");
        assert_eq!(f.size, Some(3));
        assert_eq!(f.file_type.as_deref(), Some("f"));
        assert!(f.exists.is_none());
    }
}
