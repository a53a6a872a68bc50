//! Outbound commands.
//!
//! The watchman protocol is positional: a command is a JSON array whose first
//! element is the verb and whose remaining elements are the arguments, in
//! order.

use serde::ser::Serialize;
use serde_json::Value;

/// A watchman command: a verb followed by positional arguments.
///
/// Arguments are converted to JSON as they are added. A conversion failure is
/// held until the command is encoded, so builders can stay infallible.
///
/// ```
/// use watchman::Command;
///
/// let cmd = Command::new("clock").arg("/tmp/x");
/// assert_eq!(cmd.to_value().unwrap(), serde_json::json!(["clock", "/tmp/x"]));
/// ```
#[derive(Debug)]
pub struct Command {
    verb: String,
    args: Vec<Value>,
    error: Option<serde_json::Error>,
}

impl Command {
    pub fn new<S: Into<String>>(verb: S) -> Self {
        Command {
            verb: verb.into(),
            args: Vec::new(),
            error: None,
        }
    }

    /// Append one positional argument.
    pub fn arg<T: Serialize>(mut self, value: T) -> Self {
        if self.error.is_none() {
            match serde_json::to_value(value) {
                Ok(v) => self.args.push(v),
                Err(e) => self.error = Some(e),
            }
        }
        self
    }

    /// Append each item as its own positional argument.
    pub fn args<I, T>(self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Serialize,
    {
        values.into_iter().fold(self, Command::arg)
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// The command as the JSON array that goes on the wire.
    pub fn to_value(&self) -> Result<Value, &serde_json::Error> {
        if let Some(ref e) = self.error {
            return Err(e);
        }
        let mut array = Vec::with_capacity(self.args.len() + 1);
        array.push(Value::String(self.verb.clone()));
        array.extend(self.args.iter().cloned());
        Ok(Value::Array(array))
    }

    pub(crate) fn into_value(self) -> Result<Value, serde_json::Error> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let mut array = Vec::with_capacity(self.args.len() + 1);
        array.push(Value::String(self.verb));
        array.extend(self.args);
        Ok(Value::Array(array))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_argument_order_is_preserved() {
        let cmd = Command::new("since")
            .arg("/src")
            .arg("c:1:2")
            .args(["*.rs", "*.toml"]);
        assert_eq!(
            cmd.into_value().unwrap(),
            json!(["since", "/src", "c:1:2", "*.rs", "*.toml"])
        );
    }

    #[test]
    fn test_verb_only() {
        let cmd = Command::new("version");
        assert_eq!(cmd.verb(), "version");
        assert_eq!(cmd.into_value().unwrap(), json!(["version"]));
    }

    #[test]
    fn test_argument_error_is_deferred() {
        // Maps with non-string keys cannot become JSON objects.
        let mut bad = BTreeMap::new();
        bad.insert(vec![1u8], 1u8);
        let cmd = Command::new("query").arg("/src").arg(bad).arg("ignored");
        assert!(cmd.to_value().is_err());
        assert!(cmd.into_value().is_err());
    }
}
