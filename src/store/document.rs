use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::StoreError;

/// Settings of one extension: string keys to arbitrary JSON values.
pub type ModuleSettings = Map<String, Value>;

/// Registered defaults per extension id.
pub type ExtensionDefaults = HashMap<String, ModuleSettings>;

pub(crate) const HEADER: &str =
    "/*************** AUTO GENERATED BY REMOTE CONTROL MODULE ***************/\n\nvar config = \n";
pub(crate) const FOOTER: &str = "\n\n/*************** DO NOT EDIT THE LINE BELOW ***************/\nif (typeof module !== 'undefined') {module.exports = config;}\n";

/// Marker that starts the export trailer in the live file.
const EXPORT_MARKER: &str = "if (typeof module";

const DECLARATIONS: [&str; 3] = ["var config", "let config", "const config"];

/// The host application's configuration document.
///
/// Only the extension list is interpreted; every other top-level key is
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// One extension instance in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ModuleSettings>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        let value = json!({
            "address": "localhost",
            "port": 8080,
            "kioskmode": false,
            "ipWhitelist": ["127.0.0.1", "::ffff:127.0.0.1", "::1"],
            "language": "en",
            "timeFormat": 24,
            "units": "metric",
            "zoom": 1,
            "modules": [
                {
                    "module": "helloworld",
                    "position": "upper_third",
                    "config": {
                        "text": "Please create a config file."
                    }
                }
            ],
            "paths": {
                "modules": "modules",
                "vendor": "vendor"
            }
        });
        match serde_json::from_value(value) {
            Ok(doc) => doc,
            Err(_) => Self {
                modules: Vec::new(),
                rest: Map::new(),
            },
        }
    }
}

impl ConfigDocument {
    /// Reject documents the host application cannot start with.
    pub fn validate(&self) -> Result<(), StoreError> {
        for (i, entry) in self.modules.iter().enumerate() {
            if entry.module.trim().is_empty() {
                return Err(StoreError::Invalid(format!("modules[{i}] has an empty module name")));
            }
        }
        Ok(())
    }

    /// Decode a document from a JSON value, overlaying its top-level keys
    /// on the built-in defaults.
    pub fn from_value_over_defaults(value: Value) -> Result<Self, StoreError> {
        let Value::Object(loaded) = value else {
            return Err(StoreError::Invalid("configuration is not an object".into()));
        };
        let mut base = match serde_json::to_value(Self::default()) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        for (key, value) in loaded {
            base.insert(key, value);
        }
        let doc: Self = serde_json::from_value(Value::Object(base))
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        doc.validate()?;
        Ok(doc)
    }
}

/// Extract the configuration object from the executable wrapper.
///
/// Hand-written files use object-literal syntax (unquoted keys, comments,
/// single quotes, trailing commas), so the object is read as JSON5.
pub fn parse_source(source: &str) -> Result<ConfigDocument, StoreError> {
    let body = match source.find(EXPORT_MARKER) {
        Some(idx) => &source[..idx],
        None => source,
    };
    // Skip any leading comment block; the object starts after the binding.
    let from = DECLARATIONS
        .iter()
        .filter_map(|decl| body.find(decl))
        .min()
        .unwrap_or(0);
    let (start, end) = match (body[from..].find('{'), body.rfind('}')) {
        (Some(s), Some(e)) if from + s < e => (from + s, e),
        _ => return Err(StoreError::Malformed("no configuration object found".into())),
    };
    let value: Value =
        json5::from_str(&body[start..=end]).map_err(|e| StoreError::Malformed(e.to_string()))?;
    ConfigDocument::from_value_over_defaults(value)
}

/// Serialize with the fixed header and footer so the host can load the file
/// directly as its configuration script.
pub fn render_source(doc: &ConfigDocument) -> Result<String, StoreError> {
    let mut body = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut body, formatter);
    doc.serialize(&mut ser).map_err(StoreError::Serialize)?;
    let body = String::from_utf8_lossy(&body);
    Ok(format!("{HEADER}{body}{FOOTER}"))
}

/// Read the live document, falling back to the defaults on any failure.
///
/// Never fails: a missing file, a syntax error, and a validation error are
/// each logged and answered with [`ConfigDocument::default`].
pub fn load_or_default(path: &Path) -> ConfigDocument {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(
                path = %path.display(),
                "could not find config file, starting with default configuration"
            );
            return ConfigDocument::default();
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "could not load config file, starting with default configuration"
            );
            return ConfigDocument::default();
        }
    };

    match parse_source(&source) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "could not validate config file, starting with default configuration"
            );
            ConfigDocument::default()
        }
    }
}

/// Fill in missing extension settings from the registered defaults.
///
/// Entries without a settings object get an empty one; default keys absent
/// from an entry's settings are copied in. Existing values always win.
pub fn merge_defaults(doc: &ConfigDocument, defaults: &ExtensionDefaults) -> ConfigDocument {
    let mut merged = doc.clone();
    for entry in &mut merged.modules {
        let settings = entry.config.get_or_insert_with(Map::new);
        if let Some(module_defaults) = defaults.get(&entry.module) {
            for (key, value) in module_defaults {
                if !settings.contains_key(key) {
                    settings.insert(key.clone(), value.clone());
                }
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(value: Value) -> ConfigDocument {
        serde_json::from_value(value).unwrap()
    }

    fn defaults() -> ExtensionDefaults {
        let mut d = ExtensionDefaults::new();
        d.insert(
            "clock".into(),
            json!({"timeFormat": 24, "showDate": true}).as_object().unwrap().clone(),
        );
        d
    }

    #[test]
    fn merge_fills_missing_settings_and_keys() {
        let input = doc(json!({
            "modules": [
                {"module": "clock", "position": "top_left", "config": {"showDate": false}},
                {"module": "clock"},
                {"module": "unknown"}
            ]
        }));
        let merged = merge_defaults(&input, &defaults());

        let first = merged.modules[0].config.as_ref().unwrap();
        assert_eq!(first["showDate"], false, "existing value wins");
        assert_eq!(first["timeFormat"], 24);
        assert_eq!(merged.modules[0].rest["position"], "top_left");

        let second = merged.modules[1].config.as_ref().unwrap();
        assert_eq!(second["showDate"], true);

        assert!(merged.modules[2].config.as_ref().unwrap().is_empty());
    }

    #[test]
    fn merge_is_idempotent() {
        let input = doc(json!({
            "modules": [{"module": "clock"}, {"module": "other", "config": {"a": 1}}]
        }));
        let once = merge_defaults(&input, &defaults());
        let twice = merge_defaults(&once, &defaults());
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_leaves_inputs_untouched() {
        let input = doc(json!({"modules": [{"module": "clock"}]}));
        let d = defaults();
        let _ = merge_defaults(&input, &d);
        assert!(input.modules[0].config.is_none());
        assert_eq!(d["clock"].len(), 2);
    }

    #[test]
    fn render_then_parse_keeps_document() {
        let input = doc(json!({
            "language": "de",
            "modules": [{"module": "clock", "config": {"timeFormat": 12}}]
        }));
        let source = render_source(&input).unwrap();
        assert!(source.starts_with(HEADER));
        assert!(source.ends_with(FOOTER));
        assert!(source.contains("\n    \"language\": \"de\""), "four-space indent");

        let parsed = parse_source(&source).unwrap();
        assert_eq!(parsed.rest["language"], "de");
        assert_eq!(parsed.modules, input.modules);
    }

    #[test]
    fn parse_handwritten_wrapper() {
        let source = r#"var config = {
            "port": 9090,
            "modules": [{"module": "clock"}]
        };
        if (typeof module !== 'undefined') {module.exports = config;}"#;
        let parsed = parse_source(source).unwrap();
        assert_eq!(parsed.rest["port"], 9090);
        assert_eq!(parsed.rest["language"], "en", "defaults fill unspecified keys");
    }

    #[test]
    fn parse_object_literal_config() {
        let source = r#"/* Config Sample
 *
 * For more information see the documentation { online }.
 */
let config = {
	address: "localhost", // only local clients
	port: 8080,
	ipWhitelist: ["127.0.0.1", "::ffff:127.0.0.1", "::1"],
	language: 'de',
	modules: [
		{
			module: "clock",
			position: "top_left",
		},
		{
			module: "calendar",
			header: "US Holidays",
			config: {
				maximumEntries: 5,
			},
		},
	],
};

/*************** DO NOT EDIT THE LINE BELOW ***************/
if (typeof module !== "undefined") { module.exports = config; }
"#;
        let parsed = parse_source(source).unwrap();
        assert_eq!(parsed.rest["port"], 8080);
        assert_eq!(parsed.rest["language"], "de");
        assert_eq!(parsed.modules.len(), 2);
        assert_eq!(parsed.modules[0].module, "clock");
        assert_eq!(parsed.modules[1].config.as_ref().unwrap()["maximumEntries"], 5);
    }

    #[test]
    fn parse_rejects_invalid_entries() {
        let err = parse_source(r#"var config = {"modules": [{"module": ""}]};"#).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));

        let err = parse_source(r#"var config = {"modules": [{"position": "x"}]};"#).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn load_or_default_falls_back() {
        let dir = tempfile::tempdir().unwrap();

        let missing = load_or_default(&dir.path().join("config.js"));
        assert_eq!(missing, ConfigDocument::default());

        let broken = dir.path().join("broken.js");
        std::fs::write(&broken, "var config = { modules: [ oops ] };").unwrap();
        assert_eq!(load_or_default(&broken), ConfigDocument::default());

        let good = dir.path().join("good.js");
        std::fs::write(&good, r#"var config = {"modules": [{"module": "calendar"}]};"#).unwrap();
        assert_eq!(load_or_default(&good).modules[0].module, "calendar");
    }
}
