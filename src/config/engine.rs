//! Engine (sing-box) configuration extraction.
//!
//! The engine config is an arbitrary, much larger document. Only the
//! subset needed to drive selectors and the system proxy is extracted:
//!
//! ```text
//! inbounds[type = "mixed"]          → proxy_host / proxy_port
//! outbounds[type = "selector"]      → selectors (tag, outbounds, default)
//! experimental.clash_api            → control_address / control_secret
//! ```
//!
//! Entries are decoded one at a time, so an unrelated inbound or outbound
//! with an unexpected shape never rejects the whole file.

use serde::Deserialize;
use serde_json::Value;

use crate::config::error::ConfigError;

/// One named routing decision point exposed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    /// Selector tag.
    pub name: String,
    /// Candidate outbound tags, in declaration order. Never empty.
    pub candidates: Vec<String>,
    /// Position of the declared default within `candidates`.
    pub default_index: Option<usize>,
    /// Declared default, kept even when it matches no candidate.
    pub default_name: String,
}

impl Selector {
    /// The declared default outbound, if it is one of the candidates.
    pub fn default_outbound(&self) -> Option<&str> {
        self.default_index
            .and_then(|i| self.candidates.get(i))
            .map(String::as_str)
    }
}

/// Operationally relevant projection of the engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Listen address of the mixed inbound.
    pub proxy_host: String,
    /// Listen port of the mixed inbound; 0 when absent.
    pub proxy_port: u16,
    /// Clash API `external_controller`; empty disables control features.
    pub control_address: String,
    /// Clash API bearer secret.
    pub control_secret: String,
    /// Selectors in declaration order.
    pub selectors: Vec<Selector>,
}

impl EngineConfig {
    /// Look up a selector by tag.
    pub fn selector(&self, name: &str) -> Option<&Selector> {
        self.selectors.iter().find(|s| s.name == name)
    }

    /// `host:port` of the local proxy entry point.
    pub fn proxy_endpoint(&self) -> String {
        format!("{}:{}", self.proxy_host, self.proxy_port)
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawConfig {
    inbounds: Vec<Value>,
    outbounds: Vec<Value>,
    experimental: RawExperimental,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawExperimental {
    clash_api: RawClashApi,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawClashApi {
    external_controller: String,
    secret: String,
}

/// Remove every line whose trimmed content starts with `//`.
pub fn strip_comment_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract an [`EngineConfig`] from raw configuration text.
///
/// Does not validate; see [`crate::config::validation`].
pub fn extract(text: &str) -> Result<EngineConfig, ConfigError> {
    let cleaned = strip_comment_lines(text);
    let raw: RawConfig = serde_json::from_str(&cleaned)?;

    let (proxy_host, proxy_port) = raw
        .inbounds
        .iter()
        .find(|item| type_of(item) == Some("mixed"))
        .map(|item| {
            let host = item
                .get("listen")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let port = item
                .get("listen_port")
                .and_then(Value::as_u64)
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(0);
            (host, port)
        })
        .unwrap_or_default();

    let selectors = raw
        .outbounds
        .iter()
        .filter(|item| type_of(item) == Some("selector"))
        .filter_map(selector_from)
        .collect();

    Ok(EngineConfig {
        proxy_host,
        proxy_port,
        control_address: raw.experimental.clash_api.external_controller,
        control_secret: raw.experimental.clash_api.secret,
        selectors,
    })
}

/// Build a selector from an outbound entry; `None` when it has no candidates.
///
/// Fields are read leniently: a missing or `null` default means no default,
/// and non-string candidate entries are ignored.
fn selector_from(item: &Value) -> Option<Selector> {
    let str_field = |key: &str| item.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

    let candidates: Vec<String> = item
        .get("outbounds")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    if candidates.is_empty() {
        return None;
    }

    let default_name = str_field("default");
    let default_index = candidates.iter().position(|c| *c == default_name);
    Some(Selector {
        name: str_field("tag"),
        candidates,
        default_index,
        default_name,
    })
}

fn type_of(item: &Value) -> Option<&str> {
    item.get("type").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
// sing-box config
{
  "log": { "level": "info" },
  "inbounds": [
    { "type": "tun", "tag": "tun-in" },
    { "type": "mixed", "tag": "mixed-in", "listen": "127.0.0.1", "listen_port": 2080 },
    { "type": "mixed", "tag": "second", "listen": "0.0.0.0", "listen_port": 9999 }
  ],
  "outbounds": [
    // selectors
    { "type": "selector", "tag": "proxy-select", "outbounds": ["direct", "relay-a", "relay-b"], "default": "relay-a" },
    { "type": "selector", "tag": "empty", "outbounds": [] },
    { "type": "direct", "tag": "direct" },
    { "type": "selector", "tag": "fallback", "outbounds": ["direct"], "default": "" }
  ],
  "experimental": {
    "clash_api": { "external_controller": "127.0.0.1:9090", "secret": "s3cret" }
  }
}
"#;

    fn selector_with_default(default: &str) -> Selector {
        let text = format!(
            r#"{{ "outbounds": [ {{ "type": "selector", "tag": "s", "outbounds": ["a", "b", "c"], "default": "{}" }} ] }}"#,
            default
        );
        extract(&text).unwrap().selectors.remove(0)
    }

    #[test]
    fn test_extracts_full_sample() {
        let cfg = extract(SAMPLE).unwrap();
        assert_eq!(cfg.proxy_host, "127.0.0.1");
        assert_eq!(cfg.proxy_port, 2080);
        assert_eq!(cfg.control_address, "127.0.0.1:9090");
        assert_eq!(cfg.control_secret, "s3cret");

        let names: Vec<_> = cfg.selectors.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["proxy-select", "fallback"]);
        assert_eq!(cfg.selectors[0].default_outbound(), Some("relay-a"));
        assert_eq!(cfg.selectors[1].default_index, None);
    }

    #[test]
    fn test_empty_selector_is_dropped() {
        let cfg = extract(SAMPLE).unwrap();
        assert!(cfg.selector("empty").is_none());
        assert!(cfg.selectors.iter().all(|s| !s.candidates.is_empty()));
    }

    #[test]
    fn test_default_index_positions() {
        assert_eq!(selector_with_default("a").default_index, Some(0));
        assert_eq!(selector_with_default("c").default_index, Some(2));

        let absent = selector_with_default("zzz");
        assert_eq!(absent.default_index, None);
        assert_eq!(absent.default_name, "zzz");

        assert_eq!(selector_with_default("").default_index, None);
    }

    #[test]
    fn test_missing_default_field() {
        let cfg = extract(r#"{ "outbounds": [ { "type": "selector", "tag": "s", "outbounds": ["a"] } ] }"#).unwrap();
        assert_eq!(cfg.selectors[0].default_index, None);
        assert_eq!(cfg.selectors[0].default_name, "");
    }

    #[test]
    fn test_null_default_keeps_selector() {
        let cfg = extract(r#"{"outbounds":[{"type":"selector","tag":"s","outbounds":["a","b"],"default":null}]}"#).unwrap();
        assert_eq!(cfg.selectors.len(), 1);
        assert_eq!(cfg.selectors[0].candidates, vec!["a", "b"]);
        assert_eq!(cfg.selectors[0].default_index, None);
        assert_eq!(cfg.selectors[0].default_name, "");
    }

    #[test]
    fn test_non_string_candidates_are_ignored() {
        let cfg = extract(r#"{"outbounds":[{"type":"selector","tag":"s","outbounds":["a",7,"b"],"default":"b"}]}"#).unwrap();
        assert_eq!(cfg.selectors.len(), 1);
        assert_eq!(cfg.selectors[0].candidates, vec!["a", "b"]);
        assert_eq!(cfg.selectors[0].default_index, Some(1));
    }

    #[test]
    fn test_no_mixed_inbound() {
        let cfg = extract(r#"{ "inbounds": [ { "type": "socks", "listen_port": 1080 } ] }"#).unwrap();
        assert_eq!(cfg.proxy_host, "");
        assert_eq!(cfg.proxy_port, 0);
    }

    #[test]
    fn test_out_of_range_port_is_zero() {
        let cfg = extract(r#"{ "inbounds": [ { "type": "mixed", "listen": "::1", "listen_port": 70000 } ] }"#).unwrap();
        assert_eq!(cfg.proxy_port, 0);
    }

    #[test]
    fn test_missing_clash_api_is_empty() {
        let cfg = extract("{}").unwrap();
        assert_eq!(cfg.control_address, "");
        assert_eq!(cfg.control_secret, "");
        assert!(cfg.selectors.is_empty());
    }

    #[test]
    fn test_unrelated_outbound_shapes_are_ignored() {
        let text = r#"{ "outbounds": [
            { "type": "urltest", "tag": "auto", "outbounds": ["a"], "default": 5 },
            { "type": "selector", "tag": "bad", "outbounds": "not-a-list" },
            { "type": "selector", "tag": "good", "outbounds": ["a"], "default": "a" }
        ] }"#;
        let cfg = extract(text).unwrap();
        assert_eq!(cfg.selectors.len(), 1);
        assert_eq!(cfg.selectors[0].name, "good");
    }

    #[test]
    fn test_comment_stripping_matches_manual_removal() {
        let manual: String = SAMPLE
            .lines()
            .filter(|l| !l.contains("// "))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(extract(SAMPLE).unwrap(), extract(&manual).unwrap());
    }

    #[test]
    fn test_comment_stripping_is_idempotent() {
        let once = strip_comment_lines(SAMPLE);
        assert_eq!(strip_comment_lines(&once), once);
        assert!(!once.contains("// selectors"));
    }

    #[test]
    fn test_indented_comment_lines_are_stripped() {
        let text = "{\n    // note\n\t// tabbed\n  \"inbounds\": []\n}";
        assert!(extract(text).is_ok());
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = extract("{ \"inbounds\": [ }").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
