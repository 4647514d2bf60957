//! Declarative property schemas and the per-line parse results built from them.

use std::collections::HashSet;

use tracing::debug;

use crate::codec::{self, BoolStyle, FlagCodec, PropType};
use crate::store::PropertyValue;
use crate::{Error, Result};

/// How a multi-valued property is laid out in its legacy file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// Single-valued.
    Single,
    Space,
    Comma,
    Semicolon,
    /// One legacy line per value.
    PerLine,
}

impl Separator {
    pub fn split(self, raw: &str) -> Vec<String> {
        let raw = raw.trim();
        match self {
            Separator::Single | Separator::PerLine => vec![raw.to_string()],
            Separator::Space => raw.split_whitespace().map(str::to_string).collect(),
            Separator::Comma => split_on(raw, ','),
            Separator::Semicolon => split_on(raw, ';'),
        }
    }

    /// Join values onto one legacy line. `PerLine` values are never joined.
    pub fn join(self, values: &[String]) -> String {
        match self {
            Separator::Comma => values.join(","),
            Separator::Semicolon => values.join(";"),
            _ => values.join(" "),
        }
    }
}

fn split_on(raw: &str, sep: char) -> Vec<String> {
    raw.split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Value conversion applied on top of the plain type check.
#[derive(Debug, Clone, Copy)]
pub enum Codec {
    Plain,
    Boolean(BoolStyle),
    /// `a.b.c.d/N` in the store, `a.b.c.d/netmask` on disk.
    Sortlist,
    /// Integer bitmask on disk, flag names in the store.
    Flags(&'static FlagCodec),
    /// Every value must be one of these words.
    Enum(&'static [&'static str]),
    /// `service:v1<sep>v2`, each `v` one of these words.
    ServiceEnum(&'static [&'static str], char),
    /// `netmask address`
    Securenet,
}

/// One property of a service: where it lives in the store and how it is
/// spelled in the legacy file.
#[derive(Debug, Clone, Copy)]
pub struct PropSpec {
    pub group: &'static str,
    pub name: &'static str,
    pub ty: PropType,
    /// Legacy key; empty when the property has no line of its own.
    pub legacy: &'static str,
    pub sep: Separator,
    pub codec: Codec,
}

impl PropSpec {
    pub const fn new(
        group: &'static str,
        name: &'static str,
        ty: PropType,
        legacy: &'static str,
        sep: Separator,
    ) -> Self {
        Self {
            group,
            name,
            ty,
            legacy,
            sep,
            codec: match ty {
                PropType::Boolean => Codec::Boolean(BoolStyle::YesNo),
                _ => Codec::Plain,
            },
        }
    }

    pub const fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Check one store-side value.
    pub fn check_store_value(&self, value: &str) -> std::result::Result<(), String> {
        if !codec::check_type(self.ty, value) {
            return Err(format!("{value:?} is not a valid {}", self.ty));
        }
        match self.codec {
            Codec::Enum(domain) => check_domain(domain, value),
            Codec::ServiceEnum(domain, sep) => {
                let (service, rest) = value
                    .split_once(':')
                    .ok_or_else(|| format!("{value:?} is not of the form service:value"))?;
                if service.trim().is_empty() {
                    return Err(format!("{value:?} names no service"));
                }
                rest.split(sep)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .try_for_each(|v| check_domain(domain, v))
            }
            Codec::Securenet if !codec::is_securenet(value) => {
                Err(format!("{value:?} is not a netmask/address pair"))
            }
            Codec::Flags(flags) if !flags.is_known(value) => {
                Err(format!("{value:?} is not a known flag"))
            }
            _ => Ok(()),
        }
    }

    /// Legacy text after the key to store values.
    pub fn decode(&self, raw: &str) -> std::result::Result<Vec<String>, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("missing value".to_string());
        }
        let values = match self.codec {
            Codec::Flags(flags) => {
                let mask = FlagCodec::parse_mask(raw)
                    .ok_or_else(|| format!("{raw:?} is not an integer bitmask"))?;
                flags
                    .to_names(mask)
                    .ok_or_else(|| format!("{raw:?} sets unknown bits"))?
            }
            Codec::Boolean(_) => vec![codec::bool_from_legacy(raw)
                .ok_or_else(|| format!("{raw:?} is not a boolean"))?
                .to_string()],
            Codec::Sortlist => self
                .sep
                .split(raw)
                .iter()
                .map(|v| codec::sl_to_na(v).ok_or_else(|| format!("{v:?} is not a sortlist entry")))
                .collect::<std::result::Result<_, _>>()?,
            Codec::Securenet => vec![raw.split_whitespace().collect::<Vec<_>>().join(" ")],
            _ => self.sep.split(raw),
        };
        for value in &values {
            self.check_store_value(value)?;
        }
        Ok(values)
    }

    /// Store values to legacy text, one string per legacy line.
    pub fn encode(&self, values: &[String]) -> std::result::Result<Vec<String>, String> {
        let converted: Vec<String> = match self.codec {
            Codec::Flags(flags) => {
                let mask = flags
                    .to_mask(values)
                    .ok_or_else(|| format!("unknown flag in {values:?}"))?;
                return Ok(vec![mask.to_string()]);
            }
            Codec::Boolean(style) => values
                .iter()
                .map(|v| {
                    codec::bool_to_legacy(v, style)
                        .map(str::to_string)
                        .ok_or_else(|| format!("{v:?} is not a boolean"))
                })
                .collect::<std::result::Result<_, _>>()?,
            Codec::Sortlist => values
                .iter()
                .map(|v| codec::na_to_sl(v).ok_or_else(|| format!("{v:?} has no sortlist form")))
                .collect::<std::result::Result<_, _>>()?,
            _ => values.to_vec(),
        };
        Ok(match self.sep {
            Separator::PerLine => converted,
            sep => vec![sep.join(&converted)],
        })
    }

    /// Parse the value part of one legacy line.
    pub fn parse_entry(
        &'static self,
        line: usize,
        raw: &str,
    ) -> std::result::Result<ParsedEntry, ParseError> {
        self.decode(raw)
            .map(|values| ParsedEntry { spec: self, values })
            .map_err(|reason| ParseError {
                line,
                key: self.legacy.to_string(),
                value: raw.trim().to_string(),
                reason,
            })
    }
}

fn check_domain(domain: &[&str], value: &str) -> std::result::Result<(), String> {
    if domain.contains(&value) {
        Ok(())
    } else {
        Err(format!("{value:?} is not one of: {}", domain.join(", ")))
    }
}

/// The property table of one service, checked for internal consistency.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    specs: &'static [PropSpec],
}

impl Schema {
    /// Reject tables where two properties share a name or a legacy key
    /// within the same group.
    pub fn new(specs: &'static [PropSpec]) -> Result<Self> {
        let mut names = HashSet::new();
        let mut keys = HashSet::new();
        for spec in specs {
            if spec.name.is_empty() || spec.group.is_empty() {
                return Err(Error::Schema(format!(
                    "property {}/{} has an empty name",
                    spec.group, spec.name
                )));
            }
            if !names.insert((spec.group, spec.name)) {
                return Err(Error::Schema(format!(
                    "duplicate property {}/{}",
                    spec.group, spec.name
                )));
            }
            if !spec.legacy.is_empty() && !keys.insert((spec.group, spec.legacy)) {
                return Err(Error::Schema(format!(
                    "legacy key {} used twice in group {}",
                    spec.legacy, spec.group
                )));
            }
        }
        Ok(Self { specs })
    }

    pub fn specs(&self) -> &'static [PropSpec] {
        self.specs
    }

    pub fn lookup(&self, group: &str, name: &str) -> Option<&'static PropSpec> {
        self.specs
            .iter()
            .find(|s| s.group == group && s.name == name)
    }

    pub fn lookup_legacy(&self, group: &str, key: &str) -> Option<&'static PropSpec> {
        if key.is_empty() {
            return None;
        }
        self.specs
            .iter()
            .find(|s| s.group == group && s.legacy == key)
    }

    /// Groups in first-seen order.
    pub fn groups(&self) -> Vec<&'static str> {
        let mut groups: Vec<&'static str> = Vec::new();
        for spec in self.specs {
            if !groups.contains(&spec.group) {
                groups.push(spec.group);
            }
        }
        groups
    }

    pub fn in_group<'a>(&self, group: &'a str) -> impl Iterator<Item = &'static PropSpec> + 'a {
        let specs = self.specs;
        specs.iter().filter(move |s| s.group == group)
    }
}

/// A recognized legacy line, already converted to store values.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub spec: &'static PropSpec,
    pub values: Vec<String>,
}

/// A legacy value that failed its type check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: bad value {value:?} for {key}: {reason}")]
pub struct ParseError {
    pub line: usize,
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// Values collected from a legacy document, plus every line that failed.
#[derive(Debug, Default)]
pub struct WorkingSet {
    entries: Vec<(&'static PropSpec, Vec<String>)>,
    errors: Vec<ParseError>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one parsed line. One-per-line properties accumulate in file
    /// order; any other repeated key keeps its last value.
    pub fn accept(&mut self, parsed: std::result::Result<ParsedEntry, ParseError>) {
        match parsed {
            Ok(entry) => {
                let spec = entry.spec;
                match self.position(spec) {
                    Some(i) if spec.sep == Separator::PerLine => {
                        self.entries[i].1.extend(entry.values)
                    }
                    Some(i) => {
                        debug!("{} repeated, keeping the last value", spec.legacy);
                        self.entries[i].1 = entry.values;
                    }
                    None => self.entries.push((spec, entry.values)),
                }
            }
            Err(err) => self.errors.push(err),
        }
    }

    /// Set a property directly, replacing anything parsed for it.
    pub fn set(&mut self, spec: &'static PropSpec, values: Vec<String>) {
        match self.position(spec) {
            Some(i) => self.entries[i].1 = values,
            None => self.entries.push((spec, values)),
        }
    }

    fn position(&self, spec: &PropSpec) -> Option<usize> {
        self.entries
            .iter()
            .position(|(s, _)| s.group == spec.group && s.name == spec.name)
    }

    pub fn get(&self, group: &str, name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(s, _)| s.group == group && s.name == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// Merge another document's results into this one.
    pub fn extend(&mut self, other: WorkingSet) {
        for (spec, values) in other.entries {
            self.set(spec, values);
        }
        self.errors.extend(other.errors);
    }

    /// Store-ready values of one group, skipping empty properties.
    pub fn group_values(&self, group: &str) -> Vec<PropertyValue> {
        self.entries
            .iter()
            .filter(|(s, v)| s.group == group && !v.is_empty())
            .map(|(s, v)| PropertyValue {
                name: s.name.to_string(),
                ty: s.ty,
                values: v.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DEBUG_LEVELS;
    use assert_matches::assert_matches;

    static DUP_NAME: &[PropSpec] = &[
        PropSpec::new("config", "domain", PropType::Hostname, "domain", Separator::Single),
        PropSpec::new("config", "domain", PropType::Astring, "search", Separator::Space),
    ];

    static DUP_KEY: &[PropSpec] = &[
        PropSpec::new("config", "domain", PropType::Hostname, "domain", Separator::Single),
        PropSpec::new("config", "search", PropType::Astring, "domain", Separator::Space),
    ];

    static SAME_KEY_OTHER_GROUP: &[PropSpec] = &[
        PropSpec::new("passwd", "enable_cache", PropType::Boolean, "enable-cache", Separator::Single),
        PropSpec::new("group", "enable_cache", PropType::Boolean, "enable-cache", Separator::Single),
    ];

    static SPECS: &[PropSpec] = &[
        PropSpec::new("config", "search", PropType::Hostname, "search", Separator::Space),
        PropSpec::new("config", "nameserver", PropType::NetAddress, "nameserver", Separator::PerLine),
        PropSpec::new("config", "sortlist", PropType::NetAddress, "sortlist", Separator::Space)
            .codec(Codec::Sortlist),
        PropSpec::new("config", "level", PropType::Astring, "debug-level", Separator::Space)
            .codec(Codec::Flags(&DEBUG_LEVELS)),
        PropSpec::new("config", "auth", PropType::Astring, "AUTH", Separator::Semicolon)
            .codec(Codec::Enum(&["simple", "none"])),
        PropSpec::new("config", "svcauth", PropType::Astring, "SVCAUTH", Separator::PerLine)
            .codec(Codec::ServiceEnum(&["simple", "none"], ';')),
        PropSpec::new("config", "ok", PropType::Boolean, "old-data-ok", Separator::Single),
    ];

    #[test]
    fn test_schema_consistency() {
        assert_matches!(Schema::new(DUP_NAME), Err(Error::Schema(_)));
        assert_matches!(Schema::new(DUP_KEY), Err(Error::Schema(_)));
        assert!(Schema::new(SAME_KEY_OTHER_GROUP).is_ok());
        assert!(Schema::new(SPECS).is_ok());
    }

    #[test]
    fn test_parse_error_reports_line_and_key() {
        let schema = Schema::new(SPECS).unwrap();
        let nameserver = schema.lookup("config", "nameserver").unwrap();
        let err = nameserver.parse_entry(7, "bogus!").unwrap_err();
        assert_eq!(err.line, 7);
        assert_eq!(err.key, "nameserver");

        let err: &dyn std::error::Error = &err;
        assert!(err.to_string().starts_with("line 7: bad value \"bogus!\" for nameserver"));
        assert!(err.source().is_none());
    }

    #[test]
    fn test_decode_and_encode() {
        let schema = Schema::new(SPECS).unwrap();
        let search = schema.lookup("config", "search").unwrap();
        assert_eq!(
            search.decode("example.com  example.org").unwrap(),
            vec!["example.com", "example.org"]
        );

        let sortlist = schema.lookup_legacy("config", "sortlist").unwrap();
        let values = sortlist.decode("130.155.160.0/255.255.240.0 130.155.0.0").unwrap();
        assert_eq!(values, vec!["130.155.160.0/20", "130.155.0.0"]);
        assert_eq!(
            sortlist.encode(&values).unwrap(),
            vec!["130.155.160.0/255.255.240.0 130.155.0.0"]
        );

        let level = schema.lookup("config", "level").unwrap();
        assert_eq!(level.decode("0x3").unwrap(), vec!["critical", "error"]);
        assert_eq!(level.encode(&["all".to_string()]).unwrap(), vec!["63"]);

        let ok = schema.lookup("config", "ok").unwrap();
        assert_eq!(ok.decode("yes").unwrap(), vec!["true"]);
        assert_eq!(ok.encode(&["false".to_string()]).unwrap(), vec!["no"]);
    }

    #[test]
    fn test_enum_domains() {
        let schema = Schema::new(SPECS).unwrap();
        let auth = schema.lookup("config", "auth").unwrap();
        assert_eq!(auth.decode("simple;none").unwrap(), vec!["simple", "none"]);
        assert!(auth.decode("simple;bogus").is_err());

        let svcauth = schema.lookup("config", "svcauth").unwrap();
        assert!(svcauth.decode("pam_ldap:simple;none").is_ok());
        assert!(svcauth.decode("pam_ldap:kerberos").is_err());
        assert!(svcauth.decode("simple").is_err());
    }

    #[test]
    fn test_working_set_accumulates() {
        let schema = Schema::new(SPECS).unwrap();
        let ns = schema.lookup("config", "nameserver").unwrap();
        let search = schema.lookup("config", "search").unwrap();

        let mut set = WorkingSet::new();
        set.accept(ns.parse_entry(1, "1.2.3.4"));
        set.accept(ns.parse_entry(2, "5.6.7.8"));
        set.accept(search.parse_entry(3, "a.example"));
        set.accept(search.parse_entry(4, "b.example c.example"));
        set.accept(ns.parse_entry(5, "not-an-address"));

        assert_eq!(set.get("config", "nameserver").unwrap(), ["1.2.3.4", "5.6.7.8"]);
        assert_eq!(set.get("config", "search").unwrap(), ["b.example", "c.example"]);
        assert_eq!(set.errors().len(), 1);
        assert_eq!(set.errors()[0].line, 5);

        let values = set.group_values("config");
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].name, "nameserver");
        assert_eq!(values[0].ty, PropType::NetAddress);
    }
}
