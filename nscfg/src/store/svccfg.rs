use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, trace};

use super::{PropertyStore, StoreError, StoreResult};
use crate::codec::PropType;

pub const SVCCFG: &str = "/usr/sbin/svccfg";
pub const SVCPROP: &str = "/usr/bin/svcprop";
pub const SVCADM: &str = "/usr/sbin/svcadm";

/// The live SMF repository, driven through the svc* command line tools.
#[derive(Debug, Clone)]
pub struct SvccfgStore {
    fmri: String,
    svccfg: PathBuf,
    svcprop: PathBuf,
    svcadm: PathBuf,
    /// Property groups known to exist; dropped whenever customizations are.
    groups: Option<BTreeSet<String>>,
}

impl SvccfgStore {
    pub fn new(fmri: &str) -> Self {
        Self::with_tools(fmri, SVCCFG, SVCPROP, SVCADM)
    }

    pub fn with_tools<P: AsRef<Path>>(fmri: &str, svccfg: P, svcprop: P, svcadm: P) -> Self {
        Self {
            fmri: fmri.to_string(),
            svccfg: svccfg.as_ref().to_path_buf(),
            svcprop: svcprop.as_ref().to_path_buf(),
            svcadm: svcadm.as_ref().to_path_buf(),
            groups: None,
        }
    }

    fn run(&self, program: &Path, args: &[&str]) -> StoreResult<String> {
        let command = format!("{} {}", program.display(), args.join(" "));
        trace!("Running {}", command);
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| StoreError::Spawn {
                program: program.display().to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(StoreError::Command {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn svccfg(&self, args: &[&str]) -> StoreResult<String> {
        let mut full = vec!["-s", self.fmri.as_str()];
        full.extend_from_slice(args);
        self.run(&self.svccfg, &full)
    }

    /// `svcprop -c -p <prop> <fmri>`, with a property the repository does
    /// not have read as `None`. Every other failure is an error.
    fn svcprop(&self, prop: &str, fmri: &str) -> StoreResult<Option<String>> {
        match self.run(&self.svcprop, &["-c", "-p", prop, fmri]) {
            Ok(output) => Ok(Some(output)),
            Err(StoreError::Command { stderr, .. }) if is_missing_property(&stderr) => {
                trace!("{} has no {}: {}", fmri, prop, stderr);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn ensure_group(&mut self, group: &str) -> StoreResult<()> {
        let mut groups = match self.groups.take() {
            Some(groups) => groups,
            None => self.list_property_groups()?,
        };
        if !groups.contains(group) {
            debug!("Creating property group {} on {}", group, self.fmri);
            self.svccfg(&["addpg", group, "application"])?;
            groups.insert(group.to_string());
        }
        self.groups = Some(groups);
        Ok(())
    }
}

/// svcprop's complaints about a property or group that does not exist.
fn is_missing_property(stderr: &str) -> bool {
    stderr.contains("doesn't match") || stderr.contains("Couldn't find property")
}

/// svcadm and `general/enabled` need an instance; services default to `:default`.
fn instance_fmri(fmri: &str) -> String {
    let path = fmri.strip_prefix("svc:/").unwrap_or(fmri);
    if path.contains(':') {
        fmri.to_string()
    } else {
        format!("{fmri}:default")
    }
}

/// Split svcprop output into values. Spaces inside a value are escaped with a
/// backslash and an empty string is printed as `""`.
fn split_svcprop_values(output: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_value = false;
    let mut chars = output.trim_end_matches('\n').chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
                in_value = true;
            }
            ' ' => {
                if in_value {
                    values.push(std::mem::take(&mut current));
                    in_value = false;
                }
            }
            _ => {
                current.push(c);
                in_value = true;
            }
        }
    }
    if in_value {
        values.push(current);
    }
    values
        .into_iter()
        .map(|v| if v == "\"\"" { String::new() } else { v })
        .collect()
}

/// Quote a value for the svccfg command parser.
fn quote_value(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn first_column(output: &str) -> impl Iterator<Item = &str> {
    output.lines().filter_map(|line| line.split_whitespace().next())
}

impl PropertyStore for SvccfgStore {
    fn fmri(&self) -> &str {
        &self.fmri
    }

    fn get_prop_val_list(&self, group: &str, prop: &str) -> StoreResult<Option<Vec<String>>> {
        let name = format!("{group}/{prop}");
        Ok(self
            .svcprop(&name, &self.fmri)?
            .map(|output| split_svcprop_values(&output)))
    }

    fn add_prop_val(
        &mut self,
        group: &str,
        prop: &str,
        ty: PropType,
        values: &[String],
    ) -> StoreResult<()> {
        self.ensure_group(group)?;
        let name = format!("{group}/{prop}");
        let ty = format!("{ty}:");
        let quoted: Vec<String> = values.iter().map(|v| quote_value(v)).collect();
        let mut args = vec!["setprop", name.as_str(), "=", ty.as_str(), "("];
        args.extend(quoted.iter().map(String::as_str));
        args.push(")");
        self.svccfg(&args)?;
        Ok(())
    }

    fn delete_customizations(&mut self, group: &str) -> StoreResult<()> {
        self.groups = None;
        self.svccfg(&["delcust", group])?;
        Ok(())
    }

    fn commit(&mut self, group: Option<&str>) -> StoreResult<()> {
        let instance = instance_fmri(&self.fmri);
        self.run(&self.svcadm, &["refresh", &instance])?;
        info!(
            "Refreshed {} after updating {}",
            instance,
            group.unwrap_or("all property groups")
        );
        Ok(())
    }

    fn validate(&mut self) -> StoreResult<()> {
        self.svccfg(&["validate"]).map(|_| ()).map_err(|e| match e {
            StoreError::Command { stderr, .. } => StoreError::Invalid(stderr),
            e => e,
        })
    }

    fn list_property_groups(&self) -> StoreResult<BTreeSet<String>> {
        let output = self.svccfg(&["listpg"])?;
        Ok(first_column(&output).map(str::to_string).collect())
    }

    fn list_properties(&self, group: &str) -> StoreResult<BTreeSet<String>> {
        let output = self.svccfg(&["listprop", group])?;
        let prefix = format!("{group}/");
        Ok(first_column(&output)
            .filter_map(|name| name.strip_prefix(&prefix))
            .map(str::to_string)
            .collect())
    }

    fn is_service_enabled(&self) -> StoreResult<bool> {
        let instance = instance_fmri(&self.fmri);
        Ok(self
            .svcprop("general/enabled", &instance)?
            .is_some_and(|output| output.trim() == "true"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PropertyValue;
    use assert_matches::assert_matches;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fake_tool(dir: &TempDir, name: &str, script: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn with_svcprop(dir: &TempDir, script: &str) -> SvccfgStore {
        let svcprop = fake_tool(dir, "svcprop", script);
        SvccfgStore::with_tools(
            "svc:/network/dns/client",
            Path::new("/nonexistent/svccfg"),
            svcprop.as_path(),
            Path::new("/nonexistent/svcadm"),
        )
    }

    #[test]
    fn test_split_svcprop_values() {
        assert_eq!(
            split_svcprop_values("example.com example.org\n"),
            vec!["example.com", "example.org"]
        );
        assert_eq!(
            split_svcprop_values("ndots:2 attempts:3\\ extra\n"),
            vec!["ndots:2", "attempts:3 extra"]
        );
        assert_eq!(split_svcprop_values("\"\"\n"), vec![""]);
        assert!(split_svcprop_values("\n").is_empty());
    }

    #[test]
    fn test_quote_value() {
        assert_eq!(quote_value("files dns"), "\"files dns\"");
        assert_eq!(quote_value("a\"b\\c"), "\"a\\\"b\\\\c\"");
    }

    #[test]
    fn test_instance_fmri() {
        assert_eq!(
            instance_fmri("svc:/network/dns/client"),
            "svc:/network/dns/client:default"
        );
        assert_eq!(
            instance_fmri("svc:/network/dns/client:default"),
            "svc:/network/dns/client:default"
        );
        assert_eq!(instance_fmri("network/nis/domain"), "network/nis/domain:default");
    }

    #[test]
    fn test_missing_tool_is_a_spawn_error() {
        let store = SvccfgStore::with_tools(
            "svc:/network/dns/client",
            "/nonexistent/svccfg",
            "/nonexistent/svcprop",
            "/nonexistent/svcadm",
        );
        assert_matches!(
            store.list_property_groups(),
            Err(StoreError::Spawn { .. })
        );
        assert_matches!(
            store.get_prop_val("config", "domain"),
            Err(StoreError::Spawn { .. })
        );
    }

    #[test]
    fn test_repository_failure_is_not_an_unset_property() {
        let dir = TempDir::new().unwrap();
        let store = with_svcprop(
            &dir,
            "echo 'svcprop: repository server unavailable' >&2\nexit 1",
        );
        assert_matches!(
            store.get_prop_val_list("config", "nameserver"),
            Err(StoreError::Command { stderr, .. }) if stderr.contains("unavailable")
        );
        assert_matches!(store.is_service_enabled(), Err(StoreError::Command { .. }));
    }

    #[test]
    fn test_missing_property_reads_as_unset() {
        let dir = TempDir::new().unwrap();
        let store = with_svcprop(
            &dir,
            "echo \"svcprop: Couldn't find property $3 for instance $4.\" >&2\nexit 1",
        );
        assert_matches!(store.get_prop_val_list("config", "nameserver"), Ok(None));
        assert_matches!(store.is_service_enabled(), Ok(false));

        let store = with_svcprop(
            &dir,
            "echo \"svcprop: Pattern '$3' doesn't match any entities\" >&2\nexit 1",
        );
        assert_matches!(store.get_prop_val("config", "domain"), Ok(None));
    }

    #[test]
    fn test_replace_group_lists_groups_once() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("svccfg.log");
        let svccfg = fake_tool(&dir, "svccfg", &format!("echo \"$@\" >> {}", log.display()));
        let svcadm = fake_tool(&dir, "svcadm", "exit 0");
        let mut store = SvccfgStore::with_tools(
            "svc:/network/dns/client",
            svccfg.as_path(),
            Path::new("/nonexistent/svcprop"),
            svcadm.as_path(),
        );

        let values: Vec<PropertyValue> = ["domain", "search", "options"]
            .iter()
            .map(|name| PropertyValue {
                name: name.to_string(),
                ty: PropType::Astring,
                values: vec!["x".to_string()],
            })
            .collect();
        store.replace_group("config", &values).unwrap();

        let calls = fs::read_to_string(&log).unwrap();
        let count = |verb: &str| {
            calls
                .lines()
                .filter(|l| l.split_whitespace().nth(2) == Some(verb))
                .count()
        };
        assert_eq!(count("delcust"), 1);
        assert_eq!(count("listpg"), 1);
        assert_eq!(count("addpg"), 1);
        assert_eq!(count("setprop"), 3);
    }
}
