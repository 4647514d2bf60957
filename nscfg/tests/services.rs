use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_matches::assert_matches;
use nscfg::codec::PropType;
use nscfg::services::{Context, ServiceAdapter, ServiceKind};
use nscfg::store::{JsonStore, PropertyStore, SvccfgStore};
use nscfg::{Error, Outcome};
use tempfile::TempDir;

struct Host {
    dir: TempDir,
}

impl Host {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("root")
    }

    fn store(&self, fmri: &str) -> JsonStore {
        JsonStore::open(self.dir.path().join("store.json"), fmri).unwrap()
    }

    fn adapter(&self, fmri: &str) -> ServiceAdapter {
        let kind = ServiceKind::from_fmri(fmri).unwrap();
        let ctx = Context::new(self.root(), Box::new(self.store(fmri)));
        ServiceAdapter::new(kind, ctx).unwrap()
    }

    fn write(&self, relative: &str, content: &str) {
        let path = self.root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read(&self, relative: &str) -> Option<String> {
        fs::read_to_string(self.root().join(relative)).ok()
    }

    fn remove(&self, relative: &str) {
        fs::remove_file(self.root().join(relative)).unwrap();
    }
}

fn strings(v: &[&str]) -> Option<Vec<String>> {
    Some(v.iter().map(|s| s.to_string()).collect())
}

fn body(text: &str) -> Vec<&str> {
    text.lines().filter(|l| !l.starts_with('#')).collect()
}

type Snapshot = BTreeMap<(String, String), Option<Vec<String>>>;

/// Every property of every group, with its values.
fn snapshot(store: &dyn PropertyStore) -> Snapshot {
    let mut props = BTreeMap::new();
    for group in store.list_property_groups().unwrap() {
        for name in store.list_properties(&group).unwrap() {
            let values = store.get_prop_val_list(&group, &name).unwrap();
            props.insert((group.clone(), name), values);
        }
    }
    props
}

/// Import, export, reset the store and import the generated file again: the
/// store must hold the same properties as after the first import, and a
/// second export must find nothing to change.
fn assert_round_trip(host: &Host, fmri: &str) {
    let mut adapter = host.adapter(fmri);
    assert_eq!(adapter.import_to_smf().unwrap(), Outcome::Success, "{fmri}");
    let imported = snapshot(&host.store(fmri));
    assert!(!imported.is_empty(), "{fmri}");
    assert_eq!(adapter.export_from_smf().unwrap(), Outcome::Success, "{fmri}");

    let mut adapter = host.adapter(fmri);
    adapter.unconfig_smf().unwrap();
    assert!(!adapter.is_populated().unwrap(), "{fmri}");
    assert_eq!(adapter.import_to_smf().unwrap(), Outcome::Success, "{fmri}");
    assert_eq!(snapshot(&host.store(fmri)), imported, "{fmri}");
    assert_eq!(adapter.export_from_smf().unwrap(), Outcome::NoChange, "{fmri}");
}

fn fake_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn test_dns_import_scenario() {
    let host = Host::new();
    host.write(
        "etc/resolv.conf",
        "nameserver 1.2.3.4\ndomain example.com\nsearch example.com example.org\n",
    );
    let fmri = "svc:/network/dns/client";
    let mut dns = host.adapter(fmri);
    assert_eq!(dns.import_to_smf().unwrap(), Outcome::Success);

    let store = host.store(fmri);
    assert_eq!(
        store.get_prop_val_list("config", "nameserver").unwrap(),
        strings(&["1.2.3.4"])
    );
    assert_eq!(
        store.get_prop_val("config", "domain").unwrap(),
        Some("example.com".to_string())
    );
    assert_eq!(
        store.get_prop_val_list("config", "search").unwrap(),
        strings(&["example.com", "example.org"])
    );
}

#[test]
fn test_switch_export_scenario() {
    let host = Host::new();
    let fmri = "svc:/system/name-service/switch";
    let mut store = host.store(fmri);
    store
        .add_prop_val("config", "default", PropType::Astring, &["nis".to_string()])
        .unwrap();
    store
        .add_prop_val("config", "host", PropType::Astring, &["files".to_string()])
        .unwrap();
    store.commit(None).unwrap();

    let mut switch = host.adapter(fmri);
    assert_eq!(switch.export_from_smf().unwrap(), Outcome::Success);
    let text = host.read("etc/nsswitch.conf").unwrap();
    let lines = body(&text);
    assert_eq!(lines[0], "passwd:\tnis");
    assert_eq!(lines[1], "group:\tnis");
    assert_eq!(lines[2], "hosts:\tfiles");
    assert_eq!(lines[3], "ipnodes:\tfiles");
    assert_eq!(lines[4], "networks:\tnis");
    assert_eq!(*lines.last().unwrap(), "tnrhdb:\tnis");
}

#[test]
fn test_switch_compat_scenario() {
    let host = Host::new();
    host.write("etc/nsswitch.conf", "passwd: compat\nhosts: files\n");
    let fmri = "svc:/system/name-service/switch";
    host.adapter(fmri).import_to_smf().unwrap();
    assert_eq!(
        host.store(fmri)
            .get_prop_val("config", "password_compat")
            .unwrap(),
        Some("nis".to_string())
    );
}

#[test]
fn test_round_trips() {
    let host = Host::new();
    host.write(
        "etc/resolv.conf",
        "domain example.com\nnameserver 1.2.3.4\nnameserver 2001:db8::1\nsortlist 10.1.0.0/255.255.0.0\noptions ndots:2 timeout:1\n",
    );
    assert_round_trip(&host, "svc:/network/dns/client:default");

    host.write(
        "etc/nsswitch.conf",
        "passwd: files nis\ngroup: compat\nhosts: files dns\nprinters: user files\n",
    );
    assert_round_trip(&host, "svc:/system/name-service/switch:default");

    host.write(
        "etc/nscd.conf",
        "logfile /var/adm/nscd.log\ndebug-components 2047\nenable-cache hosts no\nkeep-hot-count passwd 20\n",
    );
    assert_round_trip(&host, "svc:/system/name-service/cache:default");

    host.write(
        "var/ldap/ldap_client_file",
        "NS_LDAP_FILE_VERSION= 2.0\nNS_LDAP_SERVERS= 10.0.0.1\nNS_LDAP_SEARCH_BASEDN= dc=example,dc=com\nNS_LDAP_SEARCH_SCOPE= sub\n",
    );
    host.write("var/ldap/ldap_client_cred", "NS_LDAP_BINDDN= cn=proxy\n");
    assert_round_trip(&host, "svc:/network/ldap/client:default");

    host.write("etc/defaultdomain", "example.com\n");
    host.write("var/yp/binding/example.com/ypservers", "nis1\nnis2\n");
    host.write("var/yp/securenets", "255.255.255.0 10.0.0.0\n");
    assert_round_trip(&host, "svc:/network/nis/domain:default");
}

#[test]
fn test_export_without_configuration() {
    let host = Host::new();
    for (fmri, file) in [
        ("svc:/network/dns/client", "etc/resolv.conf"),
        ("svc:/system/name-service/switch", "etc/nsswitch.conf"),
        ("svc:/system/name-service/cache", "etc/nscd.conf"),
        ("svc:/network/ldap/client", "var/ldap/ldap_client_file"),
        ("svc:/network/nis/domain", "etc/defaultdomain"),
    ] {
        let mut adapter = host.adapter(fmri);
        assert_eq!(adapter.export_from_smf().unwrap(), Outcome::NoChange, "{fmri}");
        assert!(host.read(file).is_none());

        host.write(file, "stale\n");
        assert_eq!(adapter.export_from_smf().unwrap(), Outcome::Success, "{fmri}");
        assert!(host.read(file).is_none(), "{fmri} left {file}");
    }
}

#[test]
fn test_import_without_legacy_file() {
    let host = Host::new();
    for kind in [
        "svc:/network/dns/client",
        "svc:/system/name-service/switch",
        "svc:/system/name-service/cache",
        "svc:/network/ldap/client",
        "svc:/network/nis/domain",
    ] {
        assert_eq!(host.adapter(kind).import_to_smf().unwrap(), Outcome::NoConfig);
    }
    assert_eq!(
        host.adapter("svc:/network/nis/client:default")
            .import_to_smf()
            .unwrap(),
        Outcome::Success
    );
}

#[test]
fn test_validate_catches_store_edits() {
    let host = Host::new();
    let fmri = "svc:/network/ldap/client";
    let mut store = host.store(fmri);
    store
        .add_prop_val(
            "config",
            "credential_level",
            PropType::Astring,
            &["superuser".to_string()],
        )
        .unwrap();
    store.commit(None).unwrap();

    assert_matches!(
        host.adapter(fmri).validate_smf(),
        Err(Error::InvalidProperty { name, .. }) if name == "credential_level"
    );
}

#[test]
fn test_configured_tracks_generated_files() {
    let host = Host::new();
    let fmri = "svc:/system/name-service/cache";
    host.write("etc/nscd.conf", "enable-cache hosts no\n");
    let mut nscd = host.adapter(fmri);
    assert!(!nscd.is_configured().unwrap());
    nscd.import_to_smf().unwrap();
    assert!(!nscd.is_configured().unwrap());
    nscd.export_from_smf().unwrap();
    assert!(nscd.is_autogenerated());
    assert!(nscd.is_configured().unwrap());

    host.remove("etc/nscd.conf");
    assert!(!nscd.is_configured().unwrap());
}

#[test]
fn test_store_failure_keeps_legacy_file() {
    let host = Host::new();
    host.write("etc/resolv.conf", "nameserver 1.2.3.4\n");
    let fmri = "svc:/network/dns/client:default";
    let svcprop = fake_tool(
        host.dir.path(),
        "svcprop",
        "echo 'svcprop: repository server unavailable' >&2\nexit 1",
    );
    let missing = Path::new("/nonexistent");
    let store = SvccfgStore::with_tools(fmri, missing, svcprop.as_path(), missing);
    let ctx = Context::new(host.root(), Box::new(store));
    let mut dns = ServiceAdapter::new(ServiceKind::Dns, ctx).unwrap();

    assert_matches!(dns.export_from_smf(), Err(Error::Store(_)));
    assert_eq!(host.read("etc/resolv.conf").unwrap(), "nameserver 1.2.3.4\n");
}
