use tracing::debug;

use super::{
    check_parsed, combine, parse_lines, read_values, render_lines, reset_groups,
    store_working_set, validate_schema, write_or_remove, Context, NameService,
};
use crate::codec::{self, PropType};
use crate::legacy::LegacyFile;
use crate::schema::{Codec, PropSpec, Schema, Separator, WorkingSet};
use crate::{Error, Outcome, Result};

const GROUP: &str = "config";
const BINDING_DIR: &str = "var/yp/binding";

static SPECS: &[PropSpec] = &[
    PropSpec::new(GROUP, "domainname", PropType::Hostname, "", Separator::Single),
    PropSpec::new(GROUP, "ypservers", PropType::Host, "", Separator::PerLine),
    PropSpec::new(GROUP, "securenets", PropType::Astring, "", Separator::PerLine)
        .codec(Codec::Securenet),
];

fn domainname_spec() -> &'static PropSpec {
    &SPECS[0]
}

fn ypservers_spec() -> &'static PropSpec {
    &SPECS[1]
}

fn securenets_spec() -> &'static PropSpec {
    &SPECS[2]
}

/// NIS domain: `defaultdomain`, the bound domain's `ypservers`, and
/// `securenets`.
pub struct NisDomain {
    ctx: Context,
    schema: Schema,
    defaultdomain: LegacyFile,
    securenets: LegacyFile,
}

impl NisDomain {
    pub fn new(ctx: Context) -> Result<Self> {
        let defaultdomain = LegacyFile::new(ctx.path("etc/defaultdomain"), "domainname(8)");
        let securenets = LegacyFile::new(ctx.path("var/yp/securenets"), "securenets(5)");
        Ok(Self {
            schema: Schema::new(SPECS)?,
            defaultdomain,
            securenets,
            ctx,
        })
    }

    fn ypservers(&self, domain: &str) -> LegacyFile {
        LegacyFile::new(
            self.ctx.path(&format!("{BINDING_DIR}/{domain}/ypservers")),
            "ypinit(8)",
        )
    }

    fn stored_domain(&self) -> Result<Option<String>> {
        let values = read_values(&self.ctx, domainname_spec())?;
        let Some(domain) = values.and_then(|v| v.into_iter().next()) else {
            return Ok(None);
        };
        // The domain becomes a path component below.
        if !codec::is_hostname(&domain) {
            return Err(Error::InvalidProperty {
                group: GROUP.to_string(),
                name: domainname_spec().name.to_string(),
                reason: format!("{domain:?} is not a valid domain name"),
            });
        }
        Ok(Some(domain))
    }

    fn file_domain(&self) -> Result<Option<String>> {
        Ok(self.defaultdomain.load_lines()?.and_then(|lines| {
            parse_lines(&lines)
                .next()
                .map(|(_, line)| line.to_string())
        }))
    }

    /// Drop the ypservers of the domain `defaultdomain` still names once the
    /// store binds a different one, or none.
    fn stale_ypservers(&self) -> Result<Outcome> {
        let Some(old) = self.file_domain()? else {
            return Ok(Outcome::NoChange);
        };
        if !codec::is_hostname(&old) || self.stored_domain()?.as_deref() == Some(old.as_str()) {
            return Ok(Outcome::NoChange);
        }
        debug!("Domain {} is no longer bound", old);
        self.ypservers(&old).remove(self.ctx.no_write())
    }

    fn body(&self, spec: &PropSpec) -> Result<Option<String>> {
        let lines = render_lines(&self.ctx, spec)?;
        Ok((!lines.is_empty()).then(|| lines.iter().map(|l| format!("{l}\n")).collect()))
    }

    fn parse_each_line(spec: &'static PropSpec, lines: &[String]) -> WorkingSet {
        let mut set = WorkingSet::new();
        for (n, line) in parse_lines(lines) {
            set.accept(spec.parse_entry(n, line));
        }
        set
    }
}

impl NameService for NisDomain {
    fn context(&self) -> &Context {
        &self.ctx
    }

    fn export_from_smf(&mut self) -> Result<Outcome> {
        let stale = self.stale_ypservers();
        let (defaultdomain, ypservers) = match self.stored_domain() {
            Ok(Some(domain)) => {
                let file = self.ypservers(&domain);
                let body = Some(format!("{domain}\n"));
                (
                    write_or_remove(&self.ctx, &self.defaultdomain, body, false),
                    self.body(ypservers_spec())
                        .and_then(|body| write_or_remove(&self.ctx, &file, body, false)),
                )
            }
            Ok(None) => (
                write_or_remove(&self.ctx, &self.defaultdomain, None, false),
                Ok(Outcome::NoChange),
            ),
            Err(e) => (Err(e), Ok(Outcome::NoChange)),
        };

        let securenets = self
            .body(securenets_spec())
            .and_then(|body| write_or_remove(&self.ctx, &self.securenets, body, true));

        combine(vec![stale, defaultdomain, ypservers, securenets])
    }

    fn import_to_smf(&mut self) -> Result<Outcome> {
        let Some(lines) = self.defaultdomain.load_lines()? else {
            return Ok(Outcome::NoConfig);
        };
        let mut set = WorkingSet::new();
        if let Some((n, line)) = parse_lines(&lines).next() {
            set.accept(domainname_spec().parse_entry(n, line));
        }

        let mut servers = WorkingSet::new();
        let mut servers_path = None;
        if let Some(domain) = set.get(GROUP, domainname_spec().name).and_then(|v| v.first()) {
            let file = self.ypservers(domain);
            if let Some(lines) = file.load_lines()? {
                servers = Self::parse_each_line(ypservers_spec(), &lines);
            } else {
                debug!("No ypservers for {}", domain);
            }
            servers_path = Some(file.path().to_path_buf());
        }

        let nets = match self.securenets.load_lines()? {
            Some(lines) => Self::parse_each_line(securenets_spec(), &lines),
            None => WorkingSet::new(),
        };

        let mut parsed = vec![(self.defaultdomain.path(), &set)];
        if let Some(path) = &servers_path {
            parsed.push((path.as_path(), &servers));
        }
        parsed.push((self.securenets.path(), &nets));
        check_parsed(&parsed)?;

        set.extend(servers);
        set.extend(nets);
        let path = self.defaultdomain.path().to_path_buf();
        store_working_set(&mut self.ctx, &path, &[GROUP], set)
    }

    fn unconfig_smf(&mut self) -> Result<Outcome> {
        reset_groups(&mut self.ctx, [GROUP])
    }

    fn validate_smf(&mut self) -> Result<Outcome> {
        let schema = self.schema;
        validate_schema(&mut self.ctx, &schema)
    }

    fn is_populated(&self) -> Result<bool> {
        Ok(self.stored_domain()?.is_some())
    }

    fn is_configured(&self) -> Result<bool> {
        if self.ctx.store().is_service_enabled()? {
            return Ok(true);
        }
        let stored = self.stored_domain()?;
        match (stored, self.file_domain()?) {
            (None, None) | (Some(_), None) => Ok(true),
            (Some(stored), Some(on_disk)) if stored == on_disk => {
                if read_values(&self.ctx, ypservers_spec())?.is_none() {
                    return Ok(true);
                }
                Ok(self.ctx.path(&format!("{BINDING_DIR}/{stored}")).is_dir())
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testutil::Scratch;
    use assert_matches::assert_matches;

    const FMRI: &str = "svc:/network/nis/domain";

    fn populated(scratch: &Scratch) -> NisDomain {
        scratch.write("etc/defaultdomain", "example.com\n");
        scratch.write(
            "var/yp/binding/example.com/ypservers",
            "nis1.example.com\nnis2.example.com\n",
        );
        scratch.write(
            "var/yp/securenets",
            "# allowed networks\n255.255.255.0 10.0.0.0\n255.0.0.0\t192.0.0.0\n",
        );
        let mut nis = NisDomain::new(scratch.context(FMRI)).unwrap();
        assert_eq!(nis.import_to_smf().unwrap(), Outcome::Success);
        nis
    }

    #[test]
    fn test_import_three_artifacts() {
        let scratch = Scratch::new();
        let nis = populated(&scratch);
        let store = nis.context().store();
        assert_eq!(
            store.get_prop_val("config", "domainname").unwrap(),
            Some("example.com".to_string())
        );
        assert_eq!(
            store.get_prop_val_list("config", "ypservers").unwrap(),
            Some(vec![
                "nis1.example.com".to_string(),
                "nis2.example.com".to_string()
            ])
        );
        assert_eq!(
            store.get_prop_val_list("config", "securenets").unwrap(),
            Some(vec![
                "255.255.255.0 10.0.0.0".to_string(),
                "255.0.0.0 192.0.0.0".to_string()
            ])
        );
        assert!(nis.is_populated().unwrap());
    }

    #[test]
    fn test_import_without_defaultdomain() {
        let scratch = Scratch::new();
        let mut nis = NisDomain::new(scratch.context(FMRI)).unwrap();
        assert_eq!(nis.import_to_smf().unwrap(), Outcome::NoConfig);
    }

    #[test]
    fn test_bad_securenet_fails_import() {
        let scratch = Scratch::new();
        scratch.write("etc/defaultdomain", "example.com\n");
        scratch.write("var/yp/securenets", "255.255.255.0\n");
        let mut nis = NisDomain::new(scratch.context(FMRI)).unwrap();
        assert_matches!(
            nis.import_to_smf(),
            Err(Error::Validation { path, errors })
                if path.ends_with("var/yp/securenets") && errors.len() == 1
        );
        assert!(!nis.is_populated().unwrap());
    }

    #[test]
    fn test_export_aggregates_no_change() {
        let scratch = Scratch::new();
        let mut nis = populated(&scratch);
        assert_eq!(nis.export_from_smf().unwrap(), Outcome::Success);
        assert_eq!(scratch.read("etc/defaultdomain").unwrap(), "example.com\n");
        assert_eq!(
            scratch.read("var/yp/binding/example.com/ypservers").unwrap(),
            "nis1.example.com\nnis2.example.com\n"
        );
        let nets = scratch.read("var/yp/securenets").unwrap();
        assert!(nets.contains("_AUTOGENERATED_FROM_SMF_V1_"));
        assert!(nets.ends_with("255.0.0.0 192.0.0.0\n"));

        assert_eq!(nis.export_from_smf().unwrap(), Outcome::NoChange);

        // One artifact changing is enough for the whole to change.
        scratch.write("var/yp/securenets", "");
        assert_eq!(nis.export_from_smf().unwrap(), Outcome::Success);
    }

    #[test]
    fn test_export_unconfigured_removes_files() {
        let scratch = Scratch::new();
        let mut nis = populated(&scratch);
        nis.unconfig_smf().unwrap();
        assert_eq!(nis.export_from_smf().unwrap(), Outcome::Success);
        assert!(scratch.read("etc/defaultdomain").is_none());
        assert!(scratch.read("var/yp/securenets").is_none());
        assert!(scratch.read("var/yp/binding/example.com/ypservers").is_none());
        assert_eq!(nis.export_from_smf().unwrap(), Outcome::NoChange);
    }

    #[test]
    fn test_domain_change_drops_old_ypservers() {
        let scratch = Scratch::new();
        let mut nis = populated(&scratch);
        nis.export_from_smf().unwrap();

        let store = nis.ctx.store_mut();
        store
            .add_prop_val(
                "config",
                "domainname",
                PropType::Hostname,
                &["other.example".to_string()],
            )
            .unwrap();
        store.commit(None).unwrap();

        assert_eq!(nis.export_from_smf().unwrap(), Outcome::Success);
        assert_eq!(scratch.read("etc/defaultdomain").unwrap(), "other.example\n");
        assert_eq!(
            scratch.read("var/yp/binding/other.example/ypservers").unwrap(),
            "nis1.example.com\nnis2.example.com\n"
        );
        assert!(scratch.read("var/yp/binding/example.com/ypservers").is_none());
        assert_eq!(nis.export_from_smf().unwrap(), Outcome::NoChange);
    }

    #[test]
    fn test_no_write_keeps_old_ypservers() {
        let scratch = Scratch::new();
        let mut nis = populated(&scratch);
        nis.export_from_smf().unwrap();
        nis.unconfig_smf().unwrap();

        let mut nis = NisDomain::new(scratch.context(FMRI).with_no_write(true)).unwrap();
        assert_eq!(nis.export_from_smf().unwrap(), Outcome::Success);
        assert!(scratch.read("var/yp/binding/example.com/ypservers").is_some());
        assert!(scratch.read("etc/defaultdomain").is_some());
    }

    #[test]
    fn test_is_configured_cases() {
        let scratch = Scratch::new();
        let nis = NisDomain::new(scratch.context(FMRI)).unwrap();
        // No domain, no file.
        assert!(nis.is_configured().unwrap());

        // File but no stored domain.
        scratch.write("etc/defaultdomain", "example.com\n");
        assert!(!nis.is_configured().unwrap());

        let scratch = Scratch::new();
        let mut nis = populated(&scratch);
        // Domain stored, file matches, binding directory present.
        assert!(nis.is_configured().unwrap());

        // Binding directory missing.
        std::fs::remove_dir_all(nis.ctx.path("var/yp/binding/example.com")).unwrap();
        assert!(!nis.is_configured().unwrap());

        // Domain stored, no file.
        std::fs::remove_file(nis.ctx.path("etc/defaultdomain")).unwrap();
        assert!(nis.is_configured().unwrap());

        // Domain stored, file disagrees.
        scratch.write("etc/defaultdomain", "other.example\n");
        assert!(!nis.is_configured().unwrap());

        nis.unconfig_smf().unwrap();
        assert!(!nis.is_configured().unwrap());
    }
}
