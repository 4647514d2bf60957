use tracing::debug;

use super::{
    any_set, parse_lines, read_values, reset_groups, store_working_set, validate_schema,
    write_or_remove, Context, NameService,
};
use crate::codec::PropType;
use crate::legacy::LegacyFile;
use crate::schema::{PropSpec, Schema, Separator, WorkingSet};
use crate::{Outcome, Result};

const GROUP: &str = "config";
const DEFAULT: &str = "default";
const COMPAT: &str = "compat";
const COMPAT_BACKEND: &str = "nis";

const fn db(name: &'static str, legacy: &'static str) -> PropSpec {
    PropSpec::new(GROUP, name, PropType::Astring, legacy, Separator::Single)
}

static SPECS: &[PropSpec] = &[
    db(DEFAULT, ""),
    db("password", "passwd"),
    db("password_compat", "passwd_compat"),
    db("group", "group"),
    db("group_compat", "group_compat"),
    db("host", "hosts"),
    db("network", "networks"),
    db("protocol", "protocols"),
    db("rpc", "rpc"),
    db("ether", "ethers"),
    db("netmask", "netmasks"),
    db("bootparam", "bootparams"),
    db("publickey", "publickey"),
    db("netgroup", "netgroup"),
    db("automount", "automount"),
    db("alias", "aliases"),
    db("service", "services"),
    db("printer", "printers"),
    db("project", "project"),
    db("auth_attr", "auth_attr"),
    db("prof_attr", "prof_attr"),
    db("tnrhtp", "tnrhtp"),
    db("tnrhdb", "tnrhdb"),
];

/// Databases in the order they appear in `nsswitch.conf`, with the property
/// each is rendered from. `ipnodes` shares `host`.
static DBORDER: &[(&str, &str)] = &[
    ("passwd", "password"),
    ("group", "group"),
    ("hosts", "host"),
    ("ipnodes", "host"),
    ("networks", "network"),
    ("protocols", "protocol"),
    ("rpc", "rpc"),
    ("ethers", "ether"),
    ("netmasks", "netmask"),
    ("bootparams", "bootparam"),
    ("publickey", "publickey"),
    ("netgroup", "netgroup"),
    ("automount", "automount"),
    ("aliases", "alias"),
    ("services", "service"),
    ("printers", "printer"),
    ("project", "project"),
    ("auth_attr", "auth_attr"),
    ("prof_attr", "prof_attr"),
    ("tnrhtp", "tnrhtp"),
    ("tnrhdb", "tnrhdb"),
];

/// Databases that may name `compat`, and the property holding the backend
/// `compat` defers to.
static COMPAT_DBS: &[(&str, &str)] = &[("password", "password_compat"), ("group", "group_compat")];

/// Name service switch: `nsswitch.conf`.
pub struct Switch {
    ctx: Context,
    schema: Schema,
    file: LegacyFile,
}

impl Switch {
    pub fn new(ctx: Context) -> Result<Self> {
        let file = LegacyFile::new(ctx.path("etc/nsswitch.conf"), "nsswitch.conf(5)");
        Ok(Self {
            schema: Schema::new(SPECS)?,
            file,
            ctx,
        })
    }

    fn value(&self, name: &str) -> Result<Option<String>> {
        let Some(spec) = self.schema.lookup(GROUP, name) else {
            return Ok(None);
        };
        Ok(read_values(&self.ctx, spec)?.map(|values| values.join(" ")))
    }

    /// Databases fall back to `default` when it is stored. Without one, only
    /// databases with a value of their own are written.
    fn render(&self) -> Result<Option<String>> {
        let default = self.value(DEFAULT)?;

        let mut body = String::new();
        for (db, prop) in DBORDER {
            let Some(backend) = self.value(prop)?.or_else(|| default.clone()) else {
                continue;
            };
            body.push_str(&format!("{db}:\t{backend}\n"));

            if backend.trim() != COMPAT {
                continue;
            }
            if let Some((_, companion)) = COMPAT_DBS.iter().find(|(p, _)| p == prop) {
                let compat = self
                    .value(companion)?
                    .unwrap_or_else(|| COMPAT_BACKEND.to_string());
                body.push_str(&format!("{db}_compat:\t{compat}\n"));
            }
        }
        Ok((!body.is_empty()).then_some(body))
    }
}

impl NameService for Switch {
    fn context(&self) -> &Context {
        &self.ctx
    }

    fn export_from_smf(&mut self) -> Result<Outcome> {
        let body = self.render()?;
        write_or_remove(&self.ctx, &self.file, body, true)
    }

    fn import_to_smf(&mut self) -> Result<Outcome> {
        let Some(lines) = self.file.load_lines()? else {
            return Ok(Outcome::NoConfig);
        };
        let mut set = WorkingSet::new();
        for (n, line) in parse_lines(&lines) {
            let Some((db, backend)) = line.split_once(':') else {
                debug!("nsswitch.conf line {}: no database in {:?}", n, line);
                continue;
            };
            match self.schema.lookup_legacy(GROUP, db.trim()) {
                Some(spec) => set.accept(spec.parse_entry(n, backend)),
                None => debug!("nsswitch.conf line {}: ignoring {}", n, db.trim()),
            }
        }

        for (prop, companion) in COMPAT_DBS {
            let is_compat = set
                .get(GROUP, prop)
                .is_some_and(|v| v.len() == 1 && v[0] == COMPAT);
            if is_compat && set.get(GROUP, companion).is_none() {
                if let Some(spec) = self.schema.lookup(GROUP, companion) {
                    debug!("{} is compat without {}, using {}", prop, companion, COMPAT_BACKEND);
                    set.set(spec, vec![COMPAT_BACKEND.to_string()]);
                }
            }
        }

        let path = self.file.path().to_path_buf();
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
        any_set(&self.ctx, self.schema.specs())
    }

    fn is_autogenerated(&self) -> bool {
        self.file.is_autogenerated()
    }
}
