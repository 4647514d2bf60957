use tracing::debug;

use super::{
    any_set, parse_lines, render_lines, reset_groups, store_working_set, validate_schema,
    write_or_remove, Context, NameService,
};
use crate::codec::PropType;
use crate::legacy::LegacyFile;
use crate::schema::{Codec, PropSpec, Schema, Separator, WorkingSet};
use crate::{Outcome, Result};

const GROUP: &str = "config";

/// In render order.
static SPECS: &[PropSpec] = &[
    PropSpec::new(GROUP, "domain", PropType::Hostname, "domain", Separator::Single),
    PropSpec::new(GROUP, "search", PropType::Hostname, "search", Separator::Space),
    PropSpec::new(GROUP, "nameserver", PropType::NetAddress, "nameserver", Separator::PerLine),
    PropSpec::new(GROUP, "sortlist", PropType::NetAddress, "sortlist", Separator::Space)
        .codec(Codec::Sortlist),
    PropSpec::new(GROUP, "options", PropType::Astring, "options", Separator::Space),
];

/// DNS client: `resolv.conf`.
pub struct Dns {
    ctx: Context,
    schema: Schema,
    file: LegacyFile,
}

impl Dns {
    pub fn new(ctx: Context) -> Result<Self> {
        let file = LegacyFile::new(ctx.path("etc/resolv.conf"), "resolv.conf(5)");
        Ok(Self {
            schema: Schema::new(SPECS)?,
            file,
            ctx,
        })
    }

    fn render(&self) -> Result<Option<String>> {
        let mut body = String::new();
        for spec in self.schema.specs() {
            for line in render_lines(&self.ctx, spec)? {
                body.push_str(&format!("{} {}\n", spec.legacy, line));
            }
        }
        Ok((!body.is_empty()).then_some(body))
    }
}

impl NameService for Dns {
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
            if line.starts_with(';') {
                continue;
            }
            let (key, value) = line
                .split_once(char::is_whitespace)
                .unwrap_or((line, ""));
            match self.schema.lookup_legacy(GROUP, key) {
                Some(spec) => set.accept(spec.parse_entry(n, value)),
                None => debug!("resolv.conf line {}: ignoring {}", n, key),
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
        let keys = ["nameserver", "domain", "search"];
        any_set(
            &self.ctx,
            keys.iter().filter_map(|k| self.schema.lookup(GROUP, k)),
        )
    }

    fn is_autogenerated(&self) -> bool {
        self.file.is_autogenerated()
    }
}
