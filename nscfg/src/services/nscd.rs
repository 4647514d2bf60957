use std::collections::BTreeSet;
use std::sync::OnceLock;

use tracing::debug;

use super::{
    any_set, parse_lines, render_lines, reset_groups, store_working_set, validate_schema,
    write_or_remove, Context, NameService,
};
use crate::codec::{PropType, DEBUG_COMPONENTS, DEBUG_LEVELS};
use crate::legacy::LegacyFile;
use crate::schema::{Codec, PropSpec, Schema, Separator, WorkingSet};
use crate::{Outcome, Result};

const CONFIG: &str = "config";
const IGNORED_MAP: &str = "ipnodes";

static CONFIG_SPECS: &[PropSpec] = &[
    PropSpec::new(CONFIG, "logfile", PropType::Astring, "logfile", Separator::Single),
    PropSpec::new(CONFIG, "debug_level", PropType::Astring, "debug-level", Separator::Space)
        .codec(Codec::Flags(&DEBUG_LEVELS)),
    PropSpec::new(CONFIG, "debug_components", PropType::Astring, "debug-components", Separator::Space)
        .codec(Codec::Flags(&DEBUG_COMPONENTS)),
    PropSpec::new(CONFIG, "enable_per_user_lookup", PropType::Boolean, "enable-per-user-lookup", Separator::Single),
    PropSpec::new(CONFIG, "per_user_nscd_time_to_live", PropType::Integer, "per-user-nscd-time-to-live", Separator::Single),
    PropSpec::new(CONFIG, "maximum_per_user_nscd", PropType::Integer, "maximum-per-user-nscd", Separator::Single),
];

/// Caches, in render order. Each is a property group of its own.
static CACHE_MAPS: &[&str] = &[
    "passwd",
    "group",
    "hosts",
    "exec_attr",
    "prof_attr",
    "user_attr",
    "ethers",
    "rpc",
    "protocols",
    "networks",
    "bootparams",
    "auth_attr",
    "services",
    "netmasks",
    "printers",
    "project",
    "tnrhtp",
    "tnrhdb",
];

/// Properties every cache group carries: (name, type, legacy tag).
static CACHE_TEMPLATE: &[(&str, PropType, &str)] = &[
    ("enable_cache", PropType::Boolean, "enable-cache"),
    ("positive_time_to_live", PropType::Integer, "positive-time-to-live"),
    ("negative_time_to_live", PropType::Integer, "negative-time-to-live"),
    ("keep_hot_count", PropType::Integer, "keep-hot-count"),
    ("check_files", PropType::Boolean, "check-files"),
    ("suggested_size", PropType::Integer, "suggested-size"),
    ("old_data_ok", PropType::Boolean, "old-data-ok"),
];

/// The config properties followed by the template applied to every cache.
fn specs() -> &'static [PropSpec] {
    static SPECS: OnceLock<Vec<PropSpec>> = OnceLock::new();
    SPECS.get_or_init(|| {
        let mut specs = CONFIG_SPECS.to_vec();
        for &map in CACHE_MAPS {
            for &(name, ty, tag) in CACHE_TEMPLATE {
                specs.push(PropSpec::new(map, name, ty, tag, Separator::Single));
            }
        }
        specs
    })
}

/// Name service cache daemon: `nscd.conf`.
pub struct Nscd {
    ctx: Context,
    schema: Schema,
    file: LegacyFile,
}

impl Nscd {
    pub fn new(ctx: Context) -> Result<Self> {
        let file = LegacyFile::new(ctx.path("etc/nscd.conf"), "nscd.conf(5)");
        Ok(Self {
            schema: Schema::new(specs())?,
            file,
            ctx,
        })
    }

    fn render(&self) -> Result<Option<String>> {
        let mut blocks = Vec::new();

        let mut config = String::new();
        for spec in self.schema.in_group(CONFIG) {
            for value in render_lines(&self.ctx, spec)? {
                config.push_str(&format!("{}\t{}\n", spec.legacy, value));
            }
        }
        if !config.is_empty() {
            blocks.push(config);
        }

        for map in CACHE_MAPS {
            let mut block = String::new();
            for spec in self.schema.in_group(map) {
                for value in render_lines(&self.ctx, spec)? {
                    block.push_str(&format!("{}\t{}\t{}\n", spec.legacy, map, value));
                }
            }
            if !block.is_empty() {
                blocks.push(block);
            }
        }

        Ok((!blocks.is_empty()).then(|| blocks.join("\n")))
    }

    fn parse(&self, lines: &[String]) -> WorkingSet {
        let mut set = WorkingSet::new();
        for (n, line) in parse_lines(lines) {
            let mut words = line.split_whitespace();
            let Some(tag) = words.next() else {
                continue;
            };
            let rest: Vec<&str> = words.collect();

            if let Some(spec) = self.schema.lookup_legacy(CONFIG, tag) {
                set.accept(spec.parse_entry(n, &rest.join(" ")));
                continue;
            }
            let Some((map, value)) = rest.split_first() else {
                debug!("nscd.conf line {}: {} has no value", n, tag);
                continue;
            };
            if *map == IGNORED_MAP {
                debug!("nscd.conf line {}: ignoring {} cache", n, IGNORED_MAP);
                continue;
            }
            match self.schema.lookup_legacy(map, tag) {
                Some(spec) => set.accept(spec.parse_entry(n, &value.join(" "))),
                None => debug!("nscd.conf line {}: ignoring {} {}", n, tag, map),
            }
        }
        set
    }

    /// Schema groups the store knows about.
    fn existing_groups(&self) -> Result<Vec<&'static str>> {
        let present: BTreeSet<String> = self.ctx.store().list_property_groups()?;
        Ok(self
            .schema
            .groups()
            .into_iter()
            .filter(|g| present.contains(*g))
            .collect())
    }
}

impl NameService for Nscd {
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
        let set = self.parse(&lines);
        let existing = self.existing_groups()?;
        let groups: Vec<&str> = self
            .schema
            .groups()
            .into_iter()
            .filter(|g| existing.contains(g) || !set.group_values(g).is_empty())
            .collect();
        let path = self.file.path().to_path_buf();
        store_working_set(&mut self.ctx, &path, &groups, set)
    }

    fn unconfig_smf(&mut self) -> Result<Outcome> {
        let groups = self.existing_groups()?;
        reset_groups(&mut self.ctx, groups)
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
