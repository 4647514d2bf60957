//! Per-service adapters between the configuration store and legacy files.
//!
//! Every name service implements [`NameService`]. [`ServiceAdapter`] is the
//! closed set of them, built from an FMRI by [`ServiceAdapter::new`].

use std::path::{Path, PathBuf};

use strum::{EnumIter, IntoEnumIterator};
use tracing::{debug, error, warn};

use crate::legacy::LegacyFile;
use crate::schema::{PropSpec, Schema, WorkingSet};
use crate::store::PropertyStore;
use crate::{Error, Outcome, Result};

mod dns;
mod ldap;
mod nis;
mod nolegacy;
mod nscd;
mod switch;

pub use dns::Dns;
pub use ldap::Ldap;
pub use nis::NisDomain;
pub use nolegacy::NoLegacy;
pub use nscd::Nscd;
pub use switch::Switch;

/// Every service this tool knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ServiceKind {
    Dns,
    Files,
    Ldap,
    NisDomain,
    NisClient,
    NisServer,
    NisXfr,
    NisPasswd,
    NisUpdate,
    Switch,
    Cache,
}

impl ServiceKind {
    /// Substring of the FMRI that identifies the service.
    pub fn fmri_key(self) -> &'static str {
        match self {
            ServiceKind::Dns => "network/dns/client",
            ServiceKind::Files => "system/name-service/files",
            ServiceKind::Ldap => "network/ldap/client",
            ServiceKind::NisDomain => "network/nis/domain",
            ServiceKind::NisClient => "network/nis/client",
            ServiceKind::NisServer => "network/nis/server",
            ServiceKind::NisXfr => "network/nis/xfr",
            ServiceKind::NisPasswd => "network/nis/passwd",
            ServiceKind::NisUpdate => "network/nis/update",
            ServiceKind::Switch => "system/name-service/switch",
            ServiceKind::Cache => "system/name-service/cache",
        }
    }

    /// The single service whose key occurs in `fmri`. Zero or several
    /// matches resolve to nothing.
    pub fn from_fmri(fmri: &str) -> Option<Self> {
        let mut matches = ServiceKind::iter().filter(|k| fmri.contains(k.fmri_key()));
        match (matches.next(), matches.next()) {
            (Some(kind), None) => Some(kind),
            (Some(_), Some(_)) => {
                warn!("{} matches more than one service", fmri);
                None
            }
            _ => None,
        }
    }
}

/// What an adapter works against: the store handle, the alternate root for
/// legacy files, and whether anything may be written.
pub struct Context {
    root: PathBuf,
    store: Box<dyn PropertyStore>,
    no_write: bool,
}

impl Context {
    pub fn new<P: AsRef<Path>>(root: P, store: Box<dyn PropertyStore>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            store,
            no_write: false,
        }
    }

    pub fn with_no_write(mut self, no_write: bool) -> Self {
        self.no_write = no_write;
        self
    }

    pub fn no_write(&self) -> bool {
        self.no_write
    }

    /// A path relative to the alternate root.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative.trim_start_matches('/'))
    }

    pub fn store(&self) -> &dyn PropertyStore {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn PropertyStore {
        self.store.as_mut()
    }
}

/// The operations every name service supports.
pub trait NameService {
    fn context(&self) -> &Context;

    /// Render the stored configuration into the legacy file(s).
    fn export_from_smf(&mut self) -> Result<Outcome> {
        Ok(Outcome::Success)
    }

    /// Load the legacy file(s) into the store.
    fn import_to_smf(&mut self) -> Result<Outcome> {
        Ok(Outcome::Success)
    }

    /// Drop every customization this service made to the store.
    fn unconfig_smf(&mut self) -> Result<Outcome> {
        Ok(Outcome::Success)
    }

    /// Check the stored values against the schema and the store's templates.
    fn validate_smf(&mut self) -> Result<Outcome> {
        Ok(Outcome::Success)
    }

    /// Whether the store holds meaningful configuration for this service.
    fn is_populated(&self) -> Result<bool>;

    /// Whether the legacy file was generated by us.
    fn is_autogenerated(&self) -> bool {
        false
    }

    /// Whether store and legacy state already agree, so that an import
    /// would be redundant.
    fn is_configured(&self) -> Result<bool> {
        if self.context().store().is_service_enabled()? {
            return Ok(true);
        }
        Ok(self.is_populated()? && self.is_autogenerated())
    }
}

/// One adapter per supported service.
pub enum ServiceAdapter {
    Dns(Dns),
    Ldap(Ldap),
    NisDomain(NisDomain),
    Switch(Switch),
    Cache(Nscd),
    NoLegacy(NoLegacy),
}

impl ServiceAdapter {
    pub fn new(kind: ServiceKind, ctx: Context) -> Result<Self> {
        debug!("Building {} adapter for {}", kind, ctx.store().fmri());
        Ok(match kind {
            ServiceKind::Dns => ServiceAdapter::Dns(Dns::new(ctx)?),
            ServiceKind::Ldap => ServiceAdapter::Ldap(Ldap::new(ctx)?),
            ServiceKind::NisDomain => ServiceAdapter::NisDomain(NisDomain::new(ctx)?),
            ServiceKind::Switch => ServiceAdapter::Switch(Switch::new(ctx)?),
            ServiceKind::Cache => ServiceAdapter::Cache(Nscd::new(ctx)?),
            ServiceKind::Files
            | ServiceKind::NisClient
            | ServiceKind::NisServer
            | ServiceKind::NisXfr
            | ServiceKind::NisPasswd
            | ServiceKind::NisUpdate => ServiceAdapter::NoLegacy(NoLegacy::new(kind, ctx)),
        })
    }

    fn service(&self) -> &dyn NameService {
        match self {
            ServiceAdapter::Dns(s) => s,
            ServiceAdapter::Ldap(s) => s,
            ServiceAdapter::NisDomain(s) => s,
            ServiceAdapter::Switch(s) => s,
            ServiceAdapter::Cache(s) => s,
            ServiceAdapter::NoLegacy(s) => s,
        }
    }

    fn service_mut(&mut self) -> &mut dyn NameService {
        match self {
            ServiceAdapter::Dns(s) => s,
            ServiceAdapter::Ldap(s) => s,
            ServiceAdapter::NisDomain(s) => s,
            ServiceAdapter::Switch(s) => s,
            ServiceAdapter::Cache(s) => s,
            ServiceAdapter::NoLegacy(s) => s,
        }
    }

    pub fn export_from_smf(&mut self) -> Result<Outcome> {
        self.service_mut().export_from_smf()
    }

    pub fn import_to_smf(&mut self) -> Result<Outcome> {
        self.service_mut().import_to_smf()
    }

    pub fn unconfig_smf(&mut self) -> Result<Outcome> {
        self.service_mut().unconfig_smf()
    }

    pub fn validate_smf(&mut self) -> Result<Outcome> {
        self.service_mut().validate_smf()
    }

    pub fn is_populated(&self) -> Result<bool> {
        self.service().is_populated()
    }

    pub fn is_configured(&self) -> Result<bool> {
        self.service().is_configured()
    }

    pub fn is_autogenerated(&self) -> bool {
        self.service().is_autogenerated()
    }
}

/// Stored values of a property, or `None` when unset or only empty strings.
pub(crate) fn read_values(ctx: &Context, spec: &PropSpec) -> Result<Option<Vec<String>>> {
    Ok(ctx
        .store()
        .get_prop_val_list(spec.group, spec.name)?
        .filter(|values| values.iter().any(|v| !v.is_empty())))
}

pub(crate) fn any_set<'a, I>(ctx: &Context, specs: I) -> Result<bool>
where
    I: IntoIterator<Item = &'a PropSpec>,
{
    for spec in specs {
        if read_values(ctx, spec)?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Legacy lines for one property, or nothing when it is unset.
pub(crate) fn render_lines(ctx: &Context, spec: &PropSpec) -> Result<Vec<String>> {
    match read_values(ctx, spec)? {
        Some(values) => spec
            .encode(&values)
            .map_err(|reason| Error::InvalidProperty {
                group: spec.group.to_string(),
                name: spec.name.to_string(),
                reason,
            }),
        None => Ok(Vec::new()),
    }
}

/// Write `body` to `file`, or remove the file when there is nothing to write.
pub(crate) fn write_or_remove(
    ctx: &Context,
    file: &LegacyFile,
    body: Option<String>,
    include_header: bool,
) -> Result<Outcome> {
    match body {
        Some(body) => file.write(&body, include_header, ctx.no_write()),
        None => file.remove(ctx.no_write()),
    }
}

/// Legacy lines worth parsing, numbered from 1, comments and blanks dropped.
pub(crate) fn parse_lines(lines: &[String]) -> impl Iterator<Item = (usize, &str)> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Fail with the parse errors of the first document that has any. Errors in
/// the other documents are logged.
pub(crate) fn check_parsed(parsed: &[(&Path, &WorkingSet)]) -> Result<()> {
    let mut failing = parsed.iter().filter(|(_, set)| !set.errors().is_empty());
    let Some((path, set)) = failing.next() else {
        return Ok(());
    };
    for (other, rest) in failing {
        for err in rest.errors() {
            error!("{}: {}", other.display(), err);
        }
    }
    Err(Error::Validation {
        path: path.to_path_buf(),
        errors: set.errors().to_vec(),
    })
}

/// Replace the store's groups with what the import collected.
pub(crate) fn store_working_set(
    ctx: &mut Context,
    path: &Path,
    groups: &[&str],
    set: WorkingSet,
) -> Result<Outcome> {
    if !set.errors().is_empty() {
        return Err(Error::Validation {
            path: path.to_path_buf(),
            errors: set.errors().to_vec(),
        });
    }
    if ctx.no_write() {
        debug!("Not updating {}: no-write", ctx.store().fmri());
        return Ok(Outcome::Success);
    }
    for group in groups {
        let values = set.group_values(group);
        ctx.store_mut().replace_group(group, &values)?;
    }
    ctx.store_mut().validate()?;
    Ok(Outcome::Success)
}

/// Drop the customizations of `groups` and commit each.
pub(crate) fn reset_groups<'a, I>(ctx: &mut Context, groups: I) -> Result<Outcome>
where
    I: IntoIterator<Item = &'a str>,
{
    for group in groups {
        debug!("Resetting {} on {}", group, ctx.store().fmri());
        ctx.store_mut().delete_customizations(group)?;
        ctx.store_mut().commit(Some(group))?;
    }
    Ok(Outcome::Success)
}

/// Check every stored schema property, then let the store validate.
pub(crate) fn validate_schema(ctx: &mut Context, schema: &Schema) -> Result<Outcome> {
    let mut first = None;
    for spec in schema.specs() {
        let Some(values) = read_values(ctx, spec)? else {
            continue;
        };
        if let Some(reason) = values.iter().find_map(|v| spec.check_store_value(v).err()) {
            error!("{}/{}: {}", spec.group, spec.name, reason);
            first.get_or_insert(Error::InvalidProperty {
                group: spec.group.to_string(),
                name: spec.name.to_string(),
                reason,
            });
        }
    }
    if let Some(err) = first {
        return Err(err);
    }
    ctx.store_mut().validate()?;
    Ok(Outcome::Success)
}

/// Fold the outcomes of independent artifacts. Every artifact has already
/// been attempted; the first failure wins, and the whole is `NoChange` only
/// if every part is.
pub(crate) fn combine(results: Vec<Result<Outcome>>) -> Result<Outcome> {
    let mut all_unchanged = true;
    let mut failure = None;
    for result in results {
        match result {
            Ok(Outcome::NoChange) => {}
            Ok(_) => all_unchanged = false,
            Err(e) => {
                error!("{}", e);
                failure.get_or_insert(e);
            }
        }
    }
    match failure {
        Some(e) => Err(e),
        None if all_unchanged => Ok(Outcome::NoChange),
        None => Ok(Outcome::Success),
    }
}
