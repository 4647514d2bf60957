use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File};
use serde::Deserialize;
use strum::{Display, EnumString};
use tracing::debug;

use crate::store::{JsonStore, PropertyStore, SvccfgStore};
use crate::Result;

pub const DEFAULT_CONFIG: &str = "/etc/nscfg";
pub const CONFIG_ENV: &str = "NSCFG_CONFIG";
const ENV_PREFIX: &str = "NSCFG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StoreKind {
    /// The SMF repository, through svccfg and friends.
    Svccfg,
    /// A JSON document on disk.
    File,
}

impl StoreKind {
    fn platform_default() -> Self {
        if cfg!(any(target_os = "illumos", target_os = "solaris")) {
            StoreKind::Svccfg
        } else {
            StoreKind::File
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NscfgConfig {
    /// Alternate root the legacy files live under.
    pub root: PathBuf,
    pub store: StoreKind,
    pub store_file: PathBuf,
    pub svccfg: PathBuf,
    pub svcprop: PathBuf,
    pub svcadm: PathBuf,
}

impl NscfgConfig {
    /// Defaults, then the config file (`$NSCFG_CONFIG` or `/etc/nscfg.*`),
    /// then `NSCFG_*` variables.
    pub fn load() -> Result<Self> {
        let file = env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::load_from(file.as_deref(), None)
    }

    /// As [`NscfgConfig::load`], with an explicit config file and, when
    /// given, a fixed set of environment variables in place of the process
    /// environment.
    pub fn load_from(file: Option<&Path>, vars: Option<HashMap<String, String>>) -> Result<Self> {
        let source = match file {
            Some(path) => {
                debug!("Reading configuration from {}", path.display());
                File::from(path).required(true)
            }
            None => File::with_name(DEFAULT_CONFIG).required(false),
        };
        let cfg = Config::builder()
            .set_default("root", "/")?
            .set_default("store", StoreKind::platform_default().to_string())?
            .set_default("store_file", "/var/lib/nscfg/store.json")?
            .set_default("svccfg", crate::store::SVCCFG)?
            .set_default("svcprop", crate::store::SVCPROP)?
            .set_default("svcadm", crate::store::SVCADM)?
            .add_source(source)
            .add_source(Environment::with_prefix(ENV_PREFIX).source(vars))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// A store handle for `fmri` on the configured backend.
    pub fn open_store(&self, fmri: &str) -> Result<Box<dyn PropertyStore>> {
        debug!("Opening {} store for {}", self.store, fmri);
        Ok(match self.store {
            StoreKind::Svccfg => Box::new(SvccfgStore::with_tools(
                fmri,
                &self.svccfg,
                &self.svcprop,
                &self.svcadm,
            )),
            StoreKind::File => Box::new(JsonStore::open(&self.store_file, fmri)?),
        })
    }
}
