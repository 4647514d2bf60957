//! Access to the service configuration store.
//!
//! Backends implement [`PropertyStore`] for a single service FMRI. Reads see
//! edits that have not been committed yet; `commit` makes them durable.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::codec::PropType;

mod json;
mod svccfg;

pub use json::JsonStore;
pub use svccfg::{SvccfgStore, SVCADM, SVCCFG, SVCPROP};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed store document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration rejected: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A typed property ready to be written to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: PropType,
    pub values: Vec<String>,
}

/// Property-group store of one service.
pub trait PropertyStore {
    /// FMRI this handle is bound to.
    fn fmri(&self) -> &str;

    /// First value of a property.
    fn get_prop_val(&self, group: &str, prop: &str) -> StoreResult<Option<String>> {
        Ok(self
            .get_prop_val_list(group, prop)?
            .and_then(|values| values.into_iter().next()))
    }

    /// All values of a property in order; `None` if the property is not set.
    fn get_prop_val_list(&self, group: &str, prop: &str) -> StoreResult<Option<Vec<String>>>;

    /// Set a property, replacing any customization it had.
    fn add_prop_val(
        &mut self,
        group: &str,
        prop: &str,
        ty: PropType,
        values: &[String],
    ) -> StoreResult<()>;

    /// Drop the customizations of a group so its defaults show through.
    fn delete_customizations(&mut self, group: &str) -> StoreResult<()>;

    /// Make pending edits durable, for one group or all of them.
    fn commit(&mut self, group: Option<&str>) -> StoreResult<()>;

    /// Check the stored configuration against its templates.
    fn validate(&mut self) -> StoreResult<()>;

    fn list_property_groups(&self) -> StoreResult<BTreeSet<String>>;

    fn list_properties(&self, group: &str) -> StoreResult<BTreeSet<String>>;

    fn is_service_enabled(&self) -> StoreResult<bool>;

    /// Replace the customizations of a group with `values`.
    ///
    /// This is two commits, not one transaction: an interruption between
    /// them leaves the group at its defaults.
    fn replace_group(&mut self, group: &str, values: &[PropertyValue]) -> StoreResult<()> {
        debug!("{}: replacing customizations of {}", self.fmri(), group);
        self.delete_customizations(group)?;
        self.commit(Some(group))?;
        for value in values {
            self.add_prop_val(group, &value.name, value.ty, &value.values)?;
        }
        self.commit(Some(group))
    }
}
