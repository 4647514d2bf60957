use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{PropertyStore, StoreError, StoreResult};
use crate::codec::{self, PropType};

type Groups = BTreeMap<String, BTreeMap<String, StoredProperty>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredProperty {
    #[serde(rename = "type")]
    ty: PropType,
    values: Vec<String>,
}

/// One service's layers: manifest defaults under administrator customizations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ServiceRecord {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    defaults: Groups,
    #[serde(default)]
    custom: Groups,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    services: BTreeMap<String, ServiceRecord>,
}

/// File-backed store holding every service in one JSON document.
///
/// Edits go to a working copy of the service record; `commit` copies the
/// committed groups into the document and rewrites the file.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    fmri: String,
    document: StoreDocument,
    working: ServiceRecord,
}

impl JsonStore {
    /// Open the store at `path` for `fmri`. A missing file is an empty store.
    pub fn open<P: AsRef<Path>>(path: P, fmri: &str) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let document: StoreDocument = match fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No store at {}, starting empty", path.display());
                StoreDocument::default()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let working = document.services.get(fmri).cloned().unwrap_or_default();
        Ok(Self {
            path,
            fmri: fmri.to_string(),
            document,
            working,
        })
    }

    fn effective(&self, group: &str) -> BTreeMap<&str, &StoredProperty> {
        let mut props = BTreeMap::new();
        for layer in [&self.working.defaults, &self.working.custom] {
            if let Some(pg) = layer.get(group) {
                for (name, prop) in pg {
                    props.insert(name.as_str(), prop);
                }
            }
        }
        props
    }

    fn persist(&self) -> StoreResult<()> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(io_err)?;

        let json = serde_json::to_string_pretty(&self.document)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl PropertyStore for JsonStore {
    fn fmri(&self) -> &str {
        &self.fmri
    }

    fn get_prop_val_list(&self, group: &str, prop: &str) -> StoreResult<Option<Vec<String>>> {
        Ok(self
            .effective(group)
            .get(prop)
            .map(|stored| stored.values.clone()))
    }

    fn add_prop_val(
        &mut self,
        group: &str,
        prop: &str,
        ty: PropType,
        values: &[String],
    ) -> StoreResult<()> {
        self.working.custom.entry(group.to_string()).or_default().insert(
            prop.to_string(),
            StoredProperty {
                ty,
                values: values.to_vec(),
            },
        );
        Ok(())
    }

    fn delete_customizations(&mut self, group: &str) -> StoreResult<()> {
        self.working.custom.remove(group);
        Ok(())
    }

    fn commit(&mut self, group: Option<&str>) -> StoreResult<()> {
        let record = self.document.services.entry(self.fmri.clone()).or_default();
        match group {
            Some(group) => match self.working.custom.get(group) {
                Some(pg) => {
                    record.custom.insert(group.to_string(), pg.clone());
                }
                None => {
                    record.custom.remove(group);
                }
            },
            None => record.custom = self.working.custom.clone(),
        }
        self.persist()?;
        info!("Committed {} to {}", self.fmri, self.path.display());
        Ok(())
    }

    fn validate(&mut self) -> StoreResult<()> {
        let mut bad = Vec::new();
        for group in self.list_property_groups()? {
            for (name, prop) in self.effective(&group) {
                if let Some(value) = prop.values.iter().find(|v| !codec::check_type(prop.ty, v)) {
                    bad.push(format!("{group}/{name}: {value:?} is not a valid {}", prop.ty));
                }
            }
        }
        if bad.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Invalid(bad.join("; ")))
        }
    }

    fn list_property_groups(&self) -> StoreResult<BTreeSet<String>> {
        Ok(self
            .working
            .defaults
            .keys()
            .chain(self.working.custom.keys())
            .cloned()
            .collect())
    }

    fn list_properties(&self, group: &str) -> StoreResult<BTreeSet<String>> {
        Ok(self
            .effective(group)
            .keys()
            .map(|name| name.to_string())
            .collect())
    }

    fn is_service_enabled(&self) -> StoreResult<bool> {
        Ok(self.working.enabled)
    }
}
