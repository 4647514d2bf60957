use tracing::debug;

use super::{Context, NameService, ServiceKind};
use crate::{Outcome, Result};

/// Services with no legacy file. Every operation succeeds and the service
/// always counts as configured.
pub struct NoLegacy {
    kind: ServiceKind,
    ctx: Context,
}

impl NoLegacy {
    pub fn new(kind: ServiceKind, ctx: Context) -> Self {
        Self { kind, ctx }
    }
}

impl NameService for NoLegacy {
    fn context(&self) -> &Context {
        &self.ctx
    }

    fn export_from_smf(&mut self) -> Result<Outcome> {
        debug!("{} has no legacy file to write", self.kind);
        Ok(Outcome::Success)
    }

    fn import_to_smf(&mut self) -> Result<Outcome> {
        debug!("{} has no legacy file to read", self.kind);
        Ok(Outcome::Success)
    }

    fn is_populated(&self) -> Result<bool> {
        Ok(true)
    }

    fn is_configured(&self) -> Result<bool> {
        Ok(true)
    }
}
