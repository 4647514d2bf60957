//! One invocation of the command: resolve the service, run one operation,
//! turn the result into an exit code.

use strum::Display;
use tracing::{debug, error, info};

use crate::config::NscfgConfig;
use crate::messages::{Console, Message};
use crate::services::{Context, ServiceAdapter, ServiceKind};
use crate::{Error, Outcome, Result};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_NOCHANGE: u8 = 2;
pub const EXIT_NOCONFIG: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    Import,
    Export,
    Unconfig,
    Validate,
}

impl Operation {
    pub fn exit_code(self, outcome: Outcome) -> u8 {
        match (self, outcome) {
            (Operation::Export, Outcome::NoChange) => EXIT_NOCHANGE,
            (Operation::Import, Outcome::NoConfig) => EXIT_NOCONFIG,
            _ => EXIT_SUCCESS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub operation: Operation,
    pub fmri: String,
    /// Import even when the service is already configured.
    pub force: bool,
    pub no_write: bool,
    pub quiet: bool,
}

/// Run `invocation` and return the process exit code.
pub fn run(invocation: &Invocation, cfg: &NscfgConfig) -> u8 {
    let console = Console::new(invocation.quiet);
    let fmri = invocation.fmri.as_str();
    let op = invocation.operation;

    let Some(kind) = ServiceKind::from_fmri(fmri) else {
        console.report(Message::IllegalFmri { fmri });
        return EXIT_FAILURE;
    };
    debug!("{} resolved to {}", fmri, kind);

    match execute(invocation, kind, cfg) {
        Ok(outcome) => {
            info!("{} of {} finished: {}", op, fmri, outcome);
            console.report(outcome_message(invocation, outcome));
            op.exit_code(outcome)
        }
        Err(err) => {
            error!("{} of {} failed: {:?}", op, fmri, err);
            if let Error::Validation { path, errors } = &err {
                for error in errors {
                    console.report(Message::BadValue { path, error });
                }
            }
            let operation = op.to_string();
            console.report(Message::Failed {
                operation: &operation,
                fmri,
                cause: err.to_string(),
            });
            EXIT_FAILURE
        }
    }
}

fn execute(invocation: &Invocation, kind: ServiceKind, cfg: &NscfgConfig) -> Result<Outcome> {
    let store = cfg.open_store(&invocation.fmri)?;
    let ctx = Context::new(&cfg.root, store).with_no_write(invocation.no_write);
    let mut adapter = ServiceAdapter::new(kind, ctx)?;

    match invocation.operation {
        Operation::Import => {
            if !invocation.force && adapter.is_configured()? {
                info!("{} already configured, skipping import", invocation.fmri);
                return Ok(Outcome::NoChange);
            }
            adapter.import_to_smf()
        }
        Operation::Export => adapter.export_from_smf(),
        Operation::Unconfig => adapter.unconfig_smf(),
        Operation::Validate => adapter.validate_smf(),
    }
}

fn outcome_message(invocation: &Invocation, outcome: Outcome) -> Message<'_> {
    let fmri = invocation.fmri.as_str();
    match (invocation.operation, outcome) {
        (Operation::Import | Operation::Export, Outcome::Success) if invocation.no_write => {
            Message::NoWrite { fmri }
        }
        (Operation::Import, Outcome::Success) => Message::Imported { fmri },
        (Operation::Import, Outcome::NoChange) => Message::AlreadyConfigured { fmri },
        (Operation::Import, Outcome::NoConfig) => Message::NoLegacyConfig { fmri },
        (Operation::Export, Outcome::Success) => Message::Exported { fmri },
        (Operation::Export, _) => Message::Unchanged { fmri },
        (Operation::Unconfig, _) => Message::Unconfigured { fmri },
        (Operation::Validate, _) => Message::Validated { fmri },
    }
}
