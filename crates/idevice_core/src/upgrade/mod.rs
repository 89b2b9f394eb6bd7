//! Stored-version upgrade registry and executor for generic iDevices.
//!
//! # Responsibility
//! - Register per-version upgrade steps in strictly increasing order.
//! - Walk a deserialized node forward one version at a time.
//! - Report anomalies instead of aborting the chain.
//!
//! # Invariants
//! - `version` values are contiguous from 1; each step runs at most once per
//!   node, in ascending order.
//! - `stored_version` is bumped right after its step completes.
//! - A node stored at a newer version than this build knows is rejected
//!   before any mutation.

mod steps;

use crate::config::UpgradeConfig;
use crate::model::idevice::{GenericIdevice, IdeviceIssue};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type UpgradeResult<T> = Result<T, UpgradeError>;

/// Hard failures of the upgrade chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeError {
    UnsupportedVersion {
        node_id: String,
        stored_version: u32,
        latest_supported: u32,
    },
}

impl Display for UpgradeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedVersion {
                node_id,
                stored_version,
                latest_supported,
            } => write!(
                f,
                "idevice {node_id} stored at version {stored_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for UpgradeError {}

/// State threaded through every step of one upgrade run.
pub(crate) struct UpgradeContext<'a> {
    pub(crate) config: &'a UpgradeConfig,
    pub(crate) issues: Vec<IdeviceIssue>,
}

#[derive(Clone, Copy)]
struct UpgradeStep {
    version: u32,
    description: &'static str,
    apply: fn(&mut GenericIdevice, &mut UpgradeContext<'_>),
}

const UPGRADE_STEPS: &[UpgradeStep] = &[
    UpgradeStep {
        version: 1,
        description: "icon from classification",
        apply: steps::icon_from_classification,
    },
    UpgradeStep {
        version: 2,
        description: "typed fields from legacy records",
        apply: steps::typed_fields,
    },
    UpgradeStep {
        version: 3,
        description: "emphasis",
        apply: steps::default_emphasis,
    },
    UpgradeStep {
        version: 4,
        description: "last idevice flag",
        apply: steps::last_idevice_flag,
    },
    UpgradeStep {
        version: 5,
        description: "node resources",
        apply: steps::node_resources,
    },
    UpgradeStep {
        version: 6,
        description: "field version 2 and baseline scripts",
        apply: steps::field_version2_and_scripts,
    },
    UpgradeStep {
        version: 7,
        description: "reading activity feedback field",
        apply: steps::reading_feedback,
    },
    UpgradeStep {
        version: 8,
        description: "field id counter reset",
        apply: steps::reset_field_counter,
    },
    UpgradeStep {
        version: 9,
        description: "image feedback flag and feedback content",
        apply: steps::feedback_content,
    },
];

/// Returns the latest node version known by this build.
pub fn latest_version() -> u32 {
    UPGRADE_STEPS.last().map_or(0, |step| step.version)
}

/// Outcome of one upgrade run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    pub from_version: u32,
    pub to_version: u32,
    /// Versions whose steps ran, in order.
    pub applied: Vec<u32>,
    pub issues: Vec<IdeviceIssue>,
}

impl UpgradeReport {
    /// Whether content was dropped or left unconverted.
    ///
    /// A degraded node is structurally valid; whether it may be persisted is
    /// the caller's decision.
    pub fn is_degraded(&self) -> bool {
        self.issues.iter().any(IdeviceIssue::degrades_node)
    }

    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Upgrades `node` to the latest version with default literals.
pub fn upgrade_idevice(node: &mut GenericIdevice) -> UpgradeResult<UpgradeReport> {
    upgrade_idevice_with(node, &UpgradeConfig::default())
}

/// Applies every pending upgrade step to `node`.
pub fn upgrade_idevice_with(
    node: &mut GenericIdevice,
    config: &UpgradeConfig,
) -> UpgradeResult<UpgradeReport> {
    let from_version = node.stored_version;
    let latest = latest_version();

    if from_version > latest {
        error!(
            "event=idevice_upgrade module=upgrade status=error node_id={} stored_version={} latest_supported={} error_code=unsupported_version",
            node.id, from_version, latest
        );
        return Err(UpgradeError::UnsupportedVersion {
            node_id: node.id.clone(),
            stored_version: from_version,
            latest_supported: latest,
        });
    }

    let mut report = UpgradeReport {
        from_version,
        to_version: from_version,
        applied: Vec::new(),
        issues: Vec::new(),
    };
    if from_version == latest {
        return Ok(report);
    }

    info!(
        "event=idevice_upgrade module=upgrade status=start node_id={} from_version={} to_version={}",
        node.id, from_version, latest
    );

    let mut ctx = UpgradeContext {
        config,
        issues: Vec::new(),
    };
    for step in UPGRADE_STEPS {
        if step.version <= node.stored_version {
            continue;
        }

        debug!(
            "event=idevice_upgrade_step module=upgrade status=start node_id={} version={} step={}",
            node.id, step.version, step.description
        );
        (step.apply)(node, &mut ctx);
        node.stored_version = step.version;
        report.applied.push(step.version);
    }

    report.to_version = node.stored_version;
    report.issues = ctx.issues;

    if report.is_degraded() {
        warn!(
            "event=idevice_upgrade module=upgrade status=degraded node_id={} from_version={} to_version={} issues={}",
            node.id,
            report.from_version,
            report.to_version,
            report.issues.len()
        );
    } else {
        info!(
            "event=idevice_upgrade module=upgrade status=ok node_id={} from_version={} to_version={} issues={}",
            node.id,
            report.from_version,
            report.to_version,
            report.issues.len()
        );
    }

    Ok(report)
}
