use std::fs;
use std::path::Path;
use tracing::{debug, info};
use omni_core::{Error, Result};
use crate::profile::ConstraintProfile;
use crate::snapshot::{freeze_line_name, Snapshot};

/// Derives constraint lines from a snapshot: explicit pins first, then every
/// freeze line the profile keeps, verbatim.
pub fn build_constraints(snapshot: &Snapshot, profile: ConstraintProfile) -> Vec<String> {
    let mut constraints: Vec<String> = profile
        .pinned_packages()
        .iter()
        .filter_map(|name| snapshot.version_of(name).map(|v| format!("{}=={}", name, v)))
        .collect();

    for line in &snapshot.protected_freeze {
        let Some(name) = freeze_line_name(line) else {
            continue;
        };
        if profile.is_pinned(name) {
            debug!("skipping {} (pinned from snapshot fields)", name);
            continue;
        }
        if profile.keeps(name) {
            constraints.push(line.trim().to_string());
        }
    }

    constraints
}

pub fn write_constraints(path: &Path, constraints: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, constraints.join("\n") + "\n")?;
    Ok(())
}

/// Reads `input`, builds the constraints and writes them to `output`.
/// Nothing is written when the snapshot holds no protected packages.
pub fn run(input: &Path, output: &Path, profile: ConstraintProfile) -> Result<usize> {
    let snapshot = Snapshot::load(input)?;
    let constraints = build_constraints(&snapshot, profile);
    if constraints.is_empty() {
        return Err(Error::EmptyResult);
    }
    write_constraints(output, &constraints)?;
    info!(profile = ?profile, count = constraints.len(), "constraints written to {}", output.display());
    Ok(constraints.len())
}
