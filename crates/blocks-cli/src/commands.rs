//! Subcommand implementations. Each returns its output instead of printing
//! so the binary decides where it goes.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use blocks_events::{Event, EventBus, SubscribeOptions};
use blocks_model::{StateSnapshot, ValidationReport};
use blocks_state::{StateStore, events};
use tracing::{debug, info};

use crate::render;

/// Read and parse a snapshot file.
pub fn load_snapshot(path: &Path) -> Result<StateSnapshot> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read snapshot {}", path.display()))?;
    let snapshot = StateSnapshot::from_json(&text)
        .with_context(|| format!("parse snapshot {}", path.display()))?;
    debug!(path = %path.display(), states = snapshot.states.len(), history = snapshot.history.len(), "Snapshot loaded");
    Ok(snapshot)
}

/// Load a snapshot into a fresh store.
pub fn load_store(path: &Path) -> Result<StateStore> {
    load_store_on(path, EventBus::new())
}

/// Load a snapshot into a fresh store publishing to `bus`.
pub fn load_store_on(path: &Path, bus: EventBus) -> Result<StateStore> {
    let snapshot = load_snapshot(path)?;
    let mut store = StateStore::new(bus);
    store
        .import_state(snapshot)
        .with_context(|| format!("import snapshot {}", path.display()))?;
    Ok(store)
}

/// Output format for `inspect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectFormat {
    Table,
    Outline,
    Json,
}

pub fn run_inspect(path: &Path, format: InspectFormat) -> Result<String> {
    let store = load_store(path)?;
    let tree = store.get_full_tree();
    let output = match format {
        InspectFormat::Table => format!("{}\n", render::tree_table(&tree)),
        InspectFormat::Outline => render::outline(&tree),
        InspectFormat::Json => {
            let mut text = serde_json::to_string_pretty(&tree).context("serialize tree")?;
            text.push('\n');
            text
        }
    };
    info!(components = store.len(), roots = tree.len(), "Inspected snapshot");
    Ok(output)
}

pub fn run_check(path: &Path) -> Result<ValidationReport> {
    let store = load_store(path)?;
    let report = store.check_integrity();
    info!(
        components = store.len(),
        errors = report.error_count(),
        warnings = report.warning_count(),
        "Integrity check finished"
    );
    Ok(report)
}

pub fn run_history(path: &Path) -> Result<String> {
    let store = load_store(path)?;
    let table = render::history_table(store.history(), store.history_index());
    Ok(format!(
        "{table}\ncursor: {} of {} entries\n",
        store.history_index(),
        store.history().len()
    ))
}

/// Result of `rewind`.
#[derive(Debug)]
pub struct RewindOutcome {
    /// Steps actually undone; fewer than requested when history ran out.
    pub undone: usize,
    pub snapshot: StateSnapshot,
}

/// Undo up to `steps` entries and return the resulting snapshot. With
/// `output` set the snapshot is also written there.
pub fn run_rewind(path: &Path, steps: usize, output: Option<&Path>) -> Result<RewindOutcome> {
    let bus = EventBus::new();
    let steps_log = bus.subscribe(
        events::HISTORY_UNDO,
        |event: &Event| {
            info!(
                kind = event.get_str("kind").unwrap_or_default(),
                label = event.get_str("label").unwrap_or_default(),
                "Undid history entry"
            );
            Ok(())
        },
        SubscribeOptions::default().with_context("rewind"),
    )?;
    let mut store = load_store_on(path, bus)?;
    let mut undone = 0;
    while undone < steps && store.undo() {
        undone += 1;
    }
    steps_log.unsubscribe();
    let snapshot = store.export_state();
    if let Some(output) = output {
        let text = snapshot.to_json_pretty().context("serialize snapshot")?;
        fs::write(output, text).with_context(|| format!("write snapshot {}", output.display()))?;
        info!(path = %output.display(), undone, "Rewound snapshot written");
    }
    Ok(RewindOutcome { undone, snapshot })
}
