//! Relative ordering between plugins.
//!
//! # Responsibilities
//! - Sort a target plugin's phases for one stage by their current position
//! - Pick the boundary phase (first for `before`, last for `after`)
//! - Insert one new phase next to the boundary and register hooks on it
//!
//! # Design Decisions
//! - With several targets the new phase is placed once, before the earliest
//!   (or after the latest) boundary among all of them, which puts it on the
//!   right side of every target
//! - A stage where no target registered anything falls back to the stage's
//!   default phase

use std::sync::Arc;

use crate::application::call::ApplicationCall;
use crate::pipeline::{Interceptor, Phase, Pipeline};
use crate::plugin::registry::{InstalledPlugin, PluginId, StagePhases};
use crate::plugin::{PluginError, Stage};

/// Which side of the targets the new phase goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeOrder {
    Before,
    After,
}

/// `target`'s phases for `stage`, paired with their index and sorted by it.
///
/// Fails with `NotInstalled` if a recorded phase is missing from `pipeline`.
pub(crate) fn sorted_phases<S>(
    pipeline: &Pipeline<S, ApplicationCall>,
    stage: Stage,
    target: &InstalledPlugin,
) -> Result<Vec<(usize, Phase)>, PluginError>
where
    S: Send + 'static,
{
    let mut sorted = target
        .phases()
        .get(stage)
        .iter()
        .map(|phase| {
            pipeline
                .index_of(phase)
                .map(|index| (index, phase.clone()))
                .ok_or(PluginError::NotInstalled(target.id()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    sorted.sort_by_key(|(index, _)| *index);
    Ok(sorted)
}

/// Boundary phase across all `targets`, or `None` when none of them
/// registered anything for `stage`.
pub(crate) fn select_boundary<S>(
    pipeline: &Pipeline<S, ApplicationCall>,
    stage: Stage,
    order: RelativeOrder,
    targets: &[Arc<InstalledPlugin>],
) -> Result<Option<Phase>, PluginError>
where
    S: Send + 'static,
{
    let mut selected: Option<(usize, Phase)> = None;
    for target in targets {
        let sorted = sorted_phases(pipeline, stage, target)?;
        let candidate = match order {
            RelativeOrder::Before => sorted.into_iter().next(),
            RelativeOrder::After => sorted.into_iter().next_back(),
        };
        let Some((index, phase)) = candidate else {
            continue;
        };
        let replace = match (&selected, order) {
            (None, _) => true,
            (Some((current, _)), RelativeOrder::Before) => index < *current,
            (Some((current, _)), RelativeOrder::After) => index > *current,
        };
        if replace {
            selected = Some((index, phase));
        }
    }
    Ok(selected.map(|(_, phase)| phase))
}

/// Place `handlers` relative to `targets` in one pipeline.
///
/// Returns the phase inserted for them, if any.
pub(crate) fn apply<S>(
    pipeline: &mut Pipeline<S, ApplicationCall>,
    stage: Stage,
    order: RelativeOrder,
    targets: &[Arc<InstalledPlugin>],
    handlers: Vec<Interceptor<S, ApplicationCall>>,
    owner: PluginId,
    recorded: &mut StagePhases,
) -> Result<Option<Phase>, PluginError>
where
    S: Send + 'static,
{
    if handlers.is_empty() {
        return Ok(None);
    }

    let (phase, inserted) = match select_boundary(pipeline, stage, order, targets)? {
        Some(boundary) => {
            let phase = Phase::new(format!("{}Phase{}", owner, fastrand::u32(..)));
            match order {
                RelativeOrder::Before => pipeline.insert_phase_before(&boundary, phase.clone())?,
                RelativeOrder::After => pipeline.insert_phase_after(&boundary, phase.clone())?,
            }
            tracing::debug!(
                plugin = owner,
                stage = ?stage,
                order = ?order,
                phase = %phase,
                boundary = %boundary,
                "Inserted relative phase"
            );
            (phase.clone(), Some(phase))
        }
        None => {
            tracing::debug!(
                plugin = owner,
                stage = ?stage,
                "No target phases for stage, using default phase"
            );
            (stage.default_phase(), None)
        }
    };

    for handler in handlers {
        pipeline.intercept_shared(&phase, Some(owner), handler)?;
    }
    recorded.record(stage, phase);
    Ok(inserted)
}
