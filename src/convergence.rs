//! Merge → compact → re-measure loop that drives the grid toward a minimum cell size.

use crate::errors::SchematicError;
use crate::grid_compaction::{CompactionMode, compact};
use crate::grid_model::{Axis, GridDocument};
use crate::line_sizing::{
    CanvasExtent, FocalPoint, GridMeasurement, MinCellDimensions, SizingOptions, measure_grid,
};
use crate::station_merge::merge_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ITERATIONS: usize = 20;
pub const DEFAULT_MAX_GAP: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceSettings {
    /// Smallest acceptable cell edge, in points.
    pub min_cell_points: u32,
    pub max_iterations: usize,
    pub max_gap: u32,
    pub canvas: CanvasExtent,
    pub sizing: SizingOptions,
    pub compaction: CompactionMode,
    #[serde(skip)]
    pub focal: Option<FocalPoint>,
}

impl Default for ConvergenceSettings {
    fn default() -> Self {
        Self {
            min_cell_points: 12,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_gap: DEFAULT_MAX_GAP,
            canvas: CanvasExtent::default(),
            sizing: SizingOptions::default(),
            compaction: CompactionMode::Full,
            focal: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceState {
    Idle,
    Merging(Axis),
    Reducing(Axis),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    IterationCeiling(usize),
    GapCeiling(Axis, u32),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::IterationCeiling(max) => write!(f, "iteration ceiling {} reached", max),
            StopReason::GapCeiling(axis, max) => {
                write!(f, "gap ceiling {} reached on the {} axis", max, axis)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceOutcome {
    Converged,
    NonConverged(StopReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub iteration: usize,
    pub axis: Axis,
    pub gap: u32,
    pub merges: usize,
    pub compacted: bool,
    pub before: MinCellDimensions,
    pub after: MinCellDimensions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceReport {
    /// Best-effort document, partially simplified when the loop did not converge.
    pub document: GridDocument,
    pub outcome: ConvergenceOutcome,
    pub cycles: Vec<CycleReport>,
    pub measurement: GridMeasurement,
}

impl ConvergenceReport {
    pub fn converged(&self) -> bool {
        self.outcome == ConvergenceOutcome::Converged
    }
}

pub struct Orchestrator {
    settings: ConvergenceSettings,
    document: GridDocument,
    state: ConvergenceState,
    gaps: [u32; 2],
    iteration: usize,
    cycles: Vec<CycleReport>,
    outcome: Option<ConvergenceOutcome>,
}

fn axis_slot(axis: Axis) -> usize {
    match axis {
        Axis::Horizontal => 0,
        Axis::Vertical => 1,
    }
}

impl Orchestrator {
    pub fn new(document: GridDocument, settings: ConvergenceSettings) -> Self {
        Self {
            settings,
            document,
            state: ConvergenceState::Idle,
            gaps: [0, 0],
            iteration: 0,
            cycles: Vec::new(),
            outcome: None,
        }
    }

    pub fn state(&self) -> ConvergenceState {
        self.state
    }

    pub fn document(&self) -> &GridDocument {
        &self.document
    }

    pub fn gap(&self, axis: Axis) -> u32 {
        self.gaps[axis_slot(axis)]
    }

    pub fn measure(&self) -> GridMeasurement {
        measure_grid(
            &self.document,
            self.settings.canvas,
            &self.settings.sizing,
            self.settings.focal,
        )
    }

    fn below_threshold(&self, measurement: &GridMeasurement, axis: Axis) -> bool {
        let min = measurement.min_for(axis);
        min > 0 && min < self.settings.min_cell_points
    }

    /// Width is checked before height.
    fn axis_to_shrink(&self, measurement: &GridMeasurement) -> Option<Axis> {
        Axis::BOTH
            .into_iter()
            .find(|&axis| self.below_threshold(measurement, axis))
    }

    fn finish(&mut self, outcome: ConvergenceOutcome) {
        self.state = ConvergenceState::Done;
        self.outcome = Some(outcome);
        match outcome {
            ConvergenceOutcome::Converged => {
                info!("Grid converged after {} cycles", self.iteration)
            }
            ConvergenceOutcome::NonConverged(reason) => {
                let error = SchematicError::NonConvergence {
                    iterations: self.iteration,
                    reason: reason.to_string(),
                };
                warn!("{}; keeping partially simplified grid", error);
            }
        }
    }

    /// Runs one merge → compact → re-measure cycle. Returns `None` once the loop is done.
    pub fn step(&mut self) -> Option<CycleReport> {
        if self.state == ConvergenceState::Done {
            return None;
        }

        let before = self.measure();
        for axis in Axis::BOTH {
            if !self.below_threshold(&before, axis) {
                self.gaps[axis_slot(axis)] = 0;
            }
        }
        let Some(axis) = self.axis_to_shrink(&before) else {
            self.finish(ConvergenceOutcome::Converged);
            return None;
        };

        // Only a grid still below the threshold can hit the ceiling.
        if self.iteration >= self.settings.max_iterations {
            self.finish(ConvergenceOutcome::NonConverged(StopReason::IterationCeiling(
                self.settings.max_iterations,
            )));
            return None;
        }

        let gap = self.gap(axis);
        self.state = ConvergenceState::Merging(axis);
        let merged = merge_all(&self.document.routes, gap as f64, Some(axis));
        let merges = merged.value.merges;
        let merged_doc = self.document.with_routes(merged.value.routes);

        self.state = ConvergenceState::Reducing(axis);
        let compacted = compact(&merged_doc, self.settings.compaction);
        let compacted_flag = compacted.modified;
        self.document = compacted.value;
        self.iteration += 1;

        let after = self.measure();
        let report = CycleReport {
            iteration: self.iteration,
            axis,
            gap,
            merges,
            compacted: compacted_flag,
            before: before.min_cell,
            after: after.min_cell,
        };

        debug!(
            "Cycle {}: {} axis at gap {} merged {} stations, min cell {}x{} -> {}x{} pt",
            report.iteration,
            axis,
            gap,
            merges,
            report.before.min_width,
            report.before.min_height,
            report.after.min_width,
            report.after.min_height
        );

        self.state = ConvergenceState::Idle;
        if self.below_threshold(&after, axis) {
            if gap >= self.settings.max_gap {
                self.finish(ConvergenceOutcome::NonConverged(StopReason::GapCeiling(
                    axis,
                    self.settings.max_gap,
                )));
            } else {
                self.gaps[axis_slot(axis)] += 1;
            }
        } else {
            self.gaps[axis_slot(axis)] = 0;
        }

        self.cycles.push(report.clone());
        Some(report)
    }

    fn into_report(self) -> ConvergenceReport {
        let measurement = self.measure();
        ConvergenceReport {
            outcome: self
                .outcome
                .unwrap_or(ConvergenceOutcome::NonConverged(StopReason::IterationCeiling(
                    self.iteration,
                ))),
            document: self.document,
            cycles: self.cycles,
            measurement,
        }
    }

    /// Drives cycles to completion, yielding to the runtime between cycles so a host can
    /// repaint or observe the intermediate grid.
    pub async fn run(mut self) -> ConvergenceReport {
        while let Some(report) = self.step() {
            info!(
                "Cycle {} ({} axis, gap {}): {} merges, min cell now {}x{} pt",
                report.iteration,
                report.axis,
                report.gap,
                report.merges,
                report.after.min_width,
                report.after.min_height
            );
            tokio::task::yield_now().await;
        }
        self.into_report()
    }

    pub fn run_blocking(mut self) -> ConvergenceReport {
        while self.step().is_some() {}
        self.into_report()
    }
}
