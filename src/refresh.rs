//! E-paper refresh planning
//!
//! An e-paper panel sits in one of three [`RefreshState`]s. Entering a
//! state, or repeating the refresh of the current one, is first planned as
//! a list of [`RefreshStep`]s by [`RefreshPlanner`] and then executed by the
//! [`EpaperPanel`](crate::panel::EpaperPanel).
//!
//! ```
//! use panelkit::config::{EpdMode, EpdTiming};
//! use panelkit::refresh::{RefreshMode, RefreshPlanner, RefreshStep};
//!
//! let planner = RefreshPlanner::new(EpdMode::TwoTable, false, false, EpdTiming::default());
//! assert_eq!(
//!     planner.entry(RefreshMode::Full),
//!     [
//!         RefreshStep::LoadLut(RefreshMode::Full),
//!         RefreshStep::WriteFrame,
//!         RefreshStep::Activate,
//!         RefreshStep::Hold(350),
//!     ]
//! );
//! ```

use alloc::vec;
use alloc::vec::Vec;

use crate::config::{DeviceConfig, EpdMode, EpdTiming};

/// Refresh state of an e-paper panel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefreshState {
    /// Nothing shown since power-up
    #[default]
    Uninitialized,
    /// Full waveform in use
    Full,
    /// Partial waveform in use
    Partial,
}

/// Requested refresh waveform
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshMode {
    /// Slow refresh that clears ghosting
    Full,
    /// Fast refresh
    Partial,
}

impl From<RefreshMode> for RefreshState {
    fn from(mode: RefreshMode) -> Self {
        match mode {
            RefreshMode::Full => Self::Full,
            RefreshMode::Partial => Self::Partial,
        }
    }
}

/// One action of a refresh
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshStep {
    /// Upload the waveform table
    LoadLut(RefreshMode),
    /// Run the descriptor's refresh command table
    RunTable(RefreshMode),
    /// Write the inverted frame to controller RAM
    WriteFrame,
    /// Start the update and wait until the panel is ready
    Activate,
    /// Fill both RAM planes with white
    ClearPlanes,
    /// Write both planes, all indexed LUTs and trigger the update
    ShowPlanes,
    /// Plain delay in units of 10 ms
    Hold(u16),
}

/// Plans refreshes for one e-paper panel
#[derive(Clone, Debug, PartialEq)]
pub struct RefreshPlanner {
    mode: EpdMode,
    full_table: bool,
    partial_table: bool,
    timing: EpdTiming,
}

impl RefreshPlanner {
    /// Planner for a panel in `mode`, with or without refresh command tables
    pub fn new(mode: EpdMode, full_table: bool, partial_table: bool, timing: EpdTiming) -> Self {
        Self {
            mode,
            full_table,
            partial_table,
            timing,
        }
    }

    /// Planner for an e-paper configuration, `None` for other panels
    pub fn from_config(config: &DeviceConfig) -> Option<Self> {
        Some(Self::new(
            config.epd_mode?,
            !config.full_refresh_commands().is_empty(),
            !config.partial_refresh_commands().is_empty(),
            config.epd_timing.clone(),
        ))
    }

    /// Refresh protocol
    pub fn mode(&self) -> EpdMode {
        self.mode
    }

    fn has_table(&self, mode: RefreshMode) -> bool {
        match mode {
            RefreshMode::Full => self.full_table,
            RefreshMode::Partial => self.partial_table,
        }
    }

    fn hold(&self, mode: RefreshMode) -> u16 {
        match mode {
            RefreshMode::Full => self.timing.full,
            RefreshMode::Partial => self.timing.partial,
        }
    }

    fn refresh(&self, mode: RefreshMode, steps: &mut Vec<RefreshStep>) {
        if self.has_table(mode) {
            steps.push(RefreshStep::RunTable(mode));
        } else {
            steps.extend([RefreshStep::WriteFrame, RefreshStep::Activate]);
        }
    }

    /// Steps that enter `target`
    pub fn entry(&self, target: RefreshMode) -> Vec<RefreshStep> {
        let mut steps = Vec::new();
        match (self.mode, target) {
            (EpdMode::TwoTable, _) => {
                steps.push(RefreshStep::LoadLut(target));
                self.refresh(target, &mut steps);
                steps.push(RefreshStep::Hold(self.hold(target)));
            }
            (EpdMode::CommandSequence, _) => {
                self.refresh(target, &mut steps);
                steps.push(RefreshStep::Hold(self.hold(target)));
            }
            (EpdMode::FiveTable, RefreshMode::Full) => {
                steps.extend([
                    RefreshStep::ClearPlanes,
                    RefreshStep::ShowPlanes,
                    RefreshStep::Hold(self.hold(target)),
                ]);
            }
            (EpdMode::FiveTable, RefreshMode::Partial) => {}
        }
        steps
    }

    /// Steps that repeat the refresh of `state`
    ///
    /// No LUT is uploaded, no plane cleared and no hold added.
    pub fn update(&self, state: RefreshState) -> Vec<RefreshStep> {
        match (self.mode, state) {
            (EpdMode::FiveTable, _) => vec![RefreshStep::ShowPlanes],
            (_, RefreshState::Uninitialized) => {
                vec![RefreshStep::WriteFrame, RefreshStep::Activate]
            }
            (_, RefreshState::Full) => {
                let mut steps = Vec::new();
                self.refresh(RefreshMode::Full, &mut steps);
                steps
            }
            (_, RefreshState::Partial) => {
                let mut steps = Vec::new();
                self.refresh(RefreshMode::Partial, &mut steps);
                steps
            }
        }
    }
}
