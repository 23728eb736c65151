//! Top-level command dispatch.
//!
//! Every external command passes through [`CommandDispatcher::dispatch`],
//! the middleware chain composed in one place: duration measurement, the
//! auto-pause policy (a failed command halts the surrounding print unless
//! the unit is already paused) and failure recording for the replay-on-
//! resume flow. Each dispatch produces an [`OperationReport`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::MultifeedError;
use crate::recovery::FailureRecord;
use crate::scripts;
use crate::unit::Mmu;

/// A top-level command with its original arguments, as replayed by `resume`.
#[derive(Debug, Clone, PartialEq)]
pub enum MmuCommand {
    Home,
    HomeOnly,
    HomeIdler,
    SelectTool(usize),
    UnselectTool,
    LoadTool(usize),
    UnloadTool,
    ChangeTool(usize),
    CutTool(usize),
    EjectTool,
    CalibratePulley,
    Pause,
    Resume,
    Unlock,
}

impl MmuCommand {
    /// Recovery commands are exempt from the auto-pause wrapper; they must
    /// be able to run (and fail) while the unit is halted.
    fn auto_pauses(&self) -> bool {
        !matches!(
            self,
            MmuCommand::Pause | MmuCommand::Resume | MmuCommand::Unlock
        )
    }
}

impl fmt::Display for MmuCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmuCommand::Home => write!(f, "HOME_MMU"),
            MmuCommand::HomeOnly => write!(f, "HOME_MMU_ONLY"),
            MmuCommand::HomeIdler => write!(f, "HOME_IDLER"),
            MmuCommand::SelectTool(tool) => write!(f, "SELECT_TOOL {tool}"),
            MmuCommand::UnselectTool => write!(f, "UNSELECT_TOOL"),
            MmuCommand::LoadTool(tool) => write!(f, "LT {tool}"),
            MmuCommand::UnloadTool => write!(f, "UT"),
            MmuCommand::ChangeTool(tool) => write!(f, "T{tool}"),
            MmuCommand::CutTool(tool) => write!(f, "K{tool}"),
            MmuCommand::EjectTool => write!(f, "EJECT"),
            MmuCommand::CalibratePulley => write!(f, "PULLEY_CALIBRATE"),
            MmuCommand::Pause => write!(f, "PAUSE_MMU"),
            MmuCommand::Resume => write!(f, "RESUME_MMU"),
            MmuCommand::Unlock => write!(f, "UNLOCK_MMU"),
        }
    }
}

/// Structured record of one dispatched command.
#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub id: String,
    pub command: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    /// Whether the unit ended up paused (auto-pause or otherwise).
    pub paused: bool,
}

/// Drives commands through the middleware chain.
pub struct CommandDispatcher {
    mmu: Mmu,
    failure: Option<FailureRecord>,
}

impl CommandDispatcher {
    pub fn new(mmu: Mmu) -> Self {
        Self { mmu, failure: None }
    }

    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    pub fn mmu_mut(&mut self) -> &mut Mmu {
        &mut self.mmu
    }

    pub fn failure_record(&self) -> Option<&FailureRecord> {
        self.failure.as_ref()
    }

    /// Run one command through the full chain: execute, report duration,
    /// auto-pause and record the failure when appropriate.
    pub fn dispatch(&mut self, command: MmuCommand) -> OperationReport {
        let started_at = Utc::now();
        let clock = std::time::Instant::now();

        let result = self.execute(&command);

        let elapsed = clock.elapsed();
        self.mmu.reporter.info(&format!(
            "{command} took {:.1} seconds",
            elapsed.as_secs_f64()
        ));

        if let Err(ref err) = result
            && command.auto_pauses()
            && !self.mmu.state.is_paused
        {
            self.failure = Some(FailureRecord {
                command: command.clone(),
                error: err.to_string(),
            });
            self.mmu.pause();
        }

        let completed_at = Utc::now();
        OperationReport {
            id: Uuid::new_v4().to_string(),
            command: command.to_string(),
            succeeded: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds(),
            paused: self.mmu.state.is_paused,
        }
    }

    fn execute(&mut self, command: &MmuCommand) -> Result<(), MultifeedError> {
        match command {
            MmuCommand::Home => self.mmu.home(),
            MmuCommand::HomeOnly => self.mmu.home_only(),
            MmuCommand::HomeIdler => {
                self.mmu.home_idler();
                Ok(())
            }
            MmuCommand::SelectTool(tool) => self.mmu.select_tool(*tool),
            MmuCommand::UnselectTool => self.mmu.unselect_tool(),
            MmuCommand::LoadTool(tool) => self.mmu.load_tool(*tool),
            MmuCommand::UnloadTool => self.mmu.unload_tool(),
            MmuCommand::ChangeTool(tool) => self.mmu.change_tool(*tool),
            MmuCommand::CutTool(tool) => self.mmu.cut_at_tool(*tool),
            MmuCommand::EjectTool => self.mmu.eject_tool(),
            MmuCommand::CalibratePulley => self.mmu.calibrate_pulley(),
            MmuCommand::Pause => {
                self.mmu.pause();
                Ok(())
            }
            MmuCommand::Unlock => self.mmu.unlock(),
            MmuCommand::Resume => self.resume(),
        }
    }

    /// Clear the pause flag, replay the recorded failed command once if
    /// there is one, and ask the host to restore motion state and continue.
    /// A failed replay re-pauses with the record left cleared, so a second
    /// resume does not loop.
    fn resume(&mut self) -> Result<(), MultifeedError> {
        self.mmu.state.is_paused = false;

        if let Some(record) = self.failure.take()
            && record.command != MmuCommand::Resume
        {
            self.mmu.reporter.info(&format!(
                "Replaying {} after recovery ({})",
                record.command, record.error
            ));
            let command = record.command;
            if let Err(err) = self.execute(&command) {
                self.mmu.pause();
                return Err(err);
            }
        }

        let script = scripts::resume_sequence();
        self.mmu.io.scripts.run(&script);
        Ok(())
    }
}
