pub mod shell;
pub mod types;

pub use shell::{Notice, RuleList, ShellEvent, ShellState};
pub use types::{
    CaptureFrame, Configuration, ConfigurationDraft, Rule, SessionStats, StimulusKind,
    StimulusOutcome, TriggerResult,
};
