mod lifecycle;
mod process;

pub use lifecycle::{Action, Lifecycle, SpeedFactor, Transition};
pub use process::{
    Field, NewProcess, Process, ProcessPatch, ProcessStatus, ProcessType, ProcessUpdate,
};
