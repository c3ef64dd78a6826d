pub mod editor;
pub mod pending;

pub use crate::editor::{RecordEditor, TaskEditor};
pub use crate::pending::{PendingWrite, PendingWrites, SaveState, WriteKey, WriteState};
