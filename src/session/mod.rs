pub mod model;
pub mod store;

pub use model::{
    Analysis, EntryKind, NewSession, Question, Session, SessionStatus, Speaker, TranscriptEntry,
};
pub use store::SessionStore;
