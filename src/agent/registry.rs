//! Active room registry
//!
//! A room hosts exactly one interview. The registry enforces that invariant
//! inside one process: an orchestrator claims its room before doing any
//! remote work and the claim releases itself when the session task ends,
//! however it ends.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::errors::app_error::{AppError, AppResult};

/// Process-wide map of room name -> owning session id
#[derive(Default)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<String, String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a room for a session. Fails with `RoomBusy` if another live
    /// session already holds it.
    pub fn claim(&self, room_name: &str, session_id: &str) -> AppResult<RoomClaim> {
        match self.rooms.entry(room_name.to_string()) {
            Entry::Occupied(entry) => Err(AppError::RoomBusy {
                room: room_name.to_string(),
                session_id: entry.get().clone(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(session_id.to_string());
                debug!(room = room_name, session_id, "room claimed");
                Ok(RoomClaim {
                    rooms: Arc::clone(&self.rooms),
                    room_name: room_name.to_string(),
                })
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.rooms.len()
    }
}

/// RAII claim on a room; dropping it releases the room
#[derive(Debug)]
pub struct RoomClaim {
    rooms: Arc<DashMap<String, String>>,
    room_name: String,
}

impl Drop for RoomClaim {
    fn drop(&mut self) {
        self.rooms.remove(&self.room_name);
        debug!(room = %self.room_name, "room released");
    }
}
