use serde::{Deserialize, Serialize};

use crate::geo::Position;

/// The ordered path of positions visited during one flight session.
///
/// Append-only while a session is alive; every accepted fix is recorded
/// without deduplication or downsampling so the map renderer sees exactly
/// what the bridge reported. Cleared only on session reset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Track {
    points: Vec<Position>,
}

impl Track {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn append(&mut self, position: Position) {
        self.points.push(position);
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Position] {
        &self.points
    }

    /// Most recently recorded position
    pub fn last(&self) -> Option<Position> {
        self.points.last().copied()
    }
}
