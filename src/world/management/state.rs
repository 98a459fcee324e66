use serde::{Deserialize, Serialize};

/// Lifecycle of a chunk. Absence from the registry means `Unloaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChunkState {
    Unloaded = 0,
    LoadingTerrain = 1,
    LoadedTerrain = 2,
    Renderable = 3,
    Unloading = 4,
    Cached = 5,
}

impl ChunkState {
    pub const ALL: [ChunkState; 6] = [
        ChunkState::Unloaded,
        ChunkState::LoadingTerrain,
        ChunkState::LoadedTerrain,
        ChunkState::Renderable,
        ChunkState::Unloading,
        ChunkState::Cached,
    ];

    /// Every edge of the lifecycle
    pub const TRANSITIONS: [(ChunkState, ChunkState); 9] = [
        (ChunkState::Unloaded, ChunkState::LoadingTerrain),
        (ChunkState::LoadingTerrain, ChunkState::LoadedTerrain),
        (ChunkState::LoadingTerrain, ChunkState::Unloaded),
        (ChunkState::LoadedTerrain, ChunkState::Renderable),
        (ChunkState::Renderable, ChunkState::Unloading),
        (ChunkState::Unloading, ChunkState::Cached),
        (ChunkState::Unloading, ChunkState::Unloaded),
        (ChunkState::Cached, ChunkState::LoadedTerrain),
        (ChunkState::Cached, ChunkState::Unloading),
    ];

    pub fn from_u8(value: u8) -> Option<ChunkState> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Holds live terrain that is in use (not parked in the cache)
    pub fn is_loaded(self) -> bool {
        !matches!(self, ChunkState::Unloaded | ChunkState::Cached)
    }

    /// Finalization may run in this state
    pub fn is_finalizable(self) -> bool {
        matches!(self, ChunkState::LoadedTerrain | ChunkState::Renderable)
    }

    /// Neighbours may merge against this chunk's boundary planes
    pub fn is_mergeable(self) -> bool {
        self.is_finalizable()
    }

    pub fn can_transition_to(self, to: ChunkState) -> bool {
        Self::TRANSITIONS.contains(&(self, to))
    }

    pub fn name(self) -> &'static str {
        match self {
            ChunkState::Unloaded => "unloaded",
            ChunkState::LoadingTerrain => "loading terrain",
            ChunkState::LoadedTerrain => "loaded terrain",
            ChunkState::Renderable => "renderable",
            ChunkState::Unloading => "unloading",
            ChunkState::Cached => "cached",
        }
    }
}

impl std::fmt::Display for ChunkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8_round_trip() {
        for state in ChunkState::ALL {
            assert_eq!(ChunkState::from_u8(state as u8), Some(state));
        }
        assert_eq!(ChunkState::from_u8(6), None);
    }

    #[test]
    fn test_transition_table() {
        assert!(ChunkState::Unloaded.can_transition_to(ChunkState::LoadingTerrain));
        assert!(ChunkState::Cached.can_transition_to(ChunkState::LoadedTerrain));
        assert!(!ChunkState::Unloaded.can_transition_to(ChunkState::Renderable));
        assert!(!ChunkState::Renderable.can_transition_to(ChunkState::Cached));
        assert!(!ChunkState::Cached.can_transition_to(ChunkState::Unloaded));
    }

    #[test]
    fn test_is_loaded() {
        assert!(!ChunkState::Unloaded.is_loaded());
        assert!(!ChunkState::Cached.is_loaded());
        assert!(ChunkState::LoadingTerrain.is_loaded());
        assert!(ChunkState::Unloading.is_loaded());
    }
}
