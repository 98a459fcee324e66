//! Pipeline counters
//!
//! Updated from the tick thread and workers alike, read as a plain snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use super::state::ChunkState;

const STATE_COUNT: usize = ChunkState::ALL.len();

macro_rules! loader_counters {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        #[derive(Debug, Default)]
        pub struct LoaderStats {
            $($(#[$doc])* pub(crate) $name: AtomicU64,)*
            transitions: [[AtomicU64; STATE_COUNT]; STATE_COUNT],
        }

        /// Point-in-time copy of [`LoaderStats`]
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct LoaderStatsSnapshot {
            $($(#[$doc])* pub $name: u64,)*
            /// `transitions[from][to]`, indexed by [`ChunkState::index`]
            pub transitions: [[u64; STATE_COUNT]; STATE_COUNT],
        }

        impl LoaderStats {
            pub fn snapshot(&self) -> LoaderStatsSnapshot {
                let mut transitions = [[0; STATE_COUNT]; STATE_COUNT];
                for (from, row) in self.transitions.iter().enumerate() {
                    for (to, count) in row.iter().enumerate() {
                        transitions[from][to] = count.load(Ordering::Relaxed);
                    }
                }
                LoaderStatsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)*
                    transitions,
                }
            }
        }
    };
}

loader_counters! {
    /// Chunks whose terrain finished generating
    generated,
    generation_failures,
    /// Finalizations that produced a mesh
    finalized,
    /// Finalizations postponed because a neighbour was still generating
    finalize_retries,
    /// Neighbour updates whose merge changed nothing, so the mesh was kept
    unchanged_updates,
    cached,
    uncached,
    /// Cached chunks freed for being too far away or to make room
    evicted,
    freed,
    /// Frees postponed because a task still referenced the chunk
    deferred_frees,
    pool_exhaustions,
    /// Releases without a matching retain
    ref_violations,
    /// Tasks that found their slot reassigned
    stale_accesses,
    /// Generator or finalization work that panicked and was unwound
    task_panics,
    illegal_transitions,
}

impl LoaderStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transition(&self, from: ChunkState, to: ChunkState) {
        self.transitions[from.index()][to.index()].fetch_add(1, Ordering::Relaxed);
    }
}

impl LoaderStatsSnapshot {
    pub fn transition_count(&self, from: ChunkState, to: ChunkState) -> u64 {
        self.transitions[from.index()][to.index()]
    }

    /// Transitions recorded along edges outside the lifecycle graph
    pub fn off_graph_transitions(&self) -> u64 {
        let mut total = 0;
        for from in ChunkState::ALL {
            for to in ChunkState::ALL {
                if !from.can_transition_to(to) {
                    total += self.transition_count(from, to);
                }
            }
        }
        total
    }
}
