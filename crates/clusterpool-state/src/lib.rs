//! clusterpool-state — the authoritative in-memory resource registry.
//!
//! Holds every pre-built cluster the pool manages, the lifecycle state
//! machine that governs them, and the locking discipline every other
//! component mutates through.
//!
//! # Architecture
//!
//! ```text
//! PoolRegistry (Clone, Arc<RwLock<..>> inside)
//!   ├── inspect(|slots| ..)   shared read lock
//!   ├── mutate(|slots| ..)    exclusive write lock
//!   │     └── Slots::transition(id, Transition) → validated state change
//!   ├── read(id) / snapshot() independent copies
//!   └── subscribe()           broadcast of TransitionEvent
//! ```
//!
//! The pool size is fixed by `PoolRegistry::initialize`; resources are never
//! added or removed afterwards. Callers only ever see copies of resources,
//! and every status change passes through [`ResourceStatus::can_transition_to`].

pub mod error;
pub mod namer;
pub mod registry;
pub mod types;

pub use error::{RegistryError, RegistryResult};
pub use namer::{IndexedNamer, Namer, ResourceNaming};
pub use registry::{PoolRegistry, Slots, SlotsRef};
pub use types::*;
