// OpenPawz Context Engine
// In-process context assembly for conversational agents: a TTL/LRU cache,
// three memory tiers, heuristic emotion analysis, validation with health
// checks, and a performance monitor, all tied together by `ContextManager`.
//
// Layout follows the atoms/engine split:
//   atoms/   pure data, constants, config, errors, collaborator traits
//   engine/  the stateful components and the manager that composes them

pub mod atoms;
pub mod engine;

pub use atoms::config::ContextEngineConfig;
pub use atoms::error::{EngineError, EngineResult};
pub use atoms::types::{Context, ContextEvent, ContextEventType, Message, Sender, SystemPolicy};
pub use engine::manager::{ContextManager, LifecycleState};
