//! Services - business logic and state management
//!
//! - `workflow` - Vending session state machine (card, door, inference, reset)
//! - `watchdog` - Cancellable timeouts between session transitions
//! - `board` - Controller board commands (lock, unlock, LCD)
//! - `collaborators` - Trait seams to the external REST services

pub mod board;
pub mod collaborators;
pub mod watchdog;
pub mod workflow;

// Re-export commonly used types
pub use board::{board_from_config, BoardCommand, ControllerBoard, HttpBoard, VirtualBoard};
pub use collaborators::Collaborators;
pub use workflow::{
    BoardStatusOutcome, DoorTransition, InferenceOutcome, ScanOutcome, VendingWorkflow,
};
