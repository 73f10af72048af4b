//! Order status state machine.

mod machine;
mod transitions;

pub use machine::{OrderStateMachine, TransitionRequest, TransitionResult, refund_reference};
pub use transitions::{Actor, actor_may, is_allowed};
