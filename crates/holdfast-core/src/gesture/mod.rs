mod machine;

pub use machine::{
    GestureConfig, GestureOutput, GesturePhase, GestureSession, GestureStateMachine, PressOutcome,
};
