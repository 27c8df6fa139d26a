pub mod slot_machine;

pub use slot_machine::{
    Acceptor, AggregateDelta, EffectIntent, EscrowAction, SlotEvent, SubmitReview, Transition,
};
