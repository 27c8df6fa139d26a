pub mod review_request;
pub mod review_slot;

pub use review_request::ReviewRequest;
pub use review_slot::ReviewSlot;
