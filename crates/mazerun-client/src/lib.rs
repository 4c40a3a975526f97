pub mod reconcile;
pub mod recovery;
pub mod view;

pub use reconcile::ApplyOutcome;
pub use view::{Capability, ClientView, ViewEvent};
