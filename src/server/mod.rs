pub mod dto;
pub mod response;
mod router;
mod tracks;
mod users;
pub mod validation;

pub use router::{AppState, create_router};
pub use tracks::tracks_router;
pub use users::users_router;
