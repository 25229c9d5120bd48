//! HTTP routes for imp

pub mod envelope;
pub mod guest;
pub mod health;
pub mod notes;
pub mod users;

pub use envelope::{error_response, not_found, preflight_response, BoxBody};
pub use guest::{handle_get_user_host, handle_post_guest, handle_post_user_host};
pub use health::{health_check, home};
pub use notes::{
    handle_delete_note, handle_get_note, handle_list_notes, handle_post_note, handle_put_note,
};
pub use users::{handle_login, handle_logout, handle_register};
