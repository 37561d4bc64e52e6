//! Transport gateway: bootstrap page and streaming upgrade.

mod error;
mod gateway;
mod handlers;
mod page;

pub use error::StartupError;
pub use gateway::{cancel_on_signal, Gateway};
pub use handlers::{client_ip, AppState, StreamQuery};
pub use page::{render_home, PageData};
