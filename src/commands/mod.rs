pub mod chat;
pub mod login;
pub mod replay;
pub mod run;

pub use chat::handle_chat;
pub use login::{handle_login, handle_logout};
pub use replay::handle_replay;
pub use run::handle_run;
